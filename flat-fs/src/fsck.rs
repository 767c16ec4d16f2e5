//! # 一致性检查
//!
//! 交叉核对超级块计数器、两张位图与 inode 表。
//! 只检查不修复，发现的损坏以标志集合的形式报告。

use std::collections::HashSet;

use enumflags2::{BitFlags, bitflags};

use crate::{Result, Volume};

#[rustfmt::skip]
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Damage {
    /// 空闲 inode 计数与 inode 位图的空闲位数不符
    InodeCount    = 1,
    /// 空闲数据块计数与数据位图的空闲位数不符
    DataCount     = 1 << 1,
    /// 位未置起的槽位上存有记录
    OrphanRecord  = 1 << 2,
    /// 位已置起的槽位上没有记录
    MissingRecord = 1 << 3,
    /// 文件所占的块未被标记，或越出数据区
    UnmarkedRun   = 1 << 4,
    /// 同一块被两个文件占用
    Overlap       = 1 << 5,
    /// 已标记的块不属于任何文件
    LeakedBlock   = 1 << 6,
    /// 两个文件同名
    DuplicateName = 1 << 7,
}

/// 对 `volume` 执行全部检查，空集合即为一致
pub fn check(volume: &Volume) -> Result<BitFlags<Damage>> {
    let super_block = volume.super_block();
    let geometry = volume.geometry();
    let inode_bitmap = volume.inode_bitmap()?;
    let data_bitmap = volume.data_bitmap()?;
    let records = volume.inode_table().scan(&**volume.device())?;

    let mut damage = BitFlags::empty();

    if inode_bitmap.count_free() != super_block.free_inode_count {
        damage |= Damage::InodeCount;
    }
    if data_bitmap.count_free() != super_block.free_data_count {
        damage |= Damage::DataCount;
    }

    let mut names = HashSet::new();
    let mut covered = vec![false; super_block.data_block_count as usize];

    for (slot, record) in (0..).zip(&records) {
        let inode = match (record, inode_bitmap.is_set(slot)) {
            (Some(_), false) => {
                damage |= Damage::OrphanRecord;
                continue;
            }
            (None, true) => {
                damage |= Damage::MissingRecord;
                continue;
            }
            (None, false) => continue,
            (Some(inode), true) => inode,
        };

        if !names.insert(inode.name()) {
            damage |= Damage::DuplicateName;
        }

        let start = inode.first_block as u64;
        let end = start + geometry.blocks_for(inode.size);
        if end > super_block.data_block_count as u64 {
            damage |= Damage::UnmarkedRun;
            continue;
        }
        for block in start as u32..end as u32 {
            if !data_bitmap.is_set(block) {
                damage |= Damage::UnmarkedRun;
            }
            if std::mem::replace(&mut covered[block as usize], true) {
                damage |= Damage::Overlap;
            }
        }
    }

    let leaked = (0..super_block.data_block_count)
        .any(|block| data_bitmap.is_set(block) && !covered[block as usize]);
    if leaked {
        damage |= Damage::LeakedBlock;
    }

    if !damage.is_empty() {
        log::debug!("check found {damage:?}");
    }
    Ok(damage)
}
