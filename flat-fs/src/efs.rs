//! # 卷管理层
//!
//! 一次操作中打开的后备存储：块设备加上校验过的超级块。
//! 位图与 inode 记录按需读取，生命周期不超过卷本身。

use std::io::{Read, Write};
use std::sync::Arc;

use crate::block_buf::BlockBuf;
use crate::layout::{Bitmap, InodeTable, MountState, SuperBlock};
use crate::{BlockDevice, Error, Geometry, MIN_BLOCK_SIZE, Result};
use crate::{fsck, transfer};

pub struct Volume {
    device: Arc<dyn BlockDevice>,
    super_block: SuperBlock,
}

impl Volume {
    /// 在整个设备上布局一个空文件系统
    pub fn format(device: Arc<dyn BlockDevice>, geometry: &Geometry) -> Result<Self> {
        let super_block = SuperBlock::new(geometry)?;

        for block_id in 0..super_block.total_blocks {
            BlockBuf::zeroed(block_id, super_block.block_size).sync(&*device)?;
        }
        super_block.persist(&*device)?;
        device.flush()?;

        Ok(Self {
            device,
            super_block,
        })
    }

    /// 打开长 `store_len` 字节的存储以供使用
    ///
    /// 被中断的更新留下的脏存储会先经检查，发现损坏则拒绝打开。
    pub fn mount(device: Arc<dyn BlockDevice>, store_len: u64) -> Result<Self> {
        let volume = Self::load(device, store_len)?;

        if volume.super_block.state == MountState::Dirty {
            let damage = fsck::check(&volume)?;
            if !damage.is_empty() {
                log::error!("interrupted update left damage: {damage:?}");
                return Err(Error::Inconsistent(damage));
            }
            log::warn!("store was not closed cleanly, metadata is consistent");
        }

        Ok(volume)
    }

    /// 打开长 `store_len` 字节的存储，不理会挂载状态
    pub fn load(device: Arc<dyn BlockDevice>, store_len: u64) -> Result<Self> {
        if store_len < MIN_BLOCK_SIZE as u64 {
            return Err(Error::Corrupted(format!(
                "store of {store_len} bytes cannot hold a super block"
            )));
        }
        let super_block = SuperBlock::load(&*device)?;
        super_block.validate(store_len)?;

        Ok(Self {
            device,
            super_block,
        })
    }

    #[inline]
    pub fn device(&self) -> &Arc<dyn BlockDevice> {
        &self.device
    }

    #[inline]
    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    #[inline]
    pub fn super_block_mut(&mut self) -> &mut SuperBlock {
        &mut self.super_block
    }

    #[inline]
    pub fn geometry(&self) -> Geometry {
        self.super_block.geometry()
    }

    pub fn inode_bitmap(&self) -> Result<Bitmap> {
        let layout = self.super_block.layout();
        Bitmap::load(
            &*self.device,
            layout.inode_bitmap_offset,
            layout.inode_bitmap_blocks,
            self.super_block.inode_count,
            self.super_block.block_size,
        )
    }

    pub fn data_bitmap(&self) -> Result<Bitmap> {
        let layout = self.super_block.layout();
        Bitmap::load(
            &*self.device,
            layout.data_bitmap_offset,
            layout.data_bitmap_blocks,
            self.super_block.data_block_count,
            self.super_block.block_size,
        )
    }

    pub fn inode_table(&self) -> InodeTable {
        InodeTable::new(
            self.super_block.inode_table_offset,
            self.super_block.inode_count,
            self.super_block.block_size,
        )
    }

    /// 多步更新开始前将存储标记为脏
    pub fn begin(&mut self) -> Result<()> {
        self.super_block.state = MountState::Dirty;
        self.super_block.persist(&*self.device)?;
        self.device.flush()?;
        Ok(())
    }

    /// 写入更新后的计数，并重新标记为干净
    pub fn commit(&mut self) -> Result<()> {
        self.device.flush()?;
        self.super_block.state = MountState::Clean;
        self.super_block.persist(&*self.device)?;
        self.device.flush()?;
        Ok(())
    }

    /// 将 `size` 字节写入从数据块 `first_block` 开始的连续段
    pub fn copy_in(&self, first_block: u32, source: &mut dyn Read, size: u64) -> Result<()> {
        transfer::copy_in(
            &*self.device,
            self.super_block.block_size,
            self.super_block.data_offset + first_block,
            source,
            size,
        )
    }

    pub fn copy_out(&self, first_block: u32, sink: &mut dyn Write, size: u64) -> Result<()> {
        transfer::copy_out(
            &*self.device,
            self.super_block.block_size,
            self.super_block.data_offset + first_block,
            sink,
            size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_dev::mem::MemDevice;

    fn small() -> Geometry {
        Geometry {
            block_size: 512,
            inode_count: 8,
            data_blocks: 16,
        }
    }

    fn formatted() -> (Arc<MemDevice>, u64) {
        let len = small().store_len().unwrap();
        let dev = Arc::new(MemDevice::new(len));
        Volume::format(dev.clone(), &small()).unwrap();
        (dev, len)
    }

    #[test]
    fn format_then_mount() {
        let (dev, len) = formatted();
        let volume = Volume::mount(dev, len).unwrap();

        assert_eq!(volume.geometry(), small());
        assert_eq!(volume.super_block().free_inode_count, 8);
        assert_eq!(volume.super_block().free_data_count, 16);
        assert_eq!(volume.inode_bitmap().unwrap().count_free(), 8);
        assert_eq!(volume.data_bitmap().unwrap().count_free(), 16);
    }

    #[test]
    fn format_wipes_old_content() {
        let len = small().store_len().unwrap();
        let dev = Arc::new(MemDevice::new(len));
        for block_id in 0..(len / 512) as usize {
            dev.write_block(block_id, &[0xFF; 512]).unwrap();
        }
        let volume = Volume::format(dev.clone(), &small()).unwrap();

        assert!(volume.inode_table().scan(&*dev).unwrap().iter().all(Option::is_none));
        assert_eq!(volume.data_bitmap().unwrap().count_free(), 16);
    }

    #[test]
    fn unformatted_store() {
        let dev = Arc::new(MemDevice::new(4096));
        assert!(matches!(
            Volume::mount(dev, 4096),
            Err(Error::Corrupted(_))
        ));
    }

    #[test]
    fn dirty_but_consistent_store_mounts() {
        let (dev, len) = formatted();
        let mut volume = Volume::mount(dev.clone(), len).unwrap();
        volume.begin().unwrap();
        drop(volume);

        let volume = Volume::mount(dev, len).unwrap();
        assert_eq!(volume.super_block().state, MountState::Dirty);
    }

    #[test]
    fn dirty_damaged_store_is_refused() {
        let (dev, len) = formatted();
        let mut volume = Volume::mount(dev.clone(), len).unwrap();
        volume.begin().unwrap();
        // 更新在标记数据块之后、写超级块之前中断
        let mut data_bitmap = volume.data_bitmap().unwrap();
        data_bitmap.set_range(&*dev, 0..2).unwrap();
        drop(volume);

        match Volume::mount(dev.clone(), len) {
            Err(Error::Inconsistent(damage)) => {
                assert!(damage.contains(fsck::Damage::DataCount));
                assert!(damage.contains(fsck::Damage::LeakedBlock));
            }
            other => panic!("expected inconsistency, got {:?}", other.err()),
        }

        // 不经检查的加载仍然可用，便于排查
        assert!(Volume::load(dev, len).is_ok());
    }

    #[test]
    fn copy_goes_to_data_area() {
        let (dev, len) = formatted();
        let volume = Volume::mount(dev.clone(), len).unwrap();
        let data = b"hello, flat world";
        volume.copy_in(1, &mut &data[..], data.len() as u64).unwrap();

        let data_offset = volume.super_block().data_offset as usize;
        let start = (data_offset + 1) * 512;
        assert_eq!(&dev.snapshot()[start..start + data.len()], data);

        let mut out = Vec::new();
        volume.copy_out(1, &mut out, data.len() as u64).unwrap();
        assert_eq!(out, data);
    }
}
