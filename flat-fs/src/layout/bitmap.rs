use core::ops::Range;

use crate::{BlockDevice, Error, Result};

/// inode 表或数据区的占用位图
///
/// 操作开始时读入整个位图区域，每次改动都立即写回块设备。
#[derive(Debug)]
pub struct Bitmap {
    /// 位图区域的起始块
    start_block: u32,
    /// 管理的单元数，超出部分的位永不置起
    len: u32,
    block_size: u32,
    /// 第 `i` 位即第 `i / 8` 字节的第 `i % 8` 位
    bytes: Vec<u8>,
}

/// 状态相同的极长连续单元
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub start: u32,
    pub len: u32,
    pub busy: bool,
}

impl Bitmap {
    pub fn load(
        dev: &dyn BlockDevice,
        start_block: u32,
        blocks: u32,
        len: u32,
        block_size: u32,
    ) -> Result<Self> {
        let mut bytes = vec![0; blocks as usize * block_size as usize];
        for (block_index, chunk) in bytes.chunks_mut(block_size as usize).enumerate() {
            dev.read_block(start_block as usize + block_index, chunk)?;
        }

        Ok(Self {
            start_block,
            len,
            block_size,
            bytes,
        })
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_set(&self, index: u32) -> bool {
        index < self.len && self.bytes[index as usize / 8] & (1 << (index % 8)) != 0
    }

    pub fn count_free(&self) -> u32 {
        (0..self.len).filter(|&index| !self.is_set(index)).count() as u32
    }

    /// 最低的空闲位
    pub fn first_free(&self) -> Option<u32> {
        self.bytes
            .iter()
            .enumerate()
            .find_map(|(byte_index, &bits)| {
                (bits != u8::MAX).then_some(byte_index as u32 * 8 + bits.trailing_ones())
            })
            .filter(|&index| index < self.len)
    }

    /// 首次适配：寻找 `required` 个连续的空闲位
    ///
    /// 遇到已置起的位即放弃当前候选，从其后重新开始。
    /// 分散在多段中的空闲单元不会累加。
    pub fn first_free_run(&self, required: u64) -> Option<u32> {
        let mut start = 0;
        let mut found = 0u64;

        for index in 0..self.len {
            if self.is_set(index) {
                start = index + 1;
                found = 0;
            } else {
                found += 1;
                if found >= required {
                    return Some(start);
                }
            }
        }

        None
    }

    /// 按下标顺序给出整个位图的游程
    pub fn runs(&self) -> Vec<Run> {
        let mut runs: Vec<Run> = Vec::new();
        for index in 0..self.len {
            let busy = self.is_set(index);
            match runs.last_mut() {
                Some(run) if run.busy == busy => run.len += 1,
                _ => runs.push(Run {
                    start: index,
                    len: 1,
                    busy,
                }),
            }
        }
        runs
    }

    pub fn set_range(&mut self, dev: &dyn BlockDevice, range: Range<u32>) -> Result<()> {
        self.mark(dev, range, true)
    }

    pub fn clear_range(&mut self, dev: &dyn BlockDevice, range: Range<u32>) -> Result<()> {
        self.mark(dev, range, false)
    }
}

impl Bitmap {
    fn mark(&mut self, dev: &dyn BlockDevice, range: Range<u32>, set: bool) -> Result<()> {
        if range.is_empty() {
            return Ok(());
        }
        if range.end > self.len {
            return Err(Error::Corrupted(format!(
                "bits {range:?} lie outside a bitmap of {}",
                self.len
            )));
        }

        for index in range.clone() {
            let byte = &mut self.bytes[index as usize / 8];
            if set {
                *byte |= 1 << (index % 8);
            } else {
                *byte &= !(1 << (index % 8));
            }
        }

        // 写回范围涉及的每个位图块
        let bits_per_block = self.block_size * 8;
        for block_index in range.start / bits_per_block..=(range.end - 1) / bits_per_block {
            let start = (block_index * self.block_size) as usize;
            dev.write_block(
                (self.start_block + block_index) as usize,
                &self.bytes[start..start + self.block_size as usize],
            )?;
        }

        Ok(())
    }
}
