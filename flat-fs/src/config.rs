//! 存储的几何参数，以及由其推出的区域布局

use crate::{Error, Result};
use crate::{MIN_BLOCK_SIZE, RECORD_SIZE};

pub const DEFAULT_BLOCK_SIZE: u32 = 4096;
pub const DEFAULT_INODE_COUNT: u32 = 80;
pub const DEFAULT_DATA_BLOCKS: u32 = 56;

/// 格式化时选定、记录在超级块中的容量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// 每块字节数
    pub block_size: u32,
    /// inode 槽位数
    pub inode_count: u32,
    /// 数据区块数
    pub data_blocks: u32,
}

/// 各区域的起始块与长度，以块为单位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub inode_bitmap_offset: u32,
    pub inode_bitmap_blocks: u32,
    pub data_bitmap_offset: u32,
    pub data_bitmap_blocks: u32,
    pub inode_table_offset: u32,
    pub inode_table_blocks: u32,
    pub data_offset: u32,
    pub total_blocks: u32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            inode_count: DEFAULT_INODE_COUNT,
            data_blocks: DEFAULT_DATA_BLOCKS,
        }
    }
}

impl Geometry {
    pub fn validate(&self) -> Result<()> {
        if !self.block_size.is_power_of_two() || self.block_size < MIN_BLOCK_SIZE.max(RECORD_SIZE)
        {
            return Err(Error::InvalidGeometry(format!(
                "block size {} is not a power of two of at least {MIN_BLOCK_SIZE}",
                self.block_size
            )));
        }
        if self.inode_count == 0 {
            return Err(Error::InvalidGeometry("no inode slots".into()));
        }
        if self.data_blocks == 0 {
            return Err(Error::InvalidGeometry("no data blocks".into()));
        }
        self.layout().map(|_| ())
    }

    pub fn layout(&self) -> Result<Layout> {
        self.try_layout().ok_or_else(|| {
            Error::InvalidGeometry(format!("{self:?} overflows the block address space"))
        })
    }

    /// 为 `size` 字节的文件预留的块数
    ///
    /// 商之上总是再加一块，恰为块大小整数倍时也是如此。
    /// 导入与删除都经由此处计算。
    #[inline]
    pub fn blocks_for(&self, size: u64) -> u64 {
        size / self.block_size as u64 + 1
    }

    /// 后备文件的总字节数
    pub fn store_len(&self) -> Result<u64> {
        self.layout()
            .map(|layout| layout.total_blocks as u64 * self.block_size as u64)
    }

    fn try_layout(&self) -> Option<Layout> {
        let bits_per_block = self.block_size.checked_mul(8)?;
        let inode_bitmap_blocks = self.inode_count.div_ceil(bits_per_block);
        let data_bitmap_blocks = self.data_blocks.div_ceil(bits_per_block);
        let inode_table_blocks = (self.inode_count as u64 * RECORD_SIZE as u64)
            .div_ceil(self.block_size as u64)
            .try_into()
            .ok()?;

        // 0 号块存放超级块
        let inode_bitmap_offset = 1;
        let data_bitmap_offset = inode_bitmap_offset + inode_bitmap_blocks;
        let inode_table_offset = data_bitmap_offset.checked_add(data_bitmap_blocks)?;
        let data_offset = inode_table_offset.checked_add(inode_table_blocks)?;
        let total_blocks = data_offset.checked_add(self.data_blocks)?;
        // 字节地址不得溢出
        (total_blocks as u64).checked_mul(self.block_size as u64)?;

        Some(Layout {
            inode_bitmap_offset,
            inode_bitmap_blocks,
            data_bitmap_offset,
            data_bitmap_blocks,
            inode_table_offset,
            inode_table_blocks,
            data_offset,
            total_blocks,
        })
    }
}
