use binrw::io::Cursor;
use binrw::{BinRead, BinWrite, binrw};

use crate::block_buf::BlockBuf;
use crate::{BlockDevice, Error, Geometry, Layout, Result};
use crate::{MIN_BLOCK_SIZE, RECORD_SIZE, VERSION};

/// 是否有多步更新正在进行
#[binrw]
#[brw(repr = u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    Clean = 0,
    /// 更新的首次写入前置起，最后一次写入时清除
    Dirty = 1,
}

/// 超级块，位于 0 号块开头：
/// - 标识存储及其编码版本；
/// - 记录几何参数并定位各区域；
/// - 维护空闲 inode 与空闲数据块计数
#[binrw]
#[brw(little, magic = b"FLATFS\0\0")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    version: u16,
    pub state: MountState,
    pub block_size: u32,
    pub total_blocks: u32,
    pub inode_count: u32,
    pub data_block_count: u32,
    pub inode_record_size: u32,
    pub free_inode_count: u32,
    pub free_data_count: u32,
    /* region offsets, in blocks */
    pub inode_bitmap_offset: u32,
    pub data_bitmap_offset: u32,
    pub inode_table_offset: u32,
    pub data_offset: u32,
}

impl SuperBlock {
    /// 编码后的字节数
    pub const SIZE: usize = 56;

    /// 全部 inode 与数据块均空闲的新超级块
    pub fn new(geometry: &Geometry) -> Result<Self> {
        geometry.validate()?;
        let layout = geometry.layout()?;

        Ok(Self {
            version: VERSION,
            state: MountState::Clean,
            block_size: geometry.block_size,
            total_blocks: layout.total_blocks,
            inode_count: geometry.inode_count,
            data_block_count: geometry.data_blocks,
            inode_record_size: RECORD_SIZE,
            free_inode_count: geometry.inode_count,
            free_data_count: geometry.data_blocks,
            inode_bitmap_offset: layout.inode_bitmap_offset,
            data_bitmap_offset: layout.data_bitmap_offset,
            inode_table_offset: layout.inode_table_offset,
            data_offset: layout.data_offset,
        })
    }

    #[inline]
    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn geometry(&self) -> Geometry {
        Geometry {
            block_size: self.block_size,
            inode_count: self.inode_count,
            data_blocks: self.data_block_count,
        }
    }

    /// 记录中的区域布局，经 [`Self::validate`] 校验后方可信任
    pub fn layout(&self) -> Layout {
        let bits_per_block = self.block_size.saturating_mul(8).max(1);
        Layout {
            inode_bitmap_offset: self.inode_bitmap_offset,
            inode_bitmap_blocks: self.inode_count.div_ceil(bits_per_block),
            data_bitmap_offset: self.data_bitmap_offset,
            data_bitmap_blocks: self.data_block_count.div_ceil(bits_per_block),
            inode_table_offset: self.inode_table_offset,
            inode_table_blocks: self.data_offset.saturating_sub(self.inode_table_offset),
            data_offset: self.data_offset,
            total_blocks: self.total_blocks,
        }
    }

    /// 校验各字段彼此一致，并与后备文件长度一致。
    /// 各区域偏移必须与几何参数推算的结果完全相同。
    pub fn validate(&self, store_len: u64) -> Result<()> {
        if self.version != VERSION {
            return Err(Error::Corrupted(format!(
                "unsupported version {}",
                self.version
            )));
        }
        if self.inode_record_size != RECORD_SIZE {
            return Err(Error::Corrupted(format!(
                "inode record size {} is not {RECORD_SIZE}",
                self.inode_record_size
            )));
        }
        let geometry = self.geometry();
        let expected = geometry
            .validate()
            .and_then(|()| geometry.layout())
            .map_err(|e| Error::Corrupted(e.to_string()))?;
        if (
            self.inode_bitmap_offset,
            self.data_bitmap_offset,
            self.inode_table_offset,
            self.data_offset,
            self.total_blocks,
        ) != (
            expected.inode_bitmap_offset,
            expected.data_bitmap_offset,
            expected.inode_table_offset,
            expected.data_offset,
            expected.total_blocks,
        ) {
            return Err(Error::Corrupted(format!(
                "region offsets disagree with {geometry:?}"
            )));
        }
        if self.free_inode_count > self.inode_count
            || self.free_data_count > self.data_block_count
        {
            return Err(Error::Corrupted("free counters exceed capacity".into()));
        }
        let expected_len = expected.total_blocks as u64 * self.block_size as u64;
        if store_len != expected_len {
            return Err(Error::Corrupted(format!(
                "store is {store_len} bytes, expected {expected_len}"
            )));
        }
        Ok(())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::read(&mut Cursor::new(bytes)).map_err(|e| match e {
            binrw::Error::BadMagic { .. } => Error::Corrupted("not a flat-fs store".into()),
            binrw::Error::Io(e) => Error::Io(e),
            e => Error::Corrupted(e.to_string()),
        })
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<()> {
        self.write(&mut Cursor::new(buf))?;
        Ok(())
    }

    /// 在尚不知道块大小时从 0 号块读出超级块
    pub fn load(dev: &dyn BlockDevice) -> Result<Self> {
        let mut head = [0u8; MIN_BLOCK_SIZE as usize];
        dev.read_block(0, &mut head)?;
        Self::decode(&head)
    }

    pub fn persist(&self, dev: &dyn BlockDevice) -> Result<()> {
        let mut block = BlockBuf::load(dev, 0, self.block_size)?;
        block.map_mut(0, Self::SIZE, |bytes| self.encode(bytes))?;
        block.sync(dev)
    }
}
