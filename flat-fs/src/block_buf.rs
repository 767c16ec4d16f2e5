//! # 块缓冲层
//!
//! 小于一块的记录（超级块、inode 记录、位图字节）在修改时，
//! 先读入整块，在内存中改动，再写回块设备。
//!
//! [`BlockBuf`] 只存活于一次修改之中，操作之间不缓存任何块；
//! 写回需显式调用，以便上报其错误。

use crate::BlockDevice;
use crate::Result;

pub struct BlockBuf {
    block_id: u32,
    data: Vec<u8>,
    modified: bool,
}

impl BlockBuf {
    pub fn load(dev: &dyn BlockDevice, block_id: u32, block_size: u32) -> Result<Self> {
        let mut data = vec![0; block_size as usize];
        dev.read_block(block_id as usize, &mut data)?;

        Ok(Self {
            block_id,
            data,
            modified: false,
        })
    }

    /// 不关心旧内容的块，同步时整块写出
    pub fn zeroed(block_id: u32, block_size: u32) -> Self {
        Self {
            block_id,
            data: vec![0; block_size as usize],
            modified: true,
        }
    }

    pub fn sync(&mut self, dev: &dyn BlockDevice) -> Result<()> {
        if self.modified {
            dev.write_block(self.block_id as usize, &self.data)?;
            self.modified = false;
        }
        Ok(())
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// 在从 `offset` 开始的 `len` 字节上执行 `f`
    #[inline]
    pub fn map<V>(&self, offset: usize, len: usize, f: impl FnOnce(&[u8]) -> V) -> V {
        f(&self.data[offset..offset + len])
    }

    #[inline]
    pub fn map_mut<V>(&mut self, offset: usize, len: usize, f: impl FnOnce(&mut [u8]) -> V) -> V {
        self.modified = true;
        f(&mut self.data[offset..offset + len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_dev::mem::MemDevice;

    #[test]
    fn edit_and_write_back() {
        let dev = MemDevice::new(4 * 512);
        let mut block = BlockBuf::load(&dev, 1, 512).unwrap();
        block.map_mut(10, 4, |bytes| bytes.copy_from_slice(b"flat"));
        // 同步前设备上没有变化
        assert_eq!(&dev.snapshot()[522..526], &[0; 4]);

        block.sync(&dev).unwrap();
        assert_eq!(&dev.snapshot()[522..526], b"flat");

        let block = BlockBuf::load(&dev, 1, 512).unwrap();
        assert_eq!(block.map(10, 4, |bytes| bytes.to_vec()), b"flat");
    }

    #[test]
    fn zeroed_overwrites() {
        let dev = MemDevice::new(2 * 512);
        dev.write_block(1, &[0xFF; 512]).unwrap();
        BlockBuf::zeroed(1, 512).sync(&dev).unwrap();
        assert!(dev.snapshot()[512..].iter().all(|&b| b == 0));
    }
}
