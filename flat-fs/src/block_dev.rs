//! # 块设备接口
//!
//! 块设备以固定大小的**块**为单位存储数据，[`BlockDevice`] 抽象了块的读写。
//! 块大小即传入缓冲区的长度，因此同一设备可服务于任意几何参数。
//!
//! [`BlockFile`] 以宿主机文件作为块设备。

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Mutex, MutexGuard};

pub trait BlockDevice: Send + Sync {
    /// 将块 `block_id` 读入 `buf`，块长为 `buf.len()` 字节
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> io::Result<()>;
    fn write_block(&self, block_id: usize, buf: &[u8]) -> io::Result<()>;

    /// 将已写入的块落盘
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// 文件在关闭前一直持有其上的文件锁。
#[derive(Debug)]
pub struct BlockFile(Mutex<File>);

impl BlockFile {
    pub fn new(file: File) -> Self {
        Self(Mutex::new(file))
    }

    /// 底层文件的字节长度
    pub fn size(&self) -> io::Result<u64> {
        self.file()?.metadata().map(|meta| meta.len())
    }

    fn file(&self) -> io::Result<MutexGuard<'_, File>> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("block file mutex poisoned"))
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> io::Result<()> {
        let mut file = self.file()?;
        file.seek(SeekFrom::Start((block_id * buf.len()) as u64))?;
        file.read_exact(buf)
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> io::Result<()> {
        let mut file = self.file()?;
        file.seek(SeekFrom::Start((block_id * buf.len()) as u64))?;
        file.write_all(buf)
    }

    fn flush(&self) -> io::Result<()> {
        self.file()?.sync_data()
    }
}

#[cfg(test)]
pub(crate) mod mem {
    use super::*;

    /// 单元测试用的内存块设备
    pub struct MemDevice(Mutex<Vec<u8>>);

    impl MemDevice {
        pub fn new(len: u64) -> Self {
            Self(Mutex::new(vec![0; len as usize]))
        }

        pub fn snapshot(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    impl BlockDevice for MemDevice {
        fn read_block(&self, block_id: usize, buf: &mut [u8]) -> io::Result<()> {
            let data = self.0.lock().unwrap();
            let start = block_id * buf.len();
            let src = data
                .get(start..start + buf.len())
                .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
            buf.copy_from_slice(src);
            Ok(())
        }

        fn write_block(&self, block_id: usize, buf: &[u8]) -> io::Result<()> {
            let mut data = self.0.lock().unwrap();
            let start = block_id * buf.len();
            let dest = data
                .get_mut(start..start + buf.len())
                .ok_or_else(|| io::Error::from(io::ErrorKind::WriteZero))?;
            dest.copy_from_slice(buf);
            Ok(())
        }
    }
}
