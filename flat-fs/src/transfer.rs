//! # 块传输层
//!
//! 在宿主机数据流与数据区的连续段之间逐块搬运文件内容，
//! 最后一块只携带剩余的字节。

use std::io::{Read, Write};

use crate::{BlockDevice, Result};

/// 从 `source` 读取 `total` 字节，写入从 `start_block` 开始的连续块
///
/// 来源不足 `total` 字节时传输失败。
pub fn copy_in(
    dev: &dyn BlockDevice,
    block_size: u32,
    start_block: u32,
    source: &mut dyn Read,
    total: u64,
) -> Result<()> {
    let mut buf = vec![0; block_size as usize];
    let mut remaining = total;
    let mut block_id = start_block as usize;

    while remaining > 0 {
        let count = remaining.min(block_size as u64) as usize;
        // 文件末尾之后的字节保持为零
        buf[count..].fill(0);
        source.read_exact(&mut buf[..count])?;
        dev.write_block(block_id, &buf)?;

        remaining -= count as u64;
        block_id += 1;
    }

    log::debug!("copied {total} bytes into blocks from {start_block}");
    Ok(())
}

/// 将从 `start_block` 开始的 `total` 字节写入 `sink`
pub fn copy_out(
    dev: &dyn BlockDevice,
    block_size: u32,
    start_block: u32,
    sink: &mut dyn Write,
    total: u64,
) -> Result<()> {
    let mut buf = vec![0; block_size as usize];
    let mut remaining = total;
    let mut block_id = start_block as usize;

    while remaining > 0 {
        let count = remaining.min(block_size as u64) as usize;
        dev.read_block(block_id, &mut buf)?;
        sink.write_all(&buf[..count])?;

        remaining -= count as u64;
        block_id += 1;
    }
    sink.flush()?;

    log::debug!("copied {total} bytes out of blocks from {start_block}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::block_dev::mem::MemDevice;

    fn random_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|_| rand::random::<u8>()).collect()
    }

    #[test]
    fn round_trip_chunk_boundaries() {
        for len in [0, 1, 511, 512, 513, 3 * 512 + 7] {
            let dev = MemDevice::new(8 * 512);
            let data = random_bytes(len);

            copy_in(&dev, 512, 2, &mut data.as_slice(), len as u64).unwrap();
            let mut out = Vec::new();
            copy_out(&dev, 512, 2, &mut out, len as u64).unwrap();
            assert_eq!(out, data, "len {len}");
        }
    }

    #[test]
    fn writes_block_aligned() {
        let dev = MemDevice::new(4 * 512);
        let data = [7u8; 600];
        copy_in(&dev, 512, 1, &mut data.as_slice(), 600).unwrap();

        let image = dev.snapshot();
        assert!(image[..512].iter().all(|&b| b == 0));
        assert!(image[512..1112].iter().all(|&b| b == 7));
        assert!(image[1112..].iter().all(|&b| b == 0));
    }

    #[test]
    fn short_source() {
        let dev = MemDevice::new(4 * 512);
        let data = [1u8; 100];
        let err = copy_in(&dev, 512, 0, &mut data.as_slice(), 200).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
