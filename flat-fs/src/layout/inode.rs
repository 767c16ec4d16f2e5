//! inode 记录与存放它们的 inode 表
//!
//! 第 `i` 个槽位位于表起点之后 `i * RECORD_SIZE` 字节处，由 inode 位图的第 `i` 位描述。
//! 空槽位全为零：靠标签字节区分空槽位与文件，因此任何名字（包括空名字）都可用。

use binrw::io::Cursor;
use binrw::{BinRead, BinWrite, binrw};

use crate::block_buf::BlockBuf;
use crate::layout::Bitmap;
use crate::{BlockDevice, Error, Result};
use crate::{NAME_MAX_LEN, RECORD_SIZE};

const TAG_VACANT: u8 = 0;
const TAG_FILE: u8 = 1;

/// 磁盘上的定长记录，直到 `RECORD_SIZE` 的剩余部分保持为零
#[binrw]
#[brw(little)]
struct RawInode {
    tag: u8,
    name_len: u8,
    size: u64,
    first_block: u32,
    name: [u8; NAME_MAX_LEN],
}

/// 一个文件的元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    name: String,
    /// 来源报告的字节长度
    pub size: u64,
    /// 文件所占连续段的起始块，相对于数据区
    pub first_block: u32,
}

impl Inode {
    pub fn new(name: &str, size: u64, first_block: u32) -> Result<Self> {
        if name.len() > NAME_MAX_LEN {
            return Err(Error::NameTooLong(name.len()));
        }

        Ok(Self {
            name: name.to_owned(),
            size,
            first_block,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, buf: &mut [u8]) -> Result<()> {
        let mut name = [0; NAME_MAX_LEN];
        name[..self.name.len()].copy_from_slice(self.name.as_bytes());

        buf.fill(0);
        RawInode {
            tag: TAG_FILE,
            name_len: self.name.len() as u8,
            size: self.size,
            first_block: self.first_block,
            name,
        }
        .write(&mut Cursor::new(buf))?;
        Ok(())
    }

    /// 空槽位返回 `None`
    fn decode(bytes: &[u8]) -> Result<Option<Self>> {
        let raw = RawInode::read(&mut Cursor::new(bytes))?;

        match raw.tag {
            TAG_VACANT => Ok(None),
            TAG_FILE => {
                let name = raw
                    .name
                    .get(..raw.name_len as usize)
                    .and_then(|name| core::str::from_utf8(name).ok())
                    .ok_or_else(|| Error::Corrupted("unreadable inode name".into()))?;

                Ok(Some(Self {
                    name: name.to_owned(),
                    size: raw.size,
                    first_block: raw.first_block,
                }))
            }
            tag => Err(Error::Corrupted(format!("unknown inode tag {tag}"))),
        }
    }
}

/// 定长的 inode 记录数组
#[derive(Debug)]
pub struct InodeTable {
    start_block: u32,
    count: u32,
    block_size: u32,
}

impl InodeTable {
    pub fn new(start_block: u32, count: u32, block_size: u32) -> Self {
        Self {
            start_block,
            count,
            block_size,
        }
    }

    #[inline]
    fn records_per_block(&self) -> u32 {
        self.block_size / RECORD_SIZE
    }

    /// 槽位在磁盘上的位置：**块ID**以及**块内偏移**
    pub fn position(&self, slot: u32) -> (u32, usize) {
        let block_id = self.start_block + slot / self.records_per_block();
        let offset = (slot % self.records_per_block() * RECORD_SIZE) as usize;

        (block_id, offset)
    }

    pub fn read(&self, dev: &dyn BlockDevice, slot: u32) -> Result<Option<Inode>> {
        self.check_slot(slot)?;
        let (block_id, offset) = self.position(slot);
        BlockBuf::load(dev, block_id, self.block_size)?
            .map(offset, RECORD_SIZE as usize, Inode::decode)
    }

    pub fn insert(&self, dev: &dyn BlockDevice, slot: u32, inode: &Inode) -> Result<()> {
        self.check_slot(slot)?;
        let (block_id, offset) = self.position(slot);
        let mut block = BlockBuf::load(dev, block_id, self.block_size)?;
        block.map_mut(offset, RECORD_SIZE as usize, |bytes| inode.encode(bytes))?;
        block.sync(dev)
    }

    /// 将整条记录清零
    pub fn erase(&self, dev: &dyn BlockDevice, slot: u32) -> Result<()> {
        self.check_slot(slot)?;
        let (block_id, offset) = self.position(slot);
        let mut block = BlockBuf::load(dev, block_id, self.block_size)?;
        block.map_mut(offset, RECORD_SIZE as usize, |bytes| bytes.fill(0));
        block.sync(dev)
    }

    /// 按顺序给出所有槽位，无论是否在用，每次读入一块
    pub fn scan(&self, dev: &dyn BlockDevice) -> Result<Vec<Option<Inode>>> {
        let mut records = Vec::with_capacity(self.count as usize);
        let blocks = self.count.div_ceil(self.records_per_block());

        for block_index in 0..blocks {
            let block = BlockBuf::load(dev, self.start_block + block_index, self.block_size)?;
            for record in block.bytes().chunks_exact(RECORD_SIZE as usize) {
                if records.len() == self.count as usize {
                    break;
                }
                records.push(Inode::decode(record)?);
            }
        }

        Ok(records)
    }

    /// 位图中已置起的记录，按槽位顺序
    pub fn live(&self, dev: &dyn BlockDevice, bitmap: &Bitmap) -> Result<Vec<(u32, Inode)>> {
        Ok(self
            .scan(dev)?
            .into_iter()
            .zip(0..)
            .filter(|&(_, slot)| bitmap.is_set(slot))
            .filter_map(|(inode, slot)| inode.map(|inode| (slot, inode)))
            .collect())
    }

    /// 第一个名为 `name` 的在用记录
    pub fn lookup(
        &self,
        dev: &dyn BlockDevice,
        bitmap: &Bitmap,
        name: &str,
    ) -> Result<Option<(u32, Inode)>> {
        Ok(self
            .live(dev, bitmap)?
            .into_iter()
            .find(|(_, inode)| inode.name() == name))
    }
}

impl InodeTable {
    fn check_slot(&self, slot: u32) -> Result<()> {
        if slot < self.count {
            Ok(())
        } else {
            Err(Error::Corrupted(format!(
                "inode slot {slot} outside a table of {}",
                self.count
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_dev::mem::MemDevice;

    const BLOCK: u32 = 512;

    fn setup(count: u32) -> (MemDevice, InodeTable, Bitmap) {
        // 0 号块：位图，1 号块起：inode 表
        let table_blocks = (count * RECORD_SIZE).div_ceil(BLOCK);
        let dev = MemDevice::new(((1 + table_blocks) * BLOCK) as u64);
        let bitmap = Bitmap::load(&dev, 0, 1, count, BLOCK).unwrap();
        (dev, InodeTable::new(1, count, BLOCK), bitmap)
    }

    #[test]
    fn record_layout() {
        let mut buf = [0xFFu8; RECORD_SIZE as usize];
        Inode::new("abc", 0x0102, 7).unwrap().encode(&mut buf).unwrap();

        assert_eq!(buf[0], TAG_FILE);
        assert_eq!(buf[1], 3);
        assert_eq!(&buf[2..10], &0x0102u64.to_le_bytes());
        assert_eq!(&buf[10..14], &7u32.to_le_bytes());
        assert_eq!(&buf[14..17], b"abc");
        assert!(buf[17..].iter().all(|&b| b == 0));
    }

    #[test]
    fn zeroed_record_is_vacant() {
        assert_eq!(Inode::decode(&[0; RECORD_SIZE as usize]).unwrap(), None);
    }

    #[test]
    fn empty_name_is_not_vacant() {
        let mut buf = [0u8; RECORD_SIZE as usize];
        let inode = Inode::new("", 0, 0).unwrap();
        inode.encode(&mut buf).unwrap();
        assert_eq!(Inode::decode(&buf).unwrap(), Some(inode));
    }

    #[test]
    fn name_limit() {
        let longest = "n".repeat(NAME_MAX_LEN);
        assert!(Inode::new(&longest, 1, 0).is_ok());
        assert!(matches!(
            Inode::new(&format!("{longest}x"), 1, 0),
            Err(Error::NameTooLong(129))
        ));
    }

    #[test]
    fn position_of_slots() {
        let table = InodeTable::new(3, 80, 4096);
        assert_eq!(table.position(0), (3, 0));
        assert_eq!(table.position(15), (3, 15 * 256));
        assert_eq!(table.position(16), (4, 0));
        assert_eq!(table.position(79), (7, 15 * 256));
    }

    #[test]
    fn insert_read_erase() {
        let (dev, table, _) = setup(4);
        let inode = Inode::new("pan-tadeusz.txt", 3800, 2).unwrap();
        table.insert(&dev, 3, &inode).unwrap();
        assert_eq!(table.read(&dev, 3).unwrap(), Some(inode));

        table.erase(&dev, 3).unwrap();
        assert_eq!(table.read(&dev, 3).unwrap(), None);
        assert!(dev.snapshot().iter().all(|&b| b == 0));
    }

    #[test]
    fn lookup_only_sees_live_slots() {
        let (dev, table, mut bitmap) = setup(4);
        table
            .insert(&dev, 0, &Inode::new("a", 1, 0).unwrap())
            .unwrap();
        table
            .insert(&dev, 2, &Inode::new("b", 2, 1).unwrap())
            .unwrap();
        bitmap.set_range(&dev, 2..3).unwrap();

        assert_eq!(table.lookup(&dev, &bitmap, "a").unwrap(), None);
        let (slot, inode) = table.lookup(&dev, &bitmap, "b").unwrap().unwrap();
        assert_eq!((slot, inode.size), (2, 2));

        let live = table.live(&dev, &bitmap).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(table.scan(&dev).unwrap().iter().flatten().count(), 2);
    }

    #[test]
    fn slot_out_of_range() {
        let (dev, table, _) = setup(2);
        assert!(matches!(table.read(&dev, 2), Err(Error::Corrupted(_))));
    }
}
