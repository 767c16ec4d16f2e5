//! 布局报告：先是各元数据区域，再是数据区中空闲或占用的极长连续段。

use core::fmt;

use crate::{Result, Volume};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Free,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    SuperBlock,
    InodeBitmap,
    DataBitmap,
    InodeTable,
    Data(BlockState),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub kind: RegionKind,
    /// 在后备文件中的字节地址
    pub address: u64,
    pub blocks: u32,
    /// 字节数，总是块大小的整数倍
    pub size: u64,
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::SuperBlock => "super block",
            Self::InodeBitmap => "inode bitmap",
            Self::DataBitmap => "data bitmap",
            Self::InodeTable => "inode table",
            Self::Data(BlockState::Free) => "data (free)",
            Self::Data(BlockState::Busy) => "data (busy)",
        })
    }
}

pub fn regions(volume: &Volume) -> Result<Vec<Region>> {
    let super_block = volume.super_block();
    let layout = super_block.layout();
    let block_size = super_block.block_size as u64;
    let region = |kind, start: u32, blocks: u32| Region {
        kind,
        address: start as u64 * block_size,
        blocks,
        size: blocks as u64 * block_size,
    };

    let mut regions = vec![
        region(RegionKind::SuperBlock, 0, 1),
        region(
            RegionKind::InodeBitmap,
            layout.inode_bitmap_offset,
            layout.inode_bitmap_blocks,
        ),
        region(
            RegionKind::DataBitmap,
            layout.data_bitmap_offset,
            layout.data_bitmap_blocks,
        ),
        region(
            RegionKind::InodeTable,
            layout.inode_table_offset,
            layout.inode_table_blocks,
        ),
    ];

    regions.extend(volume.data_bitmap()?.runs().into_iter().map(|run| {
        let state = if run.busy {
            BlockState::Busy
        } else {
            BlockState::Free
        };
        region(RegionKind::Data(state), layout.data_offset + run.start, run.len)
    }));

    Ok(regions)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::Geometry;
    use crate::block_dev::mem::MemDevice;

    #[test]
    fn default_store() {
        let geometry = Geometry::default();
        let dev = Arc::new(MemDevice::new(geometry.store_len().unwrap()));
        let volume = Volume::format(dev, &geometry).unwrap();

        let map = regions(&volume).unwrap();
        assert_eq!(map.len(), 5);
        assert_eq!(
            map[3],
            Region {
                kind: RegionKind::InodeTable,
                address: 3 * 4096,
                blocks: 5,
                size: 5 * 4096,
            }
        );
        assert_eq!(
            map[4],
            Region {
                kind: RegionKind::Data(BlockState::Free),
                address: 8 * 4096,
                blocks: 56,
                size: 56 * 4096,
            }
        );
    }

    #[test]
    fn data_runs() {
        let geometry = Geometry {
            block_size: 512,
            inode_count: 4,
            data_blocks: 5,
        };
        let dev = Arc::new(MemDevice::new(geometry.store_len().unwrap()));
        let volume = Volume::format(dev.clone(), &geometry).unwrap();
        volume.data_bitmap().unwrap().set_range(&*dev, 2..4).unwrap();

        let data: Vec<_> = regions(&volume).unwrap()[4..]
            .iter()
            .map(|region| (region.kind, region.blocks))
            .collect();
        assert_eq!(
            data,
            [
                (RegionKind::Data(BlockState::Free), 2),
                (RegionKind::Data(BlockState::Busy), 2),
                (RegionKind::Data(BlockState::Free), 1),
            ]
        );
    }
}
