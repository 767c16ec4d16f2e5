//! 在单个后备文件中模拟的块文件系统。
//!
//! 后备文件的布局（以块为单位）：
//! 超级块 | inode 位图 | 数据位图 | inode 表 | 数据区
//!
//! 每个文件都存放在一段连续的数据块中。

/* 架构，自顶向下 */

// 文件操作层：在后备文件上格式化、导入、导出、删除、列出、映射
mod vfs;
pub use vfs::{Entry, FlatFs};

// 卷：一次操作中打开并校验过的后备存储
mod efs;
pub use efs::Volume;

// 磁盘数据结构层
mod layout;
pub use layout::{Bitmap, Inode, InodeTable, MountState, Run, SuperBlock};

// 宿主机数据流与数据区之间的传输
mod transfer;

// 跨结构的一致性检查
mod fsck;
pub use fsck::Damage;

// 布局报告
mod map;
pub use map::{BlockState, Region, RegionKind};

// 块缓冲层
mod block_buf;

// 块设备接口层
mod block_dev;
pub use block_dev::{BlockDevice, BlockFile};

mod config;
pub use config::{Geometry, Layout};

mod error;
pub use error::{Error, Result};

/// 磁盘编码版本
pub const VERSION: u16 = 1;
/// 格式化时允许的最小块大小
pub const MIN_BLOCK_SIZE: u32 = 512;
/// inode 表中一条记录的字节数
pub const RECORD_SIZE: u32 = 256;
/// inode 可容纳的最长名字（字节）
pub const NAME_MAX_LEN: usize = 128;
