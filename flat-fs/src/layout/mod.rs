//! # 磁盘数据结构层
//!
//! flat-fs 磁盘布局：
//! 超级块 | inode 位图 | 数据位图 | inode 表 | 数据区
//!
//! 所有字段均以小端序、定宽编码。

mod super_block;
pub use super_block::{MountState, SuperBlock};

mod bitmap;
pub use bitmap::{Bitmap, Run};

mod inode;
pub use inode::{Inode, InodeTable};
