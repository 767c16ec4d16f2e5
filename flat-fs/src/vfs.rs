//! # 文件操作层
//!
//! [`FlatFs`] 只记录后备文件的路径，每个操作都从头走一遍：
//! 打开并校验存储、完成工作、关闭存储。
//!
//! 操作期间后备文件一直持有系统文件锁：修改操作持排他锁，只读操作持共享锁。
//! 因此同一文件上的多个句柄、多个进程也会依次执行。

use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use enumflags2::BitFlags;

use crate::layout::Inode;
use crate::map::{self, Region};
use crate::{BlockDevice, BlockFile, Damage, Error, Geometry, Result, Volume, fsck};

/// [`FlatFs::list`] 列出的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub size: u64,
}

#[derive(Debug)]
pub struct FlatFs {
    path: PathBuf,
    /// 仅供 [`FlatFs::format`] 使用，其余操作以超级块为准
    geometry: Geometry,
}

impl FlatFs {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_geometry(path, Geometry::default())
    }

    pub fn with_geometry(path: impl Into<PathBuf>, geometry: Geometry) -> Self {
        Self {
            path: path.into(),
            geometry,
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 创建后备文件，并在其中布局一个空文件系统。
    pub fn format(&self) -> Result<()> {
        self.geometry.validate()?;
        let store_len = self.geometry.store_len()?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => Error::AlreadyExists,
                _ => Error::Io(e),
            })?;

        let formatted = file
            .lock()
            .and_then(|()| file.set_len(store_len))
            .map_err(Error::from)
            .and_then(|()| Volume::format(Arc::new(BlockFile::new(file)), &self.geometry));
        if let Err(e) = formatted {
            // 不留下写了一半的存储
            let _ = fs::remove_file(&self.path);
            return Err(e);
        }

        log::info!(
            "formatted {} with {:?} ({store_len} bytes)",
            self.path.display(),
            self.geometry
        );
        Ok(())
    }

    /// 删除后备文件，等待正在进行的操作结束后才删除。
    pub fn remove(&self) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| not_found(&self.path, e))?;
        file.lock()?;
        fs::remove_file(&self.path).map_err(|e| not_found(&self.path, e))?;
        drop(file);

        log::info!("removed {}", self.path.display());
        Ok(())
    }

    /// 从 `source` 读取 `size` 字节，以 `name` 存入。
    ///
    /// 所有检查都在存储被标记为脏之前完成，检查失败时存储原样不动。
    pub fn import(&self, name: &str, source: &mut dyn Read, size: u64) -> Result<()> {
        let mut volume = self.mount(true)?;
        let device = volume.device().clone();

        if volume.super_block().free_inode_count == 0 {
            return Err(Error::NoInodeSpace);
        }
        let mut inode_bitmap = volume.inode_bitmap()?;
        if volume
            .inode_table()
            .lookup(&*device, &inode_bitmap, name)?
            .is_some()
        {
            return Err(Error::DuplicateName(name.to_owned()));
        }
        let mut inode = Inode::new(name, size, 0)?;

        let required = volume.geometry().blocks_for(size);
        if (volume.super_block().free_data_count as u64) < required {
            return Err(Error::NoSpace { required });
        }
        let mut data_bitmap = volume.data_bitmap()?;
        let first_block = data_bitmap
            .first_free_run(required)
            .ok_or(Error::NoSpace { required })?;
        let slot = inode_bitmap.first_free().ok_or(Error::NoInodeSpace)?;
        // 能放进数据区的段，其长度必在 u32 之内
        let end = first_block + required as u32;
        log::debug!("{name}: slot {slot}, blocks {first_block}..{end}");

        volume.begin()?;
        volume.copy_in(first_block, source, size)?;
        inode.first_block = first_block;
        volume.inode_table().insert(&*device, slot, &inode)?;
        data_bitmap.set_range(&*device, first_block..end)?;
        inode_bitmap.set_range(&*device, slot..slot + 1)?;

        let super_block = volume.super_block_mut();
        super_block.free_inode_count -= 1;
        super_block.free_data_count -= required as u32;
        volume.commit()?;

        log::info!("imported {name} ({size} bytes)");
        Ok(())
    }

    /// 以宿主机文件自身的文件名存入该文件。
    pub fn import_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .ok_or_else(|| Error::NotFound(path.display().to_string()))?
            .to_str()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "file name is not valid UTF-8")
            })?;

        let mut source = File::open(path).map_err(|e| not_found(path, e))?;
        let metadata = source.metadata()?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            )
            .into());
        }

        self.import(name, &mut source, metadata.len())
    }

    /// 将 `name` 的内容写入 `sink`。
    pub fn export(&self, name: &str, sink: &mut dyn Write) -> Result<()> {
        let volume = self.mount(false)?;
        let (_, inode) = Self::find(&volume, name)?;
        Self::run_end(&volume, &inode)?;

        volume.copy_out(inode.first_block, sink, inode.size)
    }

    /// 将 `name` 的内容写入 `dir/copy_<name>`，覆盖已有文件，返回写入的路径。
    ///
    /// `copy_<name>` 必须是 `dir` 下的单个文件名，
    /// 含路径分隔符的名字无法导出。
    pub fn export_to(&self, name: &str, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let volume = self.mount(false)?;
        let (_, inode) = Self::find(&volume, name)?;
        Self::run_end(&volume, &inode)?;

        let file_name = format!("copy_{name}");
        if Path::new(&file_name).file_name() != Some(OsStr::new(&file_name)) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{name:?} is not a single host file name"),
            )
            .into());
        }

        let target = dir.as_ref().join(file_name);
        let mut sink = File::create(&target)?;
        volume.copy_out(inode.first_block, &mut sink, inode.size)?;

        log::info!("exported {name} to {}", target.display());
        Ok(target)
    }

    /// 删除 `name`，释放其 inode 槽位与数据块。
    pub fn delete(&self, name: &str) -> Result<()> {
        let mut volume = self.mount(true)?;
        let (slot, inode) = Self::find(&volume, name)?;
        let end = Self::run_end(&volume, &inode)?;
        let blocks = end - inode.first_block;
        let device = volume.device().clone();

        volume.begin()?;
        volume.inode_table().erase(&*device, slot)?;
        volume.inode_bitmap()?.clear_range(&*device, slot..slot + 1)?;
        volume
            .data_bitmap()?
            .clear_range(&*device, inode.first_block..end)?;

        let super_block = volume.super_block_mut();
        super_block.free_inode_count = super_block.free_inode_count.saturating_add(1);
        super_block.free_data_count = super_block.free_data_count.saturating_add(blocks);
        volume.commit()?;

        log::info!("deleted {name}, released {blocks} blocks from {}", inode.first_block);
        Ok(())
    }

    /// 按槽位顺序列出文件
    pub fn list(&self) -> Result<Vec<Entry>> {
        let volume = self.mount(false)?;
        let inode_bitmap = volume.inode_bitmap()?;

        Ok(volume
            .inode_table()
            .live(&**volume.device(), &inode_bitmap)?
            .into_iter()
            .map(|(_, inode)| Entry {
                name: inode.name().to_owned(),
                size: inode.size,
            })
            .collect())
    }

    /// 先是各元数据区域，再是数据区中空闲与占用的连续段。
    pub fn map(&self) -> Result<Vec<Region>> {
        let volume = self.mount(false)?;
        map::regions(&volume)
    }

    /// 交叉校验计数器、位图与 inode 记录，脏存储上同样可用。
    pub fn check(&self) -> Result<BitFlags<Damage>> {
        let (device, store_len) = self.open(false)?;
        let volume = Volume::load(device, store_len)?;
        fsck::check(&volume)
    }
}

impl FlatFs {
    /// 打开后备文件并加锁，锁随文件关闭而释放。
    fn open(&self, writable: bool) -> Result<(Arc<dyn BlockDevice>, u64)> {
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(&self.path)
            .map_err(|e| not_found(&self.path, e))?;
        if writable {
            file.lock()?;
        } else {
            file.lock_shared()?;
        }

        let device = BlockFile::new(file);
        let store_len = device.size()?;

        Ok((Arc::new(device), store_len))
    }

    fn mount(&self, writable: bool) -> Result<Volume> {
        let (device, store_len) = self.open(writable)?;
        Volume::mount(device, store_len)
    }

    fn find(volume: &Volume, name: &str) -> Result<(u32, Inode)> {
        let inode_bitmap = volume.inode_bitmap()?;
        volume
            .inode_table()
            .lookup(&**volume.device(), &inode_bitmap, name)?
            .ok_or_else(|| Error::NotFound(name.to_owned()))
    }

    /// `inode` 所占连续段的末尾，越出数据区视为损坏
    fn run_end(volume: &Volume, inode: &Inode) -> Result<u32> {
        let end = inode.first_block as u64 + volume.geometry().blocks_for(inode.size);
        if end > volume.super_block().data_block_count as u64 {
            return Err(Error::Corrupted(format!(
                "{} runs past the data area",
                inode.name()
            )));
        }
        Ok(end as u32)
    }
}

fn not_found(path: &Path, e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
        _ => Error::Io(e),
    }
}
