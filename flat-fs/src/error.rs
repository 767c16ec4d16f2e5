//! flat-fs 各操作共用的错误类型

use enumflags2::BitFlags;
use thiserror::Error;

use crate::Damage;

#[derive(Error, Debug)]
pub enum Error {
    /// `format` 时后备文件已存在
    #[error("file system already exists")]
    AlreadyExists,

    /// 后备文件、源文件或存储的名字不存在
    #[error("{0} does not exist")]
    NotFound(String),

    #[error("file {0} is already in file system")]
    DuplicateName(String),

    #[error("no free inode left")]
    NoInodeSpace,

    /// 空闲块总数不足，或没有足够长的连续段
    #[error("not enough space for {required} contiguous data blocks")]
    NoSpace { required: u64 },

    #[error("name is {0} bytes long, the limit is {limit}", limit = crate::NAME_MAX_LEN)]
    NameTooLong(usize),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// 后备文件不是合法的 flat-fs 镜像
    #[error("corrupted file system: {0}")]
    Corrupted(String),

    /// 被中断的更新使元数据彼此不一致
    #[error("inconsistent file system: {0:?}")]
    Inconsistent(BitFlags<Damage>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] binrw::Error),
}

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(
            Error::DuplicateName("a.txt".into()).to_string(),
            "file a.txt is already in file system"
        );
        assert_eq!(
            Error::NameTooLong(200).to_string(),
            "name is 200 bytes long, the limit is 128"
        );
        assert!(
            Error::NoSpace { required: 3 }
                .to_string()
                .contains("3 contiguous")
        );
    }

    #[test]
    fn io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
