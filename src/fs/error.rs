//! Closed filesystem-layer error taxonomy.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("invalid filename")]
    InvalidFilename,
    #[error("file not found")]
    FileNotFound,
    #[error("file exists and is read-only")]
    FileExistsReadonly,
    #[error("wrong permissions")]
    WrongPermissions,
    #[error("file already write-locked")]
    AlreadyWriteLocked,
    #[error("no empty blocks")]
    NoEmptyBlocks,
    #[error("fd out of range")]
    FdOutOfRange,
    #[error("fd not in table")]
    FdNotInTable,
    #[error("special fd")]
    SpecialFd,
    #[error("seek would overflow or go negative")]
    SeekOutOfRange,
    #[error("bad whence")]
    BadWhence,
    #[error("bad mode")]
    BadMode,
    #[error("read failed")]
    ReadFailed,
    #[error("write failed")]
    WriteFailed,
}

impl FsError {
    /// The negative-integer wire code stashed in `Pcb::errnumber`.
    pub fn errno_code(&self) -> i32 {
        match self {
            FsError::InvalidFilename => -100,
            FsError::FileNotFound => -101,
            FsError::FileExistsReadonly => -102,
            FsError::WrongPermissions => -103,
            FsError::AlreadyWriteLocked => -104,
            FsError::NoEmptyBlocks => -105,
            FsError::FdOutOfRange => -106,
            FsError::FdNotInTable => -107,
            FsError::SpecialFd => -108,
            FsError::SeekOutOfRange => -109,
            FsError::BadWhence => -110,
            FsError::BadMode => -111,
            FsError::ReadFailed => -112,
            FsError::WriteFailed => -113,
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;
