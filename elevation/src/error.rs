use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ElevationError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("invalid tile block len {0} for {1}")]
    BlockLen(u64, PathBuf),

    #[error("misaligned tile block {0}")]
    BlockAlign(PathBuf),

    #[error("invalid grid len {0}, expected {1}")]
    GridLen(usize, usize),

    #[error("invalid source name {0}")]
    SourceName(PathBuf),

    #[error("invalid source file len {0} for {1}")]
    SourceLen(u64, PathBuf),

    #[error("cache location {0} is not a directory")]
    CacheDir(PathBuf),

    #[error("no elevation tiles could be loaded")]
    NoTiles,
}
