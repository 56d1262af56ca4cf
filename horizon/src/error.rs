use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HorizonError {
    #[error("missing required parameter {0}")]
    Builder(&'static str),

    #[error("invalid parameter {0}")]
    Param(&'static str),

    #[error("row {row} out of range for {buckets} buckets")]
    RowOutOfRange { row: usize, buckets: usize },

    #[error("no terrain visible at row {0}")]
    NoTerrain(usize),
}
