use thiserror::Error;

use crate::io::DatasetPosition;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalError {
    /// A session without feature items cannot be scored.
    #[error("session at position {position} has {num_items} items, at least {required} are needed")]
    InvalidSession {
        position: DatasetPosition,
        num_items: usize,
        required: usize,
    },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("canonical set has {num_sessions} sessions but {num_positions} positions")]
    CanonicalMismatch {
        num_sessions: usize,
        num_positions: usize,
    },

    #[error("position {position} is outside of a dataset with {dataset_len} sessions")]
    PositionOutOfRange {
        position: DatasetPosition,
        dataset_len: usize,
    },
}
