use crate::store::StoreError;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
