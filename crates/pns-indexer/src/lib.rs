mod error;
pub use error::IndexerError;

mod config;
pub use config::Config;

mod dispatch;
pub use dispatch::{
    Indexer,
    IndexerCfg,
};

mod metrics;

pub mod store;
pub use store::{
    DomainStore,
    SideLogEntry,
    StoreError,
};
