pub mod api;
pub mod apy;
pub mod batch;
pub mod cache;
pub mod chain;
pub mod config;
pub mod core;
pub mod errors;
pub mod logging;
pub mod metadata;
pub mod service;
pub mod types;

pub use apy::{ApyCalculator, ApyComputation};
pub use batch::{
    BatchEntry, BatchResponseAssembler, BatchResponseEnvelope, Page, PageMeta, QueryParams,
    RawQuery, ResourceRequest,
};
pub use cache::{CacheEntry, CacheKey, CacheState, Dataset, ResultCache};
pub use chain::{
    BittensorClient, ChainSnapshotProvider, Error as ChainError, MockSnapshotProvider,
    SubtensorSnapshotProvider,
};
pub use config::Config;
pub use errors::{ApyError, ApyResult};
pub use metadata::{InMemoryMetadataStore, JsonFileMetadataStore, MetadataStore};
pub use service::YieldService;

// Re-export logging module
pub use logging::{
    init_default_logging, init_logging, is_initialized, LineFormatter, LogFormat, LoggingConfig,
};

pub use types::*;
