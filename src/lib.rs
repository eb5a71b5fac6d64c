mod client;
pub mod config;
pub mod discovery;
mod error;
mod fetch;
pub mod merge;
pub mod protocol;
pub mod sensors;
mod types;

pub use client::{
    Coordinator, CoordinatorBuilder, Resource, DEFAULT_SCAN_INTERVAL, SCHEDULE_FETCH_INTERVAL,
};
pub use config::Config;
pub use error::{Error, Result};
pub use fetch::{
    Fetcher, FetcherBuilder, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT, DEFAULT_USERNAME,
    RETRY_BACKOFF, RETRY_COUNT, RETRY_STATUS_CODES,
};
pub use types::*;
