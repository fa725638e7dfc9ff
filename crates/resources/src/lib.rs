#![forbid(unsafe_code)]

pub mod client;
pub mod config;
pub mod http;
pub mod memory;

pub use client::{Collection, Filter, ResourceClient, ResourceError, record_id};
pub use config::{ApiConfig, ApiConfigError};
pub use http::HttpResourceClient;
pub use memory::{Call, InMemoryResources, Operation};
