//! Data provider integration: wire types, HTTP transport, and the
//! paginated request executor

pub mod client;
pub mod executor;
pub mod types;

pub use client::{HttpTransport, ProviderTransport};
pub use executor::{PageOptions, PaginatedExecutor};
pub use types::{
    ProviderCredentials, ProviderResponse, ProviderTask, SearchRequest, TaskResult, STATUS_OK,
};
