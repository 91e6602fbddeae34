//! # reposync-gateway
//!
//! Everything between a sync worker and the hosting provider.
//!
//! - [`Transport`] sends raw requests ([`UreqTransport`] over HTTPS)
//! - [`Gateway`] wraps a transport with shared rate-limit accounting,
//!   backoff and error classification
//! - [`HostingApi`] is the operation set the sync engine uses;
//!   [`GitHubClient`] implements it over a gateway

pub mod error;
pub mod gateway;
pub mod github;
pub mod hosting;
pub mod rate_limit;
pub mod retry;
pub mod transport;

pub use error::{ErrorClass, GatewayError};
pub use gateway::Gateway;
pub use github::GitHubClient;
pub use hosting::{
    Branch, FileWrite, HostingApi, PullRequest, PullRequestSpec, RemoteFile, TreeEntry,
};
pub use rate_limit::RateLimitState;
pub use retry::RetryPolicy;
pub use transport::{ApiRequest, ApiResponse, Method, Transport, TransportError, UreqTransport};
