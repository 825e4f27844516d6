#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Pooled hyper client used for tenant-scoped outbound calls.
//!
//! One [`PooledClient`] is built per tenant. It enforces total and per-route
//! connection caps, uses rustls with either the OS trust store or a PEM
//! bundle, and can relax hostname checks. Connect, read and pool-wait
//! timeouts surface as distinct [`HttpError`] variants. Redirects are not
//! followed.
//!
//! # Example
//!
//! ```ignore
//! use outbound_http::PooledClient;
//! use std::time::Duration;
//!
//! let client = PooledClient::builder()
//!     .connect_timeout(Duration::from_secs(5))
//!     .max_connections_per_route(20)
//!     .build()?;
//!
//! let response = client.get("https://svc.example.com/risk").send().await?;
//! if response.is_success() {
//!     let body: serde_json::Value = response.json()?;
//! }
//! ```

mod client;
mod config;
mod error;
mod request;
mod response;
mod timeout;
mod tls;

pub use client::{PooledClient, PooledClientBuilder};
pub use config::{
    DEFAULT_MAX_BODY_SIZE, DEFAULT_MAX_CONNECTIONS_PER_ROUTE, DEFAULT_MAX_TOTAL_CONNECTIONS,
    DEFAULT_TIMEOUT, HostnameVerification, PoolConfig, PooledClientConfig, TimeoutConfig,
    TransportSecurity, TrustStore,
};
pub use error::{HttpError, InvalidUriKind};
pub use request::RequestBuilder;
pub use response::PooledResponse;
