#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Outbound authenticated HTTP functions for adaptive authentication scripts.
//!
//! [`AuthFunctions`] exposes `http_get`, `http_post`, `call_choreo`,
//! `call_analytics` and `publish_to_analytics`. Every call runs through
//! [`RequestExecutor`] and ends in exactly one delivery to the caller's
//! [`AsyncResultSink`](auth_functions_sdk::AsyncResultSink).

pub mod config;
pub mod domain;
pub mod functions;
pub mod infra;

pub use config::{AuthFunctionsConfig, TenantHttpConfig};
pub use domain::allow_list::{DomainAllowList, parent_domain};
pub use domain::credentials::{ClientCredentialParams, CredentialContext, CredentialStrategy};
pub use domain::delivery::{Delivered, Delivery, OneshotSink};
pub use domain::executor::{Completion, RequestExecutor};
pub use domain::request::{OutboundCall, OutboundRequest, RequestBody, SuccessPolicy};
pub use domain::token_cache::{TokenCache, TokenKey};
pub use domain::token_fetcher::TokenFetcher;
pub use functions::AuthFunctions;
pub use infra::client_manager::HttpClientManager;
pub use infra::static_config::StaticTenantConfig;
