pub mod client_manager;
pub mod static_config;
