pub mod allow_list;
pub mod credentials;
pub mod delivery;
pub mod executor;
pub mod request;
pub mod token_cache;
pub mod token_fetcher;
