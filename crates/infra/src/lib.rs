//! Infrastructure layer: store backends and their configuration.

pub mod config;
pub mod store;

mod integration_tests;

pub use config::{ConfigError, PostgresConfig, StoreBackend, StoreConfig};
pub use store::{
    CommerceStore, CommerceTransaction, InMemoryCommerceStore, InMemoryTransaction,
    PostgresCommerceStore, PostgresTransaction,
};
