//! Accrual service client
//!
//! The accrual service is the external system that decides how many loyalty points each order
//! earns. This crate owns the HTTP plumbing and the interpretation of its responses; it knows
//! nothing about storage or the reconciliation pipeline. The client performs no retries of its
//! own — a failed order is retried when the pipeline reclaims its lease on a later tick.
mod api;
mod config;
mod data_objects;
mod error;

pub use api::{AccrualApi, FetchResult};
pub use config::AccrualClientConfig;
pub use data_objects::{AccrualOrder, RemoteOrderStatus};
pub use error::AccrualApiError;
