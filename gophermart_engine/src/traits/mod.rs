//! The behaviour contracts for engine backends.
//!
//! The pipeline and the HTTP surface only ever talk to these traits, so tests can substitute
//! mocks and the Postgres backend stays swappable.
mod accrual;
mod storage;

pub use accrual::AccrualSource;
#[cfg(test)]
pub use accrual::MockAccrualSource;
#[cfg(test)]
pub use storage::{MockAccountManagement, MockPipelineDatabase};
pub use storage::{AccountManagement, PipelineDatabase, SettleOutcome, StorageError};
