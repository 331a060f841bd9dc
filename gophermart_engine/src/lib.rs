//! Gophermart loyalty engine
//!
//! The engine owns everything between the HTTP surface and the database:
//! 1. Storage management. The Postgres backend lives in [`pg`]; you should never need to touch it
//!    directly. Use the traits in [`traits`] and the public API types instead. The exception is
//!    the data types, which are defined in [`db_types`] and are public.
//! 2. The balance actualization pipeline in [`actualizer`]: the periodic reconciliation loop that
//!    claims unprocessed orders, asks the accrual service for verdicts, and credits user
//!    balances under transactional guarantees.
//! 3. The user-facing order flow in [`order_flow`], a thin transactional API the HTTP handlers
//!    call into.
//!
//! Errors raised inside the pipeline never cross stage boundaries as panics or early returns;
//! they ride along with the order record and end up in a bounded [`events::ErrorSink`] which is
//! advisory only.
pub mod actualizer;
pub mod db_types;
pub mod events;
mod order_flow;
mod pg;
pub mod traits;

pub use order_flow::{OrderFlowApi, OrderFlowError};
pub use pg::db::PgDatabase;
