//! Usage Logger + Worker (C5, spec.md §4.5): the durable handoff between
//! a finished request and its eventual credit deduction.
//!
//! The fast path ([`queue::LogQueue`]) never touches storage; the worker
//! ([`worker::Worker`]) drains it on its own cadence, sweeps unprocessed
//! rows into credit/usage deltas, and drives auto-top-up billing through
//! [`stripe::StripeClient`]. [`store::UsageStore`] is the seam: this
//! crate sits below `gateway-config` in the dependency order, so it
//! describes what it needs from storage as a trait rather than depending
//! on the concrete store.

pub mod fees;
pub mod queue;
pub mod store;
pub mod stripe;
pub mod worker;

pub use queue::LogQueue;
pub use store::UsageStore;
pub use stripe::{HttpStripeClient, StripeClient};
pub use worker::{Worker, WorkerConfig};
