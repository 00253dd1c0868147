//! Admission & Policy (C1, spec.md §4.1): body validation, bearer auth,
//! entity loading, header normalisation, and the policy checks that gate
//! a request before it reaches the router.

pub mod auth;
pub mod checks;
pub mod context;
pub mod headers;

pub use auth::{authenticate, AdmissionStore, Identity};
pub use context::RequestContext;
