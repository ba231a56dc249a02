//! # LeasePool Core
//!
//! Core types shared by the LeasePool storage, coordinator and server
//! crates.
//!
//! ## Key Types
//!
//! - [`Account`]: A pooled worker identity and its reported state
//! - [`UpdatePatch`] / [`AccountChanges`]: Sparse updates and their typed form
//! - [`AccountEvent`]: Append-only audit record of lifecycle transitions
//! - [`AccountFilter`]: Eligibility predicate used for selection and scans
//! - [`LeaseRequest`] / [`LeaseRecord`]: Lease parameters and the handed-out projection
//! - [`Clock`]: Time abstraction for testability

pub mod account;
pub mod clock;
pub mod error;
pub mod event;
pub mod filter;
pub mod lease;
pub mod patch;

// Re-export main types
pub use account::*;
pub use clock::*;
pub use error::*;
pub use event::*;
pub use filter::*;
pub use lease::*;
pub use patch::*;
