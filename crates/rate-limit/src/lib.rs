//! Request admission for Lookout.
//!
//! This crate provides:
//! - A sliding-window event counter keyed by rate key
//! - The admission gate applying the burst and upload windows to every request
//! - The quota enforcer checking persisted upload history of authenticated users
//!
//! Window state is process-local. Running several instances multiplies the
//! effective burst and upload limits; quotas stay exact because they are
//! recomputed from the shared store.

#![deny(missing_docs)]

mod error;
mod gate;
mod quota;
mod request;
mod window;

pub use error::{QuotaError, RateLimitError};
pub use gate::{Admission, AdmissionGate, BURST_WINDOW, RESET_HINT_SECS, UPLOAD_WINDOW};
pub use quota::{QuotaEnforcer, month_start};
pub use request::{AdmissionRequest, AdmissionRequestBuilder, RouteClass};
pub use window::{Acquire, WindowCounter};
