//! Reclaims upload files of sessions past the retention age.
//!
//! Session timestamps in the database decide what is expired. Only files that
//! resolve below the upload root are ever deleted, and the session records
//! themselves are kept.

#![deny(missing_docs)]

mod error;
mod mtime;
mod purge;
mod sweeper;

pub use error::SweepError;
pub use mtime::purge_by_mtime;
pub use purge::{BATCH_SIZE, cutoff, purge};
pub use sweeper::{RetentionSweeper, SWEEP_INTERVAL};
