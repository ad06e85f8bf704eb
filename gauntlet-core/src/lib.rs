//! `Gauntlet` core: shared domain types
//!
//! This crate provides the identity, attempt and eligibility types shared
//! between the session engine, the storage backends and the CLI.

pub mod attempt;
pub mod email;
pub mod error;

pub use attempt::{AttemptDetail, AttemptRecord, Eligibility, RETRY_WINDOW_HOURS};
pub use email::Email;
