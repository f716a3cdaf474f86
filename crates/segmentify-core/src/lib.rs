//! Core types and trait definitions for Segmentify.
//!
//! Segments are named cohort labels. Users hold segments through a ledger of
//! memberships, and every add or remove committed to that ledger is mirrored
//! into an append-only history that can be exported per user and date range.
//!
//! This crate has no HTTP or database dependencies. Storage backends implement
//! [`store::SegmentStore`]; the HTTP layer talks only to that trait.

#![allow(async_fn_in_trait)]

pub mod clock;
pub mod error;
pub mod export;
pub mod history;
pub mod membership;
pub mod segment;
pub mod store;

pub use error::{Error, Result, Violation};
