//! # stipend-testkit
//!
//! Fixtures and generators for exercising stipend end to end:
//!
//! - [`TestFixture`] - a seeded engine over a [`FakeLedger`] (scripted
//!   submit/confirm failures) and a [`CountingStore`] (mutation
//!   counting, for the zero-writes-on-failure property)
//! - [`generators`] - proptest strategies
//!
//! The cross-crate integration suites live in this crate's `tests/`
//! directory.

pub mod fixtures;
pub mod generators;

pub use fixtures::{CountingStore, FailureMode, FakeLedger, TestFixture};
