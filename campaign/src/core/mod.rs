//! Deterministic, pure logic shared by the campaign.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod conversation;
pub mod decode;
pub mod errors;
pub mod phase;
pub mod prepare;
pub mod queue;
pub mod types;
