//! Autonomous multi-role assessment campaign against a remote host.
//!
//! A proposer drafts a strategy of shell commands, a reviewer approves or
//! sends it back, the engine runs the approved commands over one SSH session
//! while a monitor decides when a command is waiting for input, failed
//! commands go through an error recovery sub-loop, and a reporter writes the
//! final findings report once the reviewer is satisfied. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (phase transitions, the command
//!   queue, conversation windows, output decoding). No I/O.
//! - **[`io`]**: Side-effecting operations (config, SSH sessions, the decision
//!   oracle, run artifacts). Isolated behind traits to enable scripted tests.
//!
//! Orchestration modules ([`workflow`], [`engine`], [`monitor`], [`recovery`])
//! coordinate core logic with I/O; [`agents`] backs every role with the oracle.

pub mod agents;
pub mod core;
pub mod engine;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod monitor;
pub mod recovery;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workflow;
