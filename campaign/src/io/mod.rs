//! Side effects: config files, run artifacts, the oracle and remote sessions.

pub mod atomic;
pub mod audit;
pub mod config;
pub mod findings;
pub mod oracle;
pub mod process;
pub mod run_context;
pub mod session;
