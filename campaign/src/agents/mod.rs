//! Oracle-backed roles.
//!
//! [`Agents`] owns the conversation store and the audit log and answers every
//! role seam the workflow and the engine call into. Each exchange follows the
//! same path: render the payload, window the history, ask the oracle, record
//! both turns, stamp a global sequence number and persist the audit entry.

use anyhow::Result;
use tracing::debug;

use crate::core::conversation::{ConversationStore, Turn};
use crate::core::types::Brief;
use crate::io::audit::AuditLog;
use crate::io::oracle::{DecisionOracle, OracleRequest};
use crate::io::run_context::RunContext;

pub mod advisors;
pub mod decision;
pub mod prompts;
pub mod strategy;

use decision::{Decision, parse_decision};
use prompts::{Operation, PromptEngine};

pub struct Agents<'r, O> {
    oracle: O,
    run: &'r RunContext,
    conversations: ConversationStore,
    audit: AuditLog,
    prompts: PromptEngine,
    brief: Brief,
    history_window: usize,
}

impl<'r, O: DecisionOracle> Agents<'r, O> {
    pub fn new(
        oracle: O,
        run: &'r RunContext,
        prompts: PromptEngine,
        brief: Brief,
        history_window: usize,
    ) -> Self {
        Self {
            oracle,
            audit: AuditLog::new(run.paths().clone()),
            run,
            conversations: ConversationStore::new(),
            prompts,
            brief,
            history_window,
        }
    }

    pub fn brief(&self) -> &Brief {
        &self.brief
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    /// One oracle exchange for `op`, returning the raw answer.
    fn ask(&mut self, op: Operation, user: String, structured: bool) -> Result<String> {
        let (owner, peer) = (op.owner(), op.peer());
        let instruction = self.prompts.instruction(op)?.to_string();
        let outbound =
            self.conversations
                .outbound(owner, peer, &instruction, &user, self.history_window);
        let request = OracleRequest::from_outbound(outbound, structured);
        let response = self.oracle.complete(&request)?;

        self.conversations.append_turn(owner, peer, Turn::user(user));
        self.conversations
            .append_turn(owner, peer, Turn::assistant(response.clone()));
        let order = self.run.next_sequence();
        let request_number = self
            .audit
            .record(owner, order, request.messages(), &response)?;
        debug!(op = op.key(), %owner, %peer, order, request_number, "oracle exchange recorded");
        Ok(response)
    }

    /// One structured exchange, validated and parsed into `T`.
    fn decide<T: Decision>(&mut self, op: Operation, user: String) -> Result<T> {
        let raw = self.ask(op, user, true)?;
        parse_decision(&raw)
    }
}
