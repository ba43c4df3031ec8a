//! Per-pair conversation history used to build oracle requests.
//!
//! Each `(self, peer)` slot starts with one seed system turn. The persisted
//! history is unbounded; outbound requests see only a bounded window of it,
//! with the seed replaced by the operation's own instruction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// Turns sent to the oracle for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub instruction: String,
    pub history: Vec<Turn>,
    pub user: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    contexts: BTreeMap<(Role, Role), Vec<Turn>>,
}

pub fn seed_turn(owner: Role, peer: Role) -> Turn {
    Turn::system(format!(
        "You are {owner}, an AI agent. You are communicating with {peer}."
    ))
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the history for `(owner, peer)`, seeding it on first use.
    pub fn get_or_create(&mut self, owner: Role, peer: Role) -> &[Turn] {
        self.contexts
            .entry((owner, peer))
            .or_insert_with(|| vec![seed_turn(owner, peer)])
    }

    pub fn append_turn(&mut self, owner: Role, peer: Role, turn: Turn) {
        self.contexts
            .entry((owner, peer))
            .or_insert_with(|| vec![seed_turn(owner, peer)])
            .push(turn);
    }

    /// Build the outbound request: instruction, the last `window` non-seed
    /// turns, then the new user turn. The store itself is not modified.
    pub fn outbound(
        &mut self,
        owner: Role,
        peer: Role,
        instruction: &str,
        user: &str,
        window: usize,
    ) -> Outbound {
        let turns = self.get_or_create(owner, peer);
        let exchanged = &turns[1..];
        let start = exchanged.len().saturating_sub(window);
        Outbound {
            instruction: instruction.to_string(),
            history: exchanged[start..].to_vec(),
            user: user.to_string(),
        }
    }

    /// Full persisted history for a pair (empty if never used).
    pub fn history(&self, owner: Role, peer: Role) -> &[Turn] {
        self.contexts
            .get(&(owner, peer))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding_is_idempotent() {
        let mut first = ConversationStore::new();
        let mut second = ConversationStore::new();

        let a = first.get_or_create(Role::Proposer, Role::Reviewer).to_vec();
        let b = second.get_or_create(Role::Proposer, Role::Reviewer).to_vec();
        let again = first.get_or_create(Role::Proposer, Role::Reviewer).to_vec();

        assert_eq!(a, b);
        assert_eq!(a, again);
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].role, TurnRole::System);
        assert_eq!(
            a[0].content,
            "You are proposer, an AI agent. You are communicating with reviewer."
        );
    }

    #[test]
    fn pairs_are_independent() {
        let mut store = ConversationStore::new();
        store.append_turn(Role::Reviewer, Role::Proposer, Turn::user("review this"));

        assert_eq!(store.history(Role::Reviewer, Role::Proposer).len(), 2);
        assert!(store.history(Role::Reviewer, Role::Reporter).is_empty());
    }

    #[test]
    fn outbound_replaces_seed_and_bounds_window() {
        let mut store = ConversationStore::new();
        for i in 0..30 {
            store.append_turn(Role::Monitor, Role::Executor, Turn::user(format!("u{i}")));
        }

        let outbound = store.outbound(Role::Monitor, Role::Executor, "classify", "now", 20);

        assert_eq!(outbound.instruction, "classify");
        assert_eq!(outbound.history.len(), 20);
        assert_eq!(outbound.history[0].content, "u10");
        assert_eq!(outbound.history[19].content, "u29");
        assert!(outbound.history.iter().all(|t| t.role != TurnRole::System));
        assert_eq!(outbound.user, "now");
        // Persisted history keeps everything.
        assert_eq!(store.history(Role::Monitor, Role::Executor).len(), 31);
    }

    #[test]
    fn outbound_on_fresh_pair_has_no_history() {
        let mut store = ConversationStore::new();
        let outbound = store.outbound(Role::Recovery, Role::Executor, "fix", "error", 20);
        assert!(outbound.history.is_empty());
    }
}
