use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use crate::storage::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn weight(self) -> i8 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
        }
    }
}

/// The local user's votes, layered onto server-reported counts without ever
/// being written back to the backend.
#[derive(Clone)]
pub struct VoteOverlay {
    store: Arc<Store>,
}

impl VoteOverlay {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn get(&self, post_id: &str) -> Result<Option<i8>> {
        self.store.get_vote(post_id)
    }

    /// Toggle rule: voting the stored direction again clears the vote,
    /// anything else stores the new direction. Returns the state after the
    /// transition. Durable immediately.
    pub fn apply(&self, post_id: &str, direction: Direction) -> Result<Option<i8>> {
        let requested = direction.weight();
        let previous = self.store.get_vote(post_id)?;
        if previous == Some(requested) {
            self.store.clear_vote(post_id)?;
            Ok(None)
        } else {
            self.store.set_vote(post_id, requested)?;
            Ok(Some(requested))
        }
    }

    /// Snapshot of every stored vote, for projecting a whole feed without
    /// one query per row.
    pub fn snapshot(&self) -> Result<HashMap<String, i8>> {
        self.store.all_votes()
    }
}

/// Server count with the local overlay merged in.
pub fn adjusted(server_votes: i64, vote: Option<i8>) -> i64 {
    server_votes + i64::from(vote.unwrap_or(0))
}
