//! Per-conversation message log with capacity and age eviction, plus
//! full-snapshot persistence.

use crate::error::{AssistantError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Appended, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Lightweight per-conversation statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub message_count: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    conversations: HashMap<String, Vec<ConversationMessage>>,
    saved_at: DateTime<Utc>,
}

pub struct ConversationMemory {
    conversations: HashMap<String, VecDeque<ConversationMessage>>,
    max_messages: usize,
}

impl ConversationMemory {
    pub fn new(max_messages: usize) -> Self {
        Self {
            conversations: HashMap::new(),
            max_messages: max_messages.max(1),
        }
    }

    /// Append a message. Oldest messages are evicted first once the
    /// per-conversation cap is reached.
    pub fn add_message(&mut self, conversation_id: &str, role: Role, content: impl Into<String>) {
        let history = self
            .conversations
            .entry(conversation_id.to_string())
            .or_default();
        history.push_back(ConversationMessage {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
        while history.len() > self.max_messages {
            history.pop_front();
        }
        debug!(conversation_id, role = role.as_str(), "message appended");
    }

    /// History in insertion order, most-recent-last. `limit` keeps only
    /// the trailing messages.
    pub fn get_history(&self, conversation_id: &str, limit: Option<usize>) -> Vec<ConversationMessage> {
        let history = match self.conversations.get(conversation_id) {
            Some(h) => h,
            None => return Vec::new(),
        };
        let skip = limit.map_or(0, |l| history.len().saturating_sub(l));
        history.iter().skip(skip).cloned().collect()
    }

    pub fn last_message(&self, conversation_id: &str, role: Option<Role>) -> Option<&ConversationMessage> {
        let history = self.conversations.get(conversation_id)?;
        match role {
            None => history.back(),
            Some(role) => history.iter().rev().find(|m| m.role == role),
        }
    }

    /// Drop messages older than `max_age` and conversations left empty.
    pub fn sweep_expired(&mut self, max_age: Duration, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero());
        for history in self.conversations.values_mut() {
            while history.front().is_some_and(|m| m.timestamp < cutoff) {
                history.pop_front();
            }
        }
        self.conversations.retain(|_, h| !h.is_empty());
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    /// Statistics for one conversation, `None` if it has no messages.
    pub fn summary(&self, conversation_id: &str) -> Option<ConversationSummary> {
        let history = self.conversations.get(conversation_id)?;
        let first = history.front()?;
        let last = history.back()?;
        Some(ConversationSummary {
            message_count: history.len(),
            user_messages: history.iter().filter(|m| m.role == Role::User).count(),
            assistant_messages: history.iter().filter(|m| m.role == Role::Assistant).count(),
            started_at: first.timestamp,
            last_activity: last.timestamp,
        })
    }

    /// Serialize all conversations to `path` as one JSON snapshot.
    pub fn save_state(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = Snapshot {
            conversations: self
                .conversations
                .iter()
                .map(|(id, h)| (id.clone(), h.iter().cloned().collect()))
                .collect(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string(&snapshot)?;
        std::fs::write(path.as_ref(), json)?;
        info!(
            path = %path.as_ref().display(),
            conversations = snapshot.conversations.len(),
            "conversation state saved"
        );
        Ok(())
    }

    /// Restore from a snapshot. A corrupt snapshot fails closed: memory is
    /// left empty and the error is surfaced, never a partial restore.
    pub fn load_state(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.conversations.clear();
        let content = std::fs::read_to_string(path.as_ref())?;
        let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| {
            error!(path = %path.as_ref().display(), error = %e, "corrupt memory snapshot");
            AssistantError::Memory(format!("corrupt snapshot: {}", e))
        })?;
        for (id, messages) in snapshot.conversations {
            let mut history: VecDeque<_> = messages.into();
            while history.len() > self.max_messages {
                history.pop_front();
            }
            self.conversations.insert(id, history);
        }
        info!(
            path = %path.as_ref().display(),
            conversations = self.conversations.len(),
            "conversation state loaded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_first() {
        let mut memory = ConversationMemory::new(3);
        for i in 0..5 {
            memory.add_message("c1", Role::User, format!("m{}", i));
        }
        let history = memory.get_history("c1", None);
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn history_limit_keeps_trailing_messages() {
        let mut memory = ConversationMemory::new(10);
        memory.add_message("c1", Role::User, "first");
        memory.add_message("c1", Role::Assistant, "second");
        memory.add_message("c1", Role::User, "third");
        let history = memory.get_history("c1", Some(2));
        assert_eq!(history[0].content, "second");
        assert_eq!(history[1].content, "third");
    }

    #[test]
    fn last_message_filters_by_role() {
        let mut memory = ConversationMemory::new(10);
        memory.add_message("c1", Role::User, "question");
        memory.add_message("c1", Role::Assistant, "answer");
        memory.add_message("c1", Role::User, "follow-up");
        assert_eq!(
            memory.last_message("c1", Some(Role::Assistant)).unwrap().content,
            "answer"
        );
        assert_eq!(memory.last_message("c1", None).unwrap().content, "follow-up");
    }

    #[test]
    fn summary_counts_messages_by_role() {
        let mut memory = ConversationMemory::new(10);
        memory.add_message("c1", Role::User, "question");
        memory.add_message("c1", Role::Assistant, "answer");
        memory.add_message("c1", Role::User, "follow-up");

        let summary = memory.summary("c1").unwrap();
        assert_eq!(summary.message_count, 3);
        assert_eq!(summary.user_messages, 2);
        assert_eq!(summary.assistant_messages, 1);
        assert!(summary.started_at <= summary.last_activity);

        assert!(memory.summary("missing").is_none());
    }

    #[test]
    fn sweep_drops_expired_conversations() {
        let mut memory = ConversationMemory::new(10);
        memory.add_message("c1", Role::User, "old");
        // Everything is newer than a day; sweep with zero age drops it all.
        memory.sweep_expired(Duration::from_secs(0), Utc::now() + chrono::Duration::hours(1));
        assert_eq!(memory.conversation_count(), 0);
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");

        let mut memory = ConversationMemory::new(10);
        memory.add_message("c1", Role::User, "hello");
        memory.add_message("c1", Role::Assistant, "hi there");
        memory.save_state(&path).unwrap();

        let mut restored = ConversationMemory::new(10);
        restored.load_state(&path).unwrap();
        let history = restored.get_history("c1", None);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "hi there");
    }

    #[test]
    fn corrupt_snapshot_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        std::fs::write(&path, "{not json").unwrap();

        let mut memory = ConversationMemory::new(10);
        memory.add_message("c1", Role::User, "pre-existing");
        let err = memory.load_state(&path).unwrap_err();
        assert!(matches!(err, AssistantError::Memory(_)));
        assert_eq!(memory.conversation_count(), 0);
    }
}
