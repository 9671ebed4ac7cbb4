//! Undo/redo history keyed by topic.
//!
//! Each topic (one per layer, e.g. `canvas/mask`) owns an undo/redo stack pair
//! of payload snapshots. On top of that the manager keeps a chronological log
//! of [`HistoryRecord`]s across all topics: it decides *which* topic the
//! global undo (the `canvas/line` topic, Ctrl+Z) acts on next, while the
//! per-topic stacks hold the actual states.
//!
//! The log and the stacks stay depth-consistent: for every topic, the number
//! of undo (redo) log entries equals the depth of its undo (redo) stack.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::{LINE_TOPIC, MAX_HISTORY};

/// A lightweight history event: which topic changed and a display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub topic: String,
    pub label: String,
}

#[derive(Debug, Clone)]
struct Entry<S> {
    label: String,
    state: S,
}

#[derive(Debug, Clone)]
struct TopicStacks<S> {
    undo: Vec<Entry<S>>,
    redo: Vec<Entry<S>>,
}

impl<S> Default for TopicStacks<S> {
    fn default() -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
        }
    }
}

/// Per-topic undo/redo stacks plus the cross-topic chronological log.
#[derive(Debug, Clone)]
pub struct HistoryManager<S> {
    topics: HashMap<String, TopicStacks<S>>,
    /// Committed steps, oldest first
    undo_log: Vec<HistoryRecord>,
    /// Undone steps, most recently undone last
    redo_log: Vec<HistoryRecord>,
    /// Maximum undo depth per topic
    max_history: usize,
}

impl<S> Default for HistoryManager<S> {
    fn default() -> Self {
        Self::new(MAX_HISTORY)
    }
}

impl<S> HistoryManager<S> {
    pub fn new(max_history: usize) -> Self {
        Self {
            topics: HashMap::new(),
            undo_log: Vec::new(),
            redo_log: Vec::new(),
            max_history: max_history.max(1),
        }
    }

    /// Record the pre-mutation state of `topic`.
    ///
    /// Clears the topic's redo stack. One call is one undo step.
    pub fn commit(&mut self, topic: &str, label: &str, before: S) -> HistoryRecord {
        let stacks = self.topics.entry(topic.to_string()).or_default();
        stacks.undo.push(Entry {
            label: label.to_string(),
            state: before,
        });
        stacks.redo.clear();
        let trimmed = stacks.undo.len() > self.max_history;
        if trimmed {
            stacks.undo.remove(0);
        }

        self.redo_log.retain(|r| r.topic != topic);
        if trimmed {
            if let Some(index) = self.undo_log.iter().position(|r| r.topic == topic) {
                self.undo_log.remove(index);
            }
        }

        let record = HistoryRecord {
            topic: topic.to_string(),
            label: label.to_string(),
        };
        self.undo_log.push(record.clone());
        log::debug!("History: committed '{}' on {}", label, topic);
        record
    }

    /// The topic a global undo on `topic` acts on.
    ///
    /// [`LINE_TOPIC`] resolves to the most recent committed step; any other
    /// topic resolves to itself if it has something to undo.
    pub fn undo_target(&self, topic: &str) -> Option<&str> {
        if topic == LINE_TOPIC {
            self.undo_log.last().map(|r| r.topic.as_str())
        } else {
            self.topics
                .get_key_value(topic)
                .filter(|(_, s)| !s.undo.is_empty())
                .map(|(k, _)| k.as_str())
        }
    }

    /// The topic a global redo on `topic` acts on.
    pub fn redo_target(&self, topic: &str) -> Option<&str> {
        if topic == LINE_TOPIC {
            self.redo_log.last().map(|r| r.topic.as_str())
        } else {
            self.topics
                .get_key_value(topic)
                .filter(|(_, s)| !s.redo.is_empty())
                .map(|(k, _)| k.as_str())
        }
    }

    /// Step `topic` back. `current` is stored for redo; the returned state
    /// becomes current. None (no-op) when the topic has nothing to undo.
    pub fn undo(&mut self, topic: &str, current: S) -> Option<S> {
        let stacks = self.topics.get_mut(topic)?;
        let entry = stacks.undo.pop()?;
        stacks.redo.push(Entry {
            label: entry.label.clone(),
            state: current,
        });
        if let Some(index) = self.undo_log.iter().rposition(|r| r.topic == topic) {
            let record = self.undo_log.remove(index);
            self.redo_log.push(record);
        }
        log::debug!("History: undid '{}' on {}", entry.label, topic);
        Some(entry.state)
    }

    /// Mirror of [`HistoryManager::undo`].
    pub fn redo(&mut self, topic: &str, current: S) -> Option<S> {
        let stacks = self.topics.get_mut(topic)?;
        let entry = stacks.redo.pop()?;
        stacks.undo.push(Entry {
            label: entry.label.clone(),
            state: current,
        });
        if let Some(index) = self.redo_log.iter().rposition(|r| r.topic == topic) {
            let record = self.redo_log.remove(index);
            self.undo_log.push(record);
        }
        log::debug!("History: redid '{}' on {}", entry.label, topic);
        Some(entry.state)
    }

    /// Discard a topic's stacks and its log entries (layer removed).
    pub fn remove_topic(&mut self, topic: &str) {
        if self.topics.remove(topic).is_some() {
            log::debug!("History: dropped topic {}", topic);
        }
        self.undo_log.retain(|r| r.topic != topic);
        self.redo_log.retain(|r| r.topic != topic);
    }

    pub fn clear(&mut self) {
        self.topics.clear();
        self.undo_log.clear();
        self.redo_log.clear();
        log::debug!("History cleared");
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_log.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_log.is_empty()
    }

    pub fn can_undo_topic(&self, topic: &str) -> bool {
        self.undo_target(topic).is_some()
    }

    pub fn can_redo_topic(&self, topic: &str) -> bool {
        self.redo_target(topic).is_some()
    }

    /// Label of the step a global undo would revert.
    pub fn undo_label(&self) -> Option<&str> {
        self.undo_log.last().map(|r| r.label.as_str())
    }

    /// Label of the step a global redo would reapply.
    pub fn redo_label(&self) -> Option<&str> {
        self.redo_log.last().map(|r| r.label.as_str())
    }

    pub fn undo_depth(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |s| s.undo.len())
    }

    pub fn redo_depth(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |s| s.redo.len())
    }

    /// Committed steps, oldest first.
    pub fn records(&self) -> &[HistoryRecord] {
        &self.undo_log
    }

    /// Whether every log entry has exactly one matching payload.
    pub fn is_consistent(&self) -> bool {
        let count =
            |log: &[HistoryRecord], topic: &str| log.iter().filter(|r| r.topic == topic).count();
        let known = |log: &[HistoryRecord]| log.iter().all(|r| self.topics.contains_key(&r.topic));
        known(&self.undo_log)
            && known(&self.redo_log)
            && self.topics.iter().all(|(topic, s)| {
                count(&self.undo_log, topic.as_str()) == s.undo.len()
                    && count(&self.redo_log, topic.as_str()) == s.redo.len()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASK: &str = "canvas/mask";
    const SKETCH: &str = "canvas/sketch:0";

    #[test]
    fn test_commit_undo_redo_roundtrip() {
        let mut history = HistoryManager::new(10);
        let mut state = vec![1];

        history.commit(MASK, "Brush stroke", state.clone());
        state.push(2);

        state = history.undo(MASK, state).expect("undo");
        assert_eq!(state, vec![1]);
        state = history.redo(MASK, state).expect("redo");
        assert_eq!(state, vec![1, 2]);
        assert!(history.is_consistent());
    }

    #[test]
    fn test_stale_topic_is_noop() {
        let mut history: HistoryManager<u32> = HistoryManager::new(10);
        assert!(history.undo(MASK, 0).is_none());
        assert!(history.redo(MASK, 0).is_none());
        assert!(history.undo_target(LINE_TOPIC).is_none());
        assert!(!history.can_undo());
    }

    #[test]
    fn test_commit_clears_topic_redo_only() {
        let mut history = HistoryManager::new(10);
        history.commit(MASK, "a", 0);
        history.commit(SKETCH, "b", 10);
        history.undo(MASK, 1);
        history.undo(SKETCH, 11);
        assert_eq!(history.redo_depth(MASK), 1);
        assert_eq!(history.redo_depth(SKETCH), 1);

        history.commit(MASK, "c", 0);
        assert_eq!(history.redo_depth(MASK), 0);
        assert_eq!(history.redo_depth(SKETCH), 1);
        assert_eq!(history.redo_target(LINE_TOPIC), Some(SKETCH));
        assert!(history.is_consistent());
    }

    #[test]
    fn test_line_topic_follows_chronology() {
        let mut history = HistoryManager::new(10);
        history.commit(MASK, "mask 1", 0);
        history.commit(SKETCH, "sketch 1", 100);
        history.commit(MASK, "mask 2", 1);

        assert_eq!(history.undo_target(LINE_TOPIC), Some(MASK));
        history.undo(MASK, 2);
        assert_eq!(history.undo_target(LINE_TOPIC), Some(SKETCH));
        history.undo(SKETCH, 101);
        assert_eq!(history.undo_target(LINE_TOPIC), Some(MASK));
        assert_eq!(history.undo_label(), Some("mask 1"));

        assert_eq!(history.redo_target(LINE_TOPIC), Some(SKETCH));
        assert_eq!(history.redo_label(), Some("sketch 1"));
        assert!(history.is_consistent());
    }

    #[test]
    fn test_topic_undo_moves_its_latest_log_entry() {
        let mut history = HistoryManager::new(10);
        history.commit(MASK, "mask", 0);
        history.commit(SKETCH, "sketch", 100);

        // Undo the older topic directly; the newer one stays at the top.
        history.undo(MASK, 1);
        assert_eq!(history.undo_target(LINE_TOPIC), Some(SKETCH));
        assert_eq!(history.redo_target(LINE_TOPIC), Some(MASK));
        assert!(history.is_consistent());
    }

    #[test]
    fn test_max_history_trims_log_with_stack() {
        let mut history = HistoryManager::new(3);
        history.commit(SKETCH, "sketch", 100);
        for i in 0..5 {
            history.commit(MASK, "mask", i);
        }
        assert_eq!(history.undo_depth(MASK), 3);
        assert_eq!(history.undo_depth(SKETCH), 1);
        assert_eq!(history.records().len(), 4);
        assert_eq!(history.records()[0].topic, SKETCH);
        assert!(history.is_consistent());

        // Oldest surviving mask state is the third commit
        let mut state = 5;
        for _ in 0..3 {
            state = history.undo(MASK, state).expect("undo");
        }
        assert_eq!(state, 2);
    }

    #[test]
    fn test_remove_topic_discards_entries() {
        let mut history = HistoryManager::new(10);
        history.commit(MASK, "mask", 0);
        history.commit(SKETCH, "sketch", 100);
        history.commit(SKETCH, "sketch", 101);
        history.undo(SKETCH, 102);

        history.remove_topic(SKETCH);
        assert_eq!(history.undo_target(LINE_TOPIC), Some(MASK));
        assert!(!history.can_redo());
        assert_eq!(history.undo_depth(SKETCH), 0);
        assert!(history.is_consistent());
    }

    #[test]
    fn test_commit_undo_law_over_sequences() {
        let mut history = HistoryManager::new(100);
        let mut state = String::new();
        let mut states = vec![state.clone()];
        for (i, topic) in [MASK, SKETCH, MASK, MASK, SKETCH].iter().enumerate() {
            history.commit(topic, "step", state.clone());
            state.push_str(&i.to_string());
            states.push(state.clone());
        }
        // All commits touched a single shared state here, so global undo
        // walks back through every intermediate value.
        while let Some(topic) = history.undo_target(LINE_TOPIC).map(str::to_owned) {
            state = history.undo(&topic, state).expect("undo");
            states.pop();
            assert_eq!(Some(&state), states.last());
        }
        assert_eq!(state, "");
    }
}
