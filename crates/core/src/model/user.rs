use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::ids::TopicId;
use crate::model::prefs::UserPrefs;
use crate::model::session::Session;
use crate::time::iso_seconds;

/// Answered/correct counters. `correct <= answered` always holds because
/// `correct` only moves together with `answered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsBucket {
    answered: u64,
    correct: u64,
}

impl StatsBucket {
    #[must_use]
    pub fn answered(&self) -> u64 {
        self.answered
    }

    #[must_use]
    pub fn correct(&self) -> u64 {
        self.correct
    }

    /// Share of correct answers in `[0, 1]`, `None` before the first answer.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn accuracy(&self) -> Option<f64> {
        (self.answered > 0).then(|| self.correct as f64 / self.answered as f64)
    }

    pub fn count(&mut self, is_correct: bool) {
        self.answered = self.answered.saturating_add(1);
        if is_correct {
            self.correct = self.correct.saturating_add(1);
        }
    }

    /// Clamp `correct` down to `answered` for buckets read from disk.
    pub fn repair(&mut self) -> bool {
        if self.correct > self.answered {
            self.correct = self.answered;
            return true;
        }
        false
    }
}

/// Lifetime answer statistics of a user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stats {
    #[serde(default)]
    pub total: StatsBucket,
    #[serde(default)]
    pub by_topic: BTreeMap<TopicId, StatsBucket>,
}

impl Stats {
    /// Count one answer, attributing it to `topic` when given.
    pub fn count(&mut self, topic: Option<&TopicId>, is_correct: bool) {
        self.total.count(is_correct);
        if let Some(topic) = topic {
            self.by_topic
                .entry(topic.clone())
                .or_default()
                .count(is_correct);
        }
    }

    #[must_use]
    pub fn topic(&self, topic: &TopicId) -> StatsBucket {
        self.by_topic.get(topic).copied().unwrap_or_default()
    }

    pub fn repair(&mut self) -> bool {
        let mut changed = self.total.repair();
        for bucket in self.by_topic.values_mut() {
            changed |= bucket.repair();
        }
        changed
    }
}

/// Everything persisted about one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRow {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(with = "iso_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "iso_seconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub prefs: UserPrefs,
    #[serde(default)]
    pub session: Option<Session>,
    #[serde(default)]
    pub last_topic_id: Option<TopicId>,
    #[serde(default)]
    pub stats: Stats,
}

impl UserRow {
    /// A fresh row: default prefs, no session, zeroed stats.
    #[must_use]
    pub fn new(username: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            username,
            created_at: now,
            updated_at: now,
            prefs: UserPrefs::default(),
            session: None,
            last_topic_id: None,
            stats: Stats::default(),
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// Restore invariants on a row read back from disk.
    pub fn repair(&mut self) -> bool {
        let mut changed = self.stats.repair();
        if let Some(session) = self.session.as_mut() {
            changed |= session.repair();
        }
        changed
    }
}
