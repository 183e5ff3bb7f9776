use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::model::answer::AnswerRecord;
use crate::model::ids::{QuestionId, TopicId};
use crate::model::question::InputFormat;

/// How the session was started from the menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Single,
    #[default]
    Series,
    Daily,
}

/// Marks that the next free-form message is the answer to `qid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwaitInput {
    pub qid: QuestionId,
    pub format: InputFormat,
}

/// Snapshot of where a user is within the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionProgress {
    pub index: usize,
    pub total: usize,
    pub answered: usize,
    pub correct: usize,
}

impl SessionProgress {
    /// True once the cursor has moved past the last question.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.index >= self.total
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.index)
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One quiz run: a fixed ordered list of questions, a cursor and the answers
/// given so far.
///
/// Invariants kept by every method:
/// - `index <= question_ids.len()`
/// - `answers` and `solutions_seen` only hold ids from `question_ids`
/// - `await_input`, when set, names the question at the cursor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    mode: SessionMode,
    #[serde(default)]
    topic_id: Option<TopicId>,
    question_ids: Vec<QuestionId>,
    #[serde(default)]
    index: usize,
    #[serde(default)]
    answers: BTreeMap<QuestionId, AnswerRecord>,
    #[serde(default)]
    await_input: Option<AwaitInput>,
    #[serde(default, alias = "solutions_qids")]
    solutions_seen: BTreeSet<QuestionId>,
}

impl Session {
    /// Start a session over `question_ids`. Repeated ids are dropped, keeping
    /// the first occurrence.
    #[must_use]
    pub fn new(mode: SessionMode, topic_id: Option<TopicId>, question_ids: Vec<QuestionId>) -> Self {
        let mut seen = HashSet::with_capacity(question_ids.len());
        let question_ids = question_ids
            .into_iter()
            .filter(|qid| seen.insert(qid.clone()))
            .collect();
        Self {
            mode,
            topic_id,
            question_ids,
            index: 0,
            answers: BTreeMap::new(),
            await_input: None,
            solutions_seen: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    #[must_use]
    pub fn topic_id(&self) -> Option<&TopicId> {
        self.topic_id.as_ref()
    }

    #[must_use]
    pub fn question_ids(&self) -> &[QuestionId] {
        &self.question_ids
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionId, AnswerRecord> {
        &self.answers
    }

    #[must_use]
    pub fn await_input(&self) -> Option<&AwaitInput> {
        self.await_input.as_ref()
    }

    #[must_use]
    pub fn solutions_seen(&self) -> &BTreeSet<QuestionId> {
        &self.solutions_seen
    }

    #[must_use]
    pub fn contains(&self, qid: &QuestionId) -> bool {
        self.question_ids.contains(qid)
    }

    /// Question id under the cursor, `None` once the series is exhausted.
    #[must_use]
    pub fn current_qid(&self) -> Option<&QuestionId> {
        self.question_ids.get(self.index)
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            index: self.index,
            total: self.question_ids.len(),
            answered: self.answers.len(),
            correct: self.answers.values().filter(|a| a.is_correct()).count(),
        }
    }

    /// Store the answer for `qid`, replacing an earlier one.
    ///
    /// Returns `false` (and stores nothing) if `qid` is not part of the session.
    pub fn record(&mut self, qid: QuestionId, record: AnswerRecord) -> bool {
        if !self.contains(&qid) {
            return false;
        }
        self.answers.insert(qid, record);
        true
    }

    /// Move the cursor forward. Returns whether a question remains under it.
    ///
    /// The cursor stops at `len`; any pending await-input is cleared since it
    /// belonged to the previous question.
    pub fn advance(&mut self) -> bool {
        self.await_input = None;
        if self.index < self.question_ids.len() {
            self.index += 1;
        }
        self.index < self.question_ids.len()
    }

    /// Expect a typed reply for `qid`. Only the question at the cursor may be
    /// awaited; returns `false` otherwise.
    pub fn set_await_input(&mut self, qid: QuestionId, format: InputFormat) -> bool {
        if self.current_qid() != Some(&qid) {
            return false;
        }
        self.await_input = Some(AwaitInput { qid, format });
        true
    }

    /// Returns whether an await-input was pending.
    pub fn clear_await_input(&mut self) -> bool {
        self.await_input.take().is_some()
    }

    /// Returns `false` if `qid` is not part of the session.
    pub fn mark_solution_seen(&mut self, qid: QuestionId) -> bool {
        if !self.contains(&qid) {
            return false;
        }
        self.solutions_seen.insert(qid);
        true
    }

    /// Restore the invariants on a session read back from disk, dropping
    /// whatever cannot hold. Returns whether anything was changed.
    pub fn repair(&mut self) -> bool {
        let mut changed = false;

        let mut seen = HashSet::with_capacity(self.question_ids.len());
        let before = self.question_ids.len();
        self.question_ids.retain(|qid| seen.insert(qid.clone()));
        changed |= before != self.question_ids.len();

        if self.index > self.question_ids.len() {
            self.index = self.question_ids.len();
            changed = true;
        }

        let question_ids = &self.question_ids;
        let before = self.answers.len();
        self.answers.retain(|qid, _| question_ids.contains(qid));
        changed |= before != self.answers.len();

        let before = self.solutions_seen.len();
        self.solutions_seen.retain(|qid| question_ids.contains(qid));
        changed |= before != self.solutions_seen.len();

        let stale = self
            .await_input
            .as_ref()
            .is_some_and(|awaiting| self.question_ids.get(self.index) != Some(&awaiting.qid));
        if stale {
            self.await_input = None;
            changed = true;
        }

        changed
    }
}
