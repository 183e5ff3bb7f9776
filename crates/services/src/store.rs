//! Durable per-user quiz state.
//!
//! `SessionStore` owns the users document. Every call that changes a row
//! rewrites the whole document through the repository before returning, so
//! a crash never loses an acknowledged change. Calls that change nothing
//! (no session, unknown question, pool too small) do not write, except that
//! creating a missing user row always does.
//!
//! Per-user ordering comes from the dispatcher holding the user's
//! [`ActionGuard`](crate::ActionGuard) permit; the internal mutex only keeps
//! concurrent writers from interleaving on the shared document.

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::{Arc, Mutex, MutexGuard};

use quiz_core::model::{
    AnswerRecord, Difficulty, InputFormat, PrefsPatch, Question, QuestionId, Session, SessionMode,
    SessionProgress, Topic, TopicId, UserId, UserPrefs, UserRow,
};
use quiz_core::{Clock, QuestionBank};
use storage::{LoadOutcome, UsersDocument, UsersRepository};

use crate::error::SessionStoreError;
use crate::selector::SeriesSelector;

struct StoreState {
    doc: UsersDocument,
    rng: StdRng,
}

/// The authoritative per-user state machine:
///
/// ```text
/// NoSession --start_session--> InSeries(0) --advance--> ... --advance--> InSeries(len)
///     ^                                                                        |
///     +------------------------------- finish ---------------------------------+
/// ```
///
/// `InSeries(len)` is exhausted but still active until `finish` is called.
pub struct SessionStore {
    bank: Arc<QuestionBank>,
    repo: Arc<dyn UsersRepository>,
    clock: Clock,
    state: Mutex<StoreState>,
}

impl SessionStore {
    /// Load the users document and take ownership of it.
    ///
    /// A missing document is created and written immediately. An unreadable
    /// one is replaced by an empty document in memory; the next change
    /// overwrites the file.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError::Storage` if the document cannot be read
    /// or the fresh document cannot be written.
    pub fn open(
        bank: Arc<QuestionBank>,
        repo: Arc<dyn UsersRepository>,
        clock: Clock,
    ) -> Result<Self, SessionStoreError> {
        let now = clock.now();
        let doc = match repo.load()? {
            LoadOutcome::Loaded(mut doc) => {
                if !doc.is_current_version() {
                    tracing::warn!(version = %doc.version, "unexpected users document version");
                }
                let repaired = doc.repair();
                if !repaired.is_empty() {
                    tracing::warn!(users = ?repaired, "repaired inconsistent user rows");
                }
                tracing::info!(users = doc.users.len(), "users document loaded");
                doc
            }
            LoadOutcome::Missing => {
                let doc = UsersDocument::new(now);
                repo.save(&doc)?;
                tracing::info!("users document created");
                doc
            }
            LoadOutcome::Corrupt { reason } => {
                tracing::warn!(%reason, "users document unreadable, starting from an empty one");
                UsersDocument::new(now)
            }
        };

        Ok(Self {
            bank,
            repo,
            clock,
            state: Mutex::new(StoreState {
                doc,
                rng: StdRng::from_os_rng(),
            }),
        })
    }

    /// Use a seeded generator for series sampling.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        if let Ok(state) = self.state.get_mut() {
            state.rng = StdRng::seed_from_u64(seed);
        }
        self
    }

    #[must_use]
    pub fn bank(&self) -> &Arc<QuestionBank> {
        &self.bank
    }

    /// Topics in source order.
    #[must_use]
    pub fn topics(&self) -> &[Topic] {
        self.bank.topics()
    }

    //
    // ─── USERS ──────────────────────────────────────────────────────────────
    //

    /// Get the user's row, creating it with defaults on first contact.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError` if a newly created row cannot be persisted.
    pub fn ensure_user(
        &self,
        user: UserId,
        username: Option<&str>,
    ) -> Result<UserRow, SessionStoreError> {
        self.with_user(user, username, |row, _| (row.clone(), false))
    }

    /// The user's row, without creating it.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError::Poisoned` if the store lock is poisoned.
    pub fn get_user(&self, user: UserId) -> Result<Option<UserRow>, SessionStoreError> {
        self.read(|doc| doc.user(user).cloned())
    }

    /// Merge `patch` into the user's preferences and return the result.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError` if the change cannot be persisted.
    pub fn update_prefs(
        &self,
        user: UserId,
        patch: PrefsPatch,
    ) -> Result<UserPrefs, SessionStoreError> {
        self.with_user(user, None, |row, _| {
            patch.apply_to(&mut row.prefs);
            (row.prefs, true)
        })
    }

    //
    // ─── SESSION LIFECYCLE ──────────────────────────────────────────────────
    //

    /// Start a new session of `count` questions.
    ///
    /// Returns the selected questions in session order. When the pool is too
    /// small the result is empty and any previous session is left as it was.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError` if the new session cannot be persisted.
    pub fn start_session(
        &self,
        user: UserId,
        mode: SessionMode,
        topic: Option<&TopicId>,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<Arc<Question>>, SessionStoreError> {
        self.with_user(user, None, |row, rng| {
            let series = self.install_session(row, rng, mode, topic, difficulty, count);
            let started = !series.is_empty();
            (series, started)
        })
    }

    /// Start a session sized and filtered by the user's own preferences.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError` if the new session cannot be persisted.
    pub fn start_with_prefs(
        &self,
        user: UserId,
        mode: SessionMode,
        topic: Option<&TopicId>,
    ) -> Result<Vec<Arc<Question>>, SessionStoreError> {
        self.with_user(user, None, |row, rng| {
            let UserPrefs { qcount, diff, .. } = row.prefs;
            let series = self.install_session(row, rng, mode, topic, diff, qcount.get());
            let started = !series.is_empty();
            (series, started)
        })
    }

    fn install_session(
        &self,
        row: &mut UserRow,
        rng: &mut StdRng,
        mode: SessionMode,
        topic: Option<&TopicId>,
        difficulty: Difficulty,
        count: usize,
    ) -> Vec<Arc<Question>> {
        let series = SeriesSelector::new(&self.bank).pick_series(topic, difficulty, count, rng);
        if series.is_empty() {
            return series;
        }
        let question_ids = series.iter().map(|q| q.id.clone()).collect();
        row.session = Some(Session::new(mode, topic.cloned(), question_ids));
        row.last_topic_id = topic.cloned();
        tracing::debug!(
            ?mode,
            topic = topic.map(TopicId::as_str),
            %difficulty,
            count,
            "session started"
        );
        series
    }

    /// The question under the session cursor, if a session is active and not
    /// yet exhausted.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError` if a newly created user row cannot be persisted.
    pub fn get_current_question(
        &self,
        user: UserId,
    ) -> Result<Option<Arc<Question>>, SessionStoreError> {
        self.with_user(user, None, |row, _| {
            let current = row
                .session
                .as_ref()
                .and_then(Session::current_qid)
                .and_then(|qid| self.bank.by_id(qid))
                .cloned();
            (current, false)
        })
    }

    /// Store the answer to `qid` and count it in the user's statistics.
    ///
    /// Statistics are attributed to `topic_hint`, or else to the question's
    /// first topic. Re-answering a question replaces the stored record but
    /// counts again; callers that allow retries should check
    /// [`has_answer`](Self::has_answer) first.
    ///
    /// Returns `false` without changing anything if there is no session or
    /// `qid` is not part of it.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError` if the change cannot be persisted.
    pub fn record_answer(
        &self,
        user: UserId,
        qid: &QuestionId,
        record: AnswerRecord,
        topic_hint: Option<&TopicId>,
    ) -> Result<bool, SessionStoreError> {
        self.with_user(user, None, |row, _| {
            let Some(session) = row.session.as_mut() else {
                return (false, false);
            };
            let is_correct = record.is_correct();
            if !session.record(qid.clone(), record) {
                tracing::debug!(%user, %qid, "answer for question outside the session ignored");
                return (false, false);
            }
            let topic = topic_hint.cloned().or_else(|| {
                self.bank
                    .by_id(qid)
                    .and_then(|q| q.primary_topic().cloned())
            });
            row.stats.count(topic.as_ref(), is_correct);
            (true, true)
        })
    }

    /// Move the cursor to the next question. Returns whether the series
    /// continues; `false` without a session.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError` if the change cannot be persisted.
    pub fn advance(&self, user: UserId) -> Result<bool, SessionStoreError> {
        self.with_user(user, None, |row, _| match row.session.as_mut() {
            Some(session) => (session.advance(), true),
            None => (false, false),
        })
    }

    /// End the active session.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError` if the change cannot be persisted.
    pub fn finish(&self, user: UserId) -> Result<(), SessionStoreError> {
        self.with_user(user, None, |row, _| {
            if let Some(session) = row.session.take() {
                tracing::debug!(%user, progress = ?session.progress(), "session finished");
            }
            ((), true)
        })
    }

    /// Expect a typed reply for `qid`. Only the question at the cursor can be
    /// awaited; returns `false` otherwise or without a session.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError` if the change cannot be persisted.
    pub fn set_await_input(
        &self,
        user: UserId,
        qid: &QuestionId,
        format: InputFormat,
    ) -> Result<bool, SessionStoreError> {
        self.with_user(user, None, |row, _| match row.session.as_mut() {
            Some(session) => {
                let set = session.set_await_input(qid.clone(), format);
                (set, set)
            }
            None => (false, false),
        })
    }

    /// Drop any pending await-input. Returns whether one was pending.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError` if the change cannot be persisted.
    pub fn clear_await_input(&self, user: UserId) -> Result<bool, SessionStoreError> {
        self.with_user(user, None, |row, _| match row.session.as_mut() {
            Some(session) => (session.clear_await_input(), true),
            None => (false, false),
        })
    }

    /// Remember that the solution of `qid` was shown. Returns `false` without
    /// a session or for a question outside it.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError` if the change cannot be persisted.
    pub fn mark_solution_seen(
        &self,
        user: UserId,
        qid: &QuestionId,
    ) -> Result<bool, SessionStoreError> {
        self.with_user(user, None, |row, _| match row.session.as_mut() {
            Some(session) => {
                let marked = session.mark_solution_seen(qid.clone());
                (marked, marked)
            }
            None => (false, false),
        })
    }

    //
    // ─── READS ──────────────────────────────────────────────────────────────
    //

    /// Whether the active session already holds an answer for `qid`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError::Poisoned` if the store lock is poisoned.
    pub fn has_answer(&self, user: UserId, qid: &QuestionId) -> Result<bool, SessionStoreError> {
        self.read(|doc| {
            doc.user(user)
                .and_then(|row| row.session.as_ref())
                .is_some_and(|session| session.answers().contains_key(qid))
        })
    }

    /// # Errors
    ///
    /// Returns `SessionStoreError::Poisoned` if the store lock is poisoned.
    pub fn session_progress(
        &self,
        user: UserId,
    ) -> Result<Option<SessionProgress>, SessionStoreError> {
        self.read(|doc| {
            doc.user(user)
                .and_then(|row| row.session.as_ref())
                .map(Session::progress)
        })
    }

    /// A copy of the whole users document.
    ///
    /// # Errors
    ///
    /// Returns `SessionStoreError::Poisoned` if the store lock is poisoned.
    pub fn snapshot(&self) -> Result<UsersDocument, SessionStoreError> {
        self.read(UsersDocument::clone)
    }

    //
    // ─── INTERNALS ──────────────────────────────────────────────────────────
    //

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, SessionStoreError> {
        self.state.lock().map_err(|_| SessionStoreError::Poisoned)
    }

    fn read<T>(&self, f: impl FnOnce(&UsersDocument) -> T) -> Result<T, SessionStoreError> {
        let state = self.lock()?;
        Ok(f(&state.doc))
    }

    /// Run `f` on a copy of the user's row (a fresh one if there is none) and
    /// persist when the row was created or `f` reports a change.
    ///
    /// A failed save restores the previous row (or its absence) and
    /// `updated_at`, so the document is left exactly as it was.
    fn with_user<T>(
        &self,
        user: UserId,
        username: Option<&str>,
        f: impl FnOnce(&mut UserRow, &mut StdRng) -> (T, bool),
    ) -> Result<T, SessionStoreError> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        let StoreState { doc, rng } = &mut *state;

        let existing = doc.users.get(&user);
        let created = existing.is_none();
        let mut row = match existing {
            Some(row) => row.clone(),
            None => UserRow::new(username.map(str::to_owned), now),
        };
        let (value, changed) = f(&mut row, rng);
        if !(created || changed) {
            return Ok(value);
        }
        if changed {
            row.touch(now);
        }

        let previous_row = doc.users.insert(user, row);
        let previous_updated_at = std::mem::replace(&mut doc.updated_at, now);
        if let Err(err) = self.repo.save(doc) {
            match previous_row {
                Some(row) => doc.users.insert(user, row),
                None => doc.users.remove(&user),
            };
            doc.updated_at = previous_updated_at;
            tracing::error!(%user, error = %err, "failed to persist users document, change discarded");
            return Err(err.into());
        }
        if created {
            tracing::info!(%user, "user created");
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{AnswerValue, QuestionCount};
    use quiz_core::time::{pinned_clock, pinned_now};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use storage::{InMemoryRepository, StorageError};

    /// Wraps an in-memory repository and fails saves while `failing` is set.
    #[derive(Default)]
    struct FlakyRepository {
        inner: InMemoryRepository,
        failing: AtomicBool,
    }

    impl FlakyRepository {
        fn fail_saves(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    impl UsersRepository for FlakyRepository {
        fn load(&self) -> Result<LoadOutcome, StorageError> {
            self.inner.load()
        }

        fn save(&self, doc: &UsersDocument) -> Result<(), StorageError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StorageError::Io {
                    operation: "write",
                    path: "users.json".into(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.inner.save(doc)
        }
    }

    fn stored(repo: &InMemoryRepository) -> UsersDocument {
        match repo.load().unwrap() {
            LoadOutcome::Loaded(doc) => doc,
            other => panic!("expected a stored document, got {other:?}"),
        }
    }

    fn bank() -> Arc<QuestionBank> {
        let questions = (1..=4)
            .map(|i| {
                let topics = if i == 4 { vec!["geo", "alg"] } else { vec!["alg"] };
                serde_json::from_value(json!({
                    "id": format!("q{i}"),
                    "topic_ids": topics,
                    "difficulty": "m",
                    "answer_format": "numeric",
                    "statement": "?",
                    "correct_answer": i
                }))
                .unwrap()
            })
            .collect();
        Arc::new(
            QuestionBank::new(
                vec![
                    Topic::new("alg", "Algebra", ""),
                    Topic::new("geo", "Geometry", ""),
                ],
                questions,
            )
            .unwrap(),
        )
    }

    fn store() -> (SessionStore, InMemoryRepository) {
        let repo = InMemoryRepository::new();
        let store = SessionStore::open(bank(), Arc::new(repo.clone()), pinned_clock())
            .unwrap()
            .with_seed(3);
        (store, repo)
    }

    fn answer(correct: bool) -> AnswerRecord {
        AnswerRecord::new(AnswerValue::Numeric(1.0), correct).unwrap()
    }

    const U: UserId = UserId::new(1);

    #[test]
    fn open_creates_missing_document() {
        let (_store, repo) = store();
        assert_eq!(repo.saves(), 1);
    }

    #[test]
    fn ensure_user_is_idempotent_and_persists_once() {
        let (store, repo) = store();
        let row = store.ensure_user(U, Some("ann")).unwrap();
        assert_eq!(row.username.as_deref(), Some("ann"));
        assert_eq!(row.created_at, pinned_now());
        assert!(row.session.is_none());
        assert_eq!(repo.saves(), 2);

        let again = store.ensure_user(U, Some("other")).unwrap();
        assert_eq!(again, row);
        assert_eq!(repo.saves(), 2);
    }

    #[test]
    fn update_prefs_merges() {
        let (store, _repo) = store();
        let prefs = store
            .update_prefs(U, PrefsPatch::new().qcount(QuestionCount::Three))
            .unwrap();
        assert_eq!(prefs.qcount, QuestionCount::Three);
        assert_eq!(prefs.diff, Difficulty::Medium);
        assert_eq!(store.get_user(U).unwrap().unwrap().prefs, prefs);
    }

    #[test]
    fn failed_start_keeps_previous_session() {
        let (store, repo) = store();
        let first = store
            .start_session(U, SessionMode::Series, None, Difficulty::Medium, 3)
            .unwrap();
        assert_eq!(first.len(), 3);
        store.advance(U).unwrap();
        let saves = repo.saves();

        let none = store
            .start_session(U, SessionMode::Series, None, Difficulty::Medium, 10)
            .unwrap();
        assert!(none.is_empty());
        assert_eq!(repo.saves(), saves);

        let session = store.get_user(U).unwrap().unwrap().session.unwrap();
        assert_eq!(session.index(), 1);
        let ids: Vec<QuestionId> = first.iter().map(|q| q.id.clone()).collect();
        assert_eq!(session.question_ids(), ids.as_slice());
    }

    #[test]
    fn start_with_prefs_uses_count_and_difficulty() {
        let (store, _repo) = store();
        store
            .update_prefs(U, PrefsPatch::new().qcount(QuestionCount::Three))
            .unwrap();
        let series = store.start_with_prefs(U, SessionMode::Daily, None).unwrap();
        assert_eq!(series.len(), 3);

        store
            .update_prefs(U, PrefsPatch::new().diff(Difficulty::Hard))
            .unwrap();
        assert!(store.start_with_prefs(U, SessionMode::Daily, None).unwrap().is_empty());
    }

    #[test]
    fn record_answer_attributes_to_hint_or_first_topic() {
        let (store, _repo) = store();
        let geo = TopicId::new("geo");
        store
            .start_session(U, SessionMode::Series, None, Difficulty::Medium, 4)
            .unwrap();

        assert!(store.record_answer(U, &QuestionId::new("q4"), answer(true), None).unwrap());
        assert!(store
            .record_answer(U, &QuestionId::new("q1"), answer(false), Some(&geo))
            .unwrap());

        let stats = store.get_user(U).unwrap().unwrap().stats;
        assert_eq!(stats.total.answered(), 2);
        assert_eq!(stats.total.correct(), 1);
        assert_eq!(stats.topic(&geo).answered(), 2);
        assert_eq!(stats.topic(&geo).correct(), 1);
        assert_eq!(stats.topic(&TopicId::new("alg")).answered(), 0);
    }

    #[test]
    fn record_answer_without_session_or_foreign_qid_is_noop() {
        let (store, repo) = store();
        store.ensure_user(U, None).unwrap();
        let saves = repo.saves();
        assert!(!store.record_answer(U, &QuestionId::new("q1"), answer(true), None).unwrap());
        assert_eq!(repo.saves(), saves);

        store
            .start_session(U, SessionMode::Single, Some(&TopicId::new("geo")), Difficulty::Medium, 1)
            .unwrap();
        assert!(!store.record_answer(U, &QuestionId::new("q1"), answer(true), None).unwrap());
        assert_eq!(store.get_user(U).unwrap().unwrap().stats.total.answered(), 0);
    }

    #[test]
    fn repeated_answer_overwrites_but_counts_twice() {
        let (store, _repo) = store();
        store
            .start_session(U, SessionMode::Single, Some(&TopicId::new("geo")), Difficulty::Medium, 1)
            .unwrap();
        let q4 = QuestionId::new("q4");
        assert!(!store.has_answer(U, &q4).unwrap());
        store.record_answer(U, &q4, answer(false), None).unwrap();
        assert!(store.has_answer(U, &q4).unwrap());
        store.record_answer(U, &q4, answer(true), None).unwrap();

        let row = store.get_user(U).unwrap().unwrap();
        let session = row.session.unwrap();
        assert_eq!(session.answers().len(), 1);
        assert!(session.answers()[&q4].is_correct());
        assert_eq!(row.stats.total.answered(), 2);
    }

    #[test]
    fn await_input_cleared_by_advance() {
        let (store, _repo) = store();
        store
            .start_session(U, SessionMode::Series, None, Difficulty::Medium, 2)
            .unwrap();
        let current = store.get_current_question(U).unwrap().unwrap();
        let other = store.get_user(U).unwrap().unwrap().session.unwrap().question_ids()[1].clone();

        assert!(!store.set_await_input(U, &other, InputFormat::Numeric).unwrap());
        assert!(store.set_await_input(U, &current.id, InputFormat::Numeric).unwrap());
        assert!(store.advance(U).unwrap());
        let session = store.get_user(U).unwrap().unwrap().session.unwrap();
        assert!(session.await_input().is_none());

        assert!(store.set_await_input(U, &other, InputFormat::Text).unwrap());
        assert!(store.clear_await_input(U).unwrap());
        assert!(!store.clear_await_input(U).unwrap());
    }

    #[test]
    fn calls_without_session_do_not_persist() {
        let (store, repo) = store();
        store.ensure_user(U, None).unwrap();
        let saves = repo.saves();
        assert!(!store.advance(U).unwrap());
        assert!(!store.set_await_input(U, &QuestionId::new("q1"), InputFormat::Text).unwrap());
        assert!(!store.clear_await_input(U).unwrap());
        assert!(!store.mark_solution_seen(U, &QuestionId::new("q1")).unwrap());
        assert!(store.get_current_question(U).unwrap().is_none());
        assert!(store.session_progress(U).unwrap().is_none());
        assert_eq!(repo.saves(), saves);
    }

    #[test]
    fn solutions_seen_are_recorded() {
        let (store, _repo) = store();
        let series = store
            .start_session(U, SessionMode::Series, None, Difficulty::Medium, 2)
            .unwrap();
        assert!(store.mark_solution_seen(U, &series[0].id).unwrap());
        assert!(!store.mark_solution_seen(U, &QuestionId::new("nope")).unwrap());
        let session = store.get_user(U).unwrap().unwrap().session.unwrap();
        assert!(session.solutions_seen().contains(&series[0].id));
    }

    #[test]
    fn corrupt_document_starts_empty_without_writing() {
        let repo = InMemoryRepository::with_raw("{broken");
        let store = SessionStore::open(bank(), Arc::new(repo.clone()), pinned_clock()).unwrap();
        assert!(store.snapshot().unwrap().users.is_empty());
        assert_eq!(repo.saves(), 0);

        store.ensure_user(U, None).unwrap();
        assert_eq!(repo.saves(), 1);
        assert!(repo.raw().unwrap().contains("\"1\""));
    }

    #[test]
    fn loaded_rows_are_repaired() {
        let raw = json!({
            "version": "users.v1",
            "updated_at": "2023-11-14T22:13:20Z",
            "users": {
                "1": {
                    "created_at": "2023-11-14T22:13:20Z",
                    "updated_at": "2023-11-14T22:13:20Z",
                    "session": {"mode": "series", "question_ids": ["q1"], "index": 5},
                    "stats": {"total": {"answered": 1, "correct": 3}, "by_topic": {}}
                }
            }
        });
        let repo = InMemoryRepository::with_raw(raw.to_string());
        let store = SessionStore::open(bank(), Arc::new(repo), pinned_clock()).unwrap();
        let row = store.get_user(U).unwrap().unwrap();
        assert_eq!(row.session.unwrap().index(), 1);
        assert_eq!(row.stats.total.correct(), 1);
    }

    #[test]
    fn failed_save_leaves_memory_untouched() {
        let repo = Arc::new(FlakyRepository::default());
        let store = SessionStore::open(bank(), repo.clone(), pinned_clock())
            .unwrap()
            .with_seed(3);
        let series = store
            .start_session(U, SessionMode::Series, None, Difficulty::Medium, 3)
            .unwrap();
        let before = store.snapshot().unwrap();

        repo.fail_saves(true);
        for _ in 0..2 {
            let result = store.record_answer(U, &series[0].id, answer(true), None);
            assert!(matches!(result, Err(SessionStoreError::Storage(_))));
        }
        assert_eq!(store.snapshot().unwrap(), before);
        assert!(!store.has_answer(U, &series[0].id).unwrap());

        repo.fail_saves(false);
        assert!(store.advance(U).unwrap());
        let row = store.get_user(U).unwrap().unwrap();
        assert_eq!(row.stats.total.answered(), 0);
        assert_eq!(stored(&repo.inner).users[&U].stats.total.answered(), 0);
        assert_eq!(stored(&repo.inner).users[&U].session.as_ref().unwrap().index(), 1);
    }

    #[test]
    fn failed_save_does_not_keep_a_new_user() {
        let repo = Arc::new(FlakyRepository::default());
        let store = SessionStore::open(bank(), repo.clone(), pinned_clock()).unwrap();
        repo.fail_saves(true);

        assert!(store.ensure_user(U, Some("ann")).is_err());
        assert!(store.get_user(U).unwrap().is_none());
        assert!(store.get_current_question(U).is_err());
        assert!(store.snapshot().unwrap().users.is_empty());
    }

    #[test]
    fn one_bad_row_does_not_wipe_the_others() {
        let row = |extra: serde_json::Value| {
            let mut row = json!({
                "created_at": "2023-11-14T22:13:20Z",
                "updated_at": "2023-11-14T22:13:20Z",
                "stats": {"total": {"answered": 40, "correct": 25}, "by_topic": {}}
            });
            if let (Some(row), Some(extra)) = (row.as_object_mut(), extra.as_object()) {
                row.extend(extra.clone());
            }
            row
        };
        let raw = json!({
            "version": "users.v1",
            "updated_at": "2023-11-14T22:13:20Z",
            "users": {
                "1": row(json!({"username": "ann"})),
                "2": row(json!({"prefs": {"qcount": 7}}))
            }
        });
        let repo = InMemoryRepository::with_raw(raw.to_string());
        let store = SessionStore::open(bank(), Arc::new(repo.clone()), pinned_clock()).unwrap();
        store.ensure_user(UserId::new(3), None).unwrap();

        let doc = stored(&repo);
        assert_eq!(doc.users.len(), 3);
        let ann = &doc.users[&U];
        assert_eq!(ann.username.as_deref(), Some("ann"));
        assert_eq!(ann.stats.total.answered(), 40);
        let reset = &doc.users[&UserId::new(2)];
        assert_eq!(reset.prefs, UserPrefs::default());
        assert_eq!(reset.stats.total.answered(), 40);
    }
}
