use std::collections::HashSet;
use std::sync::Arc;

use quiz_core::QuestionBank;
use quiz_core::model::{
    AnswerRecord, AnswerValue, Difficulty, Question, QuestionId, SessionMode, Topic, TopicId,
    UserId, UserRow,
};
use quiz_core::time::pinned_clock;
use serde_json::json;
use services::SessionStore;
use storage::{InMemoryRepository, JsonFileRepository};
use tempfile::tempdir;

fn question(id: &str, topic: &str, difficulty: &str) -> Question {
    serde_json::from_value(json!({
        "id": id,
        "title": id,
        "topic_ids": [topic],
        "difficulty": difficulty,
        "answer_format": "single_choice",
        "statement": "pick",
        "correct_answer": 0,
        "options": ["a", "b", "c"]
    }))
    .unwrap()
}

/// `medium` medium questions in "alg", plus a couple of distractors.
fn bank_with_medium(medium: usize) -> Arc<QuestionBank> {
    let mut questions: Vec<Question> = (0..medium)
        .map(|i| question(&format!("m{i}"), "alg", "m"))
        .collect();
    questions.push(question("e0", "alg", "e"));
    questions.push(question("h0", "geo", "h"));
    Arc::new(
        QuestionBank::new(
            vec![
                Topic::new("alg", "Algebra", "➗"),
                Topic::new("geo", "Geometry", "📐"),
            ],
            questions,
        )
        .unwrap(),
    )
}

fn open(bank: Arc<QuestionBank>) -> SessionStore {
    SessionStore::open(bank, Arc::new(InMemoryRepository::new()), pinned_clock()).unwrap()
}

fn choice(idx: u32, correct: bool) -> AnswerRecord {
    AnswerRecord::new(AnswerValue::SingleChoice(idx), correct).unwrap()
}

fn assert_row_invariants(row: &UserRow) {
    assert!(row.stats.total.correct() <= row.stats.total.answered());
    for bucket in row.stats.by_topic.values() {
        assert!(bucket.correct() <= bucket.answered());
    }
    if let Some(session) = &row.session {
        assert!(session.index() <= session.question_ids().len());
        for qid in session.answers().keys() {
            assert!(session.question_ids().contains(qid));
        }
        if let Some(awaiting) = session.await_input() {
            assert_eq!(session.current_qid(), Some(&awaiting.qid));
        }
    }
}

#[test]
fn scenario_a_full_pool_then_too_small_pool() {
    let user = UserId::new(1);
    let store = open(bank_with_medium(5));
    let series = store
        .start_session(user, SessionMode::Series, None, Difficulty::Medium, 5)
        .unwrap();
    assert_eq!(series.len(), 5);
    let ids: HashSet<&str> = series.iter().map(|q| q.id.as_str()).collect();
    assert_eq!(ids, HashSet::from(["m0", "m1", "m2", "m3", "m4"]));

    let small = open(bank_with_medium(4));
    let none = small
        .start_session(user, SessionMode::Series, None, Difficulty::Medium, 5)
        .unwrap();
    assert!(none.is_empty());
    assert!(small.get_current_question(user).unwrap().is_none());
}

#[test]
fn scenario_b_advance_through_three_questions() {
    let user = UserId::new(2);
    let store = open(bank_with_medium(3));
    store
        .start_session(user, SessionMode::Series, None, Difficulty::Medium, 3)
        .unwrap();

    let steps: Vec<bool> = (0..3).map(|_| store.advance(user).unwrap()).collect();
    assert_eq!(steps, [true, true, false]);

    // exhausted but still active until finish
    let progress = store.session_progress(user).unwrap().unwrap();
    assert!(progress.is_finished());
    assert_eq!(progress.index, 3);
    assert!(store.get_current_question(user).unwrap().is_none());
    assert_row_invariants(&store.get_user(user).unwrap().unwrap());
}

#[test]
fn scenario_c_answer_counts_in_topic_bucket() {
    let user = UserId::new(3);
    let alg = TopicId::new("alg");
    let store = open(bank_with_medium(3));
    store
        .start_session(user, SessionMode::Series, Some(&alg), Difficulty::Medium, 3)
        .unwrap();
    let row = store.get_user(user).unwrap().unwrap();
    assert_eq!(row.session.as_ref().and_then(|s| s.topic_id()), Some(&alg));
    assert_eq!(row.last_topic_id.as_ref(), Some(&alg));
    let before = row.stats;

    let current = store.get_current_question(user).unwrap().unwrap();
    assert!(store.record_answer(user, &current.id, choice(0, true), None).unwrap());

    let after = store.get_user(user).unwrap().unwrap().stats;
    assert_eq!(after.total.answered(), before.total.answered() + 1);
    assert_eq!(after.total.correct(), before.total.correct() + 1);
    assert_eq!(after.topic(&alg).answered(), before.topic(&alg).answered() + 1);
    assert_eq!(after.topic(&alg).correct(), before.topic(&alg).correct() + 1);
}

#[test]
fn scenario_d_finish_then_restart() {
    let user = UserId::new(4);
    let store = open(bank_with_medium(5));
    store
        .start_session(user, SessionMode::Series, None, Difficulty::Medium, 3)
        .unwrap();
    store.advance(user).unwrap();
    store.finish(user).unwrap();
    assert!(store.get_current_question(user).unwrap().is_none());
    assert!(store.get_user(user).unwrap().unwrap().session.is_none());

    let series = store
        .start_session(user, SessionMode::Single, None, Difficulty::Medium, 1)
        .unwrap();
    assert_eq!(series.len(), 1);
    let session = store.get_user(user).unwrap().unwrap().session.unwrap();
    assert_eq!(session.index(), 0);
    assert_eq!(session.mode(), SessionMode::Single);
    assert_eq!(
        store.get_current_question(user).unwrap().unwrap().id,
        series[0].id
    );
}

#[test]
fn full_series_keeps_invariants() {
    let user = UserId::new(5);
    let store = open(bank_with_medium(10)).with_seed(11);
    let series = store
        .start_session(user, SessionMode::Series, None, Difficulty::Medium, 10)
        .unwrap();

    for (i, q) in series.iter().enumerate() {
        let current = store.get_current_question(user).unwrap().unwrap();
        assert_eq!(current.id, q.id);
        store
            .record_answer(user, &current.id, choice(1, i % 3 == 0), None)
            .unwrap();
        store.advance(user).unwrap();
        assert_row_invariants(&store.get_user(user).unwrap().unwrap());
    }

    let row = store.get_user(user).unwrap().unwrap();
    assert_eq!(row.stats.total.answered(), 10);
    assert_eq!(row.stats.total.correct(), 4);
    assert_eq!(row.session.unwrap().answers().len(), 10);
}

#[test]
fn reopen_from_file_restores_same_document() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("users.json");
    let bank = bank_with_medium(5);
    let user = UserId::new(77);

    let first = SessionStore::open(
        Arc::clone(&bank),
        Arc::new(JsonFileRepository::new(&path)),
        pinned_clock(),
    )
    .unwrap();
    first.ensure_user(user, Some("bob")).unwrap();
    let series = first
        .start_session(user, SessionMode::Series, None, Difficulty::Medium, 3)
        .unwrap();
    first
        .record_answer(user, &series[0].id, choice(2, false), None)
        .unwrap();
    first.mark_solution_seen(user, &series[0].id).unwrap();
    first.advance(user).unwrap();
    let expected = first.snapshot().unwrap();
    drop(first);

    let second =
        SessionStore::open(bank, Arc::new(JsonFileRepository::new(&path)), pinned_clock()).unwrap();
    let restored = second.snapshot().unwrap();
    assert_eq!(restored.users, expected.users);
    assert_eq!(restored.version, expected.version);
    assert_eq!(
        second.get_current_question(user).unwrap().unwrap().id,
        series[1].id
    );
    assert!(second.has_answer(user, &series[0].id).unwrap());
    assert!(!second.has_answer(user, &QuestionId::new("m9")).unwrap());
}

#[test]
fn corrupt_file_is_replaced_on_next_change() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("users.json");
    std::fs::write(&path, "not json at all").unwrap();

    let store = SessionStore::open(
        bank_with_medium(3),
        Arc::new(JsonFileRepository::new(&path)),
        pinned_clock(),
    )
    .unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json at all");

    store.ensure_user(UserId::new(1), None).unwrap();
    let raw = std::fs::read_to_string(&path).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(doc["version"], "users.v1");
    assert!(doc["users"]["1"].is_object());
}
