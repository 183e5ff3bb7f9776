//! Read-only question bank with lookup indices.
//!
//! Built once at startup; nothing mutates it afterwards, so it can be shared
//! behind an `Arc` without locking.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::model::{Difficulty, Question, QuestionId, Topic, TopicId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BankError {
    #[error("questions reference unknown topic ids: {question_ids:?}")]
    UnknownTopics { question_ids: Vec<QuestionId> },

    #[error("questions without any topic: {question_ids:?}")]
    MissingTopics { question_ids: Vec<QuestionId> },

    #[error("duplicate topic id: {0}")]
    DuplicateTopic(TopicId),

    #[error("duplicate question id: {0}")]
    DuplicateQuestion(QuestionId),
}

/// Topics and questions plus the derived indices.
///
/// Index order is the order questions appear in the source.
#[derive(Debug, Default)]
pub struct QuestionBank {
    topics: Vec<Topic>,
    topics_by_id: HashMap<TopicId, usize>,
    questions: Vec<Arc<Question>>,
    by_id: HashMap<QuestionId, Arc<Question>>,
    by_topic: HashMap<TopicId, Vec<Arc<Question>>>,
    by_topic_and_difficulty: HashMap<(TopicId, Difficulty), Vec<Arc<Question>>>,
}

impl QuestionBank {
    /// Index `topics` and `questions`.
    ///
    /// # Errors
    ///
    /// Fails without building anything if ids repeat, or if any question
    /// has no topic or points at a topic that does not exist. Reference
    /// errors list every offending question.
    pub fn new(topics: Vec<Topic>, questions: Vec<Question>) -> Result<Self, BankError> {
        let mut topics_by_id = HashMap::with_capacity(topics.len());
        for (pos, topic) in topics.iter().enumerate() {
            if topics_by_id.insert(topic.id.clone(), pos).is_some() {
                return Err(BankError::DuplicateTopic(topic.id.clone()));
            }
        }

        let mut seen = HashSet::with_capacity(questions.len());
        let mut unknown = Vec::new();
        let mut missing = Vec::new();
        for q in &questions {
            if !seen.insert(&q.id) {
                return Err(BankError::DuplicateQuestion(q.id.clone()));
            }
            if q.topic_ids.is_empty() {
                missing.push(q.id.clone());
            } else if q.topic_ids.iter().any(|t| !topics_by_id.contains_key(t)) {
                unknown.push(q.id.clone());
            }
        }
        if !unknown.is_empty() {
            return Err(BankError::UnknownTopics {
                question_ids: unknown,
            });
        }
        if !missing.is_empty() {
            return Err(BankError::MissingTopics {
                question_ids: missing,
            });
        }

        let questions: Vec<Arc<Question>> = questions.into_iter().map(Arc::new).collect();
        let mut by_id = HashMap::with_capacity(questions.len());
        let mut by_topic: HashMap<TopicId, Vec<Arc<Question>>> = HashMap::new();
        let mut by_topic_and_difficulty: HashMap<(TopicId, Difficulty), Vec<Arc<Question>>> =
            HashMap::new();

        for q in &questions {
            by_id.insert(q.id.clone(), Arc::clone(q));
            for topic in &q.topic_ids {
                by_topic.entry(topic.clone()).or_default().push(Arc::clone(q));
                by_topic_and_difficulty
                    .entry((topic.clone(), q.difficulty))
                    .or_default()
                    .push(Arc::clone(q));
            }
        }

        Ok(Self {
            topics,
            topics_by_id,
            questions,
            by_id,
            by_topic,
            by_topic_and_difficulty,
        })
    }

    /// Topics in source order.
    #[must_use]
    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    #[must_use]
    pub fn topic(&self, id: &TopicId) -> Option<&Topic> {
        self.topics_by_id.get(id).map(|&pos| &self.topics[pos])
    }

    #[must_use]
    pub fn all(&self) -> &[Arc<Question>] {
        &self.questions
    }

    #[must_use]
    pub fn by_id(&self, id: &QuestionId) -> Option<&Arc<Question>> {
        self.by_id.get(id)
    }

    #[must_use]
    pub fn by_topic(&self, topic: &TopicId) -> &[Arc<Question>] {
        self.by_topic
            .get(topic)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn by_topic_and_difficulty(
        &self,
        topic: &TopicId,
        difficulty: Difficulty,
    ) -> &[Arc<Question>] {
        self.by_topic_and_difficulty
            .get(&(topic.clone(), difficulty))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}
