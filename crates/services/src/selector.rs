use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use std::sync::Arc;

use quiz_core::QuestionBank;
use quiz_core::model::{Difficulty, Question, TopicId};

/// Samples question series out of the bank.
pub struct SeriesSelector<'a> {
    bank: &'a QuestionBank,
}

impl<'a> SeriesSelector<'a> {
    #[must_use]
    pub fn new(bank: &'a QuestionBank) -> Self {
        Self { bank }
    }

    /// Candidate questions: the topic's questions of `difficulty`, or every
    /// question of `difficulty` when no topic is given.
    #[must_use]
    pub fn pool(&self, topic: Option<&TopicId>, difficulty: Difficulty) -> Vec<&'a Arc<Question>> {
        match topic {
            Some(topic) => self
                .bank
                .by_topic_and_difficulty(topic, difficulty)
                .iter()
                .collect(),
            None => self
                .bank
                .all()
                .iter()
                .filter(|q| q.difficulty == difficulty)
                .collect(),
        }
    }

    /// Pick `count` distinct questions uniformly at random from the pool.
    ///
    /// Returns an empty series when the pool holds fewer than `count`
    /// questions; that is a "cannot satisfy" answer, not an error.
    pub fn pick_series<R>(
        &self,
        topic: Option<&TopicId>,
        difficulty: Difficulty,
        count: usize,
        rng: &mut R,
    ) -> Vec<Arc<Question>>
    where
        R: Rng + ?Sized,
    {
        let pool = self.pool(topic, difficulty);
        if pool.len() < count {
            tracing::debug!(
                topic = topic.map(TopicId::as_str),
                %difficulty,
                available = pool.len(),
                requested = count,
                "question pool too small"
            );
            return Vec::new();
        }

        let mut series: Vec<Arc<Question>> = pool
            .choose_multiple(rng, count)
            .map(|q| Arc::clone(q))
            .collect();
        series.shuffle(rng);
        series
    }
}
