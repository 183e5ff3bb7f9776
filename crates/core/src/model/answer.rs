use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::model::question::{AnswerFormat, Question};

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("answer payload does not fit format {format}: {value}")]
    PayloadShape {
        format: AnswerFormat,
        value: serde_json::Value,
    },

    #[error("numeric answer must be finite (got {0})")]
    NonFiniteNumber(f64),

    #[error("question expects {expected} but the answer is {got}")]
    FormatMismatch {
        expected: AnswerFormat,
        got: AnswerFormat,
    },
}

/// A user's answer payload, one shape per [`AnswerFormat`].
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerValue {
    /// Index into `Question::options`.
    SingleChoice(u32),
    /// Set of indices into `Question::options`.
    MultiChoice(BTreeSet<u32>),
    Numeric(f64),
    Text(String),
}

impl AnswerValue {
    #[must_use]
    pub fn format(&self) -> AnswerFormat {
        match self {
            AnswerValue::SingleChoice(_) => AnswerFormat::SingleChoice,
            AnswerValue::MultiChoice(_) => AnswerFormat::MultiChoice,
            AnswerValue::Numeric(_) => AnswerFormat::Numeric,
            AnswerValue::Text(_) => AnswerFormat::Text,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            AnswerValue::SingleChoice(idx) => serde_json::Value::from(*idx),
            AnswerValue::MultiChoice(set) => set.iter().copied().collect(),
            AnswerValue::Numeric(n) => serde_json::Value::from(*n),
            AnswerValue::Text(text) => serde_json::Value::from(text.as_str()),
        }
    }

    fn from_json(format: AnswerFormat, value: serde_json::Value) -> Result<Self, AnswerError> {
        let parsed = match (format, &value) {
            (AnswerFormat::SingleChoice, v) => v
                .as_u64()
                .and_then(|idx| u32::try_from(idx).ok())
                .map(AnswerValue::SingleChoice),
            (AnswerFormat::MultiChoice, serde_json::Value::Array(items)) => items
                .iter()
                .map(|item| item.as_u64().and_then(|idx| u32::try_from(idx).ok()))
                .collect::<Option<BTreeSet<u32>>>()
                .map(AnswerValue::MultiChoice),
            (AnswerFormat::Numeric, v) => v.as_f64().map(AnswerValue::Numeric),
            (AnswerFormat::Text, serde_json::Value::String(text)) => {
                Some(AnswerValue::Text(text.clone()))
            }
            _ => None,
        };
        let parsed = parsed.ok_or(AnswerError::PayloadShape { format, value })?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<(), AnswerError> {
        match self {
            AnswerValue::Numeric(n) if !n.is_finite() => Err(AnswerError::NonFiniteNumber(*n)),
            _ => Ok(()),
        }
    }
}

/// Decides whether an answer to a question is correct.
///
/// The comparison rules (numeric tolerance, set equality, text
/// normalisation) belong to the dispatcher; the store only records the
/// verdict.
pub trait AnswerChecker {
    fn is_correct(&self, question: &Question, answer: &AnswerValue) -> bool;
}

impl<F> AnswerChecker for F
where
    F: Fn(&Question, &AnswerValue) -> bool,
{
    fn is_correct(&self, question: &Question, answer: &AnswerValue) -> bool {
        self(question, answer)
    }
}

/// The recorded answer to one question of a session.
///
/// Persisted as `{"format": ..., "value": ..., "is_correct": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAnswerRecord", into = "RawAnswerRecord")]
pub struct AnswerRecord {
    value: AnswerValue,
    is_correct: bool,
}

impl AnswerRecord {
    /// # Errors
    ///
    /// Returns `AnswerError::NonFiniteNumber` for a NaN or infinite numeric answer.
    pub fn new(value: AnswerValue, is_correct: bool) -> Result<Self, AnswerError> {
        value.validate()?;
        Ok(Self { value, is_correct })
    }

    /// Build a record for `question`, letting `checker` decide correctness.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::FormatMismatch` if the payload does not match the
    /// question's `answer_format`, or `NonFiniteNumber` for invalid numbers.
    pub fn checked(
        question: &Question,
        value: AnswerValue,
        checker: &impl AnswerChecker,
    ) -> Result<Self, AnswerError> {
        if value.format() != question.answer_format {
            return Err(AnswerError::FormatMismatch {
                expected: question.answer_format,
                got: value.format(),
            });
        }
        value.validate()?;
        let is_correct = checker.is_correct(question, &value);
        Ok(Self { value, is_correct })
    }

    #[must_use]
    pub fn format(&self) -> AnswerFormat {
        self.value.format()
    }

    #[must_use]
    pub fn value(&self) -> &AnswerValue {
        &self.value
    }

    #[must_use]
    pub fn is_correct(&self) -> bool {
        self.is_correct
    }
}

#[derive(Serialize, Deserialize)]
struct RawAnswerRecord {
    format: AnswerFormat,
    value: serde_json::Value,
    #[serde(default)]
    is_correct: bool,
}

impl TryFrom<RawAnswerRecord> for AnswerRecord {
    type Error = AnswerError;

    fn try_from(raw: RawAnswerRecord) -> Result<Self, Self::Error> {
        let value = AnswerValue::from_json(raw.format, raw.value)?;
        Ok(Self {
            value,
            is_correct: raw.is_correct,
        })
    }
}

impl From<AnswerRecord> for RawAnswerRecord {
    fn from(record: AnswerRecord) -> Self {
        Self {
            format: record.value.format(),
            value: record.value.to_json(),
            is_correct: record.is_correct,
        }
    }
}
