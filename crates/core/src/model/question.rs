use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{QuestionId, TopicId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum VocabularyError {
    #[error("unknown difficulty: {0:?}")]
    UnknownDifficulty(String),

    #[error("unknown answer format: {0:?}")]
    UnknownAnswerFormat(String),

    #[error("answer format {0} does not take free-form input")]
    NotFreeInput(AnswerFormat),
}

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

/// Question difficulty. Persisted as the settings-menu codes `e` / `m` / `h`;
/// the long names are accepted when reading question sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Difficulty {
    #[serde(rename = "e", alias = "easy")]
    Easy,
    #[default]
    #[serde(rename = "m", alias = "medium")]
    Medium,
    #[serde(rename = "h", alias = "hard")]
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Difficulty::Easy => "e",
            Difficulty::Medium => "m",
            Difficulty::Hard => "h",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Difficulty {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "e" | "easy" => Ok(Difficulty::Easy),
            "m" | "medium" => Ok(Difficulty::Medium),
            "h" | "hard" => Ok(Difficulty::Hard),
            other => Err(VocabularyError::UnknownDifficulty(other.to_string())),
        }
    }
}

//
// ─── ANSWER FORMAT ─────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerFormat {
    SingleChoice,
    MultiChoice,
    Numeric,
    Text,
}

impl AnswerFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerFormat::SingleChoice => "single_choice",
            AnswerFormat::MultiChoice => "multi_choice",
            AnswerFormat::Numeric => "numeric",
            AnswerFormat::Text => "text",
        }
    }

    /// Formats answered with buttons rather than a typed reply.
    #[must_use]
    pub fn is_choice(self) -> bool {
        matches!(self, AnswerFormat::SingleChoice | AnswerFormat::MultiChoice)
    }
}

impl fmt::Display for AnswerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerFormat {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_choice" => Ok(AnswerFormat::SingleChoice),
            "multi_choice" => Ok(AnswerFormat::MultiChoice),
            "numeric" => Ok(AnswerFormat::Numeric),
            "text" => Ok(AnswerFormat::Text),
            other => Err(VocabularyError::UnknownAnswerFormat(other.to_string())),
        }
    }
}

/// Formats that put a session into the await-input sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    Numeric,
    Text,
}

impl From<InputFormat> for AnswerFormat {
    fn from(value: InputFormat) -> Self {
        match value {
            InputFormat::Numeric => AnswerFormat::Numeric,
            InputFormat::Text => AnswerFormat::Text,
        }
    }
}

impl TryFrom<AnswerFormat> for InputFormat {
    type Error = VocabularyError;

    fn try_from(value: AnswerFormat) -> Result<Self, Self::Error> {
        match value {
            AnswerFormat::Numeric => Ok(InputFormat::Numeric),
            AnswerFormat::Text => Ok(InputFormat::Text),
            other => Err(VocabularyError::NotFreeInput(other)),
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A question from the bank. Immutable once loaded.
///
/// `correct_answer` is kept as raw JSON: its shape depends on `answer_format`
/// and is only interpreted by an [`AnswerChecker`](crate::model::AnswerChecker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    #[serde(default)]
    pub title: String,
    pub topic_ids: Vec<TopicId>,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub answer_format: AnswerFormat,
    #[serde(default)]
    pub statement: String,
    /// Older question files carry the prompt here instead of `statement`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default)]
    pub correct_answer: serde_json::Value,
    #[serde(default)]
    pub solution_explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl Question {
    /// The topic statistics are attributed to when no hint is given.
    #[must_use]
    pub fn primary_topic(&self) -> Option<&TopicId> {
        self.topic_ids.first()
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        if self.statement.is_empty() {
            self.question.as_deref().unwrap_or_default()
        } else {
            &self.statement
        }
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        self.options.as_deref().unwrap_or_default()
    }
}
