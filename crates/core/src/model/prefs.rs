use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::question::Difficulty;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PrefsError {
    #[error("question count must be one of 3, 5 or 10 (got {0})")]
    InvalidQuestionCount(String),

    #[error("solution mode must be `imm` or `end` (got {0:?})")]
    InvalidSolutionMode(String),
}

//
// ─── VOCABULARY ────────────────────────────────────────────────────────────────
//

/// Series length offered by the settings menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QuestionCount {
    Three,
    #[default]
    Five,
    Ten,
}

impl QuestionCount {
    pub const ALL: [QuestionCount; 3] = [QuestionCount::Three, QuestionCount::Five, QuestionCount::Ten];

    #[must_use]
    pub fn get(self) -> usize {
        usize::from(u8::from(self))
    }
}

impl From<QuestionCount> for u8 {
    fn from(value: QuestionCount) -> Self {
        match value {
            QuestionCount::Three => 3,
            QuestionCount::Five => 5,
            QuestionCount::Ten => 10,
        }
    }
}

impl TryFrom<u8> for QuestionCount {
    type Error = PrefsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(QuestionCount::Three),
            5 => Ok(QuestionCount::Five),
            10 => Ok(QuestionCount::Ten),
            other => Err(PrefsError::InvalidQuestionCount(other.to_string())),
        }
    }
}

impl FromStr for QuestionCount {
    type Err = PrefsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u8>()
            .map_err(|_| PrefsError::InvalidQuestionCount(s.to_string()))
            .and_then(QuestionCount::try_from)
    }
}

impl fmt::Display for QuestionCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// When the solution of a question is shown: right after answering, or at
/// the end of the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SolutionMode {
    #[default]
    #[serde(rename = "imm")]
    Immediate,
    #[serde(rename = "end")]
    AtEnd,
}

impl SolutionMode {
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            SolutionMode::Immediate => "imm",
            SolutionMode::AtEnd => "end",
        }
    }
}

impl FromStr for SolutionMode {
    type Err = PrefsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "imm" => Ok(SolutionMode::Immediate),
            "end" => Ok(SolutionMode::AtEnd),
            other => Err(PrefsError::InvalidSolutionMode(other.to_string())),
        }
    }
}

//
// ─── PREFS ─────────────────────────────────────────────────────────────────────
//

/// Per-user quiz preferences. Defaults to five medium questions with
/// immediate solutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserPrefs {
    pub qcount: QuestionCount,
    pub diff: Difficulty,
    pub sol: SolutionMode,
}

/// Partial update of [`UserPrefs`]. Only typed values can be expressed, so a
/// merge can never store something outside the settings vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrefsPatch {
    pub qcount: Option<QuestionCount>,
    pub diff: Option<Difficulty>,
    pub sol: Option<SolutionMode>,
}

impl PrefsPatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn qcount(mut self, qcount: QuestionCount) -> Self {
        self.qcount = Some(qcount);
        self
    }

    #[must_use]
    pub fn diff(mut self, diff: Difficulty) -> Self {
        self.diff = Some(diff);
        self
    }

    #[must_use]
    pub fn sol(mut self, sol: SolutionMode) -> Self {
        self.sol = Some(sol);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.qcount.is_none() && self.diff.is_none() && self.sol.is_none()
    }

    /// Merge into `prefs`, returning whether anything changed.
    pub fn apply_to(&self, prefs: &mut UserPrefs) -> bool {
        let before = *prefs;
        if let Some(qcount) = self.qcount {
            prefs.qcount = qcount;
        }
        if let Some(diff) = self.diff {
            prefs.diff = diff;
        }
        if let Some(sol) = self.sol {
            prefs.sol = sol;
        }
        before != *prefs
    }
}
