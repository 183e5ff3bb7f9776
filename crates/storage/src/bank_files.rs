//! Reading the topic and question sources into a [`QuestionBank`].

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use quiz_core::model::{Question, Topic};
use quiz_core::{BankError, QuestionBank};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BankFileError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Bank(#[from] BankError),
}

/// `topics.json` is an object wrapping the list.
#[derive(Debug, Deserialize)]
struct TopicsFile {
    #[serde(default)]
    topics: Vec<Topic>,
}

/// Parse the topics source (`{"topics": [...]}`).
///
/// # Errors
///
/// Returns `serde_json::Error` on malformed content.
pub fn parse_topics(raw: &str) -> Result<Vec<Topic>, serde_json::Error> {
    serde_json::from_str::<TopicsFile>(raw).map(|file| file.topics)
}

/// Parse the questions source (a plain array).
///
/// # Errors
///
/// Returns `serde_json::Error` on malformed content or if the root is not an array.
pub fn parse_questions(raw: &str) -> Result<Vec<Question>, serde_json::Error> {
    serde_json::from_str(raw)
}

/// Load and index both sources.
///
/// # Errors
///
/// Any read, parse or referential error aborts loading; there is no partial bank.
pub fn load_bank(topics_path: &Path, questions_path: &Path) -> Result<QuestionBank, BankFileError> {
    let topics = parse_topics(&read(topics_path)?).map_err(|source| BankFileError::Parse {
        path: topics_path.to_path_buf(),
        source,
    })?;
    let questions =
        parse_questions(&read(questions_path)?).map_err(|source| BankFileError::Parse {
            path: questions_path.to_path_buf(),
            source,
        })?;

    let bank = QuestionBank::new(topics, questions)?;
    tracing::info!(
        topics = bank.topics().len(),
        questions = bank.len(),
        "question bank loaded"
    );
    Ok(bank)
}

fn read(path: &Path) -> Result<String, BankFileError> {
    fs::read_to_string(path).map_err(|source| BankFileError::Read {
        path: path.to_path_buf(),
        source,
    })
}
