mod answer;
mod ids;
mod prefs;
mod question;
mod session;
mod topic;
mod user;

pub use ids::{ParseIdError, QuestionId, TopicId, UserId};

pub use answer::{AnswerChecker, AnswerError, AnswerRecord, AnswerValue};
pub use prefs::{PrefsError, PrefsPatch, QuestionCount, SolutionMode, UserPrefs};
pub use question::{AnswerFormat, Difficulty, InputFormat, Question, VocabularyError};
pub use session::{AwaitInput, Session, SessionMode, SessionProgress};
pub use topic::Topic;
pub use user::{Stats, StatsBucket, UserRow};
