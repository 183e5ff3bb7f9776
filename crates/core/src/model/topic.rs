use serde::{Deserialize, Serialize};

use crate::model::ids::TopicId;

/// A subject area questions are grouped under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub title: String,
    #[serde(default)]
    pub emoji: String,
}

impl Topic {
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, emoji: impl Into<String>) -> Self {
        Self {
            id: TopicId::new(id),
            title: title.into(),
            emoji: emoji.into(),
        }
    }

    /// Title prefixed with the emoji, when there is one.
    #[must_use]
    pub fn label(&self) -> String {
        if self.emoji.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.emoji, self.title)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emoji_is_optional_in_source() {
        let topic: Topic = serde_json::from_str(r#"{"id":"alg","title":"Algebra"}"#).unwrap();
        assert_eq!(topic.id.as_str(), "alg");
        assert_eq!(topic.label(), "Algebra");
    }

    #[test]
    fn label_includes_emoji() {
        let topic = Topic::new("geo", "Geometry", "📐");
        assert_eq!(topic.label(), "📐 Geometry");
    }
}
