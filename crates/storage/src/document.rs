use chrono::{DateTime, Utc};
use quiz_core::model::{Session, Stats, TopicId, UserId, UserPrefs, UserRow};
use quiz_core::time::iso_seconds;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Schema tag written into every users document.
pub const USERS_DOCUMENT_VERSION: &str = "users.v1";

fn default_version() -> String {
    USERS_DOCUMENT_VERSION.to_string()
}

/// The whole persisted user state, rewritten as one unit on every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsersDocument {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, with = "iso_seconds")]
    pub updated_at: DateTime<Utc>,
    pub users: BTreeMap<UserId, UserRow>,
}

impl UsersDocument {
    /// An empty document stamped with `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            version: default_version(),
            updated_at: now,
            users: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn user(&self, id: UserId) -> Option<&UserRow> {
        self.users.get(&id)
    }

    #[must_use]
    pub fn is_current_version(&self) -> bool {
        self.version == USERS_DOCUMENT_VERSION
    }

    /// Repair every row read back from disk; returns the ids that changed.
    pub fn repair(&mut self) -> Vec<UserId> {
        self.users
            .iter_mut()
            .filter_map(|(id, row)| row.repair().then_some(*id))
            .collect()
    }
}

// ─── Row-by-row decoding ───────────────────────────────────────────────────────

/// The document envelope with rows kept as raw JSON.
#[derive(Deserialize)]
struct RawDocument {
    #[serde(default = "default_version")]
    version: String,
    #[serde(default, with = "iso_seconds")]
    updated_at: DateTime<Utc>,
    users: BTreeMap<String, Value>,
}

/// Decode a stored users document one row at a time.
///
/// A row whose `prefs`, `session`, `last_topic_id` or `stats` do not decode
/// gets those fields reset to their defaults; a row that still does not
/// decode, or whose key is not a user id, is dropped. Both are logged with
/// the user id. Only an unreadable envelope is an error.
pub(crate) fn decode_rows(raw: &str) -> Result<UsersDocument, serde_json::Error> {
    let envelope: RawDocument = serde_json::from_str(raw)?;
    let mut users = BTreeMap::new();
    for (key, value) in envelope.users {
        let Ok(id) = key.parse::<UserId>() else {
            tracing::warn!(user = %key, "dropping users entry keyed by a non-numeric id");
            continue;
        };
        match decode_row(value) {
            Ok((row, reset)) => {
                if !reset.is_empty() {
                    tracing::warn!(user = %id, fields = ?reset, "reset unreadable fields of user row");
                }
                users.insert(id, row);
            }
            Err(err) => tracing::warn!(user = %id, error = %err, "dropping unreadable user row"),
        }
    }
    Ok(UsersDocument {
        version: envelope.version,
        updated_at: envelope.updated_at,
        users,
    })
}

fn decode_row(mut value: Value) -> Result<(UserRow, Vec<&'static str>), serde_json::Error> {
    let err = match UserRow::deserialize(&value) {
        Ok(row) => return Ok((row, Vec::new())),
        Err(err) => err,
    };
    let Some(fields) = value.as_object_mut() else {
        return Err(err);
    };

    let checks: [(&'static str, fn(&Value) -> bool); 4] = [
        ("prefs", |v| UserPrefs::deserialize(v).is_ok()),
        ("session", |v| Option::<Session>::deserialize(v).is_ok()),
        ("last_topic_id", |v| Option::<TopicId>::deserialize(v).is_ok()),
        ("stats", |v| Stats::deserialize(v).is_ok()),
    ];
    let mut reset = Vec::new();
    for (name, decodes) in checks {
        if fields.get(name).is_some_and(|v| !decodes(v)) {
            fields.remove(name);
            reset.push(name);
        }
    }
    if reset.is_empty() {
        return Err(err);
    }
    UserRow::deserialize(&value).map(|row| (row, reset))
}
