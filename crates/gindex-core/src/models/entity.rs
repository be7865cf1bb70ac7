use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entities that resolve to a single downloadable file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Movie,
    Episode,
}

impl EntityKind {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Episode => "episode",
        }
    }
}

/// Key of a signed-URL cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: i64,
}

impl EntityKey {
    pub fn movie(id: i64) -> Self {
        Self {
            kind: EntityKind::Movie,
            id,
        }
    }

    pub fn episode(id: i64) -> Self {
        Self {
            kind: EntityKind::Episode,
            id,
        }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind.as_db_str(), self.id)
    }
}

/// A signed URL as persisted, with its wall-clock expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredUrl {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
