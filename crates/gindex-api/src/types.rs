use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Mime type the index reports for folders.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

// ── Request body ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct RequestBody<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_index: Option<u32>,
}

// ── Wire response types ─────────────────────────────────────────

/// Folder listings come back either wrapped in `data` or flat.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ListResponse {
    Wrapped { data: RawPage },
    Flat(RawPage),
}

impl ListResponse {
    pub fn into_page(self, parent: &str) -> FolderPage {
        let raw = match self {
            Self::Wrapped { data } => data,
            Self::Flat(page) => page,
        };
        raw.into_page(parent)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawPage {
    pub files: Vec<RawFile>,
    #[serde(default, rename = "nextPageToken", alias = "next_page_token")]
    pub next_page_token: Option<String>,
}

impl RawPage {
    fn into_page(self, parent: &str) -> FolderPage {
        let parent = if parent.ends_with('/') {
            parent.to_string()
        } else {
            format!("{parent}/")
        };
        FolderPage {
            entries: self
                .files
                .into_iter()
                .map(|file| file.into_entry(&parent))
                .collect(),
            next_page_token: self.next_page_token.filter(|t| !t.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawFile {
    pub name: String,
    #[serde(default, rename = "mimeType", alias = "mime_type")]
    pub mime_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size: Option<u64>,
    #[serde(default, rename = "modifiedTime", alias = "modified_time")]
    pub modified_time: Option<String>,
}

impl RawFile {
    fn into_entry(self, parent: &str) -> RemoteEntry {
        let is_folder =
            self.mime_type.as_deref() == Some(FOLDER_MIME) || self.name.ends_with('/');
        let name = self.name.trim_end_matches('/').to_string();
        let (kind, path) = if is_folder {
            (EntryKind::Folder, format!("{parent}{name}/"))
        } else {
            (EntryKind::File, format!("{parent}{name}"))
        };

        RemoteEntry {
            name,
            kind,
            path,
            size: self.size,
            content_type: self.mime_type,
            modified_at: self
                .modified_time
                .as_deref()
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// Sizes arrive as numbers, numeric strings or "7.59 GB" strings.
fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match value {
        serde_json::Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        serde_json::Value::String(s) => gindex_parse::parse_file_size(&s),
        _ => None,
    }))
}

/// Download-link responses, wrapped or flat.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum LinkResponse {
    Wrapped { data: RawLink },
    Flat(RawLink),
}

impl LinkResponse {
    pub fn into_link(self) -> String {
        match self {
            Self::Wrapped { data } => data.link,
            Self::Flat(raw) => raw.link,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawLink {
    pub link: String,
}

// ── Canonical types ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Folder,
}

/// One child of a listed folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Name as listed, without a trailing slash.
    pub name: String,
    pub kind: EntryKind,
    /// Full remote path. Folder paths end with "/".
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl RemoteEntry {
    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FolderPage {
    pub entries: Vec<RemoteEntry>,
    pub next_page_token: Option<String>,
}

/// Metadata returned by a HEAD request on a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}
