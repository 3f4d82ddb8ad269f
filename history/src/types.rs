use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Identifier of a revision. Larger ids are more recent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(pub u64);

impl RevisionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RevisionId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(RevisionId)
    }
}

impl From<u64> for RevisionId {
    fn from(value: u64) -> Self {
        RevisionId(value)
    }
}

/// A replication target: one wiki page, identified by its database key.
///
/// The key is the title with spaces replaced by underscores, which is also
/// the form used in URLs and directory names.
///
/// ```
/// use history::Entity;
///
/// let page = Entity::new("Main Page");
/// assert_eq!(page.key(), "Main_Page");
/// assert_eq!(page.title(), "Main Page");
/// assert_eq!(Entity::from_key("Main_Page"), page);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity {
    key: String,
}

impl Entity {
    /// Create an entity from a human-readable title
    pub fn new(title: impl AsRef<str>) -> Self {
        Self {
            key: title.as_ref().trim().replace(' ', "_"),
        }
    }

    /// Create an entity from its database key
    pub fn from_key(key: impl AsRef<str>) -> Self {
        Self::new(key)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn title(&self) -> String {
        self.key.replace('_', " ")
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Content of a revision as seen by the replication engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// Plain text content
    Text { text: String },
    /// Content whose model has no plain text form
    Unsupported { model: String },
    /// The page content is gone (deleted page)
    Absent,
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Payload::Text { text: text.into() }
    }

    pub fn unsupported(model: impl Into<String>) -> Self {
        Payload::Unsupported {
            model: model.into(),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Payload::Absent)
    }
}

/// Account name of a wiki user
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One immutable node of a page's back-linked revision chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub id: RevisionId,
    /// Previous revision of the same page, `None` for the first one
    pub parent: Option<RevisionId>,
    pub content: Payload,
    /// Display name of the author, `None` when unknown or suppressed
    pub author: Option<String>,
    #[serde(default)]
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

impl Revision {
    pub fn new(id: impl Into<RevisionId>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            parent: None,
            content: Payload::Absent,
            author: None,
            comment: String::new(),
            timestamp,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<RevisionId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_content(mut self, content: Payload) -> Self {
        self.content = content;
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_content(Payload::text(text))
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn content(&self) -> &Payload {
        &self.content
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
