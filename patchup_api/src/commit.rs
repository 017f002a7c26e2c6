use serde::{Deserialize, Serialize};

/// Upstream commit information used to build a patch envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMetadata {
    /// Full object identifier (git SHA).
    pub id: String,
    /// First line of the commit message.
    pub subject: String,
    /// Remainder of the commit message after the subject.
    #[serde(default)]
    pub body: String,
    /// Author date in RFC 2822 form, when available.
    #[serde(default)]
    pub author_date: Option<String>,
    /// Author date as `YYYY-MM-DD`, when available.
    #[serde(default)]
    pub short_date: Option<String>,
}

impl CommitMetadata {
    /// Metadata with only an id and subject.
    pub fn new(id: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            body: String::new(),
            author_date: None,
            short_date: None,
        }
    }

    /// Attach a message body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}
