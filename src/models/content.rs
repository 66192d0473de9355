use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of asynchronous content an item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Image,
    Profile,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Image => "image",
            ContentKind::Profile => "profile",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of asynchronous content (forum post, image, profile update).
///
/// Immutable once created. The orchestrator owns it while it is being
/// processed; its lifecycle ends when the Decision is handed to the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub author_id: String,
    pub kind: ContentKind,
    /// Inline text (post body, profile bio, image caption)
    pub text: Option<String>,
    /// Reference to an out-of-band payload such as an image URL
    pub payload_ref: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub channel_id: Option<String>,
}

impl ContentItem {
    /// Build a text item submitted now.
    pub fn text(id: impl Into<String>, author_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author_id: author_id.into(),
            kind: ContentKind::Text,
            text: Some(text.into()),
            payload_ref: None,
            submitted_at: Utc::now(),
            channel_id: None,
        }
    }

    /// Build an image item referencing an external payload.
    pub fn image(
        id: impl Into<String>,
        author_id: impl Into<String>,
        payload_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            author_id: author_id.into(),
            kind: ContentKind::Image,
            text: None,
            payload_ref: Some(payload_ref.into()),
            submitted_at: Utc::now(),
            channel_id: None,
        }
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn submitted_at(mut self, at: DateTime<Utc>) -> Self {
        self.submitted_at = at;
        self
    }

    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}
