use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::{ChannelId, ContentId, FacilityId, UserId};

/// Kind of content node being viewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Video,
    Audio,
    Exercise,
    Document,
    Html5,
    Slideshow,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown content kind: {0}")]
pub struct UnknownContentKind(String);

impl ContentKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Video => "video",
            ContentKind::Audio => "audio",
            ContentKind::Exercise => "exercise",
            ContentKind::Document => "document",
            ContentKind::Html5 => "html5",
            ContentKind::Slideshow => "slideshow",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = UnknownContentKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "exercise" => Ok(Self::Exercise),
            "document" => Ok(Self::Document),
            "html5" => Ok(Self::Html5),
            "slideshow" => Ok(Self::Slideshow),
            other => Err(UnknownContentKind(other.to_owned())),
        }
    }
}

/// The (channel, content, kind) triple a viewing session is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRef {
    pub channel_id: ChannelId,
    pub content_id: ContentId,
    pub kind: ContentKind,
}

impl ContentRef {
    #[must_use]
    pub fn new(channel_id: ChannelId, content_id: ContentId, kind: ContentKind) -> Self {
        Self {
            channel_id,
            content_id,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub root: Option<ContentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    pub id: FacilityId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub dataset: Option<String>,
}

/// Sign-in policy flags stored on a facility dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub learner_can_sign_up: bool,
    #[serde(default)]
    pub learner_can_edit_username: bool,
    #[serde(default)]
    pub learner_can_login_with_no_password: bool,
}

/// Aggregate progress across all content for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProgress {
    pub id: UserId,
    #[serde(default)]
    pub progress: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_kind_parses_case_insensitively() {
        assert_eq!("Video".parse::<ContentKind>().unwrap(), ContentKind::Video);
        assert!("podcast".parse::<ContentKind>().is_err());
    }

    #[test]
    fn content_kind_serializes_lowercase() {
        let value = serde_json::to_value(ContentKind::Html5).unwrap();
        assert_eq!(value, serde_json::json!("html5"));
    }
}
