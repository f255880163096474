//! Shared domain enumerations aligned with persisted database enums.

use serde::{Deserialize, Serialize};

/// A supported social platform, selected by its lowercase identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "platform", rename_all = "snake_case")]
pub enum Platform {
    X,
    Facebook,
    Instagram,
    Youtube,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::X,
        Platform::Facebook,
        Platform::Instagram,
        Platform::Youtube,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::X => "x",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::Youtube => "youtube",
        }
    }

    /// Report type key used by the sync-completion log and cooldown lookups.
    pub fn report_type(self) -> &'static str {
        match self {
            Platform::X => "x_metrics",
            Platform::Facebook => "facebook_metrics",
            Platform::Instagram => "instagram_metrics",
            Platform::Youtube => "youtube_metrics",
        }
    }

    /// Platforms that cannot publish a bare text post.
    pub fn requires_media(self) -> bool {
        matches!(self, Platform::Instagram | Platform::Youtube)
    }

    /// Platforms that publish on behalf of a secondary page or channel id.
    pub fn requires_page_id(self) -> bool {
        matches!(self, Platform::Facebook)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Platform {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "x" => Ok(Platform::X),
            "facebook" => Ok(Platform::Facebook),
            "instagram" => Ok(Platform::Instagram),
            "youtube" => Ok(Platform::Youtube),
            _ => Err(()),
        }
    }
}

/// Lifecycle of a scheduled post (mirrors Postgres enum `post_status`).
///
/// Transitions are monotonic: `scheduled -> posted | failed`. The only path
/// back is the manual `failed -> scheduled` retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "post_status", rename_all = "snake_case")]
pub enum PostStatus {
    Scheduled,
    Posted,
    Failed,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Scheduled => "scheduled",
            PostStatus::Posted => "posted",
            PostStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for PostStatus {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "scheduled" => Ok(PostStatus::Scheduled),
            "posted" => Ok(PostStatus::Posted),
            "failed" => Ok(PostStatus::Failed),
            _ => Err(()),
        }
    }
}
