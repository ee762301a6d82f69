//! Data models for the feed core.
//!
//! These structures represent canonical entity rows as the store returns
//! them, plus the request-scoped derived views built by the aggregator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of tweet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TweetType {
    Original,
    Retweet,
    Comment,
    QuoteTweet,
}

impl TweetType {
    /// All child kinds, i.e. every type that carries a `parent_id`.
    pub const CHILD_TYPES: [Self; 3] = [Self::Retweet, Self::Comment, Self::QuoteTweet];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Retweet => "retweet",
            Self::Comment => "comment",
            Self::QuoteTweet => "quote_tweet",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "original" => Some(Self::Original),
            "retweet" => Some(Self::Retweet),
            "comment" => Some(Self::Comment),
            "quote_tweet" => Some(Self::QuoteTweet),
            _ => None,
        }
    }

    /// Whether this type must reference a parent tweet.
    #[must_use]
    pub const fn is_child(self) -> bool {
        !matches!(self, Self::Original)
    }
}

impl std::fmt::Display for TweetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility scope of a tweet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TweetAudience {
    /// Visible to anyone, including anonymous viewers.
    Everyone,
    /// Restricted to the author and the author's circle members.
    Circle,
}

impl TweetAudience {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Everyone => "everyone",
            Self::Circle => "circle",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "everyone" => Some(Self::Everyone),
            "circle" => Some(Self::Circle),
            _ => None,
        }
    }
}

impl std::fmt::Display for TweetAudience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of media attached to a tweet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
    Hls,
}

impl MediaType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Hls => "hls",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "hls" => Some(Self::Hls),
            _ => None,
        }
    }
}

/// Account verification state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserVerifyStatus {
    Unverified,
    Verified,
    Banned,
}

impl UserVerifyStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::Verified => "verified",
            Self::Banned => "banned",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unverified" => Some(Self::Unverified),
            "verified" => Some(Self::Verified),
            "banned" => Some(Self::Banned),
            _ => None,
        }
    }
}

/// A canonical tweet row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub tweet_type: TweetType,
    pub audience: TweetAudience,
    /// Empty only for retweets.
    pub content: String,
    /// Set iff `tweet_type` is a child type.
    pub parent_id: Option<String>,
    pub author_id: String,
    pub guest_view_count: i64,
    pub user_view_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Media attached to a tweet, lifecycle bound to its creation transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TweetMedia {
    pub url: String,
    pub media_type: MediaType,
}

/// A full user row as stored. Never serialized to callers directly;
/// outward-facing paths go through [`PublicUser`].
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub email_verify_token: Option<String>,
    pub forgot_password_token: Option<String>,
    pub date_of_birth: Option<DateTime<Utc>>,
    pub verify: UserVerifyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Allow-list projection of a user for mention/author output.
///
/// Sensitive fields (password hash, verification tokens, date of birth)
/// are absent from the type itself, so they cannot leak at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub username: String,
    pub email: String,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

/// A bookmark join row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bookmark {
    pub user_id: String,
    pub tweet_id: String,
}

/// A like join row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Like {
    pub user_id: String,
    pub tweet_id: String,
}

/// An authenticated viewer identity, decoded upstream from the access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub id: String,
}

impl Viewer {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A tweet row together with its pre-joined relation lists, as fetched
/// by the store for one page of results.
#[derive(Debug, Clone)]
pub struct RawTweet {
    pub tweet: Tweet,
    pub author: Option<PublicUser>,
    pub mentions: Vec<PublicUser>,
    pub hashtags: Vec<String>,
    pub medias: Vec<TweetMedia>,
    /// Ids of users who bookmarked this tweet.
    pub bookmarked_by: Vec<String>,
    /// Ids of users who liked this tweet.
    pub liked_by: Vec<String>,
}

/// The denormalized, request-scoped projection of a tweet plus its derived
/// counts and relations. Rebuilt on every read, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedTweet {
    pub id: String,
    pub tweet_type: TweetType,
    pub audience: TweetAudience,
    pub content: String,
    pub parent_id: Option<String>,
    pub author_id: String,
    pub author: Option<PublicUser>,
    pub hashtags: Vec<String>,
    pub mentions: Vec<PublicUser>,
    pub medias: Vec<TweetMedia>,
    pub bookmark_count: i64,
    pub like_count: i64,
    pub retweet_count: i64,
    pub comment_count: i64,
    pub quote_count: i64,
    pub guest_view_count: i64,
    pub user_view_count: i64,
    /// Always `guest_view_count + user_view_count`.
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Updated view counters returned by the single-row increment path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewCounters {
    pub guest_view_count: i64,
    pub user_view_count: i64,
}

impl ViewCounters {
    /// Combined view count.
    #[must_use]
    pub const fn total(self) -> i64 {
        self.guest_view_count + self.user_view_count
    }
}

/// Request body for creating a tweet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TweetDraft {
    pub tweet_type: TweetType,
    pub audience: TweetAudience,
    pub content: String,
    pub parent_id: Option<String>,
    /// Hashtag names, without the leading `#`.
    #[serde(default)]
    pub hashtags: Vec<String>,
    /// Ids of mentioned users.
    #[serde(default)]
    pub mentions: Vec<String>,
    #[serde(default)]
    pub medias: Vec<TweetMedia>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tweet_type_round_trips_through_str() {
        for tweet_type in [
            TweetType::Original,
            TweetType::Retweet,
            TweetType::Comment,
            TweetType::QuoteTweet,
        ] {
            assert_eq!(TweetType::from_str(tweet_type.as_str()), Some(tweet_type));
        }
        assert_eq!(TweetType::from_str("reply"), None);
    }

    #[test]
    fn child_types_require_parent() {
        assert!(!TweetType::Original.is_child());
        assert!(TweetType::Retweet.is_child());
        assert!(TweetType::Comment.is_child());
        assert!(TweetType::QuoteTweet.is_child());
    }

    #[test]
    fn public_user_drops_sensitive_fields() {
        let user = User {
            id: "u1".to_string(),
            name: "Ada".to_string(),
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            password: "argon2-hash".to_string(),
            email_verify_token: Some("evt".to_string()),
            forgot_password_token: None,
            date_of_birth: None,
            verify: UserVerifyStatus::Verified,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let public = PublicUser::from(&user);
        let json = serde_json::to_value(&public).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 4);
        for key in ["id", "name", "username", "email"] {
            assert!(object.contains_key(key));
        }
        for sensitive in ["password", "email_verify_token", "forgot_password_token", "date_of_birth"] {
            assert!(!object.contains_key(sensitive));
        }
    }

    #[test]
    fn view_counters_total_sums_both_sides() {
        let counters = ViewCounters {
            guest_view_count: 5,
            user_view_count: 2,
        };
        assert_eq!(counters.total(), 7);
    }
}
