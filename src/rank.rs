//! Feed ranking with a fixed interaction heuristic.
//!
//! Orders an aggregated tweet list for the home feed, or falls back to
//! plain recency for every other listing.
//!
//! # Algorithm
//!
//! Heuristic score = `like_count + views + comment_count`
//!
//! # Tie-Breaking
//!
//! For deterministic ordering:
//! 1. Heuristic score (descending)
//! 2. `retweet_count` (descending)
//! 3. `bookmark_count` (descending)
//! 4. `created_at` (most recent first)
//!
//! The scoring formula is a fixed, unweighted sum with a fixed tie-break
//! order. It is a best-effort engagement heuristic; the exact total order
//! is part of the contract so crafted fixtures sort deterministically.

use crate::model::AggregatedTweet;

/// Ranking mode for a tweet listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankMode {
    /// Sort by `created_at` descending. Used for tweet-children listings,
    /// bookmarks, likes, search, and for home feeds of viewers who follow
    /// no one.
    #[default]
    Chronological,
    /// Engagement-score ordering. Home feed only, and only when the
    /// requesting user follows at least one other user.
    Heuristic,
}

impl std::fmt::Display for RankMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chronological => write!(f, "chronological"),
            Self::Heuristic => write!(f, "heuristic"),
        }
    }
}

impl std::str::FromStr for RankMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chronological" | "recency" | "latest" => Ok(Self::Chronological),
            "heuristic" | "engagement" | "top" => Ok(Self::Heuristic),
            _ => Err(format!(
                "unknown rank mode: '{s}'. Use 'chronological' or 'heuristic'"
            )),
        }
    }
}

/// The primary ranking key: an unweighted interaction sum.
#[must_use]
pub const fn engagement_score(tweet: &AggregatedTweet) -> i64 {
    tweet.like_count + tweet.views + tweet.comment_count
}

/// Order an aggregated tweet list.
///
/// Pure function: no I/O, stable sort, output length equals input length.
#[must_use]
pub fn rank(mut items: Vec<AggregatedTweet>, mode: RankMode) -> Vec<AggregatedTweet> {
    match mode {
        RankMode::Chronological => {
            items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        RankMode::Heuristic => {
            items.sort_by(|a, b| {
                // Level 1: engagement score (descending)
                engagement_score(b)
                    .cmp(&engagement_score(a))
                    // Level 2: retweet count (descending)
                    .then_with(|| b.retweet_count.cmp(&a.retweet_count))
                    // Level 3: bookmark count (descending)
                    .then_with(|| b.bookmark_count.cmp(&a.bookmark_count))
                    // Level 4: recency (most recent first)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            });
        }
    }
    items
}
