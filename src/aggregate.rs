//! Tweet aggregation: raw rows to denormalized view models.
//!
//! Takes one page of tweet rows with their pre-joined relation lists and
//! produces [`AggregatedTweet`]s carrying the derived per-tweet counts.
//! Child counts come from a single batched store query over the whole
//! page's id set, never one query per tweet.

use crate::error::Result;
use crate::model::{AggregatedTweet, RawTweet, TweetType};
use crate::store::TweetStore;
use std::collections::HashMap;

#[derive(Debug, Default, Clone, Copy)]
struct ChildCounts {
    retweets: i64,
    comments: i64,
    quotes: i64,
}

/// Aggregate a page of raw tweets into denormalized view models.
///
/// Guarantees: output length equals input length, input order is
/// preserved, and a failed child-count query fails the whole call —
/// counts are never silently zeroed.
///
/// # Errors
///
/// Returns an error if the batched child query fails.
#[allow(clippy::cast_possible_wrap)]
pub fn aggregate(store: &TweetStore, tweets: Vec<RawTweet>) -> Result<Vec<AggregatedTweet>> {
    if tweets.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = tweets.iter().map(|raw| raw.tweet.id.clone()).collect();
    let children = store.find_child_tweets(&ids, &TweetType::CHILD_TYPES)?;

    let mut counts: HashMap<String, ChildCounts> = HashMap::new();
    for child in children {
        let Some(parent_id) = child.parent_id else {
            continue;
        };
        let entry = counts.entry(parent_id).or_default();
        match child.tweet_type {
            TweetType::Retweet => entry.retweets += 1,
            TweetType::Comment => entry.comments += 1,
            TweetType::QuoteTweet => entry.quotes += 1,
            TweetType::Original => {}
        }
    }

    let aggregated = tweets
        .into_iter()
        .map(|raw| {
            let child_counts = counts.get(&raw.tweet.id).copied().unwrap_or_default();
            let tweet = raw.tweet;
            AggregatedTweet {
                bookmark_count: raw.bookmarked_by.len() as i64,
                like_count: raw.liked_by.len() as i64,
                retweet_count: child_counts.retweets,
                comment_count: child_counts.comments,
                quote_count: child_counts.quotes,
                views: tweet.guest_view_count + tweet.user_view_count,
                id: tweet.id,
                tweet_type: tweet.tweet_type,
                audience: tweet.audience,
                content: tweet.content,
                parent_id: tweet.parent_id,
                author_id: tweet.author_id,
                author: raw.author,
                hashtags: raw.hashtags,
                mentions: raw.mentions,
                medias: raw.medias,
                guest_view_count: tweet.guest_view_count,
                user_view_count: tweet.user_view_count,
                created_at: tweet.created_at,
                updated_at: tweet.updated_at,
            }
        })
        .collect();

    Ok(aggregated)
}
