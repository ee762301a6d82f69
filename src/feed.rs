//! Feed operations: query shaping, pagination, and the listing endpoints.
//!
//! [`FeedService`] wires the store, aggregator, ranker, visibility gate and
//! view recorder into the operations request handlers call. It holds the
//! store as an explicit dependency; there is no module-level state.

use crate::aggregate::aggregate;
use crate::error::{AviaryError, Result};
use crate::model::{AggregatedTweet, MediaType, Tweet, TweetDraft, TweetType, Viewer};
use crate::rank::{RankMode, rank};
use crate::store::{AudienceScope, TweetFilter, TweetStore};
use crate::views;
use crate::visibility;
use std::collections::HashSet;
use tracing::debug;

/// Upper bound on page size.
pub const MAX_PAGE_LIMIT: usize = 100;

/// Validated, 1-indexed pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    limit: usize,
    page: usize,
}

impl Pagination {
    /// Validate raw pagination parameters.
    ///
    /// # Errors
    ///
    /// Returns [`AviaryError::Validation`] if `limit` is outside
    /// `1..=100` or `page` is zero.
    pub fn new(limit: usize, page: usize) -> Result<Self> {
        if limit < 1 || limit > MAX_PAGE_LIMIT {
            return Err(AviaryError::validation(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }
        if page < 1 {
            return Err(AviaryError::validation("page must be at least 1"));
        }
        Ok(Self { limit, page })
    }

    #[must_use]
    pub const fn limit(self) -> usize {
        self.limit
    }

    #[must_use]
    pub const fn page(self) -> usize {
        self.page
    }

    const fn offset(self) -> usize {
        (self.page - 1) * self.limit
    }
}

/// One page of results with its pagination metadata.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: usize,
    pub page: usize,
}

impl<T> Page<T> {
    /// Number of pages needed for `total` items at this limit.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn total_pages(&self) -> i64 {
        let limit = self.limit as i64;
        (self.total + limit - 1) / limit
    }
}

/// Which authors a search should consider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeopleFollow {
    /// Tweets from anyone.
    #[default]
    Anyone,
    /// Only tweets from users the viewer follows (plus the viewer).
    Following,
}

/// The feed core's exposed operations.
///
/// Owns the entity store; construct one per store handle.
pub struct FeedService {
    store: TweetStore,
}

impl FeedService {
    #[must_use]
    pub const fn new(store: TweetStore) -> Self {
        Self { store }
    }

    /// Access the underlying store.
    #[must_use]
    pub const fn store(&self) -> &TweetStore {
        &self.store
    }

    /// Mutable access to the underlying store.
    pub const fn store_mut(&mut self) -> &mut TweetStore {
        &mut self.store
    }

    // =========================================================================
    // Tweet creation
    // =========================================================================

    /// Validate a draft and create the tweet with its media, hashtag and
    /// mention rows in one atomic transaction.
    ///
    /// # Errors
    ///
    /// Returns [`AviaryError::Validation`] for drafts violating the
    /// type/content/parent/mention rules, [`AviaryError::TweetNotFound`] /
    /// [`AviaryError::UserNotFound`] for dangling references, or a store
    /// error if the transaction fails.
    pub fn create_tweet(&mut self, author_id: &str, draft: &TweetDraft) -> Result<Tweet> {
        self.validate_draft(draft)?;
        self.store.create_tweet(author_id, draft)
    }

    fn validate_draft(&self, draft: &TweetDraft) -> Result<()> {
        if draft.tweet_type.is_child() {
            let Some(parent_id) = &draft.parent_id else {
                return Err(AviaryError::validation(format!(
                    "parent_id is required for a {}",
                    draft.tweet_type
                )));
            };
            if self.store.get_tweet(parent_id)?.is_none() {
                return Err(AviaryError::tweet_not_found(parent_id));
            }
        } else if draft.parent_id.is_some() {
            return Err(AviaryError::validation(
                "parent_id must be null for an original tweet",
            ));
        }

        if draft.tweet_type == TweetType::Retweet {
            if !draft.content.is_empty() {
                return Err(AviaryError::validation(
                    "content must be an empty string for a retweet",
                ));
            }
        } else if draft.content.is_empty()
            && draft.hashtags.is_empty()
            && draft.mentions.is_empty()
        {
            return Err(AviaryError::validation(
                "content must be a non-empty string",
            ));
        }

        let unique_mentions: HashSet<&String> = draft.mentions.iter().collect();
        if unique_mentions.len() != draft.mentions.len() {
            return Err(AviaryError::validation("duplicate mentions are not allowed"));
        }
        for mentioned_user_id in &draft.mentions {
            if self.store.get_user(mentioned_user_id)?.is_none() {
                return Err(AviaryError::user_not_found(mentioned_user_id));
            }
        }

        Ok(())
    }

    // =========================================================================
    // Listings
    // =========================================================================

    /// The home feed.
    ///
    /// Candidate tweets come from the viewer's followed authors (plus the
    /// viewer) and are ranked with the engagement heuristic. A viewer who
    /// follows nobody gets the open feed in chronological order instead.
    /// Audience restriction happens in the store query; views are recorded
    /// for the returned page.
    ///
    /// # Errors
    ///
    /// Returns an error if a store call fails.
    pub fn get_new_feeds(
        &self,
        viewer_id: &str,
        pagination: Pagination,
    ) -> Result<Page<AggregatedTweet>> {
        let mut followed = self.store.find_followed_user_ids(viewer_id)?;
        let follows_anyone = !followed.is_empty();

        let mut filter = TweetFilter {
            audience: Some(AudienceScope::Viewer(viewer_id.to_string())),
            ..TweetFilter::default()
        };
        if follows_anyone {
            followed.push(viewer_id.to_string());
            filter.author_ids = Some(followed);
        }

        let mode = if follows_anyone {
            RankMode::Heuristic
        } else {
            RankMode::Chronological
        };
        debug!(viewer_id, %mode, "serving new feed");

        self.list(&filter, pagination, mode, true)
    }

    /// Children (retweets, comments or quotes) of one tweet.
    ///
    /// The parent must exist and pass the visibility gate for this viewer.
    ///
    /// # Errors
    ///
    /// Returns [`AviaryError::TweetNotFound`] if the parent is absent, a
    /// gate error per the audience rules, or a store error.
    pub fn get_tweet_children(
        &self,
        tweet_id: &str,
        tweet_type: TweetType,
        pagination: Pagination,
        viewer: Option<&Viewer>,
    ) -> Result<Page<AggregatedTweet>> {
        let parent = self
            .store
            .get_tweet(tweet_id)?
            .ok_or_else(|| AviaryError::tweet_not_found(tweet_id))?;
        visibility::authorize(&self.store, &parent, viewer)?;

        let filter = TweetFilter {
            parent_id: Some(tweet_id.to_string()),
            tweet_type: Some(tweet_type),
            ..TweetFilter::default()
        };

        self.list(&filter, pagination, RankMode::Chronological, viewer.is_some())
    }

    /// Tweets the viewer has bookmarked, optionally narrowed by a
    /// full-text keyword.
    ///
    /// # Errors
    ///
    /// Returns an error if a store call fails.
    pub fn get_bookmarked_tweets(
        &self,
        viewer_id: &str,
        pagination: Pagination,
        keyword: Option<&str>,
    ) -> Result<Page<AggregatedTweet>> {
        let filter = TweetFilter {
            bookmarked_by: Some(viewer_id.to_string()),
            keyword: keyword
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(ToString::to_string),
            ..TweetFilter::default()
        };

        self.list(&filter, pagination, RankMode::Chronological, true)
    }

    /// Tweets the viewer has liked.
    ///
    /// # Errors
    ///
    /// Returns an error if a store call fails.
    pub fn get_liked_tweets(
        &self,
        viewer_id: &str,
        pagination: Pagination,
    ) -> Result<Page<AggregatedTweet>> {
        let filter = TweetFilter {
            liked_by: Some(viewer_id.to_string()),
            ..TweetFilter::default()
        };

        self.list(&filter, pagination, RankMode::Chronological, true)
    }

    /// Full-text search over tweet content.
    ///
    /// Audience restriction happens in the store query; `media_type`
    /// narrows to tweets carrying that media, and
    /// [`PeopleFollow::Following`] restricts to followed authors plus the
    /// viewer.
    ///
    /// # Errors
    ///
    /// Returns [`AviaryError::Validation`] for an empty query, or a store
    /// error.
    pub fn search(
        &self,
        content: &str,
        viewer_id: &str,
        pagination: Pagination,
        media_type: Option<MediaType>,
        people_follow: PeopleFollow,
    ) -> Result<Page<AggregatedTweet>> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AviaryError::validation("search content must not be empty"));
        }

        let mut filter = TweetFilter {
            keyword: Some(content.to_string()),
            media_type,
            audience: Some(AudienceScope::Viewer(viewer_id.to_string())),
            ..TweetFilter::default()
        };
        if people_follow == PeopleFollow::Following {
            let mut author_ids = self.store.find_followed_user_ids(viewer_id)?;
            author_ids.push(viewer_id.to_string());
            filter.author_ids = Some(author_ids);
        }

        self.list(&filter, pagination, RankMode::Chronological, true)
    }

    /// One tweet with its relations and counts.
    ///
    /// Records the single-row view increment and returns the updated
    /// counters read back from the same statement; if that write fails the
    /// response carries the counters as last read.
    ///
    /// # Errors
    ///
    /// Returns [`AviaryError::TweetNotFound`] if the tweet is absent, a
    /// gate error per the audience rules, or a store error.
    pub fn get_tweet_detail(
        &self,
        tweet_id: &str,
        viewer: Option<&Viewer>,
    ) -> Result<AggregatedTweet> {
        let raw = self
            .store
            .get_raw_tweet(tweet_id)?
            .ok_or_else(|| AviaryError::tweet_not_found(tweet_id))?;
        visibility::authorize(&self.store, &raw.tweet, viewer)?;

        let mut items = aggregate(&self.store, vec![raw])?;
        let Some(mut tweet) = items.pop() else {
            return Err(AviaryError::tweet_not_found(tweet_id));
        };

        if let Some(counters) = views::record_detail_view(&self.store, tweet_id, viewer.is_some())
        {
            tweet.guest_view_count = counters.guest_view_count;
            tweet.user_view_count = counters.user_view_count;
            tweet.views = counters.total();
        }

        Ok(tweet)
    }

    /// Shared listing path: count, fetch one page, aggregate, rank, then
    /// record views for the page being returned.
    fn list(
        &self,
        filter: &TweetFilter,
        pagination: Pagination,
        mode: RankMode,
        viewer_present: bool,
    ) -> Result<Page<AggregatedTweet>> {
        let total = self.store.count_tweets_by_filter(filter)?;
        let raw = self
            .store
            .find_tweets_by_filter(filter, pagination.limit(), pagination.offset())?;

        let items = rank(aggregate(&self.store, raw)?, mode);

        let ids: Vec<String> = items.iter().map(|t| t.id.clone()).collect();
        views::record_views(&self.store, &ids, viewer_present);

        Ok(Page {
            items,
            total,
            limit: pagination.limit(),
            page: pagination.page(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TweetAudience, User, UserVerifyStatus};
    use chrono::Utc;

    fn test_user(id: &str) -> User {
        User {
            id: id.to_string(),
            name: format!("User {id}"),
            username: format!("user_{id}"),
            email: format!("{id}@example.com"),
            password: "hash".to_string(),
            email_verify_token: None,
            forgot_password_token: None,
            date_of_birth: None,
            verify: UserVerifyStatus::Verified,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn draft(content: &str) -> TweetDraft {
        TweetDraft {
            tweet_type: TweetType::Original,
            audience: TweetAudience::Everyone,
            content: content.to_string(),
            parent_id: None,
            hashtags: vec![],
            mentions: vec![],
            medias: vec![],
        }
    }

    fn service() -> FeedService {
        let store = TweetStore::open_memory().unwrap();
        store.create_user(&test_user("u1")).unwrap();
        store.create_user(&test_user("u2")).unwrap();
        FeedService::new(store)
    }

    #[test]
    fn pagination_bounds() {
        assert!(Pagination::new(1, 1).is_ok());
        assert!(Pagination::new(100, 1).is_ok());
        assert!(Pagination::new(0, 1).is_err());
        assert!(Pagination::new(101, 1).is_err());
        assert!(Pagination::new(10, 0).is_err());
    }

    #[test]
    fn pagination_offset_is_one_indexed() {
        let pagination = Pagination::new(20, 3).unwrap();
        assert_eq!(pagination.offset(), 40);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page: Page<()> = Page {
            items: vec![],
            total: 21,
            limit: 10,
            page: 1,
        };
        assert_eq!(page.total_pages(), 3);

        let exact: Page<()> = Page {
            items: vec![],
            total: 20,
            limit: 10,
            page: 1,
        };
        assert_eq!(exact.total_pages(), 2);

        let empty: Page<()> = Page {
            items: vec![],
            total: 0,
            limit: 10,
            page: 1,
        };
        assert_eq!(empty.total_pages(), 0);
    }

    #[test]
    fn retweet_draft_must_have_empty_content() {
        let mut service = service();
        let parent = service.create_tweet("u1", &draft("parent")).unwrap();

        let mut retweet = draft("not empty");
        retweet.tweet_type = TweetType::Retweet;
        retweet.parent_id = Some(parent.id.clone());

        let err = service.create_tweet("u2", &retweet).unwrap_err();
        assert!(err.is_validation());

        retweet.content = String::new();
        assert!(service.create_tweet("u2", &retweet).is_ok());
    }

    #[test]
    fn child_draft_requires_existing_parent() {
        let mut service = service();

        let mut comment = draft("hello?");
        comment.tweet_type = TweetType::Comment;

        let err = service.create_tweet("u1", &comment).unwrap_err();
        assert!(err.is_validation());

        comment.parent_id = Some("missing".to_string());
        let err = service.create_tweet("u1", &comment).unwrap_err();
        assert!(matches!(err, AviaryError::TweetNotFound { .. }));
    }

    #[test]
    fn original_draft_must_not_have_parent() {
        let mut service = service();
        let parent = service.create_tweet("u1", &draft("parent")).unwrap();

        let mut original = draft("standalone");
        original.parent_id = Some(parent.id);

        let err = service.create_tweet("u1", &original).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn empty_content_needs_hashtags_or_mentions() {
        let mut service = service();

        let err = service.create_tweet("u1", &draft("")).unwrap_err();
        assert!(err.is_validation());

        let mut tagged = draft("");
        tagged.hashtags = vec!["rust".to_string()];
        assert!(service.create_tweet("u1", &tagged).is_ok());
    }

    #[test]
    fn duplicate_and_unknown_mentions_are_rejected() {
        let mut service = service();

        let mut duplicated = draft("hi");
        duplicated.mentions = vec!["u2".to_string(), "u2".to_string()];
        assert!(service.create_tweet("u1", &duplicated).unwrap_err().is_validation());

        let mut unknown = draft("hi");
        unknown.mentions = vec!["ghost".to_string()];
        let err = service.create_tweet("u1", &unknown).unwrap_err();
        assert!(matches!(err, AviaryError::UserNotFound { .. }));
    }

    #[test]
    fn search_rejects_empty_content() {
        let service = service();
        let pagination = Pagination::new(10, 1).unwrap();

        let err = service
            .search("   ", "u1", pagination, None, PeopleFollow::Anyone)
            .unwrap_err();
        assert!(err.is_validation());
    }
}
