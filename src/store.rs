//! `SQLite` entity store for the feed core.
//!
//! Holds the canonical rows (tweets, users, media, hashtags, mentions,
//! bookmarks, likes, followers, circles) and exposes the narrow query/update
//! contracts the aggregation pipeline consumes. Relation lists for a page of
//! tweets are loaded with batched `IN (...)` queries, never per row.

use crate::error::{AviaryError, Result};
use crate::model::{
    Bookmark, Like, MediaType, PublicUser, RawTweet, Tweet, TweetAudience, TweetDraft, TweetMedia,
    TweetType, User, UserVerifyStatus, ViewCounters,
};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use rusqlite::{Connection, Row, params, params_from_iter};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

const SCHEMA_VERSION: i32 = 2;
// SQLite default limit on host parameters is usually 999 or 32766.
// We use a safe batch size to avoid "too many SQL variables" errors.
const SQLITE_BATCH_SIZE: usize = 900;

const TWEET_COLUMNS: &str = "id, type, audience, content, parent_id, author_id, \
     guest_view_count, user_view_count, created_at, updated_at";

const USER_COLUMNS: &str = "id, name, username, email, password, email_verify_token, \
     forgot_password_token, date_of_birth, verify, created_at, updated_at";

const fn epoch_utc() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(0, 0).unwrap()
}

fn parse_rfc3339_or_epoch(value: Option<String>) -> DateTime<Utc> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map_or_else(epoch_utc, |dt| dt.with_timezone(&Utc))
}

fn parse_rfc3339_opt(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn placeholders(count: usize) -> String {
    (0..count).map(|_| "?").join(", ")
}

fn invalid_column(index: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        format!("unrecognized value '{value}'").into(),
    )
}

fn tweet_from_row(row: &Row<'_>) -> rusqlite::Result<Tweet> {
    let type_str: String = row.get(1)?;
    let audience_str: String = row.get(2)?;
    Ok(Tweet {
        id: row.get(0)?,
        tweet_type: TweetType::from_str(&type_str).ok_or_else(|| invalid_column(1, &type_str))?,
        audience: TweetAudience::from_str(&audience_str)
            .ok_or_else(|| invalid_column(2, &audience_str))?,
        content: row.get(3)?,
        parent_id: row.get(4)?,
        author_id: row.get(5)?,
        guest_view_count: row.get(6)?,
        user_view_count: row.get(7)?,
        created_at: parse_rfc3339_or_epoch(row.get::<_, Option<String>>(8)?),
        updated_at: parse_rfc3339_or_epoch(row.get::<_, Option<String>>(9)?),
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let verify_str: String = row.get(8)?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        username: row.get(2)?,
        email: row.get(3)?,
        password: row.get(4)?,
        email_verify_token: row.get(5)?,
        forgot_password_token: row.get(6)?,
        date_of_birth: parse_rfc3339_opt(row.get::<_, Option<String>>(7)?),
        verify: UserVerifyStatus::from_str(&verify_str)
            .ok_or_else(|| invalid_column(8, &verify_str))?,
        created_at: parse_rfc3339_or_epoch(row.get::<_, Option<String>>(9)?),
        updated_at: parse_rfc3339_or_epoch(row.get::<_, Option<String>>(10)?),
    })
}

/// Which view counter a read increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewCounterField {
    /// No authenticated viewer on the request.
    Guest,
    /// An authenticated viewer on the request.
    User,
}

impl ViewCounterField {
    const fn column(self) -> &'static str {
        match self {
            Self::Guest => "guest_view_count",
            Self::User => "user_view_count",
        }
    }
}

/// Audience restriction applied by list queries at the store layer.
///
/// Detail and children requests use the per-request visibility gate instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudienceScope {
    /// Anonymous request: public tweets only.
    Public,
    /// Authenticated request: public tweets, plus circle tweets whose
    /// author's circle contains this viewer.
    Viewer(String),
}

/// Filter shape for tweet list queries.
#[derive(Debug, Clone, Default)]
pub struct TweetFilter {
    pub ids: Option<Vec<String>>,
    pub author_ids: Option<Vec<String>>,
    pub parent_id: Option<String>,
    pub tweet_type: Option<TweetType>,
    /// Restrict to tweets bookmarked by this user.
    pub bookmarked_by: Option<String>,
    /// Restrict to tweets liked by this user.
    pub liked_by: Option<String>,
    /// Full-text match against tweet content.
    pub keyword: Option<String>,
    /// Restrict to tweets carrying at least one media of this type.
    pub media_type: Option<MediaType>,
    pub audience: Option<AudienceScope>,
}

impl TweetFilter {
    /// Filter matching a single tweet id.
    #[must_use]
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            ids: Some(vec![id.into()]),
            ..Self::default()
        }
    }
}

/// `SQLite` store manager.
pub struct TweetStore {
    conn: Connection,
}

impl TweetStore {
    /// Open or create the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref()).map_err(|e| {
            AviaryError::with_context(
                format!("failed to open database at {}", db_path.as_ref().display()),
                e,
            )
        })?;

        // Set pragmas for performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be initialized.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            ",
        )?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Get a reference to the underlying database connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    fn migrate(&self) -> Result<()> {
        let current_version = self.get_schema_version();

        if current_version < SCHEMA_VERSION {
            info!(
                "Migrating database from version {} to {}",
                current_version, SCHEMA_VERSION
            );
            self.create_schema()?;
            self.set_schema_version(SCHEMA_VERSION)?;
        }

        Ok(())
    }

    fn get_schema_version(&self) -> i32 {
        let result: std::result::Result<i32, _> = self.conn.query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| {
                let value: String = row.get(0)?;
                Ok(value.parse().unwrap_or(0))
            },
        );

        // Treat missing schema table as version 0.
        result.unwrap_or_default()
    }

    fn set_schema_version(&self, version: i32) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?)",
            params![version.to_string()],
        )?;
        Ok(())
    }

    fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r"
            -- Metadata table
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            -- Users
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                email_verify_token TEXT,
                forgot_password_token TEXT,
                date_of_birth TEXT,
                verify TEXT NOT NULL DEFAULT 'unverified',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Tweets
            CREATE TABLE IF NOT EXISTS tweets (
                id TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                audience TEXT NOT NULL,
                content TEXT NOT NULL,
                parent_id TEXT REFERENCES tweets(id),
                author_id TEXT NOT NULL REFERENCES users(id),
                guest_view_count INTEGER NOT NULL DEFAULT 0,
                user_view_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tweets_parent_id ON tweets(parent_id);
            CREATE INDEX IF NOT EXISTS idx_tweets_author_id ON tweets(author_id);
            CREATE INDEX IF NOT EXISTS idx_tweets_created_at ON tweets(created_at);

            -- Media, owned by exactly one tweet
            CREATE TABLE IF NOT EXISTS media (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tweet_id TEXT NOT NULL REFERENCES tweets(id),
                url TEXT NOT NULL,
                type TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_media_tweet_id ON media(tweet_id);

            -- Hashtags, shared across tweets
            CREATE TABLE IF NOT EXISTS hashtags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS tweet_hashtags (
                tweet_id TEXT NOT NULL REFERENCES tweets(id),
                hashtag_id INTEGER NOT NULL REFERENCES hashtags(id),
                PRIMARY KEY (tweet_id, hashtag_id)
            );

            -- Mentions
            CREATE TABLE IF NOT EXISTS mentions (
                tweet_id TEXT NOT NULL REFERENCES tweets(id),
                mentioned_user_id TEXT NOT NULL REFERENCES users(id),
                PRIMARY KEY (tweet_id, mentioned_user_id)
            );

            -- Bookmarks
            CREATE TABLE IF NOT EXISTS bookmarks (
                user_id TEXT NOT NULL REFERENCES users(id),
                tweet_id TEXT NOT NULL REFERENCES tweets(id),
                PRIMARY KEY (user_id, tweet_id)
            );
            CREATE INDEX IF NOT EXISTS idx_bookmarks_tweet_id ON bookmarks(tweet_id);

            -- Likes
            CREATE TABLE IF NOT EXISTS likes (
                user_id TEXT NOT NULL REFERENCES users(id),
                tweet_id TEXT NOT NULL REFERENCES tweets(id),
                PRIMARY KEY (user_id, tweet_id)
            );
            CREATE INDEX IF NOT EXISTS idx_likes_tweet_id ON likes(tweet_id);

            -- Followers
            CREATE TABLE IF NOT EXISTS followers (
                follower_id TEXT NOT NULL REFERENCES users(id),
                followed_user_id TEXT NOT NULL REFERENCES users(id),
                PRIMARY KEY (follower_id, followed_user_id)
            );

            -- Circle membership (author-defined allow-list)
            CREATE TABLE IF NOT EXISTS user_circles (
                owner_id TEXT NOT NULL REFERENCES users(id),
                member_id TEXT NOT NULL REFERENCES users(id),
                PRIMARY KEY (owner_id, member_id)
            );

            -- Full-text search over tweet content
            CREATE VIRTUAL TABLE IF NOT EXISTS fts_tweets USING fts5(
                content,
                tweet_id UNINDEXED
            );
            ",
        )?;
        Ok(())
    }

    // =========================================================================
    // Users, follows, circles
    // =========================================================================

    /// Insert a user row.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (duplicate id/username/email).
    pub fn create_user(&self, user: &User) -> Result<()> {
        self.conn.execute(
            "INSERT INTO users (id, name, username, email, password, email_verify_token,
                                forgot_password_token, date_of_birth, verify, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                user.id,
                user.name,
                user.username,
                user.email,
                user.password,
                user.email_verify_token,
                user.forgot_password_token,
                user.date_of_birth.map(|dt| dt.to_rfc3339()),
                user.verify.as_str(),
                user.created_at.to_rfc3339(),
                user.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a user row by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let result = self.conn.query_row(&sql, params![id], user_from_row);

        match result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Record a follow. Idempotent per (follower, followed) pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn follow(&self, follower_id: &str, followed_user_id: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO followers (follower_id, followed_user_id) VALUES (?, ?)",
            params![follower_id, followed_user_id],
        )?;
        Ok(())
    }

    /// Remove a follow.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn unfollow(&self, follower_id: &str, followed_user_id: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM followers WHERE follower_id = ? AND followed_user_id = ?",
            params![follower_id, followed_user_id],
        )?;
        Ok(())
    }

    /// Ids of every user this follower follows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_followed_user_ids(&self, follower_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT followed_user_id FROM followers WHERE follower_id = ?")?;
        let ids = stmt
            .query_map(params![follower_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Add a member to an author's circle. Idempotent per pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn add_circle_member(&self, owner_id: &str, member_id: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO user_circles (owner_id, member_id) VALUES (?, ?)",
            params![owner_id, member_id],
        )?;
        Ok(())
    }

    /// Whether `member_id` is in `owner_id`'s circle.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn is_circle_member(&self, owner_id: &str, member_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM user_circles WHERE owner_id = ? AND member_id = ?",
            params![owner_id, member_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // =========================================================================
    // Tweet creation
    // =========================================================================

    /// Create a tweet with its media, hashtag and mention rows in one
    /// atomic transaction. If any sub-insert fails the whole creation is
    /// rolled back.
    ///
    /// Hashtags are resolved with an atomic insert-or-get keyed on the
    /// unique name, so concurrent creations sharing a new tag cannot race
    /// into a duplicate insert.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails, including a missing parent or
    /// mentioned user rejected by foreign-key constraints.
    pub fn create_tweet(&mut self, author_id: &str, draft: &TweetDraft) -> Result<Tweet> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO tweets (id, type, audience, content, parent_id, author_id,
                                 guest_view_count, user_view_count, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, 0, ?, ?)",
            params![
                id,
                draft.tweet_type.as_str(),
                draft.audience.as_str(),
                draft.content,
                draft.parent_id,
                author_id,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        for media in &draft.medias {
            tx.execute(
                "INSERT INTO media (tweet_id, url, type) VALUES (?, ?, ?)",
                params![id, media.url, media.media_type.as_str()],
            )?;
        }

        for hashtag in &draft.hashtags {
            tx.execute(
                "INSERT OR IGNORE INTO hashtags (name) VALUES (?)",
                params![hashtag],
            )?;
            let hashtag_id: i64 = tx.query_row(
                "SELECT id FROM hashtags WHERE name = ?",
                params![hashtag],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO tweet_hashtags (tweet_id, hashtag_id) VALUES (?, ?)",
                params![id, hashtag_id],
            )?;
        }

        for mentioned_user_id in &draft.mentions {
            tx.execute(
                "INSERT INTO mentions (tweet_id, mentioned_user_id) VALUES (?, ?)",
                params![id, mentioned_user_id],
            )?;
        }

        tx.execute(
            "INSERT INTO fts_tweets (tweet_id, content) VALUES (?, ?)",
            params![id, draft.content],
        )?;

        tx.commit()?;
        info!(tweet_id = %id, tweet_type = %draft.tweet_type, "created tweet");

        Ok(Tweet {
            id,
            tweet_type: draft.tweet_type,
            audience: draft.audience,
            content: draft.content.clone(),
            parent_id: draft.parent_id.clone(),
            author_id: author_id.to_string(),
            guest_view_count: 0,
            user_view_count: 0,
            created_at: now,
            updated_at: now,
        })
    }

    // =========================================================================
    // Bookmarks and likes
    // =========================================================================

    /// Bookmark a tweet. Insert-if-absent per (user, tweet) pair.
    ///
    /// Bookmarking a retweet resolves to the retweeted original, so a
    /// user's bookmark always points at the content-bearing tweet.
    ///
    /// # Errors
    ///
    /// Returns [`AviaryError::TweetNotFound`] if the tweet does not exist,
    /// or a store error if the insert fails.
    pub fn bookmark_tweet(&self, user_id: &str, tweet_id: &str) -> Result<Bookmark> {
        let tweet = self
            .get_tweet(tweet_id)?
            .ok_or_else(|| AviaryError::tweet_not_found(tweet_id))?;

        let target_id = match (&tweet.tweet_type, &tweet.parent_id) {
            (TweetType::Retweet, Some(parent_id)) => parent_id.clone(),
            _ => tweet.id,
        };

        self.conn.execute(
            "INSERT OR IGNORE INTO bookmarks (user_id, tweet_id) VALUES (?, ?)",
            params![user_id, target_id],
        )?;

        Ok(Bookmark {
            user_id: user_id.to_string(),
            tweet_id: target_id,
        })
    }

    /// Remove a bookmark.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn unbookmark_tweet(&self, user_id: &str, tweet_id: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM bookmarks WHERE user_id = ? AND tweet_id = ?",
            params![user_id, tweet_id],
        )?;
        Ok(())
    }

    /// Like a tweet. Insert-if-absent per (user, tweet) pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn like_tweet(&self, user_id: &str, tweet_id: &str) -> Result<Like> {
        self.conn.execute(
            "INSERT OR IGNORE INTO likes (user_id, tweet_id) VALUES (?, ?)",
            params![user_id, tweet_id],
        )?;
        Ok(Like {
            user_id: user_id.to_string(),
            tweet_id: tweet_id.to_string(),
        })
    }

    /// Remove a like.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn unlike_tweet(&self, user_id: &str, tweet_id: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM likes WHERE user_id = ? AND tweet_id = ?",
            params![user_id, tweet_id],
        )?;
        Ok(())
    }

    // =========================================================================
    // Tweet queries
    // =========================================================================

    /// Fetch a single tweet row, without relations.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_tweet(&self, id: &str) -> Result<Option<Tweet>> {
        let sql = format!("SELECT {TWEET_COLUMNS} FROM tweets WHERE id = ?");
        let result = self.conn.query_row(&sql, params![id], tweet_from_row);

        match result {
            Ok(tweet) => Ok(Some(tweet)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch a single tweet with its relation lists, or None if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if any query fails.
    pub fn get_raw_tweet(&self, id: &str) -> Result<Option<RawTweet>> {
        let mut page = self.find_tweets_by_filter(&TweetFilter::by_id(id), 1, 0)?;
        Ok(page.pop())
    }

    fn filter_clauses(filter: &TweetFilter) -> (Vec<String>, Vec<String>) {
        let mut clauses = Vec::new();
        let mut bind: Vec<String> = Vec::new();

        if let Some(ids) = &filter.ids {
            clauses.push(format!("t.id IN ({})", placeholders(ids.len())));
            bind.extend(ids.iter().cloned());
        }
        if let Some(author_ids) = &filter.author_ids {
            clauses.push(format!("t.author_id IN ({})", placeholders(author_ids.len())));
            bind.extend(author_ids.iter().cloned());
        }
        if let Some(parent_id) = &filter.parent_id {
            clauses.push("t.parent_id = ?".to_string());
            bind.push(parent_id.clone());
        }
        if let Some(tweet_type) = filter.tweet_type {
            clauses.push("t.type = ?".to_string());
            bind.push(tweet_type.as_str().to_string());
        }
        if let Some(user_id) = &filter.bookmarked_by {
            clauses.push(
                "EXISTS (SELECT 1 FROM bookmarks b WHERE b.tweet_id = t.id AND b.user_id = ?)"
                    .to_string(),
            );
            bind.push(user_id.clone());
        }
        if let Some(user_id) = &filter.liked_by {
            clauses.push(
                "EXISTS (SELECT 1 FROM likes l WHERE l.tweet_id = t.id AND l.user_id = ?)"
                    .to_string(),
            );
            bind.push(user_id.clone());
        }
        if let Some(keyword) = &filter.keyword {
            clauses.push(
                "t.id IN (SELECT tweet_id FROM fts_tweets WHERE fts_tweets MATCH ?)".to_string(),
            );
            bind.push(keyword.clone());
        }
        if let Some(media_type) = filter.media_type {
            clauses.push(
                "EXISTS (SELECT 1 FROM media m WHERE m.tweet_id = t.id AND m.type = ?)".to_string(),
            );
            bind.push(media_type.as_str().to_string());
        }
        match &filter.audience {
            Some(AudienceScope::Public) => {
                clauses.push("t.audience = 'everyone'".to_string());
            }
            Some(AudienceScope::Viewer(viewer_id)) => {
                clauses.push(
                    "(t.audience = 'everyone' OR (t.audience = 'circle' AND EXISTS (\
                        SELECT 1 FROM user_circles c \
                        WHERE c.owner_id = t.author_id AND c.member_id = ?)))"
                        .to_string(),
                );
                bind.push(viewer_id.clone());
            }
            None => {}
        }

        (clauses, bind)
    }

    /// Fetch one page of tweet rows matching the filter, newest first,
    /// each with its pre-joined relation lists.
    ///
    /// # Errors
    ///
    /// Returns an error if any query fails.
    pub fn find_tweets_by_filter(
        &self,
        filter: &TweetFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RawTweet>> {
        let (clauses, bind) = Self::filter_clauses(filter);
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let sql = format!(
            "SELECT {TWEET_COLUMNS} FROM tweets t {where_sql} \
             ORDER BY t.created_at DESC, t.id DESC LIMIT {limit} OFFSET {offset}"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let tweets = stmt
            .query_map(params_from_iter(bind.iter()), tweet_from_row)?
            .collect::<rusqlite::Result<Vec<Tweet>>>()?;

        self.load_relations(tweets)
    }

    /// Count tweets matching the filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_tweets_by_filter(&self, filter: &TweetFilter) -> Result<i64> {
        let (clauses, bind) = Self::filter_clauses(filter);
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let sql = format!("SELECT COUNT(*) FROM tweets t {where_sql}");
        let count = self
            .conn
            .query_row(&sql, params_from_iter(bind.iter()), |row| row.get(0))?;
        Ok(count)
    }

    /// Fetch all child tweets (retweets, comments, quotes) of the given
    /// parents in batched `IN (...)` queries. No relations are loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if any query fails.
    pub fn find_child_tweets(
        &self,
        parent_ids: &[String],
        types: &[TweetType],
    ) -> Result<Vec<Tweet>> {
        if parent_ids.is_empty() || types.is_empty() {
            return Ok(Vec::new());
        }

        let mut children = Vec::new();
        for chunk in parent_ids.chunks(SQLITE_BATCH_SIZE) {
            let sql = format!(
                "SELECT {TWEET_COLUMNS} FROM tweets \
                 WHERE parent_id IN ({}) AND type IN ({})",
                placeholders(chunk.len()),
                placeholders(types.len()),
            );
            let bind = chunk
                .iter()
                .cloned()
                .chain(types.iter().map(|t| t.as_str().to_string()));

            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(bind), tweet_from_row)?
                .collect::<rusqlite::Result<Vec<Tweet>>>()?;
            children.extend(rows);
        }

        Ok(children)
    }

    /// Load relation lists for a page of tweet rows. One batched query per
    /// relation kind, keyed on the page's id set.
    fn load_relations(&self, tweets: Vec<Tweet>) -> Result<Vec<RawTweet>> {
        if tweets.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = tweets.iter().map(|t| t.id.clone()).collect();
        let in_list = placeholders(ids.len());

        let mut authors: HashMap<String, PublicUser> = HashMap::new();
        {
            let sql = format!(
                "SELECT t.id, u.id, u.name, u.username, u.email \
                 FROM tweets t JOIN users u ON u.id = t.author_id \
                 WHERE t.id IN ({in_list})"
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    PublicUser {
                        id: row.get(1)?,
                        name: row.get(2)?,
                        username: row.get(3)?,
                        email: row.get(4)?,
                    },
                ))
            })?;
            for row in rows {
                let (tweet_id, user) = row?;
                authors.insert(tweet_id, user);
            }
        }

        let mut mentions: HashMap<String, Vec<PublicUser>> = HashMap::new();
        {
            let sql = format!(
                "SELECT m.tweet_id, u.id, u.name, u.username, u.email \
                 FROM mentions m JOIN users u ON u.id = m.mentioned_user_id \
                 WHERE m.tweet_id IN ({in_list}) \
                 ORDER BY u.username"
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    PublicUser {
                        id: row.get(1)?,
                        name: row.get(2)?,
                        username: row.get(3)?,
                        email: row.get(4)?,
                    },
                ))
            })?;
            for row in rows {
                let (tweet_id, user) = row?;
                mentions.entry(tweet_id).or_default().push(user);
            }
        }

        let mut hashtags: HashMap<String, Vec<String>> = HashMap::new();
        {
            let sql = format!(
                "SELECT th.tweet_id, h.name \
                 FROM tweet_hashtags th JOIN hashtags h ON h.id = th.hashtag_id \
                 WHERE th.tweet_id IN ({in_list}) \
                 ORDER BY h.name"
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (tweet_id, name) = row?;
                hashtags.entry(tweet_id).or_default().push(name);
            }
        }

        let mut medias: HashMap<String, Vec<TweetMedia>> = HashMap::new();
        {
            let sql = format!(
                "SELECT tweet_id, url, type FROM media \
                 WHERE tweet_id IN ({in_list}) ORDER BY id"
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
                let type_str: String = row.get(2)?;
                Ok((
                    row.get::<_, String>(0)?,
                    TweetMedia {
                        url: row.get(1)?,
                        media_type: MediaType::from_str(&type_str)
                            .ok_or_else(|| invalid_column(2, &type_str))?,
                    },
                ))
            })?;
            for row in rows {
                let (tweet_id, media) = row?;
                medias.entry(tweet_id).or_default().push(media);
            }
        }

        let mut bookmarked_by: HashMap<String, Vec<String>> = HashMap::new();
        {
            let sql =
                format!("SELECT tweet_id, user_id FROM bookmarks WHERE tweet_id IN ({in_list})");
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (tweet_id, user_id) = row?;
                bookmarked_by.entry(tweet_id).or_default().push(user_id);
            }
        }

        let mut liked_by: HashMap<String, Vec<String>> = HashMap::new();
        {
            let sql = format!("SELECT tweet_id, user_id FROM likes WHERE tweet_id IN ({in_list})");
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (tweet_id, user_id) = row?;
                liked_by.entry(tweet_id).or_default().push(user_id);
            }
        }

        let raw = tweets
            .into_iter()
            .map(|tweet| {
                let id = tweet.id.clone();
                RawTweet {
                    author: authors.remove(&id),
                    mentions: mentions.remove(&id).unwrap_or_default(),
                    hashtags: hashtags.remove(&id).unwrap_or_default(),
                    medias: medias.remove(&id).unwrap_or_default(),
                    bookmarked_by: bookmarked_by.remove(&id).unwrap_or_default(),
                    liked_by: liked_by.remove(&id).unwrap_or_default(),
                    tweet,
                }
            })
            .collect();

        Ok(raw)
    }

    // =========================================================================
    // View counters
    // =========================================================================

    /// Increment one view counter for every tweet in the id set, in
    /// batched `WHERE id IN (...)` updates. Returns the number of rows
    /// touched.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn increment_view_counters(
        &self,
        ids: &[String],
        field: ViewCounterField,
    ) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        let column = field.column();
        let mut updated = 0;

        for chunk in ids.chunks(SQLITE_BATCH_SIZE) {
            let sql = format!(
                "UPDATE tweets SET {column} = {column} + 1, updated_at = ? \
                 WHERE id IN ({})",
                placeholders(chunk.len()),
            );
            let bind = std::iter::once(now.clone()).chain(chunk.iter().cloned());
            updated += self.conn.execute(&sql, params_from_iter(bind))?;
        }

        Ok(updated)
    }

    /// Increment one view counter for a single tweet and return both
    /// updated counters from the same statement (read-after-write).
    ///
    /// # Errors
    ///
    /// Returns [`AviaryError::TweetNotFound`] if the tweet does not exist,
    /// or a store error if the update fails.
    pub fn update_tweet_view_counters(
        &self,
        id: &str,
        field: ViewCounterField,
    ) -> Result<ViewCounters> {
        let column = field.column();
        let sql = format!(
            "UPDATE tweets SET {column} = {column} + 1, updated_at = ?2 \
             WHERE id = ?1 RETURNING guest_view_count, user_view_count"
        );

        let result = self
            .conn
            .query_row(&sql, params![id, Utc::now().to_rfc3339()], |row| {
                Ok(ViewCounters {
                    guest_view_count: row.get(0)?,
                    user_view_count: row.get(1)?,
                })
            });

        match result {
            Ok(counters) => Ok(counters),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(AviaryError::tweet_not_found(id))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TweetDraft;

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

    fn seeded_store() -> TweetStore {
        let store = TweetStore::open_memory().unwrap();
        store.create_user(&test_user("u1")).unwrap();
        store.create_user(&test_user("u2")).unwrap();
        store
    }

    #[test]
    fn create_tweet_persists_all_relation_rows() {
        let mut store = seeded_store();

        let mut body = draft("hello #rust");
        body.hashtags = vec!["rust".to_string()];
        body.mentions = vec!["u2".to_string()];
        body.medias = vec![TweetMedia {
            url: "https://cdn.example.com/a.png".to_string(),
            media_type: MediaType::Image,
        }];

        let tweet = store.create_tweet("u1", &body).unwrap();
        let raw = store.get_raw_tweet(&tweet.id).unwrap().unwrap();

        assert_eq!(raw.hashtags, vec!["rust"]);
        assert_eq!(raw.mentions.len(), 1);
        assert_eq!(raw.mentions[0].id, "u2");
        assert_eq!(raw.medias.len(), 1);
        assert_eq!(raw.author.as_ref().unwrap().id, "u1");
    }

    #[test]
    fn create_tweet_rolls_back_on_bad_mention() {
        let mut store = seeded_store();

        let mut body = draft("mentions a ghost");
        body.mentions = vec!["no-such-user".to_string()];

        assert!(store.create_tweet("u1", &body).is_err());

        let count = store
            .count_tweets_by_filter(&TweetFilter::default())
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn hashtags_are_shared_across_tweets() {
        let mut store = seeded_store();

        let mut first = draft("one #shared");
        first.hashtags = vec!["shared".to_string()];
        let mut second = draft("two #shared");
        second.hashtags = vec!["shared".to_string()];

        store.create_tweet("u1", &first).unwrap();
        store.create_tweet("u2", &second).unwrap();

        let count: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM hashtags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn bookmark_is_idempotent_and_resolves_retweets() {
        let mut store = seeded_store();
        let original = store.create_tweet("u1", &draft("original")).unwrap();

        let mut retweet = draft("");
        retweet.tweet_type = TweetType::Retweet;
        retweet.parent_id = Some(original.id.clone());
        let retweet = store.create_tweet("u2", &retweet).unwrap();

        let bookmark = store.bookmark_tweet("u2", &retweet.id).unwrap();
        assert_eq!(bookmark.tweet_id, original.id);

        store.bookmark_tweet("u2", &retweet.id).unwrap();
        let raw = store.get_raw_tweet(&original.id).unwrap().unwrap();
        assert_eq!(raw.bookmarked_by, vec!["u2"]);
    }

    #[test]
    fn like_is_idempotent_per_pair() {
        let mut store = seeded_store();
        let tweet = store.create_tweet("u1", &draft("likeable")).unwrap();

        store.like_tweet("u2", &tweet.id).unwrap();
        store.like_tweet("u2", &tweet.id).unwrap();

        let raw = store.get_raw_tweet(&tweet.id).unwrap().unwrap();
        assert_eq!(raw.liked_by, vec!["u2"]);

        store.unlike_tweet("u2", &tweet.id).unwrap();
        let raw = store.get_raw_tweet(&tweet.id).unwrap().unwrap();
        assert!(raw.liked_by.is_empty());
    }

    #[test]
    fn find_child_tweets_is_batched_and_typed() {
        let mut store = seeded_store();
        let parent = store.create_tweet("u1", &draft("parent")).unwrap();

        for (tweet_type, content) in [
            (TweetType::Retweet, ""),
            (TweetType::Comment, "nice"),
            (TweetType::QuoteTweet, "look at this"),
        ] {
            let mut child = draft(content);
            child.tweet_type = tweet_type;
            child.parent_id = Some(parent.id.clone());
            store.create_tweet("u2", &child).unwrap();
        }

        let children = store
            .find_child_tweets(
                std::slice::from_ref(&parent.id),
                &[TweetType::Comment, TweetType::QuoteTweet],
            )
            .unwrap();
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.tweet_type != TweetType::Retweet));
    }

    #[test]
    fn audience_scope_filters_circle_tweets() {
        let mut store = seeded_store();
        store.create_user(&test_user("outsider")).unwrap();

        let mut circle_tweet = draft("inner circle only");
        circle_tweet.audience = TweetAudience::Circle;
        store.create_tweet("u1", &circle_tweet).unwrap();
        store.create_tweet("u1", &draft("public")).unwrap();

        store.add_circle_member("u1", "u2").unwrap();

        let member_filter = TweetFilter {
            audience: Some(AudienceScope::Viewer("u2".to_string())),
            ..TweetFilter::default()
        };
        assert_eq!(store.count_tweets_by_filter(&member_filter).unwrap(), 2);

        let outsider_filter = TweetFilter {
            audience: Some(AudienceScope::Viewer("outsider".to_string())),
            ..TweetFilter::default()
        };
        assert_eq!(store.count_tweets_by_filter(&outsider_filter).unwrap(), 1);

        let anonymous_filter = TweetFilter {
            audience: Some(AudienceScope::Public),
            ..TweetFilter::default()
        };
        assert_eq!(store.count_tweets_by_filter(&anonymous_filter).unwrap(), 1);
    }

    #[test]
    fn keyword_filter_uses_fts() {
        let mut store = seeded_store();
        store.create_tweet("u1", &draft("rust is fast")).unwrap();
        store.create_tweet("u1", &draft("gardening tips")).unwrap();

        let filter = TweetFilter {
            keyword: Some("rust".to_string()),
            ..TweetFilter::default()
        };
        let page = store.find_tweets_by_filter(&filter, 10, 0).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].tweet.content, "rust is fast");
    }

    #[test]
    fn increment_view_counters_updates_every_row_once() {
        let mut store = seeded_store();
        let a = store.create_tweet("u1", &draft("a")).unwrap();
        let b = store.create_tweet("u1", &draft("b")).unwrap();

        let updated = store
            .increment_view_counters(
                &[a.id.clone(), b.id.clone()],
                ViewCounterField::Guest,
            )
            .unwrap();
        assert_eq!(updated, 2);

        let a_row = store.get_tweet(&a.id).unwrap().unwrap();
        assert_eq!(a_row.guest_view_count, 1);
        assert_eq!(a_row.user_view_count, 0);

        store
            .increment_view_counters(&[b.id.clone()], ViewCounterField::User)
            .unwrap();
        let b_row = store.get_tweet(&b.id).unwrap().unwrap();
        assert_eq!(b_row.guest_view_count, 1);
        assert_eq!(b_row.user_view_count, 1);
    }

    #[test]
    fn update_tweet_view_counters_returns_fresh_values() {
        let mut store = seeded_store();
        let tweet = store.create_tweet("u1", &draft("detail")).unwrap();

        let counters = store
            .update_tweet_view_counters(&tweet.id, ViewCounterField::User)
            .unwrap();
        assert_eq!(counters.guest_view_count, 0);
        assert_eq!(counters.user_view_count, 1);

        let counters = store
            .update_tweet_view_counters(&tweet.id, ViewCounterField::Guest)
            .unwrap();
        assert_eq!(counters.guest_view_count, 1);
        assert_eq!(counters.user_view_count, 1);

        let missing = store.update_tweet_view_counters("nope", ViewCounterField::Guest);
        assert!(matches!(missing, Err(AviaryError::TweetNotFound { .. })));
    }

    #[test]
    fn followed_user_ids_round_trip() {
        let store = seeded_store();
        store.follow("u1", "u2").unwrap();
        store.follow("u1", "u2").unwrap();

        assert_eq!(store.find_followed_user_ids("u1").unwrap(), vec!["u2"]);
        store.unfollow("u1", "u2").unwrap();
        assert!(store.find_followed_user_ids("u1").unwrap().is_empty());
    }
}
