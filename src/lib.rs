//! aviary - feed ranking and tweet aggregation core
//!
//! This library implements the read-path core of a social-network backend:
//! assembling tweets with their denormalized counts and ranking home-feed
//! pages with an interaction heuristic. It is invoked by request handlers;
//! it owns no network surface of its own.
//!
//! # Modules
//!
//! - [`aggregate`] - Raw rows to denormalized tweet view models
//! - [`rank`] - Feed ordering (chronological or engagement heuristic)
//! - [`visibility`] - Circle-audience authorization
//! - [`views`] - Best-effort view-count recording
//! - [`feed`] - The exposed operations and pagination glue
//! - [`store`] - `SQLite` entity store
//! - [`error`] - Custom error types with distinct user-facing conditions

pub mod aggregate;
pub mod config;
pub mod error;
pub mod feed;
pub mod logging;
pub mod model;
pub mod rank;
pub mod store;
pub mod views;
pub mod visibility;

pub use config::Config;
pub use error::{AviaryError, Result};
pub use feed::{FeedService, MAX_PAGE_LIMIT, Page, Pagination, PeopleFollow};
pub use model::*;
pub use rank::RankMode;
pub use store::{AudienceScope, TweetFilter, TweetStore, ViewCounterField};

/// Default database filename
pub const DEFAULT_DB_NAME: &str = "aviary.db";
