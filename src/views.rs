//! View-count recording for served pages.
//!
//! Counters are best-effort telemetry: a failed increment is logged and
//! swallowed so it can never fail the read that triggered it.

use crate::model::ViewCounters;
use crate::store::{TweetStore, ViewCounterField};
use tracing::warn;

const fn counter_field(viewer_present: bool) -> ViewCounterField {
    if viewer_present {
        ViewCounterField::User
    } else {
        ViewCounterField::Guest
    }
}

/// Record one view for every tweet in a served page, as a single batched
/// update. Increments the guest counter for anonymous requests and the
/// user counter for authenticated ones.
pub fn record_views(store: &TweetStore, tweet_ids: &[String], viewer_present: bool) {
    if tweet_ids.is_empty() {
        return;
    }

    if let Err(error) = store.increment_view_counters(tweet_ids, counter_field(viewer_present)) {
        warn!(%error, tweets = tweet_ids.len(), "view-count increment failed");
    }
}

/// Record one view for a single tweet and return the updated counters
/// (read-after-write). Returns `None` if the increment failed; the caller
/// falls back to the counters it already read.
pub fn record_detail_view(
    store: &TweetStore,
    tweet_id: &str,
    viewer_present: bool,
) -> Option<ViewCounters> {
    match store.update_tweet_view_counters(tweet_id, counter_field(viewer_present)) {
        Ok(counters) => Some(counters),
        Err(error) => {
            warn!(%error, tweet_id, "view-count increment failed");
            None
        }
    }
}
