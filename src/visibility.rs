//! Circle-visibility authorization.
//!
//! Decides whether a viewer may see a restricted-audience tweet. Runs once
//! per tweet-detail or tweet-children request; list queries restrict
//! through the store-layer audience filter instead.

use crate::error::{AviaryError, Result};
use crate::model::{Tweet, TweetAudience, UserVerifyStatus, Viewer};
use crate::store::TweetStore;

/// Authorize a viewer against a tweet's audience, raising a distinct error
/// per denial condition.
///
/// Everyone-audience tweets pass for any viewer, including anonymous ones.
/// Circle-audience tweets require an authenticated viewer who is the author
/// or a member of the author's circle.
///
/// # Errors
///
/// - [`AviaryError::Unauthorized`] for an anonymous viewer.
/// - [`AviaryError::UserNotFound`] if the author is absent or banned.
/// - [`AviaryError::Forbidden`] if the viewer is outside the circle.
/// - [`AviaryError::Store`] if a lookup fails.
pub fn authorize(store: &TweetStore, tweet: &Tweet, viewer: Option<&Viewer>) -> Result<()> {
    if tweet.audience == TweetAudience::Everyone {
        return Ok(());
    }

    let Some(viewer) = viewer else {
        return Err(AviaryError::Unauthorized);
    };

    let author = store
        .get_user(&tweet.author_id)?
        .filter(|author| author.verify != UserVerifyStatus::Banned)
        .ok_or_else(|| AviaryError::user_not_found(&tweet.author_id))?;

    if author.id == viewer.id || store.is_circle_member(&author.id, &viewer.id)? {
        Ok(())
    } else {
        Err(AviaryError::Forbidden)
    }
}

/// Boolean form of [`authorize`]: denial conditions become `false`,
/// store failures still propagate.
///
/// # Errors
///
/// Returns an error only if a store lookup fails.
pub fn is_visible(store: &TweetStore, tweet: &Tweet, viewer: Option<&Viewer>) -> Result<bool> {
    match authorize(store, tweet, viewer) {
        Ok(()) => Ok(true),
        Err(
            AviaryError::Unauthorized
            | AviaryError::Forbidden
            | AviaryError::UserNotFound { .. },
        ) => Ok(false),
        Err(e) => Err(e),
    }
}
