use std::sync::Arc;

use crate::error::SourceError;

/// One submission in the watched subreddit.
#[derive(Clone, Debug, PartialEq)]
pub struct Post {
    /// Fullname, e.g. `t3_abc123`. Unique across the site.
    pub id: String,
    pub title: String,
    /// Author handle without the `u/` prefix.
    pub author: String,
    /// Absolute link to the comments page.
    pub permalink: String,
    /// Link target of a link post. `None` for self posts.
    pub url: Option<String>,
    /// Body of a self post. `None` if empty or not a self post.
    pub selftext: Option<String>,
    /// Thumbnail image. `None` when the site reports a placeholder.
    pub thumbnail: Option<String>,
    /// Unix seconds.
    pub created_utc: i64,
    pub is_self: bool,
}

/// Query constraint for one listing call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollWindow {
    /// The `limit` newest posts.
    Top(u32),
    /// Posts strictly newer than `marker`, at most `limit` of them.
    Before { marker: String, limit: u32 },
}

impl PollWindow {
    pub fn limit(&self) -> u32 {
        match self {
            PollWindow::Top(limit) => *limit,
            PollWindow::Before { limit, .. } => *limit,
        }
    }

    pub fn marker(&self) -> Option<&str> {
        match self {
            PollWindow::Top(_) => None,
            PollWindow::Before { marker, .. } => Some(marker),
        }
    }
}

/// Listing side of the upstream API. Results are always newest-first and
/// an empty listing is `Ok(vec![])`, never an error.
pub trait PostSource {
    /// One-time session setup. Sources without a login succeed trivially.
    fn authenticate(&self) -> Result<(), SourceError> {
        Ok(())
    }

    fn list(&self, window: &PollWindow) -> Result<Vec<Post>, SourceError>;

    fn list_newest(&self, limit: u32) -> Result<Vec<Post>, SourceError> {
        self.list(&PollWindow::Top(limit))
    }

    fn list_newest_before(&self, marker: &str, limit: u32) -> Result<Vec<Post>, SourceError> {
        self.list(&PollWindow::Before {
            marker: marker.to_string(),
            limit,
        })
    }
}

/// Raw profile metadata (`about.json`) of a user.
pub trait ProfileFetcher {
    fn fetch_profile(&self, username: &str) -> Result<String, SourceError>;
}

impl<T: PostSource + ?Sized> PostSource for Arc<T> {
    fn authenticate(&self) -> Result<(), SourceError> {
        (**self).authenticate()
    }

    fn list(&self, window: &PollWindow) -> Result<Vec<Post>, SourceError> {
        (**self).list(window)
    }
}

impl<T: ProfileFetcher + ?Sized> ProfileFetcher for Arc<T> {
    fn fetch_profile(&self, username: &str) -> Result<String, SourceError> {
        (**self).fetch_profile(username)
    }
}
