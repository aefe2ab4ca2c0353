use crate::error::SourceError;
use crate::sources::PostSource;

/// Fullname of the last post handed to the webhook.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Bookmark {
    last_id: Option<String>,
}

impl Bookmark {
    /// Marks the current newest post so older history is never replayed.
    /// An empty subreddit leaves the bookmark unset.
    pub fn initialize<S: PostSource + ?Sized>(&mut self, source: &S) -> Result<Option<&str>, SourceError> {
        let newest = source.list_newest(1)?;
        if let Some(post) = newest.into_iter().next() {
            self.last_id = Some(post.id);
        }
        Ok(self.current())
    }

    pub fn current(&self) -> Option<&str> {
        self.last_id.as_deref()
    }

    /// Overwrites the bookmark. Ordering is the caller's business.
    pub fn advance(&mut self, id: impl Into<String>) {
        self.last_id = Some(id.into());
    }
}
