use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::bookmark::Bookmark;
use crate::error::{DeliveryError, SourceError};
use crate::format::Formatter;
use crate::sources::{Post, PollWindow, PostSource, ProfileFetcher};
use crate::webhook::Sink;

/// `before=<bookmark>&limit=1` yields exactly the next unseen post.
/// A wider window would return newer posts first and skip the rest.
const FETCH_LIMIT: u32 = 1;

/// How many posts the backlog check asks for.
const DRAIN_LIMIT: u32 = 100;

/// Empty ticks in a row before checking whether the bookmarked post is gone.
const STALE_CHECK_TICKS: u32 = 10;

/// Something that forwards a single post somewhere.
pub trait PostHandler {
    /// Returns the remote response body on success.
    fn handle(&self, post: &Post) -> Result<String, DeliveryError>;
}

/// Formats a post and pushes it through a sink.
pub struct Announcer<P, K> {
    formatter: Formatter<P>,
    sink: K,
}

impl<P: ProfileFetcher, K: Sink> Announcer<P, K> {
    pub fn new(formatter: Formatter<P>, sink: K) -> Self {
        Self { formatter, sink }
    }
}

impl<P: ProfileFetcher, K: Sink> PostHandler for Announcer<P, K> {
    fn handle(&self, post: &Post) -> Result<String, DeliveryError> {
        let payload = self.formatter.format(post);
        debug!(payload = ?payload, "Formatted webhook payload");
        self.sink.deliver(&payload)
    }
}

/// When the bookmark moves relative to the delivery of its post.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdvancePolicy {
    /// Move only once the webhook accepted the post. A failed post is
    /// retried next tick.
    #[default]
    AfterDelivery,
    /// Move as soon as the post is fetched. A failed post is skipped.
    BeforeDelivery,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Starting,
    Idle,
    Fetching,
    Delivering,
    Draining,
    Fatal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    NothingNew,
    FetchFailed,
    Delivered { id: String, backlog: usize },
    /// Transient failure; the post is tried again unless the bookmark
    /// already moved past it.
    DeliveryFailed { id: String, backlog: usize },
    /// The webhook refused the post for good; it was skipped.
    Rejected { id: String, backlog: usize },
}

/// Timer driven loop: at most one post forwarded per tick.
pub struct PollDriver<S, H> {
    source: S,
    handler: H,
    bookmark: Bookmark,
    policy: AdvancePolicy,
    state: DriverState,
    /// Consecutive ticks that found nothing past the bookmark.
    quiet_ticks: u32,
}

impl<S: PostSource, H: PostHandler> PollDriver<S, H> {
    pub fn new(source: S, handler: H, policy: AdvancePolicy) -> Self {
        Self {
            source,
            handler,
            bookmark: Bookmark::default(),
            policy,
            state: DriverState::Starting,
            quiet_ticks: 0,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn bookmark(&self) -> Option<&str> {
        self.bookmark.current()
    }

    /// Logs in and sets the initial bookmark. Any error here is fatal.
    pub fn start(&mut self) -> Result<(), SourceError> {
        self.set_state(DriverState::Starting);

        let started = self
            .source
            .authenticate()
            .and_then(|_| self.bookmark.initialize(&self.source).map(|id| id.map(String::from)));

        match started {
            Ok(Some(id)) => info!(bookmark = %id, "Initial bookmark set"),
            Ok(None) => info!("Subreddit is empty, starting without a bookmark"),
            Err(e) => {
                self.set_state(DriverState::Fatal);
                return Err(e);
            }
        }

        self.set_state(DriverState::Idle);
        Ok(())
    }

    /// Blocks forever, running one tick per `interval`.
    pub fn run(&mut self, interval: Duration) {
        loop {
            thread::sleep(interval);
            self.tick();
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        self.set_state(DriverState::Fetching);

        let window = match self.bookmark.current() {
            Some(marker) => PollWindow::Before {
                marker: marker.to_string(),
                limit: FETCH_LIMIT,
            },
            None => PollWindow::Top(FETCH_LIMIT),
        };

        let posts = match self.source.list(&window) {
            Ok(posts) => posts,
            Err(e) => {
                warn!(error = %e, "Fetching new submissions failed");
                self.set_state(DriverState::Idle);
                return TickOutcome::FetchFailed;
            }
        };

        let post = match posts.into_iter().next() {
            Some(post) => post,
            None => {
                debug!("No new submissions. Continuing.");
                self.quiet_ticks += 1;
                if self.quiet_ticks >= STALE_CHECK_TICKS {
                    self.quiet_ticks = 0;
                    self.check_stale_bookmark();
                }
                self.set_state(DriverState::Idle);
                return TickOutcome::NothingNew;
            }
        };
        self.quiet_ticks = 0;

        if self.policy == AdvancePolicy::BeforeDelivery {
            self.bookmark.advance(post.id.as_str());
        }

        self.set_state(DriverState::Delivering);
        debug!(id = %post.id, thumbnail = ?post.thumbnail, "New submission");

        let result = self.handler.handle(&post);
        match &result {
            Ok(body) => {
                info!(author = %post.author, title = %post.title, "Forwarded submission");
                info!(response = %body, "Webhook response");
                self.bookmark.advance(post.id.as_str());
            }
            Err(e) if e.is_permanent() => {
                error!(id = %post.id, error = %e, "Webhook rejected submission, skipping it");
                self.bookmark.advance(post.id.as_str());
            }
            Err(e) => error!(id = %post.id, error = %e, "Delivering submission failed"),
        }

        self.set_state(DriverState::Draining);
        let backlog = self.drain();
        self.set_state(DriverState::Idle);

        let id = post.id;
        match result {
            Ok(_) => TickOutcome::Delivered { id, backlog },
            Err(e) if e.is_permanent() => TickOutcome::Rejected { id, backlog },
            Err(_) => TickOutcome::DeliveryFailed { id, backlog },
        }
    }

    /// A removed bookmarked post makes every `before=` query come back empty.
    /// If the newest post is no longer the bookmark, start over from it.
    fn check_stale_bookmark(&mut self) {
        let marker = match self.bookmark.current() {
            Some(marker) => marker.to_string(),
            None => return,
        };

        match self.source.list_newest(1) {
            Ok(newest) => {
                if let Some(post) = newest.into_iter().next() {
                    if post.id != marker {
                        warn!(
                            stale = %marker,
                            newest = %post.id,
                            "Bookmarked submission no longer listed, resetting bookmark to newest"
                        );
                        self.bookmark.advance(post.id);
                    }
                }
            }
            Err(e) => debug!(error = %e, "Stale bookmark check failed"),
        }
    }

    /// Counts what is still waiting past the bookmark without delivering it.
    fn drain(&self) -> usize {
        let marker = match self.bookmark.current() {
            Some(marker) => marker,
            None => return 0,
        };

        match self.source.list_newest_before(marker, DRAIN_LIMIT) {
            Ok(left) => {
                if left.is_empty() {
                    debug!("0 submissions left to process");
                } else {
                    warn!("{} submissions left to process", left.len());
                }
                left.len()
            }
            Err(e) => {
                debug!(error = %e, "Backlog check failed");
                0
            }
        }
    }

    fn set_state(&mut self, next: DriverState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Driver state");
            self.state = next;
        }
    }
}
