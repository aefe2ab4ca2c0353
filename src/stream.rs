use std::collections::{HashSet, VecDeque};
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::driver::PostHandler;
use crate::error::{DeliveryError, SourceError};
use crate::sources::{Post, PostSource};

const SEEN_CAPACITY: usize = 1000;

/// Bounded memory of ids that were already emitted.
struct SeenIds {
    order: VecDeque<String>,
    set: HashSet<String>,
    capacity: usize,
}

impl SeenIds {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            set: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// `true` if `id` was not seen before.
    fn insert(&mut self, id: &str) -> bool {
        if self.set.contains(id) {
            return false;
        }
        self.set.insert(id.to_string());
        self.order.push_back(id.to_string());
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.set.remove(&old);
            }
        }
        true
    }
}

/// Watches the newest listing and emits every post exactly once.
pub struct Scanner<S> {
    source: S,
    seen: SeenIds,
    primed: bool,
    limit: u32,
}

impl<S: PostSource> Scanner<S> {
    pub fn new(source: S, limit: u32) -> Self {
        Self {
            source,
            seen: SeenIds::new(SEEN_CAPACITY.max(limit as usize)),
            primed: false,
            limit: limit.max(1),
        }
    }

    /// Posts that appeared since the previous scan, oldest first.
    /// The first successful scan only records what already exists.
    pub fn scan(&mut self) -> Result<Vec<Post>, SourceError> {
        let listing = self.source.list_newest(self.limit)?;
        let mut fresh: Vec<Post> = listing.into_iter().filter(|p| self.seen.insert(&p.id)).collect();

        if !self.primed {
            self.primed = true;
            debug!(count = fresh.len(), "Scanner primed");
            return Ok(vec![]);
        }

        fresh.reverse();
        Ok(fresh)
    }

    /// Scans every `interval` until the receiving side goes away.
    pub fn run(mut self, interval: Duration, tx: mpsc::Sender<Post>) {
        loop {
            match self.scan() {
                Ok(posts) => {
                    for post in posts {
                        if tx.blocking_send(post).is_err() {
                            info!("Event receiver closed, scanner stopping");
                            return;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Scan failed"),
            }
            thread::sleep(interval);
        }
    }
}

/// Handles one post per event. Keeps no state between events.
pub struct EventDriver<H> {
    handler: H,
}

impl<H: PostHandler> EventDriver<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    pub fn on_post(&self, post: &Post) -> Result<(), DeliveryError> {
        debug!(id = %post.id, thumbnail = ?post.thumbnail, "New submission");
        let body = self.handler.handle(post)?;
        info!("{} posted \"{}\"", post.author, post.title);
        info!(response = %body, "Webhook response");
        Ok(())
    }

    /// Consumes events until every sender is dropped.
    pub fn run(&self, mut rx: mpsc::Receiver<Post>) {
        while let Some(post) = rx.blocking_recv() {
            if let Err(e) = self.on_post(&post) {
                error!(id = %post.id, error = %e, "Delivering submission failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sources::PollWindow;

    fn post(id: &str) -> Post {
        Post {
            id: id.into(),
            title: "t".into(),
            author: "alice".into(),
            permalink: String::new(),
            url: None,
            selftext: None,
            thumbnail: None,
            created_utc: 0,
            is_self: true,
        }
    }

    struct Listings(RefCell<VecDeque<Vec<&'static str>>>);

    impl PostSource for Listings {
        fn list(&self, _window: &PollWindow) -> Result<Vec<Post>, SourceError> {
            match self.0.borrow_mut().pop_front() {
                Some(ids) => Ok(ids.into_iter().map(post).collect()),
                None => Err(SourceError::Auth("exhausted".into())),
            }
        }
    }

    fn ids(posts: &[Post]) -> Vec<&str> {
        posts.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn first_scan_primes_then_emits_oldest_first() {
        let source = Listings(RefCell::new(VecDeque::from(vec![
            vec!["t3_b", "t3_a"],
            vec!["t3_d", "t3_c", "t3_b", "t3_a"],
            vec!["t3_d", "t3_c", "t3_b"],
        ])));
        let mut scanner = Scanner::new(source, 25);

        assert!(scanner.scan().unwrap().is_empty());
        assert_eq!(ids(&scanner.scan().unwrap()), vec!["t3_c", "t3_d"]);
        assert!(scanner.scan().unwrap().is_empty());
    }

    #[test]
    fn failed_scan_does_not_prime() {
        let source = Listings(RefCell::new(VecDeque::new()));
        let mut scanner = Scanner::new(source, 25);

        assert!(scanner.scan().is_err());
        assert!(!scanner.primed);
    }

    #[test]
    fn seen_ids_forget_oldest() {
        let mut seen = SeenIds::new(2);
        assert!(seen.insert("a"));
        assert!(seen.insert("b"));
        assert!(!seen.insert("a"));
        assert!(seen.insert("c"));
        assert!(seen.insert("a"), "evicted id counts as new");
    }

    struct FlakyHandler(RefCell<Vec<String>>);

    impl PostHandler for FlakyHandler {
        fn handle(&self, post: &Post) -> Result<String, DeliveryError> {
            self.0.borrow_mut().push(post.id.clone());
            if post.id == "t3_bad" {
                Err(DeliveryError::Status {
                    status: 500,
                    body: String::new(),
                })
            } else {
                Ok(String::new())
            }
        }
    }

    #[test]
    fn each_event_is_handled_independently() {
        let (tx, rx) = mpsc::channel(8);
        for id in ["t3_a", "t3_bad", "t3_c"] {
            tx.blocking_send(post(id)).unwrap();
        }
        drop(tx);

        let driver = EventDriver::new(FlakyHandler(RefCell::new(vec![])));
        driver.run(rx);

        assert_eq!(*driver.handler.0.borrow(), vec!["t3_a", "t3_bad", "t3_c"]);
    }
}
