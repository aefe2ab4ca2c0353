mod base;
pub mod reddit;

pub use base::{Post, PollWindow, PostSource, ProfileFetcher};
