use std::sync::Mutex;

use serde::Deserialize;
use tracing::{debug, info};

use super::{Post, PollWindow, PostSource, ProfileFetcher};
use crate::error::SourceError;

const WWW_BASE: &str = "https://www.reddit.com";
const OAUTH_BASE: &str = "https://oauth.reddit.com";

/// Placeholder values the API puts in `thumbnail` instead of an image url.
const THUMBNAIL_SENTINELS: [&str; 6] = ["", "self", "default", "nsfw", "spoiler", "image"];

/// Password-grant credentials of a "script" type app.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

pub struct RedditClient {
    http: reqwest::blocking::Client,
    subreddit: String,
    credentials: Option<Credentials>,
    /// Bearer token after a successful login. Stays `None` in script mode.
    token: Mutex<Option<String>>,
    auth_base: String,
    oauth_base: String,
    www_base: String,
}

#[derive(Deserialize)]
struct RedditListing {
    data: RedditListingData,
}
#[derive(Deserialize)]
struct RedditListingData {
    children: Vec<RedditThing>,
}
#[derive(Deserialize)]
struct RedditThing {
    data: RedditRawPost,
}
#[derive(Deserialize)]
struct RedditRawPost {
    name: String,
    title: String,
    author: String,
    permalink: String,
    url: Option<String>,
    #[serde(default)]
    selftext: String,
    thumbnail: Option<String>,
    created_utc: f64,
    #[serde(default)]
    is_self: bool,
}
#[derive(Deserialize)]
struct RedditTokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

impl RedditClient {
    pub fn new(
        subreddit: impl Into<String>,
        user_agent: &str,
        credentials: Option<Credentials>,
    ) -> Result<Self, SourceError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            http,
            subreddit: subreddit.into(),
            credentials,
            token: Mutex::new(None),
            auth_base: WWW_BASE.into(),
            oauth_base: OAUTH_BASE.into(),
            www_base: WWW_BASE.into(),
        })
    }

    /// Points every endpoint at `base`. Used against mock servers.
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.auth_base = base.into();
        self.oauth_base = base.into();
        self.www_base = base.into();
        self
    }

    fn bearer(&self) -> Option<String> {
        self.token.lock().ok().and_then(|t| t.clone())
    }
}

impl PostSource for RedditClient {
    fn authenticate(&self) -> Result<(), SourceError> {
        let creds = match &self.credentials {
            Some(c) => c,
            None => {
                info!("No credentials configured, running as a logged-out script");
                return Ok(());
            }
        };

        let res = self
            .http
            .post(format!("{}/api/v1/access_token", self.auth_base))
            .basic_auth(&creds.client_id, Some(&creds.client_secret))
            .form(&[
                ("grant_type", "password"),
                ("username", creds.username.as_str()),
                ("password", creds.password.as_str()),
            ])
            .send()?;

        let status = res.status();
        let text = res.text()?;
        if !status.is_success() {
            return Err(SourceError::Auth(format!("{}: {}", status.as_u16(), text)));
        }

        // Bad user credentials come back as 200 with an `error` field.
        let token: RedditTokenResponse = serde_json::from_str(&text)?;
        match (token.access_token, token.error) {
            (Some(access_token), None) => {
                if let Ok(mut slot) = self.token.lock() {
                    *slot = Some(access_token);
                }
                info!(user = %creds.username, "Logged in to reddit");
                Ok(())
            }
            (_, Some(error)) => Err(SourceError::Auth(error)),
            (None, None) => Err(SourceError::Auth("no access token in response".into())),
        }
    }

    fn list(&self, window: &PollWindow) -> Result<Vec<Post>, SourceError> {
        let bearer = self.bearer();
        let url = match bearer {
            Some(_) => format!("{}/r/{}/new", self.oauth_base, self.subreddit),
            None => format!("{}/r/{}/new.json", self.www_base, self.subreddit),
        };

        let mut query = vec![
            ("limit", window.limit().to_string()),
            ("raw_json", "1".to_string()),
        ];
        if let Some(marker) = window.marker() {
            query.push(("before", marker.to_string()));
        }

        let mut req = self.http.get(url).query(&query);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        let res = req.send()?;

        let status = res.status();
        let text = res.text()?;
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let posts = parse_listing(&text)?;
        debug!(count = posts.len(), window = ?window, "Fetched listing");
        Ok(posts)
    }
}

impl ProfileFetcher for RedditClient {
    fn fetch_profile(&self, username: &str) -> Result<String, SourceError> {
        let res = self
            .http
            .get(format!("{}/user/{}/about.json", self.www_base, username))
            .send()?;

        let status = res.status();
        let text = res.text()?;
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}

/// Decodes a `/new` listing into posts, keeping the listing order.
pub fn parse_listing(body: &str) -> Result<Vec<Post>, serde_json::Error> {
    let listing: RedditListing = serde_json::from_str(body)?;
    Ok(listing
        .data
        .children
        .into_iter()
        .map(|thing| thing.data.into_post())
        .collect())
}

impl RedditRawPost {
    fn into_post(self) -> Post {
        let raw = self;
        let permalink = if raw.permalink.starts_with("http") {
            raw.permalink
        } else {
            format!("{}{}", WWW_BASE, raw.permalink)
        };

        let thumbnail = raw
            .thumbnail
            .filter(|t| !THUMBNAIL_SENTINELS.contains(&t.as_str()) && t.starts_with("http"));

        let (url, selftext) = if raw.is_self {
            (None, Some(raw.selftext).filter(|s| !s.is_empty()))
        } else {
            (raw.url, None)
        };

        Post {
            id: raw.name,
            title: raw.title,
            author: raw.author,
            permalink,
            url,
            selftext,
            thumbnail,
            created_utc: raw.created_utc as i64,
            is_self: raw.is_self,
        }
    }
}
