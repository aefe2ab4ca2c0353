use chrono::{DateTime, SecondsFormat};
use serde::Deserialize;

use crate::avatar::resolve_avatar;
use crate::sources::{Post, ProfileFetcher};
use crate::webhook::{Embed, EmbedAuthor, EmbedField, EmbedImage, WebhookPayload};

const TITLE_LIMIT: usize = 256;
const DESCRIPTION_LIMIT: usize = 4096;

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbedStyle {
    /// Post title as the embed title, author avatar, timestamp.
    #[default]
    Rich,
    /// Generic "New post to r/..." title with the post in a field.
    Simple,
}

impl EmbedStyle {
    pub fn default_color(self) -> &'static str {
        match self {
            EmbedStyle::Rich => "16729344",
            EmbedStyle::Simple => "16763904",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FormatSettings {
    pub subreddit: String,
    pub style: EmbedStyle,
    pub color: String,
    /// Author icon for the simple style. Falls back to a profile lookup.
    pub icon_url: Option<String>,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

/// Turns posts into webhook payloads.
pub struct Formatter<P> {
    settings: FormatSettings,
    profiles: P,
}

impl<P: ProfileFetcher> Formatter<P> {
    pub fn new(settings: FormatSettings, profiles: P) -> Self {
        Self { settings, profiles }
    }

    pub fn format(&self, post: &Post) -> WebhookPayload {
        let link = match (&post.url, post.is_self) {
            (Some(url), false) => url.clone(),
            _ => post.permalink.clone(),
        };

        let (title, url, fields, icon_url) = match self.settings.style {
            EmbedStyle::Rich => (
                truncate(&post.title, TITLE_LIMIT),
                link,
                vec![],
                self.avatar(&post.author),
            ),
            EmbedStyle::Simple => (
                format!("New post to r/{}", self.settings.subreddit),
                post.permalink.clone(),
                vec![EmbedField {
                    name: truncate(&post.title, TITLE_LIMIT),
                    value: link,
                    inline: false,
                }],
                match &self.settings.icon_url {
                    Some(icon) => icon.clone(),
                    None => self.avatar(&post.author),
                },
            ),
        };

        let (description, image) = if post.is_self {
            (post.selftext.as_deref().map(|s| truncate(s, DESCRIPTION_LIMIT)), None)
        } else {
            (None, post.thumbnail.clone().map(|url| EmbedImage { url }))
        };

        WebhookPayload {
            embeds: vec![Embed {
                title,
                url,
                color: self.settings.color.clone(),
                description,
                fields,
                author: EmbedAuthor {
                    name: post.author.clone(),
                    url: format!("https://www.reddit.com/user/{}/", post.author),
                    icon_url,
                },
                timestamp: rfc3339(post.created_utc),
                image,
            }],
            username: self.settings.username.clone(),
            avatar_url: self.settings.avatar_url.clone(),
        }
    }

    fn avatar(&self, author: &str) -> String {
        resolve_avatar(&self.profiles, author, &mut rand::thread_rng())
    }
}

fn rfc3339(unix: i64) -> Option<String> {
    DateTime::from_timestamp(unix, 0).map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Cuts `s` to at most `max` chars, marking the cut with an ellipsis.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max - 1).collect();
    out.push('…');
    out
}
