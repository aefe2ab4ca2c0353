use std::path::Path;
use std::{fs, io};
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::driver::AdvancePolicy;
use crate::error::ConfigError;
use crate::format::{EmbedStyle, FormatSettings};
use crate::sources::reddit::Credentials;

const DEFAULT_USER_AGENT: &str = concat!("linux:subhook:", env!("CARGO_PKG_VERSION"));

lazy_static! {
    static ref SUBREDDIT_NAME: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_]{1,20}$").unwrap();
}

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Timer driven, bookmarked, one post per tick.
    #[default]
    Poll,
    /// Scanner worker, one event per post.
    Stream,
}

impl Mode {
    fn default_interval(self) -> Duration {
        match self {
            Mode::Poll => Duration::from_secs(60),
            Mode::Stream => Duration::from_secs(20),
        }
    }
}

/// Raw config file. Every field is optional so flags can fill the gaps.
#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub subreddit: Option<String>,
    pub mode: Option<Mode>,
    pub interval_secs: Option<u64>,
    pub advance: Option<AdvancePolicy>,
    pub user_agent: Option<String>,

    pub reddit: Option<RedditConfig>,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct RedditConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub style: Option<EmbedStyle>,
    pub color: Option<String>,
    pub icon_url: Option<String>,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

/// Values given on the command line or in the environment.
#[derive(Default, Debug)]
pub struct Overrides {
    pub webhook: Option<String>,
    pub subreddit: Option<String>,
    pub mode: Option<Mode>,
    pub interval_secs: Option<u64>,
}

/// Validated settings the rest of the program runs on.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub subreddit: String,
    pub mode: Mode,
    pub interval: Duration,
    pub advance: AdvancePolicy,
    pub user_agent: String,
    pub credentials: Option<Credentials>,
    pub webhook_url: String,
    pub format: FormatSettings,
}

impl Config {
    /// Reads `path`. A missing file yields an empty config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn into_settings(self, overrides: Overrides) -> Result<Settings, ConfigError> {
        let subreddit = overrides
            .subreddit
            .or(self.subreddit)
            .ok_or(ConfigError::Missing("subreddit"))?;
        let subreddit = normalize_subreddit(&subreddit)?;

        let webhook_url = overrides
            .webhook
            .or(self.webhook.url)
            .ok_or(ConfigError::Missing("webhook"))?;
        if let Err(e) = reqwest::Url::parse(&webhook_url) {
            return Err(ConfigError::Invalid {
                field: "webhook",
                reason: e.to_string(),
            });
        }

        let mode = overrides.mode.or(self.mode).unwrap_or_default();
        let interval = match overrides.interval_secs.or(self.interval_secs) {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    field: "interval",
                    reason: "must be at least one second".into(),
                })
            }
            Some(secs) => Duration::from_secs(secs),
            None => mode.default_interval(),
        };

        let credentials = match self.reddit {
            Some(reddit) => credentials(reddit)?,
            None => None,
        };

        let style = self.webhook.style.unwrap_or_default();
        let format = FormatSettings {
            subreddit: subreddit.clone(),
            style,
            color: self
                .webhook
                .color
                .unwrap_or_else(|| style.default_color().to_string()),
            icon_url: self.webhook.icon_url,
            username: self.webhook.username,
            avatar_url: self.webhook.avatar_url,
        };

        Ok(Settings {
            subreddit,
            mode,
            interval,
            advance: self.advance.unwrap_or_default(),
            user_agent: self.user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            credentials,
            webhook_url,
            format,
        })
    }
}

/// Strips an `r/` prefix, lowercases and checks the name.
fn normalize_subreddit(raw: &str) -> Result<String, ConfigError> {
    let name = raw.trim().trim_start_matches('/');
    let name = name.strip_prefix("r/").unwrap_or(name);

    if !SUBREDDIT_NAME.is_match(name) {
        return Err(ConfigError::Invalid {
            field: "subreddit",
            reason: format!("{raw:?} is not a subreddit name"),
        });
    }
    Ok(name.to_lowercase())
}

/// All four values, or none of them for logged-out script mode.
/// Blank values count as unset.
fn credentials(reddit: RedditConfig) -> Result<Option<Credentials>, ConfigError> {
    let set = |v: Option<String>| v.filter(|v| !v.trim().is_empty());
    match (
        set(reddit.client_id),
        set(reddit.client_secret),
        set(reddit.username),
        set(reddit.password),
    ) {
        (Some(client_id), Some(client_secret), Some(username), Some(password)) => Ok(Some(Credentials {
            client_id,
            client_secret,
            username,
            password,
        })),
        (None, None, None, None) => Ok(None),
        _ => Err(ConfigError::Invalid {
            field: "reddit",
            reason: "client_id, client_secret, username and password must be set together".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const FULL: &str = r#"
        subreddit = "r/EarthPorn"
        mode = "poll"
        interval_secs = 90
        advance = "before_delivery"

        [reddit]
        client_id = "id"
        client_secret = "secret"
        username = "bot"
        password = "hunter2"

        [webhook]
        url = "https://discord.com/api/webhooks/1/abc"
        style = "simple"
        icon_url = "https://example.com/icon.png"
    "#;

    #[test]
    fn full_file() {
        let settings = Config::parse(FULL).unwrap().into_settings(Overrides::default()).unwrap();

        assert_eq!(settings.subreddit, "earthporn");
        assert_eq!(settings.interval, Duration::from_secs(90));
        assert_eq!(settings.advance, AdvancePolicy::BeforeDelivery);
        assert_eq!(settings.credentials.as_ref().map(|c| c.username.as_str()), Some("bot"));
        assert_eq!(settings.format.style, EmbedStyle::Simple);
        assert_eq!(settings.format.color, "16763904");
        assert_eq!(settings.format.icon_url.as_deref(), Some("https://example.com/icon.png"));
    }

    #[test]
    fn flags_alone_give_script_mode_defaults() {
        let settings = Config::default()
            .into_settings(Overrides {
                webhook: Some("https://discord.com/api/webhooks/1/abc".into()),
                subreddit: Some("rust".into()),
                mode: Some(Mode::Stream),
                interval_secs: None,
            })
            .unwrap();

        assert_eq!(settings.credentials, None);
        assert_eq!(settings.mode, Mode::Stream);
        assert_eq!(settings.interval, Duration::from_secs(20));
        assert_eq!(settings.advance, AdvancePolicy::AfterDelivery);
        assert_eq!(settings.format.style, EmbedStyle::Rich);
        assert_eq!(settings.format.color, "16729344");
    }

    #[test]
    fn flags_override_file() {
        let settings = Config::parse(FULL)
            .unwrap()
            .into_settings(Overrides {
                subreddit: Some("pics".into()),
                interval_secs: Some(5),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(settings.subreddit, "pics");
        assert_eq!(settings.interval, Duration::from_secs(5));
    }

    #[test]
    fn missing_required_values() {
        let err = Config::default().into_settings(Overrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("subreddit")));

        let err = Config::default()
            .into_settings(Overrides {
                subreddit: Some("rust".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("webhook")));
    }

    #[test]
    fn rejects_bad_values() {
        let overrides = |subreddit: &str, interval_secs| Overrides {
            webhook: Some("https://discord.com/api/webhooks/1/abc".into()),
            subreddit: Some(subreddit.into()),
            mode: None,
            interval_secs,
        };

        for (subreddit, interval, field) in [
            ("no spaces", None, "subreddit"),
            ("x", None, "subreddit"),
            ("rust", Some(0), "interval"),
        ] {
            let err = Config::default().into_settings(overrides(subreddit, interval)).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { field: f, .. } if f == field), "{err}");
        }

        let err = Config::default()
            .into_settings(Overrides {
                webhook: Some("not a url".into()),
                subreddit: Some("rust".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "webhook", .. }));
    }

    #[test]
    fn partial_credentials_are_rejected() {
        let config = Config::parse(
            r#"
            subreddit = "rust"
            [reddit]
            client_id = "id"
            [webhook]
            url = "https://discord.com/api/webhooks/1/abc"
            "#,
        )
        .unwrap();

        let err = config.into_settings(Overrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "reddit", .. }));
    }

    #[test]
    fn blank_credentials_mean_script_mode() {
        let config = Config::parse(
            r#"
            subreddit = "rust"
            [reddit]
            client_id = ""
            client_secret = ""
            username = ""
            password = ""
            [webhook]
            url = "https://discord.com/api/webhooks/1/abc"
            "#,
        )
        .unwrap();

        let settings = config.into_settings(Overrides::default()).unwrap();
        assert_eq!(settings.credentials, None);
    }

    #[test]
    fn unknown_keys_are_a_parse_error() {
        assert!(matches!(Config::parse("subredit = \"typo\""), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file_is_empty_config() {
        let config = Config::load(Path::new("/nonexistent/subhook.toml")).unwrap();
        assert!(config.subreddit.is_none());
    }
}
