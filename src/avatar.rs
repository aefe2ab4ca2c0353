use rand::Rng;
use tracing::info;

use crate::sources::ProfileFetcher;

pub const DEFAULT_AVATARS: [&str; 7] = [
    "https://www.redditstatic.com/avatars/defaults/v2/avatar_default_0.png",
    "https://www.redditstatic.com/avatars/defaults/v2/avatar_default_1.png",
    "https://www.redditstatic.com/avatars/defaults/v2/avatar_default_2.png",
    "https://www.redditstatic.com/avatars/defaults/v2/avatar_default_3.png",
    "https://www.redditstatic.com/avatars/defaults/v2/avatar_default_4.png",
    "https://www.redditstatic.com/avatars/defaults/v2/avatar_default_5.png",
    "https://www.redditstatic.com/avatars/defaults/v2/avatar_default_6.png",
];

pub fn default_avatar<R: Rng + ?Sized>(rng: &mut R) -> String {
    DEFAULT_AVATARS[rng.gen_range(0..DEFAULT_AVATARS.len())].to_string()
}

/// Pulls `data.icon_img` out of an `about.json` body.
/// `None` if the body is malformed or the field is missing or empty.
pub fn icon_from_profile(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let icon = value.get("data")?.get("icon_img")?.as_str()?;
    let icon = icon.replace("&amp;", "&");

    if icon.is_empty() {
        None
    } else {
        Some(icon)
    }
}

/// Profile picture of `username`, or one of [`DEFAULT_AVATARS`].
/// Never fails.
pub fn resolve_avatar<F, R>(fetcher: &F, username: &str, rng: &mut R) -> String
where
    F: ProfileFetcher + ?Sized,
    R: Rng + ?Sized,
{
    let body = match fetcher.fetch_profile(username) {
        Ok(body) => body,
        Err(e) => {
            info!(%username, error = %e, "Could not fetch profile, using default avatar");
            return default_avatar(rng);
        }
    };

    match icon_from_profile(&body) {
        Some(icon) => icon,
        None => {
            info!(%username, "No usable avatar in profile, using default avatar");
            default_avatar(rng)
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::error::SourceError;

    struct FixedProfile(Result<&'static str, u16>);

    impl ProfileFetcher for FixedProfile {
        fn fetch_profile(&self, _username: &str) -> Result<String, SourceError> {
            match self.0 {
                Ok(body) => Ok(body.to_string()),
                Err(status) => Err(SourceError::Status {
                    status,
                    body: String::new(),
                }),
            }
        }
    }

    fn resolve(profile: FixedProfile) -> String {
        let mut rng = StdRng::seed_from_u64(7);
        resolve_avatar(&profile, "alice", &mut rng)
    }

    #[test]
    fn uses_profile_icon_and_unescapes_it() {
        let avatar = resolve(FixedProfile(Ok(
            r#"{"data": {"icon_img": "https://styles.example.com/a.png?width=256&amp;s=abc"}}"#,
        )));
        assert_eq!(avatar, "https://styles.example.com/a.png?width=256&s=abc");
    }

    #[test]
    fn falls_back_on_every_kind_of_bad_profile() {
        let bad = [
            FixedProfile(Err(404)),
            FixedProfile(Ok("")),
            FixedProfile(Ok("<html>not json</html>")),
            FixedProfile(Ok(r#"{"data": {}}"#)),
            FixedProfile(Ok(r#"{"data": {"icon_img": ""}}"#)),
            FixedProfile(Ok(r#"{"data": {"icon_img": 42}}"#)),
            FixedProfile(Ok(r#"[]"#)),
        ];

        for profile in bad {
            let avatar = resolve(profile);
            assert!(DEFAULT_AVATARS.contains(&avatar.as_str()), "{avatar}");
        }
    }

    #[test]
    fn seeded_default_is_deterministic() {
        let a = default_avatar(&mut StdRng::seed_from_u64(1));
        let b = default_avatar(&mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
    }
}
