use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

use agora_media::CompressionSettings;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_days: i64,
    pub staff_emails: Vec<String>,
    pub media_dir: PathBuf,
    pub media_url: String,
    pub frontend_url: String,
    pub compression: CompressionSettings,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unset and blank values take
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = get("AGORA_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("AGORA_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let defaults = CompressionSettings::default();
        let compression = CompressionSettings {
            compress_images: parsed(&get, "AGORA_COMPRESS_IMAGES", defaults.compress_images)?,
            compress_videos: parsed(&get, "AGORA_COMPRESS_VIDEOS", defaults.compress_videos)?,
            image_quality: parsed(&get, "AGORA_IMAGE_QUALITY", defaults.image_quality)?,
            video_crf: parsed(&get, "AGORA_VIDEO_CRF", defaults.video_crf)?,
            ffmpeg: get("AGORA_FFMPEG").unwrap_or(defaults.ffmpeg),
            video_timeout: Duration::from_secs(parsed(
                &get,
                "AGORA_VIDEO_TIMEOUT_SECS",
                defaults.video_timeout.as_secs(),
            )?),
        };
        if !(1..=100).contains(&compression.image_quality) {
            bail!("AGORA_IMAGE_QUALITY must be between 1 and 100");
        }

        Ok(Self {
            host: get("AGORA_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&get, "AGORA_PORT", 8000)?,
            db_path: get("AGORA_DB_PATH").unwrap_or_else(|| "agora.db".into()).into(),
            jwt_secret,
            token_days: parsed(&get, "AGORA_TOKEN_DAYS", 7)?,
            staff_emails: get("AGORA_STAFF_EMAILS")
                .map(|list| {
                    list.split(',')
                        .map(|e| e.trim().to_lowercase())
                        .filter(|e| !e.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            media_dir: get("AGORA_MEDIA_DIR").unwrap_or_else(|| "./media".into()).into(),
            media_url: get("AGORA_MEDIA_URL").unwrap_or_else(|| "/media/".into()),
            frontend_url: get("AGORA_FRONTEND_URL").unwrap_or_else(|| "http://localhost:3000".into()),
            compression,
        })
    }
}

fn parsed<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw.parse().with_context(|| format!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[("AGORA_JWT_SECRET", "a-real-secret-value")]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.token_days, 7);
        assert_eq!(config.media_url, "/media/");
        assert!(config.staff_emails.is_empty());
        assert_eq!(config.compression.image_quality, 85);
        assert_eq!(config.compression.video_timeout, Duration::from_secs(300));
    }

    #[test]
    fn placeholder_secret_is_rejected() {
        assert!(config(&[]).is_err());
        assert!(config(&[("AGORA_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn invalid_numbers_abort() {
        let err = config(&[("AGORA_JWT_SECRET", "a-real-secret-value"), ("AGORA_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("AGORA_PORT"));
    }

    #[test]
    fn staff_emails_are_normalised() {
        let config = config(&[
            ("AGORA_JWT_SECRET", "a-real-secret-value"),
            ("AGORA_STAFF_EMAILS", " Desk@Agora.test, ,ops@agora.test"),
            ("AGORA_COMPRESS_VIDEOS", "false"),
        ])
        .unwrap();
        assert_eq!(config.staff_emails, vec!["desk@agora.test", "ops@agora.test"]);
        assert!(!config.compression.compress_videos);
    }
}
