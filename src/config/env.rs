use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvKey {
    ServerPort,
    RawBucket,
    ProcessedBucket,
    AccessKey,
    SecretKey,
    Region,
    S3Endpoint,
    PublicBaseUrl,
    LocalRawDir,
    LocalProcessedDir,
    FfmpegBin,
    TargetHeight,
    TranscodeTimeout,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "PORT",
            EnvKey::RawBucket => "RAW_VIDEO_BUCKET",
            EnvKey::ProcessedBucket => "PROCESSED_VIDEO_BUCKET",
            EnvKey::AccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::SecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::Region => "AWS_REGION",
            EnvKey::S3Endpoint => "S3_ENDPOINT",
            EnvKey::PublicBaseUrl => "PUBLIC_BASE_URL",
            EnvKey::LocalRawDir => "LOCAL_RAW_DIR",
            EnvKey::LocalProcessedDir => "LOCAL_PROCESSED_DIR",
            EnvKey::FfmpegBin => "FFMPEG_BIN",
            EnvKey::TargetHeight => "TARGET_HEIGHT",
            EnvKey::TranscodeTimeout => "TRANSCODE_TIMEOUT_SECS",
        }
    }
}

/// Where configuration values come from. The process environment in
/// production, a closure over a map in tests.
pub trait Source {
    fn var(&self, key: &str) -> Option<String>;
}

pub struct ProcessEnv;

impl Source for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl<F> Source for F
where
    F: Fn(&str) -> Option<String>,
{
    fn var(&self, key: &str) -> Option<String> {
        self(key)
    }
}

/// Blank values count as unset.
pub fn get_opt(source: &impl Source, key: EnvKey) -> Option<String> {
    source
        .var(key.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn get(source: &impl Source, key: EnvKey) -> Result<String, ConfigError> {
    get_opt(source, key).ok_or(ConfigError::Missing(key.as_str()))
}

pub fn get_or(source: &impl Source, key: EnvKey, default: &str) -> String {
    get_opt(source, key).unwrap_or_else(|| default.to_string())
}

pub fn get_parsed<T: FromStr>(source: &impl Source, key: EnvKey, default: T) -> Result<T, ConfigError> {
    match get_opt(source, key) {
        Some(val) => val.parse::<T>().map_err(|_| ConfigError::Invalid {
            key: key.as_str(),
            value: val,
        }),
        None => Ok(default),
    }
}

pub fn get_parsed_opt<T: FromStr>(source: &impl Source, key: EnvKey) -> Result<Option<T>, ConfigError> {
    get_opt(source, key)
        .map(|val| {
            val.parse::<T>().map_err(|_| ConfigError::Invalid {
                key: key.as_str(),
                value: val,
            })
        })
        .transpose()
}
