use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::config::env::{self, ConfigError, EnvKey, ProcessEnv, Source};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_TARGET_HEIGHT: u32 = 360;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub storage: StorageConfig,
    pub workspace: WorkspaceConfig,
    pub transcode: TranscodeConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StorageConfig {
    pub raw_bucket: String,
    pub processed_bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub public_base_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WorkspaceConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TranscodeConfig {
    pub ffmpeg_bin: PathBuf,
    pub target_height: u32,
    pub timeout: Option<Duration>,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_source(&ProcessEnv)
    }

    pub fn from_source(source: &impl Source) -> Result<Self, ConfigError> {
        let target_height = env::get_parsed(source, EnvKey::TargetHeight, DEFAULT_TARGET_HEIGHT)?;
        if target_height == 0 {
            return Err(ConfigError::Invalid {
                key: EnvKey::TargetHeight.as_str(),
                value: target_height.to_string(),
            });
        }

        let timeout = env::get_parsed_opt::<u64>(source, EnvKey::TranscodeTimeout)?;
        if timeout == Some(0) {
            return Err(ConfigError::Invalid {
                key: EnvKey::TranscodeTimeout.as_str(),
                value: "0".to_string(),
            });
        }

        Ok(Self {
            server_port: env::get_parsed(source, EnvKey::ServerPort, DEFAULT_PORT)?,
            storage: StorageConfig {
                raw_bucket: env::get(source, EnvKey::RawBucket)?,
                processed_bucket: env::get(source, EnvKey::ProcessedBucket)?,
                access_key: env::get(source, EnvKey::AccessKey)?,
                secret_key: env::get(source, EnvKey::SecretKey)?,
                region: env::get_or(source, EnvKey::Region, "us-east-1"),
                endpoint: env::get_opt(source, EnvKey::S3Endpoint),
                public_base_url: env::get_opt(source, EnvKey::PublicBaseUrl),
            },
            workspace: WorkspaceConfig {
                raw_dir: env::get_or(source, EnvKey::LocalRawDir, "./raw-videos").into(),
                processed_dir: env::get_or(source, EnvKey::LocalProcessedDir, "./processed-videos").into(),
            },
            transcode: TranscodeConfig {
                ffmpeg_bin: env::get_or(source, EnvKey::FfmpegBin, "ffmpeg").into(),
                target_height,
                timeout: timeout.map(Duration::from_secs),
            },
        })
    }
}
