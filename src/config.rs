use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::QualityPreset;

/// Daemon configuration, loaded from an optional TOML file.
///
/// Every section has full defaults so the daemon can start without a file;
/// tests override the paths and timing knobs directly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub recording: RecordingConfig,
    pub remote: RemoteConfig,
    pub fallback: FallbackConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture quality preset (sample rate / bit depth, always mono)
    pub preset: QualityPreset,
    /// WAV file streamed as the capture source when no platform source is wired in
    pub input_wav: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Scratch directory for segment files
    pub scratch_dir: PathBuf,
    /// Duration of each segment before rotating files
    pub segment_secs: u64,
    /// Minimum free disk space required to start recording
    pub min_free_mb: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the transcription endpoint (POST {base_url}/audio/transcriptions)
    pub base_url: String,
    /// Model identifier sent with every request
    pub model: String,
    /// Name of the environment variable holding the bearer token.
    /// The token itself never appears in config files or logs.
    pub api_key_env: String,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// On-device recognizer executable
    pub program: String,
    /// Arguments placed before the audio file path
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Remote attempts before falling back to the local recognizer
    pub max_remote_attempts: u32,
    /// Backoff base: the n-th retry waits base * 2^n
    pub backoff_base_ms: u64,
    /// Durable retry ledger location
    pub ledger_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            audio: AudioConfig::default(),
            recording: RecordingConfig::default(),
            remote: RemoteConfig::default(),
            fallback: FallbackConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "segscribe".to_string(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 7071,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            preset: QualityPreset::High,
            input_wav: None,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("segscribe/segments"),
            segment_secs: 30,
            min_free_mb: 200,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/v1".to_string(),
            model: "whisper-1".to_string(),
            api_key_env: "SEGSCRIBE_API_KEY".to_string(),
            connect_timeout_secs: 10,
            timeout_secs: 120,
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            program: "whisper-cli".to_string(),
            args: Vec::new(),
            timeout_secs: 120,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_remote_attempts: 5,
            backoff_base_ms: 1000,
            ledger_path: std::env::temp_dir().join("segscribe/retry-ledger.json"),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

impl RecordingConfig {
    pub fn segment_duration(&self) -> Duration {
        Duration::from_secs(self.segment_secs)
    }
}

impl RetryConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}
