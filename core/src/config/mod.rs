use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tokio::fs;

/// Engine tuning knobs. Every field has a sensible default; the config file
/// is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interval of the post-session status poll, in milliseconds.
    pub status_poll_ms: u64,
    /// Interval of the resize poll fallback, in milliseconds.
    pub resize_poll_ms: u64,
    /// Idle interval of the heartbeat tick, in milliseconds.
    pub idle_tick_ms: u64,
    /// Suppress banners and progress rendering.
    pub quiet: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            status_poll_ms: 200,
            resize_poll_ms: 250,
            idle_tick_ms: 1000,
            quiet: false,
        }
    }
}

impl EngineConfig {
    pub fn status_poll(&self) -> Duration {
        Duration::from_millis(self.status_poll_ms)
    }

    pub fn resize_poll(&self) -> Duration {
        Duration::from_millis(self.resize_poll_ms)
    }

    pub fn idle_tick(&self) -> Duration {
        Duration::from_millis(self.idle_tick_ms)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    engine: EngineConfig,
}

pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig> {
    let content = fs::read_to_string(path).await?;
    let file: ConfigFile = toml::from_str(&content)?;
    Ok(file.engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn loads_partial_config_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\nstatus_poll_ms = 50\nquiet = true").unwrap();
        let config = load_config(file.path()).await.unwrap();
        assert_eq!(config.status_poll(), Duration::from_millis(50));
        assert!(config.quiet);
        assert_eq!(config.resize_poll_ms, 250);
    }

    #[tokio::test]
    async fn empty_file_yields_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = load_config(file.path()).await.unwrap();
        assert_eq!(config.status_poll_ms, 200);
        assert_eq!(config.idle_tick_ms, 1000);
        assert!(!config.quiet);
    }
}
