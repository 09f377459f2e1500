use std::path::Path;
use std::process::Stdio;

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::process::Command;

/// Measures the playable length of a media file.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn probe_seconds(&self, path: &Path) -> anyhow::Result<f64>;
}

#[derive(Debug, Clone)]
pub struct FfprobeConfig {
    pub bin: String,
}

impl FfprobeConfig {
    pub fn from_env() -> Self {
        let bin = std::env::var("STORYBOOK_FFPROBE_BIN").unwrap_or_else(|_| "ffprobe".to_owned());
        Self { bin }
    }
}

/// Runs `ffprobe` and reads the container duration from stdout.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    config: FfprobeConfig,
}

impl FfprobeProbe {
    pub fn new(config: FfprobeConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(FfprobeConfig::from_env())
    }
}

#[async_trait]
impl DurationProbe for FfprobeProbe {
    async fn probe_seconds(&self, path: &Path) -> anyhow::Result<f64> {
        tracing::debug!(bin = %self.config.bin, path = %path.display(), "ffprobe");

        let output = Command::new(&self.config.bin)
            .args([
                "-v",
                "quiet",
                "-show_entries",
                "format=duration",
                "-of",
                "csv=p=0",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
            .with_context(|| format!("spawn duration probe: {}", self.config.bin))?;
        if !output.status.success() {
            anyhow::bail!("duration probe failed ({})", output.status);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_seconds(&stdout)
    }
}

/// A plain decimal seconds value, as printed by the probe.
pub fn parse_seconds(raw: &str) -> anyhow::Result<f64> {
    let trimmed = raw.trim();
    let seconds: f64 = trimmed
        .parse()
        .with_context(|| format!("parse probe output as seconds: {trimmed:?}"))?;
    if !seconds.is_finite() || seconds < 0.0 {
        anyhow::bail!("probe reported an invalid duration: {trimmed}");
    }
    Ok(seconds)
}
