//! Media validity probe backed by ffprobe.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::ProbeOutcome;
use crate::config::ProbeConfig;

/// Checks that a downloaded file is readable media.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Whether probing actually runs.
    fn is_available(&self) -> bool;

    async fn probe(&self, path: &Path) -> ProbeOutcome;
}

/// Probe that never runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProbe;

#[async_trait]
impl MediaProbe for NoProbe {
    fn is_available(&self) -> bool {
        false
    }

    async fn probe(&self, _path: &Path) -> ProbeOutcome {
        ProbeOutcome::Skipped
    }
}

/// ffprobe-based probe.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    ffprobe_path: PathBuf,
    available: bool,
}

impl FfprobeProbe {
    /// Check whether the helper can be executed. A missing helper is not an
    /// error; the probe then reports every file as skipped.
    pub async fn detect(config: &ProbeConfig) -> Self {
        let available = if !config.enabled {
            info!("Media probe disabled");
            false
        } else {
            match Command::new(&config.ffprobe_path).arg("-version").output().await {
                Ok(output) if output.status.success() => {
                    info!(path = %config.ffprobe_path.display(), "ffprobe available");
                    true
                }
                Ok(output) => {
                    warn!(
                        path = %config.ffprobe_path.display(),
                        status = %output.status,
                        "ffprobe -version failed, media probe disabled"
                    );
                    false
                }
                Err(e) => {
                    info!(
                        path = %config.ffprobe_path.display(),
                        "ffprobe not found ({}), media probe disabled", e
                    );
                    false
                }
            }
        };

        Self {
            ffprobe_path: config.ffprobe_path.clone(),
            available,
        }
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: Option<String>,
}

/// A file is valid media when ffprobe lists at least one typed stream.
fn parse_probe_output(stdout: &str) -> ProbeOutcome {
    match serde_json::from_str::<ProbeOutput>(stdout) {
        Ok(parsed) if parsed.streams.iter().any(|s| s.codec_type.is_some()) => {
            ProbeOutcome::Valid
        }
        Ok(_) => ProbeOutcome::Invalid("no media streams".to_string()),
        Err(e) => ProbeOutcome::Invalid(format!("unreadable ffprobe output: {}", e)),
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn probe(&self, path: &Path) -> ProbeOutcome {
        if !self.available {
            return ProbeOutcome::Skipped;
        }
        if !path.exists() {
            debug!(path = %path.display(), "File not on disk, skipping probe");
            return ProbeOutcome::Skipped;
        }

        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                parse_probe_output(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => ProbeOutcome::Invalid(format!("ffprobe exited with {}", output.status)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ProbeOutcome::Skipped,
            Err(e) => {
                warn!(path = %path.display(), "ffprobe could not run: {}", e);
                ProbeOutcome::Skipped
            }
        }
    }
}
