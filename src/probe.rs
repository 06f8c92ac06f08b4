//! Audio duration probing.
//!
//! Synthesis backends are not reliable about containers: an `.mp3` may hold
//! WAV data and headers may be partial. Duration is therefore measured by an
//! ordered chain of strategies. The first strategy that yields a positive
//! duration wins; every failure is swallowed and the next one is tried.

use crate::config::SyncConfig;
use lofty::file::AudioFile;
use lofty::probe::Probe;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::debug;

/// One way of measuring an audio file's playback length.
pub trait DurationProbe: Send + Sync {
    fn name(&self) -> &'static str;

    /// Seconds of audio, or `None` when this strategy cannot tell.
    fn probe(&self, path: &Path) -> Option<f64>;
}

/// Container-aware metadata reader. The container is sniffed from the file
/// content, not the extension, and read with the matching lofty parser.
pub struct ContainerMetadata;

impl DurationProbe for ContainerMetadata {
    fn name(&self) -> &'static str {
        "container-metadata"
    }

    fn probe(&self, path: &Path) -> Option<f64> {
        let probe = Probe::open(path).ok()?.guess_file_type().ok()?;
        let file_type = probe.file_type();
        match probe.read() {
            Ok(tagged) => positive_secs(tagged.properties().duration()),
            Err(e) => {
                debug!(path = %path.display(), ?file_type, "metadata read failed: {e}");
                None
            }
        }
    }
}

/// Frame count divided by sample rate, for uncompressed RIFF/WAVE files.
pub struct WavFrameCount;

impl DurationProbe for WavFrameCount {
    fn name(&self) -> &'static str {
        "wav-frame-count"
    }

    fn probe(&self, path: &Path) -> Option<f64> {
        let reader = hound::WavReader::open(path).ok()?;
        let rate = reader.spec().sample_rate;
        if rate == 0 {
            return None;
        }
        positive(reader.duration() as f64 / rate as f64)
    }
}

/// Shell out to `ffprobe` and read `format=duration`.
pub struct ExternalProbe {
    program: String,
}

impl ExternalProbe {
    pub fn new(program: impl Into<String>) -> Self {
        ExternalProbe {
            program: program.into(),
        }
    }
}

impl DurationProbe for ExternalProbe {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    fn probe(&self, path: &Path) -> Option<f64> {
        let output = Command::new(&self.program)
            .args(build_ffprobe_args(path))
            .stdin(Stdio::null())
            .output();
        match output {
            Ok(out) if out.status.success() => {
                parse_ffprobe_duration(&String::from_utf8_lossy(&out.stdout))
            }
            Ok(out) => {
                debug!(
                    program = %self.program,
                    status = %out.status,
                    "ffprobe failed: {}",
                    String::from_utf8_lossy(&out.stderr).trim()
                );
                None
            }
            Err(e) => {
                debug!(program = %self.program, "failed to launch: {e}");
                None
            }
        }
    }
}

/// `ffprobe` arguments printing only the container duration.
pub fn build_ffprobe_args(path: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        "format=duration".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        path.to_string_lossy().to_string(),
    ]
}

/// Parse the bare number `ffprobe` prints. `N/A` and garbage yield `None`.
pub fn parse_ffprobe_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse::<f64>().ok())
        .and_then(positive)
}

/// Ordered chain of strategies; the first positive result short-circuits.
pub struct ProbeChain {
    strategies: Vec<Box<dyn DurationProbe>>,
}

impl ProbeChain {
    pub fn new(strategies: Vec<Box<dyn DurationProbe>>) -> Self {
        ProbeChain { strategies }
    }

    /// Metadata reader, then WAV frame count, then `ffprobe`.
    pub fn standard(config: &SyncConfig) -> Self {
        ProbeChain::new(vec![
            Box::new(ContainerMetadata),
            Box::new(WavFrameCount),
            Box::new(ExternalProbe::new(config.ffprobe_bin.clone())),
        ])
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

impl DurationProbe for ProbeChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn probe(&self, path: &Path) -> Option<f64> {
        for strategy in &self.strategies {
            match strategy.probe(path).and_then(positive) {
                Some(secs) => {
                    debug!(path = %path.display(), strategy = strategy.name(), secs, "probed");
                    return Some(secs);
                }
                None => debug!(path = %path.display(), strategy = strategy.name(), "no duration"),
            }
        }
        None
    }
}

fn positive(secs: f64) -> Option<f64> {
    (secs.is_finite() && secs > 0.0).then_some(secs)
}

fn positive_secs(duration: Duration) -> Option<f64> {
    positive(duration.as_secs_f64())
}
