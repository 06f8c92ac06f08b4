//! Generation run: storyboard scenes to audio clips, manifest and timeline.

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::probe::DurationProbe;
use crate::scene::{Scene, round_secs};
use crate::storyboard::{ParseIssue, Storyboard, parse_storyboard};
use crate::synth::Synthesizer;
use crate::timeline::{ArtifactPaths, TimelineBuild, build_timeline, write_artifacts};
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

/// A scene whose audio could not be produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneFailure {
    pub scene: u32,
    pub title: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct GenerationReport {
    /// Scenes the storyboard asked for.
    pub requested: usize,
    /// Scenes whose audio file was written.
    pub generated: usize,
    pub failures: Vec<SceneFailure>,
    /// Generated scenes whose duration could not be measured.
    pub unmeasured: Vec<u32>,
    pub build: TimelineBuild,
    pub artifacts: ArtifactPaths,
    pub issues: Vec<ParseIssue>,
}

impl GenerationReport {
    pub fn total_duration(&self) -> f64 {
        self.build.timeline.total_duration
    }

    /// Every requested scene was generated and measured.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.unmeasured.is_empty()
    }
}

/// Read and parse a storyboard, logging every parse issue.
pub fn load_storyboard(path: &Path, config: &SyncConfig) -> Result<Storyboard> {
    if !path.is_file() {
        return Err(Error::DocumentMissing(path.to_path_buf()));
    }
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let storyboard = parse_storyboard(&text, config);
    for issue in &storyboard.issues {
        warn!("{issue}");
    }
    info!(scenes = storyboard.scenes.len(), path = %path.display(), "parsed storyboard");
    Ok(storyboard)
}

/// Synthesize and measure every scene, then write the manifest and the
/// timeline into `audio_dir`.
///
/// A scene that fails to synthesize is recorded and skipped; the run goes on
/// and artifacts are written for whatever was produced.
pub fn generate(
    storyboard: &Storyboard,
    audio_dir: &Path,
    synthesizer: &dyn Synthesizer,
    prober: &dyn DurationProbe,
    config: &SyncConfig,
) -> Result<GenerationReport> {
    if storyboard.is_empty() {
        return Err(Error::NoScenes);
    }
    fs::create_dir_all(audio_dir).map_err(|e| Error::io(audio_dir, e))?;

    let requested = storyboard.scenes.len();
    // Every scene keeps its slot so timeline positions match the storyboard.
    let mut scenes = Vec::with_capacity(requested);
    let mut failures = Vec::new();

    for (i, scene) in storyboard.scenes.iter().enumerate() {
        let file_name = scene.audio_file_name(&config.audio_extension);
        let output = audio_dir.join(&file_name);
        info!(
            "[{}/{}] scene {} {}",
            i + 1,
            requested,
            scene.scene_number,
            scene.title
        );

        if let Err(e) = synthesizer.synthesize(&scene.narration, config.voice, &output) {
            error!(scene = scene.scene_number, "{e}");
            failures.push(SceneFailure {
                scene: scene.scene_number,
                title: scene.title.clone(),
                reason: e.to_string(),
            });
            scenes.push(scene.clone().with_measured_duration(None));
            continue;
        }

        let measured = prober
            .probe(&output)
            .filter(|s| s.is_finite())
            .map(round_secs)
            .filter(|s| *s > 0.0);
        match measured {
            Some(secs) => info!(scene = scene.scene_number, file = %file_name, "{secs:.2}s"),
            None => warn!(scene = scene.scene_number, file = %file_name, "duration unknown"),
        }
        scenes.push(scene.clone().with_measured_duration(measured));
    }

    let build = build_timeline(&scenes, config.voice.short_name(), config);
    if !build.unmeasured.is_empty() {
        warn!(scenes = ?build.unmeasured, "left out of the timeline: duration unknown");
    }
    let artifacts = write_artifacts(audio_dir, &build, config)?;
    let generated = requested - failures.len();
    info!(
        generated,
        requested,
        total = build.timeline.total_duration,
        "generation finished"
    );

    let unmeasured = build
        .unmeasured
        .iter()
        .copied()
        .filter(|n| !failures.iter().any(|f| f.scene == *n))
        .collect();
    Ok(GenerationReport {
        requested,
        generated,
        failures,
        unmeasured,
        build,
        artifacts,
        issues: storyboard.issues.clone(),
    })
}

/// Scenes in the form the CLI lists before asking for confirmation.
pub fn scene_listing(scenes: &[Scene], preview_chars: usize) -> Vec<String> {
    scenes
        .iter()
        .map(|s| {
            format!(
                "{:>3}. {} ({} chars): {}",
                s.scene_number,
                s.title,
                s.narration.chars().count(),
                crate::timeline::preview(&s.narration, preview_chars)
            )
        })
        .collect()
}
