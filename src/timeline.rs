//! Manifest and timeline artifacts.
//!
//! The manifest is the durable record kept next to the audio files. The
//! timeline is the renderer's lightweight read path. They are always written
//! as two separate files.

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::scene::{Scene, round_secs};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub scene: u32,
    pub file: String,
    pub text: String,
    /// Measured seconds; `null` when the clip could not be measured.
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub files: Vec<ManifestEntry>,
    /// Sum of known durations. Unknown ones contribute nothing.
    pub total_duration: f64,
    pub count: usize,
    pub voice: String,
}

impl Manifest {
    /// Durations are rounded to two decimals per entry; the total is the
    /// sum of the rounded values.
    pub fn from_entries(mut files: Vec<ManifestEntry>, voice: &str) -> Self {
        for file in &mut files {
            file.duration = file.duration.map(round_secs);
        }
        let total_duration = files.iter().filter_map(|f| f.duration).sum();
        Manifest {
            count: files.len(),
            files,
            total_duration,
            voice: voice.to_string(),
        }
    }

    /// Scene numbers whose duration is unknown.
    pub fn unmeasured(&self) -> Vec<u32> {
        self.files
            .iter()
            .filter(|f| f.duration.is_none())
            .map(|f| f.scene)
            .collect()
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// 1-based position among all scenes handed to the builder. Scenes
    /// without a duration leave a gap so later positions do not shift.
    pub index: usize,
    pub scene_num: u32,
    pub title: String,
    pub duration: f64,
    pub audio_file: String,
    /// Narration preview, truncated with `...`.
    pub voiceover: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub total_duration: f64,
    pub scenes: Vec<TimelineEntry>,
}

impl Timeline {
    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }

    pub fn entry(&self, index: usize) -> Option<&TimelineEntry> {
        self.scenes.iter().find(|e| e.index == index)
    }
}

/// Output of [`build_timeline`].
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineBuild {
    pub manifest: Manifest,
    pub timeline: Timeline,
    /// Scenes without a measured duration. They are listed in the manifest
    /// with a `null` duration, left out of every total and of the timeline.
    pub unmeasured: Vec<u32>,
}

/// Build the manifest and timeline from synthesized scenes.
///
/// Scenes are ordered by scene number whatever order they arrive in.
pub fn build_timeline(scenes: &[Scene], voice: &str, config: &SyncConfig) -> TimelineBuild {
    let mut ordered: Vec<&Scene> = scenes.iter().collect();
    ordered.sort_by_key(|s| s.scene_number);

    let files = ordered
        .iter()
        .map(|s| ManifestEntry {
            scene: s.scene_number,
            file: s.audio_file_name(&config.audio_extension),
            text: s.narration.clone(),
            duration: s.measured_duration,
        })
        .collect();
    let manifest = Manifest::from_entries(files, voice);

    let entries: Vec<TimelineEntry> = ordered
        .iter()
        .enumerate()
        .filter_map(|(i, s)| {
            let duration = round_secs(s.measured_duration?);
            Some(TimelineEntry {
                index: i + 1,
                scene_num: s.scene_number,
                title: s.title.clone(),
                duration,
                audio_file: s.audio_file_name(&config.audio_extension),
                voiceover: preview(&s.narration, config.preview_chars),
            })
        })
        .collect();
    let timeline = Timeline {
        total_duration: entries.iter().map(|e| e.duration).sum(),
        scenes: entries,
    };

    TimelineBuild {
        unmeasured: manifest.unmeasured(),
        manifest,
        timeline,
    }
}

/// Truncate to `max_chars` characters, appending `...` only when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

/// Paths of the two artifacts written by [`write_artifacts`].
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub manifest: PathBuf,
    pub timeline: PathBuf,
}

/// Write the manifest and the timeline into `dir` as two independent files.
pub fn write_artifacts(
    dir: &Path,
    build: &TimelineBuild,
    config: &SyncConfig,
) -> Result<ArtifactPaths> {
    let paths = ArtifactPaths {
        manifest: dir.join(&config.manifest_file),
        timeline: dir.join(&config.timeline_file),
    };
    write_json(&paths.manifest, &build.manifest)?;
    write_json(&paths.timeline, &build.timeline)?;
    Ok(paths)
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| Error::json(path, e))?;
    write_atomic(path, json.as_bytes())
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_str(&data).map_err(|e| Error::json(path, e))
}

/// Replace `path` with `contents` in one step: write a temporary file in the
/// same directory, then rename it over the target. An existing target keeps
/// its permissions.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    if let Ok(meta) = fs::metadata(path) {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .map_err(|e| Error::io(path, e))?;
    }
    tmp.write_all(contents).map_err(|e| Error::io(path, e))?;
    tmp.as_file().sync_all().map_err(|e| Error::io(path, e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}
