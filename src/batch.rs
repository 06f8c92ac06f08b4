//! Batch synthesis from a CSV list of `filename,text` rows.
//!
//! This entry point bypasses the storyboard: every row names an output file
//! and the text to speak. Successful clips land in the manifest; the timeline
//! is not written because rows carry no scene titles.

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::pipeline::SceneFailure;
use crate::probe::DurationProbe;
use crate::scene::round_secs;
use crate::synth::Synthesizer;
use crate::timeline::{Manifest, ManifestEntry, write_json};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Header names accepted for the output file column, in priority order.
pub const FILE_COLUMNS: [&str; 3] = ["filename", "文件名", "file"];
/// Header names accepted for the text column, in priority order.
pub const TEXT_COLUMNS: [&str; 4] = ["text", "对白", "content", "读白"];

/// Characters inspected when choosing between `,` and `;`.
const DELIMITER_SAMPLE_CHARS: usize = 2048;

#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub file: String,
    pub text: String,
}

impl BatchEntry {
    /// First run of ASCII digits in the file name, or 0.
    pub fn scene_number(&self) -> u32 {
        scene_number_from_file(&self.file)
    }
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub requested: usize,
    pub generated: usize,
    pub failures: Vec<SceneFailure>,
    /// Generated files whose duration could not be measured.
    pub unmeasured: Vec<String>,
    pub manifest: Manifest,
    /// `None` when nothing was generated and no manifest was written.
    pub manifest_path: Option<PathBuf>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.unmeasured.is_empty()
    }
}

pub fn scene_number_from_file(file: &str) -> u32 {
    let digits: String = file
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

/// `;` wins only when the head of the input holds more of them than commas.
fn detect_delimiter(input: &str) -> u8 {
    let (mut semicolons, mut commas) = (0usize, 0usize);
    for c in input.chars().take(DELIMITER_SAMPLE_CHARS) {
        match c {
            ';' => semicolons += 1,
            ',' => commas += 1,
            _ => {}
        }
    }
    if semicolons > commas { b';' } else { b',' }
}

fn column_positions(headers: &StringRecord, names: &[&str]) -> Vec<usize> {
    names
        .iter()
        .filter_map(|name| headers.iter().position(|h| h == *name))
        .collect()
}

/// First non-empty cell among `columns`.
fn first_filled(record: &StringRecord, columns: &[usize]) -> Option<String> {
    columns
        .iter()
        .filter_map(|&ix| record.get(ix))
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse a batch list. Rows missing a file name or text are skipped; a file
/// name without a `.wav` or `.mp3` suffix gets the configured extension.
pub fn parse_batch_list(input: &str, config: &SyncConfig) -> Result<Vec<BatchEntry>> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let mut rdr = ReaderBuilder::new()
        .delimiter(detect_delimiter(input))
        .flexible(true)
        .trim(Trim::All)
        .from_reader(input.as_bytes());

    let headers = rdr.headers()?.clone();
    let file_cols = column_positions(&headers, &FILE_COLUMNS);
    let text_cols = column_positions(&headers, &TEXT_COLUMNS);
    if file_cols.is_empty() || text_cols.is_empty() {
        return Err(Error::BatchList(format!(
            "header must name a file column ({}) and a text column ({})",
            FILE_COLUMNS.join("/"),
            TEXT_COLUMNS.join("/")
        )));
    }

    let mut entries = Vec::new();
    for (line, rec) in rdr.records().enumerate() {
        let rec = rec?;
        let (Some(mut file), Some(text)) =
            (first_filled(&rec, &file_cols), first_filled(&rec, &text_cols))
        else {
            warn!(row = line + 1, "batch row without file name or text, skipped");
            continue;
        };
        let lower = file.to_lowercase();
        if !lower.ends_with(".wav") && !lower.ends_with(".mp3") {
            file = format!("{file}.{}", config.audio_extension);
        }
        entries.push(BatchEntry { file, text });
    }
    Ok(entries)
}

pub fn load_batch_list(path: &Path, config: &SyncConfig) -> Result<Vec<BatchEntry>> {
    if !path.is_file() {
        return Err(Error::DocumentMissing(path.to_path_buf()));
    }
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| Error::BatchList(format!("{} is not valid UTF-8", path.display())))?;
    let entries = parse_batch_list(&text, config)?;
    info!(entries = entries.len(), path = %path.display(), "parsed batch list");
    Ok(entries)
}

/// Synthesize and measure every entry into `audio_dir`, then write the
/// manifest of the clips that were produced.
pub fn generate_batch(
    entries: &[BatchEntry],
    audio_dir: &Path,
    synthesizer: &dyn Synthesizer,
    prober: &dyn DurationProbe,
    config: &SyncConfig,
) -> Result<BatchReport> {
    if entries.is_empty() {
        return Err(Error::BatchList("no usable rows".to_string()));
    }
    fs::create_dir_all(audio_dir).map_err(|e| Error::io(audio_dir, e))?;

    let requested = entries.len();
    let mut produced = Vec::new();
    let mut failures = Vec::new();
    let mut unmeasured = Vec::new();

    for (i, entry) in entries.iter().enumerate() {
        let output = audio_dir.join(&entry.file);
        let scene = entry.scene_number();
        info!("[{}/{}] {}", i + 1, requested, entry.file);

        if let Err(e) = synthesizer.synthesize(&entry.text, config.voice, &output) {
            error!(file = %entry.file, "{e}");
            failures.push(SceneFailure {
                scene,
                title: entry.file.clone(),
                reason: e.to_string(),
            });
            continue;
        }

        let measured = prober
            .probe(&output)
            .filter(|s| s.is_finite())
            .map(round_secs)
            .filter(|s| *s > 0.0);
        if measured.is_none() {
            warn!(file = %entry.file, "duration unknown");
            unmeasured.push(entry.file.clone());
        }
        produced.push(ManifestEntry {
            scene,
            file: entry.file.clone(),
            text: entry.text.clone(),
            duration: measured,
        });
    }

    let generated = produced.len();
    let manifest = Manifest::from_entries(produced, config.voice.short_name());
    let manifest_path = if generated > 0 {
        let path = audio_dir.join(&config.manifest_file);
        write_json(&path, &manifest)?;
        Some(path)
    } else {
        None
    };
    info!(
        generated,
        requested,
        total = manifest.total_duration,
        "batch finished"
    );

    Ok(BatchReport {
        requested,
        generated,
        failures,
        unmeasured,
        manifest,
        manifest_path,
    })
}
