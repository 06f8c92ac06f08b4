//! Audio validation and storyboard duration rewrite.
//!
//! A storyboard may carry a results table under a `## 音频生成清单` heading:
//!
//! ```text
//! | 幕号 | 文件名 | 读白文本 | 时长 | 说话人 | 情感 |
//! |------|--------|----------|------|--------|------|
//! | 1 | audio_001_开场.mp3 | 大家好 | 8 | xiaoxiao | 热情 |
//! ```
//!
//! Validation probes every listed file, classifies problems, writes a
//! manifest into the audio directory, and patches only the duration cells of
//! rows whose clip was measured. Every other byte of the document is kept.

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::probe::DurationProbe;
use crate::scene::round_secs;
use crate::timeline::{Manifest, ManifestEntry, write_atomic, write_json};
use std::fmt;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

const DURATION_CELL: usize = 3;

/// One row of the results table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    /// 0-based line index in the document.
    pub line: usize,
    pub scene: u32,
    pub file: String,
    pub text: String,
    pub duration: Option<f64>,
    pub speaker: String,
    pub emotion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    MissingAudioFile { scene: u32, file: String },
    /// Every probe strategy failed or reported a non-positive length.
    DurationProbeFailure { scene: u32, file: String },
    ShortAudio { scene: u32, file: String, secs: f64 },
}

impl Finding {
    pub fn severity(&self) -> Severity {
        match self {
            Finding::ShortAudio { .. } => Severity::Warning,
            Finding::MissingAudioFile { .. } | Finding::DurationProbeFailure { .. } => {
                Severity::Error
            }
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }

    pub fn scene(&self) -> u32 {
        match self {
            Finding::MissingAudioFile { scene, .. }
            | Finding::DurationProbeFailure { scene, .. }
            | Finding::ShortAudio { scene, .. } => *scene,
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::MissingAudioFile { scene, file } => {
                write!(f, "error: scene {scene} audio file not found: {file}")
            }
            Finding::DurationProbeFailure { scene, file } => {
                write!(f, "error: scene {scene} duration could not be measured: {file}")
            }
            Finding::ShortAudio { scene, file, secs } => {
                write!(f, "warning: scene {scene} audio is very short ({secs:.2}s): {file}")
            }
        }
    }
}

/// A table row after validation. `row.duration` holds the measured value
/// when `measured` is true, otherwise the value the document declared.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRow {
    pub row: TableRow,
    pub measured: bool,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub rows: Vec<ValidatedRow>,
    pub findings: Vec<Finding>,
    pub manifest: Manifest,
    pub manifest_path: PathBuf,
    /// Whether the storyboard was rewritten.
    pub document_updated: bool,
}

impl ValidationReport {
    /// Passing requires zero hard errors; warnings do not block.
    pub fn passed(&self) -> bool {
        !self.findings.iter().any(Finding::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| !f.is_error())
    }

    /// Best-effort total: unknown durations count as zero.
    pub fn total_duration(&self) -> f64 {
        self.manifest.total_duration
    }
}

/// Validate the audio listed in `storyboard`'s results table against
/// `audio_dir`, write the manifest there, and patch the storyboard's
/// duration cells.
///
/// The document is read once and, if anything changed, written once.
pub fn run_validation(
    storyboard: &Path,
    audio_dir: &Path,
    prober: &dyn DurationProbe,
    config: &SyncConfig,
) -> Result<ValidationReport> {
    if !storyboard.is_file() {
        return Err(Error::DocumentMissing(storyboard.to_path_buf()));
    }
    if !audio_dir.is_dir() {
        return Err(Error::AudioDirMissing(audio_dir.to_path_buf()));
    }
    let content = fs::read_to_string(storyboard).map_err(|e| Error::io(storyboard, e))?;

    let rows = parse_results_table(&content, config);
    if rows.is_empty() {
        return Err(Error::NoTableRows(config.results_section.clone()));
    }
    check_row_order(&rows)?;
    info!(rows = rows.len(), "found results table entries");

    let (validated, findings) = validate_rows(rows, audio_dir, prober, config);

    // Every problem is reported before any artifact is touched.
    for finding in &findings {
        match finding.severity() {
            Severity::Error => error!("{finding}"),
            Severity::Warning => warn!("{finding}"),
        }
    }

    let manifest = manifest_for(&validated, config);
    let manifest_path = audio_dir.join(&config.manifest_file);
    write_json(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote manifest");

    let rewritten = rewrite_document(&content, &validated, config);
    let document_updated = rewritten != content;
    if document_updated {
        write_atomic(storyboard, rewritten.as_bytes())?;
        info!(path = %storyboard.display(), "updated duration column");
    }

    Ok(ValidationReport {
        rows: validated,
        findings,
        manifest,
        manifest_path,
        document_updated,
    })
}

/// Rows are matched to the document by position, so scene numbers must be
/// unique and ascending.
pub fn check_row_order(rows: &[TableRow]) -> Result<()> {
    for pair in rows.windows(2) {
        if pair[1].scene <= pair[0].scene {
            return Err(Error::TableOrder {
                previous: pair[0].scene,
                scene: pair[1].scene,
            });
        }
    }
    Ok(())
}

/// Probe every row's file and substitute measured durations.
pub fn validate_rows(
    rows: Vec<TableRow>,
    audio_dir: &Path,
    prober: &dyn DurationProbe,
    config: &SyncConfig,
) -> (Vec<ValidatedRow>, Vec<Finding>) {
    let mut validated = Vec::with_capacity(rows.len());
    let mut findings = Vec::new();

    for mut row in rows {
        let path = audio_dir.join(&row.file);
        if !path.is_file() {
            findings.push(Finding::MissingAudioFile {
                scene: row.scene,
                file: row.file.clone(),
            });
            validated.push(ValidatedRow { row, measured: false });
            continue;
        }

        // Zero at the recorded precision counts as unmeasured.
        let measured = prober
            .probe(&path)
            .filter(|s| s.is_finite())
            .map(round_secs)
            .filter(|s| *s > 0.0);
        let Some(secs) = measured else {
            findings.push(Finding::DurationProbeFailure {
                scene: row.scene,
                file: row.file.clone(),
            });
            validated.push(ValidatedRow { row, measured: false });
            continue;
        };

        if secs < config.short_audio_secs {
            findings.push(Finding::ShortAudio {
                scene: row.scene,
                file: row.file.clone(),
                secs,
            });
        }
        info!(scene = row.scene, file = %row.file, "measured {secs:.2}s");
        row.duration = Some(secs);
        validated.push(ValidatedRow { row, measured: true });
    }

    (validated, findings)
}

fn manifest_for(rows: &[ValidatedRow], config: &SyncConfig) -> Manifest {
    let entries = rows
        .iter()
        .map(|v| ManifestEntry {
            scene: v.row.scene,
            file: v.row.file.clone(),
            text: v.row.text.clone(),
            duration: v.row.duration,
        })
        .collect();

    // A table narrated by one speaker records that speaker.
    let first = rows.first().map(|v| v.row.speaker.as_str());
    let voice = match first {
        Some(s) if rows.iter().all(|v| v.row.speaker == s) => s,
        _ => config.voice.short_name(),
    };
    Manifest::from_entries(entries, voice)
}

// ── Table parsing ───────────────────────────────────────────────────────────

/// Extract the rows of the results table, in document order.
pub fn parse_results_table(content: &str, config: &SyncConfig) -> Vec<TableRow> {
    section_rows(content, config)
        .into_iter()
        .filter_map(|(idx, line)| parse_row(idx, line, config))
        .collect()
}

/// Lines inside the results section, with their indices and without line
/// endings. The section runs from its heading to the next heading.
fn section_rows<'c>(content: &'c str, config: &SyncConfig) -> Vec<(usize, &'c str)> {
    let mut in_section = false;
    let mut out = Vec::new();
    for (idx, raw) in content.split_inclusive('\n').enumerate() {
        let (line, _) = split_line_ending(raw);
        if line.trim_start().starts_with('#') {
            in_section = line.contains(config.results_section.as_str());
            continue;
        }
        if in_section {
            out.push((idx, line));
        }
    }
    out
}

fn parse_row(line_idx: usize, line: &str, config: &SyncConfig) -> Option<TableRow> {
    if !line.contains('|') {
        return None;
    }
    let spans = cell_spans(line);
    let cell = |i: usize| spans.get(i).map(|r| line[r.clone()].trim()).unwrap_or("");

    let number = cell(0);
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let scene = number.parse().ok()?;
    let file = cell(1);
    if file.is_empty() {
        return None;
    }
    let or_default = |value: &str, default: &str| {
        if value.is_empty() {
            default.to_string()
        } else {
            value.to_string()
        }
    };

    Some(TableRow {
        line: line_idx,
        scene,
        file: file.to_string(),
        text: unquote(cell(2)).replace("\\|", "|"),
        duration: parse_duration_cell(cell(DURATION_CELL)),
        speaker: or_default(cell(4), &config.default_speaker),
        emotion: or_default(cell(5), &config.default_emotion),
    })
}

/// Byte ranges of each cell, excluding the outer pipes. An escaped `\\|`
/// is cell content, not a separator.
fn cell_spans(line: &str) -> Vec<Range<usize>> {
    let start = line.len() - line.trim_start().len();
    let end = line.trim_end().len();
    let mut separators: Vec<usize> = separator_offsets(&line[start..end])
        .into_iter()
        .map(|offset| start + offset)
        .collect();

    let mut first = start;
    let mut last = end;
    if separators.first() == Some(&start) {
        separators.remove(0);
        first = start + 1;
    }
    if end > first && separators.last() == Some(&(end - 1)) {
        separators.pop();
        last = end - 1;
    }

    let mut spans = Vec::with_capacity(separators.len() + 1);
    let mut cell_start = first;
    for sep in separators {
        spans.push(cell_start..sep);
        cell_start = sep + 1;
    }
    spans.push(cell_start..last);
    spans
}

/// Offsets of unescaped `|` characters.
fn separator_offsets(body: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut escaped = false;
    for (offset, c) in body.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '|' {
            offsets.push(offset);
        }
    }
    offsets
}

/// Accepts `8`, `8s`, `8.5`, `8.5s` and `8秒`.
pub fn parse_duration_cell(cell: &str) -> Option<f64> {
    let value = cell.trim();
    let value = value
        .strip_suffix('秒')
        .or_else(|| value.strip_suffix('s'))
        .unwrap_or(value)
        .trim();
    value.parse::<f64>().ok().filter(|d| d.is_finite())
}

fn unquote(s: &str) -> &str {
    for (open, close) in [('"', '"'), ('“', '”')] {
        if let Some(inner) = s.strip_prefix(open).and_then(|r| r.strip_suffix(close)) {
            return inner;
        }
    }
    s
}

fn split_line_ending(raw: &str) -> (&str, &str) {
    let body = raw.strip_suffix('\n').unwrap_or(raw);
    let body = body.strip_suffix('\r').unwrap_or(body);
    (body, &raw[body.len()..])
}

// ── Positional rewrite ──────────────────────────────────────────────────────

/// Patch the duration cells of measured rows.
///
/// Rows are matched positionally: each table row in the results section
/// whose leading number equals the scene of the next expected entry consumes
/// that entry. Only measured entries change their row, and only the duration
/// cell changes. Every other line is emitted byte-for-byte.
pub fn rewrite_document(content: &str, rows: &[ValidatedRow], config: &SyncConfig) -> String {
    let mut out = String::with_capacity(content.len() + rows.len() * 4);
    let mut cursor = 0;
    let mut in_section = false;

    for (idx, raw) in content.split_inclusive('\n').enumerate() {
        let (line, ending) = split_line_ending(raw);
        if line.trim_start().starts_with('#') {
            in_section = line.contains(config.results_section.as_str());
            out.push_str(raw);
            continue;
        }

        let expected = rows.get(cursor);
        let parsed = if in_section {
            parse_row(idx, line, config)
        } else {
            None
        };
        match (parsed, expected) {
            (Some(row), Some(entry)) if row.scene == entry.row.scene => {
                cursor += 1;
                match entry.row.duration.filter(|_| entry.measured) {
                    Some(secs) => {
                        out.push_str(&patch_duration_cell(line, &format_duration_cell(secs)));
                        out.push_str(ending);
                    }
                    None => out.push_str(raw),
                }
            }
            _ => out.push_str(raw),
        }
    }
    out
}

/// One decimal, or two when one would read as zero.
pub fn format_duration_cell(secs: f64) -> String {
    let short = format!("{secs:.1}");
    if short == "0.0" {
        format!("{secs:.2}")
    } else {
        short
    }
}

/// Replace the content of the duration cell, keeping its padding. A row
/// that stops after the text cell gets a duration cell appended.
fn patch_duration_cell(line: &str, value: &str) -> String {
    let spans = cell_spans(line);
    if let Some(span) = spans.get(DURATION_CELL) {
        let raw = &line[span.clone()];
        let replacement = if raw.trim().is_empty() {
            if raw.len() >= 2 {
                format!(" {value} ")
            } else {
                value.to_string()
            }
        } else {
            let lead = raw.len() - raw.trim_start().len();
            let trail = raw.len() - raw.trim_end().len();
            format!("{}{}{}", &raw[..lead], value, &raw[raw.len() - trail..])
        };
        return format!("{}{}{}", &line[..span.start], replacement, &line[span.end..]);
    }

    match spans.get(DURATION_CELL - 1) {
        Some(text_span) => {
            let pad = if line[text_span.clone()].starts_with(' ') {
                " "
            } else {
                ""
            };
            format!(
                "{}|{pad}{value}{pad}{}",
                &line[..text_span.end],
                &line[text_span.end..]
            )
        }
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::tests::write_wav;
    use crate::probe::{ContainerMetadata, ProbeChain, WavFrameCount};
    use std::collections::HashMap;

    struct ByName(HashMap<&'static str, f64>);

    impl DurationProbe for ByName {
        fn name(&self) -> &'static str {
            "by-name"
        }
        fn probe(&self, path: &Path) -> Option<f64> {
            let name = path.file_name()?.to_str()?;
            self.0.get(name).copied()
        }
    }

    const DOC: &str = "\
# 分镜

### 第一幕：开场（5秒）
**读白**：大家好

## 音频生成清单

| 幕号 | 文件名 | 读白文本 | 时长 | 说话人 | 情感 |
|------|--------|----------|------|--------|------|
| 1 | a.wav | \"大家好\" | 5 | yunyang | 热情 |
| 2 | b.wav | 再见 |  |  |  |

## 备注
| 9 | z.wav | 不是清单 | 1 |
";

    fn config() -> SyncConfig {
        SyncConfig::default()
    }

    #[test]
    fn parses_rows_inside_section_only() {
        let rows = parse_results_table(DOC, &config());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].scene, 1);
        assert_eq!(rows[0].file, "a.wav");
        assert_eq!(rows[0].text, "大家好");
        assert_eq!(rows[0].duration, Some(5.0));
        assert_eq!(rows[0].speaker, "yunyang");
        assert_eq!(rows[0].emotion, "热情");
        assert_eq!(rows[0].line, 9);
    }

    #[test]
    fn empty_optional_cells_get_defaults() {
        let rows = parse_results_table(DOC, &config());
        assert_eq!(rows[1].duration, None);
        assert_eq!(rows[1].speaker, "xiaoxiao");
        assert_eq!(rows[1].emotion, "平和");
    }

    #[test]
    fn rows_without_outer_pipes_and_short_rows() {
        let doc = "## 音频生成清单\n1|a.wav|\"hi\"|5||\n2|b.wav\n";
        let rows = parse_results_table(doc, &config());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text, "hi");
        assert_eq!(rows[0].duration, Some(5.0));
        assert_eq!(rows[0].speaker, "xiaoxiao");
        assert_eq!(rows[1].file, "b.wav");
        assert_eq!(rows[1].text, "");
    }

    #[test]
    fn duration_cell_formats() {
        assert_eq!(parse_duration_cell("8"), Some(8.0));
        assert_eq!(parse_duration_cell("8s"), Some(8.0));
        assert_eq!(parse_duration_cell(" 8.5 "), Some(8.5));
        assert_eq!(parse_duration_cell("8.5s"), Some(8.5));
        assert_eq!(parse_duration_cell("8秒"), Some(8.0));
        assert_eq!(parse_duration_cell(""), None);
        assert_eq!(parse_duration_cell("待定"), None);
    }

    #[test]
    fn patch_keeps_cell_padding() {
        assert_eq!(
            patch_duration_cell("| 1 | a.wav | hi | 5 | x | y |", "4.8"),
            "| 1 | a.wav | hi | 4.8 | x | y |"
        );
        assert_eq!(
            patch_duration_cell("1|a.wav|\"hi\"|5||", "4.8"),
            "1|a.wav|\"hi\"|4.8||"
        );
        assert_eq!(
            patch_duration_cell("| 2 | b.wav | bye |  |  |  |", "3.0"),
            "| 2 | b.wav | bye | 3.0 |  |  |"
        );
    }

    #[test]
    fn patch_appends_missing_duration_cell() {
        assert_eq!(
            patch_duration_cell("| 1 | a.wav | hi |", "4.8"),
            "| 1 | a.wav | hi | 4.8 |"
        );
        assert_eq!(patch_duration_cell("1|a.wav|hi", "4.8"), "1|a.wav|hi|4.8");
        assert_eq!(patch_duration_cell("1|a.wav", "4.8"), "1|a.wav");
    }

    #[test]
    fn validate_classifies_findings() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.wav"), b"x").unwrap();
        fs::write(dir.path().join("b.wav"), b"x").unwrap();
        fs::write(dir.path().join("c.wav"), b"x").unwrap();
        let prober = ByName(HashMap::from([("a.wav", 0.6), ("b.wav", 0.0)]));
        let doc = "## 音频生成清单\n1|a.wav|a\n2|b.wav|b\n3|c.wav|c\n4|d.wav|d\n";
        let rows = parse_results_table(doc, &config());
        let (validated, findings) = validate_rows(rows, dir.path(), &prober, &config());

        assert!(validated[0].measured);
        assert_eq!(validated[0].row.duration, Some(0.6));
        assert_eq!(
            findings,
            vec![
                Finding::ShortAudio { scene: 1, file: "a.wav".into(), secs: 0.6 },
                Finding::DurationProbeFailure { scene: 2, file: "b.wav".into() },
                Finding::DurationProbeFailure { scene: 3, file: "c.wav".into() },
                Finding::MissingAudioFile { scene: 4, file: "d.wav".into() },
            ]
        );
        assert_eq!(findings[0].severity(), Severity::Warning);
        assert!(findings[1..].iter().all(Finding::is_error));
    }

    #[test]
    fn escaped_pipe_stays_inside_narration_cell() {
        let doc = "## 音频生成清单\n| 1 | a.wav | a\\|b | 5 | yunxi | 平和 |\n";
        let rows = parse_results_table(doc, &config());
        assert_eq!(rows[0].text, "a|b");
        assert_eq!(rows[0].duration, Some(5.0));
        assert_eq!(rows[0].speaker, "yunxi");

        let validated = vec![ValidatedRow {
            row: TableRow { duration: Some(4.8), ..rows[0].clone() },
            measured: true,
        }];
        let out = rewrite_document(doc, &validated, &config());
        assert_eq!(out, "## 音频生成清单\n| 1 | a.wav | a\\|b | 4.8 | yunxi | 平和 |\n");
    }

    #[test]
    fn trailing_escaped_pipe_is_not_an_outer_pipe() {
        assert_eq!(
            patch_duration_cell("1|a.wav|x|5|y\\|", "2.0"),
            "1|a.wav|x|2.0|y\\|"
        );
    }

    #[test]
    fn clips_that_round_to_zero_are_unmeasured() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.wav"), b"x").unwrap();
        fs::write(dir.path().join("b.wav"), b"x").unwrap();
        let prober = ByName(HashMap::from([("a.wav", 0.004), ("b.wav", 0.04)]));
        let rows = parse_results_table("## 音频生成清单\n1|a.wav|a|5\n2|b.wav|b|5\n", &config());
        let (validated, findings) = validate_rows(rows, dir.path(), &prober, &config());

        assert!(!validated[0].measured);
        assert_eq!(validated[0].row.duration, Some(5.0));
        assert_eq!(
            findings[0],
            Finding::DurationProbeFailure { scene: 1, file: "a.wav".into() }
        );
        assert!(validated[1].measured);
        assert_eq!(validated[1].row.duration, Some(0.04));
        assert!(matches!(findings[1], Finding::ShortAudio { scene: 2, .. }));

        let out = rewrite_document("## 音频生成清单\n2|b.wav|b|5\n", &validated[1..], &config());
        assert_eq!(out, "## 音频生成清单\n2|b.wav|b|0.04\n");
    }

    #[test]
    fn duration_cell_text() {
        assert_eq!(format_duration_cell(4.8), "4.8");
        assert_eq!(format_duration_cell(12.0), "12.0");
        assert_eq!(format_duration_cell(0.04), "0.04");
    }

    #[test]
    fn rewrite_touches_only_measured_duration_cells() {
        let rows = parse_results_table(DOC, &config());
        let validated: Vec<ValidatedRow> = rows
            .into_iter()
            .map(|mut row| {
                let measured = row.scene == 1;
                if measured {
                    row.duration = Some(4.8);
                }
                ValidatedRow { row, measured }
            })
            .collect();
        let out = rewrite_document(DOC, &validated, &config());

        let before: Vec<&str> = DOC.lines().collect();
        let after: Vec<&str> = out.lines().collect();
        assert_eq!(before.len(), after.len());
        for (i, (b, a)) in before.iter().zip(&after).enumerate() {
            if i == 9 {
                assert_eq!(*a, "| 1 | a.wav | \"大家好\" | 4.8 | yunyang | 热情 |");
            } else {
                assert_eq!(b, a, "line {i} changed");
            }
        }
    }

    #[test]
    fn rewrite_preserves_crlf_and_missing_final_newline() {
        let doc = "## 音频生成清单\r\n| 1 | a.wav | hi | 5 |\r\n散文";
        let rows = parse_results_table(doc, &config());
        let validated = vec![ValidatedRow {
            row: TableRow { duration: Some(2.0), ..rows[0].clone() },
            measured: true,
        }];
        let out = rewrite_document(doc, &validated, &config());
        assert_eq!(out, "## 音频生成清单\r\n| 1 | a.wav | hi | 2.0 |\r\n散文");
    }

    #[test]
    fn run_validation_writes_manifest_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("audio");
        fs::create_dir(&audio).unwrap();
        write_wav(&audio.join("a.wav"), 4.8);
        write_wav(&audio.join("b.wav"), 3.25);
        let doc_path = dir.path().join("分镜.md");
        fs::write(&doc_path, DOC).unwrap();
        let chain = ProbeChain::new(vec![Box::new(ContainerMetadata), Box::new(WavFrameCount)]);

        let report = run_validation(&doc_path, &audio, &chain, &config()).unwrap();
        assert!(report.passed());
        assert!(report.document_updated);
        assert_eq!(report.manifest.count, 2);
        assert_eq!(report.manifest.voice, "xiaoxiao");
        assert!((report.total_duration() - 8.05).abs() < 0.02);
        let first = fs::read_to_string(&doc_path).unwrap();
        assert!(first.contains("| 1 | a.wav | \"大家好\" | 4.8 | yunyang | 热情 |"));
        assert!(
            first.contains("| 2 | b.wav | 再见 | 3.2 |  |  |")
                || first.contains("| 2 | b.wav | 再见 | 3.3 |  |  |")
        );
        assert!(first.contains("| 9 | z.wav | 不是清单 | 1 |"));

        let manifest = Manifest::load(&report.manifest_path).unwrap();
        assert_eq!(manifest, report.manifest);

        let again = run_validation(&doc_path, &audio, &chain, &config()).unwrap();
        assert!(!again.document_updated);
        assert_eq!(fs::read_to_string(&doc_path).unwrap(), first);
    }

    #[test]
    fn duplicate_or_descending_rows_are_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let doc =
            "## 音频生成清单\n| 1 | a.wav | x | 5 |\n| 3 | c.wav | x | 5 |\n| 2 | b.wav | x | 5 |\n";
        let doc_path = dir.path().join("分镜.md");
        fs::write(&doc_path, doc).unwrap();
        let chain = ProbeChain::new(vec![Box::new(WavFrameCount)]);

        let err = run_validation(&doc_path, dir.path(), &chain, &config()).unwrap_err();
        assert!(matches!(err, Error::TableOrder { previous: 3, scene: 2 }));
        assert!(!dir.path().join("audio_info.json").exists());
        assert_eq!(fs::read_to_string(&doc_path).unwrap(), doc);

        let dup = parse_results_table("## 音频生成清单\n1|a.wav|x\n1|b.wav|y\n", &config());
        assert!(check_row_order(&dup).is_err());
    }

    #[test]
    fn run_validation_fatal_errors() {
        let dir = tempfile::tempdir().unwrap();
        let chain = ProbeChain::new(vec![Box::new(WavFrameCount)]);
        let doc_path = dir.path().join("分镜.md");

        let err = run_validation(&doc_path, dir.path(), &chain, &config()).unwrap_err();
        assert!(matches!(err, Error::DocumentMissing(_)));

        fs::write(&doc_path, "# 无清单\n").unwrap();
        let err = run_validation(&doc_path, &dir.path().join("nope"), &chain, &config())
            .unwrap_err();
        assert!(matches!(err, Error::AudioDirMissing(_)));

        let err = run_validation(&doc_path, dir.path(), &chain, &config()).unwrap_err();
        assert!(matches!(err, Error::NoTableRows(_)));
    }
}
