//! Storyboard parser.
//!
//! Recovers ordered [`Scene`] records from a loosely formatted narration
//! document. Scene headers look like
//!
//! ```text
//! ### 第三幕：证明（12秒）
//! ```
//!
//! and are followed by bold-labelled blocks:
//!
//! ```text
//! **读白**："现在我们来证明……"
//! 第二行读白
//! **情感**：平和/坚定
//! ```
//!
//! Parsing is a pure fold over lines. The fold carries an explicit
//! [`ParseState`]; each line produces the next state, and finished scenes are
//! pushed as immutable records.

use crate::config::SyncConfig;
use crate::scene::Scene;
use std::fmt;
use tracing::debug;

const SCENE_MARKER: char = '幕';
const ORDINAL_PREFIX: char = '第';
const EXAMPLE_PREFIX: &str = "示例";

/// Non-fatal problems found while parsing. Each one affects a single line or
/// scene; the rest of the document is still parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseIssue {
    /// A heading mentions a scene but does not match the header pattern.
    MalformedHeader { line: usize, text: String },
    /// The ordinal word could not be read; the scene got its position instead.
    UnrecognizedOrdinal { line: usize, assigned: u32 },
    /// A scene number that was already used. The later scene is dropped.
    DuplicateScene { line: usize, scene_number: u32 },
    /// A scene number lower than the one before it. Output is re-sorted.
    OutOfOrder {
        line: usize,
        scene_number: u32,
        previous: u32,
    },
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseIssue::MalformedHeader { line, text } => {
                write!(f, "line {line}: heading does not match scene pattern: {text}")
            }
            ParseIssue::UnrecognizedOrdinal { line, assigned } => {
                write!(f, "line {line}: unrecognized scene ordinal, assigned {assigned}")
            }
            ParseIssue::DuplicateScene { line, scene_number } => {
                write!(f, "line {line}: duplicate scene number {scene_number}, scene skipped")
            }
            ParseIssue::OutOfOrder {
                line,
                scene_number,
                previous,
            } => write!(
                f,
                "line {line}: scene {scene_number} appears after scene {previous}"
            ),
        }
    }
}

/// Result of parsing a storyboard.
#[derive(Debug, Clone, Default)]
pub struct Storyboard {
    /// Scenes with narration, ascending by scene number, numbers unique.
    pub scenes: Vec<Scene>,
    pub issues: Vec<ParseIssue>,
}

impl Storyboard {
    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn scene(&self, scene_number: u32) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.scene_number == scene_number)
    }
}

/// Parse the full text of a storyboard.
pub fn parse_storyboard(text: &str, config: &SyncConfig) -> Storyboard {
    let labels = Labels {
        narration: &config.narration_label,
        emotion: &config.emotion_label,
    };
    text.lines()
        .enumerate()
        .fold(Fold::new(labels), |fold, (idx, line)| fold.step(idx + 1, line))
        .finish()
}

// ── Fold state ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Labels<'a> {
    narration: &'a str,
    emotion: &'a str,
}

#[derive(Debug)]
struct SceneDraft {
    line: usize,
    scene_number: u32,
    title: String,
    declared_duration: Option<f64>,
    narration: Vec<String>,
    emotion: Option<String>,
}

impl SceneDraft {
    fn into_scene(self) -> Option<(usize, Scene)> {
        let narration = self.narration.join(" ").trim().to_string();
        if narration.is_empty() {
            return None;
        }
        Some((
            self.line,
            Scene {
                scene_number: self.scene_number,
                title: self.title,
                narration,
                emotion: self.emotion,
                declared_duration: self.declared_duration,
                measured_duration: None,
            },
        ))
    }
}

#[derive(Debug)]
enum ParseState {
    /// Before the first scene header.
    Seeking,
    /// Inside a narration block of the current scene.
    InNarration(SceneDraft),
    /// Inside the current scene, outside any narration block.
    InOther(SceneDraft),
}

struct Fold<'a> {
    labels: Labels<'a>,
    state: ParseState,
    scenes: Vec<Scene>,
    issues: Vec<ParseIssue>,
}

impl<'a> Fold<'a> {
    fn new(labels: Labels<'a>) -> Self {
        Fold {
            labels,
            state: ParseState::Seeking,
            scenes: Vec::new(),
            issues: Vec::new(),
        }
    }

    fn step(mut self, line_no: usize, line: &str) -> Self {
        let state = std::mem::replace(&mut self.state, ParseState::Seeking);

        if let Some(header) = parse_header(line) {
            if let Some(draft) = into_draft(state) {
                self.flush(draft);
            }
            let scene_number = match header.ordinal {
                Some(n) => n,
                None => {
                    let assigned = self.scenes.len() as u32 + 1;
                    self.issues.push(ParseIssue::UnrecognizedOrdinal {
                        line: line_no,
                        assigned,
                    });
                    assigned
                }
            };
            self.state = ParseState::InOther(SceneDraft {
                line: line_no,
                scene_number,
                title: header.title,
                declared_duration: header.declared_duration,
                narration: Vec::new(),
                emotion: None,
            });
            return self;
        }

        if is_heading(line) && line.contains(SCENE_MARKER) {
            self.issues.push(ParseIssue::MalformedHeader {
                line: line_no,
                text: line.trim().to_string(),
            });
        }

        self.state = match state {
            ParseState::Seeking => ParseState::Seeking,
            ParseState::InNarration(draft) => self.narration_line(draft, line),
            ParseState::InOther(draft) => self.other_line(draft, line),
        };
        self
    }

    fn narration_line(&self, mut draft: SceneDraft, line: &str) -> ParseState {
        // Any heading or a bold label other than narration closes the block.
        let closes = is_heading(line)
            || bold_label(line).is_some_and(|label| !label_matches(label, self.labels.narration));
        if closes {
            return self.other_line(draft, line);
        }
        if find_label(line, self.labels.narration).is_some() {
            if let Some(inline) = inline_content(line, self.labels.narration) {
                draft.narration.push(inline);
            }
            return ParseState::InNarration(draft);
        }
        let trimmed = line.trim();
        if is_narration_text(trimmed) {
            draft.narration.push(trimmed.to_string());
        }
        ParseState::InNarration(draft)
    }

    fn other_line(&self, mut draft: SceneDraft, line: &str) -> ParseState {
        if find_label(line, self.labels.narration).is_some() {
            if let Some(inline) = inline_content(line, self.labels.narration) {
                draft.narration.push(inline);
            }
            return ParseState::InNarration(draft);
        }
        if let Some(rest) = find_label(line, self.labels.emotion) {
            if let Some(emotion) = parse_emotion(rest) {
                draft.emotion = Some(emotion);
            }
        }
        ParseState::InOther(draft)
    }

    fn flush(&mut self, draft: SceneDraft) {
        let number = draft.scene_number;
        let Some((line, scene)) = draft.into_scene() else {
            debug!(scene = number, "dropping scene without narration");
            return;
        };
        if self.scenes.iter().any(|s| s.scene_number == scene.scene_number) {
            self.issues.push(ParseIssue::DuplicateScene {
                line,
                scene_number: scene.scene_number,
            });
            return;
        }
        if let Some(previous) = self.scenes.last().map(|s| s.scene_number) {
            if scene.scene_number < previous {
                self.issues.push(ParseIssue::OutOfOrder {
                    line,
                    scene_number: scene.scene_number,
                    previous,
                });
            }
        }
        self.scenes.push(scene);
    }

    fn finish(mut self) -> Storyboard {
        let state = std::mem::replace(&mut self.state, ParseState::Seeking);
        if let Some(draft) = into_draft(state) {
            self.flush(draft);
        }
        self.scenes.sort_by_key(|s| s.scene_number);
        Storyboard {
            scenes: self.scenes,
            issues: self.issues,
        }
    }
}

fn into_draft(state: ParseState) -> Option<SceneDraft> {
    match state {
        ParseState::Seeking => None,
        ParseState::InNarration(draft) | ParseState::InOther(draft) => Some(draft),
    }
}

// ── Header recognition ──────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
struct Header {
    ordinal: Option<u32>,
    title: String,
    declared_duration: Option<f64>,
}

fn is_heading(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// Match `# … 第<ordinal>幕<sep><title>（<digits>秒）`.
fn parse_header(line: &str) -> Option<Header> {
    if !is_heading(line) {
        return None;
    }
    let body = line.trim().trim_start_matches('#').trim();
    let marker = body.find(SCENE_MARKER)?;
    let after_marker = marker + SCENE_MARKER.len_utf8();

    let open_rel = body[after_marker..].find(['（', '('])?;
    let open = after_marker + open_rel;
    let open_len = body[open..].chars().next()?.len_utf8();
    let close_rel = body[open + open_len..].find(['）', ')'])?;
    let inner = body[open + open_len..open + open_len + close_rel].trim();

    let digits = inner.strip_suffix('秒').or_else(|| inner.strip_suffix('s'))?;
    let declared_duration = digits.trim().parse::<f64>().ok()?;

    let ordinal_text = &body[..marker];
    let ordinal_text = match ordinal_text.rfind(ORDINAL_PREFIX) {
        Some(pos) => &ordinal_text[pos + ORDINAL_PREFIX.len_utf8()..],
        None => ordinal_text,
    };

    let title = body[after_marker..open]
        .trim()
        .trim_start_matches([':', '：', '-', '—'])
        .trim()
        .to_string();

    Some(Header {
        ordinal: parse_ordinal(ordinal_text.trim()),
        title,
        declared_duration: Some(declared_duration),
    })
}

/// Read an ordinal written as CJK numerals (`三`, `十二`, `二十一`) or digits.
fn parse_ordinal(text: &str) -> Option<u32> {
    if text.is_empty() {
        return None;
    }
    if text.chars().all(|c| c.is_ascii_digit()) {
        return text.parse().ok().filter(|n| *n > 0);
    }
    let mut total = 0u32;
    let mut current = 0u32;
    for c in text.chars() {
        match c {
            '十' => {
                total += current.max(1) * 10;
                current = 0;
            }
            '百' => {
                total += current.max(1) * 100;
                current = 0;
            }
            c => current = cjk_digit(c)?,
        }
    }
    Some(total + current).filter(|n| *n > 0)
}

fn cjk_digit(c: char) -> Option<u32> {
    let value = match c {
        '零' | '〇' => 0,
        '一' => 1,
        '二' | '两' => 2,
        '三' => 3,
        '四' => 4,
        '五' => 5,
        '六' => 6,
        '七' => 7,
        '八' => 8,
        '九' => 9,
        _ => return None,
    };
    Some(value)
}

// ── Labels ──────────────────────────────────────────────────────────────────

/// The label of a line that starts with a bold token (`**情感**：…`), after
/// an optional list marker.
fn bold_label(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let trimmed = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .unwrap_or(trimmed)
        .trim_start();
    let inner = trimmed.strip_prefix("**")?;
    let end = inner.find("**")?;
    Some(&inner[..end])
}

fn label_matches(found: &str, label: &str) -> bool {
    found.trim().trim_end_matches([':', '：']).trim() == label
}

/// Locate `**label**`, `**label:**` or `**label：**` anywhere in the line and
/// return the text after it. A colon inside the bold token is kept as the
/// first character of the returned text.
fn find_label<'l>(line: &'l str, label: &str) -> Option<&'l str> {
    let plain = format!("**{label}**");
    if let Some(pos) = line.find(&plain) {
        return Some(&line[pos + plain.len()..]);
    }
    for colon in [':', '：'] {
        let token = format!("**{label}{colon}**");
        if let Some(pos) = line.find(&token) {
            // Point at the colon so inline content is still recognized.
            let colon_at = pos + token.len() - 2 - colon.len_utf8();
            return Some(&line[colon_at..]);
        }
    }
    None
}

/// Content written on the same line as the label, after a colon.
fn inline_content(line: &str, label: &str) -> Option<String> {
    let rest = find_label(line, label)?.trim_start();
    let rest = rest
        .strip_prefix(':')
        .or_else(|| rest.strip_prefix('：'))?
        .trim_start()
        .trim_start_matches("**")
        .trim();
    let content = strip_quotes(rest).trim();
    if is_narration_text(content) {
        Some(content.to_string())
    } else {
        None
    }
}

fn strip_quotes(s: &str) -> &str {
    for (open, close) in [('"', '"'), ('“', '”'), ('「', '」')] {
        if let Some(inner) = s.strip_prefix(open).and_then(|r| r.strip_suffix(close)) {
            return inner;
        }
    }
    s
}

/// Narration lines exclude blank lines, example lines and bare list items.
fn is_narration_text(trimmed: &str) -> bool {
    !trimmed.is_empty() && !trimmed.starts_with('-') && !trimmed.starts_with(EXAMPLE_PREFIX)
}

fn parse_emotion(after_label: &str) -> Option<String> {
    let colon = after_label.find([':', '：'])?;
    let colon_len = after_label[colon..].chars().next()?.len_utf8();
    let value = after_label[colon + colon_len..]
        .trim()
        .trim_start_matches("**")
        .split('/')
        .next()?
        .trim();
    if value.is_empty() || value.starts_with('-') {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Storyboard {
        parse_storyboard(text, &SyncConfig::default())
    }

    const THREE_SCENES: &str = "\
# 三角形内角和 分镜

### 第一幕：开场（8秒）
**画面**：标题淡入
**读白**：\"大家好，今天我们来学习三角形内角和。\"
**情感**：热情/亲切

### 第二幕：画三角形（10秒）

**读白**：
先画一个三角形，
标出三个顶点。

**情感**：平和

### 第三幕：总结（5秒）
**情感**：坚定
**读白**：所以三角形内角和是一百八十度。
";

    #[test]
    fn parses_scenes_in_order() {
        let board = parse(THREE_SCENES);
        let numbers: Vec<u32> = board.scenes.iter().map(|s| s.scene_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(board.issues.is_empty(), "{:?}", board.issues);
    }

    #[test]
    fn extracts_title_and_declared_duration() {
        let board = parse(THREE_SCENES);
        let first = &board.scenes[0];
        assert_eq!(first.title, "开场");
        assert_eq!(first.declared_duration, Some(8.0));
        assert_eq!(board.scenes[1].title, "画三角形");
        assert_eq!(board.scenes[1].declared_duration, Some(10.0));
    }

    #[test]
    fn inline_narration_is_unquoted() {
        let board = parse(THREE_SCENES);
        assert_eq!(board.scenes[0].narration, "大家好，今天我们来学习三角形内角和。");
    }

    #[test]
    fn multiline_narration_joined_with_spaces() {
        let board = parse(THREE_SCENES);
        assert_eq!(board.scenes[1].narration, "先画一个三角形， 标出三个顶点。");
    }

    #[test]
    fn emotion_keeps_first_segment() {
        let board = parse(THREE_SCENES);
        assert_eq!(board.scenes[0].emotion.as_deref(), Some("热情"));
        assert_eq!(board.scenes[1].emotion.as_deref(), Some("平和"));
    }

    #[test]
    fn emotion_before_narration_is_kept() {
        let board = parse(THREE_SCENES);
        let last = &board.scenes[2];
        assert_eq!(last.emotion.as_deref(), Some("坚定"));
        assert_eq!(last.narration, "所以三角形内角和是一百八十度。");
    }

    #[test]
    fn label_right_after_narration_ends_block_and_is_read() {
        let text = "### 第一幕：开场（3秒）\n**读白**：你好\n**情感**：欢快\n";
        let board = parse(text);
        assert_eq!(board.scenes[0].narration, "你好");
        assert_eq!(board.scenes[0].emotion.as_deref(), Some("欢快"));
    }

    #[test]
    fn half_width_colon_is_accepted() {
        let text = "### 第一幕: 开场(4秒)\n**读白**: 你好世界\n";
        let board = parse(text);
        assert_eq!(board.scenes.len(), 1);
        assert_eq!(board.scenes[0].title, "开场");
        assert_eq!(board.scenes[0].narration, "你好世界");
    }

    #[test]
    fn colon_inside_bold_label() {
        let text = "### 第一幕：开场（4秒）\n**读白：**欢迎收看\n";
        let board = parse(text);
        assert_eq!(board.scenes[0].narration, "欢迎收看");
    }

    #[test]
    fn scene_with_blank_narration_is_excluded() {
        let text = "\
### 第一幕：空白（3秒）
**读白**：

**情感**：平和
### 第二幕：有内容（4秒）
**读白**：有内容
";
        let board = parse(text);
        assert_eq!(board.scenes.len(), 1);
        assert_eq!(board.scenes[0].scene_number, 2);
    }

    #[test]
    fn examples_and_list_markers_are_skipped() {
        let text = "\
### 第一幕：开场（3秒）
**读白**：示例：这里写读白
- 提示：语速放慢
真正的读白
";
        let board = parse(text);
        assert_eq!(board.scenes[0].narration, "真正的读白");
    }

    #[test]
    fn unrecognized_ordinal_uses_position() {
        let text = "\
### 第一幕：开场（3秒）
**读白**：一
### 第X幕：神秘（3秒）
**读白**：二
";
        let board = parse(text);
        assert_eq!(board.scenes[1].scene_number, 2);
        assert_eq!(
            board.issues,
            vec![ParseIssue::UnrecognizedOrdinal { line: 3, assigned: 2 }]
        );
    }

    #[test]
    fn duplicate_scene_number_is_reported_not_merged() {
        let text = "\
### 第一幕：开场（3秒）
**读白**：第一次
### 第一幕：重复（3秒）
**读白**：第二次
";
        let board = parse(text);
        assert_eq!(board.scenes.len(), 1);
        assert_eq!(board.scenes[0].narration, "第一次");
        assert_eq!(
            board.issues,
            vec![ParseIssue::DuplicateScene { line: 3, scene_number: 1 }]
        );
    }

    #[test]
    fn out_of_order_scenes_are_sorted_and_reported() {
        let text = "\
### 第二幕：后（3秒）
**读白**：二
### 第一幕：前（3秒）
**读白**：一
";
        let board = parse(text);
        let numbers: Vec<u32> = board.scenes.iter().map(|s| s.scene_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert!(matches!(
            board.issues[0],
            ParseIssue::OutOfOrder { scene_number: 1, previous: 2, .. }
        ));
    }

    #[test]
    fn malformed_scene_heading_is_flagged() {
        let text = "## 第一幕说明\n### 第一幕：开场（3秒）\n**读白**：你好\n";
        let board = parse(text);
        assert_eq!(board.scenes.len(), 1);
        assert!(matches!(board.issues[0], ParseIssue::MalformedHeader { line: 1, .. }));
    }

    #[test]
    fn other_headings_end_narration() {
        let text = "\
### 第一幕：开场（3秒）
**读白**：你好
## 音频生成清单
| 幕号 | 文件名 |
";
        let board = parse(text);
        assert_eq!(board.scenes[0].narration, "你好");
    }

    #[test]
    fn cjk_numerals() {
        assert_eq!(parse_ordinal("三"), Some(3));
        assert_eq!(parse_ordinal("十"), Some(10));
        assert_eq!(parse_ordinal("十二"), Some(12));
        assert_eq!(parse_ordinal("二十"), Some(20));
        assert_eq!(parse_ordinal("二十三"), Some(23));
        assert_eq!(parse_ordinal("一百零五"), Some(105));
        assert_eq!(parse_ordinal("7"), Some(7));
        assert_eq!(parse_ordinal("X"), None);
        assert_eq!(parse_ordinal(""), None);
        assert_eq!(parse_ordinal("零"), None);
    }

    #[test]
    fn header_requires_duration_hint() {
        assert!(parse_header("### 第一幕：开场").is_none());
        assert!(parse_header("### 第一幕：开场（很久）").is_none());
        assert!(parse_header("第一幕：开场（3秒）").is_none());
        let header = parse_header("### 第十二幕 - 回顾（7.5秒）").unwrap();
        assert_eq!(header.ordinal, Some(12));
        assert_eq!(header.title, "回顾");
        assert_eq!(header.declared_duration, Some(7.5));
    }
}
