use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::truncate_chars;
use crate::formats::{MAX_TITLE_CHARS, Section};

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("valid heading regex"));
static EMPHASIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*+").expect("valid emphasis regex"));
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("valid link regex"));

/// Heading-delimited sections with fewer trimmed characters are noise.
pub const MIN_SECTION_CHARS: usize = 50;

pub const INTRODUCTION_PATH: &str = "0";
pub const INTRODUCTION_TITLE: &str = "Introduction";

pub const MAX_KEYWORDS: usize = 20;

const AUTOMOTIVE_TERMS: &[&str] = &[
    "tire", "oil", "brake", "engine", "battery", "fuel", "light", "warning", "maintenance",
    "safety", "airbag", "seat", "belt", "door", "window", "mirror", "wiper", "filter", "fluid",
    "pressure", "temperature", "gauge", "dashboard", "instrument", "control", "switch", "button",
    "key", "fob", "start", "stop", "drive", "park", "reverse", "neutral", "transmission",
    "cruise", "lane", "assist", "camera", "sensor", "navigation", "audio", "bluetooth", "phone",
    "climate", "ac", "heat", "defrost", "vent",
];

#[derive(Debug)]
struct OpenSection {
    path: String,
    title: String,
    depth: u32,
    content: String,
}

/// Splits Markdown into sections at ATX headings.
///
/// A level-1 heading opens a new top-level path (`"1"`, `"2"`, ...); deeper
/// headings number within it (`"1.1"`, `"1.2"`, ...). Text before the first
/// heading becomes an `"Introduction"` section at path `"0"`. Each section's
/// content starts with its own heading line and keeps the original line
/// endings, so the emitted contents concatenate back to the input unless a
/// noise section was dropped.
pub fn parse_sections(markdown: &str) -> Vec<Section> {
    let mut emitted: Vec<OpenSection> = Vec::new();
    let mut current: Option<OpenSection> = None;
    let mut chapter = 0u32;
    let mut nested = 0u32;
    let mut saw_heading = false;

    for line in markdown.split_inclusive('\n') {
        let text = line.trim_end_matches(['\n', '\r']);
        let Some(caps) = HEADING_RE.captures(text) else {
            match current.as_mut() {
                Some(open) => open.content.push_str(line),
                None => {
                    current = Some(OpenSection {
                        path: INTRODUCTION_PATH.to_owned(),
                        title: INTRODUCTION_TITLE.to_owned(),
                        depth: 0,
                        content: line.to_owned(),
                    });
                }
            }
            continue;
        };

        saw_heading = true;
        if let Some(open) = current.take()
            && !open.content.trim().is_empty()
        {
            emitted.push(open);
        }

        let level = caps[1].len() as u32;
        let path = if level == 1 {
            chapter += 1;
            nested = 0;
            chapter.to_string()
        } else {
            nested += 1;
            format!("{chapter}.{nested}")
        };

        current = Some(OpenSection {
            path,
            title: sanitize_title(&caps[2]),
            depth: level - 1,
            content: line.to_owned(),
        });
    }

    if let Some(open) = current
        && !open.content.trim().is_empty()
    {
        emitted.push(open);
    }

    emitted
        .into_iter()
        .filter(|s| !saw_heading || s.content.trim().chars().count() >= MIN_SECTION_CHARS)
        .enumerate()
        .map(|(idx, s)| Section::from_parts(s.path, s.title, s.depth, idx as u32, s.content))
        .collect()
}

/// Strips emphasis, collapses `[text](url)` links and bounds the length.
pub fn sanitize_title(raw: &str) -> String {
    let title = EMPHASIS_RE.replace_all(raw, "");
    let title = LINK_RE.replace_all(&title, "$1");
    let title = truncate_chars(title.trim(), MAX_TITLE_CHARS);
    if title.is_empty() {
        return "Untitled".to_owned();
    }
    title
}

/// Automotive vocabulary found in a section, plus its longer title words.
pub fn extract_keywords(content: &str, title: &str) -> Vec<String> {
    let text = format!("{title} {content}").to_lowercase();
    let words = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<HashSet<_>>();

    let mut keywords = AUTOMOTIVE_TERMS
        .iter()
        .filter(|term| words.contains(**term))
        .map(|term| (*term).to_owned())
        .collect::<BTreeSet<_>>();

    for word in title.to_lowercase().split_whitespace() {
        let word = word
            .chars()
            .filter(|c| c.is_ascii_lowercase())
            .collect::<String>();
        if word.len() > 3 {
            keywords.insert(word);
        }
    }

    keywords.into_iter().take(MAX_KEYWORDS).collect()
}
