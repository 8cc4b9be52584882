use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::formats::Section;

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+(.+)$").expect("valid header regex"));
static SPACED_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[a-zA-Z]\s[a-zA-Z]\s[a-zA-Z]\b").expect("valid spacing regex")
});
static ALPHA_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-zA-Z]+\b").expect("valid word regex"));
static SPECIAL_CHAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[^a-zA-Z0-9\s.,!?\-:;'"()]"#).expect("valid special char regex")
});
static GARBLE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"[a-z]\s[a-z]\s[a-z]\s[a-z]",
        r"[A-Z]{10,}",
        r"[\x00-\x08\x0b\x0c\x0e-\x1f]",
        r"[^\x00-\x7F]{5,}",
        r"\d{20,}",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid garble regex"))
    .collect()
});

const MAX_SAMPLE_HEADERS: usize = 5;
const MAX_GARBLE_EXAMPLES: usize = 5;
const REPEATED_LETTER_RUN: usize = 5;

/// Scores how garbled a text looks, as hits per character.
pub trait GarbleDetector: Send + Sync {
    fn score(&self, text: &str) -> f64;

    fn examples(&self, _text: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Pattern-based detector for common PDF extraction artifacts: letter-spaced
/// words, long uppercase runs, control characters, long non-ASCII runs, very
/// long digit runs and runs of one repeated letter.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexGarbleDetector;

impl RegexGarbleDetector {
    fn hits<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut hits = Vec::new();
        for re in GARBLE_RES.iter() {
            hits.extend(re.find_iter(text).map(|m| m.as_str()));
        }
        hits.extend(repeated_letter_runs(text));
        hits
    }
}

impl GarbleDetector for RegexGarbleDetector {
    fn score(&self, text: &str) -> f64 {
        self.hits(text).len() as f64 / text.chars().count().max(1) as f64
    }

    fn examples(&self, text: &str) -> Vec<String> {
        self.hits(text)
            .into_iter()
            .take(MAX_GARBLE_EXAMPLES)
            .map(str::to_owned)
            .collect()
    }
}

/// Runs of at least five identical ASCII letters, e.g. `"aaaaa"`.
fn repeated_letter_runs(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut runs = Vec::new();
    let mut start = 0usize;
    while start < bytes.len() {
        let b = bytes[start];
        let mut end = start + 1;
        while end < bytes.len() && bytes[end] == b {
            end += 1;
        }
        if b.is_ascii_alphabetic() && end - start >= REPEATED_LETTER_RUN {
            runs.push(&text[start..end]);
        }
        start = end;
    }
    runs
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityThresholds {
    pub min_content_length: usize,
    pub min_sections: usize,
    pub min_headers: usize,
    pub max_garbled_ratio: f64,
    pub max_spacing_ratio: f64,
    pub min_avg_word_length: f64,
    pub max_special_char_ratio: f64,
    pub min_passing_score: u32,
    pub max_issues: usize,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_content_length: 5000,
            min_sections: 5,
            min_headers: 3,
            max_garbled_ratio: 0.05,
            max_spacing_ratio: 0.01,
            min_avg_word_length: 3.5,
            max_special_char_ratio: 0.15,
            min_passing_score: 70,
            max_issues: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QualityReport {
    pub content_length: usize,
    pub section_count: usize,
    pub header_count: usize,
    pub sample_headers: Vec<String>,
    pub garbled_ratio: f64,
    pub garbled_examples: Vec<String>,
    pub spacing_ratio: f64,
    pub avg_word_length: f64,
    pub special_char_ratio: f64,
    pub issues: Vec<String>,
    pub score: u32,
    pub passed: bool,
}

pub struct QualityEvaluator {
    thresholds: QualityThresholds,
    detector: Box<dyn GarbleDetector>,
}

impl Default for QualityEvaluator {
    fn default() -> Self {
        Self::new(QualityThresholds::default(), Box::new(RegexGarbleDetector))
    }
}

impl QualityEvaluator {
    pub fn new(thresholds: QualityThresholds, detector: Box<dyn GarbleDetector>) -> Self {
        Self {
            thresholds,
            detector,
        }
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    pub fn evaluate(&self, content: &str, sections: &[Section]) -> QualityReport {
        let t = &self.thresholds;
        let content_length = content.chars().count();
        let mut issues = Vec::new();
        let mut score = 100i64;

        if content_length < t.min_content_length {
            issues.push(format!(
                "Content too short: {content_length} chars (min: {})",
                t.min_content_length
            ));
            score -= 30;
        }

        if sections.len() < t.min_sections {
            issues.push(format!(
                "Too few sections: {} (min: {})",
                sections.len(),
                t.min_sections
            ));
            score -= 20;
        }

        let headers = HEADER_RE
            .captures_iter(content)
            .map(|caps| caps[1].to_owned())
            .collect::<Vec<_>>();
        if headers.len() < t.min_headers {
            issues.push(format!(
                "Too few headers: {} (min: {})",
                headers.len(),
                t.min_headers
            ));
            score -= 15;
        }

        let garbled_ratio = self.detector.score(content);
        if garbled_ratio > t.max_garbled_ratio {
            issues.push(format!(
                "High garbled text ratio: {} (max: {})",
                percent(garbled_ratio),
                percent(t.max_garbled_ratio)
            ));
            score -= 25;
        }

        let spacing_ratio = spacing_ratio(content);
        if spacing_ratio > t.max_spacing_ratio {
            issues.push(format!(
                "Character spacing issues: {}",
                percent(spacing_ratio)
            ));
            score -= 20;
        }

        let avg_word_length = avg_word_length(content);
        if avg_word_length < t.min_avg_word_length {
            issues.push(format!(
                "Low avg word length: {avg_word_length:.1} (min: {})",
                t.min_avg_word_length
            ));
            score -= 15;
        }

        let special_char_ratio = special_char_ratio(content);
        if special_char_ratio > t.max_special_char_ratio {
            issues.push(format!(
                "High special char ratio: {} (max: {})",
                percent(special_char_ratio),
                percent(t.max_special_char_ratio)
            ));
            score -= 10;
        }

        let score = score.max(0) as u32;
        let passed = score >= t.min_passing_score && issues.len() <= t.max_issues;

        QualityReport {
            content_length,
            section_count: sections.len(),
            header_count: headers.len(),
            sample_headers: headers.into_iter().take(MAX_SAMPLE_HEADERS).collect(),
            garbled_ratio,
            garbled_examples: self.detector.examples(content),
            spacing_ratio,
            avg_word_length,
            special_char_ratio,
            issues,
            score,
            passed,
        }
    }
}

/// Scores extracted content with the default thresholds and detector.
pub fn evaluate_quality(content: &str, sections: &[Section]) -> QualityReport {
    QualityEvaluator::default().evaluate(content, sections)
}

fn spacing_ratio(content: &str) -> f64 {
    let words = content.split_whitespace().count();
    if words == 0 {
        return 0.0;
    }
    SPACED_WORD_RE.find_iter(content).count() as f64 / words as f64
}

fn avg_word_length(content: &str) -> f64 {
    let (count, total) = ALPHA_WORD_RE
        .find_iter(content)
        .fold((0usize, 0usize), |(n, len), m| (n + 1, len + m.as_str().len()));
    if count == 0 {
        return 0.0;
    }
    total as f64 / count as f64
}

fn special_char_ratio(content: &str) -> f64 {
    let length = content.chars().count();
    if length == 0 {
        return 0.0;
    }
    SPECIAL_CHAR_RE.find_iter(content).count() as f64 / length as f64
}

fn percent(ratio: f64) -> String {
    format!("{:.2}%", ratio * 100.0)
}
