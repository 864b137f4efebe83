//! Transcript extraction.
//!
//! Separates generated analysis from mechanical tool-call narration using
//! weak textual signals. The ladder deliberately trades precision for
//! recall: downstream consumers treat an empty result as a harder failure
//! than a noisy one, so the last resort returns the original transcript
//! rather than discarding potentially useful content.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

/// Minimum body length for a markdown analysis block.
const MIN_BLOCK_BODY: usize = 200;

/// Minimum length for a stripped transcript to count as analysis.
const MIN_CLEANED_LEN: usize = 30;

/// Transcripts longer than this that still lack target-script content are
/// treated as pure tool dumps.
const LONG_TOOL_DUMP_LEN: usize = 500;

lazy_static! {
    /// Splits a transcript into per-step segments, consuming the marker.
    static ref STEP_MARKER_RE: Regex = Regex::new(r"Step \d+:\s*").unwrap();
    /// First trailing step marker after an analysis block.
    static ref STEP_SPLIT_RE: Regex = Regex::new(r"\nStep \d+:").unwrap();
    static ref EXCESS_NEWLINES_RE: Regex = Regex::new(r"\n{3,}").unwrap();
}

/// Patterns that indicate only tool narration occurred.
const TOOL_ONLY_MARKERS: &[&str] = &[
    "Observed output of cmd",
    "Step 1:",
    "Step 2:",
    "Calling tool",
];

/// Writing system an analyst's reports are expected in. The detection
/// signal is parameterized so analysis rendered in a different script is
/// not misclassified as tool noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Han,
    Latin,
}

impl Script {
    pub fn matches_char(&self, c: char) -> bool {
        match self {
            Script::Han => ('\u{4e00}'..='\u{9fa5}').contains(&c),
            Script::Latin => c.is_ascii_alphabetic(),
        }
    }

    pub fn contains(&self, text: &str) -> bool {
        text.chars().any(|c| self.matches_char(c))
    }

    fn char_class(&self) -> &'static str {
        match self {
            Script::Han => r"[\x{4e00}-\x{9fa5}]",
            Script::Latin => "[A-Za-z]",
        }
    }
}

/// Per-analyst extraction signals: the expected script, the domain
/// keywords that mark real analysis, and the compiled heading patterns.
#[derive(Debug, Clone)]
pub struct ExtractionProfile {
    pub script: Script,
    pub keywords: Vec<String>,
    block_re: Regex,
    heading_re: Regex,
}

impl ExtractionProfile {
    pub fn new(script: Script, keywords: Vec<String>) -> Self {
        // Markdown heading containing the target script, followed by a
        // body of at least MIN_BLOCK_BODY characters.
        let block_re = Regex::new(&format!(
            r"(?s)#{{2,}}[^\n]*{sc}[^\n]*\n.{{{body},}}",
            sc = script.char_class(),
            body = MIN_BLOCK_BODY,
        ))
        .expect("valid block pattern");

        let heading_re = Regex::new(&format!(r"##\s*{}", script.char_class()))
            .expect("valid heading pattern");

        Self {
            script,
            keywords,
            block_re,
            heading_re,
        }
    }

    /// Default profile for reports written in Chinese.
    pub fn han() -> Self {
        Self::new(
            Script::Han,
            vec!["分析".to_string(), "建議".to_string(), "评估".to_string()],
        )
    }

    /// Profile for reports written in English.
    pub fn latin() -> Self {
        Self::new(
            Script::Latin,
            vec!["analysis".to_string(), "recommendation".to_string()],
        )
    }

    /// Whether the transcript carries an analysis heading in this script.
    pub fn has_analysis_heading(&self, text: &str) -> bool {
        self.heading_re.is_match(text)
    }
}

impl Default for ExtractionProfile {
    fn default() -> Self {
        Self::han()
    }
}

/// Extract clean analysis from a raw transcript.
///
/// Ordered fallback ladder:
/// 1. A markdown heading block in the profile's script with a sufficient
///    body is returned as-is, truncated before any trailing step marker.
/// 2. Otherwise mechanical markers are stripped; the remainder is returned
///    if long enough.
/// 3. A transcript of only mechanical markers with no target-script
///    content (or an overlong one still lacking it) yields the empty
///    string: no analysis was produced.
/// 4. Anything else returns the original transcript.
pub fn extract_analysis(raw: &str, profile: &ExtractionProfile) -> String {
    if raw.is_empty() {
        return String::new();
    }

    if let Some(found) = profile.block_re.find(raw) {
        let mut block = &raw[found.start()..found.end()];
        if let Some(step) = STEP_SPLIT_RE.find(block) {
            block = &block[..step.start()];
        }
        let block = block.trim();
        info!(chars = block.len(), "Extracted markdown analysis block");
        return block.to_string();
    }

    let cleaned = strip_step_markers(raw);
    if cleaned.len() >= MIN_CLEANED_LEN {
        info!(chars = cleaned.len(), "Extracted cleaned analysis");
        return cleaned;
    }

    let has_tool_markers = TOOL_ONLY_MARKERS.iter().any(|m| raw.contains(m));
    let lacks_script = !profile.script.contains(raw);
    if has_tool_markers && (lacks_script || raw.len() > LONG_TOOL_DUMP_LEN) {
        warn!("Transcript contains only tool calls, no analysis generated");
        return String::new();
    }

    warn!(
        chars = cleaned.len(),
        "Cleaning left too little content, returning original transcript"
    );
    raw.to_string()
}

/// Drop tool narration segments and step prefixes, keeping model prose.
fn strip_step_markers(raw: &str) -> String {
    let kept: Vec<&str> = STEP_MARKER_RE
        .split(raw)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .filter(|segment| {
            !segment.starts_with("Observed output of cmd")
                && !segment.starts_with("Calling tool")
        })
        .collect();

    let joined = kept.join("\n\n");
    EXCESS_NEWLINES_RE
        .replace_all(&joined, "\n\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn han_body(len: usize) -> String {
        "该股短期均线多头排列，成交量温和放大，主力资金连续净流入。"
            .chars()
            .cycle()
            .take(len)
            .collect()
    }

    #[test]
    fn heading_block_is_returned_exactly() {
        let body = han_body(250);
        let raw = format!(
            "Step 1: Observed output of cmd `technical_tool` executed:\n{{\"ma5\": 12.3}}\nStep 2: ## 技术分析报告\n{}",
            body
        );

        let result = extract_analysis(&raw, &ExtractionProfile::han());
        assert!(result.starts_with("## 技术分析报告"));
        assert!(result.contains(&body[..30]));
        assert!(!result.contains("Observed output"));
    }

    #[test]
    fn trailing_step_markers_are_truncated() {
        let raw = format!(
            "## 舆情分析\n{}\nStep 3: Observed output of cmd `sentiment_tool` executed:\n{{}}",
            han_body(220)
        );

        let result = extract_analysis(&raw, &ExtractionProfile::han());
        assert!(!result.contains("Step 3"));
        assert!(!result.contains("Observed output"));
    }

    #[test]
    fn tool_only_transcript_yields_empty_string() {
        let raw = r#"Step 1: Observed output of cmd `risk_tool` executed: {"var": 0.05}"#;
        let result = extract_analysis(raw, &ExtractionProfile::han());
        assert_eq!(result, "");
    }

    #[test]
    fn long_tool_dump_without_script_yields_empty_string() {
        let payload = "x".repeat(600);
        let raw = format!("Step 1: Observed output of cmd `chip_tool` executed: {}", payload);
        let result = extract_analysis(&raw, &ExtractionProfile::han());
        assert_eq!(result, "");
    }

    #[test]
    fn stripped_prose_survives() {
        let raw = "Step 1: Observed output of cmd `sentiment_tool` executed:\n{\"score\": 0.7}\nStep 2: 市场情绪整体偏多，新闻面以利好为主，短期关注量能变化。";
        let result = extract_analysis(raw, &ExtractionProfile::han());
        assert!(result.contains("市场情绪整体偏多"));
        assert!(!result.contains("Observed output"));
    }

    #[test]
    fn short_transcript_without_markers_is_kept() {
        let raw = "量价背离，谨慎。";
        let result = extract_analysis(raw, &ExtractionProfile::han());
        assert_eq!(result, raw);
    }

    #[test]
    fn latin_profile_finds_english_heading() {
        let body = "The momentum structure remains constructive with higher lows. "
            .repeat(5);
        let raw = format!("## Technical Analysis\n{}", body);
        let result = extract_analysis(&raw, &ExtractionProfile::latin());
        assert!(result.starts_with("## Technical Analysis"));
    }

    #[test]
    fn han_profile_ignores_latin_heading_block() {
        // Same content, wrong script for the profile: falls through to the
        // stripped-transcript rung instead of the heading rung.
        let body = "Momentum remains constructive. ".repeat(10);
        let raw = format!("## Technical Analysis\n{}", body);
        let result = extract_analysis(&raw, &ExtractionProfile::han());
        assert_eq!(result, raw.trim());
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(extract_analysis("", &ExtractionProfile::han()), "");
    }

    #[test]
    fn heading_detection_is_script_parameterized() {
        let han = ExtractionProfile::han();
        let latin = ExtractionProfile::latin();
        assert!(han.has_analysis_heading("## 舆情分析"));
        assert!(!han.has_analysis_heading("## Sentiment"));
        assert!(latin.has_analysis_heading("## Sentiment"));
    }
}
