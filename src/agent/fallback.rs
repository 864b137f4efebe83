//! Forced-summary fallback.
//!
//! A run can end with the model having only narrated tool calls and never
//! produced an actual report. The detector spots that condition from the
//! transcript; the runner then issues exactly one remedial non-tool call
//! with the analyst's rubric and appends the result. The detection signal
//! is parameterized by the analyst's extraction profile rather than
//! hard-coded to one script.

use crate::agent::prompts::{FORCED_SUMMARY_FOOTER, FORCED_SUMMARY_HEADER};
use crate::extract::ExtractionProfile;

/// Lexical marker left by tool observations in the transcript.
pub const TOOL_OBSERVATION_MARKER: &str = "Observed output of cmd";

/// Whether a finished run's transcript contains only mechanical tool
/// narration: the observation marker is present while both the
/// script-appropriate analysis heading and the profile's domain keywords
/// are absent.
pub fn needs_forced_summary(transcript: &str, profile: &ExtractionProfile) -> bool {
    if !transcript.contains(TOOL_OBSERVATION_MARKER) {
        return false;
    }
    if profile.has_analysis_heading(transcript) {
        return false;
    }
    if profile
        .keywords
        .iter()
        .any(|keyword| transcript.contains(keyword.as_str()))
    {
        return false;
    }
    true
}

/// Build the remediation prompt from the analyst's rubric sections.
pub fn build_summary_prompt(rubric: &[String]) -> String {
    let mut prompt = String::from(FORCED_SUMMARY_HEADER);
    prompt.push('\n');
    for (i, section) in rubric.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, section));
    }
    prompt.push('\n');
    prompt.push_str(FORCED_SUMMARY_FOOTER);
    prompt
}
