// Prompt assembly for the generation pipeline. Each service that needs LLM
// calls keeps its prompts.rs alongside it.

use crate::generation::params::{GenerationParams, OutputFormat, Tone};

/// Base system prompt shared by all generation calls.
const SYSTEM_PREAMBLE: &str = "You are a content writer for a drafting assistant. \
    Produce only the requested content. \
    Do NOT include meta commentary, preambles, or explanations of what you did.";

/// Builds the full system prompt for one generation call from its
/// output-affecting parameters.
pub fn build_system_prompt(tone: Tone, format: OutputFormat) -> String {
    format!(
        "{SYSTEM_PREAMBLE}\n\nTone: {}\n\nFormat: {}",
        tone.style_guidance(),
        format.structure_guidance()
    )
}

pub fn system_prompt_for(params: &GenerationParams) -> String {
    build_system_prompt(params.tone, params.format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_carries_both_guidances() {
        let prompt = build_system_prompt(Tone::Playful, OutputFormat::Email);
        assert!(prompt.contains("wit"));
        assert!(prompt.contains("subject line"));
    }

    #[test]
    fn test_system_prompt_is_deterministic() {
        let a = build_system_prompt(Tone::Casual, OutputFormat::Outline);
        let b = build_system_prompt(Tone::Casual, OutputFormat::Outline);
        assert_eq!(a, b);
    }
}
