//! Output-affecting generation parameters: the knobs that change what the
//! model produces, and therefore feed the cache key. Two requests that differ
//! only in tone or format must never share a cache entry.

use serde::{Deserialize, Serialize};

/// Voice the generated copy is written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Professional,
    Casual,
    Playful,
    Authoritative,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Professional => "professional",
            Tone::Casual => "casual",
            Tone::Playful => "playful",
            Tone::Authoritative => "authoritative",
        }
    }

    /// Style guidance injected into the system prompt.
    pub fn style_guidance(&self) -> &'static str {
        match self {
            Tone::Professional => {
                "Write in a polished, business-appropriate voice. \
                 Prefer precise wording over flourish; avoid slang and exclamation marks."
            }
            Tone::Casual => {
                "Write in a relaxed, conversational voice, as if talking to a colleague. \
                 Contractions are fine; keep sentences short."
            }
            Tone::Playful => {
                "Write with energy and wit. Wordplay and light humor are welcome, \
                 but never at the expense of clarity."
            }
            Tone::Authoritative => {
                "Write with confident, declarative statements backed by specifics. \
                 No hedging language ('might', 'perhaps', 'could potentially')."
            }
        }
    }
}

/// Shape of the generated output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    BlogPost,
    SocialCaption,
    Email,
    Outline,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::BlogPost => "blog_post",
            OutputFormat::SocialCaption => "social_caption",
            OutputFormat::Email => "email",
            OutputFormat::Outline => "outline",
        }
    }

    /// Structural guidance injected into the system prompt.
    pub fn structure_guidance(&self) -> &'static str {
        match self {
            OutputFormat::BlogPost => {
                "Produce a complete blog post: a headline, an opening hook, \
                 body sections with subheadings, and a closing takeaway."
            }
            OutputFormat::SocialCaption => {
                "Produce a single social media caption under 280 characters. \
                 No hashtag spam; at most two hashtags if they genuinely fit."
            }
            OutputFormat::Email => {
                "Produce an email: subject line first, then greeting, body, and sign-off. \
                 Keep the body under 200 words."
            }
            OutputFormat::Outline => {
                "Produce a hierarchical outline with numbered top-level points and \
                 indented sub-points. No prose paragraphs."
            }
        }
    }
}

/// The full set of parameters that shape one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct GenerationParams {
    pub tone: Tone,
    pub format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_serde_names_match_as_str() {
        for tone in [Tone::Professional, Tone::Casual, Tone::Playful, Tone::Authoritative] {
            let json = serde_json::to_string(&tone).unwrap();
            assert_eq!(json, format!("\"{}\"", tone.as_str()));
        }
    }

    #[test]
    fn test_format_serde_names_match_as_str() {
        for format in [
            OutputFormat::BlogPost,
            OutputFormat::SocialCaption,
            OutputFormat::Email,
            OutputFormat::Outline,
        ] {
            let json = serde_json::to_string(&format).unwrap();
            assert_eq!(json, format!("\"{}\"", format.as_str()));
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Tone::default(), Tone::Professional);
        assert_eq!(OutputFormat::default(), OutputFormat::BlogPost);
    }

    #[test]
    fn test_authoritative_guidance_bans_hedging() {
        assert!(Tone::Authoritative.style_guidance().contains("No hedging"));
    }
}
