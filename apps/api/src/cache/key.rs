use sha2::{Digest, Sha256};

use crate::generation::params::{OutputFormat, Tone};

/// Collapses internal whitespace runs and trims, so superficially different
/// spellings of the same prompt canonicalize to the same text.
pub fn canonicalize_prompt(prompt: &str) -> String {
    prompt.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Deterministic cache key: SHA-256 over the canonical prompt plus every
/// output-affecting parameter. Same inputs always produce the same key.
pub fn derive_key(prompt: &str, tone: Tone, format: OutputFormat) -> String {
    let canonical = canonicalize_prompt(prompt);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.update(b"\n");
    hasher.update(tone.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(format.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_deterministic() {
        let a = derive_key("Write a launch post", Tone::Professional, OutputFormat::BlogPost);
        let b = derive_key("Write a launch post", Tone::Professional, OutputFormat::BlogPost);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_ignores_whitespace_noise() {
        let a = derive_key("Write a   launch post", Tone::Casual, OutputFormat::Email);
        let b = derive_key("  Write a launch\tpost ", Tone::Casual, OutputFormat::Email);
        assert_eq!(a, b);
    }

    #[test]
    fn test_tone_affects_key() {
        let a = derive_key("same prompt", Tone::Professional, OutputFormat::BlogPost);
        let b = derive_key("same prompt", Tone::Playful, OutputFormat::BlogPost);
        assert_ne!(a, b);
    }

    #[test]
    fn test_format_affects_key() {
        let a = derive_key("same prompt", Tone::Professional, OutputFormat::BlogPost);
        let b = derive_key("same prompt", Tone::Professional, OutputFormat::Outline);
        assert_ne!(a, b);
    }

    #[test]
    fn test_different_prompts_differ() {
        let a = derive_key("prompt one", Tone::Professional, OutputFormat::BlogPost);
        let b = derive_key("prompt two", Tone::Professional, OutputFormat::BlogPost);
        assert_ne!(a, b);
    }

    #[test]
    fn test_canonicalize_collapses_and_trims() {
        assert_eq!(canonicalize_prompt("  a  b \n c "), "a b c");
        assert_eq!(canonicalize_prompt("already clean"), "already clean");
        assert_eq!(canonicalize_prompt(""), "");
    }
}
