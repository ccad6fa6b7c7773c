//! System prompts attached to each backend call.

use crate::classifier::TaskCategory;

const MATH_CODE_PROMPT: &str = r#"You are a professional mathematics and programming assistant with deep reasoning capabilities.
Work through the problem step by step:
- State assumptions and definitions before using them
- For proofs, make every inference explicit
- For code, identify the root cause before proposing a fix, and give complexity where relevant
End with a concise final answer."#;

const VISION_PROMPT: &str = r#"You are a multimodal assistant. Examine the provided image(s) carefully.
Describe what is relevant to the user's question, ground every claim in visible content,
and say so plainly when something cannot be determined from the image."#;

const LIGHT_PROMPT: &str = r#"You are an efficient text processing assistant focused on quick and accurate basic tasks:
polishing, translation, summarization, extraction and format conversion.
Answer directly, keep the user's meaning, and do not add commentary unless asked."#;

/// System prompt for the backend serving `category`.
pub fn system_prompt(category: TaskCategory) -> &'static str {
    match category {
        TaskCategory::MathCode => MATH_CODE_PROMPT,
        TaskCategory::VisionLanguage => VISION_PROMPT,
        TaskCategory::Light => LIGHT_PROMPT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_has_a_prompt() {
        for category in TaskCategory::ALL {
            assert!(!system_prompt(category).trim().is_empty());
        }
        assert_ne!(
            system_prompt(TaskCategory::MathCode),
            system_prompt(TaskCategory::Light)
        );
    }
}
