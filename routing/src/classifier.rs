//! Task classification
//!
//! Maps a [`Query`] onto the [`TaskCategory`] that decides which backend
//! serves it. Classification is a pure function of the query: no I/O, no
//! allocation beyond the signal list, no failure mode.
//!
//! # Policy (first match wins)
//!
//! ```text
//! Signal                                   | Category
//! -----------------------------------------|----------------
//! any image attachment                     | VisionLanguage
//! proof / complexity / debugging / code /  | MathCode
//!   step-by-step computation               |
//! anything else (incl. empty text)         | Light
//! ```

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::query::Query;

/// Routing bucket for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// Proofs, algorithm analysis, debugging, numeric reasoning.
    MathCode,
    /// Anything carrying an image.
    VisionLanguage,
    /// Polishing, translation, summarization and everything unmatched.
    Light,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 3] = [Self::MathCode, Self::VisionLanguage, Self::Light];

    /// Gateway tool that serves this category.
    pub fn tool_name(self) -> &'static str {
        match self {
            Self::MathCode => "math_code",
            Self::VisionLanguage => "vl_mode",
            Self::Light => "light_mode",
        }
    }

    /// Reverse lookup from a tool name.
    pub fn from_tool_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.tool_name() == name)
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MathCode => write!(f, "math_code"),
            Self::VisionLanguage => write!(f, "vision_language"),
            Self::Light => write!(f, "light"),
        }
    }
}

/// Which heuristic family fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    ImageAttachment,
    Proof,
    Complexity,
    Debugging,
    CodeAnalysis,
    Computation,
}

/// Classification result with the evidence behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: TaskCategory,
    pub signals: Vec<Signal>,
}

static PROOF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(prove|proving|proof|theorem|lemma|corollary|by induction|q\.e\.d)\b|证明|定理")
        .expect("PROOF_RE regex should compile")
});

static COMPLEXITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(time complexity|space complexity|complexity|big[- ]?o|asymptotic|algorithms?)\b|\bO\([^)]*n[^)]*\)|复杂度|算法",
    )
    .expect("COMPLEXITY_RE regex should compile")
});

static DEBUGGING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(debug|debugging|bugs?|stack ?trace|traceback|segfault|segmentation fault|panic(ked|s)?|compile errors?|compiler errors?|null pointer|off[- ]by[- ]one)\b|调试|报错",
    )
    .expect("DEBUGGING_RE regex should compile")
});

static CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)```|^\s*(fn|def|class|impl|func|function)\s+\w+|\b(refactor|recursion|recursive|source code|this code|the code|code snippet|unit tests?)\b|代码|编程",
    )
    .expect("CODE_RE regex should compile")
});

static COMPUTATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(calculate|compute|solve|equations?|integral|integrate|derivative|differentiate|step[- ]by[- ]step|probability|matrix|factorial)\b|\d+(\.\d+)?\s*[+*^×÷]\s*\d+|\d+(\.\d+)?\s+[-/]\s+\d+|计算|方程|求解",
    )
    .expect("COMPUTATION_RE regex should compile")
});

/// Keyword/pattern classifier.
///
/// Stateless; a single instance can be shared across concurrent requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskClassifier;

impl TaskClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Category for `query`.
    pub fn classify(&self, query: &Query) -> TaskCategory {
        self.classify_with_signals(query).category
    }

    /// Category for `query` together with every signal that matched.
    pub fn classify_with_signals(&self, query: &Query) -> Classification {
        if query.has_image() {
            return Classification {
                category: TaskCategory::VisionLanguage,
                signals: vec![Signal::ImageAttachment],
            };
        }

        let signals = text_signals(&query.text);
        let category = if signals.is_empty() {
            TaskCategory::Light
        } else {
            TaskCategory::MathCode
        };

        Classification { category, signals }
    }
}

fn text_signals(text: &str) -> Vec<Signal> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let checks: [(&LazyLock<Regex>, Signal); 5] = [
        (&PROOF_RE, Signal::Proof),
        (&COMPLEXITY_RE, Signal::Complexity),
        (&DEBUGGING_RE, Signal::Debugging),
        (&CODE_RE, Signal::CodeAnalysis),
        (&COMPUTATION_RE, Signal::Computation),
    ];

    checks
        .into_iter()
        .filter(|(re, _)| re.is_match(text))
        .map(|(_, signal)| signal)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> TaskCategory {
        TaskClassifier::new().classify(&Query::new(text))
    }

    #[test]
    fn proof_request_is_math_code() {
        assert_eq!(classify("Prove the Pythagorean theorem"), TaskCategory::MathCode);
        assert_eq!(classify("请证明费马小定理"), TaskCategory::MathCode);
    }

    #[test]
    fn complexity_question_is_math_code() {
        assert_eq!(
            classify("What is the time complexity of merge sort?"),
            TaskCategory::MathCode
        );
        assert_eq!(classify("is this O(n log n)?"), TaskCategory::MathCode);
    }

    #[test]
    fn debugging_request_is_math_code() {
        assert_eq!(
            classify("Why does my program panic with an index out of bounds?"),
            TaskCategory::MathCode
        );
        assert_eq!(
            classify("here is the traceback, help me debug it"),
            TaskCategory::MathCode
        );
    }

    #[test]
    fn code_block_is_math_code() {
        let text = "Can you review this?\n```rust\nfn main() {}\n```";
        assert_eq!(classify(text), TaskCategory::MathCode);
        assert_eq!(classify("def fib(n):\n    return n"), TaskCategory::MathCode);
    }

    #[test]
    fn numeric_computation_is_math_code() {
        assert_eq!(classify("what is 12 * 7"), TaskCategory::MathCode);
        assert_eq!(
            classify("Solve this equation step by step"),
            TaskCategory::MathCode
        );
    }

    #[test]
    fn light_tasks() {
        assert_eq!(
            classify("translate this sentence to French"),
            TaskCategory::Light
        );
        assert_eq!(classify("Polish the wording of my email"), TaskCategory::Light);
        assert_eq!(classify("summarize the article below"), TaskCategory::Light);
    }

    #[test]
    fn dates_and_ratios_are_not_arithmetic() {
        assert_eq!(
            classify("summarize the report from 2024/06/20"),
            TaskCategory::Light
        );
        assert_eq!(classify("rewrite: support is available 24/7"), TaskCategory::Light);
        assert_eq!(classify("what is 84 / 12"), TaskCategory::MathCode);
    }

    #[test]
    fn empty_query_is_light() {
        assert_eq!(classify(""), TaskCategory::Light);
        assert_eq!(classify("   \n "), TaskCategory::Light);
    }

    #[test]
    fn image_wins_over_text() {
        let classifier = TaskClassifier::new();
        let q = Query::new("Prove the Pythagorean theorem").with_image("https://x.io/a.png");
        assert_eq!(classifier.classify(&q), TaskCategory::VisionLanguage);

        let q = Query::new("what is in this picture").with_image("https://x.io/b.jpg");
        assert_eq!(classifier.classify(&q), TaskCategory::VisionLanguage);

        let q = Query::new("").with_image("data:image/png;base64,AAAA");
        assert_eq!(classifier.classify(&q), TaskCategory::VisionLanguage);
    }

    #[test]
    fn signals_are_reported() {
        let c = TaskClassifier::new()
            .classify_with_signals(&Query::new("prove the algorithm runs in O(n)"));
        assert_eq!(c.category, TaskCategory::MathCode);
        assert!(c.signals.contains(&Signal::Proof));
        assert!(c.signals.contains(&Signal::Complexity));

        let c = TaskClassifier::new().classify_with_signals(&Query::new("hello there"));
        assert_eq!(c.category, TaskCategory::Light);
        assert!(c.signals.is_empty());
    }

    #[test]
    fn tool_name_roundtrip() {
        for category in TaskCategory::ALL {
            assert_eq!(
                TaskCategory::from_tool_name(category.tool_name()),
                Some(category)
            );
        }
        assert_eq!(TaskCategory::from_tool_name("add"), None);
    }

    #[test]
    fn category_display() {
        assert_eq!(TaskCategory::MathCode.to_string(), "math_code");
        assert_eq!(TaskCategory::VisionLanguage.to_string(), "vision_language");
        assert_eq!(TaskCategory::Light.to_string(), "light");
    }
}
