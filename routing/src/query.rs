//! The unit of work handed to the router.
//!
//! A [`Query`] is built once at request entry and dropped after the response
//! is produced. [`Query::parse`] prepares raw user input: it trims and bounds
//! the text and lifts inline image links out of it into attachments.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Upper bound on query text, in characters.
pub const MAX_QUERY_CHARS: usize = 10_000;

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "webp", "bmp"];

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'<>]+"#).expect("URL_RE regex should compile")
});

/// A reference to non-text input travelling with the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// Where the data lives: a URL or a `data:` URI.
    pub data_ref: String,
}

impl Attachment {
    pub fn new(mime_type: impl Into<String>, data_ref: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data_ref: data_ref.into(),
        }
    }

    /// Image attachment with the MIME type guessed from the reference.
    pub fn image(data_ref: impl Into<String>) -> Self {
        let data_ref = data_ref.into();
        let mime_type = image_mime_for(&data_ref).to_string();
        Self {
            mime_type,
            data_ref,
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type
            .trim()
            .to_ascii_lowercase()
            .starts_with("image/")
    }
}

fn image_mime_for(data_ref: &str) -> &'static str {
    if let Some(rest) = data_ref.strip_prefix("data:") {
        return match rest.split(';').next() {
            Some("image/png") => "image/png",
            Some("image/gif") => "image/gif",
            Some("image/webp") => "image/webp",
            Some("image/bmp") => "image/bmp",
            _ => "image/jpeg",
        };
    }
    let path = data_ref
        .split(['?', '#'])
        .next()
        .unwrap_or(data_ref)
        .to_ascii_lowercase();
    match path.rsplit('.').next() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "image/jpeg",
    }
}

/// Text plus ordered attachments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Query {
    /// Pure-text query, taken verbatim.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_image(self, data_ref: impl Into<String>) -> Self {
        self.with_attachment(Attachment::image(data_ref))
    }

    /// Build a query from raw user input.
    ///
    /// Inline `http(s)` links ending in an image extension become image
    /// attachments (in order of appearance) and are removed from the text.
    /// The remaining text is trimmed and truncated to [`MAX_QUERY_CHARS`].
    pub fn parse(input: &str) -> Self {
        let mut attachments = Vec::new();
        let mut stripped = String::with_capacity(input.len());
        let mut last = 0;
        for m in URL_RE.find_iter(input) {
            let Some(url) = image_url(m.as_str()) else {
                continue;
            };
            stripped.push_str(&input[last..m.start()]);
            stripped.push(' ');
            last = m.start() + url.len();
            attachments.push(Attachment::image(url));
        }
        stripped.push_str(&input[last..]);
        let text = sanitize(&collapse_whitespace(&stripped));
        Self { text, attachments }
    }

    pub fn has_image(&self) -> bool {
        self.attachments.iter().any(Attachment::is_image)
    }

    pub fn image_refs(&self) -> impl Iterator<Item = &str> {
        self.attachments
            .iter()
            .filter(|a| a.is_image())
            .map(|a| a.data_ref.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty()
    }

    /// First characters of the text, for log lines.
    pub fn preview(&self, max_chars: usize) -> String {
        let mut preview: String = self.text.chars().take(max_chars).collect();
        if self.text.chars().count() > max_chars {
            preview.push('…');
        }
        preview
    }
}

/// Trim and bound user input.
pub fn sanitize(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() > MAX_QUERY_CHARS {
        tracing::warn!(max_chars = MAX_QUERY_CHARS, "query text truncated");
        trimmed.chars().take(MAX_QUERY_CHARS).collect()
    } else {
        trimmed.to_string()
    }
}

/// `candidate` without trailing sentence punctuation, if it names an image.
fn image_url(candidate: &str) -> Option<&str> {
    let url = candidate.trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']', '}']);
    let path = url.split(['?', '#']).next()?;
    let (_, ext) = path.rsplit_once('.')?;
    IMAGE_EXTENSIONS
        .iter()
        .any(|e| ext.eq_ignore_ascii_case(e))
        .then_some(url)
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let joined = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&joined);
    }
    out
}
