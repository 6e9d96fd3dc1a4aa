//! Memory injection
//!
//! Formats the final chunk list through the configured template and hands
//! the text to an [`Injector`]. Scene codes and priority markers are
//! bookkeeping for the classifier and are stripped before presentation.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::classify::strip_presentation_tokens;
use crate::memory::types::RetrievalResult;

/// Template placeholder replaced by the joined chunk texts
pub const TEXT_PLACEHOLDER: &str = "{{text}}";

/// Render `results` through `template`.
///
/// Returns `None` when no chunk has text left after stripping. A template
/// without the placeholder gets the chunk text appended on a new line.
///
/// # Example
/// ```
/// use chronicle_memory::injection::format_injection;
///
/// let text = format_injection("[Past events]\n{{text}}", ["the bell rang [S1:2]"]);
/// assert_eq!(text.as_deref(), Some("[Past events]\nthe bell rang"));
/// ```
pub fn format_injection<'a>(
    template: &str,
    texts: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    let body = texts
        .into_iter()
        .map(strip_presentation_tokens)
        .filter(|t| !t.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if body.is_empty() {
        return None;
    }

    let rendered = if template.contains(TEXT_PLACEHOLDER) {
        template.replace(TEXT_PLACEHOLDER, &body)
    } else if template.trim().is_empty() {
        body
    } else {
        format!("{template}\n{body}")
    };
    Some(rendered)
}

/// Render retrieval results in their current order.
pub fn format_results(template: &str, results: &[RetrievalResult]) -> Option<String> {
    format_injection(template, results.iter().map(|r| r.chunk.text.as_str()))
}

/// Destination for injected memory text
#[async_trait]
pub trait Injector: Send + Sync {
    /// Replace whatever was injected before.
    async fn inject(&self, text: String);

    async fn clear(&self);
}

/// Single-slot injector holding the latest text
#[derive(Debug, Default)]
pub struct InjectionSlot {
    content: RwLock<Option<String>>,
}

impl InjectionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Option<String> {
        self.content.read().await.clone()
    }
}

#[async_trait]
impl Injector for InjectionSlot {
    async fn inject(&self, text: String) {
        *self.content.write().await = Some(text);
    }

    async fn clear(&self) {
        *self.content.write().await = None;
    }
}
