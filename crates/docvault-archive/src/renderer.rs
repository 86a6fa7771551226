//! The PDF renderer contract and the built-in fallback renderer.

use crate::pdf::text_to_pdf_bytes;
use docvault_utils::error::RendererError;

/// HTML inputs past this bound are refused outright.
pub const MAX_RENDER_HTML_BYTES: usize = 10 * 1024 * 1024;

/// Renders documents to PDF bytes.
///
/// Implementations must enforce their own timeout (60 seconds by
/// convention) and surface structured errors rather than hanging; a
/// browser-based engine lives behind this trait out of tree.
pub trait PdfRenderer: Send + Sync {
    /// Render HTML to a complete PDF document.
    fn render_html(&self, html: &str) -> Result<Vec<u8>, RendererError>;

    /// Render plain text to a complete PDF document.
    fn render_text(&self, text: &str) -> Result<Vec<u8>, RendererError>;
}

/// The built-in engine-free renderer.
///
/// HTML is reduced to text (tags stripped, script/style dropped) and
/// typeset with the minimal generator. Layout fidelity is traded for
/// having no external dependency; archives remain valid PDFs either
/// way.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimalPdfRenderer;

impl PdfRenderer for MinimalPdfRenderer {
    fn render_html(&self, html: &str) -> Result<Vec<u8>, RendererError> {
        if html.len() > MAX_RENDER_HTML_BYTES {
            return Err(RendererError::InputTooLarge {
                bytes: html.len(),
                max: MAX_RENDER_HTML_BYTES,
            });
        }
        Ok(text_to_pdf_bytes(&strip_html(html)))
    }

    fn render_text(&self, text: &str) -> Result<Vec<u8>, RendererError> {
        Ok(text_to_pdf_bytes(text))
    }
}

fn strip_html(html: &str) -> String {
    let chars: Vec<char> = html.chars().collect();
    let mut out = String::with_capacity(html.len() / 2);
    let mut in_tag = false;
    let mut skip_until: Option<&str> = None;
    let mut i = 0;

    while i < chars.len() {
        if let Some(end_tag) = skip_until {
            match find_ci(&chars, i, end_tag) {
                Some(pos) => {
                    i = pos + end_tag.chars().count();
                    skip_until = None;
                }
                None => break,
            }
            continue;
        }
        let ch = chars[i];
        if in_tag {
            if ch == '>' {
                in_tag = false;
            }
            i += 1;
            continue;
        }
        if ch == '<' {
            if starts_with_ci(&chars, i, "<script") {
                skip_until = Some("</script>");
            } else if starts_with_ci(&chars, i, "<style") {
                skip_until = Some("</style>");
            } else {
                in_tag = true;
                out.push(' ');
            }
            i += 1;
            continue;
        }
        out.push(ch);
        i += 1;
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn starts_with_ci(chars: &[char], at: usize, needle: &str) -> bool {
    let needle: Vec<char> = needle.chars().collect();
    chars.len() >= at + needle.len()
        && chars[at..at + needle.len()]
            .iter()
            .zip(&needle)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
}

fn find_ci(chars: &[char], from: usize, needle: &str) -> Option<usize> {
    (from..chars.len()).find(|&i| starts_with_ci(chars, i, needle))
}
