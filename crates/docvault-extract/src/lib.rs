//! Turns raw source bytes into a uniform [`Item`].
//!
//! The extractor owns MIME decoding (via mailparse), header
//! normalization, body selection with an HTML-to-text fallback,
//! attachment enumeration, and the feature derivation the similarity
//! engine scores against. Items are ephemeral; nothing here touches
//! disk.

use docvault_utils::error::ExtractError;
use docvault_utils::types::SourceKind;
use docvault_utils::FeatureSet;
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::warn;

/// Hard input bound for one raw message.
pub const MAX_EMAIL_SIZE_MB: u64 = 25;

/// Subject length cap after cleaning.
pub const MAX_SUBJECT_LENGTH: usize = 500;

/// Body preview cap used for feature tokens; stored bodies keep twice
/// this much.
pub const MAX_BODY_PREVIEW_LENGTH: usize = 10_000;

/// Attachment enumeration cap.
pub const MAX_ATTACHMENT_COUNT: usize = 100;

/// Token-set bounds for similarity features.
pub const MAX_SUBJECT_TOKENS: usize = 100;
pub const MAX_BODY_TOKENS: usize = 200;

static DOMAIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9.-]+\.[a-z]{2,}$").expect("static regex"));
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("static regex"));
static MESSAGE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9@._-]").expect("static regex"));
static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("static regex"));
static STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("static regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("static regex"));
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "xls", "xlsx", "odt", "ods"];

/// One decoded attachment.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Sanitized, filesystem-safe filename.
    pub filename: String,
    /// The name the sender used, unmodified.
    pub original_filename: String,
    pub mime: String,
    pub size: usize,
    pub extension: String,
    pub is_pdf: bool,
    pub is_image: bool,
    pub is_document: bool,
    /// Decoded payload bytes.
    pub payload: Vec<u8>,
}

/// The uniform in-memory record the pipeline works on.
#[derive(Debug, Clone)]
pub struct Item {
    pub source: SourceKind,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub message_id: String,
    /// Raw Date header; the archive writer parses it.
    pub date: String,
    pub body: String,
    pub body_html: Option<String>,
    pub attachments: Vec<Attachment>,
    pub features: FeatureSet,
}

impl Item {
    /// The stable origin mapping persisted into side-cars.
    #[must_use]
    pub fn origin(&self) -> Value {
        json!({
            "message_id": self.message_id,
            "from": self.from,
            "to": self.to,
            "subject": self.subject,
            "date": self.date,
            "attachments": self
                .attachments
                .iter()
                .map(|a| a.filename.clone())
                .collect::<Vec<_>>(),
        })
    }

    /// The first PDF attachment, the archive writer's preferred payload.
    #[must_use]
    pub fn first_pdf_attachment(&self) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.is_pdf)
    }
}

/// Extracts [`Item`]s from raw RFC 2822 messages.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    max_size_bytes: usize,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_size_mb(MAX_EMAIL_SIZE_MB)
    }

    #[must_use]
    pub fn with_max_size_mb(max_mb: u64) -> Self {
        Self {
            max_size_bytes: (max_mb as usize) * 1024 * 1024,
        }
    }

    /// Extract an [`Item`] from raw message bytes.
    ///
    /// # Errors
    ///
    /// [`ExtractError::ItemTooLarge`] past the size bound and
    /// [`ExtractError::Parse`] for bytes mailparse cannot make sense of.
    pub fn extract(&self, raw: &[u8]) -> Result<Item, ExtractError> {
        if raw.len() > self.max_size_bytes {
            return Err(ExtractError::ItemTooLarge {
                size_mb: raw.len() as f64 / 1024.0 / 1024.0,
                max_mb: self.max_size_bytes as u64 / 1024 / 1024,
            });
        }

        let parsed = mailparse::parse_mail(raw).map_err(|e| ExtractError::Parse(e.to_string()))?;

        let headers = parsed.get_headers();
        let from = clean_address(&headers.get_first_value("From").unwrap_or_default());
        let to = clean_address(&headers.get_first_value("To").unwrap_or_default());
        let subject = clean_subject(&headers.get_first_value("Subject").unwrap_or_default());
        let message_id = clean_message_id(&headers.get_first_value("Message-ID").unwrap_or_default());
        let date = headers.get_first_value("Date").unwrap_or_default();

        let mut bodies = BodyParts::default();
        let mut attachments = Vec::new();
        collect_parts(&parsed, &mut bodies, &mut attachments);

        let body_text = if !bodies.plain.is_empty() {
            bodies.plain
        } else if let Some(html) = bodies.html.as_deref() {
            html_to_text(html)
        } else {
            String::new()
        };
        let body = clean_body(&body_text);

        let mut item = Item {
            source: SourceKind::Mail,
            from,
            to,
            subject,
            message_id,
            date,
            body,
            body_html: bodies.html,
            attachments,
            features: FeatureSet::default(),
        };
        item.features = derive_features(&item);
        Ok(item)
    }
}

#[derive(Default)]
struct BodyParts {
    plain: String,
    html: Option<String>,
}

fn collect_parts(part: &ParsedMail<'_>, bodies: &mut BodyParts, attachments: &mut Vec<Attachment>) {
    let disposition = part.get_content_disposition();
    let is_attachment = disposition.disposition == DispositionType::Attachment;

    if is_attachment {
        if attachments.len() >= MAX_ATTACHMENT_COUNT {
            warn!("attachment limit ({MAX_ATTACHMENT_COUNT}) reached; ignoring the rest");
            return;
        }
        if let Some(original) = disposition
            .params
            .get("filename")
            .cloned()
            .or_else(|| part.ctype.params.get("name").cloned())
        {
            let payload = match part.get_body_raw() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("failed to decode attachment '{original}': {e}");
                    Vec::new()
                }
            };
            let filename = docvault_naming::sanitize_filename(&original, 200);
            let extension = filename
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_ascii_lowercase())
                .unwrap_or_default();
            attachments.push(Attachment {
                is_pdf: extension == "pdf",
                is_image: IMAGE_EXTENSIONS.contains(&extension.as_str()),
                is_document: DOCUMENT_EXTENSIONS.contains(&extension.as_str()),
                size: payload.len(),
                mime: part.ctype.mimetype.clone(),
                filename,
                original_filename: original,
                extension,
                payload,
            });
        }
        return;
    }

    if part.subparts.is_empty() {
        match part.ctype.mimetype.as_str() {
            "text/plain" => {
                if bodies.plain.is_empty() {
                    match part.get_body() {
                        Ok(text) => bodies.plain = text,
                        Err(e) => warn!("failed to decode text/plain part: {e}"),
                    }
                }
            }
            "text/html" => {
                if bodies.html.is_none() {
                    match part.get_body() {
                        Ok(text) => bodies.html = Some(text),
                        Err(e) => warn!("failed to decode text/html part: {e}"),
                    }
                }
            }
            _ => {}
        }
        return;
    }

    for sub in &part.subparts {
        collect_parts(sub, bodies, attachments);
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

fn clean_address(address: &str) -> String {
    truncate(address.trim(), 500)
}

fn clean_subject(subject: &str) -> String {
    let cleaned = subject
        .trim()
        .replace(['\n', '\r'], " ")
        .replace('/', "-")
        .replace('[', "(")
        .replace(']', ")");
    truncate(&cleaned, MAX_SUBJECT_LENGTH)
}

fn clean_message_id(message_id: &str) -> String {
    let trimmed = message_id.trim();
    let inner = trimmed
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(trimmed);
    let sanitized = MESSAGE_ID_RE.replace_all(inner, "");
    truncate(&sanitized, 200)
}

fn clean_body(body: &str) -> String {
    let cleaned = body.replace('\0', "").replace('/', "-");
    truncate(&cleaned, MAX_BODY_PREVIEW_LENGTH * 2)
}

/// Strip tags from HTML, dropping script and style blocks entirely.
fn html_to_text(html: &str) -> String {
    let without_scripts = SCRIPT_RE.replace_all(html, "");
    let without_styles = STYLE_RE.replace_all(&without_scripts, "");
    let without_tags = TAG_RE.replace_all(&without_styles, " ");
    WS_RE.replace_all(&without_tags, " ").trim().to_string()
}

fn tokenize(text: &str, limit: usize) -> BTreeSet<String> {
    let lowered = text.to_lowercase();
    let mut tokens = BTreeSet::new();
    for m in TOKEN_RE.find_iter(&lowered) {
        tokens.insert(m.as_str().to_string());
        if tokens.len() >= limit {
            break;
        }
    }
    tokens
}

/// Pull the sender domain out of a From header, accepting both bare
/// addresses and `Name <email@domain>` forms. Invalid domains map to an
/// empty string rather than polluting the features.
fn extract_from_domain(from: &str) -> String {
    let address = match (from.find('<'), from.find('>')) {
        (Some(start), Some(end)) if start < end => &from[start + 1..end],
        _ => from,
    };
    let Some((_, domain)) = address.rsplit_once('@') else {
        return String::new();
    };
    let domain = domain.trim().to_lowercase();
    if DOMAIN_RE.is_match(&domain) {
        domain
    } else {
        String::new()
    }
}

fn derive_features(item: &Item) -> FeatureSet {
    let body_preview = truncate(&item.body, MAX_BODY_PREVIEW_LENGTH);
    FeatureSet {
        from_domain: extract_from_domain(&item.from),
        to: item.to.clone(),
        subject_tokens: tokenize(&item.subject, MAX_SUBJECT_TOKENS),
        body_tokens: tokenize(&body_preview, MAX_BODY_TOKENS),
        has_pdf: item.attachments.iter().any(|a| a.is_pdf),
        has_attachments: !item.attachments.is_empty(),
        num_attachments: item.attachments.len(),
        has_images: item.attachments.iter().any(|a| a.is_image),
        has_documents: item.attachments.iter().any(|a| a.is_document),
        subject_length: item.subject.chars().count(),
        body_length: item.body.chars().count(),
    }
}
