//! Orchestrated, atomic materialization of documents and streams.

use crate::renderer::PdfRenderer;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use docvault_extract::{Attachment, Item};
use docvault_naming as naming;
use docvault_registry::Workflow;
use docvault_sidecar::{ContentMeta, SidecarBuilder};
use docvault_utils::error::ArchiveError;
use docvault_utils::lock::LOCK_TIMEOUT;
use docvault_utils::types::{truncate_to_seconds, DocumentId, EntityName, SourceKind};
use docvault_utils::{hash_bytes, with_file_lock, write_atomic};
use serde_json::{json, Value};
use std::io::Write;
use tracing::{debug, info, warn};

/// Writer behavior switches, resolved from configuration by the caller.
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    pub base_path: Utf8PathBuf,
    pub save_originals: bool,
    pub originals_prefix_date: bool,
    pub convert_attachments: bool,
    pub enable_manifest: bool,
}

impl ArchiveOptions {
    #[must_use]
    pub fn new(base_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            save_originals: false,
            originals_prefix_date: false,
            convert_attachments: false,
            enable_manifest: true,
        }
    }
}

/// Everything a successful archive call produced.
#[derive(Debug, Clone)]
pub struct ArchiveOutcome {
    pub document_id: DocumentId,
    pub content_path: Utf8PathBuf,
    pub metadata_path: Utf8PathBuf,
    pub attachment_paths: Vec<Utf8PathBuf>,
    pub original_paths: Vec<Utf8PathBuf>,
}

/// Addressing for stream (non-document) archives.
#[derive(Debug, Clone)]
pub struct StreamTarget {
    pub entity: EntityName,
    /// Stream kind (`slack`, `gdocs`, ...).
    pub kind: String,
    /// Channel or mailbox the stream came from.
    pub channel_or_mailbox: String,
}

/// Writes documents into the archive repository.
pub struct ArchiveWriter {
    options: ArchiveOptions,
    renderer: Box<dyn PdfRenderer>,
}

/// Removes files written during a failed call. Disarmed on success.
struct Cleanup {
    files: Vec<Utf8PathBuf>,
    armed: bool,
}

impl Cleanup {
    fn new() -> Self {
        Self {
            files: Vec::new(),
            armed: true,
        }
    }

    fn track(&mut self, path: &Utf8Path) {
        self.files.push(path.to_owned());
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for path in &self.files {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("cleanup of {path} failed: {e}");
            }
        }
    }
}

impl ArchiveWriter {
    #[must_use]
    pub fn new(options: ArchiveOptions, renderer: Box<dyn PdfRenderer>) -> Self {
        Self { options, renderer }
    }

    #[must_use]
    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Archive one classified item under its workflow.
    ///
    /// The content payload is the item's first PDF attachment when one
    /// exists, otherwise the message itself rendered to PDF. Writes are
    /// ordered content, attachments, side-car, manifest; any failure
    /// unwinds the files created by this call and the side-car is never
    /// written without its content.
    pub fn archive_item(
        &self,
        item: &Item,
        workflow: &Workflow,
    ) -> Result<ArchiveOutcome, ArchiveError> {
        workflow
            .validate()
            .map_err(|e| ArchiveError::DataIntegrity {
                reason: format!("workflow rejected at archive time: {e}"),
            })?;
        let entity = &workflow.handling.archive.entity;
        let created_at = resolve_created_at(&item.date);

        // Payload selection: first PDF attachment, else rendered email.
        let (content, mimetype, original_name) = match item.first_pdf_attachment() {
            Some(pdf) => (
                pdf.payload.clone(),
                "application/pdf".to_string(),
                Some(pdf.original_filename.clone()),
            ),
            None => {
                let rendered = match item.body_html.as_deref() {
                    Some(html) => self.renderer.render_html(html)?,
                    None => self.renderer.render_text(&render_text_view(item))?,
                };
                (rendered, "application/pdf".to_string(), None)
            }
        };

        let content_hash = hash_bytes(&content);
        let builder = SidecarBuilder::new(
            entity.clone(),
            item.source,
            Some(workflow.name.clone()),
        );
        let document_id = builder.document_id(
            workflow.name.as_str(),
            created_at,
            content_hash.clone(),
        );

        let target_dir = self
            .options
            .base_path
            .join(entity.as_str())
            .join("docs")
            .join(created_at.format("%Y").to_string());
        ensure_dir(&target_dir)?;

        let base = naming::filename_base(item.source, created_at);
        let extension = naming::extension_for(&mimetype, original_name.as_deref());
        let base = naming::resolve_collision(&target_dir, &base, &extension)?;

        let mut cleanup = Cleanup::new();

        let content_filename = format!("{base}.{extension}");
        let content_path = target_dir.join(&content_filename);
        write_atomic(&content_path, &content)?;
        cleanup.track(&content_path);

        // Secondary attachments, skipping the one promoted to content.
        let secondary: Vec<&Attachment> = match item.first_pdf_attachment() {
            Some(primary) => item
                .attachments
                .iter()
                .filter(|a| !std::ptr::eq(*a, primary))
                .collect(),
            None => item.attachments.iter().collect(),
        };

        let mut attachment_names = Vec::new();
        let mut attachment_paths = Vec::new();
        for (idx, attachment) in secondary.iter().enumerate() {
            let (bytes, ext) = self.prepare_attachment(attachment)?;
            let name = format!("{base}-att{}.{ext}", idx + 1);
            let path = target_dir.join(&name);
            write_atomic(&path, &bytes)?;
            cleanup.track(&path);
            attachment_names.push(name);
            attachment_paths.push(path);
        }

        let sidecar = builder.build(
            document_id.clone(),
            ContentMeta {
                path: content_filename,
                hash: content_hash,
                size_bytes: content.len() as u64,
                mimetype,
                attachments: attachment_names,
            },
            item.origin(),
            created_at,
            "document",
            Some(workflow.doctype.clone()),
            Vec::new(),
            Vec::new(),
        )?;

        let metadata_path = target_dir.join(format!("{base}.json"));
        let sidecar_json = sidecar.to_canonical_json()?;
        write_atomic(&metadata_path, sidecar_json.as_bytes())?;
        cleanup.track(&metadata_path);

        let mut original_paths = Vec::new();
        if self.options.save_originals {
            for attachment in &item.attachments {
                let path = self.write_original(entity, created_at, attachment)?;
                cleanup.track(&path);
                original_paths.push(path);
            }
        }

        if self.options.enable_manifest {
            self.append_manifest(&target_dir, &document_id, &metadata_path)?;
        }

        cleanup.disarm();
        info!(id = %document_id, path = %content_path, "archived document");

        Ok(ArchiveOutcome {
            document_id,
            content_path,
            metadata_path,
            attachment_paths,
            original_paths,
        })
    }

    /// Archive a stream document (chat transcript, docs export).
    ///
    /// Streams land under `streams/{kind}/{channel}/{YYYY}` and carry no
    /// workflow in their side-car.
    #[allow(clippy::too_many_arguments)]
    pub fn archive_stream(
        &self,
        target: &StreamTarget,
        source: SourceKind,
        content: &[u8],
        mimetype: &str,
        origin: Value,
        created_at: Option<DateTime<Utc>>,
        original_filename: Option<&str>,
    ) -> Result<ArchiveOutcome, ArchiveError> {
        validate_path_component("stream kind", &target.kind)?;
        validate_path_component("stream channel", &target.channel_or_mailbox)?;

        let created_at = created_at.unwrap_or_else(Utc::now);
        let content_hash = hash_bytes(content);
        let builder = SidecarBuilder::new(target.entity.clone(), source, None);
        let document_id =
            builder.document_id(&target.channel_or_mailbox, created_at, content_hash.clone());

        let target_dir = self
            .options
            .base_path
            .join(target.entity.as_str())
            .join("streams")
            .join(&target.kind)
            .join(&target.channel_or_mailbox)
            .join(created_at.format("%Y").to_string());
        ensure_dir(&target_dir)?;

        let base = naming::filename_base(source, created_at);
        let extension = naming::extension_for(mimetype, original_filename);
        let base = naming::resolve_collision(&target_dir, &base, &extension)?;

        let mut cleanup = Cleanup::new();

        let content_filename = format!("{base}.{extension}");
        let content_path = target_dir.join(&content_filename);
        write_atomic(&content_path, content)?;
        cleanup.track(&content_path);

        let sidecar = builder.build(
            document_id.clone(),
            ContentMeta {
                path: content_filename,
                hash: content_hash,
                size_bytes: content.len() as u64,
                mimetype: mimetype.to_string(),
                attachments: Vec::new(),
            },
            origin,
            created_at,
            "document",
            None,
            Vec::new(),
            Vec::new(),
        )?;

        let metadata_path = target_dir.join(format!("{base}.json"));
        write_atomic(&metadata_path, sidecar.to_canonical_json()?.as_bytes())?;
        cleanup.track(&metadata_path);

        if self.options.enable_manifest {
            self.append_manifest(&target_dir, &document_id, &metadata_path)?;
        }

        cleanup.disarm();
        info!(id = %document_id, path = %content_path, "archived stream document");

        Ok(ArchiveOutcome {
            document_id,
            content_path,
            metadata_path,
            attachment_paths: Vec::new(),
            original_paths: Vec::new(),
        })
    }

    /// Apply the configured transcodes to an attachment.
    ///
    /// With `convert_attachments`: `text/*` becomes PDF and
    /// tab-separated values become CSV (tabs to commas, line endings
    /// untouched). Everything else is stored verbatim.
    fn prepare_attachment(
        &self,
        attachment: &Attachment,
    ) -> Result<(Vec<u8>, String), ArchiveError> {
        if self.options.convert_attachments {
            if attachment.mime == "text/tab-separated-values"
                || attachment.extension == "tsv"
            {
                let text = String::from_utf8_lossy(&attachment.payload);
                return Ok((text.replace('\t', ",").into_bytes(), "csv".to_string()));
            }
            if attachment.mime.starts_with("text/") {
                let text = String::from_utf8_lossy(&attachment.payload);
                let pdf = self.renderer.render_text(&text)?;
                return Ok((pdf, "pdf".to_string()));
            }
        }
        let ext = if attachment.extension.is_empty() {
            naming::extension_for(&attachment.mime, None)
        } else {
            attachment.extension.clone()
        };
        Ok((attachment.payload.clone(), ext))
    }

    /// Store the sender's original file under `originals/{YYYY}`.
    fn write_original(
        &self,
        entity: &EntityName,
        created_at: DateTime<Utc>,
        attachment: &Attachment,
    ) -> Result<Utf8PathBuf, ArchiveError> {
        let dir = self
            .options
            .base_path
            .join(entity.as_str())
            .join("originals")
            .join(created_at.format("%Y").to_string());
        ensure_dir(&dir)?;

        let (stem, ext) = match attachment.filename.rsplit_once('.') {
            Some((stem, ext)) => (stem, Some(ext)),
            None => (attachment.filename.as_str(), None),
        };
        let mut name = naming::normalize_name_base(stem, naming::MAX_NAME_BASE_LEN);
        if self.options.originals_prefix_date {
            let date = created_at.format("%Y-%m-%d").to_string();
            if !name.starts_with(&date) {
                name = format!("{date}-{name}");
            }
        }

        let full_name = |n: &str| match ext {
            Some(ext) => format!("{n}.{ext}"),
            None => n.to_string(),
        };

        let mut path = dir.join(full_name(&name));
        if path.exists() {
            let mut i = 2;
            loop {
                let candidate = dir.join(full_name(&format!("{name}-{i}")));
                if !candidate.exists() {
                    path = candidate;
                    break;
                }
                i += 1;
            }
        }

        write_atomic(&path, &attachment.payload)?;
        debug!(path = %path, "stored original attachment");
        Ok(path)
    }

    /// Append one JSON line to the directory's manifest under its
    /// advisory lock.
    fn append_manifest(
        &self,
        dir: &Utf8Path,
        document_id: &DocumentId,
        metadata_path: &Utf8Path,
    ) -> Result<(), ArchiveError> {
        let manifest_path = dir.join("manifest.jsonl");
        let entry = json!({
            "document_id": document_id.to_string(),
            "metadata_path": metadata_path.file_name().unwrap_or_default(),
            "timestamp": Utc::now().to_rfc3339(),
        });
        let line = format!("{entry}\n");

        with_file_lock(&manifest_path, LOCK_TIMEOUT, || {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&manifest_path)?;
            file.write_all(line.as_bytes())?;
            file.flush()
        })?
        .map_err(ArchiveError::Io)?;
        Ok(())
    }
}

/// Prefer the item's own date; fall back to now only when it is absent
/// or unparseable. Truncated to whole seconds, the resolution document
/// ids carry.
fn resolve_created_at(date_header: &str) -> DateTime<Utc> {
    let resolved = if date_header.is_empty() {
        Utc::now()
    } else {
        DateTime::parse_from_rfc2822(date_header)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                DateTime::parse_from_rfc3339(date_header).map(|dt| dt.with_timezone(&Utc))
            })
            .unwrap_or_else(|_| {
                warn!("unparseable date header '{date_header}', using now");
                Utc::now()
            })
    };
    truncate_to_seconds(resolved)
}

fn render_text_view(item: &Item) -> String {
    format!(
        "From: {}\nTo: {}\nDate: {}\nSubject: {}\n\n{}",
        item.from, item.to, item.date, item.subject, item.body
    )
}

fn ensure_dir(dir: &Utf8Path) -> Result<(), ArchiveError> {
    std::fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, Permissions::from_mode(0o755))?;
    }
    Ok(())
}

fn validate_path_component(what: &str, value: &str) -> Result<(), ArchiveError> {
    if value.is_empty()
        || value.contains('/')
        || value.contains('\\')
        || value.contains("..")
        || value.contains('\0')
    {
        return Err(ArchiveError::PathSecurity {
            path: format!("{what} '{value}'"),
        });
    }
    Ok(())
}
