//! Gmail-shaped adapter over an external mailbox client.
//!
//! The REST client itself is an external collaborator; this module owns
//! only the adapter logic: list matching messages, fetch raw bytes, and
//! acknowledge successful archives by relabeling. A label change that
//! fails surfaces as an error and is treated as transient by the batch
//! driver.

use docvault_pipeline::{Outcome, SourceAdapter, SourceItem};
use docvault_utils::error::DocVaultError;
use std::collections::VecDeque;

/// Minimal mailbox surface the adapter needs.
pub trait GmailClient {
    /// Message ids matching the query (and optional label), newest
    /// first, capped at `max`.
    fn list_messages(
        &mut self,
        query: &str,
        label: Option<&str>,
        max: usize,
    ) -> Result<Vec<String>, DocVaultError>;

    /// The full raw RFC 2822 message.
    fn fetch_raw(&mut self, id: &str) -> Result<Vec<u8>, DocVaultError>;

    /// Add and remove labels on a message.
    fn modify_labels(
        &mut self,
        id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<(), DocVaultError>;
}

/// Adapter options mirroring the CLI flags.
#[derive(Debug, Clone)]
pub struct GmailOptions {
    pub query: String,
    pub label: Option<String>,
    pub processed_label: String,
    pub max_results: usize,
    pub remove_from_inbox: bool,
}

impl Default for GmailOptions {
    fn default() -> Self {
        Self {
            query: String::new(),
            label: None,
            processed_label: "docvault/processed".to_string(),
            max_results: 20,
            remove_from_inbox: false,
        }
    }
}

/// Pulls messages through a [`GmailClient`] and relabels them after a
/// successful archive.
pub struct GmailAdapter<C: GmailClient> {
    client: C,
    options: GmailOptions,
    ids: VecDeque<String>,
}

impl<C: GmailClient> GmailAdapter<C> {
    pub fn new(mut client: C, options: GmailOptions) -> Result<Self, DocVaultError> {
        let ids = client
            .list_messages(&options.query, options.label.as_deref(), options.max_results)?
            .into();
        Ok(Self {
            client,
            options,
            ids,
        })
    }
}

impl<C: GmailClient> SourceAdapter for GmailAdapter<C> {
    fn next_item(&mut self) -> Result<Option<SourceItem>, DocVaultError> {
        let Some(id) = self.ids.pop_front() else {
            return Ok(None);
        };
        let raw_bytes = self.client.fetch_raw(&id)?;
        Ok(Some(SourceItem {
            display_name: format!("gmail:{id}"),
            id,
            raw_bytes,
        }))
    }

    fn ack(&mut self, id: &str, outcome: &Outcome) -> Result<(), DocVaultError> {
        // Only successful archives change upstream state.
        if !matches!(outcome, Outcome::Archived { .. }) {
            return Ok(());
        }
        let add = vec![self.options.processed_label.clone()];
        let remove = if self.options.remove_from_inbox {
            vec!["INBOX".to_string()]
        } else {
            Vec::new()
        };
        self.client.modify_labels(id, &add, &remove)
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docvault_utils::error::DedupError;
    use docvault_utils::types::{DocumentId, SourceKind, WorkflowName};
    use docvault_utils::hash_bytes;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct FakeGmail {
        messages: BTreeMap<String, Vec<u8>>,
        labels: BTreeMap<String, Vec<String>>,
        fail_labeling: bool,
    }

    impl GmailClient for FakeGmail {
        fn list_messages(
            &mut self,
            _query: &str,
            _label: Option<&str>,
            max: usize,
        ) -> Result<Vec<String>, DocVaultError> {
            Ok(self.messages.keys().take(max).cloned().collect())
        }

        fn fetch_raw(&mut self, id: &str) -> Result<Vec<u8>, DocVaultError> {
            self.messages
                .get(id)
                .cloned()
                .ok_or_else(|| DedupError::Database(format!("no message {id}")).into())
        }

        fn modify_labels(
            &mut self,
            id: &str,
            add: &[String],
            remove: &[String],
        ) -> Result<(), DocVaultError> {
            if self.fail_labeling {
                return Err(DocVaultError::Io(std::io::Error::other("label api down")));
            }
            let labels = self.labels.entry(id.to_string()).or_default();
            labels.extend(add.iter().cloned());
            labels.retain(|l| !remove.contains(l));
            Ok(())
        }
    }

    fn archived_outcome() -> Outcome {
        let hash = hash_bytes(b"x");
        Outcome::Archived {
            document_id: DocumentId::new(
                SourceKind::Mail,
                "acme-invoice",
                chrono::Utc::now(),
                hash,
            ),
            workflow: WorkflowName::new("acme-invoice").unwrap(),
            content_path: camino::Utf8PathBuf::from("/tmp/x.pdf"),
        }
    }

    #[test]
    fn yields_listed_messages() {
        let mut client = FakeGmail::default();
        client.messages.insert("m1".into(), b"raw one".to_vec());
        client.messages.insert("m2".into(), b"raw two".to_vec());

        let mut adapter = GmailAdapter::new(client, GmailOptions::default()).unwrap();
        assert_eq!(adapter.len_hint(), Some(2));
        let item = adapter.next_item().unwrap().unwrap();
        assert_eq!(item.display_name, "gmail:m1");
        assert_eq!(item.raw_bytes, b"raw one");
    }

    #[test]
    fn successful_archive_relabels() {
        let mut client = FakeGmail::default();
        client.messages.insert("m1".into(), b"raw".to_vec());
        let mut adapter = GmailAdapter::new(
            client,
            GmailOptions {
                remove_from_inbox: true,
                ..Default::default()
            },
        )
        .unwrap();

        adapter.next_item().unwrap().unwrap();
        adapter.ack("m1", &archived_outcome()).unwrap();
        assert_eq!(
            adapter.client.labels["m1"],
            vec!["docvault/processed".to_string()]
        );
    }

    #[test]
    fn skipped_items_do_not_relabel() {
        let mut client = FakeGmail::default();
        client.messages.insert("m1".into(), b"raw".to_vec());
        let mut adapter = GmailAdapter::new(client, GmailOptions::default()).unwrap();
        adapter.next_item().unwrap().unwrap();
        adapter
            .ack(
                "m1",
                &Outcome::Skipped {
                    reason: docvault_pipeline::SkipReason::NoWorkflow,
                },
            )
            .unwrap();
        assert!(adapter.client.labels.is_empty());
    }

    #[test]
    fn label_failure_surfaces_as_error() {
        let mut client = FakeGmail::default();
        client.messages.insert("m1".into(), b"raw".to_vec());
        client.fail_labeling = true;
        let mut adapter = GmailAdapter::new(client, GmailOptions::default()).unwrap();
        adapter.next_item().unwrap().unwrap();

        let err = adapter.ack("m1", &archived_outcome()).unwrap_err();
        // The batch driver treats ack failures as transient.
        assert!(err.is_transient());
    }
}
