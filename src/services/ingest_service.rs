use crate::adapters::store::MessageStore;
use crate::domain::event::RealtimeEvent;
use crate::domain::payload::WebhookPayload;
use crate::error::{AppError, Result};
use crate::services::normalizer::{self, Normalized};
use crate::services::realtime_service::RealtimeService;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone, Debug)]
struct Metrics {
    ingested_total: Counter<u64>,
    status_patches_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("wa-relay");
        Self {
            ingested_total: meter
                .u64_counter("wa_relay_messages_ingested_total")
                .with_description("Total payloads processed by ingestion")
                .build(),
            status_patches_total: meter
                .u64_counter("wa_relay_status_patches_total")
                .with_description("Total status patches applied, by whether a message matched")
                .build(),
        }
    }
}

/// What an applied payload changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored { message_id: String },
    Patched { total: usize, matched: usize },
    Ignored,
}

/// Totals for one batch import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone, Debug)]
pub struct IngestService {
    store: Arc<dyn MessageStore>,
    realtime: RealtimeService,
    metrics: Metrics,
}

impl IngestService {
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, realtime: RealtimeService) -> Self {
        Self { store, realtime, metrics: Metrics::new() }
    }

    /// Ingests a live webhook body and broadcasts what was applied.
    ///
    /// Nothing is published unless the whole payload was applied.
    ///
    /// # Errors
    /// Returns `AppError::MalformedPayload` if the body cannot be normalized.
    /// Returns `AppError::Database` if the store rejects the change.
    #[tracing::instrument(err(level = "warn"), skip(self, body), fields(body_len = body.len()))]
    pub async fn ingest_webhook(&self, body: &[u8]) -> Result<IngestOutcome> {
        let result = self.ingest_live(body).await;
        let label = if result.is_ok() { "success" } else { "failure" };
        self.metrics.ingested_total.add(1, &[KeyValue::new("source", "webhook"), KeyValue::new("result", label)]);
        result
    }

    async fn ingest_live(&self, body: &[u8]) -> Result<IngestOutcome> {
        let payload = normalizer::parse(body)?;
        let normalized = normalizer::normalize(&payload)?;
        let outcome = self.apply(&normalized).await?;

        match normalized {
            Normalized::Message(message) => {
                self.realtime.publish(RealtimeEvent::NewMessage(message));
            }
            Normalized::StatusPatches(patches) => {
                for patch in patches {
                    self.realtime.publish(RealtimeEvent::StatusUpdate(patch));
                }
            }
            Normalized::Noop => {}
        }

        Ok(outcome)
    }

    /// Normalizes and applies a payload without broadcasting.
    ///
    /// # Errors
    /// Returns `AppError::MalformedPayload` or `AppError::Database`.
    pub async fn ingest(&self, payload: &WebhookPayload) -> Result<IngestOutcome> {
        let normalized = normalizer::normalize(payload)?;
        self.apply(&normalized).await
    }

    async fn apply(&self, normalized: &Normalized) -> Result<IngestOutcome> {
        match normalized {
            Normalized::Message(message) => {
                self.store.upsert(message).await?;
                tracing::debug!(message_id = %message.id, "Message stored");
                Ok(IngestOutcome::Stored { message_id: message.id.clone() })
            }
            Normalized::StatusPatches(patches) => {
                let mut matched = 0;
                for patch in patches {
                    let hit = self.store.update_status(&patch.target_id, patch.new_status).await?;
                    self.metrics.status_patches_total.add(1, &[KeyValue::new("matched", hit)]);
                    if hit {
                        matched += 1;
                    } else {
                        tracing::debug!(target_id = %patch.target_id, "Status update for unknown message ignored");
                    }
                }
                Ok(IngestOutcome::Patched { total: patches.len(), matched })
            }
            Normalized::Noop => Ok(IngestOutcome::Ignored),
        }
    }

    /// Imports every `*.json` payload in `dir`, in file-name order.
    ///
    /// A failing file is logged and skipped; the batch always runs to the end.
    #[tracing::instrument(skip(self), fields(dir = %dir.display()))]
    pub async fn import_dir(&self, dir: &Path) -> ImportSummary {
        let mut summary = ImportSummary::default();

        let files = match list_payload_files(dir).await {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(error = %e, "Payload directory unavailable, nothing imported");
                return summary;
            }
        };

        for path in files {
            match self.import_file(&path).await {
                Ok(IngestOutcome::Ignored) => {
                    tracing::debug!(file = %path.display(), "Payload carried nothing to ingest");
                    summary.skipped += 1;
                }
                Ok(outcome) => {
                    tracing::debug!(file = %path.display(), ?outcome, "Payload imported");
                    summary.applied += 1;
                }
                Err(e) => {
                    tracing::error!(file = %path.display(), error = %e, "Payload import failed");
                    summary.failed += 1;
                }
            }
        }

        let result = if summary.failed == 0 { "success" } else { "partial" };
        self.metrics.ingested_total.add(
            (summary.applied + summary.skipped) as u64,
            &[KeyValue::new("source", "import"), KeyValue::new("result", result)],
        );
        tracing::info!(
            applied = summary.applied,
            skipped = summary.skipped,
            failed = summary.failed,
            "Payload import finished"
        );
        summary
    }

    async fn import_file(&self, path: &Path) -> Result<IngestOutcome> {
        let body = tokio::fs::read(path).await.map_err(|e| AppError::InternalMsg(format!("read failed: {e}")))?;
        let payload = normalizer::parse(&body)?;
        self.ingest(&payload).await
    }
}

async fn list_payload_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::MemoryMessageStore;
    use crate::config::RealtimeConfig;
    use crate::domain::message::DeliveryStatus;
    use serde_json::json;

    fn message_body(id: &str, wa_id: &str, timestamp: i64, body: &str) -> Vec<u8> {
        json!({
            "metaData": { "entry": [{ "changes": [{ "value": {
                "contacts": [{ "profile": { "name": "Neha Joshi" }, "wa_id": wa_id }],
                "messages": [{ "from": wa_id, "id": id, "timestamp": timestamp.to_string(), "text": { "body": body }, "type": "text" }]
            }}]}]}
        })
        .to_string()
        .into_bytes()
    }

    fn status_body(id: &str, status: &str) -> Vec<u8> {
        json!({
            "metaData": { "entry": [{ "changes": [{ "value": {
                "statuses": [{ "id": id, "status": status, "recipient_id": "w1" }]
            }}]}]}
        })
        .to_string()
        .into_bytes()
    }

    fn setup() -> (IngestService, Arc<MemoryMessageStore>, RealtimeService) {
        let store = Arc::new(MemoryMessageStore::new());
        let realtime = RealtimeService::new(&RealtimeConfig::default());
        let shared: Arc<dyn MessageStore> = store.clone();
        let service = IngestService::new(shared, realtime.clone());
        (service, store, realtime)
    }

    #[tokio::test]
    async fn test_webhook_message_is_stored_and_broadcast() {
        let (service, store, realtime) = setup();
        let mut sub = realtime.subscribe();

        let outcome = service.ingest_webhook(&message_body("m1", "w1", 1000, "hi")).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Stored { message_id: "m1".to_string() });

        let stored = store.find("m1").await.unwrap().unwrap();
        let event = sub.recv().await.unwrap();
        assert_eq!(*event, RealtimeEvent::NewMessage(stored));
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent() {
        let (service, store, _realtime) = setup();
        let body = message_body("m1", "w1", 1000, "hi");

        service.ingest_webhook(&body).await.unwrap();
        service.ingest_webhook(&body).await.unwrap();

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_status_patch_broadcasts_even_for_unknown_id() {
        let (service, store, realtime) = setup();
        let mut sub = realtime.subscribe();

        let outcome = service.ingest_webhook(&status_body("ghost", "read")).await.unwrap();

        assert_eq!(outcome, IngestOutcome::Patched { total: 1, matched: 0 });
        assert!(store.is_empty());
        assert!(matches!(*sub.recv().await.unwrap(), RealtimeEvent::StatusUpdate(_)));
    }

    #[tokio::test]
    async fn test_status_patch_updates_existing() {
        let (service, store, _realtime) = setup();
        service.ingest_webhook(&message_body("m1", "w1", 1000, "hi")).await.unwrap();

        let outcome = service.ingest_webhook(&status_body("m1", "delivered")).await.unwrap();

        assert_eq!(outcome, IngestOutcome::Patched { total: 1, matched: 1 });
        assert_eq!(store.find("m1").await.unwrap().unwrap().delivery_status, DeliveryStatus::Delivered);
    }

    #[tokio::test]
    async fn test_malformed_payload_publishes_nothing() {
        let (service, store, realtime) = setup();
        let mut sub = realtime.subscribe();

        let result = service.ingest_webhook(br#"{"metaData": {}}"#).await;

        assert!(matches!(result, Err(AppError::MalformedPayload(_))));
        assert!(store.is_empty());
        assert!(tokio::time::timeout(std::time::Duration::from_millis(50), sub.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_import_dir_continues_past_bad_files() {
        let (service, store, realtime) = setup();
        let mut sub = realtime.subscribe();
        let dir = tempfile::tempdir().unwrap();

        std::fs::write(dir.path().join("01_message.json"), message_body("m1", "w1", 1000, "hi")).unwrap();
        std::fs::write(dir.path().join("02_broken.json"), b"{ not json").unwrap();
        std::fs::write(dir.path().join("03_status.json"), status_body("m1", "read")).unwrap();
        std::fs::write(dir.path().join("04_empty.json"), br#"{"metaData": {"entry": [{"changes": [{"value": {}}]}]}}"#)
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let summary = service.import_dir(dir.path()).await;

        assert_eq!(summary, ImportSummary { applied: 2, skipped: 1, failed: 1 });
        assert_eq!(store.find("m1").await.unwrap().unwrap().delivery_status, DeliveryStatus::Read);
        assert_eq!(store.len(), 1);
        assert!(tokio::time::timeout(std::time::Duration::from_millis(50), sub.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_import_missing_dir_is_empty_batch() {
        let (service, _store, _realtime) = setup();
        let summary = service.import_dir(Path::new("/nonexistent/wa-relay-payloads")).await;
        assert_eq!(summary, ImportSummary::default());
    }
}
