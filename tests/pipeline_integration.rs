//! Integration tests for the collection pipeline.
//!
//! Providers and artifact hosts are served by wiremock; the store is a real
//! SQLite file.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use collector_core::config::{ArxivConfig, ZoteroConfig};
use collector_core::dedup::{ExistingSnapshot, SkipReason};
use collector_core::store::PersistOutcome;
use collector_core::{
    ArtifactClient, ArtifactFetcher, Database, DownloadError, Pipeline, PipelineConfig,
    PipelineError, Record, RecordRepository, RecordSource, SourceKind, SourceMetadata, Store,
    StoreDbErrorKind, StoreError,
};
mod support;
use support::socket_guard::start_mock_server_or_skip;

fn atom_feed(entries: &[(&str, &str)]) -> String {
    let entries: String = entries
        .iter()
        .enumerate()
        .map(|(n, (title, pdf))| {
            format!(
                r#"<entry>
                     <id>http://arxiv.org/abs/2401.0000{n}v1</id>
                     <published>2024-01-0{}T00:00:00Z</published>
                     <title>{title}</title>
                     <summary>Abstract {n}</summary>
                     <author><name>Author {n}</name></author>
                     <link title="pdf" href="{pdf}" rel="related" type="application/pdf"/>
                     <category term="cs.AI"/>
                   </entry>"#,
                n + 1
            )
        })
        .collect();
    format!(r#"<?xml version="1.0" encoding="UTF-8"?><feed xmlns="http://www.w3.org/2005/Atom">{entries}</feed>"#)
}

async fn mount_providers(server: &MockServer) {
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(200).set_body_string(atom_feed(&[
            ("Arxiv Only", &format!("{uri}/pdf/1")),
            ("Shared Paper", &format!("{uri}/pdf/2")),
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/users/42/items/top"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"key": "S1", "meta": {"numChildren": 0},
             "data": {"itemType": "journalArticle", "title": "shared   paper",
                      "url": format!("{uri}/pdf/zs")}},
            {"key": "Z1", "meta": {"numChildren": 0},
             "data": {"itemType": "journalArticle", "title": "Zotero Only",
                      "creators": [{"firstName": "Grace", "lastName": "Hopper"}],
                      "url": format!("{uri}/pdf/z")}}
        ])))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/users/42/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "successful": {"0": {}}, "success": {"0": "NEW"}, "unchanged": {}, "failed": {}
        })))
        .expect(2)
        .mount(server)
        .await;

    for (route, status) in [("/pdf/1", 200), ("/pdf/2", 200), ("/pdf/z", 404)] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_bytes(b"%PDF-1.5 test"))
            .mount(server)
            .await;
    }
}

fn config_for(server: &MockServer, temp_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        database_path: temp_dir.join("papers.db"),
        artifact_dir: temp_dir.join("pdf"),
        arxiv: ArxivConfig {
            query_terms: vec!["cat:cs.AI".to_string()],
            max_results: 2,
            page_size: 2,
            request_delay_ms: 0,
            base_url: format!("{}/api/query", server.uri()),
            ..ArxivConfig::default()
        },
        zotero: ZoteroConfig {
            library_id: Some("42".to_string()),
            api_key: Some("key".to_string()),
            base_url: server.uri(),
            ..ZoteroConfig::default()
        },
        ..PipelineConfig::default()
    }
}

async fn open_store(config: &PipelineConfig) -> Store {
    Store::new(Database::new(&config.database_path).await.unwrap())
}

#[tokio::test]
async fn test_full_run_then_rerun_is_idempotent() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_providers(&server).await;
    let temp_dir = TempDir::new().unwrap();
    let config = config_for(&server, temp_dir.path());
    let store = open_store(&config).await;

    let pipeline = Pipeline::from_config(&config, Arc::new(store.clone())).unwrap();
    assert_eq!(pipeline.source_names(), vec!["arxiv", "zotero"]);
    let report = pipeline.run().await.unwrap();

    assert_eq!(report.total_collected, 4);
    assert_eq!(report.deduplicated, 3);
    assert_eq!(report.stored_count(), 3);
    assert_eq!(report.published, 2);
    assert_eq!(report.fetch.fetched, 2);
    assert_eq!(report.fetch.failed, 1);
    assert_eq!(report.reconciled, 2);
    assert_eq!(report.awaiting_organization, 2);

    let shared = store.get("shared paper").await.unwrap().unwrap();
    assert_eq!(shared.source_kind(), SourceKind::Arxiv);
    assert!(shared.processed);
    let expected = config.artifact_dir.join(format!("{}.pdf", shared.id.unwrap()));
    assert_eq!(shared.artifact_path.as_deref(), expected.to_str());
    assert_eq!(std::fs::read(&expected).unwrap(), b"%PDF-1.5 test");

    let rerun = Pipeline::from_config(&config, Arc::new(store.clone()))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(rerun.stored_count(), 0);
    assert_eq!(rerun.published, 0);
    let with_artifact = rerun
        .skipped
        .iter()
        .filter(|s| s.reason == SkipReason::DuplicateWithArtifact)
        .count();
    assert_eq!(with_artifact, 2);
    assert_eq!(rerun.refetched, 1);
    assert_eq!(rerun.fetch.fetched, 0);
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_unavailable_source_is_reported_and_others_proceed() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/42/items/top"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"key": "Z1", "data": {"itemType": "journalArticle", "title": "Survivor"}}
        ])))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let mut config = config_for(&server, temp_dir.path());
    config.zotero.publish = false;
    let store = open_store(&config).await;

    let report = Pipeline::from_config(&config, Arc::new(store.clone()))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.source_failures.len(), 1);
    assert_eq!(report.source_failures[0].source, "arxiv");
    assert_eq!(report.source_failures[0].error.http_status(), Some(503));
    assert_eq!(report.stored_count(), 1);
    assert_eq!(report.fetch.skipped, 1);
    assert!(!report.is_clean());
}

// ==================== Substitute repository ====================

/// Repository whose batch persist always rolls back.
#[derive(Default)]
struct ConflictingRepository {
    marks: AtomicUsize,
}

#[async_trait]
impl RecordRepository for ConflictingRepository {
    async fn snapshot_existing(&self) -> Result<ExistingSnapshot, StoreError> {
        Ok(ExistingSnapshot::new())
    }

    async fn persist(
        &self,
        _records: Vec<Record>,
        _snapshot: &ExistingSnapshot,
        _force_update: bool,
    ) -> Result<PersistOutcome, StoreError> {
        Err(StoreError::PersistenceConflict {
            kind: StoreDbErrorKind::ConstraintViolation,
            message: "UNIQUE constraint failed: papers.identity".to_string(),
        })
    }

    async fn mark_artifact(&self, _identity: &str, _path: &Path) -> Result<(), StoreError> {
        self.marks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn mark_organized(
        &self,
        _identity: &str,
        _metadata: &serde_json::Value,
    ) -> Result<(), StoreError> {
        Ok(())
    }

    async fn query_processed_unorganized(
        &self,
        _source: Option<SourceKind>,
    ) -> Result<Vec<Record>, StoreError> {
        Ok(Vec::new())
    }

    async fn count_processed_unorganized(&self) -> Result<i64, StoreError> {
        Ok(0)
    }

    async fn get_many(&self, _identities: &[String]) -> Result<Vec<Record>, StoreError> {
        Ok(Vec::new())
    }

    async fn reset_all(&self) -> Result<u64, StoreError> {
        Ok(0)
    }

    async fn sync_artifacts(&self) -> Result<u64, StoreError> {
        Ok(0)
    }

    async fn list_all(&self) -> Result<Vec<Record>, StoreError> {
        Ok(Vec::new())
    }

    async fn latest(&self, _limit: u32) -> Result<Vec<Record>, StoreError> {
        Ok(Vec::new())
    }
}

/// Repository whose snapshot fails.
struct UnavailableRepository;

#[async_trait]
impl RecordRepository for UnavailableRepository {
    async fn snapshot_existing(&self) -> Result<ExistingSnapshot, StoreError> {
        Err(StoreError::Database {
            kind: StoreDbErrorKind::PoolClosed,
            message: "pool closed".to_string(),
        })
    }

    async fn persist(
        &self,
        _records: Vec<Record>,
        _snapshot: &ExistingSnapshot,
        _force_update: bool,
    ) -> Result<PersistOutcome, StoreError> {
        unreachable!("persist after failed snapshot")
    }

    async fn mark_artifact(&self, _identity: &str, _path: &Path) -> Result<(), StoreError> {
        unreachable!()
    }

    async fn mark_organized(
        &self,
        _identity: &str,
        _metadata: &serde_json::Value,
    ) -> Result<(), StoreError> {
        unreachable!()
    }

    async fn query_processed_unorganized(
        &self,
        _source: Option<SourceKind>,
    ) -> Result<Vec<Record>, StoreError> {
        unreachable!()
    }

    async fn count_processed_unorganized(&self) -> Result<i64, StoreError> {
        unreachable!()
    }

    async fn get_many(&self, _identities: &[String]) -> Result<Vec<Record>, StoreError> {
        unreachable!()
    }

    async fn reset_all(&self) -> Result<u64, StoreError> {
        unreachable!()
    }

    async fn sync_artifacts(&self) -> Result<u64, StoreError> {
        unreachable!()
    }

    async fn list_all(&self) -> Result<Vec<Record>, StoreError> {
        unreachable!()
    }

    async fn latest(&self, _limit: u32) -> Result<Vec<Record>, StoreError> {
        unreachable!()
    }
}

#[derive(Default)]
struct CountingClient {
    calls: AtomicUsize,
}

#[async_trait]
impl ArtifactClient for CountingClient {
    async fn fetch_to_file(&self, _url: &str, _dest: &Path) -> Result<u64, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}

struct FixedSource(Vec<Record>);

#[async_trait]
impl RecordSource for FixedSource {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Arxiv
    }

    async fn fetch(&self) -> Result<Vec<Record>, collector_core::ProviderError> {
        Ok(self.0.clone())
    }
}

fn fixed_source() -> Box<FixedSource> {
    Box::new(FixedSource(vec![
        Record::collected("One", Vec::new(), SourceMetadata::empty(SourceKind::Arxiv))
            .with_url(Some("http://h/1.pdf".to_string())),
    ]))
}

#[tokio::test]
async fn test_persistence_conflict_is_reported_and_nothing_is_fetched() {
    let temp_dir = TempDir::new().unwrap();
    let client = Arc::new(CountingClient::default());
    let fetcher = ArtifactFetcher::new(
        2,
        temp_dir.path(),
        Arc::clone(&client) as Arc<dyn ArtifactClient>,
    )
    .unwrap();
    let repository = Arc::new(ConflictingRepository::default());

    let report = Pipeline::new(Arc::clone(&repository) as Arc<dyn RecordRepository>, fetcher)
        .with_source(fixed_source())
        .run()
        .await
        .unwrap();

    let conflict = report.persistence_conflict.as_ref().unwrap();
    assert!(conflict.is_persistence_conflict());
    assert!(conflict.to_string().contains("rolled back"));
    assert_eq!(report.stored_count(), 0);
    assert_eq!(report.fetch.total(), 0);
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    assert_eq!(repository.marks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_snapshot_failure_aborts_run() {
    let temp_dir = TempDir::new().unwrap();
    let fetcher =
        ArtifactFetcher::new(1, temp_dir.path(), Arc::new(CountingClient::default())).unwrap();

    let result = Pipeline::new(Arc::new(UnavailableRepository), fetcher)
        .with_source(fixed_source())
        .run()
        .await;

    assert!(matches!(result, Err(PipelineError::Store(_))));
}
