//! Integration tests for the institution catalog
//!
//! These tests run the full stack: configuration, SQLite store, cached
//! catalog, HTTP server and client.

use institution_catalog::config::{validate_config_result, ConfigOverrides, ServerConfig};
use institution_catalog::storage::{SqliteStore, StoreConfig};
use institution_catalog::web::{CatalogClient, CatalogServer};
use institution_catalog::{Catalog, CatalogConfig, NewInstitution};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Helper to open an on-disk store in a temporary directory
fn create_test_store(temp_dir: &TempDir) -> SqliteStore {
    let path = temp_dir.path().join("data").join("institutions.db");
    SqliteStore::open(StoreConfig::new(path.to_string_lossy())).unwrap()
}

fn sample_draft(name: &str) -> NewInstitution {
    NewInstitution::new(name)
        .with_campus("Sede Principal")
        .with_dane_code("176001000123")
        .with_city("Cali")
        .with_department("Valle del Cauca")
        .with_photo("fachada.jpg")
}

/// A server running on an ephemeral port until `stop` is called
struct TestServer {
    client: CatalogClient,
    catalog: Catalog,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start(catalog: Catalog) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let server = CatalogServer::new(catalog.clone());
        let handle = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            client: CatalogClient::new(format!("http://{}", addr)),
            catalog,
            shutdown: Some(tx),
            handle,
        }
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap();
    }
}

mod catalog_tests {
    use super::*;

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = create_test_store(&temp_dir);
            let catalog = Catalog::new(Arc::new(store), CatalogConfig::default());
            catalog.create(sample_draft("Colegio Santa Librada")).await.unwrap();
            catalog.create(sample_draft("Liceo Departamental")).await.unwrap();
        }

        let store = create_test_store(&temp_dir);
        let catalog = Catalog::new(Arc::new(store), CatalogConfig::default());
        let snapshot = catalog.list().await.unwrap();

        let names: Vec<&str> = snapshot.iter().map(|r| r.display_name()).collect();
        assert_eq!(names, vec!["Colegio Santa Librada", "Liceo Departamental"]);
        assert_eq!(snapshot[0].photos, vec!["fachada.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_write_is_visible_to_next_read() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);
        let catalog = Catalog::new(Arc::new(store), CatalogConfig::default());

        assert!(catalog.list().await.unwrap().is_empty());
        // Cached empty snapshot
        assert!(catalog.list().await.unwrap().is_empty());

        let created = catalog.create(sample_draft("Sede Norte")).await.unwrap();
        let snapshot = catalog.list().await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, created.id);
        assert_eq!(catalog.stats().store_fetches, 2);
    }

    #[tokio::test]
    async fn test_snapshot_expires() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);
        let config = CatalogConfig {
            ttl: Duration::from_millis(50),
            ..CatalogConfig::default()
        };
        let catalog = Catalog::new(Arc::new(store), config);

        catalog.list().await.unwrap();
        catalog.list().await.unwrap();
        assert_eq!(catalog.stats().store_fetches, 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        catalog.list().await.unwrap();
        assert_eq!(catalog.stats().store_fetches, 2);
    }

    #[tokio::test]
    async fn test_concurrent_cold_reads_share_one_fetch() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);
        let catalog = Catalog::new(Arc::new(store), CatalogConfig::default());
        catalog.create(sample_draft("Institución Educativa")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let catalog = catalog.clone();
            handles.push(tokio::spawn(async move { catalog.list().await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().len(), 1);
        }

        assert_eq!(catalog.stats().store_fetches, 1);
    }
}

mod http_tests {
    use super::*;

    fn memory_catalog() -> Catalog {
        let store = SqliteStore::open_in_memory().unwrap();
        Catalog::new(Arc::new(store), CatalogConfig::default())
    }

    #[tokio::test]
    async fn test_client_round_trip() {
        let server = TestServer::start(memory_catalog()).await;

        assert!(server.client.list().await.unwrap().is_empty());

        let created = server
            .client
            .create(&sample_draft("Colegio República de Israel"))
            .await
            .unwrap();
        assert_eq!(created.id.len(), 24);
        assert_eq!(created.city.as_deref(), Some("Cali"));

        let records = server.client.list().await.unwrap();
        assert_eq!(records, vec![created]);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_write_invalidates_over_http() {
        let server = TestServer::start(memory_catalog()).await;

        server.client.list().await.unwrap();
        server.client.list().await.unwrap();

        let stats = server.client.stats().await.unwrap();
        assert!(stats.cache.populated);
        assert_eq!(stats.store_fetches, 1);
        assert_eq!(stats.cache.hits, 1);

        server.client.create(&sample_draft("Nueva Sede")).await.unwrap();

        let stats = server.client.stats().await.unwrap();
        assert!(!stats.cache.populated);
        assert_eq!(stats.cache.invalidations, 1);

        assert_eq!(server.client.list().await.unwrap().len(), 1);
        assert_eq!(server.catalog.stats().store_fetches, 2);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_http_reads() {
        let server = TestServer::start(memory_catalog()).await;
        server
            .catalog
            .create(sample_draft("Escuela Normal"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let client = server.client.clone();
            handles.push(tokio::spawn(async move { client.list().await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().len(), 1);
        }

        assert_eq!(server.catalog.stats().store_fetches, 1);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_raw_post_with_loose_types() {
        let server = TestServer::start(memory_catalog()).await;

        let response = reqwest::Client::new()
            .post(format!("{}/api/instituciones", server.client.host()))
            .json(&serde_json::json!({
                "nombreInstitucion": "Colegio 7 de Agosto",
                "codigoDaneNit": 176001000456u64,
                "fotos": "unica.jpg",
                "_id": "ignored",
                "extra": "ignored"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);

        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["codigoDaneNit"], "176001000456");
        assert_eq!(body["fotos"], serde_json::json!(["unica.jpg"]));
        assert_ne!(body["_id"], "ignored");
        assert!(body.get("extra").is_none());

        server.stop().await;
    }

    #[tokio::test]
    async fn test_client_surfaces_uniform_error() {
        let server = TestServer::start(memory_catalog()).await;

        let response = reqwest::Client::new()
            .post(format!("{}/api/instituciones", server.client.host()))
            .json(&serde_json::json!({ "ciudad": ["Cali", "Palmira"] }))
            .send()
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            reqwest::StatusCode::INTERNAL_SERVER_ERROR
        );
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["message"], "Error al crear la institución");

        // Nothing was written, so nothing was invalidated
        assert_eq!(server.catalog.stats().cache.invalidations, 0);

        server.stop().await;
    }
}

mod config_tests {
    use super::*;

    #[tokio::test]
    async fn test_config_file_to_running_catalog() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("catalog.yaml");
        std::fs::write(
            &config_path,
            "database_url: ':memory:'\nport: 4100\ncache:\n  ttl_ms: 60000\n",
        )
        .unwrap();

        let mut config = ServerConfig::load(&config_path).unwrap();
        config.apply(ConfigOverrides {
            store_timeout_ms: Some(2000),
            ..Default::default()
        });
        validate_config_result(&config).unwrap();

        assert_eq!(config.port, 4100);
        assert_eq!(config.bind_addr(), "0.0.0.0:4100");

        let store = SqliteStore::open(config.store_config()).unwrap();
        let catalog = Catalog::new(Arc::new(store), config.catalog_config());
        assert_eq!(catalog.config().ttl, Duration::from_secs(60));
        assert_eq!(catalog.config().store_timeout, Duration::from_secs(2));

        catalog.create(sample_draft("Colegio Mayor")).await.unwrap();
        assert_eq!(catalog.list().await.unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = ServerConfig::default();
        config.apply(ConfigOverrides {
            database_url: Some(String::new()),
            max_body_bytes: Some(0),
            ..Default::default()
        });

        let message = validate_config_result(&config).unwrap_err().to_string();
        assert!(message.contains("database_url"));
        assert!(message.contains("max_body_bytes"));
    }
}
