//! Integration tests for edgeward-store
//!
//! Tests store operations with real SQLite in-memory database

use edgeward_proto::{Environment, EnvironmentId, EnvironmentType};
use edgeward_store::{
    connect, migrate, EnvironmentStore, SeaOrmStore, Settings, SettingsStore, StoreError,
};

/// Helper to create a migrated test store
async fn setup_test_store() -> SeaOrmStore {
    let db = connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory database");

    migrate(&db).await.expect("Failed to run migrations");

    SeaOrmStore::new(db)
}

fn edge_environment(name: &str, edge_id: &str) -> Environment {
    Environment::new(name, EnvironmentType::EdgeAgentOnDocker)
        .with_edge_id(edge_id)
        .with_url("tcp://10.0.0.5:9001")
}

#[tokio::test]
async fn test_migrations_run_successfully() {
    let db = connect("sqlite::memory:").await.expect("Failed to connect");

    let result = migrate(&db).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_connect_rejects_unsupported_url() {
    let result = connect("mysql://localhost/edgeward").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_insert_assigns_id() {
    let store = setup_test_store().await;

    let first = store
        .insert(&edge_environment("edge-1", "edge-aaa"))
        .await
        .expect("Failed to insert");
    let second = store
        .insert(&Environment::new("local", EnvironmentType::Docker))
        .await
        .expect("Failed to insert");

    assert!(first.id.is_assigned());
    assert!(second.id.is_assigned());
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn test_insert_with_explicit_id() {
    let store = setup_test_store().await;

    let inserted = store
        .insert(&edge_environment("edge-7", "edge-abc").with_id(7))
        .await
        .expect("Failed to insert");
    assert_eq!(inserted.id, EnvironmentId(7));

    let found = store
        .environment(EnvironmentId(7))
        .await
        .expect("Failed to query")
        .expect("Environment not found");
    assert_eq!(found.name, "edge-7");
    assert_eq!(found.edge_id.as_deref(), Some("edge-abc"));
    assert_eq!(found.kind, EnvironmentType::EdgeAgentOnDocker);
    assert_eq!(found.url, "tcp://10.0.0.5:9001");
}

#[tokio::test]
async fn test_insert_duplicate_id_rejected() {
    let store = setup_test_store().await;

    store
        .insert(&Environment::new("a", EnvironmentType::Docker).with_id(3))
        .await
        .unwrap();
    let result = store
        .insert(&Environment::new("b", EnvironmentType::Docker).with_id(3))
        .await;

    assert!(matches!(result, Err(StoreError::AlreadyExists(EnvironmentId(3)))));
}

#[tokio::test]
async fn test_empty_edge_id_stored_as_null() {
    let store = setup_test_store().await;

    // Two records without an edge agent must not collide on the unique index
    let a = store
        .insert(&Environment::new("a", EnvironmentType::Docker).with_edge_id(""))
        .await
        .unwrap();
    let b = store
        .insert(&Environment::new("b", EnvironmentType::Docker).with_edge_id(""))
        .await
        .unwrap();

    assert_eq!(a.edge_id, None);
    let found = store.environment(b.id).await.unwrap().unwrap();
    assert_eq!(found.edge_id, None);
}

#[tokio::test]
async fn test_save_replaces_existing_record() {
    let store = setup_test_store().await;

    let mut env = store
        .insert(&edge_environment("edge", "edge-1"))
        .await
        .unwrap();

    env.name = "renamed".to_string();
    env.agent.version = "2.19.0".to_string();
    env.last_check_in_date = 1_700_000_000;
    let saved = store.save(&env).await.expect("Failed to save");
    assert_eq!(saved.name, "renamed");

    let found = store.environment(env.id).await.unwrap().unwrap();
    assert_eq!(found.name, "renamed");
    assert_eq!(found.agent.version, "2.19.0");
    assert_eq!(found.last_check_in_date, 1_700_000_000);
    assert_eq!(store.scan_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_save_inserts_missing_record() {
    let store = setup_test_store().await;

    let saved = store
        .save(&Environment::new("fresh", EnvironmentType::KubernetesLocal).with_id(42))
        .await
        .unwrap();

    assert_eq!(saved.id, EnvironmentId(42));
    assert!(store.environment(EnvironmentId(42)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_environment() {
    let store = setup_test_store().await;

    let env = store
        .insert(&edge_environment("edge", "edge-1"))
        .await
        .unwrap();

    store.delete(env.id).await.expect("Failed to delete");
    assert!(store.environment(env.id).await.unwrap().is_none());

    let result = store.delete(env.id).await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_scan_all_ordered_by_id() {
    let store = setup_test_store().await;

    for id in [5, 2, 9] {
        store
            .insert(&Environment::new(format!("env-{}", id), EnvironmentType::Docker).with_id(id))
            .await
            .unwrap();
    }

    let ids: Vec<i32> = store
        .scan_all()
        .await
        .unwrap()
        .into_iter()
        .map(|env| env.id.0)
        .collect();
    assert_eq!(ids, vec![2, 5, 9]);
}

#[tokio::test]
async fn test_settings_default_until_written() {
    let store = setup_test_store().await;

    let settings = store.settings().await.unwrap();
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.edge_agent_checkin_interval, 5);

    let updated = Settings {
        edge_agent_checkin_interval: 30,
        tunnel_keep_alive_secs: 120,
    };
    store.update_settings(&updated).await.unwrap();
    assert_eq!(store.settings().await.unwrap(), updated);

    // Second write goes through the update path
    let again = Settings {
        edge_agent_checkin_interval: 10,
        ..updated
    };
    store.update_settings(&again).await.unwrap();
    assert_eq!(store.settings().await.unwrap().edge_agent_checkin_interval, 10);
}
