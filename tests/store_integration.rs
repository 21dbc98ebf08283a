use comms_harness::config::DbConfig;
use comms_harness::error::{ConstraintKind, StoreError};
use comms_harness::models::{ItemFilter, NewItem};
use comms_harness::store::Store;
use tempfile::TempDir;

fn file_db(tmp: &TempDir) -> DbConfig {
    DbConfig {
        path: tmp.path().join("data").join("chx.sqlite"),
    }
}

async fn ready_store() -> Store {
    let store = Store::in_memory().await.unwrap();
    store.initialize().await.unwrap();
    store
}

fn item(key: &str, title: &str, content: &str) -> NewItem {
    NewItem::new(key, title, content)
}

#[tokio::test]
async fn upsert_is_idempotent() {
    let store = ready_store().await;
    let batch = vec![
        item("chat:1", "Kim in #general", "deploy at noon"),
        item("mail:a", "Release notes", "v2 ships friday"),
    ];

    let first = store.upsert_items(&batch).await.unwrap();
    assert_eq!((first.inserted, first.updated), (2, 0));

    let second = store.upsert_items(&batch).await.unwrap();
    assert_eq!((second.inserted, second.updated), (0, 2));
    assert_eq!(first.item_ids, second.item_ids);

    assert_eq!(store.count_items().await.unwrap(), 2);
    assert_eq!(store.search("friday", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn hello_world_becomes_universe() {
    let store = ready_store().await;

    store
        .upsert_items(&[item("chat:1", "greeting", "hello world")])
        .await
        .unwrap();
    let before = store.get_item_by_key("chat:1").await.unwrap().unwrap();
    assert_eq!(store.search("world", 10).await.unwrap().len(), 1);
    assert!(store.search("universe", 10).await.unwrap().is_empty());

    store
        .upsert_items(&[item("chat:1", "greeting", "hello universe")])
        .await
        .unwrap();
    let after = store.get_item_by_key("chat:1").await.unwrap().unwrap();

    let hits = store.search("universe", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source_key, "chat:1");
    assert_eq!(hits[0].item_id, before.id);
    assert!(store.search("world", 10).await.unwrap().is_empty());

    assert_eq!(after.id, before.id);
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at >= before.updated_at);
    assert_ne!(after.content_hash, before.content_hash);
    assert_eq!(store.count_items().await.unwrap(), 1);
}

#[tokio::test]
async fn failing_row_rolls_back_whole_batch() {
    let store = ready_store().await;
    store
        .upsert_items(&[item("issues:CORE-1", "Existing", "kept as is")])
        .await
        .unwrap();

    let err = store
        .upsert_items(&[
            item("issues:CORE-1", "Existing", "changed text"),
            item("issues:CORE-2", "Fresh", "never stored"),
            item("issues:CORE-3", "   ", "blank title"),
        ])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Constraint {
            kind: ConstraintKind::Check,
            ..
        }
    ));

    assert_eq!(store.count_items().await.unwrap(), 1);
    let kept = store.get_item_by_key("issues:CORE-1").await.unwrap().unwrap();
    assert_eq!(kept.content, "kept as is");
    assert!(store.get_item_by_key("issues:CORE-2").await.unwrap().is_none());
    assert!(store.search("never", 10).await.unwrap().is_empty());
    assert_eq!(store.search("kept", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn embedding_for_unknown_item_is_foreign_key_error() {
    let store = ready_store().await;
    let err = store
        .attach_embedding(9_999, &[0u8; 16], "hash-v1")
        .await
        .unwrap_err();
    assert_eq!(err.constraint_kind(), Some(ConstraintKind::ForeignKey));
    assert_eq!(store.count_embeddings().await.unwrap(), 0);
}

#[tokio::test]
async fn every_operation_requires_initialize() {
    let store = Store::in_memory().await.unwrap();
    assert!(!store.is_initialized());

    assert!(matches!(
        store.upsert_items(&[item("chat:1", "t", "c")]).await,
        Err(StoreError::NotInitialized)
    ));
    assert!(matches!(
        store.search("anything", 5).await,
        Err(StoreError::NotInitialized)
    ));
    assert!(matches!(
        store.query(&ItemFilter::default()).await,
        Err(StoreError::NotInitialized)
    ));
    assert!(matches!(
        store.attach_embedding(1, &[0u8; 4], "m").await,
        Err(StoreError::NotInitialized)
    ));
    assert!(matches!(
        store.get_config("sync.chat:team.last_success").await,
        Err(StoreError::NotInitialized)
    ));

    store.initialize().await.unwrap();
    assert!(store.is_initialized());
    assert_eq!(store.count_items().await.unwrap(), 0);
}

#[tokio::test]
async fn concurrent_initialize_and_writers() {
    let tmp = TempDir::new().unwrap();
    let store = Store::open(&file_db(&tmp)).await.unwrap();

    let mut inits = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        inits.push(tokio::spawn(async move { store.initialize().await }));
    }
    for handle in inits {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(store.applied_migrations().await.unwrap(), vec![1, 2]);

    let mut writers = Vec::new();
    for w in 0..4 {
        let store = store.clone();
        writers.push(tokio::spawn(async move {
            let batch: Vec<NewItem> = (0..25)
                .map(|i| {
                    item(
                        &format!("mail:w{}-{}", w, i),
                        &format!("Message {} from writer {}", i, w),
                        "concurrent body",
                    )
                })
                .collect();
            store.upsert_items(&batch).await
        }));
    }
    for handle in writers {
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.inserted, 25);
    }

    assert_eq!(store.count_items().await.unwrap(), 100);
    assert_eq!(store.search("concurrent", 200).await.unwrap().len(), 100);
    store.close().await;
}

#[tokio::test]
async fn schema_and_items_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let config = file_db(&tmp);

    let store = Store::open(&config).await.unwrap();
    store.initialize().await.unwrap();
    store
        .upsert_items(&[item("calendar:evt-1", "Planning", "quarterly roadmap")])
        .await
        .unwrap();
    store.close().await;

    let reopened = Store::open(&config).await.unwrap();
    reopened.initialize().await.unwrap();
    assert_eq!(reopened.applied_migrations().await.unwrap(), vec![1, 2]);
    assert_eq!(reopened.count_items().await.unwrap(), 1);
    assert_eq!(reopened.search("roadmap", 5).await.unwrap().len(), 1);
    reopened.close().await;
}

#[tokio::test]
async fn query_orders_newest_first_and_filters_by_source() {
    let store = ready_store().await;
    store
        .upsert_items(&[
            item("chat:1", "one", "a").with_source("chat:team"),
            item("mail:1", "two", "b").with_source("mail:work"),
        ])
        .await
        .unwrap();
    store
        .upsert_items(&[item("chat:2", "three", "c").with_source("chat:team")])
        .await
        .unwrap();

    let chat = store
        .query(&ItemFilter {
            source: Some("chat:team".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    let keys: Vec<&str> = chat.iter().map(|i| i.source_key.as_str()).collect();
    assert_eq!(keys, vec!["chat:2", "chat:1"]);

    let counts = store.source_counts().await.unwrap();
    assert_eq!(counts.len(), 2);
    assert!(counts.iter().any(|c| c.source == "chat:team" && c.items == 2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn separate_handles_initialize_one_file() {
    let tmp = TempDir::new().unwrap();
    let config = file_db(&tmp);

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let config = config.clone();
        tasks.push(tokio::spawn(async move {
            let store = Store::open(&config).await?;
            store.initialize().await?;
            let versions = store.applied_migrations().await?;
            store.close().await;
            Ok::<_, StoreError>(versions)
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), vec![1, 2]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn separate_handles_queue_their_writes() {
    let tmp = TempDir::new().unwrap();
    let config = file_db(&tmp);
    let setup = Store::open(&config).await.unwrap();
    setup.initialize().await.unwrap();

    let mut writers = Vec::new();
    for w in 0..4 {
        let config = config.clone();
        writers.push(tokio::spawn(async move {
            let store = Store::open(&config).await?;
            store.initialize().await?;
            for i in 0..20 {
                store
                    .upsert_items(&[
                        item("chat:0", "shared", &format!("writer {} round {}", w, i)),
                        item(&format!("chat:w{}-{}", w, i), "own", "queued write"),
                    ])
                    .await?;
            }
            store.close().await;
            Ok::<_, StoreError>(())
        }));
    }
    for writer in writers {
        writer.await.unwrap().unwrap();
    }

    assert_eq!(setup.count_items().await.unwrap(), 81);
    assert_eq!(setup.search("queued", 200).await.unwrap().len(), 80);
    setup.close().await;
}
