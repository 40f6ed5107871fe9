use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use gestora_store::state::InventoryState;
use gestora_store::{
    Category, InventoryError, InventorySession, MemoryRemote, MemoryStore, MovementKind, Mutation,
    NewHistoryEntry, Product, RemoteError, RemoteStatus, RemoteTable, SessionOptions,
    SnapshotStore, StaticAuth, SyncOutcome, SyncPhase, Table, TableOp, UserId, WritePolicy,
};

struct Fixture {
    remote: Arc<MemoryRemote>,
    auth: Arc<StaticAuth>,
    store: Arc<MemoryStore>,
    session: InventorySession,
}

impl Fixture {
    fn new(options: SessionOptions, auth: StaticAuth) -> Self {
        Self::with_store(options, auth, Arc::new(MemoryStore::new()))
    }

    fn with_store(options: SessionOptions, auth: StaticAuth, store: Arc<MemoryStore>) -> Self {
        let remote = Arc::new(MemoryRemote::new());
        let auth = Arc::new(auth);
        let session =
            InventorySession::with_store(&options, store.clone(), remote.clone(), auth.clone())
                .unwrap();
        Self {
            remote,
            auth,
            store,
            session,
        }
    }

    fn snapshots(&self) -> SnapshotStore {
        SnapshotStore::new(self.store.clone())
    }
}

fn user() -> UserId {
    UserId::new("user-1")
}

fn offline() -> SessionOptions {
    SessionOptions {
        initially_online: false,
        ..Default::default()
    }
}

fn martillo() -> Product {
    Product::new(1, "Martillo", 1, 5, 1000.0)
}

fn seed_remote(remote: &MemoryRemote) {
    remote.seed(
        RemoteTable::Products,
        vec![json!({
            "id": 10, "nombre": "Taladro", "categoria_id": 1, "stock": 9, "precio": 250.0
        })],
    );
    remote.seed(RemoteTable::Categories, vec![json!({"id": 1, "nombre": "Herramientas"})]);
    remote.seed(
        RemoteTable::History,
        vec![json!({
            "id": 1, "producto_id": 10, "tipo_movimiento": "entrada", "cantidad": 9,
            "fecha": "2024-05-01T12:00:00Z"
        })],
    );
}

#[tokio::test]
async fn online_insert_updates_memory_snapshot_and_stats() {
    let fx = Fixture::new(SessionOptions::default(), StaticAuth::signed_in("user-1"));
    assert!(fx.session.start().await.unwrap().is_synced());

    let report = fx
        .session
        .apply(Mutation::Product(TableOp::Insert(martillo())))
        .await
        .unwrap();
    assert!(matches!(report.remote, RemoteStatus::Confirmed));

    let view = fx.session.view();
    assert_eq!(view.products, vec![martillo()]);
    assert_eq!(view.stats.total_products, 1);
    assert_eq!(view.stats.total_value, 5000.0);
    assert_eq!(view.historial[0].tipo_movimiento, MovementKind::Entrada);
    assert_eq!(view.historial[0].cantidad, 5);
    assert!(!view.is_loading);

    let cached: Vec<Product> = fx.snapshots().load(&user(), Table::Products).unwrap();
    assert_eq!(cached, vec![martillo()]);
    assert_eq!(fx.remote.rows(RemoteTable::Products).len(), 1);
}

#[tokio::test]
async fn offline_insert_is_local_only() {
    let store = Arc::new(MemoryStore::new());
    SnapshotStore::new(store.clone()).remember_user(&user()).unwrap();
    let fx = Fixture::with_store(offline(), StaticAuth::signed_in("user-1"), store);

    assert!(matches!(fx.session.start().await.unwrap(), SyncOutcome::FromCache));
    assert_eq!(fx.session.view().phase, SyncPhase::ServingFromCache);

    let report = fx
        .session
        .apply(Mutation::Product(TableOp::Insert(martillo())))
        .await
        .unwrap();
    assert!(matches!(report.remote, RemoteStatus::SkippedOffline));
    assert!(report.into_result().is_ok());

    let view = fx.session.view();
    assert_eq!(view.stats.total_value, 5000.0);
    assert!(!view.is_online);
    let cached: Vec<Product> = fx.snapshots().load(&user(), Table::Products).unwrap();
    assert_eq!(cached, vec![martillo()]);
    assert!(fx.remote.writes().is_empty());
}

#[tokio::test]
async fn failed_history_fetch_serves_every_table_from_cache() {
    let store = Arc::new(MemoryStore::new());
    let cached = InventoryState::new(
        vec![martillo()],
        vec![Category {
            id: 1,
            nombre: "Herramientas".into(),
        }],
        vec![],
    );
    cached
        .save(
            &SnapshotStore::new(store.clone()),
            &user(),
            &[Table::Products, Table::Categories, Table::History, Table::Stats],
        )
        .unwrap();

    let fx = Fixture::with_store(SessionOptions::default(), StaticAuth::signed_in("user-1"), store);
    seed_remote(&fx.remote);
    fx.remote.fail(RemoteTable::History, RemoteError::unavailable("connection reset"));

    let outcome = fx.session.start().await.unwrap();
    assert!(outcome.error().is_some_and(InventoryError::is_unavailable));

    let view = fx.session.view();
    assert_eq!(view.phase, SyncPhase::SyncFailed);
    // No partial product-only update from the fetches that succeeded.
    assert_eq!(view.products, vec![martillo()]);
    assert_eq!(view.categories, cached.categories);
    assert_eq!(view.stats, cached.stats);
}

#[tokio::test]
async fn clear_cache_removes_every_snapshot() {
    let fx = Fixture::new(SessionOptions::default(), StaticAuth::signed_in("user-1"));
    seed_remote(&fx.remote);
    fx.session.start().await.unwrap();
    fx.session
        .add_historial_entry(NewHistoryEntry {
            producto_id: 10,
            tipo_movimiento: MovementKind::Salida,
            cantidad: 2,
            observaciones: None,
        })
        .await
        .unwrap();

    fx.session.clear_cache().unwrap();

    let snapshots = fx.snapshots();
    assert!(snapshots.load::<Product>(&user(), Table::Products).unwrap().is_empty());
    assert!(snapshots.load::<Category>(&user(), Table::Categories).unwrap().is_empty());
    assert!(snapshots
        .load::<gestora_store::HistoryEntry>(&user(), Table::History)
        .unwrap()
        .is_empty());
    assert!(snapshots.load_stats(&user()).unwrap().is_none());
    assert!(snapshots.last_user().unwrap().is_none());
    assert!(fx.store.is_empty());

    let view = fx.session.view();
    assert!(view.products.is_empty());
    assert_eq!(view.stats.total_products, 0);
    assert_eq!(view.phase, SyncPhase::Idle);
    assert!(view.user.is_none());

    let err = fx
        .session
        .apply(Mutation::Product(TableOp::Insert(martillo())))
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::NoUser));
}

#[tokio::test]
async fn sign_out_clears_the_session() {
    let fx = Fixture::new(SessionOptions::default(), StaticAuth::signed_in("user-1"));
    seed_remote(&fx.remote);
    fx.session.start().await.unwrap();
    assert_eq!(fx.session.view().products.len(), 1);

    fx.session.sign_out().await.unwrap();
    assert!(fx.session.view().products.is_empty());
    assert!(fx.session.current_user().is_none());

    // Next start finds nobody signed in.
    assert!(matches!(fx.session.start().await, Err(InventoryError::NoUser)));
    fx.auth.sign_in("user-2");
    assert!(fx.session.start().await.unwrap().is_synced());
    assert_eq!(fx.session.current_user(), Some(UserId::new("user-2")));
}

#[tokio::test]
async fn going_offline_supersedes_a_slow_sync() {
    let fx = Fixture::new(SessionOptions::default(), StaticAuth::signed_in("user-1"));
    seed_remote(&fx.remote);
    fx.remote.set_latency(RemoteTable::Products, Duration::from_millis(100));

    let (started, offline) = tokio::join!(fx.session.start(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        fx.session.set_online(false).await
    });

    assert!(matches!(started.unwrap(), SyncOutcome::Superseded));
    assert!(matches!(offline, Some(Ok(SyncOutcome::FromCache))));
    let view = fx.session.view();
    assert_eq!(view.phase, SyncPhase::ServingFromCache);
    assert!(view.products.is_empty());
}

#[tokio::test]
async fn write_during_sync_survives_the_commit() {
    let fx = Fixture::new(SessionOptions::default(), StaticAuth::signed_in("user-1"));
    seed_remote(&fx.remote);
    fx.session.start().await.unwrap();
    fx.remote.set_latency(RemoteTable::History, Duration::from_millis(100));

    let (outcome, report) = tokio::join!(fx.session.refresh(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        fx.session
            .apply(Mutation::Product(TableOp::Insert(martillo())))
            .await
    });
    assert!(matches!(report.unwrap().remote, RemoteStatus::Confirmed));
    match outcome.unwrap() {
        SyncOutcome::Synced(counts) => assert_eq!(counts.products, 2),
        other => panic!("unexpected outcome {other:?}"),
    }

    let mut ids: Vec<i64> = fx.session.view().products.iter().map(|p| p.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 10]);

    let cached: Vec<Product> = fx.snapshots().load(&user(), Table::Products).unwrap();
    let mut cached_ids: Vec<i64> = cached.iter().map(|p| p.id).collect();
    cached_ids.sort_unstable();
    assert_eq!(cached_ids, vec![1, 10]);
    assert_eq!(fx.remote.rows(RemoteTable::Products).len(), 2);
    assert_eq!(fx.session.view().historial.len(), 2);
}

#[tokio::test]
async fn reconnect_resyncs_and_replays_outbox() {
    let options = SessionOptions {
        write_policy: WritePolicy::Outbox,
        ..Default::default()
    };
    let fx = Fixture::new(options, StaticAuth::signed_in("user-1"));
    seed_remote(&fx.remote);
    fx.session.start().await.unwrap();

    fx.session.set_online(false).await.unwrap().unwrap();
    let report = fx
        .session
        .apply(Mutation::Product(TableOp::Insert(martillo())))
        .await
        .unwrap();
    assert!(matches!(report.remote, RemoteStatus::Queued));
    assert_eq!(fx.session.pending_writes(), 2);

    match fx.session.set_online(true).await.unwrap().unwrap() {
        SyncOutcome::Synced(counts) => {
            assert_eq!(counts.replayed, 2);
            assert_eq!(counts.products, 2);
            assert_eq!(counts.history, 2);
        }
        other => panic!("expected a committed sync, got {other:?}"),
    }
    assert_eq!(fx.session.pending_writes(), 0);
    assert!(fx.session.view().products.contains(&martillo()));
}

#[tokio::test]
async fn write_behind_loses_offline_writes_on_resync() {
    let fx = Fixture::new(SessionOptions::default(), StaticAuth::signed_in("user-1"));
    seed_remote(&fx.remote);
    fx.session.start().await.unwrap();

    fx.session.set_online(false).await;
    fx.session
        .apply(Mutation::Product(TableOp::Insert(martillo())))
        .await
        .unwrap();
    assert_eq!(fx.session.view().products.len(), 2);

    fx.session.set_online(true).await.unwrap().unwrap();
    let view = fx.session.view();
    assert_eq!(view.products.len(), 1);
    assert_eq!(view.products[0].nombre, "Taladro");
}

#[tokio::test]
async fn listener_drives_connectivity_transitions() {
    let fx = Fixture::new(SessionOptions::default(), StaticAuth::signed_in("user-1"));
    seed_remote(&fx.remote);
    let session = Arc::new(fx.session);
    session.start().await.unwrap();
    let listener = session.spawn_connectivity_listener();

    let mut phase = session.subscribe_phase();
    session.connectivity().set_online(false);
    tokio::time::timeout(
        Duration::from_secs(1),
        phase.wait_for(|p| *p == SyncPhase::ServingFromCache),
    )
    .await
    .unwrap()
    .unwrap();

    session.connectivity().set_online(true);
    tokio::time::timeout(Duration::from_secs(1), phase.wait_for(|p| *p == SyncPhase::Synced))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.view().products.len(), 1);

    drop(phase);
    drop(session);
    tokio::time::timeout(Duration::from_secs(1), listener).await.unwrap().unwrap();
}

#[tokio::test]
async fn no_user_refuses_start_and_mutations() {
    let fx = Fixture::new(SessionOptions::default(), StaticAuth::signed_out());
    assert!(matches!(fx.session.start().await, Err(InventoryError::NoUser)));
    let err = fx
        .session
        .update_categories(vec![Category {
            id: 1,
            nombre: "Herramientas".into(),
        }])
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::NoUser));
    assert!(fx.store.is_empty());
}

#[tokio::test]
async fn outbox_limit_zero_is_rejected() {
    let options = SessionOptions {
        write_policy: WritePolicy::Outbox,
        outbox_limit: 0,
        ..Default::default()
    };
    let result = InventorySession::new(
        options,
        Arc::new(MemoryRemote::new()),
        Arc::new(StaticAuth::signed_out()),
    );
    assert!(result.is_err());
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn snapshots_survive_restart_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gestora.db");

    {
        let remote = Arc::new(MemoryRemote::new());
        seed_remote(&remote);
        let options = SessionOptions {
            snapshot_path: Some(path.clone()),
            ..Default::default()
        };
        let auth = Arc::new(StaticAuth::signed_in("user-1"));
        let session = InventorySession::new(options, remote, auth).unwrap();
        assert!(session.start().await.unwrap().is_synced());
    }

    let options = SessionOptions {
        snapshot_path: Some(path),
        initially_online: false,
        ..Default::default()
    };
    let session = InventorySession::new(
        options,
        Arc::new(MemoryRemote::new()),
        Arc::new(StaticAuth::signed_out()),
    )
    .unwrap();
    assert!(matches!(session.start().await.unwrap(), SyncOutcome::FromCache));

    let view = session.view();
    assert_eq!(view.user, Some(user()));
    assert_eq!(view.products[0].nombre, "Taladro");
    assert_eq!(view.stats.low_stock, 1);
}
