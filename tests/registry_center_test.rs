//! Registry center operations against the in-memory ensemble

mod common;

use common::{eventually, unique_namespace, RegistryFixture};
use futures::future::join_all;
use std::time::Duration;
use tasker_registry::{CacheShutdown, CoordinationError, CreateMode, RegistryError};

#[tokio::test]
async fn test_absent_paths_read_as_absent() {
    let fixture = RegistryFixture::new(&unique_namespace("absent"));
    let center = fixture.started().await;

    assert_eq!(center.get("/nope").await.unwrap(), None);
    assert_eq!(center.get_directly("/nope").await.unwrap(), None);
    assert!(!center.is_existed("/nope").await.unwrap());
    assert_eq!(center.get_num_children("/nope").await.unwrap(), 0);
    center.remove("/nope").await.unwrap();

    center.close().await.unwrap();
}

#[tokio::test]
async fn test_persist_then_read_directly() {
    let fixture = RegistryFixture::new(&unique_namespace("persist"));
    let center = fixture.started().await;

    center.persist("/config/db/url", "jdbc:host1").await.unwrap();
    assert_eq!(
        center.get_directly("/config/db/url").await.unwrap().as_deref(),
        Some("jdbc:host1")
    );
    assert!(center.is_existed("/config/db").await.unwrap());
    assert_eq!(center.get_directly("/config/db").await.unwrap().as_deref(), Some(""));

    center.close().await.unwrap();
}

#[tokio::test]
async fn test_persist_is_idempotent_and_overwrites() {
    let fixture = RegistryFixture::new(&unique_namespace("idempotent"));
    let center = fixture.started().await;

    center.persist("/k", "v1").await.unwrap();
    let nodes = fixture.ensemble().node_count();
    center.persist("/k", "v1").await.unwrap();
    assert_eq!(fixture.ensemble().node_count(), nodes);

    center.persist("/k", "v2").await.unwrap();
    assert_eq!(center.get_directly("/k").await.unwrap().as_deref(), Some("v2"));

    center.close().await.unwrap();
}

#[tokio::test]
async fn test_update_replaces_existing_value() {
    let fixture = RegistryFixture::new(&unique_namespace("update"));
    let center = fixture.started().await;

    center.persist("/leader/host", "a").await.unwrap();
    center.update("/leader/host", "b").await.unwrap();
    assert_eq!(
        center.get_directly("/leader/host").await.unwrap().as_deref(),
        Some("b")
    );

    center.close().await.unwrap();
}

#[tokio::test]
async fn test_update_on_missing_key_fails_without_side_effects() {
    let fixture = RegistryFixture::new(&unique_namespace("update-missing"));
    let center = fixture.started().await;
    let nodes = fixture.ensemble().node_count();

    let err = center.update("/absent/leaf", "v").await.unwrap_err();
    assert!(matches!(
        err.coordination_error().map(CoordinationError::root_cause),
        Some(CoordinationError::NoNode { .. })
    ));
    assert_eq!(fixture.ensemble().node_count(), nodes);
    assert!(!center.is_existed("/absent").await.unwrap());

    center.close().await.unwrap();
}

#[tokio::test]
async fn test_persist_ephemeral_twice_leaves_one_node() {
    let fixture = RegistryFixture::new(&unique_namespace("ephemeral"));
    let center = fixture.started().await;

    center.persist_ephemeral("/servers/s1", "first").await.unwrap();
    center.persist_ephemeral("/servers/s1", "second").await.unwrap();

    assert_eq!(center.get_children_keys("/servers").await.unwrap(), vec!["s1"]);
    assert_eq!(
        center.get_directly("/servers/s1").await.unwrap().as_deref(),
        Some("second")
    );

    center.close().await.unwrap();
}

#[tokio::test]
async fn test_persist_ephemeral_replaces_persistent_subtree() {
    let fixture = RegistryFixture::new(&unique_namespace("ephemeral-replace"));
    let center = fixture.started().await;

    center.persist("/instance/state/detail", "old").await.unwrap();
    center.persist_ephemeral("/instance", "online").await.unwrap();

    assert!(!center.is_existed("/instance/state").await.unwrap());
    let stat = fixture
        .ensemble()
        .peek(&format!("/{}/instance", center.config().namespace))
        .unwrap()
        .1;
    assert_ne!(stat.ephemeral_owner, 0);

    center.close().await.unwrap();
}

#[tokio::test]
async fn test_ephemeral_nodes_vanish_with_their_session() {
    let namespace = unique_namespace("ephemeral-session");
    let fixture = RegistryFixture::new(&namespace);
    let owner = fixture.started().await;
    let observer = RegistryFixture::on_ensemble(fixture.ensemble(), &namespace)
        .started()
        .await;

    owner.persist_ephemeral("/servers/s1", "up").await.unwrap();
    assert!(observer.is_existed("/servers/s1").await.unwrap());

    owner.close().await.unwrap();
    assert!(!observer.is_existed("/servers/s1").await.unwrap());
    assert!(observer.is_existed("/servers").await.unwrap());

    observer.close().await.unwrap();
}

#[tokio::test]
async fn test_sequential_nodes_get_increasing_suffixes() {
    let fixture = RegistryFixture::new(&unique_namespace("sequential"));
    let center = fixture.started().await;

    let mut created = Vec::new();
    for _ in 0..3 {
        created.push(center.persist_ephemeral_sequential("/latch/member-").await.unwrap());
    }
    assert_eq!(
        created,
        vec![
            "/latch/member-0000000000",
            "/latch/member-0000000001",
            "/latch/member-0000000002"
        ]
    );
    assert_eq!(center.get_num_children("/latch").await.unwrap(), 3);
    assert_eq!(center.get_directly(&created[0]).await.unwrap().as_deref(), Some(""));

    let persistent = center.persist_sequential("/history/run-", "ok").await.unwrap();
    assert!(persistent.starts_with("/history/run-"));
    center.close().await.unwrap();

    let reopened = fixture.started().await;
    assert_eq!(reopened.get_num_children("/latch").await.unwrap(), 0);
    assert_eq!(reopened.get_directly(&persistent).await.unwrap().as_deref(), Some("ok"));
    reopened.close().await.unwrap();
}

#[tokio::test]
async fn test_remove_deletes_whole_subtree() {
    let fixture = RegistryFixture::new(&unique_namespace("remove"));
    let center = fixture.started().await;

    for key in ["/jobs/a/config", "/jobs/a/servers/s1", "/jobs/b"] {
        center.persist(key, "x").await.unwrap();
    }
    center.remove("/jobs/a").await.unwrap();

    assert!(!center.is_existed("/jobs/a").await.unwrap());
    assert!(!center.is_existed("/jobs/a/servers/s1").await.unwrap());
    assert_eq!(center.get_children_keys("/jobs").await.unwrap(), vec!["b"]);

    center.close().await.unwrap();
}

#[tokio::test]
async fn test_children_keys_of_missing_parent_is_error() {
    let fixture = RegistryFixture::new(&unique_namespace("children"));
    let center = fixture.started().await;

    let err = center.get_children_keys("/missing").await.unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Coordination(CoordinationError::NoNode { .. })
    ));

    center.close().await.unwrap();
}

#[tokio::test]
async fn test_get_falls_back_before_cache_catches_up() {
    let fixture = RegistryFixture::new(&unique_namespace("fallback"));
    let center = fixture.started().await;

    // Slow the service so the cache worker lags behind the write
    fixture.ensemble().set_latency(Duration::from_millis(50));
    center.persist("/fresh", "value").await.unwrap();
    assert_eq!(center.get("/fresh").await.unwrap().as_deref(), Some("value"));

    fixture.ensemble().set_latency(Duration::ZERO);
    let cache = center.cache_handle().unwrap();
    assert!(
        eventually(|| {
            cache
                .current_data("/fresh")
                .unwrap()
                .is_some_and(|entry| entry.data == b"value")
        })
        .await
    );

    center.close().await.unwrap();
}

#[tokio::test]
async fn test_cache_observes_changes_from_other_sessions() {
    let namespace = unique_namespace("mirror");
    let fixture = RegistryFixture::new(&namespace);
    let reader = fixture.started().await;
    let writer = RegistryFixture::on_ensemble(fixture.ensemble(), &namespace)
        .started()
        .await;

    writer.persist("/config/limit", "10").await.unwrap();
    let cache = reader.cache_handle().unwrap();
    assert!(
        eventually(|| {
            cache
                .current_data("/config/limit")
                .unwrap()
                .is_some_and(|entry| entry.data == b"10")
        })
        .await
    );
    assert_eq!(reader.get("/config/limit").await.unwrap().as_deref(), Some("10"));

    writer.remove("/config").await.unwrap();
    assert!(eventually(|| cache.current_data("/config").unwrap().is_none()).await);
    assert_eq!(reader.get("/config/limit").await.unwrap(), None);

    writer.close().await.unwrap();
    reader.close().await.unwrap();
}

#[tokio::test]
async fn test_registry_center_time_tracks_service_clock() {
    let fixture = RegistryFixture::new(&unique_namespace("time"));
    let center = fixture.started().await;

    let before = chrono::Utc::now() - chrono::Duration::seconds(5);
    let time = center.get_registry_center_time("/systemTime/current").await.unwrap();
    assert!(time >= before);
    assert!(time <= chrono::Utc::now() + chrono::Duration::seconds(5));
    assert!(center.is_existed("/systemTime/current").await.unwrap());

    center.close().await.unwrap();
}

#[tokio::test]
async fn test_repeated_init_close_cycles_release_resources() {
    let fixture = RegistryFixture::new(&unique_namespace("cycles"));
    let center = fixture.center();

    for round in 0..3 {
        center.init().await.unwrap();
        center.persist_ephemeral("/alive", &round.to_string()).await.unwrap();
        assert_eq!(fixture.ensemble().active_sessions(), 1);
        assert_eq!(fixture.ensemble().watch_count(), 1);

        assert_eq!(center.close().await.unwrap(), CacheShutdown::Drained);
        assert_eq!(fixture.ensemble().active_sessions(), 0);
        assert_eq!(fixture.ensemble().watch_count(), 0);
    }
    assert!(matches!(center.get("/alive").await, Err(RegistryError::NotStarted)));
}

#[tokio::test]
async fn test_close_reports_cache_that_did_not_drain_in_time() {
    let fixture = RegistryFixture::new(&unique_namespace("wedged"))
        .with_cache_shutdown_timeout(20);
    let center = fixture.started().await;

    // The worker's refresh read for this write stalls on the latency
    fixture.ensemble().set_latency(Duration::from_millis(500));
    center.persist("/slow", "v").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(center.close().await.unwrap(), CacheShutdown::TimedOut);
    assert_eq!(fixture.ensemble().active_sessions(), 0);
    assert!(!center.is_started());
    fixture.ensemble().set_latency(Duration::ZERO);
}

#[tokio::test]
async fn test_concurrent_init_starts_exactly_once() {
    let fixture = RegistryFixture::new(&unique_namespace("concurrent-init"));
    let center = fixture.center();

    let (first, second) = tokio::join!(center.init(), center.init());
    let started = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(started, 1);
    assert!(matches!(
        first.err().or(second.err()),
        Some(RegistryError::AlreadyStarted)
    ));
    assert_eq!(fixture.ensemble().active_sessions(), 1);

    center.close().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_persists_all_land() {
    let fixture = RegistryFixture::new(&unique_namespace("concurrent-persist"));
    let center = fixture.started().await;

    let keys: Vec<String> = (0..16).map(|i| format!("/workers/w{i}")).collect();
    let results = join_all(keys.iter().map(|key| center.persist(key, "ready"))).await;
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(center.get_num_children("/workers").await.unwrap(), 16);

    center.close().await.unwrap();
}

#[tokio::test]
async fn test_connect_retries_then_succeeds() {
    let fixture = RegistryFixture::new(&unique_namespace("retry"));
    fixture.ensemble().fail_next_connects(2);

    let center = fixture.center();
    center.init().await.unwrap();
    assert_eq!(fixture.ensemble().connect_attempts(), 3);
    center.close().await.unwrap();
}

#[tokio::test]
async fn test_connect_retries_exhausted_leaves_center_stopped() {
    let fixture = RegistryFixture::new(&unique_namespace("exhausted")).with_retry(1, 2, 2);
    fixture.ensemble().fail_next_connects(10);

    let center = fixture.center();
    let err = center.init().await.unwrap_err();
    assert!(matches!(
        err,
        RegistryError::ConnectRetriesExhausted { attempts: 3, .. }
    ));
    assert!(!center.is_started());
    assert_eq!(fixture.ensemble().active_sessions(), 0);
}

#[tokio::test]
async fn test_digest_restricts_nodes_to_their_creator() {
    let namespace = unique_namespace("acl");
    let fixture = RegistryFixture::new(&namespace).with_digest("alice:secret");
    let owner = fixture.started().await;
    owner.persist("/private", "mine").await.unwrap();

    let stranger = RegistryFixture::on_ensemble(fixture.ensemble(), &namespace)
        .with_digest("bob:secret")
        .center();
    stranger.init().await.unwrap();

    let err = stranger.get_directly("/private").await.unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Coordination(CoordinationError::NoAuth { .. })
    ));
    let err = stranger.persist("/intruder", "x").await.unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Coordination(CoordinationError::NoAuth { .. })
    ));
    assert_eq!(owner.get_directly("/private").await.unwrap().as_deref(), Some("mine"));

    stranger.close().await.unwrap();
    owner.close().await.unwrap();
}

#[tokio::test]
async fn test_session_handle_supports_recipes() {
    let fixture = RegistryFixture::new(&unique_namespace("recipes"));
    let center = fixture.started().await;
    let session = center.session_handle().unwrap();

    let first = session
        .create("/lock/lease-", b"", CreateMode::EphemeralSequential)
        .await
        .unwrap();
    let second = session
        .create("/lock/lease-", b"", CreateMode::EphemeralSequential)
        .await
        .unwrap();
    let children = session.children("/lock").await.unwrap();
    assert_eq!(children.len(), 2);
    assert!(first.ends_with(&children[0]));
    assert!(second.ends_with(&children[1]));

    let (_, stat) = session.data(&first).await.unwrap().unwrap();
    assert_eq!(stat.ephemeral_owner, session.session_id());
    session.delete_version(&first, stat.version).await.unwrap();
    assert!(session.exists(&first).await.unwrap().is_none());

    session.delete("/lock").await.unwrap();
    assert!(session.exists("/lock").await.unwrap().is_none());

    center.close().await.unwrap();
}

#[tokio::test]
async fn test_session_expiry_surfaces_on_operations() {
    let fixture = RegistryFixture::new(&unique_namespace("expiry"));
    let center = fixture.started().await;
    let session_id = center.session_handle().unwrap().session_id();

    assert!(fixture.ensemble().expire_session(session_id));
    let err = center.get_directly("/anything").await.unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Coordination(CoordinationError::SessionExpired)
    ));
    assert!(!err.is_configuration_error());

    center.close().await.unwrap();
}
