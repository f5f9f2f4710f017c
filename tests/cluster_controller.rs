//! Cluster controller behavior under virtual time.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sourcekeeper::cluster::{
    default_external_name, ClusterController, ControllerState, External, ManagedExternal,
};
use sourcekeeper::settings::{Attribute, AttributeKind, DataSource, SourceListScan};

mod common;

use common::{quiet_cluster, registry_with, FakeTransport};

type Journal = Arc<Mutex<Vec<(String, External)>>>;

fn controller_with(
    cluster: sourcekeeper::settings::Cluster,
    transport: Arc<FakeTransport>,
    initial: Vec<ManagedExternal>,
) -> (Arc<ClusterController>, Journal) {
    let (registry, _builds) = registry_with(transport);
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&journal);
    let controller = ClusterController::new(
        cluster,
        &registry,
        initial,
        Arc::new(move |name, external| sink.lock().unwrap().push((name, external))),
        Arc::new(default_external_name),
    )
    .unwrap();
    (controller, journal)
}

#[tokio::test(start_paused = true)]
async fn test_connection_retry_spacing() {
    common::init_logging();
    let transport = FakeTransport::new();
    transport.fail_connects.store(3, Ordering::SeqCst);

    let (controller, _journal) = controller_with(quiet_cluster("druid-east"), Arc::clone(&transport), vec![]);
    controller.init().await;

    assert_eq!(controller.state(), ControllerState::Connected);
    assert_eq!(transport.connect_attempts.load(Ordering::SeqCst), 4);
    assert_eq!(controller.version().as_deref(), Some("26.0.0"));

    let times = transport.attempt_times.lock().unwrap().clone();
    for pair in times.windows(2) {
        let spacing = pair[1] - pair[0];
        assert!(spacing >= Duration::from_millis(1));
        assert_eq!(spacing, Duration::from_millis(30_000));
    }
}

#[tokio::test]
async fn test_scan_is_idempotent_against_unchanged_source_list() {
    let transport = FakeTransport::new();
    transport.set_sources(&["wikipedia", "events"]);

    let (controller, _journal) = controller_with(quiet_cluster("druid-east"), Arc::clone(&transport), vec![]);
    controller.init().await;
    assert_eq!(controller.managed_externals().await.len(), 2);

    controller.scan_source_list().await;
    let managed = controller.managed_externals().await;
    assert_eq!(managed.len(), 2);
    assert_eq!(transport.list_calls.load(Ordering::SeqCst), 2);
    assert!(managed.iter().all(|m| m.auto_discovered));
}

#[tokio::test]
async fn test_scan_matches_on_locator_not_display_name() {
    let transport = FakeTransport::new();
    transport.set_sources(&["tables/wikipedia.parquet"]);

    // configured under a different display name but the same locator
    let configured = ManagedExternal {
        name: "wiki-main".to_string(),
        external: External::new("tables/wikipedia.parquet"),
        auto_discovered: false,
        suppress_introspection: false,
    };
    let (controller, _journal) =
        controller_with(quiet_cluster("druid-east"), Arc::clone(&transport), vec![configured]);
    controller.init().await;

    let managed = controller.managed_externals().await;
    assert_eq!(managed.len(), 1);
    assert_eq!(managed[0].name, "wiki-main");
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_never_arms_timer_even_with_auto_scan() {
    let transport = FakeTransport::new();
    transport.set_sources(&["wikipedia"]);

    let cluster = quiet_cluster("druid-east");
    assert_eq!(cluster.source_list_scan, SourceListScan::Auto);
    let (controller, _journal) = controller_with(cluster, Arc::clone(&transport), vec![]);
    controller.init().await;
    assert_eq!(transport.list_calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(transport.list_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_source_list_timer_fires_on_interval() {
    let transport = FakeTransport::new();
    let mut cluster = quiet_cluster("druid-east");
    cluster.source_list_refresh_interval_ms = 15_000;

    let (controller, _journal) = controller_with(cluster, Arc::clone(&transport), vec![]);
    controller.init().await;
    assert_eq!(transport.list_calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(15_100)).await;
    assert_eq!(transport.list_calls.load(Ordering::SeqCst), 2);
    tokio::time::sleep(Duration::from_millis(15_000)).await;
    assert_eq!(transport.list_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_interval_change_rearms_timer() {
    let transport = FakeTransport::new();
    let mut cluster = quiet_cluster("druid-east");
    cluster.source_list_refresh_interval_ms = 60_000;

    let (controller, _journal) = controller_with(cluster.clone(), Arc::clone(&transport), vec![]);
    controller.init().await;
    assert_eq!(transport.list_calls.load(Ordering::SeqCst), 1);

    cluster.source_list_refresh_interval_ms = 5_000;
    controller.update_cluster(cluster);

    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(transport.list_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reintrospect_timer_rescans_source_list_by_default() {
    let transport = FakeTransport::new();
    transport.set_sources(&["wikipedia"]);
    let mut cluster = quiet_cluster("druid-east");
    cluster.source_reintrospect_interval_ms = 120_000;
    assert!(cluster.reintrospect_rescans_source_list);

    let (controller, _journal) = controller_with(cluster, Arc::clone(&transport), vec![]);
    controller.init().await;
    assert_eq!(transport.list_calls.load(Ordering::SeqCst), 1);
    let introspections = transport.introspections_of("wikipedia");

    tokio::time::sleep(Duration::from_millis(120_100)).await;
    // the tick rescanned rather than re-introspecting the known source
    assert_eq!(transport.list_calls.load(Ordering::SeqCst), 2);
    assert_eq!(transport.introspections_of("wikipedia"), introspections);
}

#[tokio::test(start_paused = true)]
async fn test_reintrospect_timer_targeted_mode() {
    let transport = FakeTransport::new();
    transport.set_sources(&["wikipedia"]);
    let mut cluster = quiet_cluster("druid-east");
    cluster.source_reintrospect_interval_ms = 120_000;
    cluster.reintrospect_rescans_source_list = false;

    let (controller, _journal) = controller_with(cluster, Arc::clone(&transport), vec![]);
    controller.init().await;
    let introspections = transport.introspections_of("wikipedia");

    tokio::time::sleep(Duration::from_millis(120_100)).await;
    assert_eq!(transport.list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(transport.introspections_of("wikipedia"), introspections + 1);
}

#[tokio::test]
async fn test_introspection_failure_leaves_siblings_and_schema_intact() {
    let transport = FakeTransport::new();
    transport.set_sources(&["good", "bad"]);
    transport.set_schema("good", vec![Attribute::new("page", AttributeKind::String)]);
    transport.fail_introspection("bad");

    let (controller, journal) = controller_with(quiet_cluster("druid-east"), Arc::clone(&transport), vec![]);
    controller.init().await;

    let good = controller.get_external_by_name("good").await.unwrap();
    assert_eq!(good.attributes.len(), 1);
    let bad = controller.get_external_by_name("bad").await.unwrap();
    assert!(bad.attributes.is_empty());

    let journal = journal.lock().unwrap();
    assert_eq!(journal.len(), 1);
    assert_eq!(journal[0].0, "good");
}

#[tokio::test]
async fn test_suppressed_source_is_never_introspected() {
    let transport = FakeTransport::new();
    let data_source = {
        let mut ds = DataSource::new("manual", "druid-east", "manual_table");
        ds.options.suppress_introspection = true;
        ds
    };
    let initial = vec![ManagedExternal::from_data_source(&data_source)];

    let (controller, journal) = controller_with(quiet_cluster("druid-east"), Arc::clone(&transport), initial);
    controller.init().await;

    assert_eq!(transport.introspections_of("manual_table"), 0);
    assert!(journal.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_get_external_by_name_not_found() {
    let transport = FakeTransport::new();
    let (controller, _journal) = controller_with(quiet_cluster("druid-east"), transport, vec![]);
    controller.init().await;
    assert!(controller.get_external_by_name("missing").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_destroy_interrupts_inflight_retry() {
    let transport = FakeTransport::new();
    transport.fail_connects.store(u32::MAX, Ordering::SeqCst);

    let (controller, _journal) = controller_with(quiet_cluster("druid-east"), Arc::clone(&transport), vec![]);
    let running = Arc::clone(&controller);
    let handle = tokio::spawn(async move { running.init().await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    controller.destroy();
    controller.destroy(); // idempotent

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("init should return once destroyed")
        .unwrap();
    assert_eq!(controller.state(), ControllerState::Destroyed);
    assert_eq!(transport.connect_attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_disarms_timers() {
    let transport = FakeTransport::new();
    let mut cluster = quiet_cluster("druid-east");
    cluster.source_list_refresh_interval_ms = 15_000;

    let (controller, _journal) = controller_with(cluster, Arc::clone(&transport), vec![]);
    controller.init().await;
    tokio::time::sleep(Duration::from_millis(15_100)).await;
    let ticks = transport.list_calls.load(Ordering::SeqCst);

    controller.destroy();
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(transport.list_calls.load(Ordering::SeqCst), ticks);
}

#[tokio::test]
async fn test_refresh_is_gated_by_on_load_flags() {
    let transport = FakeTransport::new();
    transport.set_sources(&["wikipedia"]);
    let mut cluster = quiet_cluster("druid-east");
    cluster.source_list_refresh_on_load = false;
    cluster.source_reintrospect_on_load = false;

    let (controller, _journal) = controller_with(cluster.clone(), Arc::clone(&transport), vec![]);
    controller.init().await;
    let lists = transport.list_calls.load(Ordering::SeqCst);

    controller.refresh().await;
    assert_eq!(transport.list_calls.load(Ordering::SeqCst), lists);

    cluster.source_list_refresh_on_load = true;
    controller.update_cluster(cluster);
    controller.refresh().await;
    assert_eq!(transport.list_calls.load(Ordering::SeqCst), lists + 1);
}
