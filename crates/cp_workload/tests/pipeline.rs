mod common;

use std::time::Duration;

use cp_store::{MapKey, MemoryCpSubsystem};
use cp_workload::{
    write_report, CpMapBenchmark, KeyMode, MapSelection, OpKind, OperationWeights, PreloadStatus,
    RunBudget, RunReport, WorkloadConfig,
};

use common::{mixed_weights, setup, small_config};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn filled_maps_survive_a_mixed_workload() {
    let store = MemoryCpSubsystem::new();
    let config = WorkloadConfig {
        cp_groups: 2,
        maps: 4,
        keys: 1000,
        weights: mixed_weights(),
        iterations: Some(500),
        ..small_config()
    };
    let bench = setup(&store, config).await;

    let preload = bench.prepare().await.expect("fill_on_prepare is on");
    assert_eq!(preload.status, PreloadStatus::Completed);
    assert_eq!(preload.tasks_failed, 0);
    assert_eq!(preload.keys_loaded, 4 * 1000);

    let outcome = bench.run(RunBudget::Iterations(500)).await.expect("run");
    assert_eq!(outcome.workers.len(), 4);
    assert_eq!(outcome.iterations, 4 * 500);
    assert!(outcome.failures.is_empty());
    // CAS is skipped (and not counted) when its read finds nothing.
    assert!(outcome.aggregate.total.total() <= 4 * 500);
    assert!(outcome.aggregate.total.get > 0);
    for kind in OpKind::ALL {
        let per_worker = outcome.workers.iter().map(|c| c.count(kind)).sum::<u64>();
        assert_eq!(outcome.aggregate.total.count(kind), per_worker, "{kind:?}");
    }

    let report = bench.verify(&outcome).await.expect("every map keeps data");
    assert_eq!(report.maps.len(), 4);
    assert!(report.maps.iter().all(|m| m.entries > 0));

    assert_eq!(store.group_names(), ["cpgroup-0", "cpgroup-1"]);
    assert_eq!(store.map_names("cpgroup-0"), ["map0", "map2"]);
    assert_eq!(store.map_names("cpgroup-1"), ["map1", "map3"]);
}

#[tokio::test]
async fn emptied_map_fails_verification() {
    let store = MemoryCpSubsystem::new();
    let config = WorkloadConfig {
        maps: 1,
        keys: 5,
        threads: 1,
        fill_on_prepare: false,
        weights: OperationWeights::only(OpKind::Delete),
        ..small_config()
    };
    let bench = setup(&store, config).await;
    assert!(bench.prepare().await.is_none());

    let outcome = bench.run(RunBudget::Iterations(20)).await.expect("run");
    assert_eq!(outcome.aggregate.total.delete, 20);

    let err = bench.verify(&outcome).await.unwrap_err().to_string();
    assert!(err.contains("map0@default"), "{err}");
    assert!(err.contains("delete=20"), "{err}");
}

#[tokio::test]
async fn cas_is_only_issued_after_a_successful_read() {
    let store = MemoryCpSubsystem::new();
    let config = WorkloadConfig {
        maps: 1,
        keys: 1,
        threads: 1,
        fill_on_prepare: false,
        weights: OperationWeights::only(OpKind::Cas),
        ..small_config()
    };
    let bench = setup(&store, config).await;

    let outcome = bench.run(RunBudget::Iterations(10)).await.expect("run");
    assert_eq!(outcome.aggregate.total.cas, 0);
    assert_eq!(store.stats().gets, 10);
    assert_eq!(store.stats().cas_attempts, 0);

    let map = bench.workload().maps.get(0).map();
    map.set(MapKey::Int(0), bytes::Bytes::from_static(b"seed"))
        .await
        .expect("seed key");

    let outcome = bench.run(RunBudget::Iterations(10)).await.expect("run");
    assert_eq!(outcome.aggregate.total.cas, 10);
    let stats = store.stats();
    assert_eq!(stats.cas_attempts, 10);
    // A single worker never races itself.
    assert_eq!(stats.cas_successes, 10);
}

#[tokio::test]
async fn round_robin_selection_touches_every_map() {
    let store = MemoryCpSubsystem::new();
    let config = WorkloadConfig {
        cp_groups: 3,
        maps: 3,
        keys: 1,
        threads: 1,
        fill_on_prepare: false,
        map_selection: MapSelection::RoundRobin,
        ..small_config()
    };
    let bench = setup(&store, config).await;

    bench.run(RunBudget::Iterations(3)).await.expect("run");
    for name in ["map0@cpgroup-0", "map1@cpgroup-1", "map2@cpgroup-2"] {
        assert_eq!(store.entry_count(name).unwrap(), 1, "{name}");
    }
    assert_eq!(store.stats().sets, 3);
}

#[tokio::test]
async fn prefixed_keys_are_loaded_and_verified() {
    let store = MemoryCpSubsystem::new();
    let config = WorkloadConfig {
        maps: 1,
        keys: 100,
        key_mode: KeyMode::Prefixed,
        key_size_bytes: 40,
        weights: OperationWeights::only(OpKind::Get),
        ..small_config()
    };
    let bench = setup(&store, config).await;
    bench.prepare().await.expect("preload");
    assert_eq!(store.entry_count("map0@default").unwrap(), 100);

    let outcome = bench.run(RunBudget::Iterations(50)).await.expect("run");
    let report = bench.verify(&outcome).await.expect("verify");
    assert_eq!(report.maps[0].entries, 100);
}

#[tokio::test]
async fn prefixed_keys_that_cannot_fit_abort_setup() {
    let store = MemoryCpSubsystem::new();
    let config = WorkloadConfig {
        key_mode: KeyMode::Prefixed,
        key_size_bytes: 16,
        keys: 100,
        ..small_config()
    };
    let err = CpMapBenchmark::setup(config, &store)
        .await
        .err()
        .expect("setup must fail");
    assert!(format!("{err:#}").contains("does not fit"), "{err:#}");
}

#[tokio::test]
async fn unreachable_store_aborts_setup() {
    let store = MemoryCpSubsystem::new();
    store.set_available(false);
    let result = CpMapBenchmark::setup(small_config(), &store).await;
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_errors_fail_fast() {
    let store = MemoryCpSubsystem::new();
    let bench = setup(&store, small_config()).await;
    store.set_available(false);

    let err = bench.run(RunBudget::Iterations(10)).await.unwrap_err();
    assert!(err.to_string().contains("failed"), "{err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_errors_are_reported_without_fail_fast() {
    let store = MemoryCpSubsystem::new();
    let config = WorkloadConfig {
        fail_fast: false,
        ..small_config()
    };
    let bench = setup(&store, config).await;
    store.set_available(false);

    let outcome = bench.run(RunBudget::Iterations(10)).await.expect("run");
    assert_eq!(outcome.failures.len(), 4);
    assert_eq!(outcome.aggregate.workers, 4);
    assert_eq!(outcome.aggregate.total.total(), 0);
    assert!(outcome.failures[0].error.contains("unavailable"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duration_budget_ends_the_run() {
    let store = MemoryCpSubsystem::new();
    let config = WorkloadConfig {
        threads: 2,
        iterations: None,
        duration: Duration::from_millis(100),
        ..small_config()
    };
    let bench = setup(&store, config).await;

    let outcome = bench.run(bench.config().budget()).await.expect("run");
    assert!(outcome.iterations > 0);
    assert!(outcome.elapsed >= Duration::from_millis(100));
    assert!(outcome.elapsed < Duration::from_secs(10));
}

#[tokio::test]
async fn run_report_is_written_as_json() {
    let store = MemoryCpSubsystem::new();
    let bench = setup(&store, small_config()).await;
    let preload = bench.prepare().await;
    let outcome = bench.run(RunBudget::Iterations(5)).await.expect("run");
    let verification = bench.verify(&outcome).await.expect("verify");

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("report.json");
    let report = RunReport::new(&bench, preload, &outcome, Some(verification));
    write_report(&path, &report).expect("write report");

    let data = std::fs::read(&path).expect("read report");
    let json: serde_json::Value = serde_json::from_slice(&data).expect("parse report");
    assert_eq!(json["name"], "CpMapTest");
    assert_eq!(json["total"]["set"], 20);
    assert_eq!(json["workers"].as_array().map(|w| w.len()), Some(4));
    assert_eq!(json["preload"]["status"], "completed");
    assert_eq!(json["groups"][0], "default");
}

#[tokio::test]
async fn failed_run_report_still_lists_the_empty_map() {
    let store = MemoryCpSubsystem::new();
    let config = WorkloadConfig {
        maps: 2,
        keys: 5,
        threads: 1,
        fill_on_prepare: false,
        map_selection: MapSelection::RoundRobin,
        weights: OperationWeights::only(OpKind::Set),
        ..small_config()
    };
    let bench = setup(&store, config).await;
    let outcome = bench.run(RunBudget::Iterations(1)).await.expect("run");

    let scanned = bench.scan(&outcome).await.expect("scan");
    assert!(!scanned.passed());
    let err = scanned
        .check(&bench.config().name, &outcome.aggregate)
        .unwrap_err()
        .to_string();
    assert!(err.contains("map1@default"), "{err}");

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("report.json");
    let report = RunReport::new(&bench, None, &outcome, Some(scanned));
    write_report(&path, &report).expect("write report");

    let data = std::fs::read(&path).expect("read report");
    let json: serde_json::Value = serde_json::from_slice(&data).expect("parse report");
    let maps = &json["verification"]["maps"];
    assert_eq!(maps[0]["map"], "map0@default");
    assert_eq!(maps[0]["entries"], 1);
    assert_eq!(maps[1]["map"], "map1@default");
    assert_eq!(maps[1]["entries"], 0);
}
