//! Integration tests for Apiary

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use serde_json::{json, Value};

use apiary::clock::Clock;
use apiary::slices::{
    exporter_slice, paginator_slice, query_slice, table_slice, Batch, BoxError, ColumnDef,
    ExportFormat, ExportSheet, ExportSink, Exporter, FilterDefinition, FilterKind, PageSource,
    Paginator, Query, QueryConfig, QueryRecord, SortDir, Table, TableConfig, TableSort,
};
use apiary::status::{status_slice, StatusOptions};
use apiary::{
    ComposeError, Context, Factory, Hive, MemoryStorage, Registrations, Status, StatusConfig,
    StorageBackend,
};

// ---- hive ----

#[test]
fn noop_equality() {
    let hive = Hive::new(0);
    let notifications = Arc::new(AtomicUsize::new(0));
    let notifications_clone = notifications.clone();

    let _sub = hive.subscribe(move |_| {
        notifications_clone.fetch_add(1, Ordering::SeqCst);
    });

    hive.set(5);
    hive.set(5);

    assert_eq!(notifications.load(Ordering::SeqCst), 1);
}

#[test]
fn replay_on_subscribe() {
    let hive = Hive::new(1);
    hive.set(2);

    let seen = Arc::new(AtomicUsize::new(0));
    let seen_clone = seen.clone();
    let sub = hive.subscribe(move |n: &i32| {
        seen_clone.store(*n as usize, Ordering::SeqCst);
    });

    // The callback fired synchronously before subscribe returned.
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    sub.unsubscribe();
}

#[test]
fn weak_subscriber_purged_after_owner_drop() {
    let hive = Hive::new(0);
    let owner = Arc::new(());
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();

    hive.subscribe_weak(
        move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        },
        &owner,
    )
    .detach();

    hive.set(1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(hive.subscriber_count(), 1);

    drop(owner);

    // The dead subscriber is skipped and purged by this notification pass.
    hive.set(2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(hive.subscriber_count(), 0);
}

#[test]
fn panicking_subscriber_does_not_stop_the_rest() {
    let hive = Hive::new(0);
    let reached = Arc::new(AtomicUsize::new(0));
    let reached_clone = reached.clone();

    let _first = hive.subscribe(|_: &i32| panic!("defective listener"));
    let _second = hive.subscribe(move |_| {
        reached_clone.fetch_add(1, Ordering::SeqCst);
    });

    hive.set(1);
    assert_eq!(reached.load(Ordering::SeqCst), 1);
}

#[test]
fn storage_hydration_replaces_initial() {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
    storage.set("counter", &json!(7));

    let hive: Hive<i32> = Hive::with_storage(0, "counter", storage.clone());
    assert_eq!(hive.get(), 7);

    // A corrupt snapshot is ignored and the initial value stands.
    storage.set("broken", &json!("not a number"));
    let fallback: Hive<i32> = Hive::with_storage(3, "broken", storage);
    assert_eq!(fallback.get(), 3);
}

#[test]
fn storage_persists_changes_and_clears() {
    let storage = Arc::new(MemoryStorage::new());
    let backend: Arc<dyn StorageBackend> = storage.clone();

    let hive: Hive<i32> = Hive::with_storage(0, "counter", backend);
    hive.set(41);
    assert_eq!(storage.get("counter"), Some(json!(41)));

    hive.clear_store();
    assert_eq!(hive.get(), 0);
    assert_eq!(storage.get("counter"), None);
}

// ---- composition ----

struct Alpha(i32);
struct Beta(i32);

#[test]
fn composition_end_to_end() {
    let ctx = Factory::new()
        .install(|_: &Context| Ok(Registrations::single(Alpha(1))))
        .install(|ctx: &Context| {
            let alpha = ctx.get::<Alpha>()?;
            Ok(Registrations::single(Beta(alpha.0 + 1)))
        })
        .build()
        .unwrap();

    assert_eq!(ctx.get::<Alpha>().unwrap().0, 1);
    assert_eq!(ctx.get::<Beta>().unwrap().0, 2);
}

#[test]
fn composition_order_is_not_independent() {
    // Beta's producer now runs second, so the first slice must fail.
    let result = Factory::new()
        .install(|ctx: &Context| {
            let beta = ctx.get::<Beta>()?;
            Ok(Registrations::single(Alpha(beta.0 + 1)))
        })
        .install(|_: &Context| Ok(Registrations::single(Beta(1))))
        .build();

    assert!(matches!(result, Err(ComposeError::MissingCapability(_))));
}

#[test]
fn slice_error_aborts_composition() {
    let ran = Arc::new(AtomicUsize::new(0));
    let ran_clone = ran.clone();

    let result = Factory::new()
        .install(|_: &Context| Err(ComposeError::SliceFailed("bad slice".to_string())))
        .install(move |_: &Context| {
            ran_clone.fetch_add(1, Ordering::SeqCst);
            Ok(Registrations::new())
        })
        .build();

    assert!(result.is_err());
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

// ---- status coordinator ----

fn coordinator() -> (Status<&'static str>, apiary::clock::ManualClock) {
    let (clock, handle) = Clock::manual();
    let status = Status::new(StatusConfig {
        clock,
        ..StatusConfig::default()
    });
    (status, handle)
}

#[test]
fn priority_resolution() {
    let (status, _) = coordinator();

    status.operation("A").error(json!({}));
    status.operation("B").loading(json!({}));

    assert_eq!(status.primary().unwrap().operation, "A");

    status.operation("A").idle();
    assert_eq!(status.primary().unwrap().operation, "B");

    status.operation("B").idle();
    assert!(status.primary().is_none());
}

#[test]
fn timeout_eviction() {
    let (status, clock) = coordinator();

    status.operation("x").set_with(
        "loading",
        json!({}),
        StatusOptions {
            timeout: Some(Duration::from_millis(100)),
        },
    );
    assert!(status.get_state("x").is_some());

    clock.advance(Duration::from_millis(100));
    assert!(status.get_state("x").is_none());
}

#[test]
fn timeout_supersession() {
    let (status, clock) = coordinator();
    let timeout = StatusOptions {
        timeout: Some(Duration::from_millis(100)),
    };

    status.operation("x").set_with("loading", json!({}), timeout);

    clock.advance(Duration::from_millis(50));
    status.operation("x").set_with("saving", json!({}), timeout);

    // Past the first deadline: the record survives, it was superseded.
    clock.advance(Duration::from_millis(60));
    let record = status.get_state("x").unwrap();
    assert_eq!(record.status_type, "saving");

    // 100ms after the second call it expires.
    clock.advance(Duration::from_millis(40));
    assert!(status.get_state("x").is_none());
}

#[test]
fn stale_records_hook_and_evict() {
    let (clock, handle) = Clock::manual();
    let stale_ops = Arc::new(Mutex::new(Vec::new()));
    let stale_ops_clone = stale_ops.clone();

    let status: Status<&'static str> = Status::new(StatusConfig {
        clock,
        stale_timeout: Some(Duration::from_secs(30)),
        on_stale: Some(Arc::new(move |record| {
            stale_ops_clone.lock().unwrap().push(record.operation.clone());
        })),
        ..StatusConfig::default()
    });

    status.operation("sync").loading(json!({}));

    handle.advance(Duration::from_secs(29));
    assert!(status.is_active("sync"));

    handle.advance(Duration::from_secs(1));
    assert!(!status.is_active("sync"));
    assert_eq!(stale_ops.lock().unwrap().as_slice(), ["sync"]);
}

#[test]
fn refresh_defers_staleness() {
    let (clock, handle) = Clock::manual();
    let status: Status<&'static str> = Status::new(StatusConfig {
        clock,
        stale_timeout: Some(Duration::from_secs(10)),
        ..StatusConfig::default()
    });

    status.operation("sync").loading(json!({}));
    handle.advance(Duration::from_secs(8));
    status.operation("sync").loading(json!({"refreshed": true}));

    handle.advance(Duration::from_secs(8));
    assert!(status.is_active("sync"));

    handle.advance(Duration::from_secs(2));
    assert!(!status.is_active("sync"));
}

#[test]
fn observers_see_fresh_snapshots() {
    let (status, _) = coordinator();
    let snapshots = Arc::new(AtomicUsize::new(0));
    let snapshots_clone = snapshots.clone();

    status
        .hive()
        .subscribe(move |_| {
            snapshots_clone.fetch_add(1, Ordering::SeqCst);
        })
        .detach();

    status.operation("a").loading(json!({}));
    status.operation("b").saving(json!({}));
    status.operation("a").idle();

    assert_eq!(snapshots.load(Ordering::SeqCst), 3);
}

// ---- full slice stack ----

#[derive(Clone, Debug, PartialEq)]
struct Row {
    id: u32,
    name: &'static str,
    score: i64,
}

const ROWS: &[Row] = &[
    Row { id: 1, name: "drone", score: 10 },
    Row { id: 2, name: "worker", score: 30 },
    Row { id: 3, name: "queen", score: 20 },
];

/// Serves `ROWS` one item per page, filtered by the `min_score` query
/// parameter.
struct RowSource {
    cursor: AtomicUsize,
    min_score: Mutex<i64>,
}

impl RowSource {
    fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
            min_score: Mutex::new(i64::MIN),
        }
    }

    fn matching(&self) -> Vec<Row> {
        let min = *self.min_score.lock().unwrap();
        ROWS.iter().filter(|r| r.score >= min).cloned().collect()
    }

    fn page(&self, index: usize) -> Result<Batch<Row>, BoxError> {
        let matching = self.matching();
        let items = matching.get(index).cloned().into_iter().collect();
        Ok(Batch {
            items,
            has_more: index + 1 < matching.len(),
        })
    }
}

impl PageSource<Row> for RowSource {
    fn load(&self, query: Option<&QueryRecord>) -> Result<Batch<Row>, BoxError> {
        let min = query
            .and_then(|q| q.get("min_score"))
            .and_then(Value::as_i64)
            .unwrap_or(i64::MIN);
        *self.min_score.lock().unwrap() = min;
        self.cursor.store(0, Ordering::SeqCst);
        self.page(0)
    }

    fn load_more(&self) -> Result<Batch<Row>, BoxError> {
        let next = self.cursor.fetch_add(1, Ordering::SeqCst) + 1;
        self.page(next)
    }

    fn limit(&self) -> usize {
        1
    }
}

#[derive(Default)]
struct CaptureSink {
    delivered: Mutex<Vec<(String, ExportFormat, ExportSheet)>>,
}

impl ExportSink for CaptureSink {
    fn deliver(&self, filename: &str, format: ExportFormat, sheet: &ExportSheet) -> Result<(), BoxError> {
        self.delivered
            .lock()
            .unwrap()
            .push((filename.to_string(), format, sheet.clone()));
        Ok(())
    }
}

fn row_columns() -> Vec<ColumnDef<Row>> {
    vec![
        ColumnDef::new("name", |r: &Row| json!(r.name)).exportable(),
        ColumnDef::new("score", |r: &Row| json!(r.score)).header("Score").exportable(),
    ]
}

fn build_stack(sink: Arc<CaptureSink>) -> Context {
    Factory::new()
        .install(status_slice(StatusConfig::<&'static str>::default()))
        .install(query_slice(QueryConfig {
            filters: vec![FilterDefinition::new("min_score", FilterKind::Number)],
            validators: Vec::new(),
            on_change: None,
        }))
        .install(paginator_slice::<RowSource, Row, &'static str>(
            apiary::slices::PaginatorConfig::new(RowSource::new()),
        ))
        .install(table_slice::<Row>(TableConfig::new(row_columns(), |r| {
            r.id.to_string()
        })))
        .install(exporter_slice::<Row, &'static str>(
            apiary::slices::ExporterConfig::new(sink).filename("rows"),
        ))
        .build()
        .unwrap()
}

#[test]
fn stack_loads_through_query_changes() {
    let ctx = build_stack(Arc::new(CaptureSink::default()));

    let paginator = ctx.get::<Paginator<Row>>().unwrap();
    // Initial load happened during composition.
    assert_eq!(paginator.hive().get(), vec![ROWS[0].clone()]);
    assert!(paginator.can_load_more().get());

    paginator.load_more().unwrap();
    paginator.load_more().unwrap();
    assert_eq!(paginator.hive().get().len(), 3);
    assert!(!paginator.can_load_more().get());

    // A query change restarts the source with the new filter.
    let query = ctx.get::<Query>().unwrap();
    query.update("min_score", json!(20)).unwrap();
    let rows = paginator.hive().get();
    assert_eq!(rows, vec![ROWS[1].clone()]);

    let status = ctx.get::<Status<&'static str>>().unwrap();
    assert!(status.primary().is_none());
}

#[test]
fn stack_table_views_and_selection() {
    let ctx = build_stack(Arc::new(CaptureSink::default()));

    let paginator = ctx.get::<Paginator<Row>>().unwrap();
    paginator.load_more().unwrap();
    paginator.load_more().unwrap();

    let table = ctx.get::<Table<Row>>().unwrap();
    table.set_sorting(vec![TableSort {
        column: "score".to_string(),
        dir: SortDir::Desc,
    }]);

    let sorted: Vec<i64> = table.sorted_rows().iter().map(|r| r.score).collect();
    assert_eq!(sorted, vec![30, 20, 10]);
    // Unsorted view keeps arrival order.
    let unsorted: Vec<u32> = table.view_rows(false).iter().map(|r| r.id).collect();
    assert_eq!(unsorted, vec![1, 2, 3]);

    table.toggle_selection(&ROWS[0]);
    assert!(!table.is_all_selected());
    table.toggle_all_selection();
    assert!(table.is_all_selected());
    table.toggle_all_selection();
    assert!(table.selected_hive().get().is_empty());
}

#[test]
fn stack_exports_through_table_columns() {
    let sink = Arc::new(CaptureSink::default());
    let ctx = build_stack(sink.clone());

    let paginator = ctx.get::<Paginator<Row>>().unwrap();
    paginator.load_more().unwrap();
    paginator.load_more().unwrap();

    let exporter = ctx.get::<Exporter>().unwrap();
    exporter.download(ExportFormat::Csv).unwrap();

    let delivered = sink.delivered.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    let (filename, format, sheet) = &delivered[0];
    assert_eq!(filename, "rows.csv");
    assert_eq!(*format, ExportFormat::Csv);
    assert_eq!(sheet.headers, vec!["name", "Score"]);
    assert_eq!(sheet.rows.len(), 3);
    assert_eq!(sheet.rows[0], vec![json!("drone"), json!(10)]);
}

#[test]
fn table_persists_column_visibility() {
    let storage = Arc::new(MemoryStorage::new());

    let build = |storage: Arc<MemoryStorage>| {
        Factory::new()
            .install(status_slice(StatusConfig::<&'static str>::default()))
            .install(paginator_slice::<RowSource, Row, &'static str>(
                apiary::slices::PaginatorConfig::new(RowSource::new()),
            ))
            .install(table_slice::<Row>(
                TableConfig::new(row_columns(), |r: &Row| r.id.to_string())
                    .persist_columns("rows", storage),
            ))
            .build()
            .unwrap()
    };

    let ctx = build(storage.clone());
    let table = ctx.get::<Table<Row>>().unwrap();
    table.toggle_column("score");
    assert_eq!(table.visible_columns().len(), 1);

    // A rebuilt stack restores the persisted visibility.
    let ctx2 = build(storage);
    let table2 = ctx2.get::<Table<Row>>().unwrap();
    let visible: Vec<String> = table2.visible_columns().iter().map(|c| c.id.clone()).collect();
    assert_eq!(visible, vec!["name".to_string()]);

    table2.reset_columns();
    assert_eq!(table2.visible_columns().len(), 2);
}
