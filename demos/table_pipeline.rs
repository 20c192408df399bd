//! Demonstration of the full slice stack: query -> paginator -> table ->
//! exporter, with status reported throughout

use std::sync::{Arc, Mutex};

use apiary::slices::{
    table_pipeline, Batch, BoxError, ColumnDef, ExportFormat, ExportSheet, ExportSink, Exporter,
    ExporterConfig, FilterDefinition, FilterKind, PageSource, Paginator, PaginatorConfig, Query,
    QueryConfig, QueryRecord, SortDir, Table, TableConfig, TablePipelineConfig, TableSort,
};
use apiary::StatusConfig;
use serde_json::{json, Value};

#[derive(Clone, Debug, PartialEq)]
struct Bee {
    id: u32,
    name: &'static str,
    honey: i64,
}

const HIVE_ROSTER: &[Bee] = &[
    Bee { id: 1, name: "willow", honey: 12 },
    Bee { id: 2, name: "clover", honey: 40 },
    Bee { id: 3, name: "aspen", honey: 25 },
    Bee { id: 4, name: "sage", honey: 31 },
];

/// Pages through the roster two bees at a time, honoring a `min_honey`
/// query parameter.
struct RosterSource {
    cursor: Mutex<usize>,
    min_honey: Mutex<i64>,
}

impl RosterSource {
    fn new() -> Self {
        Self {
            cursor: Mutex::new(0),
            min_honey: Mutex::new(i64::MIN),
        }
    }

    fn matching(&self) -> Vec<Bee> {
        let min = *self.min_honey.lock().unwrap();
        HIVE_ROSTER.iter().filter(|b| b.honey >= min).cloned().collect()
    }

    fn page(&self, start: usize) -> Result<Batch<Bee>, BoxError> {
        let matching = self.matching();
        let items: Vec<Bee> = matching.iter().skip(start).take(2).cloned().collect();
        Ok(Batch {
            has_more: start + items.len() < matching.len(),
            items,
        })
    }
}

impl PageSource<Bee> for RosterSource {
    fn load(&self, query: Option<&QueryRecord>) -> Result<Batch<Bee>, BoxError> {
        let min = query
            .and_then(|q| q.get("min_honey"))
            .and_then(Value::as_i64)
            .unwrap_or(i64::MIN);
        *self.min_honey.lock().unwrap() = min;
        *self.cursor.lock().unwrap() = 2;
        self.page(0)
    }

    fn load_more(&self) -> Result<Batch<Bee>, BoxError> {
        let start = {
            let mut cursor = self.cursor.lock().unwrap();
            let start = *cursor;
            *cursor += 2;
            start
        };
        self.page(start)
    }

    fn limit(&self) -> usize {
        2
    }
}

/// Prints delivered sheets instead of encoding files.
struct PrintSink;

impl ExportSink for PrintSink {
    fn deliver(&self, filename: &str, _format: ExportFormat, sheet: &ExportSheet) -> Result<(), BoxError> {
        println!("delivering {filename}: {:?}", sheet.headers);
        for row in &sheet.rows {
            println!("  {row:?}");
        }
        Ok(())
    }
}

fn main() {
    let ctx = table_pipeline(TablePipelineConfig {
        status: StatusConfig::<&'static str>::default(),
        query: Some(QueryConfig {
            filters: vec![FilterDefinition::new("min_honey", FilterKind::Number)],
            validators: Vec::new(),
            on_change: None,
        }),
        paginator: PaginatorConfig::new(RosterSource::new()),
        table: TableConfig::new(
            vec![
                ColumnDef::new("name", |b: &Bee| json!(b.name)).exportable(),
                ColumnDef::new("honey", |b: &Bee| json!(b.honey)).header("Honey").exportable(),
            ],
            |b| b.id.to_string(),
        ),
        exporter: Some(ExporterConfig::new(Arc::new(PrintSink)).filename("roster")),
    })
    .expect("pipeline composes");

    let paginator = ctx.get::<Paginator<Bee>>().unwrap();
    let table = ctx.get::<Table<Bee>>().unwrap();

    println!("first page: {:?}", table.raw_rows());
    paginator.load_more().unwrap();
    println!("all rows: {:?}", table.raw_rows());

    table.set_sorting(vec![TableSort {
        column: "honey".to_string(),
        dir: SortDir::Desc,
    }]);
    println!("by honey: {:?}", table.sorted_rows());

    // Narrow the query; the paginator reloads automatically.
    let query = ctx.get::<Query>().unwrap();
    query.update("min_honey", json!(30)).unwrap();
    println!("min_honey >= 30: {:?}", table.raw_rows());

    let exporter = ctx.get::<Exporter>().unwrap();
    exporter.download(ExportFormat::Csv).unwrap();
}
