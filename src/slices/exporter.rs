use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;

use crate::factory::{ComposeError, Context, Registrations};
use crate::slices::loader::Loader;
use crate::slices::paginator::Paginator;
use crate::slices::table::{ColumnDef, Table};
use crate::slices::BoxError;
use crate::status::{Status, StatusPort};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

/// The assembled export: header row plus one value row per item.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportSheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Delivery collaborator. Byte-level CSV/XLSX encoding and download or
/// share mechanics live behind this seam, outside the state layer.
pub trait ExportSink: Send + Sync {
    fn deliver(&self, filename: &str, format: ExportFormat, sheet: &ExportSheet) -> Result<(), BoxError>;
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no export columns configured")]
    NoColumns,
    #[error("export data provider failed: {0}")]
    Provider(String),
    #[error("export sink failed: {0}")]
    Sink(String),
}

type DataProvider<Item> = Arc<dyn Fn() -> Result<Vec<Item>, BoxError> + Send + Sync>;
type Prepare<Item> = Arc<
    dyn Fn(Vec<Item>, Vec<ColumnDef<Item>>) -> (Vec<Item>, Vec<ColumnDef<Item>>) + Send + Sync,
>;

/// Configuration for [`exporter_slice`].
pub struct ExporterConfig<Item> {
    sink: Arc<dyn ExportSink>,
    columns: Option<Vec<ColumnDef<Item>>>,
    data_provider: Option<DataProvider<Item>>,
    filename: String,
    use_status: bool,
    prepare: Option<Prepare<Item>>,
}

impl<Item> ExporterConfig<Item> {
    pub fn new(sink: Arc<dyn ExportSink>) -> Self {
        Self {
            sink,
            columns: None,
            data_provider: None,
            filename: "export".to_string(),
            use_status: true,
            prepare: None,
        }
    }

    /// Export these columns instead of the table's export-flagged ones.
    pub fn columns(mut self, columns: Vec<ColumnDef<Item>>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Pull items from this provider instead of the paginator/loader hive.
    pub fn data_provider(
        mut self,
        provider: impl Fn() -> Result<Vec<Item>, BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.data_provider = Some(Arc::new(provider));
        self
    }

    /// Base filename; the format's extension is appended.
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn without_status(mut self) -> Self {
        self.use_status = false;
        self
    }

    /// Rewrite items and columns just before the sheet is assembled.
    pub fn prepare(
        mut self,
        prepare: impl Fn(Vec<Item>, Vec<ColumnDef<Item>>) -> (Vec<Item>, Vec<ColumnDef<Item>>)
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.prepare = Some(Arc::new(prepare));
        self
    }
}

type DownloadFn = Arc<dyn Fn(ExportFormat) -> Result<(), ExportError> + Send + Sync>;

/// Export capability. Item-erased: the UI only ever asks for a download.
#[derive(Clone)]
pub struct Exporter {
    download: DownloadFn,
}

impl Exporter {
    /// Assemble the sheet from the current rows and columns and hand it to
    /// the sink.
    pub fn download(&self, format: ExportFormat) -> Result<(), ExportError> {
        (self.download)(format)
    }
}

enum ExportRows<Item> {
    Provider(DataProvider<Item>),
    Paginator(Paginator<Item>),
    Loader(Loader<Vec<Item>>),
}

impl<Item: Clone + PartialEq + Send + Sync + 'static> ExportRows<Item> {
    fn resolve(&self) -> Result<Vec<Item>, ExportError> {
        match self {
            ExportRows::Provider(provider) => {
                provider().map_err(|err| ExportError::Provider(err.to_string()))
            }
            ExportRows::Paginator(paginator) => Ok(paginator.hive().get()),
            ExportRows::Loader(loader) => Ok(loader.hive().get().unwrap_or_default()),
        }
    }
}

fn assemble<Item>(items: &[Item], columns: &[ColumnDef<Item>]) -> ExportSheet {
    let headers = columns.iter().map(|c| c.header_text().to_string()).collect();
    let rows = items
        .iter()
        .map(|item| columns.iter().map(|c| c.value_of(item)).collect())
        .collect();
    ExportSheet { headers, rows }
}

/// Slice function installing an [`Exporter`] capability.
///
/// Rows come from the config's data provider, else the paginator, else a
/// `Loader<Vec<Item>>`; columns from the config, else the table's
/// export-flagged set. The run is wrapped in the default operation's
/// status when a status slice is present.
pub fn exporter_slice<Item, R>(
    config: ExporterConfig<Item>,
) -> impl FnOnce(&Context) -> Result<Registrations, ComposeError>
where
    Item: Clone + PartialEq + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    move |ctx: &Context| {
        let rows = if let Some(provider) = config.data_provider {
            ExportRows::Provider(provider)
        } else if let Some(paginator) = ctx.try_get::<Paginator<Item>>() {
            ExportRows::Paginator(paginator.clone())
        } else if let Some(loader) = ctx.try_get::<Loader<Vec<Item>>>() {
            ExportRows::Loader(loader.clone())
        } else {
            return Err(ComposeError::SliceFailed(
                "exporter slice requires a data provider, paginator, or loader".to_string(),
            ));
        };

        let table = ctx.try_get::<Table<Item>>().cloned();
        let status = ctx
            .try_get::<Status<R>>()
            .filter(|_| config.use_status)
            .map(StatusPort::new);

        let sink = config.sink;
        let fixed_columns = config.columns;
        let prepare = config.prepare;
        let filename = config.filename;

        let run = move |format: ExportFormat| -> Result<(), ExportError> {
            let mut items = rows.resolve()?;
            let mut columns = match &fixed_columns {
                Some(cols) => cols.clone(),
                None => table.as_ref().map(Table::export_columns).unwrap_or_default(),
            };

            if let Some(prepare) = &prepare {
                (items, columns) = prepare(items, columns);
            }

            if columns.is_empty() {
                return Err(ExportError::NoColumns);
            }

            let sheet = assemble(&items, &columns);
            let filename = format!("{}.{}", filename, format.extension());
            sink.deliver(&filename, format, &sheet)
                .map_err(|err| ExportError::Sink(err.to_string()))
        };

        let download: DownloadFn = Arc::new(move |format| match &status {
            Some(port) => {
                port.set(crate::status::DEFAULT_OPERATION, "loading", json!({ "title": "exporting" }));
                match run(format) {
                    Ok(()) => {
                        port.idle(crate::status::DEFAULT_OPERATION);
                        Ok(())
                    }
                    Err(err) => {
                        port.set(
                            crate::status::DEFAULT_OPERATION,
                            "error",
                            json!({ "title": "export failed", "message": err.to_string() }),
                        );
                        Err(err)
                    }
                }
            }
            None => run(format),
        });

        Ok(Registrations::single(Exporter { download }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Captures delivered sheets instead of encoding them.
    #[derive(Default)]
    pub(super) struct CaptureSink {
        pub delivered: Mutex<Vec<(String, ExportFormat, ExportSheet)>>,
    }

    impl ExportSink for CaptureSink {
        fn deliver(
            &self,
            filename: &str,
            format: ExportFormat,
            sheet: &ExportSheet,
        ) -> Result<(), BoxError> {
            self.delivered
                .lock()
                .unwrap()
                .push((filename.to_string(), format, sheet.clone()));
            Ok(())
        }
    }

    #[test]
    fn provider_and_fixed_columns_need_no_upstream_slices() {
        let sink = Arc::new(CaptureSink::default());
        let ctx = crate::factory::Factory::new()
            .install(exporter_slice::<u32, ()>(
                ExporterConfig::new(sink.clone())
                    .data_provider(|| Ok(vec![1, 2]))
                    .columns(vec![ColumnDef::new("n", |n: &u32| json!(n)).exportable()])
                    .filename("numbers"),
            ))
            .build()
            .unwrap();

        let exporter = ctx.get::<Exporter>().unwrap();
        exporter.download(ExportFormat::Csv).unwrap();

        let delivered = sink.delivered.lock().unwrap();
        let (filename, format, sheet) = &delivered[0];
        assert_eq!(filename, "numbers.csv");
        assert_eq!(*format, ExportFormat::Csv);
        assert_eq!(sheet.headers, vec!["n"]);
        assert_eq!(sheet.rows, vec![vec![json!(1)], vec![json!(2)]]);
    }

    #[test]
    fn empty_columns_is_an_error() {
        let sink = Arc::new(CaptureSink::default());
        let ctx = crate::factory::Factory::new()
            .install(exporter_slice::<u32, ()>(
                ExporterConfig::new(sink)
                    .data_provider(|| Ok(vec![1]))
                    .columns(Vec::new()),
            ))
            .build()
            .unwrap();

        let exporter = ctx.get::<Exporter>().unwrap();
        assert!(matches!(
            exporter.download(ExportFormat::Xlsx),
            Err(ExportError::NoColumns)
        ));
    }
}
