use crate::factory::{ComposeError, Context, Factory};
use crate::slices::exporter::{exporter_slice, ExporterConfig};
use crate::slices::paginator::{paginator_slice, PageSource, PaginatorConfig};
use crate::slices::query::{query_slice, QueryConfig};
use crate::slices::table::{table_slice, TableConfig};
use crate::status::{status_slice, StatusConfig};

/// One config bundle for the standard table stack.
pub struct TablePipelineConfig<S, Item, R> {
    pub status: StatusConfig<R>,
    pub query: Option<QueryConfig>,
    pub paginator: PaginatorConfig<S>,
    pub table: TableConfig<Item>,
    pub exporter: Option<ExporterConfig<Item>>,
}

/// Compose the standard table stack in dependency order:
/// status, query, paginator, table, exporter.
pub fn table_pipeline<S, Item, R>(
    config: TablePipelineConfig<S, Item, R>,
) -> Result<Context, ComposeError>
where
    S: PageSource<Item> + 'static,
    Item: Clone + PartialEq + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    let mut factory = Factory::new().install(status_slice(config.status));
    if let Some(query) = config.query {
        factory = factory.install(query_slice(query));
    }
    factory = factory
        .install(paginator_slice::<S, Item, R>(config.paginator))
        .install(table_slice::<Item>(config.table));
    if let Some(exporter) = config.exporter {
        factory = factory.install(exporter_slice::<Item, R>(exporter));
    }
    factory.build()
}
