//! Composable capability slices.
//!
//! Each slice is a function for [`crate::Factory::install`]: it reads the
//! capabilities installed before it, wires its own hives to them and to the
//! status coordinator, and registers what it adds. Declaration order is the
//! dependency mechanism — status first, then query, then the data slices
//! that report through it.

mod exporter;
mod loader;
mod paginator;
mod pipeline;
mod query;
mod table;

pub use exporter::{
    exporter_slice, ExportError, ExportFormat, ExportSheet, ExportSink, Exporter, ExporterConfig,
};
pub use loader::{loader_slice, Loader, LoaderConfig};
pub use paginator::{paginator_slice, Batch, PageSource, Paginator, PaginatorConfig};
pub use pipeline::{table_pipeline, TablePipelineConfig};
pub use query::{
    query_slice, FilterDefinition, FilterKind, ListOption, Placement, Query, QueryConfig,
    QueryRecord,
};
pub use table::{table_slice, ColumnDef, SortDir, Table, TableConfig, TableSort};

/// Error type at the collaborator seams (load functions, page sources,
/// export sinks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
