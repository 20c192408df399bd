use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::factory::{ComposeError, Context, Registrations};
use crate::hive::Hive;
use crate::slices::loader::Loader;
use crate::slices::paginator::Paginator;
use crate::storage::StorageBackend;

type Accessor<Item> = Arc<dyn Fn(&Item) -> Value + Send + Sync>;

/// One table column: identity, presentation flags, and the accessor that
/// projects a row into a sortable/exportable value.
pub struct ColumnDef<Item> {
    pub id: String,
    pub header: Option<String>,
    pub visible: bool,
    /// Rendered in rows but never in the header (action columns).
    pub hide_in_header: bool,
    pub export: bool,
    accessor: Accessor<Item>,
}

impl<Item> Clone for ColumnDef<Item> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            header: self.header.clone(),
            visible: self.visible,
            hide_in_header: self.hide_in_header,
            export: self.export,
            accessor: Arc::clone(&self.accessor),
        }
    }
}

impl<Item> ColumnDef<Item> {
    pub fn new(id: impl Into<String>, accessor: impl Fn(&Item) -> Value + Send + Sync + 'static) -> Self {
        Self {
            id: id.into(),
            header: None,
            visible: true,
            hide_in_header: false,
            export: false,
            accessor: Arc::new(accessor),
        }
    }

    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn hide_in_header(mut self) -> Self {
        self.hide_in_header = true;
        self
    }

    pub fn exportable(mut self) -> Self {
        self.export = true;
        self
    }

    /// Header text, falling back to the column id.
    pub fn header_text(&self) -> &str {
        self.header.as_deref().unwrap_or(&self.id)
    }

    pub fn value_of(&self, item: &Item) -> Value {
        (self.accessor)(item)
    }
}

// Equality ignores the accessor: two columns are the same column when
// identity and presentation state match.
impl<Item> PartialEq for ColumnDef<Item> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.header == other.header
            && self.visible == other.visible
            && self.hide_in_header == other.hide_in_header
            && self.export == other.export
    }
}

/// Persisted slice of a column: just identity and visibility.
#[derive(Serialize, Deserialize)]
struct StoredColumn {
    id: String,
    visible: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableSort {
    pub column: String,
    pub dir: SortDir,
}

type IdOf<Item> = Arc<dyn Fn(&Item) -> String + Send + Sync>;
type RowFilter<Item> = Arc<dyn Fn(&Item) -> bool + Send + Sync>;

/// Configuration for [`table_slice`].
pub struct TableConfig<Item> {
    columns: Vec<ColumnDef<Item>>,
    id_of: IdOf<Item>,
    store_key: Option<String>,
    storage: Option<Arc<dyn StorageBackend>>,
    restore_from_store: bool,
    row_filter: Option<RowFilter<Item>>,
    pub show_index: bool,
    pub show_checkbox: bool,
}

impl<Item> TableConfig<Item> {
    pub fn new(
        columns: Vec<ColumnDef<Item>>,
        id_of: impl Fn(&Item) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            columns,
            id_of: Arc::new(id_of),
            store_key: None,
            storage: None,
            restore_from_store: true,
            row_filter: None,
            show_index: true,
            show_checkbox: false,
        }
    }

    /// Persist column visibility under `key` through `backend`.
    pub fn persist_columns(mut self, key: impl Into<String>, backend: Arc<dyn StorageBackend>) -> Self {
        self.store_key = Some(format!("table_columns_{}", key.into()));
        self.storage = Some(backend);
        self
    }

    /// Skip restoring persisted visibility at composition time.
    pub fn without_restore(mut self) -> Self {
        self.restore_from_store = false;
        self
    }

    /// Hide rows failing the predicate from every derived view.
    pub fn row_filter(mut self, predicate: impl Fn(&Item) -> bool + Send + Sync + 'static) -> Self {
        self.row_filter = Some(Arc::new(predicate));
        self
    }

    pub fn show_checkbox(mut self) -> Self {
        self.show_checkbox = true;
        self
    }
}

/// Where the table reads its rows from.
enum RowSource<Item> {
    Paginator(Hive<Vec<Item>>),
    Loader(Hive<Option<Vec<Item>>>),
}

impl<Item: Clone + PartialEq + Send + Sync + 'static> RowSource<Item> {
    fn rows(&self) -> Vec<Item> {
        match self {
            RowSource::Paginator(hive) => hive.get(),
            RowSource::Loader(hive) => hive.get().unwrap_or_default(),
        }
    }
}

struct TableInner<Item> {
    source: RowSource<Item>,
    defaults: Vec<ColumnDef<Item>>,
    columns: Hive<Vec<ColumnDef<Item>>>,
    selected: Hive<BTreeMap<String, Item>>,
    sorting: Hive<Vec<TableSort>>,
    id_of: IdOf<Item>,
    store_key: Option<String>,
    storage: Option<Arc<dyn StorageBackend>>,
    row_filter: Option<RowFilter<Item>>,
}

/// Table capability: column state, selection, sorting, and derived row
/// views over the upstream paginator or loader rows.
pub struct Table<Item> {
    inner: Arc<TableInner<Item>>,
    pub show_index: bool,
    pub show_checkbox: bool,
}

impl<Item> Clone for Table<Item> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            show_index: self.show_index,
            show_checkbox: self.show_checkbox,
        }
    }
}

impl<Item: Clone + PartialEq + Send + Sync + 'static> Table<Item> {
    pub fn columns_hive(&self) -> Hive<Vec<ColumnDef<Item>>> {
        self.inner.columns.clone()
    }

    pub fn selected_hive(&self) -> Hive<BTreeMap<String, Item>> {
        self.inner.selected.clone()
    }

    pub fn sorting_hive(&self) -> Hive<Vec<TableSort>> {
        self.inner.sorting.clone()
    }

    // ---- columns ----

    /// Columns currently shown: visible ones plus header-hidden ones.
    pub fn visible_columns(&self) -> Vec<ColumnDef<Item>> {
        self.inner
            .columns
            .with(|cols| cols.iter().filter(|c| c.visible || c.hide_in_header).cloned().collect())
    }

    /// Columns flagged for export.
    pub fn export_columns(&self) -> Vec<ColumnDef<Item>> {
        self.inner
            .columns
            .with(|cols| cols.iter().filter(|c| c.export).cloned().collect())
    }

    /// Overlay visibility from `cols` onto the configured defaults and
    /// persist the result.
    pub fn set_visible_columns(&self, cols: &[ColumnDef<Item>]) {
        let updated: Vec<ColumnDef<Item>> = self
            .inner
            .defaults
            .iter()
            .map(|base| match cols.iter().find(|c| c.id == base.id) {
                Some(changed) => changed.clone(),
                None => base.clone(),
            })
            .collect();
        self.save_columns(&updated);
        self.inner.columns.set(updated);
    }

    pub fn toggle_column(&self, column_id: &str) {
        let next: Vec<ColumnDef<Item>> = self.inner.columns.with(|cols| {
            cols.iter()
                .map(|c| {
                    let mut c = c.clone();
                    if c.id == column_id {
                        c.visible = !c.visible;
                    }
                    c
                })
                .collect()
        });
        self.save_columns(&next);
        self.inner.columns.set(next);
    }

    /// Set every column's visibility; `None` shows all.
    pub fn toggle_all_columns(&self, visible: Option<bool>) {
        let target = visible.unwrap_or(true);
        let next: Vec<ColumnDef<Item>> = self.inner.columns.with(|cols| {
            cols.iter()
                .map(|c| {
                    let mut c = c.clone();
                    c.visible = target;
                    c
                })
                .collect()
        });
        self.save_columns(&next);
        self.inner.columns.set(next);
    }

    /// Back to the configured defaults, dropping the persisted state.
    pub fn reset_columns(&self) {
        if let (Some(key), Some(storage)) = (&self.inner.store_key, &self.inner.storage) {
            storage.clear(key);
        }
        self.inner.columns.set(self.inner.defaults.clone());
    }

    /// Re-apply the persisted visibility over the defaults.
    pub fn restore_columns(&self) {
        let restored = restore(&self.inner.defaults, self.inner.store_key.as_deref(), self.inner.storage.as_deref());
        self.inner.columns.set(restored);
    }

    fn save_columns(&self, cols: &[ColumnDef<Item>]) {
        let (Some(key), Some(storage)) = (&self.inner.store_key, &self.inner.storage) else {
            return;
        };
        let stored: Vec<StoredColumn> = cols
            .iter()
            .map(|c| StoredColumn {
                id: c.id.clone(),
                visible: c.visible,
            })
            .collect();
        match serde_json::to_value(&stored) {
            Ok(json) => storage.set(key, &json),
            Err(err) => tracing::debug!(%err, "column state not persisted"),
        }
    }

    // ---- selection ----

    pub fn set_selected(&self, selected: BTreeMap<String, Item>) {
        self.inner.selected.set(selected);
    }

    pub fn toggle_selection(&self, item: &Item) {
        let id = (self.inner.id_of)(item);
        self.inner.selected.update(|prev| {
            let mut next = prev.clone();
            if next.remove(&id).is_none() {
                next.insert(id.clone(), item.clone());
            }
            next
        });
    }

    pub fn select_all(&self) {
        let rows = self.raw_rows();
        let mut selected = BTreeMap::new();
        for row in rows {
            selected.insert((self.inner.id_of)(&row), row);
        }
        self.inner.selected.set(selected);
    }

    pub fn unselect_all(&self) {
        self.inner.selected.set(BTreeMap::new());
    }

    pub fn is_all_selected(&self) -> bool {
        let rows = self.raw_rows();
        if rows.is_empty() {
            return false;
        }
        self.inner
            .selected
            .with(|selected| rows.iter().all(|row| selected.contains_key(&(self.inner.id_of)(row))))
    }

    pub fn toggle_all_selection(&self) {
        if self.is_all_selected() {
            self.unselect_all();
        } else {
            self.select_all();
        }
    }

    // ---- sorting ----

    pub fn set_sorting(&self, sorts: Vec<TableSort>) {
        self.inner.sorting.set(sorts);
    }

    pub fn add_sort(&self, sort: TableSort) {
        self.inner.sorting.update(|prev| {
            let mut next = prev.clone();
            next.push(sort.clone());
            next
        });
    }

    pub fn clear_sorting(&self) {
        self.inner.sorting.set(Vec::new());
    }

    // ---- rows ----

    pub fn raw_rows(&self) -> Vec<Item> {
        self.inner.source.rows()
    }

    pub fn filtered_rows(&self) -> Vec<Item> {
        let rows = self.raw_rows();
        match &self.inner.row_filter {
            Some(filter) => rows.into_iter().filter(|r| filter(r)).collect(),
            None => rows,
        }
    }

    pub fn sorted_rows(&self) -> Vec<Item> {
        let mut rows = self.filtered_rows();
        let sorts = self.inner.sorting.get();
        if sorts.is_empty() {
            return rows;
        }
        let columns = self.inner.columns.get();
        rows.sort_by(|a, b| {
            for sort in &sorts {
                let Some(column) = columns.iter().find(|c| c.id == sort.column) else {
                    continue;
                };
                let ordering = compare_values(&column.value_of(a), &column.value_of(b));
                let ordering = match sort.dir {
                    SortDir::Asc => ordering,
                    SortDir::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        rows
    }

    pub fn view_rows(&self, apply_sorting: bool) -> Vec<Item> {
        if apply_sorting {
            self.sorted_rows()
        } else {
            self.filtered_rows()
        }
    }
}

/// Total order over JSON values for sorting: null first, then booleans,
/// numbers, strings, everything else by serialized text.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            _ => 4,
        }
    }

    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ if rank(a) != rank(b) => rank(a).cmp(&rank(b)),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn restore<Item>(
    defaults: &[ColumnDef<Item>],
    store_key: Option<&str>,
    storage: Option<&dyn StorageBackend>,
) -> Vec<ColumnDef<Item>> {
    let stored: Option<Vec<StoredColumn>> = store_key
        .zip(storage)
        .and_then(|(key, backend)| backend.get(key))
        .and_then(|json| serde_json::from_value(json).ok());

    let mut columns: Vec<ColumnDef<Item>> = defaults.to_vec();
    if let Some(stored) = stored {
        for column in &mut columns {
            if let Some(saved) = stored.iter().find(|s| s.id == column.id) {
                column.visible = saved.visible;
            }
        }
    }
    columns
}

/// Slice function installing a [`Table`] capability.
///
/// Reads rows from a `Paginator<Item>` if one is installed, otherwise from
/// a `Loader<Vec<Item>>`; neither present fails composition.
pub fn table_slice<Item>(
    config: TableConfig<Item>,
) -> impl FnOnce(&Context) -> Result<Registrations, ComposeError>
where
    Item: Clone + PartialEq + Send + Sync + 'static,
{
    move |ctx: &Context| {
        let source = if let Some(paginator) = ctx.try_get::<Paginator<Item>>() {
            RowSource::Paginator(paginator.hive())
        } else if let Some(loader) = ctx.try_get::<Loader<Vec<Item>>>() {
            RowSource::Loader(loader.hive())
        } else {
            return Err(ComposeError::SliceFailed(
                "table slice requires a paginator or loader slice".to_string(),
            ));
        };

        let defaults = config.columns;
        let initial = if config.restore_from_store {
            restore(&defaults, config.store_key.as_deref(), config.storage.as_deref())
        } else {
            defaults.clone()
        };

        let table = Table {
            inner: Arc::new(TableInner {
                source,
                columns: Hive::new(initial),
                defaults,
                selected: Hive::new(BTreeMap::new()),
                sorting: Hive::new(Vec::new()),
                id_of: config.id_of,
                store_key: config.store_key,
                storage: config.storage,
                row_filter: config.row_filter,
            }),
            show_index: config.show_index,
            show_checkbox: config.show_checkbox,
        };

        Ok(Registrations::single(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compare(a: Value, b: Value) -> Ordering {
        compare_values(&a, &b)
    }

    #[test]
    fn value_ordering() {
        assert_eq!(compare(json!(null), json!(1)), Ordering::Less);
        assert_eq!(compare(json!(2), json!(10)), Ordering::Less);
        assert_eq!(compare(json!("ant"), json!("bee")), Ordering::Less);
        assert_eq!(compare(json!(true), json!(false)), Ordering::Greater);
        assert_eq!(compare(json!(1.5), json!(1.5)), Ordering::Equal);
    }

    #[test]
    fn restore_merges_visibility() {
        use crate::storage::MemoryStorage;

        let storage = MemoryStorage::new();
        storage.set(
            "cols",
            &json!([{ "id": "name", "visible": false }, { "id": "ghost", "visible": true }]),
        );

        let defaults = vec![
            ColumnDef::<u32>::new("name", |n| json!(n)),
            ColumnDef::<u32>::new("age", |n| json!(n)),
        ];
        let restored = restore(&defaults, Some("cols"), Some(&storage));

        assert!(!restored[0].visible);
        assert!(restored[1].visible);
        // Stored entries for columns that no longer exist are ignored.
        assert_eq!(restored.len(), 2);
    }
}
