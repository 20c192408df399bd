use std::sync::{Arc, Mutex, Weak};

use serde_json::json;

use crate::factory::{ComposeError, Context, Registrations};
use crate::hive::Hive;
use crate::slices::query::{Query, QueryRecord};
use crate::slices::BoxError;
use crate::status::{Status, StatusPort};

const OPERATION: &str = "paginator";

/// One page of results.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch<Item> {
    pub items: Vec<Item>,
    pub has_more: bool,
}

/// The paged data source a paginator drives. Implementations keep their own
/// cursor; `load`/`reload` restart it, `load_more` continues it.
pub trait PageSource<Item>: Send + Sync {
    fn load(&self, query: Option<&QueryRecord>) -> Result<Batch<Item>, BoxError>;

    fn reload(&self, query: Option<&QueryRecord>) -> Result<Batch<Item>, BoxError> {
        self.load(query)
    }

    fn load_more(&self) -> Result<Batch<Item>, BoxError>;

    /// Page size, surfaced to the UI.
    fn limit(&self) -> usize;
}

type ErrorHook = Arc<dyn Fn(&BoxError) + Send + Sync>;
type ShouldLoad = Arc<dyn Fn(&QueryRecord) -> bool + Send + Sync>;

/// Configuration for [`paginator_slice`].
pub struct PaginatorConfig<S> {
    source: S,
    on_error: Option<ErrorHook>,
    should_load: Option<ShouldLoad>,
}

impl<S> PaginatorConfig<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            on_error: None,
            should_load: None,
        }
    }

    pub fn on_error(mut self, hook: impl Fn(&BoxError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Gate query-change loads, the initial one included.
    pub fn should_load(mut self, predicate: impl Fn(&QueryRecord) -> bool + Send + Sync + 'static) -> Self {
        self.should_load = Some(Arc::new(predicate));
        self
    }
}

struct PaginatorInner<Item> {
    hive: Hive<Vec<Item>>,
    can_load_more: Hive<bool>,
    source: Box<dyn PageSource<Item>>,
    last_query: Mutex<Option<QueryRecord>>,
    status: StatusPort,
    on_error: Option<ErrorHook>,
}

/// Paged-rows capability: accumulated items in a hive, a `can_load_more`
/// hive for the UI, and the `paginator` operation reported around every
/// fetch.
pub struct Paginator<Item> {
    inner: Arc<PaginatorInner<Item>>,
}

impl<Item> Clone for Paginator<Item> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Item: Clone + PartialEq + Send + Sync + 'static> Paginator<Item> {
    /// Hive holding the accumulated rows.
    pub fn hive(&self) -> Hive<Vec<Item>> {
        self.inner.hive.clone()
    }

    /// Whether the source reported more pages after the last fetch.
    pub fn can_load_more(&self) -> Hive<bool> {
        self.inner.can_load_more.clone()
    }

    pub fn limit(&self) -> usize {
        self.inner.source.limit()
    }

    /// Fetch the first page for `query`, replacing the current rows.
    pub fn load(&self, query: Option<&QueryRecord>) -> Result<(), BoxError> {
        *self
            .inner
            .last_query
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = query.cloned();
        Self::exec(&self.inner, |inner| inner.source.load(query), false)
    }

    /// Restart the source with the last query, replacing the current rows.
    pub fn reload(&self) -> Result<(), BoxError> {
        let query = self
            .inner
            .last_query
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        Self::exec(&self.inner, |inner| inner.source.reload(query.as_ref()), false)
    }

    /// Fetch the next page and append it.
    pub fn load_more(&self) -> Result<(), BoxError> {
        Self::exec(&self.inner, |inner| inner.source.load_more(), true)
    }

    pub fn clear(&self) {
        self.inner.hive.set(Vec::new());
    }

    fn exec(
        inner: &Arc<PaginatorInner<Item>>,
        fetch: impl FnOnce(&PaginatorInner<Item>) -> Result<Batch<Item>, BoxError>,
        append: bool,
    ) -> Result<(), BoxError> {
        inner
            .status
            .set(OPERATION, "loading", json!({ "variant": "skeleton" }));

        match fetch(inner) {
            Ok(batch) => {
                if append {
                    inner.hive.update(|rows| {
                        let mut next = rows.clone();
                        next.extend(batch.items.iter().cloned());
                        next
                    });
                } else {
                    inner.hive.set(batch.items);
                }
                inner.can_load_more.set(batch.has_more);
                inner.status.idle(OPERATION);
                Ok(())
            }
            Err(err) => {
                inner
                    .status
                    .set(OPERATION, "error", json!({ "message": err.to_string() }));
                if let Some(hook) = &inner.on_error {
                    hook(&err);
                }
                Err(err)
            }
        }
    }
}

/// Slice function installing a [`Paginator`] capability.
///
/// Requires a `Status<R>` slice earlier in the chain; wires to a [`Query`]
/// slice when present, exactly as the loader does.
pub fn paginator_slice<S, Item, R>(
    config: PaginatorConfig<S>,
) -> impl FnOnce(&Context) -> Result<Registrations, ComposeError>
where
    S: PageSource<Item> + 'static,
    Item: Clone + PartialEq + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    move |ctx: &Context| {
        let status = ctx.get::<Status<R>>()?;

        let inner = Arc::new(PaginatorInner {
            hive: Hive::new(Vec::new()),
            can_load_more: Hive::new(false),
            source: Box::new(config.source),
            last_query: Mutex::new(None),
            status: StatusPort::new(status),
            on_error: config.on_error,
        });
        let paginator = Paginator {
            inner: Arc::clone(&inner),
        };

        match ctx.try_get::<Query>() {
            Some(query) => {
                let weak: Weak<PaginatorInner<Item>> = Arc::downgrade(&inner);
                let should_load = config.should_load;
                query
                    .listen_weak(
                        move |q: &QueryRecord| {
                            let Some(inner) = weak.upgrade() else { return };
                            if should_load.as_ref().is_none_or(|pred| pred(q)) {
                                *inner
                                    .last_query
                                    .lock()
                                    .unwrap_or_else(|e| e.into_inner()) = Some(q.clone());
                                let _ = Paginator::exec(&inner, |i| i.source.load(Some(q)), false);
                            }
                        },
                        &inner,
                    )
                    .detach();
            }
            None => {
                let _ = paginator.load(None);
            }
        }

        Ok(Registrations::single(paginator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::Factory;
    use crate::status::{status_slice, StatusConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountSource {
        pages: Vec<Vec<u32>>,
        cursor: AtomicUsize,
    }

    impl CountSource {
        fn new(pages: Vec<Vec<u32>>) -> Self {
            Self {
                pages,
                cursor: AtomicUsize::new(0),
            }
        }

        fn page(&self, index: usize) -> Result<Batch<u32>, BoxError> {
            let items = self
                .pages
                .get(index)
                .cloned()
                .ok_or_else(|| BoxError::from("page out of range"))?;
            Ok(Batch {
                items,
                has_more: index + 1 < self.pages.len(),
            })
        }
    }

    impl PageSource<u32> for CountSource {
        fn load(&self, _query: Option<&QueryRecord>) -> Result<Batch<u32>, BoxError> {
            self.cursor.store(0, Ordering::SeqCst);
            self.page(0)
        }

        fn load_more(&self) -> Result<Batch<u32>, BoxError> {
            let next = self.cursor.fetch_add(1, Ordering::SeqCst) + 1;
            self.page(next)
        }

        fn limit(&self) -> usize {
            2
        }
    }

    fn build(pages: Vec<Vec<u32>>) -> Paginator<u32> {
        let ctx = Factory::new()
            .install(status_slice(StatusConfig::<()>::default()))
            .install(paginator_slice::<CountSource, u32, ()>(PaginatorConfig::new(
                CountSource::new(pages),
            )))
            .build()
            .unwrap();
        ctx.get::<Paginator<u32>>().unwrap().clone()
    }

    #[test]
    fn initial_load_replaces_rows() {
        let paginator = build(vec![vec![1, 2], vec![3]]);
        assert_eq!(paginator.hive().get(), vec![1, 2]);
        assert!(paginator.can_load_more().get());
    }

    #[test]
    fn load_more_appends() {
        let paginator = build(vec![vec![1, 2], vec![3]]);
        paginator.load_more().unwrap();
        assert_eq!(paginator.hive().get(), vec![1, 2, 3]);
        assert!(!paginator.can_load_more().get());
    }

    #[test]
    fn reload_restarts() {
        let paginator = build(vec![vec![1, 2], vec![3]]);
        paginator.load_more().unwrap();
        paginator.reload().unwrap();
        assert_eq!(paginator.hive().get(), vec![1, 2]);
    }
}
