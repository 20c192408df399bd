use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::json;

use crate::factory::{ComposeError, Context, Registrations};
use crate::hive::Hive;
use crate::slices::query::{Query, QueryRecord};
use crate::slices::BoxError;
use crate::status::{Status, StatusPort};

const OPERATION: &str = "loader";

type LoadFn<T> = Arc<dyn Fn(Option<&QueryRecord>) -> Result<T, BoxError> + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&BoxError) + Send + Sync>;
type ShouldLoad = Arc<dyn Fn(&QueryRecord) -> bool + Send + Sync>;

/// Configuration for [`loader_slice`].
///
/// The load function is synchronous: callers own any async boundary and
/// hand the slice a blocking fetch.
pub struct LoaderConfig<T> {
    load: LoadFn<T>,
    use_status: bool,
    on_error: Option<ErrorHook>,
    should_load: Option<ShouldLoad>,
}

impl<T> LoaderConfig<T> {
    pub fn new(
        load: impl Fn(Option<&QueryRecord>) -> Result<T, BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            load: Arc::new(load),
            use_status: true,
            on_error: None,
            should_load: None,
        }
    }

    /// Skip status reporting for this loader.
    pub fn without_status(mut self) -> Self {
        self.use_status = false;
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&BoxError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Gate query-change loads. The predicate sees every query the slice
    /// would otherwise load for, the initial one included.
    pub fn should_load(mut self, predicate: impl Fn(&QueryRecord) -> bool + Send + Sync + 'static) -> Self {
        self.should_load = Some(Arc::new(predicate));
        self
    }
}

struct LoaderInner<T> {
    hive: Hive<Option<T>>,
    load: LoadFn<T>,
    loading: AtomicBool,
    last_query: Mutex<Option<QueryRecord>>,
    use_status: bool,
    status: StatusPort,
    on_error: Option<ErrorHook>,
}

/// Data-loading capability: one fetched value in a hive, with the `loader`
/// operation reported to the status coordinator around every fetch.
pub struct Loader<T> {
    inner: Arc<LoaderInner<T>>,
}

impl<T> Clone for Loader<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Loader<T> {
    /// Hive holding the last loaded value, `None` until the first
    /// successful load.
    pub fn hive(&self) -> Hive<Option<T>> {
        self.inner.hive.clone()
    }

    /// Run the load function and publish its result.
    pub fn load(&self, query: Option<&QueryRecord>) -> Result<(), BoxError> {
        *self
            .inner
            .last_query
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = query.cloned();
        Self::run(&self.inner, query)
    }

    /// Re-run the last load with the same query.
    pub fn reload(&self) -> Result<(), BoxError> {
        let query = self
            .inner
            .last_query
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        Self::run(&self.inner, query.as_ref())
    }

    pub fn is_loading(&self) -> bool {
        self.inner.loading.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.inner.hive.set(None);
    }

    fn run(inner: &Arc<LoaderInner<T>>, query: Option<&QueryRecord>) -> Result<(), BoxError> {
        inner.loading.store(true, Ordering::SeqCst);
        if inner.use_status {
            inner.status.set(OPERATION, "loading", json!({}));
        }

        let result = (inner.load)(query);
        inner.loading.store(false, Ordering::SeqCst);

        match result {
            Ok(data) => {
                inner.hive.set(Some(data));
                if inner.use_status {
                    inner.status.idle(OPERATION);
                }
                Ok(())
            }
            Err(err) => {
                if inner.use_status {
                    inner
                        .status
                        .set(OPERATION, "error", json!({ "message": err.to_string() }));
                }
                if let Some(hook) = &inner.on_error {
                    hook(&err);
                }
                Err(err)
            }
        }
    }
}

/// Slice function installing a [`Loader`] capability.
///
/// Requires a `Status<R>` slice earlier in the chain. With a [`Query`]
/// slice present the loader loads immediately and on every query change
/// (subject to `should_load`); without one it performs a single initial
/// load.
pub fn loader_slice<T, R>(
    config: LoaderConfig<T>,
) -> impl FnOnce(&Context) -> Result<Registrations, ComposeError>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    move |ctx: &Context| {
        let status = ctx.get::<Status<R>>()?;

        let inner = Arc::new(LoaderInner {
            hive: Hive::new(None),
            load: config.load,
            loading: AtomicBool::new(false),
            last_query: Mutex::new(None),
            use_status: config.use_status,
            status: StatusPort::new(status),
            on_error: config.on_error,
        });
        let loader = Loader {
            inner: Arc::clone(&inner),
        };

        match ctx.try_get::<Query>() {
            Some(query) => {
                let weak: Weak<LoaderInner<T>> = Arc::downgrade(&inner);
                let should_load = config.should_load;
                query
                    .listen_weak(
                        move |q: &QueryRecord| {
                            let Some(inner) = weak.upgrade() else { return };
                            if should_load.as_ref().is_none_or(|pred| pred(q)) {
                                let _ = Loader::run(&inner, Some(q));
                            }
                        },
                        &inner,
                    )
                    .detach();
            }
            // No query slice: one initial load, failures already routed
            // through status and the error hook.
            None => {
                let _ = loader.load(None);
            }
        }

        Ok(Registrations::single(loader))
    }
}
