use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::factory::{ComposeError, Context, Registrations};
use crate::hive::{Hive, Subscription};

/// The current query: filter id to parameter value.
pub type QueryRecord = BTreeMap<String, Value>;

/// Where a filter control is rendered. Presentation metadata carried
/// through for the UI; the slice itself never interprets it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Placement {
    #[default]
    Auto,
    InLine,
    InPopup,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListOption {
    pub value: String,
    pub label: String,
}

/// What kind of control a filter is.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterKind {
    Text,
    Number,
    Boolean,
    Date,
    Time,
    DateTime,
    Selector { options: Vec<ListOption> },
    Hidden,
    /// An application-defined filter kind, matched by name downstream.
    Custom(String),
}

/// Declaration of one query filter.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterDefinition {
    pub id: String,
    pub kind: FilterKind,
    pub label: Option<String>,
    pub placement: Placement,
    pub is_main: bool,
    /// Seed value applied to the query at composition time.
    pub initial: Option<Value>,
}

impl FilterDefinition {
    pub fn new(id: impl Into<String>, kind: FilterKind) -> Self {
        Self {
            id: id.into(),
            kind,
            label: None,
            placement: Placement::Auto,
            is_main: false,
            initial: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    pub fn main(mut self) -> Self {
        self.is_main = true;
        self
    }

    pub fn initial(mut self, value: Value) -> Self {
        self.initial = Some(value);
        self
    }
}

/// Validator invoked on every [`Query::update`]. Returning `Err` rejects
/// the patch with a message and leaves the query untouched.
pub type Validator = Arc<dyn Fn(&str, &Value) -> Result<(), String> + Send + Sync>;

type ChangeHook = Arc<dyn Fn(&QueryRecord) + Send + Sync>;

#[derive(Default)]
pub struct QueryConfig {
    pub filters: Vec<FilterDefinition>,
    pub validators: Vec<Validator>,
    pub on_change: Option<ChangeHook>,
}

struct QueryInner {
    filters: Vec<FilterDefinition>,
    hive: Hive<QueryRecord>,
    initial: QueryRecord,
    validators: Vec<Validator>,
    on_change: Option<ChangeHook>,
}

/// Query-parameter capability. Downstream slices listen to the query hive
/// and reload when it changes; query-string/router synchronization is an
/// external collaborator's job.
#[derive(Clone)]
pub struct Query {
    inner: Arc<QueryInner>,
}

impl Query {
    fn new(config: QueryConfig) -> Self {
        // Filter seeds form the hive's initial value, so `reset` restores
        // them and replay-on-subscribe stays quiet until a real change.
        let mut seed = QueryRecord::new();
        for filter in &config.filters {
            if let Some(value) = &filter.initial {
                seed.insert(filter.id.clone(), value.clone());
            }
        }

        Self {
            inner: Arc::new(QueryInner {
                filters: config.filters,
                hive: Hive::new(seed.clone()),
                initial: seed,
                validators: config.validators,
                on_change: config.on_change,
            }),
        }
    }

    pub fn filters(&self) -> &[FilterDefinition] {
        &self.inner.filters
    }

    pub fn filter(&self, id: &str) -> Option<&FilterDefinition> {
        self.inner.filters.iter().find(|f| f.id == id)
    }

    pub fn hive(&self) -> Hive<QueryRecord> {
        self.inner.hive.clone()
    }

    pub fn get_param(&self, id: &str) -> Option<Value> {
        self.inner.hive.with(|q| q.get(id).cloned())
    }

    pub fn query(&self) -> QueryRecord {
        self.inner.hive.get()
    }

    /// Replace the whole query.
    pub fn set_query(&self, query: QueryRecord) {
        self.inner.hive.set(query);
        if let Some(hook) = &self.inner.on_change {
            hook(&self.inner.hive.get());
        }
    }

    /// Patch one parameter, running the configured validators first.
    pub fn update(&self, id: &str, value: Value) -> Result<(), String> {
        for validator in &self.inner.validators {
            validator(id, &value)?;
        }
        let mut next = self.query();
        next.insert(id.to_string(), value);
        self.set_query(next);
        Ok(())
    }

    pub fn remove_param(&self, id: &str) {
        let mut next = self.query();
        if next.remove(id).is_some() {
            self.set_query(next);
        }
    }

    pub fn clear(&self) {
        self.set_query(QueryRecord::new());
    }

    /// Invoke `callback` with the current query now and on every change.
    #[must_use = "dropping the guard unsubscribes; call detach() to keep listening"]
    pub fn listen<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&QueryRecord) + Send + Sync + 'static,
    {
        // Replay-on-subscribe covers the diverged case; fire explicitly
        // only when the hive is still at its initial value.
        let current = self.query();
        if current == self.inner.initial {
            callback(&current);
        }
        self.inner.hive.subscribe(callback)
    }

    /// [`Query::listen`] with the subscription's lifetime tied to `owner`.
    #[must_use = "dropping the guard unsubscribes; call detach() to keep listening"]
    pub fn listen_weak<F, O>(&self, callback: F, owner: &Arc<O>) -> Subscription
    where
        F: Fn(&QueryRecord) + Send + Sync + 'static,
        O: Send + Sync + 'static,
    {
        let current = self.query();
        if current == self.inner.initial {
            callback(&current);
        }
        self.inner.hive.subscribe_weak(callback, owner)
    }
}

/// Slice function installing a [`Query`] capability.
pub fn query_slice(
    config: QueryConfig,
) -> impl FnOnce(&Context) -> Result<Registrations, ComposeError> {
    move |_ctx: &Context| Ok(Registrations::single(Query::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn named_query() -> Query {
        Query::new(QueryConfig {
            filters: vec![
                FilterDefinition::new("name", FilterKind::Text).main(),
                FilterDefinition::new("page", FilterKind::Number).initial(json!(1)),
            ],
            validators: vec![Arc::new(|id, value| {
                if id == "name" && value.as_str().is_some_and(str::is_empty) {
                    return Err("name must not be empty".to_string());
                }
                Ok(())
            })],
            on_change: None,
        })
    }

    #[test]
    fn initial_values_seed_silently() {
        let query = named_query();
        assert_eq!(query.get_param("page"), Some(json!(1)));
        assert_eq!(query.get_param("name"), None);
    }

    #[test]
    fn update_runs_validators() {
        let query = named_query();

        assert!(query.update("name", json!("bee")).is_ok());
        assert_eq!(query.get_param("name"), Some(json!("bee")));

        let rejected = query.update("name", json!(""));
        assert_eq!(rejected, Err("name must not be empty".to_string()));
        // Rejected patches leave the query untouched.
        assert_eq!(query.get_param("name"), Some(json!("bee")));
    }

    #[test]
    fn listen_fires_immediately_and_on_change() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let query = named_query();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let _sub = query.listen(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        query.update("name", json!("bee")).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn remove_and_clear() {
        let query = named_query();
        query.update("name", json!("bee")).unwrap();

        query.remove_param("name");
        assert_eq!(query.get_param("name"), None);

        query.clear();
        assert!(query.query().is_empty());
    }
}
