use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::clock::Clock;
use crate::factory::{ComposeError, Context, Registrations};
use crate::hive::Hive;
use crate::status::kit::StatusKit;

/// Operation name used by [`Status::ready`].
pub const DEFAULT_OPERATION: &str = "default";

/// The coordinator's published state: one record per active operation.
///
/// Every mutation publishes a fresh map behind a fresh `Arc`, so observers
/// can rely on cheap snapshot comparison downstream.
pub type OperationSnapshot = Arc<HashMap<String, OperationRecord>>;

/// One active operation.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationRecord {
    pub operation: String,
    pub status_type: String,
    pub props: Value,
    pub priority: i32,
    pub started_at: Instant,
    pub timeout: Option<Duration>,
    /// Monotonic stamp assigned at set time. Orders same-priority records
    /// (most recent first) and guards scheduled removals against records
    /// that have since been replaced.
    seq: u64,
}

/// Options accepted by every status transition.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatusOptions {
    /// Absolute deadline after which this exact record is removed, as if
    /// the caller had called `idle`.
    pub timeout: Option<Duration>,
}

type StaleHook = Arc<dyn Fn(&OperationRecord) + Send + Sync>;

/// Coordinator configuration. The kit is threaded in explicitly; there is
/// no global default.
pub struct StatusConfig<R> {
    pub kit: StatusKit<R>,
    /// Applied to records set without an explicit timeout: after this long
    /// without a refresh the record is considered stale, `on_stale` fires
    /// and the record is removed.
    pub stale_timeout: Option<Duration>,
    pub on_stale: Option<StaleHook>,
    pub clock: Clock,
}

impl<R> Default for StatusConfig<R> {
    fn default() -> Self {
        Self {
            kit: StatusKit::standard(),
            stale_timeout: None,
            on_stale: None,
            clock: Clock::system(),
        }
    }
}

#[derive(Clone, Copy)]
struct Deadline {
    due: Instant,
    seq: u64,
    stale: bool,
}

struct StatusInner<R> {
    kit: StatusKit<R>,
    hive: Hive<OperationSnapshot>,
    deadlines: Mutex<HashMap<String, Deadline>>,
    clock: Clock,
    stale_timeout: Option<Duration>,
    on_stale: Option<StaleHook>,
    next_seq: AtomicU64,
}

/// The multi-operation status coordinator.
///
/// Any collaborator may call `operation(name).<status>(props)` at any time;
/// each operation id holds at most one record and a new status replaces the
/// previous one. Observers subscribe once to [`Status::hive`] and resolve
/// the single most urgent record with [`Status::get_primary`].
///
/// Scheduled removals (explicit timeouts and staleness) are processed by a
/// lazy sweep that runs before every query and mutation; time comes from
/// the configured [`Clock`].
pub struct Status<R> {
    inner: Arc<StatusInner<R>>,
}

impl<R> Clone for Status<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Send + Sync + 'static> Status<R> {
    pub fn new(config: StatusConfig<R>) -> Self {
        Self {
            inner: Arc::new(StatusInner {
                kit: config.kit,
                hive: Hive::new(Arc::new(HashMap::new())),
                deadlines: Mutex::new(HashMap::new()),
                clock: config.clock,
                stale_timeout: config.stale_timeout,
                on_stale: config.on_stale,
                next_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Handle for transitioning the named operation.
    pub fn operation(&self, name: impl Into<String>) -> OperationHandle<R> {
        OperationHandle {
            status: self.clone(),
            operation: name.into(),
        }
    }

    /// Handle for the default operation.
    pub fn ready(&self) -> OperationHandle<R> {
        self.operation(DEFAULT_OPERATION)
    }

    /// The snapshot hive, for observers. Each mutation publishes a new
    /// snapshot reference.
    pub fn hive(&self) -> Hive<OperationSnapshot> {
        self.inner.hive.clone()
    }

    /// The most urgent record among those passing the filters, or `None`.
    ///
    /// Ordering is total: ascending priority, then most-recently-set first
    /// among equals.
    pub fn get_primary(
        &self,
        operations: Option<&[&str]>,
        status_types: Option<&[&str]>,
    ) -> Option<OperationRecord> {
        self.sweep();
        let snapshot = self.inner.hive.get();
        snapshot
            .values()
            .filter(|record| match operations {
                Some(ops) if !ops.is_empty() => ops.contains(&record.operation.as_str()),
                _ => true,
            })
            .filter(|record| match status_types {
                Some(types) if !types.is_empty() => types.contains(&record.status_type.as_str()),
                _ => true,
            })
            .min_by(|a, b| a.priority.cmp(&b.priority).then(b.seq.cmp(&a.seq)))
            .cloned()
    }

    /// [`Status::get_primary`] without filters.
    pub fn primary(&self) -> Option<OperationRecord> {
        self.get_primary(None, None)
    }

    pub fn is_active(&self, operation: &str) -> bool {
        self.sweep();
        self.inner.hive.with(|snapshot| snapshot.contains_key(operation))
    }

    pub fn is_any_active(&self, operations: &[&str]) -> bool {
        self.sweep();
        self.inner
            .hive
            .with(|snapshot| operations.iter().any(|op| snapshot.contains_key(*op)))
    }

    pub fn get_state(&self, operation: &str) -> Option<OperationRecord> {
        self.sweep();
        self.inner.hive.with(|snapshot| snapshot.get(operation).cloned())
    }

    pub fn active_operations(&self) -> Vec<String> {
        self.sweep();
        self.inner.hive.with(|snapshot| snapshot.keys().cloned().collect())
    }

    /// The renderer configured for a status type, if any.
    pub fn component(&self, status_type: &str) -> Option<&R> {
        self.inner
            .kit
            .entry(status_type)
            .and_then(|entry| entry.component.as_ref())
    }

    /// Process every scheduled removal whose deadline has passed.
    ///
    /// Runs implicitly before queries and mutations; call it directly when
    /// idling between events with an observer attached.
    pub fn sweep(&self) {
        let now = self.inner.clock.now();
        let due: Vec<(String, Deadline)> = {
            let mut deadlines = self
                .inner
                .deadlines
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            let expired: Vec<String> = deadlines
                .iter()
                .filter(|(_, d)| d.due <= now)
                .map(|(op, _)| op.clone())
                .collect();
            expired
                .into_iter()
                .filter_map(|op| deadlines.remove_entry(&op))
                .collect()
        };

        for (operation, deadline) in due {
            // A deadline only evicts the exact record it was scheduled
            // for; a superseded record's deadline is inert.
            let record = self.inner.hive.with(|snapshot| {
                snapshot
                    .get(&operation)
                    .filter(|r| r.seq == deadline.seq)
                    .cloned()
            });
            let Some(record) = record else { continue };

            if deadline.stale {
                if let Some(hook) = &self.inner.on_stale {
                    hook(&record);
                }
            }
            self.remove_record(&operation);
        }
    }

    fn set_status(&self, operation: &str, status_type: &str, props: Value, options: StatusOptions) {
        self.sweep();

        let Some(entry) = self.inner.kit.entry(status_type) else {
            tracing::warn!(status_type, operation, "unknown status type; transition ignored");
            return;
        };

        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        let now = self.inner.clock.now();
        let record = OperationRecord {
            operation: operation.to_string(),
            status_type: status_type.to_string(),
            props,
            priority: entry.priority,
            started_at: now,
            timeout: options.timeout,
            seq,
        };

        self.publish(|map| {
            map.insert(operation.to_string(), record);
        });

        // Superseding a record always cancels its pending removal before
        // scheduling the replacement's.
        let mut deadlines = self
            .inner
            .deadlines
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        deadlines.remove(operation);
        if let Some(timeout) = options.timeout {
            deadlines.insert(
                operation.to_string(),
                Deadline {
                    due: now + timeout,
                    seq,
                    stale: false,
                },
            );
        } else if let Some(stale_timeout) = self.inner.stale_timeout {
            deadlines.insert(
                operation.to_string(),
                Deadline {
                    due: now + stale_timeout,
                    seq,
                    stale: true,
                },
            );
        }
    }

    fn clear_operation(&self, operation: &str) {
        self.sweep();
        {
            let mut deadlines = self
                .inner
                .deadlines
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            deadlines.remove(operation);
        }
        self.remove_record(operation);
    }

    fn remove_record(&self, operation: &str) {
        let present = self.inner.hive.with(|snapshot| snapshot.contains_key(operation));
        if present {
            self.publish(|map| {
                map.remove(operation);
            });
        }
    }

    /// Copy-on-write publication: clone the current map, apply the edit,
    /// publish the new snapshot reference.
    fn publish(&self, edit: impl FnOnce(&mut HashMap<String, OperationRecord>)) {
        let mut map = self.inner.hive.with(|snapshot| HashMap::clone(snapshot));
        edit(&mut map);
        self.inner.hive.set(Arc::new(map));
    }
}

/// Transition handle for one operation, returned by [`Status::operation`].
pub struct OperationHandle<R> {
    status: Status<R>,
    operation: String,
}

impl<R: Send + Sync + 'static> OperationHandle<R> {
    /// Set this operation to `status_type`, replacing any current record.
    pub fn set(&self, status_type: &str, props: Value) {
        self.set_with(status_type, props, StatusOptions::default());
    }

    /// [`OperationHandle::set`] with scheduling options.
    pub fn set_with(&self, status_type: &str, props: Value, options: StatusOptions) {
        self.status.set_status(&self.operation, status_type, props, options);
    }

    pub fn loading(&self, props: Value) {
        self.set("loading", props);
    }

    pub fn saving(&self, props: Value) {
        self.set("saving", props);
    }

    pub fn success(&self, props: Value) {
        self.set("success", props);
    }

    pub fn error(&self, props: Value) {
        self.set("error", props);
    }

    /// Remove this operation's record and cancel any scheduled removal.
    pub fn idle(&self) {
        self.status.clear_operation(&self.operation);
    }
}

/// Renderer-erased transition port used by the data slices, so they stay
/// independent of the kit's renderer type.
#[derive(Clone)]
pub(crate) struct StatusPort {
    set: Arc<dyn Fn(&str, &str, Value) + Send + Sync>,
    idle: Arc<dyn Fn(&str) + Send + Sync>,
}

impl StatusPort {
    pub(crate) fn new<R: Send + Sync + 'static>(status: &Status<R>) -> Self {
        let setter = status.clone();
        let idler = status.clone();
        Self {
            set: Arc::new(move |operation, status_type, props| {
                setter.operation(operation).set(status_type, props);
            }),
            idle: Arc::new(move |operation| idler.operation(operation).idle()),
        }
    }

    pub(crate) fn set(&self, operation: &str, status_type: &str, props: Value) {
        (self.set)(operation, status_type, props);
    }

    pub(crate) fn idle(&self, operation: &str) {
        (self.idle)(operation);
    }
}

/// Slice function installing a [`Status`] capability built from `config`.
pub fn status_slice<R: Send + Sync + 'static>(
    config: StatusConfig<R>,
) -> impl FnOnce(&Context) -> Result<Registrations, ComposeError> {
    move |_ctx: &Context| Ok(Registrations::single(Status::new(config)))
}
