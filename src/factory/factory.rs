use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;

use thiserror::Error;

/// Errors raised while composing a context.
///
/// Composition is all-or-nothing: the first failing slice aborts
/// [`Factory::build`] and no partial context is returned.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// A slice read a capability that no earlier slice installed.
    #[error("missing capability `{0}`; its slice must be installed earlier in the chain")]
    MissingCapability(&'static str),

    /// A slice reported a failure of its own.
    #[error("slice composition failed: {0}")]
    SliceFailed(String),
}

/// The shared capability set produced by [`Factory::build`].
///
/// Capabilities are keyed by type. The context itself is flat and no longer
/// mutated once returned; the member capabilities (hives, handles) stay
/// independently live through their own interior `Arc`s.
#[derive(Default)]
pub struct Context {
    caps: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Context {
    /// Look up a capability, failing fast when it was never installed.
    pub fn get<C: Any + Send + Sync>(&self) -> Result<&C, ComposeError> {
        self.try_get::<C>()
            .ok_or(ComposeError::MissingCapability(type_name::<C>()))
    }

    /// Look up a capability that may legitimately be absent.
    pub fn try_get<C: Any + Send + Sync>(&self) -> Option<&C> {
        self.caps
            .get(&TypeId::of::<C>())
            .and_then(|boxed| boxed.downcast_ref::<C>())
    }

    pub fn contains<C: Any + Send + Sync>(&self) -> bool {
        self.caps.contains_key(&TypeId::of::<C>())
    }

    fn merge(&mut self, registrations: Registrations) {
        for cap in registrations.caps {
            // Last write wins on collision.
            self.caps.insert((*cap).type_id(), cap);
        }
    }
}

/// The capabilities a slice adds to the context.
#[derive(Default)]
pub struct Registrations {
    caps: Vec<Box<dyn Any + Send + Sync>>,
}

impl Registrations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one capability object.
    pub fn with<C: Any + Send + Sync>(mut self, capability: C) -> Self {
        self.caps.push(Box::new(capability));
        self
    }

    /// Shorthand for a slice contributing a single capability.
    pub fn single<C: Any + Send + Sync>(capability: C) -> Self {
        Self::new().with(capability)
    }
}

type SliceFn = Box<dyn FnOnce(&Context) -> Result<Registrations, ComposeError>>;

/// Orders and merges slice functions into one [`Context`].
///
/// `install` is deferred: nothing runs until [`Factory::build`], which
/// invokes every slice exactly once, in declaration order. Each slice
/// observes only the capabilities merged before it — there is no dependency
/// graph resolution, ordering is the whole mechanism.
///
/// # Examples
///
/// ```
/// use apiary::{Context, Factory, Registrations};
///
/// struct Base(i32);
/// struct Derived(i32);
///
/// let ctx = Factory::new()
///     .install(|_ctx: &Context| Ok(Registrations::single(Base(1))))
///     .install(|ctx: &Context| {
///         let base = ctx.get::<Base>()?;
///         Ok(Registrations::single(Derived(base.0 + 1)))
///     })
///     .build()
///     .unwrap();
///
/// assert_eq!(ctx.get::<Base>().unwrap().0, 1);
/// assert_eq!(ctx.get::<Derived>().unwrap().0, 2);
/// ```
#[derive(Default)]
pub struct Factory {
    slices: Vec<SliceFn>,
}

impl Factory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a slice. Execution is deferred to [`Factory::build`].
    pub fn install<F>(mut self, slice: F) -> Self
    where
        F: FnOnce(&Context) -> Result<Registrations, ComposeError> + 'static,
    {
        self.slices.push(Box::new(slice));
        self
    }

    /// Run every slice in declaration order and return the merged context.
    pub fn build(self) -> Result<Context, ComposeError> {
        let mut ctx = Context::default();
        for slice in self.slices {
            let registrations = slice(&ctx)?;
            ctx.merge(registrations);
        }
        Ok(ctx)
    }
}
