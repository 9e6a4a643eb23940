//! Script-facing modules.
//!
//! Extensions register themselves under a fixed import path, mirroring how
//! k6 extensions are imported as `k6/x/<name>`. Scripts look modules up by
//! path and concrete type:
//!
//! ```rust,no_run
//! use karga_pubsub::modules::{self, PubSub};
//!
//! let pubsub = modules::import::<PubSub>(modules::pubsub::NAME).unwrap();
//! ```

pub mod pubsub;
pub use pubsub::PubSub;

use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, LazyLock, PoisonError, RwLock},
};

use crate::error::{Error, Result};

/// Something a script can import by name.
pub trait Module: Any + Send + Sync {
    /// Names of the operations the module exposes.
    fn exports(&self) -> &'static [&'static str];

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

#[derive(Default)]
pub struct Registry {
    modules: HashMap<String, Arc<dyn Module>>,
}

impl Registry {
    /// A registry holding every module shipped with this crate.
    pub fn with_builtin() -> Self {
        let mut modules: HashMap<String, Arc<dyn Module>> = HashMap::new();
        modules.insert(pubsub::NAME.to_owned(), Arc::new(PubSub));
        Self { modules }
    }

    pub fn register(&mut self, name: impl Into<String>, module: impl Module) -> Result<()> {
        let name = name.into();
        if self.modules.contains_key(&name) {
            return Err(Error::DuplicateModule(name));
        }
        tracing::debug!(module = %name, "Registered module");
        self.modules.insert(name, Arc::new(module));
        Ok(())
    }

    /// Look a module up by name, returning `None` if it is missing or of
    /// another type.
    pub fn import<M: Module>(&self, name: &str) -> Option<Arc<M>> {
        let module = Arc::clone(self.modules.get(name)?);
        module.into_any().downcast::<M>().ok()
    }

    pub fn exports(&self, name: &str) -> Option<&'static [&'static str]> {
        self.modules.get(name).map(|m| m.exports())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}

static REGISTRY: LazyLock<RwLock<Registry>> = LazyLock::new(|| RwLock::new(Registry::with_builtin()));

/// Register a module in the process-wide registry.
pub fn register(name: impl Into<String>, module: impl Module) -> Result<()> {
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(name, module)
}

/// Import a module from the process-wide registry.
pub fn import<M: Module>(name: &str) -> Option<Arc<M>> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .import(name)
}
