use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ComponentConfig;
use crate::module::Module;

/// Passed to [`Component::init`](crate::Component::init): the owning module,
/// the assigned id and the component's configuration.
#[derive(Clone)]
pub struct ComponentCtx {
    pub(crate) module: Arc<Module>,
    pub(crate) id: String,
    pub(crate) config: ComponentConfig,
}

impl ComponentCtx {
    pub fn new(module: Arc<Module>, id: impl Into<String>, config: ComponentConfig) -> Self {
        Self {
            module,
            id: id.into(),
            config,
        }
    }

    /// The module that created this component.
    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn raw_config(&self) -> &ComponentConfig {
        &self.config
    }

    /// Best-effort: deserialize the component settings into `T`, fallback to
    /// `T::default()` if they do not fit.
    pub fn config<T: DeserializeOwned + Default>(&self) -> T {
        serde_json::from_value(Value::Object(self.config.settings.clone())).unwrap_or_default()
    }

    /// Strict: deserialize the component settings into `T`, returning a
    /// pathful error on failure.
    pub fn config_required<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        serde_json::from_value(Value::Object(self.config.settings.clone())).map_err(|e| {
            anyhow::anyhow!(
                "invalid config for component '{}' in module '{}': {}",
                self.id,
                self.module.unique_id(),
                e
            )
        })
    }
}

impl std::fmt::Debug for ComponentCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentCtx")
            .field("module", &self.module.unique_id())
            .field("id", &self.id)
            .field("config", &self.config)
            .finish()
    }
}
