use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::{ComponentConfig, ModuleConfig};
use crate::context::ComponentCtx;
use crate::dispatch::{Action, ActionEvent, Request};
use crate::event::EventBus;
use crate::module::Module;

/// Upcast to `Any` so `Module::get::<T>()` can recover the concrete type.
pub trait AsAnyArc: Any + Send + Sync {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAnyArc for T {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A named unit owned by one module. `init` runs once, after every sibling
/// it depends on has been initialized.
#[async_trait]
pub trait Component: AsAnyArc {
    async fn init(&self, _ctx: &ComponentCtx) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Builds a component instance for one configured id.
pub trait ComponentFactory: Send + Sync {
    fn create(&self, id: &str, config: &ComponentConfig) -> anyhow::Result<Arc<dyn Component>>;
}

impl<F> ComponentFactory for F
where
    F: Fn(&str, &ComponentConfig) -> anyhow::Result<Arc<dyn Component>> + Send + Sync,
{
    fn create(&self, id: &str, config: &ComponentConfig) -> anyhow::Result<Arc<dyn Component>> {
        self(id, config)
    }
}

/// Builds the behavior of a module class.
pub trait ModuleFactory: Send + Sync {
    fn create(&self) -> Arc<dyn ModuleHooks>;
}

impl<F> ModuleFactory for F
where
    F: Fn() -> Arc<dyn ModuleHooks> + Send + Sync,
{
    fn create(&self) -> Arc<dyn ModuleHooks> {
        self()
    }
}

/// Behavior attached to a module node: defaults, factory overrides and the
/// dispatch hooks run around every action of the subtree.
#[async_trait]
pub trait ModuleHooks: Send + Sync + 'static {
    /// Class defaults for the whole node (params, widgets, mount path, child
    /// modules, components). The explicit configuration is deep-merged over it.
    fn default_config(&self) -> ModuleConfig {
        ModuleConfig::default()
    }

    /// Default component set; explicit configuration is merged over it.
    fn default_components(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Per-id factory override, consulted when a component has no `class`.
    fn component_factory(&self, _id: &str) -> Option<Arc<dyn ComponentFactory>> {
        None
    }

    /// Behavior for a child module that names no `class`.
    fn child_hooks(&self, _id: &str) -> Option<Arc<dyn ModuleHooks>> {
        None
    }

    /// Called once the node exists, before its bootstrap starts. Register
    /// lifecycle handlers on `module.events()` here.
    fn attach(&self, _module: &Arc<Module>) {}

    async fn before_action(
        &self,
        _module: &Arc<Module>,
        _action: &Action,
        _request: &Request,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after_action(
        &self,
        _module: &Arc<Module>,
        _action: &Action,
        _request: &Request,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Module with no behavior of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainModule;

impl ModuleHooks for PlainModule {}

/// The unit of work behind an action name.
#[async_trait]
pub trait ActionHandler: Send + Sync + 'static {
    async fn execute(&self, action: &Action, request: &Request) -> anyhow::Result<()>;
}

/// Resolves action names for requests bound to one module.
#[async_trait]
pub trait Controller: Send + Sync + 'static {
    fn id(&self) -> &str;

    /// Method-style action, looked up by its mapped method name
    /// (`view-profile` -> `action_view_profile`).
    fn inline_action(&self, _method: &str) -> Option<Arc<dyn ActionHandler>> {
        None
    }

    /// Explicit action map.
    fn action(&self, _name: &str) -> Option<Arc<dyn ActionHandler>> {
        None
    }

    /// Filters notified with `beforeAction` / `afterAction`.
    fn filters(&self) -> Option<&EventBus<ActionEvent>> {
        None
    }

    async fn before_action(&self, _action: &Action, _request: &Request) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after_action(&self, _action: &Action, _request: &Request) -> anyhow::Result<()> {
        Ok(())
    }
}
