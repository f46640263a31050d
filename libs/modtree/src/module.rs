//! Module tree and staged bootstrap.
//!
//! A [`Module`] owns its children and its own components; the parent link is
//! a `Weak` back-reference only. Components are inherited by copying the
//! parent's visible map before the module creates its own, so an own
//! component with the same id shadows the inherited one.
//!
//! Bootstrap walks `New -> Configured -> ComponentsCreated ->
//! ComponentsInitialized -> ModulesInitialized -> Ready`, strictly
//! sequentially: components in dependency order, children in declaration
//! order, each child fully ready before the next sibling starts.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::{self, ComponentConfig, ModuleConfig};
use crate::context::ComponentCtx;
use crate::contracts::{Component, ComponentFactory, Controller, ModuleHooks, PlainModule};
use crate::dispatch::ActionDispatcher;
use crate::error::BootstrapError;
use crate::event::EventBus;
use crate::lifecycle::{self, ComponentState, ModuleState, StateCell};
use crate::ordering::{self, Dependent};
use crate::registry::Catalog;

/// Id of the component latched for URL resolution.
pub const FORWARDER_ID: &str = "forwarder";
/// Id given to a root built without an explicit one.
pub const DEFAULT_ROOT_ID: &str = "app";

// ----- Components ------------------------------------------------------------

struct ComponentSlot {
    id: String,
    owner: String,
    config: ComponentConfig,
    instance: Arc<dyn Component>,
    state: Mutex<ComponentState>,
}

/// Shared handle to a component instance. Descendants inheriting a component
/// hold clones of the same handle; identity is pointer identity.
#[derive(Clone)]
pub struct ComponentRef(Arc<ComponentSlot>);

impl ComponentRef {
    fn new(
        id: &str,
        owner: String,
        config: ComponentConfig,
        instance: Arc<dyn Component>,
        state: ComponentState,
    ) -> Self {
        Self(Arc::new(ComponentSlot {
            id: id.to_string(),
            owner,
            config,
            instance,
            state: Mutex::new(state),
        }))
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    /// Unique id of the module that created the component.
    pub fn owner(&self) -> &str {
        &self.0.owner
    }

    pub fn config(&self) -> &ComponentConfig {
        &self.0.config
    }

    pub fn instance(&self) -> &Arc<dyn Component> {
        &self.0.instance
    }

    pub fn state(&self) -> ComponentState {
        *self.0.state.lock()
    }

    pub fn downcast<T: Component>(&self) -> Option<Arc<T>> {
        self.0.instance.clone().as_any_arc().downcast::<T>().ok()
    }

    pub fn ptr_eq(a: &ComponentRef, b: &ComponentRef) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    fn mark_initialized(&self) {
        *self.0.state.lock() = ComponentState::Initialized;
    }
}

impl Dependent for ComponentRef {
    fn dependency_id(&self) -> &str {
        &self.0.id
    }

    fn dependencies(&self) -> &[String] {
        self.0.config.depends.as_slice()
    }
}

impl fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRef")
            .field("id", &self.0.id)
            .field("owner", &self.0.owner)
            .field("state", &self.state())
            .finish()
    }
}

// ----- Events and summaries --------------------------------------------------

/// Payload of module lifecycle events.
#[derive(Clone)]
pub struct ModuleEvent {
    pub event: &'static str,
    pub module: Arc<Module>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,
    pub state: ComponentState,
}

/// Serializable snapshot of a subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleSummary {
    pub id: String,
    pub unique_id: String,
    pub mount_path: String,
    pub state: ModuleState,
    /// Own components, in init order once initialized.
    pub components: Vec<ComponentSummary>,
    /// Visible ids coming from ancestors.
    pub inherited: Vec<String>,
    /// Inherited ids this module replaced through an override.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub overridden: Vec<String>,
    pub children: Vec<ModuleSummary>,
}

// ----- Module ----------------------------------------------------------------

#[derive(Default)]
struct Inner {
    mount_path: String,
    params: Map<String, Value>,
    widgets: Map<String, Value>,
    /// own + inherited
    components: HashMap<String, ComponentRef>,
    own: Vec<ComponentRef>,
    children: Vec<Arc<Module>>,
    forwarder: Option<ComponentRef>,
}

pub struct Module {
    id: String,
    parent: Option<Weak<Module>>,
    hooks: Arc<dyn ModuleHooks>,
    catalog: Arc<Catalog>,
    config: ModuleConfig,
    state: StateCell,
    started: AtomicBool,
    events: EventBus<ModuleEvent>,
    /// Shared by the whole tree. Overrides hold it for writing across the
    /// full propagation; component lookups hold it for reading.
    tree_lock: Arc<RwLock<()>>,
    inner: RwLock<Inner>,
}

/// Builds a root module.
pub struct ModuleBuilder {
    id: String,
    config: ModuleConfig,
    hooks: Option<Arc<dyn ModuleHooks>>,
    catalog: Arc<Catalog>,
}

impl Default for ModuleBuilder {
    fn default() -> Self {
        Self {
            id: DEFAULT_ROOT_ID.to_string(),
            config: ModuleConfig::default(),
            hooks: None,
            catalog: Arc::new(Catalog::new()),
        }
    }
}

impl ModuleBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn config(mut self, config: ModuleConfig) -> Self {
        self.config = config;
        self
    }

    /// Explicit behavior; wins over a `class` named in the config.
    pub fn hooks(mut self, hooks: Arc<dyn ModuleHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn catalog(mut self, catalog: impl Into<Arc<Catalog>>) -> Self {
        self.catalog = catalog.into();
        self
    }

    pub fn build(self) -> Result<Arc<Module>, BootstrapError> {
        let hooks: Arc<dyn ModuleHooks> = match self.hooks {
            Some(hooks) => hooks,
            None => match self.config.class.as_deref() {
                Some(class) => module_class(&self.catalog, &self.id, class)?,
                None => Arc::new(PlainModule),
            },
        };
        Module::create(self.id, None, hooks, self.catalog, self.config)
    }
}

fn module_class(
    catalog: &Catalog,
    module: &str,
    class: &str,
) -> Result<Arc<dyn ModuleHooks>, BootstrapError> {
    catalog
        .module(class)
        .map(|factory| factory.create())
        .ok_or_else(|| BootstrapError::UnknownModuleClass {
            module: module.to_string(),
            class: class.to_string(),
        })
}

impl Module {
    pub fn builder() -> ModuleBuilder {
        ModuleBuilder::default()
    }

    /// Node with the class defaults of `hooks` under the explicit `config`.
    fn create(
        id: String,
        parent: Option<&Arc<Module>>,
        hooks: Arc<dyn ModuleHooks>,
        catalog: Arc<Catalog>,
        config: ModuleConfig,
    ) -> Result<Arc<Module>, BootstrapError> {
        let config = hooks
            .default_config()
            .merged_with(&config)
            .map_err(|source| BootstrapError::InvalidConfig {
                module: match parent {
                    Some(parent) if !parent.is_root() => format!("{}/{}", parent.unique_id(), id),
                    _ => id.clone(),
                },
                entry: "defaults".to_string(),
                source,
            })?;
        let tree_lock = match parent {
            Some(parent) => parent.tree_lock.clone(),
            None => Arc::new(RwLock::new(())),
        };

        let module = Arc::new(Module {
            id,
            parent: parent.map(Arc::downgrade),
            hooks,
            catalog,
            config,
            state: StateCell::new(),
            started: AtomicBool::new(false),
            events: EventBus::new(),
            tree_lock,
            inner: RwLock::new(Inner::default()),
        });
        module.hooks.attach(&module);
        Ok(module)
    }

    // ---- bootstrap ----

    /// Run the whole staged bootstrap of this module and its subtree.
    /// A module bootstraps once; the first error aborts everything.
    pub fn bootstrap(self: Arc<Self>) -> BoxFuture<'static, Result<(), BootstrapError>> {
        Box::pin(async move {
            if self.started.swap(true, Ordering::AcqRel) {
                return Err(BootstrapError::AlreadyInitialized {
                    module: self.label(),
                });
            }

            self.emit(lifecycle::BEFORE_INIT).await?;
            self.configure();
            self.advance(ModuleState::New)?;

            self.create_components()?;
            self.advance(ModuleState::Configured)?;

            self.emit(lifecycle::BEFORE_COMPONENT_INIT).await?;
            self.init_components().await?;
            self.advance(ModuleState::ComponentsCreated)?;

            self.emit(lifecycle::AFTER_COMPONENT_INIT).await?;
            self.latch_forwarder();

            self.init_children().await?;
            self.advance(ModuleState::ComponentsInitialized)?;

            self.emit(lifecycle::AFTER_MODULE_INIT).await?;
            self.emit(lifecycle::AFTER_INIT).await?;
            self.advance(ModuleState::ModulesInitialized)?;

            tracing::info!(module = %self.label(), mount_path = %self.mount_path(), "module ready");
            Ok(())
        })
    }

    fn advance(&self, from: ModuleState) -> Result<(), BootstrapError> {
        match self.state.advance(from) {
            Ok(to) => {
                tracing::debug!(module = %self.label(), state = %to, "module state changed");
                Ok(())
            }
            Err(_) => Err(BootstrapError::AlreadyInitialized {
                module: self.label(),
            }),
        }
    }

    async fn emit(self: &Arc<Self>, event: &'static str) -> Result<(), BootstrapError> {
        let payload = ModuleEvent {
            event,
            module: self.clone(),
        };
        self.events
            .trigger(event, &payload)
            .await
            .map_err(|source| BootstrapError::Event {
                module: self.label(),
                event,
                source,
            })
    }

    /// Mount path and merged params/widgets.
    fn configure(&self) {
        let parent = self.parent();
        let mount_path = match (&parent, &self.config.mount_path) {
            (None, _) => "/".to_string(),
            (Some(_), Some(path)) => path.clone(),
            (Some(_), None) => format!("/{}", self.id),
        };
        let (params, widgets) = match &parent {
            Some(parent) => {
                let p = parent.inner.read();
                (
                    config::merge_maps(&p.params, &self.config.params),
                    config::merge_maps(&p.widgets, &self.config.widgets),
                )
            }
            None => (self.config.params.clone(), self.config.widgets.clone()),
        };

        let mut inner = self.inner.write();
        inner.mount_path = mount_path;
        inner.params = params;
        inner.widgets = widgets;
    }

    fn create_components(&self) -> Result<(), BootstrapError> {
        let module = self.label();
        let mut visible = match self.parent() {
            Some(parent) => {
                let _tree = self.tree_lock.read();
                let inherited = parent.inner.read().components.clone();
                inherited
            }
            None => HashMap::new(),
        };
        let declared = config::merge_maps(&self.hooks.default_components(), &self.config.components);
        let mut own = Vec::with_capacity(declared.len());

        for (id, entry) in &declared {
            if !config::is_enabled(entry) {
                tracing::info!(module = %module, component = %id, "component disabled by configuration; skipped");
                continue;
            }
            let cfg = ComponentConfig::from_entry(entry).map_err(|source| {
                BootstrapError::InvalidConfig {
                    module: module.clone(),
                    entry: id.clone(),
                    source,
                }
            })?;
            let factory = self.component_factory(id, &cfg)?;
            let instance = factory
                .create(id, &cfg)
                .map_err(|source| BootstrapError::ComponentCreate {
                    module: module.clone(),
                    component: id.clone(),
                    source,
                })?;

            let component = ComponentRef::new(
                id,
                self.unique_id(),
                cfg,
                instance,
                ComponentState::Created,
            );
            if visible.insert(id.clone(), component.clone()).is_some() {
                tracing::debug!(module = %module, component = %id, "own component shadows inherited one");
            }
            own.push(component);
        }

        let mut inner = self.inner.write();
        inner.components = visible;
        inner.own = own;
        Ok(())
    }

    /// `class` key, then the module's per-id table, then a class named like the id.
    fn component_factory(
        &self,
        id: &str,
        cfg: &ComponentConfig,
    ) -> Result<Arc<dyn ComponentFactory>, BootstrapError> {
        let unknown = |class: Option<&String>| BootstrapError::UnknownComponent {
            module: self.label(),
            component: id.to_string(),
            class: class.cloned(),
        };
        if let Some(class) = &cfg.class {
            return self.catalog.component(class).ok_or_else(|| unknown(Some(class)));
        }
        self.hooks
            .component_factory(id)
            .or_else(|| self.catalog.component(id))
            .ok_or_else(|| unknown(None))
    }

    async fn init_components(self: &Arc<Self>) -> Result<(), BootstrapError> {
        let own = self.inner.read().own.clone();
        let ordered = ordering::order(own).map_err(|source| BootstrapError::Cycle {
            module: self.label(),
            source,
        })?;
        tracing::info!(
            module = %self.label(),
            order = ?ordered.iter().map(ComponentRef::id).collect::<Vec<_>>(),
            "component init order resolved"
        );

        for component in &ordered {
            let ctx = ComponentCtx::new(self.clone(), component.id(), component.config().clone());
            component
                .instance()
                .init(&ctx)
                .await
                .map_err(|source| BootstrapError::ComponentInit {
                    module: self.label(),
                    component: component.id().to_string(),
                    source,
                })?;
            component.mark_initialized();
            tracing::debug!(module = %self.label(), component = %component.id(), "component initialized");
        }

        self.inner.write().own = ordered;
        Ok(())
    }

    fn latch_forwarder(&self) {
        let mut inner = self.inner.write();
        let forwarder = inner.components.get(FORWARDER_ID).cloned();
        if forwarder.is_some() {
            tracing::debug!(module = %self.label(), "forwarder latched");
        }
        inner.forwarder = forwarder;
    }

    async fn init_children(self: &Arc<Self>) -> Result<(), BootstrapError> {
        for (id, entry) in &self.config.modules {
            if !config::is_enabled(entry) {
                tracing::info!(module = %self.label(), child = %id, "module disabled by configuration; skipped");
                continue;
            }
            let cfg = config::module_entry(entry).map_err(|source| BootstrapError::InvalidConfig {
                module: self.label(),
                entry: id.clone(),
                source,
            })?;
            let hooks: Arc<dyn ModuleHooks> = match cfg.class.as_deref() {
                Some(class) => module_class(&self.catalog, id, class)?,
                None => self
                    .hooks
                    .child_hooks(id)
                    .unwrap_or_else(|| Arc::new(PlainModule)),
            };

            let child = Module::create(id.clone(), Some(self), hooks, self.catalog.clone(), cfg)?;
            self.inner.write().children.push(child.clone());
            child.bootstrap().await?;
        }
        Ok(())
    }

    // ---- components ----

    /// Replace the component visible under `id` here and in every descendant
    /// still seeing the replaced instance. Descendants with their own `id`
    /// keep it. The new instance is taken as already initialized and keeps
    /// the configuration of the instance it replaces.
    ///
    /// Readers anywhere in the tree see either the old instance everywhere or
    /// the new one everywhere, never a mix.
    pub fn override_component(&self, id: &str, instance: Arc<dyn Component>) -> ComponentRef {
        let owner = self.unique_id();
        let _tree = self.tree_lock.write();

        let (previous, replacement) = {
            let mut inner = self.inner.write();
            let config = inner
                .components
                .get(id)
                .map(|c| c.config().clone())
                .unwrap_or_default();
            let replacement =
                ComponentRef::new(id, owner, config, instance, ComponentState::Initialized);
            let previous = inner.components.insert(id.to_string(), replacement.clone());
            if let Some(slot) = inner.own.iter_mut().find(|c| c.id() == id) {
                *slot = replacement.clone();
            }
            if id == FORWARDER_ID && inner.forwarder.is_some() {
                inner.forwarder = Some(replacement.clone());
            }
            (previous, replacement)
        };

        if let Some(previous) = previous {
            self.propagate_override(id, &previous, &replacement);
        }
        tracing::debug!(module = %self.label(), component = %id, "component overridden");
        replacement
    }

    /// Caller holds the tree lock for writing.
    fn propagate_override(&self, id: &str, old: &ComponentRef, new: &ComponentRef) {
        let children = self.inner.read().children.clone();
        for child in children {
            let inherits = child
                .inner
                .read()
                .components
                .get(id)
                .is_some_and(|c| ComponentRef::ptr_eq(c, old));
            if !inherits {
                // own override: this subtree is unaffected
                continue;
            }
            child.propagate_override(id, old, new);
            let mut inner = child.inner.write();
            inner.components.insert(id.to_string(), new.clone());
            if inner
                .forwarder
                .as_ref()
                .is_some_and(|f| ComponentRef::ptr_eq(f, old))
            {
                inner.forwarder = Some(new.clone());
            }
        }
    }

    /// Visible component (own or inherited).
    pub fn component(&self, id: &str) -> Option<ComponentRef> {
        let _tree = self.tree_lock.read();
        let component = self.inner.read().components.get(id).cloned();
        component
    }

    pub fn get<T: Component>(&self, id: &str) -> Option<Arc<T>> {
        self.component(id)?.downcast::<T>()
    }

    pub fn has_component(&self, id: &str) -> bool {
        let _tree = self.tree_lock.read();
        let found = self.inner.read().components.contains_key(id);
        found
    }

    /// Own components, in init order once initialized.
    pub fn own_components(&self) -> Vec<ComponentRef> {
        let _tree = self.tree_lock.read();
        let own = self.inner.read().own.clone();
        own
    }

    pub fn component_ids(&self) -> Vec<String> {
        let _tree = self.tree_lock.read();
        let mut ids: Vec<String> = self.inner.read().components.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn forwarder(&self) -> Option<ComponentRef> {
        let _tree = self.tree_lock.read();
        let forwarder = self.inner.read().forwarder.clone();
        forwarder
    }

    // ---- tree ----

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn parent(&self) -> Option<Arc<Module>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn root(self: &Arc<Self>) -> Arc<Module> {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// `[self, parent, ..., root]`.
    pub fn ancestry(self: &Arc<Self>) -> Vec<Arc<Module>> {
        let mut chain = vec![self.clone()];
        let mut current = self.parent();
        while let Some(module) = current {
            current = module.parent();
            chain.push(module);
        }
        chain
    }

    /// Path of ids from the root, e.g. `shop/cart`. The root is `""`.
    pub fn unique_id(&self) -> String {
        let mut ids = Vec::new();
        if !self.is_root() {
            ids.push(self.id.clone());
        }
        let mut current = self.parent();
        while let Some(module) = current {
            if !module.is_root() {
                ids.push(module.id.clone());
            }
            current = module.parent();
        }
        ids.reverse();
        ids.join("/")
    }

    /// Name used in logs and errors: the unique id, or the id for the root.
    fn label(&self) -> String {
        if self.is_root() {
            self.id.clone()
        } else {
            self.unique_id()
        }
    }

    pub fn children(&self) -> Vec<Arc<Module>> {
        self.inner.read().children.clone()
    }

    pub fn child(&self, id: &str) -> Option<Arc<Module>> {
        self.inner.read().children.iter().find(|c| c.id == id).cloned()
    }

    /// Resolve a `/`-separated path of child ids relative to this module.
    pub fn find(self: &Arc<Self>, path: &str) -> Option<Arc<Module>> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self.clone(), |module, segment| module.child(segment))
    }

    // ---- configuration ----

    pub fn state(&self) -> ModuleState {
        self.state.load()
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn hooks(&self) -> &Arc<dyn ModuleHooks> {
        &self.hooks
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn events(&self) -> &EventBus<ModuleEvent> {
        &self.events
    }

    pub fn mount_path(&self) -> String {
        self.inner.read().mount_path.clone()
    }

    pub fn param(&self, key: &str) -> Option<Value> {
        self.inner.read().params.get(key).cloned()
    }

    pub fn params(&self) -> Map<String, Value> {
        self.inner.read().params.clone()
    }

    pub fn widget(&self, key: &str) -> Option<Value> {
        self.inner.read().widgets.get(key).cloned()
    }

    pub fn widgets(&self) -> Map<String, Value> {
        self.inner.read().widgets.clone()
    }

    /// Join the mount paths from the root down to this module, then `route`.
    pub fn url(self: &Arc<Self>, route: &str) -> String {
        let mut url = String::new();
        for module in self.ancestry().iter().rev() {
            let mount_path = module.mount_path();
            let segment = mount_path.trim_matches('/');
            if !segment.is_empty() {
                url.push('/');
                url.push_str(segment);
            }
        }
        let route = route.trim_start_matches('/');
        if !route.is_empty() {
            url.push('/');
            url.push_str(route);
        }
        if url.is_empty() {
            url.push('/');
        }
        url
    }

    pub fn dispatcher(self: &Arc<Self>, controller: Arc<dyn Controller>) -> ActionDispatcher {
        ActionDispatcher::new(self.clone(), controller)
    }

    pub fn describe(&self) -> ModuleSummary {
        let _tree = self.tree_lock.read();
        self.summary()
    }

    /// Caller holds the tree lock for reading.
    fn summary(&self) -> ModuleSummary {
        let unique_id = self.unique_id();
        let (mount_path, components, inherited, overridden, children) = {
            let inner = self.inner.read();
            let components: Vec<ComponentSummary> = inner
                .own
                .iter()
                .map(|c| ComponentSummary {
                    id: c.id().to_string(),
                    class: c.config().class.clone(),
                    depends: c.config().depends.as_slice().to_vec(),
                    state: c.state(),
                })
                .collect();
            let mut inherited = Vec::new();
            let mut overridden = Vec::new();
            for (id, c) in &inner.components {
                if inner.own.iter().any(|o| ComponentRef::ptr_eq(o, c)) {
                    continue;
                }
                // overrides are owned by the module that applied them
                if c.owner() == unique_id {
                    overridden.push(id.clone());
                } else {
                    inherited.push(id.clone());
                }
            }
            inherited.sort();
            overridden.sort();
            (
                inner.mount_path.clone(),
                components,
                inherited,
                overridden,
                inner.children.clone(),
            )
        };

        ModuleSummary {
            id: self.id.clone(),
            unique_id,
            mount_path,
            state: self.state(),
            components,
            inherited,
            overridden,
            children: children.iter().map(|c| c.summary()).collect(),
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("unique_id", &self.unique_id())
            .field("state", &self.state())
            .field("components", &self.component_ids())
            .finish()
    }
}

impl fmt::Debug for ModuleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleEvent")
            .field("event", &self.event)
            .field("module", &self.module.unique_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Marker;
    impl Component for Marker {}

    fn catalog() -> Catalog {
        Catalog::new().with_component("marker", |_: &str, _: &ComponentConfig| {
            Ok::<_, anyhow::Error>(Arc::new(Marker) as Arc<dyn Component>)
        })
    }

    #[tokio::test]
    async fn mount_paths_default_to_child_id() {
        let config = ModuleConfig::new()
            .module("shop", ModuleConfig::new().module("cart", ModuleConfig::new()))
            .module("blog", ModuleConfig::new().with_mount_path("/news"));
        let root = Module::builder().config(config).build().unwrap();
        root.clone().bootstrap().await.unwrap();

        assert_eq!(root.mount_path(), "/");
        let cart = root.find("shop/cart").unwrap();
        assert_eq!(cart.mount_path(), "/cart");
        assert_eq!(cart.unique_id(), "shop/cart");
        assert_eq!(cart.url("items"), "/shop/cart/items");
        assert_eq!(root.find("blog").unwrap().url("/"), "/news");
        assert_eq!(root.url(""), "/");
        assert!(root.find("shop/missing").is_none());
        assert!(Arc::ptr_eq(&cart.root(), &root));
    }

    #[tokio::test]
    async fn params_merge_deeply_with_parent() {
        let config = ModuleConfig::new()
            .param("db", json!({"host": "localhost", "port": 5432}))
            .widget("theme", json!("dark"))
            .module(
                "child",
                ModuleConfig::new().param("db", json!({"port": 6543})),
            );
        let root = Module::builder().config(config).build().unwrap();
        root.clone().bootstrap().await.unwrap();

        let child = root.child("child").unwrap();
        assert_eq!(child.param("db"), Some(json!({"host": "localhost", "port": 6543})));
        assert_eq!(child.widget("theme"), Some(json!("dark")));
        assert_eq!(root.param("db"), Some(json!({"host": "localhost", "port": 5432})));
    }

    #[tokio::test]
    async fn forwarder_is_latched_and_inherited() {
        let config = ModuleConfig::new()
            .component("forwarder", json!({"class": "marker"}))
            .module("child", ModuleConfig::new());
        let root = Module::builder()
            .config(config)
            .catalog(catalog())
            .build()
            .unwrap();
        root.clone().bootstrap().await.unwrap();

        let child = root.child("child").unwrap();
        let fwd = child.forwarder().unwrap();
        assert!(ComponentRef::ptr_eq(&fwd, &root.forwarder().unwrap()));
        assert!(child.get::<Marker>("forwarder").is_some());
    }

    #[tokio::test]
    async fn describe_reports_own_and_inherited() {
        let config = ModuleConfig::new()
            .component("a", json!({"class": "marker"}))
            .module(
                "child",
                ModuleConfig::new().component("b", json!({"class": "marker"})),
            );
        let root = Module::builder()
            .config(config)
            .catalog(catalog())
            .build()
            .unwrap();
        root.clone().bootstrap().await.unwrap();

        let summary = root.describe();
        assert_eq!(summary.state, ModuleState::Ready);
        assert_eq!(summary.components[0].id, "a");
        assert_eq!(summary.components[0].state, ComponentState::Initialized);
        let child = &summary.children[0];
        assert_eq!(child.unique_id, "child");
        assert_eq!(child.inherited, vec!["a"]);
        assert_eq!(child.components[0].id, "b");
    }

    #[tokio::test]
    async fn second_bootstrap_is_rejected() {
        let root = Module::builder().build().unwrap();
        root.clone().bootstrap().await.unwrap();
        let err = root.clone().bootstrap().await.unwrap_err();
        assert!(matches!(err, BootstrapError::AlreadyInitialized { .. }));
    }
}
