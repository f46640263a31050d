//! Class catalog: maps class names to component and module factories.
//!
//! Classes linked into the binary register themselves with
//! `inventory::submit!` and are picked up by [`Catalog::discover`]; explicit
//! registration adds to or replaces those entries afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ComponentConfig;
use crate::contracts::{Component, ComponentFactory, ModuleFactory, ModuleHooks};
use crate::error::CatalogError;

/// Component class submitted via `inventory::submit!`.
pub struct ComponentClass {
    pub name: &'static str,
    pub create: fn(&str, &ComponentConfig) -> anyhow::Result<Arc<dyn Component>>,
}

inventory::collect!(ComponentClass);

/// Module class submitted via `inventory::submit!`.
pub struct ModuleClass {
    pub name: &'static str,
    pub create: fn() -> Arc<dyn ModuleHooks>,
}

inventory::collect!(ModuleClass);

#[derive(Clone, Default)]
pub struct Catalog {
    components: HashMap<String, Arc<dyn ComponentFactory>>,
    modules: HashMap<String, Arc<dyn ModuleFactory>>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("components", &self.component_names())
            .field("modules", &self.module_names())
            .finish()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every class linked into the binary.
    pub fn discover() -> Result<Self, CatalogError> {
        let mut catalog = Catalog::new();
        for class in ::inventory::iter::<ComponentClass> {
            if catalog.components.contains_key(class.name) {
                return Err(CatalogError::DuplicateComponentClass(class.name.to_string()));
            }
            catalog
                .components
                .insert(class.name.to_string(), Arc::new(class.create));
        }
        for class in ::inventory::iter::<ModuleClass> {
            if catalog.modules.contains_key(class.name) {
                return Err(CatalogError::DuplicateModuleClass(class.name.to_string()));
            }
            catalog
                .modules
                .insert(class.name.to_string(), Arc::new(class.create));
        }
        tracing::debug!(
            components = ?catalog.component_names(),
            modules = ?catalog.module_names(),
            "class catalog discovered"
        );
        Ok(catalog)
    }

    /// Add or replace a component class.
    pub fn register_component(
        &mut self,
        name: impl Into<String>,
        factory: impl ComponentFactory + 'static,
    ) -> &mut Self {
        self.components.insert(name.into(), Arc::new(factory));
        self
    }

    /// Add or replace a module class.
    pub fn register_module(
        &mut self,
        name: impl Into<String>,
        factory: impl ModuleFactory + 'static,
    ) -> &mut Self {
        self.modules.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn with_component(
        mut self,
        name: impl Into<String>,
        factory: impl ComponentFactory + 'static,
    ) -> Self {
        self.register_component(name, factory);
        self
    }

    pub fn with_module(
        mut self,
        name: impl Into<String>,
        factory: impl ModuleFactory + 'static,
    ) -> Self {
        self.register_module(name, factory);
        self
    }

    pub fn component(&self, name: &str) -> Option<Arc<dyn ComponentFactory>> {
        self.components.get(name).cloned()
    }

    pub fn module(&self, name: &str) -> Option<Arc<dyn ModuleFactory>> {
        self.modules.get(name).cloned()
    }

    pub fn component_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.components.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn module_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::PlainModule;

    struct Noop;
    impl Component for Noop {}

    fn make_noop(_id: &str, _cfg: &ComponentConfig) -> anyhow::Result<Arc<dyn Component>> {
        Ok(Arc::new(Noop))
    }

    fn make_plain() -> Arc<dyn ModuleHooks> {
        Arc::new(PlainModule)
    }

    inventory::submit! {
        ComponentClass { name: "catalog_test_noop", create: make_noop }
    }

    inventory::submit! {
        ModuleClass { name: "catalog_test_plain", create: make_plain }
    }

    #[test]
    fn discover_collects_submitted_classes() {
        let catalog = Catalog::discover().unwrap();
        assert!(catalog.component("catalog_test_noop").is_some());
        assert!(catalog.module("catalog_test_plain").is_some());
        assert!(catalog.component("missing").is_none());
    }

    #[test]
    fn explicit_registration_replaces_entries() {
        let mut catalog = Catalog::new();
        catalog.register_component("x", make_noop);
        catalog.register_component("x", |_: &str, _: &ComponentConfig| {
            Err::<Arc<dyn Component>, _>(anyhow::anyhow!("replaced"))
        });
        let err = catalog
            .component("x")
            .unwrap()
            .create("x", &ComponentConfig::default())
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "replaced");
        assert_eq!(catalog.component_names(), vec!["x"]);
    }
}
