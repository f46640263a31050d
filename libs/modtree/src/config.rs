//! Configuration shapes consumed by the module tree.
//!
//! Component and child-module sections are kept as raw, insertion-ordered
//! JSON maps: declaration order drives creation and child bootstrap order,
//! and a falsy entry (`false`, `null`, `0`, `""`) disables the entry instead
//! of failing.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Keys the module assigns on every component; user values are discarded.
const RESERVED_COMPONENT_KEYS: &[&str] = &["id", "module"];

/// Configuration of one module node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Module class name resolved through the catalog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// `component id -> component config | false`.
    pub components: Map<String, Value>,
    /// `child module id -> module config | false`.
    pub modules: Map<String, Value>,
    pub params: Map<String, Value>,
    pub widgets: Map<String, Value>,
    #[serde(alias = "mountPath", skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<String>,
    /// Static/template resource descriptor, passed through for the HTTP layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<Value>,
}

impl ModuleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    /// Declare a component. `config` may be any JSON value; falsy disables it.
    pub fn component(mut self, id: impl Into<String>, config: Value) -> Self {
        self.components.insert(id.into(), config);
        self
    }

    pub fn disable_component(mut self, id: impl Into<String>) -> Self {
        self.components.insert(id.into(), Value::Bool(false));
        self
    }

    /// Declare a child module.
    pub fn module(mut self, id: impl Into<String>, config: ModuleConfig) -> Self {
        self.modules.insert(id.into(), config.into_entry());
        self
    }

    pub fn disable_module(mut self, id: impl Into<String>) -> Self {
        self.modules.insert(id.into(), Value::Bool(false));
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn widget(mut self, key: impl Into<String>, value: Value) -> Self {
        self.widgets.insert(key.into(), value);
        self
    }

    pub fn with_mount_path(mut self, path: impl Into<String>) -> Self {
        self.mount_path = Some(path.into());
        self
    }

    /// Deep-merge `overlay` over `self`; overlay values win.
    pub fn merged_with(&self, overlay: &ModuleConfig) -> Result<ModuleConfig, serde_json::Error> {
        let mut base = self.clone().into_entry();
        deep_merge(&mut base, overlay.clone().into_entry());
        serde_json::from_value(base)
    }

    /// The config as a child-module entry. Always an object, so always enabled.
    pub fn into_entry(self) -> Value {
        let mut entry = Map::new();
        if let Some(class) = self.class {
            entry.insert("class".into(), Value::String(class));
        }
        entry.insert("components".into(), Value::Object(self.components));
        entry.insert("modules".into(), Value::Object(self.modules));
        entry.insert("params".into(), Value::Object(self.params));
        entry.insert("widgets".into(), Value::Object(self.widgets));
        if let Some(path) = self.mount_path {
            entry.insert("mount_path".into(), Value::String(path));
        }
        if let Some(assets) = self.assets {
            entry.insert("assets".into(), assets);
        }
        Value::Object(entry)
    }
}

/// Configuration of one component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Explicit class reference resolved through the catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Depends::is_empty")]
    pub depends: Depends,
    /// Component-specific keys, untouched.
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl ComponentConfig {
    /// Parse an enabled component entry. `true` yields an empty config.
    pub fn from_entry(entry: &Value) -> Result<Self, serde_json::Error> {
        let mut config: ComponentConfig = match entry {
            Value::Bool(true) => ComponentConfig::default(),
            other => serde_json::from_value(other.clone())?,
        };
        for key in RESERVED_COMPONENT_KEYS {
            config.settings.remove(*key);
        }
        Ok(config)
    }

    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }
}

/// `depends` accepts a single id or a list of ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Depends(pub Vec<String>);

impl Depends {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<&str>> for Depends {
    fn from(ids: Vec<&str>) -> Self {
        Depends(ids.into_iter().map(str::to_string).collect())
    }
}

impl<'de> Deserialize<'de> for Depends {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(Depends::default()),
            Some(Raw::One(id)) => Ok(Depends(vec![id])),
            Some(Raw::Many(ids)) => Ok(Depends(ids)),
        }
    }
}

impl Serialize for Depends {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// Falsy entries disable a component or child module.
pub fn is_enabled(entry: &Value) -> bool {
    match entry {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

/// Parse a child module entry. `true` yields an empty config.
pub fn module_entry(entry: &Value) -> Result<ModuleConfig, serde_json::Error> {
    match entry {
        Value::Bool(true) => Ok(ModuleConfig::default()),
        other => serde_json::from_value(other.clone()),
    }
}

/// Recursively merge `overlay` into `base`. Objects merge key by key; any
/// other overlay value replaces the base value.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Merge two maps: `local` over `inherited`, nested objects merged.
pub fn merge_maps(inherited: &Map<String, Value>, local: &Map<String, Value>) -> Map<String, Value> {
    let mut base = Value::Object(inherited.clone());
    deep_merge(&mut base, Value::Object(local.clone()));
    match base {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn falsy_entries_are_disabled() {
        assert!(!is_enabled(&json!(false)));
        assert!(!is_enabled(&json!(null)));
        assert!(!is_enabled(&json!(0)));
        assert!(!is_enabled(&json!("")));
        assert!(is_enabled(&json!(true)));
        assert!(is_enabled(&json!({})));
    }

    #[test]
    fn depends_accepts_string_or_list() {
        let one = ComponentConfig::from_entry(&json!({"depends": "db"})).unwrap();
        assert_eq!(one.depends.as_slice(), ["db".to_string()]);

        let many = ComponentConfig::from_entry(&json!({"depends": ["db", "#start"]})).unwrap();
        assert_eq!(many.depends.as_slice().len(), 2);

        let none = ComponentConfig::from_entry(&json!(true)).unwrap();
        assert!(none.depends.is_empty());
    }

    #[test]
    fn component_settings_pass_through_without_reserved_keys() {
        let cfg = ComponentConfig::from_entry(&json!({
            "class": "memory_cache",
            "id": "ignored",
            "module": "ignored",
            "ttl": 30,
        }))
        .unwrap();
        assert_eq!(cfg.class.as_deref(), Some("memory_cache"));
        assert_eq!(cfg.setting("ttl"), Some(&json!(30)));
        assert!(cfg.setting("id").is_none());
        assert!(cfg.setting("module").is_none());
    }

    #[test]
    fn deep_merge_keeps_nested_parent_values() {
        let inherited = json!({"db": {"host": "a", "port": 1}, "name": "x"});
        let local = json!({"db": {"port": 2}});
        let merged = merge_maps(
            inherited.as_object().unwrap(),
            local.as_object().unwrap(),
        );
        assert_eq!(Value::Object(merged), json!({"db": {"host": "a", "port": 2}, "name": "x"}));
    }

    #[test]
    fn module_config_from_yaml_preserves_declaration_order() {
        let yaml = r#"
mountPath: /shop
components:
  zeta: { class: memory_cache }
  alpha: false
modules:
  second: {}
  first: true
"#;
        let cfg: ModuleConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.mount_path.as_deref(), Some("/shop"));
        let comps: Vec<_> = cfg.components.keys().cloned().collect();
        assert_eq!(comps, vec!["zeta", "alpha"]);
        let mods: Vec<_> = cfg.modules.keys().cloned().collect();
        assert_eq!(mods, vec!["second", "first"]);
        assert_eq!(module_entry(&cfg.modules["first"]).unwrap(), ModuleConfig::default());
    }

    #[test]
    fn child_entries_built_in_code_stay_enabled() {
        let child = ModuleConfig::new()
            .with_class("storefront")
            .with_mount_path("/store")
            .param("currency", json!("EUR"));
        let parent = ModuleConfig::new().module("store", child.clone());

        let entry = &parent.modules["store"];
        assert!(is_enabled(entry));
        assert_eq!(entry, &serde_json::to_value(&child).unwrap());
        assert_eq!(module_entry(entry).unwrap(), child);

        let empty = ModuleConfig::new().module("bare", ModuleConfig::new());
        assert!(is_enabled(&empty.modules["bare"]));
    }

    #[test]
    fn merged_with_lets_explicit_config_win() {
        let defaults = ModuleConfig::new()
            .component("cache", json!({"class": "memory_cache", "ttl": 10}))
            .component("log", json!(true));
        let explicit = ModuleConfig::new()
            .component("cache", json!({"ttl": 60}))
            .disable_component("log");
        let merged = defaults.merged_with(&explicit).unwrap();
        assert_eq!(merged.components["cache"], json!({"class": "memory_cache", "ttl": 60}));
        assert_eq!(merged.components["log"], json!(false));
    }
}
