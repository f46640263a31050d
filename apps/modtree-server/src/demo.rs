//! Built-in component and module classes, plus the status controller used by
//! the `dispatch` command.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use modtree::{
    action_fn, Action, ActionHandler, Component, ComponentClass, ComponentConfig,
    ComponentCtx, Controller, Module, ModuleClass, ModuleHooks, Request, Response,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};

// ----- components ------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(default)]
struct CacheSettings {
    ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { ttl_secs: 60 }
    }
}

/// In-process key/value cache.
#[derive(Default)]
pub struct MemoryCache {
    ttl_secs: AtomicU64,
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryCache {
    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs.load(Ordering::Relaxed)
    }

    pub fn put(&self, key: impl Into<String>, value: Value) {
        self.entries.lock().insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).cloned()
    }
}

#[async_trait]
impl Component for MemoryCache {
    async fn init(&self, ctx: &ComponentCtx) -> anyhow::Result<()> {
        let settings: CacheSettings = ctx.config();
        self.ttl_secs.store(settings.ttl_secs, Ordering::Relaxed);
        tracing::debug!(component = %ctx.id(), ttl_secs = settings.ttl_secs, "cache ready");
        Ok(())
    }
}

/// Remembers when it was initialized.
#[derive(Default)]
pub struct Clock {
    started_at: AtomicU64,
}

impl Clock {
    pub fn started_at(&self) -> u64 {
        self.started_at.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Component for Clock {
    async fn init(&self, _ctx: &ComponentCtx) -> anyhow::Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.started_at.store(now, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ForwardSettings {
    to: String,
}

/// Redirects every action of its module to another location.
#[derive(Default)]
pub struct Forwarder {
    to: Mutex<String>,
}

impl Forwarder {
    pub fn target(&self) -> String {
        self.to.lock().clone()
    }
}

#[async_trait]
impl Component for Forwarder {
    async fn init(&self, ctx: &ComponentCtx) -> anyhow::Result<()> {
        let settings: ForwardSettings = ctx.config_required()?;
        *self.to.lock() = settings.to;
        Ok(())
    }
}

fn memory_cache(_id: &str, _config: &ComponentConfig) -> anyhow::Result<Arc<dyn Component>> {
    Ok(Arc::new(MemoryCache::default()))
}

fn clock(_id: &str, _config: &ComponentConfig) -> anyhow::Result<Arc<dyn Component>> {
    Ok(Arc::new(Clock::default()))
}

fn forwarder(_id: &str, _config: &ComponentConfig) -> anyhow::Result<Arc<dyn Component>> {
    Ok(Arc::new(Forwarder::default()))
}

inventory::submit! {
    ComponentClass { name: "memory_cache", create: memory_cache }
}

inventory::submit! {
    ComponentClass { name: "clock", create: clock }
}

inventory::submit! {
    ComponentClass { name: "forwarder", create: forwarder }
}

// ----- module classes --------------------------------------------------------

/// Logs every action passing through and honours two module params:
/// `maintenance: true` answers 503, and a latched forwarder redirects.
pub struct Audited;

#[async_trait]
impl ModuleHooks for Audited {
    fn child_hooks(&self, _id: &str) -> Option<Arc<dyn ModuleHooks>> {
        Some(Arc::new(Audited))
    }

    async fn before_action(
        &self,
        module: &Arc<Module>,
        action: &Action,
        request: &Request,
    ) -> anyhow::Result<()> {
        tracing::info!(module = %module.unique_id(), action = %action.name(), "enter");
        if request.has_response() {
            return Ok(());
        }
        if module.param("maintenance") == Some(Value::Bool(true)) {
            request.respond(Response::new(
                503,
                json!({"maintenance": module.unique_id()}),
            ));
        } else if let Some(target) = module
            .forwarder()
            .and_then(|f| f.downcast::<Forwarder>())
        {
            request.respond(Response::redirect(target.target()));
        }
        Ok(())
    }

    async fn after_action(
        &self,
        module: &Arc<Module>,
        action: &Action,
        _request: &Request,
    ) -> anyhow::Result<()> {
        tracing::info!(module = %module.unique_id(), action = %action.name(), "exit");
        Ok(())
    }
}

fn audited() -> Arc<dyn ModuleHooks> {
    Arc::new(Audited)
}

inventory::submit! {
    ModuleClass { name: "audited", create: audited }
}

// ----- controller ------------------------------------------------------------

/// Introspection actions over the module it is bound to.
pub struct StatusController {
    module: Arc<Module>,
}

impl StatusController {
    pub fn new(module: Arc<Module>) -> Self {
        Self { module }
    }

    fn ping(&self) -> Arc<dyn ActionHandler> {
        let module = self.module.clone();
        action_fn(move |_, request| {
            let module = module.clone();
            Box::pin(async move {
                let started_at = module.get::<Clock>("clock").map(|c| c.started_at());
                request.respond(Response::ok(json!({
                    "pong": module.unique_id(),
                    "url": module.url(""),
                    "started_at": started_at,
                })));
                Ok(())
            })
        })
    }

    fn components(&self) -> Arc<dyn ActionHandler> {
        let module = self.module.clone();
        action_fn(move |_, request| {
            let module = module.clone();
            Box::pin(async move {
                let listed: Vec<Value> = module
                    .component_ids()
                    .into_iter()
                    .filter_map(|id| module.component(&id))
                    .map(|c| json!({"id": c.id(), "owner": c.owner(), "state": c.state()}))
                    .collect();
                request.respond(Response::ok(Value::Array(listed)));
                Ok(())
            })
        })
    }

    fn params(&self) -> Arc<dyn ActionHandler> {
        let module = self.module.clone();
        action_fn(move |_, request| {
            let module = module.clone();
            Box::pin(async move {
                request.respond(Response::ok(json!({
                    "params": module.params(),
                    "widgets": module.widgets(),
                })));
                Ok(())
            })
        })
    }

    fn cache_get(&self) -> Arc<dyn ActionHandler> {
        let module = self.module.clone();
        action_fn(move |_, request| {
            let module = module.clone();
            Box::pin(async move {
                let Some(cache) = module.get::<MemoryCache>("cache") else {
                    request.respond(Response::not_found());
                    return Ok(());
                };
                let key = request
                    .param("key")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow::anyhow!("missing 'key' param"))?;
                request.respond(Response::ok(json!({
                    "key": key,
                    "value": cache.get(key),
                    "ttl_secs": cache.ttl_secs(),
                })));
                Ok(())
            })
        })
    }

    fn cache_put(&self) -> Arc<dyn ActionHandler> {
        let module = self.module.clone();
        action_fn(move |_, request| {
            let module = module.clone();
            Box::pin(async move {
                let cache = module
                    .get::<MemoryCache>("cache")
                    .ok_or_else(|| anyhow::anyhow!("no cache visible from '{}'", module.unique_id()))?;
                let key = request
                    .param("key")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow::anyhow!("missing 'key' param"))?;
                cache.put(key, request.body().clone());
                request.respond(Response::new(201, Value::Null));
                Ok(())
            })
        })
    }
}

#[async_trait]
impl Controller for StatusController {
    fn id(&self) -> &str {
        "status"
    }

    fn inline_action(&self, method: &str) -> Option<Arc<dyn ActionHandler>> {
        match method {
            "action_ping" => Some(self.ping()),
            "action_components" => Some(self.components()),
            "action_params" => Some(self.params()),
            _ => None,
        }
    }

    fn action(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        match name {
            "cache-get" => Some(self.cache_get()),
            "cache-put" => Some(self.cache_put()),
            _ => None,
        }
    }
}
