//! Request pipeline.
//!
//! An action runs inside the hooks of every module on its ancestry: enter
//! hooks top-down (root first), then the controller, then the action, then
//! exit hooks bottom-up. Every module whose enter hook completed gets its exit
//! hook, whether or not the action itself ran.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::Instrument;

use crate::contracts::{ActionHandler, Controller};
use crate::error::{DispatchError, HookPhase};
use crate::module::Module;

/// Filter event fired after the controller's own `before_action`.
pub const BEFORE_ACTION: &str = "beforeAction";
/// Filter event fired after the controller's own `after_action`.
pub const AFTER_ACTION: &str = "afterAction";

/// Maps an action name to its inline method name: `view-profile` -> `action_view_profile`.
pub fn inline_method_name(action: &str) -> String {
    format!("action_{}", action.replace('-', "_"))
}

// ----- Response --------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub status: u16,
    pub body: Value,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl Response {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            headers: BTreeMap::new(),
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    /// Finalized response for a request nobody answered.
    pub fn empty() -> Self {
        Self::new(200, Value::Null)
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Self::new(302, Value::Null).with_header("location", location)
    }

    pub fn not_found() -> Self {
        Self::new(404, Value::Null)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

// ----- Request ---------------------------------------------------------------

#[derive(Debug, Default)]
struct RequestInner {
    params: Map<String, Value>,
    body: Value,
    response: Mutex<Option<Response>>,
}

/// Inbound request as seen by hooks, filters and actions. Cloning is cheap and
/// clones share the response slot.
#[derive(Debug, Clone, Default)]
pub struct Request {
    inner: Arc<RequestInner>,
}

impl Request {
    pub fn new(params: Map<String, Value>, body: Value) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                params,
                body,
                response: Mutex::new(None),
            }),
        }
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.inner.params.get(key)
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.inner.params
    }

    pub fn body(&self) -> &Value {
        &self.inner.body
    }

    /// Set the response. A response set before the action runs short-circuits it.
    pub fn respond(&self, response: Response) {
        *self.inner.response.lock() = Some(response);
    }

    pub fn has_response(&self) -> bool {
        self.inner.response.lock().is_some()
    }

    pub fn response(&self) -> Option<Response> {
        self.inner.response.lock().clone()
    }

    fn take_response(&self) -> Option<Response> {
        self.inner.response.lock().take()
    }
}

// ----- Action ----------------------------------------------------------------

/// One resolved action; lives for a single dispatch.
#[derive(Clone)]
pub struct Action {
    name: String,
    inline: bool,
    controller: Arc<dyn Controller>,
    handler: Arc<dyn ActionHandler>,
}

impl Action {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the action came from an inline controller method.
    pub fn is_inline(&self) -> bool {
        self.inline
    }

    pub fn controller(&self) -> &Arc<dyn Controller> {
        &self.controller
    }

    async fn run(&self, request: &Request) -> anyhow::Result<()> {
        self.handler.execute(self, request).await
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("inline", &self.inline)
            .field("controller", &self.controller.id())
            .finish()
    }
}

/// Payload of controller filter events.
#[derive(Debug, Clone)]
pub struct ActionEvent {
    pub action: String,
    pub module: String,
    pub request: Request,
}

/// Action backed by an async closure.
pub struct FnAction<F>(pub F);

#[async_trait::async_trait]
impl<F> ActionHandler for FnAction<F>
where
    F: for<'a> Fn(&'a Action, &'a Request) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync
        + 'static,
{
    async fn execute(&self, action: &Action, request: &Request) -> anyhow::Result<()> {
        (self.0)(action, request).await
    }
}

pub fn action_fn<F>(f: F) -> Arc<dyn ActionHandler>
where
    F: for<'a> Fn(&'a Action, &'a Request) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnAction(f))
}

// ----- Dispatcher ------------------------------------------------------------

/// Runs actions of one controller bound to one module.
#[derive(Clone)]
pub struct ActionDispatcher {
    module: Arc<Module>,
    controller: Arc<dyn Controller>,
}

impl ActionDispatcher {
    pub fn new(module: Arc<Module>, controller: Arc<dyn Controller>) -> Self {
        Self { module, controller }
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    /// Inline method first, then the controller's action map.
    pub fn resolve(&self, name: &str) -> Result<Action, DispatchError> {
        let (handler, inline) = match self.controller.inline_action(&inline_method_name(name)) {
            Some(handler) => (handler, true),
            None => match self.controller.action(name) {
                Some(handler) => (handler, false),
                None => {
                    return Err(DispatchError::ActionNotFound {
                        name: name.to_string(),
                    })
                }
            },
        };
        Ok(Action {
            name: name.to_string(),
            inline,
            controller: self.controller.clone(),
            handler,
        })
    }

    /// Run `name` through the full hook pipeline and return the finalized response.
    pub async fn execute(&self, name: &str, request: &Request) -> Result<Response, DispatchError> {
        let action = self.resolve(name)?;
        let span = tracing::info_span!(
            "dispatch",
            module = %self.module.unique_id(),
            controller = %self.controller.id(),
            action = %name
        );
        async {
            self.run_pipeline(&action, request).await?;
            Ok::<_, DispatchError>(request.take_response().unwrap_or_else(Response::empty))
        }
        .instrument(span)
        .await
    }

    async fn run_pipeline(&self, action: &Action, request: &Request) -> Result<(), DispatchError> {
        // [leaf, ..., root]
        let ancestry = self.module.ancestry();
        let mut entered = 0usize;
        let mut failure: Option<DispatchError> = None;

        for module in ancestry.iter().rev() {
            if let Err(source) = module.hooks().before_action(module, action, request).await {
                failure = Some(DispatchError::Hook {
                    module: module.unique_id(),
                    phase: HookPhase::Enter,
                    source,
                });
                break;
            }
            entered += 1;
        }

        if failure.is_none() {
            failure = self.run_controller(action, request).await.err();
        }

        // exit hooks of entered modules only, leaf -> root
        for module in &ancestry[ancestry.len() - entered..] {
            if let Err(source) = module.hooks().after_action(module, action, request).await {
                let err = DispatchError::Hook {
                    module: module.unique_id(),
                    phase: HookPhase::Exit,
                    source,
                };
                match failure {
                    None => failure = Some(err),
                    Some(_) => tracing::warn!(error = %err, "exit hook failed after an earlier error"),
                }
            }
        }

        match failure {
            Some(err) => {
                tracing::debug!(error = %err, status = err.status(), "dispatch failed");
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Controller hooks and filters around the action. The controller's exit
    /// side runs whenever its enter side completed.
    async fn run_controller(&self, action: &Action, request: &Request) -> Result<(), DispatchError> {
        let event = ActionEvent {
            action: action.name().to_string(),
            module: self.module.unique_id(),
            request: request.clone(),
        };

        self.controller
            .before_action(action, request)
            .await
            .map_err(|source| DispatchError::Hook {
                module: self.controller.id().to_string(),
                phase: HookPhase::Enter,
                source,
            })?;

        let mut failure = self.fire_filter(BEFORE_ACTION, &event).await.err();

        if failure.is_none() {
            if request.has_response() {
                tracing::debug!("response already set; action skipped");
            } else if let Err(source) = action.run(request).await {
                failure = Some(DispatchError::Action {
                    name: action.name().to_string(),
                    source,
                });
            }
        }

        let after = match self.controller.after_action(action, request).await {
            Ok(()) => self.fire_filter(AFTER_ACTION, &event).await,
            Err(source) => Err(DispatchError::Hook {
                module: self.controller.id().to_string(),
                phase: HookPhase::Exit,
                source,
            }),
        };
        if let Err(err) = after {
            match failure {
                None => failure = Some(err),
                Some(_) => tracing::warn!(error = %err, "controller exit failed after an earlier error"),
            }
        }

        failure.map_or(Ok(()), Err)
    }

    async fn fire_filter(&self, event: &'static str, payload: &ActionEvent) -> Result<(), DispatchError> {
        match self.controller.filters() {
            Some(bus) => bus
                .trigger(event, payload)
                .await
                .map_err(|source| DispatchError::Filter { event, source }),
            None => Ok(()),
        }
    }
}

/// Controller built from an explicit action map plus a filter bus.
pub struct BasicController {
    id: String,
    actions: BTreeMap<String, Arc<dyn ActionHandler>>,
    filters: crate::event::EventBus<ActionEvent>,
}

impl BasicController {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            actions: BTreeMap::new(),
            filters: crate::event::EventBus::new(),
        }
    }

    pub fn with_action(mut self, name: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        self.actions.insert(name.into(), handler);
        self
    }

    pub fn filter_bus(&self) -> &crate::event::EventBus<ActionEvent> {
        &self.filters
    }
}

impl Controller for BasicController {
    fn id(&self) -> &str {
        &self.id
    }

    fn action(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.actions.get(name).cloned()
    }

    fn filters(&self) -> Option<&crate::event::EventBus<ActionEvent>> {
        Some(&self.filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_names_map_dashes() {
        assert_eq!(inline_method_name("index"), "action_index");
        assert_eq!(inline_method_name("view-profile"), "action_view_profile");
    }

    #[test]
    fn response_slot_is_shared_between_clones() {
        let req = Request::default();
        let clone = req.clone();
        clone.respond(Response::redirect("/login"));
        assert!(req.has_response());
        let resp = req.response().unwrap();
        assert_eq!(resp.status, 302);
        assert_eq!(resp.headers.get("location").map(String::as_str), Some("/login"));
    }
}
