use std::fmt;

use thiserror::Error;

use crate::ordering::CycleError;

/// Startup failures. None are retried; the first one aborts the whole tree.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("module '{module}': {source}")]
    Cycle {
        module: String,
        #[source]
        source: CycleError,
    },
    #[error("module '{module}': no factory for component '{component}'{}", class_suffix(.class))]
    UnknownComponent {
        module: String,
        component: String,
        class: Option<String>,
    },
    #[error("module '{module}': failed to create component '{component}'")]
    ComponentCreate {
        module: String,
        component: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("module '{module}': initialization failed for component '{component}'")]
    ComponentInit {
        module: String,
        component: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("module '{module}': unknown module class '{class}'")]
    UnknownModuleClass { module: String, class: String },
    #[error("module '{module}': '{event}' handler failed")]
    Event {
        module: String,
        event: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("module '{module}' was already bootstrapped")]
    AlreadyInitialized { module: String },
    #[error("module '{module}': invalid configuration for '{entry}'")]
    InvalidConfig {
        module: String,
        entry: String,
        #[source]
        source: serde_json::Error,
    },
}

fn class_suffix(class: &Option<String>) -> String {
    match class {
        Some(class) => format!(" (class '{class}')"),
        None => String::new(),
    }
}

/// Which half of the onion a module hook belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    Enter,
    Exit,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::Enter => f.write_str("beforeAction"),
            HookPhase::Exit => f.write_str("afterAction"),
        }
    }
}

/// Per-request failures. They never take down the process.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("action '{name}' not found")]
    ActionNotFound { name: String },
    #[error("{phase} hook of '{module}' failed")]
    Hook {
        module: String,
        phase: HookPhase,
        #[source]
        source: anyhow::Error,
    },
    #[error("'{event}' filter failed")]
    Filter {
        event: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("action '{name}' failed")]
    Action {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

impl DispatchError {
    /// HTTP-style status class for the error boundary.
    pub fn status(&self) -> u16 {
        match self {
            DispatchError::ActionNotFound { .. } => 404,
            _ => 500,
        }
    }
}

/// Class registration conflicts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("component class '{0}' is registered more than once")]
    DuplicateComponentClass(String),
    #[error("module class '{0}' is registered more than once")]
    DuplicateModuleClass(String),
}
