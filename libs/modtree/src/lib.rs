//! # Modtree - module tree runtime
//!
//! Assembles a tree of modules from configuration, boots every module through
//! a fixed sequence of stages and runs actions through a nested before/after
//! hook pipeline that mirrors the tree.
//!
//! ## Features
//!
//! - **Dependency ordering**: components initialize after what they `depends` on,
//!   with `#start` / `#end` sentinels and cycle detection
//! - **Inheritance**: child modules see parent components unless they declare their own
//! - **Onion dispatch**: enter hooks root to leaf, exit hooks leaf to root
//! - **Auto-discovery**: component and module classes register via inventory
//!
//! ## Example
//!
//! ```rust,ignore
//! use modtree::{Catalog, Module, ModuleConfig};
//! use serde_json::json;
//!
//! let config = ModuleConfig::new()
//!     .component("db", json!({"class": "postgres"}))
//!     .component("cache", json!({"class": "memory_cache", "depends": "db"}))
//!     .module("shop", ModuleConfig::new());
//!
//! let root = Module::builder()
//!     .config(config)
//!     .catalog(Catalog::discover()?)
//!     .build()?;
//! root.clone().bootstrap().await?;
//! ```

pub use anyhow::Result;
pub use async_trait::async_trait;

// Re-export inventory for class registration
pub use inventory;

pub mod config;
pub mod context;
pub mod contracts;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod module;
pub mod ordering;
pub mod registry;
pub mod runtime;

pub use config::{ComponentConfig, Depends, ModuleConfig};
pub use context::ComponentCtx;
pub use contracts::{
    ActionHandler, AsAnyArc, Component, ComponentFactory, Controller, ModuleFactory, ModuleHooks,
    PlainModule,
};
pub use dispatch::{
    action_fn, Action, ActionDispatcher, ActionEvent, BasicController, Request, Response,
};
pub use error::{BootstrapError, CatalogError, DispatchError, HookPhase};
pub use event::{EventBus, HandlerId};
pub use lifecycle::{ComponentState, ModuleState};
pub use module::{ComponentRef, Module, ModuleBuilder, ModuleEvent, ModuleSummary};
pub use ordering::{order, order_values, CycleError, Dependent, OrderKeys};
pub use registry::{Catalog, ComponentClass, ModuleClass};
pub use runtime::{boot, run, RunOptions, ShutdownOptions};
