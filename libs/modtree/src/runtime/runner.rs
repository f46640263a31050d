//! Process-level runner: boot the root module, then wait for shutdown.
//!
//! Shutdown can be driven by OS signals, an external `CancellationToken`,
//! or an arbitrary future.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio_util::sync::CancellationToken;

use crate::config::ModuleConfig;
use crate::error::BootstrapError;
use crate::module::Module;
use crate::registry::Catalog;
use crate::runtime::shutdown;

/// How the runner should decide when to stop.
pub enum ShutdownOptions {
    /// Listen for OS signals (Ctrl+C / SIGTERM).
    Signals,
    /// An external `CancellationToken` controls the lifecycle.
    Token(CancellationToken),
    /// An arbitrary future; when it completes, we initiate shutdown.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

pub struct RunOptions {
    /// Id of the root module.
    pub root_id: String,
    /// Configuration of the root module.
    pub root: ModuleConfig,
    pub catalog: Arc<Catalog>,
    pub shutdown: ShutdownOptions,
}

/// Build and bootstrap the root module without waiting.
pub async fn boot(
    root_id: &str,
    root: ModuleConfig,
    catalog: Arc<Catalog>,
) -> Result<Arc<Module>, BootstrapError> {
    let module = Module::builder()
        .id(root_id)
        .config(root)
        .catalog(catalog)
        .build()?;
    module.clone().bootstrap().await?;
    Ok(module)
}

/// Full cycle: boot -> wait for shutdown. Returns the booted root.
pub async fn run(opts: RunOptions) -> anyhow::Result<Arc<Module>> {
    let cancel = match &opts.shutdown {
        ShutdownOptions::Token(t) => t.clone(),
        _ => CancellationToken::new(),
    };

    match opts.shutdown {
        ShutdownOptions::Signals => {
            let c = cancel.clone();
            tokio::spawn(async move {
                match shutdown::wait_for_shutdown().await {
                    Ok(()) => {
                        tracing::info!("shutdown: signal received");
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "shutdown: primary waiter failed; falling back to ctrl_c()"
                        );
                        let _ = tokio::signal::ctrl_c().await;
                    }
                }
                c.cancel();
            });
        }
        ShutdownOptions::Future(waiter) => {
            let c = cancel.clone();
            tokio::spawn(async move {
                waiter.await;
                tracing::info!("shutdown: external future completed");
                c.cancel();
            });
        }
        ShutdownOptions::Token(_) => {
            tracing::info!("shutdown: external token will control lifecycle");
        }
    }

    tracing::info!(root = %opts.root_id, "bootstrapping module tree");
    let root = boot(&opts.root_id, opts.root, opts.catalog).await?;
    tracing::info!(
        root = %root.id(),
        components = root.own_components().len(),
        children = root.children().len(),
        "module tree ready"
    );

    cancel.cancelled().await;

    tracing::info!("module tree stopped");
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn run_returns_after_token_cancel() {
        let token = CancellationToken::new();
        let opts = RunOptions {
            root_id: "app".into(),
            root: ModuleConfig::new().module("child", ModuleConfig::new()),
            catalog: Arc::new(Catalog::new()),
            shutdown: ShutdownOptions::Token(token.clone()),
        };
        let handle = tokio::spawn(run(opts));
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let root = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("runner should stop")
            .unwrap()
            .unwrap();
        assert!(root.child("child").is_some());
    }

    #[tokio::test]
    async fn run_stops_when_future_completes() {
        let opts = RunOptions {
            root_id: "app".into(),
            root: ModuleConfig::new(),
            catalog: Arc::new(Catalog::new()),
            shutdown: ShutdownOptions::Future(Box::pin(async {})),
        };
        let root = tokio::time::timeout(Duration::from_secs(1), run(opts))
            .await
            .expect("runner should stop")
            .unwrap();
        assert_eq!(root.id(), "app");
    }

    #[tokio::test]
    async fn boot_failure_surfaces_before_waiting() {
        let opts = RunOptions {
            root_id: "app".into(),
            root: ModuleConfig::new().component("ghost", serde_json::json!(true)),
            catalog: Arc::new(Catalog::new()),
            shutdown: ShutdownOptions::Token(CancellationToken::new()),
        };
        let err = run(opts).await.unwrap_err();
        assert!(err.to_string().contains("ghost"), "{err}");
    }
}
