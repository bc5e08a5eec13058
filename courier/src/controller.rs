use std::sync::{Arc, LazyLock};

use anyhow::Context;
use courier_common::{Signal, StatusUpdate, internal, logging, tracing};
use courier_control::{ControlServer, DEFAULT_CONTROL_SOCKET};
use courier_reconcile::{
    HttpStatusClient, ReconcileService, ReconcilerConfig, StatusClientConfig, Subscription,
};
use courier_store::StoreConfig;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::control_handler::CourierControlHandler;

#[allow(clippy::unnecessary_wraps)]
fn default_control_socket() -> Option<String> {
    Some(DEFAULT_CONTROL_SOCKET.to_string())
}

/// Top-level configuration, deserialised from `courier.config.ron`
#[derive(Debug, Deserialize)]
pub struct Courier {
    #[serde(default)]
    reconciler: ReconcilerConfig,
    #[serde(alias = "status", default)]
    status_client: StatusClientConfig,
    #[serde(alias = "records", default)]
    store: StoreConfig,
    /// `None` disables the control socket
    #[serde(default = "default_control_socket")]
    control_socket: Option<String>,
    /// Seed the queue from the store before the scheduler starts
    #[serde(default)]
    bootstrap_on_start: bool,
}

impl Default for Courier {
    fn default() -> Self {
        Self {
            reconciler: ReconcilerConfig::default(),
            status_client: StatusClientConfig::default(),
            store: StoreConfig::default(),
            control_socket: default_control_socket(),
            bootstrap_on_start: false,
        }
    }
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    tokio::signal::ctrl_c().await?;
    internal!(level = WARN, "Forcing shutdown");
    std::process::exit(130)
}

/// Logs every reconciled batch
#[allow(clippy::unnecessary_wraps)]
fn log_updates(updates: &[StatusUpdate]) -> anyhow::Result<()> {
    for update in updates {
        tracing::info!(
            external_id = %update.external_id,
            destination = %update.destination_address,
            status = %update.status,
            error_code = ?update.error_code,
            "Delivery status reconciled"
        );
    }
    Ok(())
}

impl Courier {
    #[must_use]
    pub const fn reconciler(&self) -> &ReconcilerConfig {
        &self.reconciler
    }

    #[must_use]
    pub fn control_socket(&self) -> Option<&str> {
        self.control_socket.as_deref()
    }

    /// Build the record store, status client and engine
    ///
    /// # Errors
    ///
    /// This function will return an error if the store cannot be opened or
    /// the engine configuration is invalid.
    pub fn init(self) -> anyhow::Result<CourierRuntime> {
        let store = self
            .store
            .into_record_store()
            .context("Failed to initialise record store")?;
        let client = Arc::new(
            HttpStatusClient::new(&self.status_client)
                .context("Failed to build status client")?,
        );
        let service = Arc::new(
            ReconcileService::new(self.reconciler, store, client)
                .context("Invalid reconciler configuration")?,
        );

        let updates = service.subscribe(log_updates);

        let control = self
            .control_socket
            .map(|path| {
                ControlServer::new(
                    path,
                    Arc::new(CourierControlHandler::new(Arc::<ReconcileService>::clone(&service))),
                )
            })
            .transpose()
            .context("Failed to create control server")?;

        Ok(CourierRuntime {
            service,
            control,
            bootstrap_on_start: self.bootstrap_on_start,
            updates,
        })
    }

    /// Run this controller, and everything it controls, until SIGINT/SIGTERM
    ///
    /// # Errors
    ///
    /// This function will return an error if initialisation fails or the
    /// control socket cannot be bound.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let runtime = self.init()?;

        internal!(level = INFO, "Controller running");

        let signals = tokio::spawn(async {
            if let Err(e) = shutdown().await {
                tracing::error!("Signal handling failed: {e}");
            }
        });

        let ret = runtime.serve(&SHUTDOWN_BROADCAST).await;
        signals.abort();

        internal!(level = INFO, "Shutting down...");

        ret
    }
}

/// A fully initialised engine with its control surface
pub struct CourierRuntime {
    service: Arc<ReconcileService>,
    control: Option<ControlServer>,
    bootstrap_on_start: bool,
    updates: Subscription,
}

impl CourierRuntime {
    #[must_use]
    pub const fn service(&self) -> &Arc<ReconcileService> {
        &self.service
    }

    /// Serve until `shutdown` broadcasts a signal
    ///
    /// # Errors
    ///
    /// Returns an error if the start-up bootstrap fails or the control server
    /// cannot bind its socket.
    pub async fn serve(self, shutdown: &broadcast::Sender<Signal>) -> anyhow::Result<()> {
        let engine_shutdown = shutdown.subscribe();
        let control_shutdown = shutdown.subscribe();

        if self.bootstrap_on_start {
            let added = self
                .service
                .bootstrap()
                .await
                .context("Failed to bootstrap reconciliation queue")?;
            internal!(level = INFO, "Bootstrapped {added} task(s) from the record store");
        }

        let engine = async {
            self.service
                .serve(engine_shutdown)
                .await
                .map_err(anyhow::Error::from)
        };

        let ret = match &self.control {
            Some(server) => tokio::try_join!(engine, async {
                server
                    .serve(control_shutdown)
                    .await
                    .context("Control server failed")
            })
            .map(|_| ()),
            None => engine.await,
        };

        self.updates.unsubscribe();
        ret
    }
}
