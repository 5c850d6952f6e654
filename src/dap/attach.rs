//! Debugger attach manager.
//!
//! Attaching is a single synchronous outcome: either a [`DebugSession`] in
//! the `Attached` state or `AppError::AttachFailure`. Failures are never
//! retried here.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::AdapterConfig;
use crate::dap::client::DapClient;
use crate::dap::{DebugProtocol, ProtocolEvent, Subscription};
use crate::models::{AttachConfig, DebugSession};
use crate::{AppError, Result};

/// How long to wait for the adapter's `initialized` event before sending
/// `configurationDone` anyway.
const INITIALIZED_EVENT_WAIT: Duration = Duration::from_secs(5);

/// Issues the attach request against the debugging subsystem.
pub trait Attacher: Send + Sync {
    /// Attach to the inspector described by `config`.
    ///
    /// Events the debuggee raises once the attach releases it must not be
    /// lost: implementations open a subscription before that point and hand
    /// it over with [`DebugSession::with_events`].
    ///
    /// # Errors
    ///
    /// Returns [`AppError::AttachFailure`] when the attach is rejected,
    /// fails, or times out.
    fn attach(
        &self,
        config: AttachConfig,
    ) -> Pin<Box<dyn Future<Output = Result<DebugSession>> + Send + '_>>;
}

/// [`Attacher`] that spawns a stdio debug adapter per session.
#[derive(Debug, Clone)]
pub struct DapAttacher {
    adapter: AdapterConfig,
    timeout: Duration,
}

impl DapAttacher {
    /// Create an attacher for `adapter` bounded by `timeout`.
    #[must_use]
    pub fn new(adapter: AdapterConfig, timeout: Duration) -> Self {
        Self { adapter, timeout }
    }
}

impl Attacher for DapAttacher {
    fn attach(
        &self,
        config: AttachConfig,
    ) -> Pin<Box<dyn Future<Output = Result<DebugSession>> + Send + '_>> {
        Box::pin(async move {
            let client = DapClient::spawn(&self.adapter, self.timeout)
                .await
                .map_err(|e| AppError::AttachFailure(e.to_string()))?;
            // Opened before `configurationDone` releases the debuggee.
            let events = client.subscribe();

            let outcome = tokio::time::timeout(
                self.timeout,
                attach_sequence(&client, &self.adapter.adapter_id, &config),
            )
            .await;

            match outcome {
                Ok(Ok(())) => {
                    info!(port = config.port, "debugger attached");
                    Ok(DebugSession::attached(config, Arc::new(client)).with_events(events))
                }
                Ok(Err(e)) => {
                    client.shutdown().await;
                    Err(AppError::AttachFailure(e.to_string()))
                }
                Err(_) => {
                    client.shutdown().await;
                    Err(AppError::AttachFailure(format!(
                        "attach did not complete within {:?}",
                        self.timeout
                    )))
                }
            }
        })
    }
}

/// Run `initialize` → `attach` → `configurationDone` on a connected client.
///
/// The attach response is awaited only after `configurationDone`, because
/// adapters hold it until configuration is complete.
///
/// # Errors
///
/// Returns `AppError::Protocol` when any request fails.
pub async fn attach_sequence(
    client: &DapClient,
    adapter_id: &str,
    config: &AttachConfig,
) -> Result<()> {
    let mut events = client.subscribe();

    client
        .request("initialize", initialize_arguments(adapter_id))
        .await?;

    let (attach_seq, attach_rx) = client
        .request_begin("attach", config.to_attach_arguments(adapter_id))
        .await?;

    if !wait_for_initialized(&mut events, INITIALIZED_EVENT_WAIT).await {
        warn!("adapter did not send 'initialized'; sending configurationDone anyway");
    }

    client.request("configurationDone", json!({})).await?;
    client.await_response("attach", attach_seq, attach_rx).await?;
    Ok(())
}

fn initialize_arguments(adapter_id: &str) -> Value {
    json!({
        "adapterID": adapter_id,
        "clientID": "inspect-gate",
        "clientName": "inspect-gate",
        "locale": "en-US",
        "pathFormat": "path",
        "linesStartAt1": true,
        "columnsStartAt1": true,
        "supportsRunInTerminalRequest": false,
    })
}

async fn wait_for_initialized(events: &mut Subscription, wait: Duration) -> bool {
    let seen = async {
        while let Some(event) = events.recv().await {
            if event == ProtocolEvent::Initialized {
                return true;
            }
        }
        false
    };
    tokio::time::timeout(wait, seen).await.unwrap_or(false)
}
