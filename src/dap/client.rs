//! DAP client over an adapter's stdio.
//!
//! A reader task routes responses to pending requests by `request_seq` and
//! publishes events through an [`EventHub`]; a writer task serialises
//! outbound requests. When the adapter stream closes, every pending request
//! fails and subscribers receive [`ProtocolEvent::Terminated`].

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::AdapterConfig;
use crate::dap::codec::DapCodec;
use crate::dap::events::{EventHub, Subscription};
use crate::dap::{DebugProtocol, ProtocolEvent, ProtocolFuture, ThreadInfo};
use crate::models::{StackFrame, StopReason};
use crate::{AppError, Result};

/// Capacity of the outbound request queue.
const OUTBOUND_CAPACITY: usize = 64;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// Connection to one debug adapter.
#[derive(Debug)]
pub struct DapClient {
    outbound: mpsc::Sender<Value>,
    pending: PendingMap,
    next_seq: AtomicU64,
    events: EventHub,
    request_timeout: Duration,
    cancel: CancellationToken,
    adapter: Mutex<Option<Child>>,
}

impl DapClient {
    /// Spawn the adapter process and connect to its stdio.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the adapter cannot be started or its
    /// pipes cannot be captured.
    pub async fn spawn(adapter: &AdapterConfig, request_timeout: Duration) -> Result<Self> {
        let mut child = Command::new(&adapter.command)
            .args(&adapter.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AppError::Spawn(format!(
                    "failed to spawn debug adapter '{}': {e}",
                    adapter.command
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Spawn("failed to capture adapter stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Spawn("failed to capture adapter stdout".into()))?;

        info!(
            adapter = adapter.command,
            pid = child.id().unwrap_or(0),
            "debug adapter spawned"
        );

        let client = Self::from_transport(stdout, stdin, request_timeout);
        *client.adapter.lock().await = Some(child);
        Ok(client)
    }

    /// Connect to an adapter over an arbitrary byte stream pair.
    #[must_use]
    pub fn from_transport<R, W>(reader: R, writer: W, request_timeout: Duration) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let events = EventHub::new();
        let cancel = CancellationToken::new();
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);

        tokio::spawn(
            run_reader(reader, Arc::clone(&pending), events.clone(), cancel.clone())
                .instrument(info_span!("dap_reader")),
        );
        tokio::spawn(run_writer(writer, outbound_rx, cancel.clone()).instrument(info_span!("dap_writer")));

        Self {
            outbound,
            pending,
            next_seq: AtomicU64::new(0),
            events,
            request_timeout,
            cancel,
            adapter: Mutex::new(None),
        }
    }

    /// Queue a request and return its sequence number and response receiver.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if the writer task has stopped.
    pub async fn request_begin(
        &self,
        command: &str,
        arguments: Value,
    ) -> Result<(u64, oneshot::Receiver<Value>)> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let request = json!({
            "seq": seq,
            "type": "request",
            "command": command,
            "arguments": arguments,
        });

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(seq, tx);

        if self.outbound.send(request).await.is_err() {
            self.pending.lock().await.remove(&seq);
            return Err(AppError::Protocol(format!(
                "adapter connection closed before sending '{command}'"
            )));
        }

        debug!(seq, command, "dap request sent");
        Ok((seq, rx))
    }

    /// Wait for the response to a request started with [`request_begin`](Self::request_begin).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` on timeout, closed connection, or a
    /// response with `success: false`.
    pub async fn await_response(
        &self,
        command: &str,
        seq: u64,
        rx: oneshot::Receiver<Value>,
    ) -> Result<Value> {
        let response = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(value)) => value,
            Ok(Err(_)) => {
                return Err(AppError::Protocol(format!(
                    "adapter connection closed while waiting for '{command}'"
                )));
            }
            Err(_) => {
                self.pending.lock().await.remove(&seq);
                return Err(AppError::Protocol(format!(
                    "timed out waiting for response to '{command}'"
                )));
            }
        };

        let success = response
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        if !success {
            let message = response
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown adapter error");
            return Err(AppError::Protocol(format!(
                "request '{command}' failed: {message}"
            )));
        }

        Ok(response)
    }

    /// Send a request and wait for its successful response.
    ///
    /// # Errors
    ///
    /// See [`request_begin`](Self::request_begin) and
    /// [`await_response`](Self::await_response).
    pub async fn request(&self, command: &str, arguments: Value) -> Result<Value> {
        let (seq, rx) = self.request_begin(command, arguments).await?;
        self.await_response(command, seq, rx).await
    }

    /// Stop the I/O tasks and kill the adapter process. Idempotent.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(mut child) = self.adapter.lock().await.take() {
            child.kill().await.ok();
        }
    }
}

impl DebugProtocol for DapClient {
    fn threads(&self) -> ProtocolFuture<'_, Vec<ThreadInfo>> {
        Box::pin(async move {
            let response = self.request("threads", json!({})).await?;
            Ok(parse_threads(&response))
        })
    }

    fn top_frame(&self, thread_id: i64) -> ProtocolFuture<'_, Option<StackFrame>> {
        Box::pin(async move {
            let response = self
                .request(
                    "stackTrace",
                    json!({ "threadId": thread_id, "startFrame": 0, "levels": 1 }),
                )
                .await?;
            Ok(parse_top_frame(&response))
        })
    }

    fn resume(&self, thread_id: i64) -> ProtocolFuture<'_, ()> {
        Box::pin(async move {
            self.request("continue", json!({ "threadId": thread_id }))
                .await
                .map(|_| ())
        })
    }

    fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    fn disconnect(&self) -> ProtocolFuture<'_, ()> {
        Box::pin(async move {
            let result = self
                .request("disconnect", json!({ "terminateDebuggee": false }))
                .await
                .map(|_| ());
            self.shutdown().await;
            result
        })
    }
}

async fn run_reader<R>(reader: R, pending: PendingMap, events: EventHub, cancel: CancellationToken)
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(reader, DapCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("dap reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => match item {
                None => {
                    debug!("dap reader: adapter stream closed");
                    break;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "dap reader: framing error, stopping");
                    break;
                }
                Some(Ok(message)) => route_message(message, &pending, &events).await,
            }
        }
    }

    // Dropping the senders fails every outstanding request.
    pending.lock().await.clear();
    events.publish(&ProtocolEvent::Terminated);
    events.close();
}

async fn run_writer<W>(writer: W, mut rx: mpsc::Receiver<Value>, cancel: CancellationToken)
where
    W: AsyncWrite + Unpin + Send,
{
    let mut framed = FramedWrite::new(writer, DapCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            message = rx.recv() => {
                let Some(message) = message else { break };
                if let Err(e) = framed.send(message).await {
                    warn!(error = %e, "dap writer: write to adapter failed");
                    break;
                }
            }
        }
    }
}

async fn route_message(message: Value, pending: &PendingMap, events: &EventHub) {
    match message.get("type").and_then(Value::as_str) {
        Some("response") => {
            if let Some(request_seq) = message.get("request_seq").and_then(Value::as_u64) {
                if let Some(tx) = pending.lock().await.remove(&request_seq) {
                    let _ = tx.send(message);
                }
            }
        }
        Some("event") => {
            if let Some(event) = parse_event(&message) {
                debug!(?event, "dap event");
                events.publish(&event);
            }
        }
        other => {
            debug!(kind = ?other, "dap reader: ignoring message");
        }
    }
}

/// Map a raw DAP event message to a [`ProtocolEvent`]; `None` for events
/// the engine does not consume.
#[must_use]
pub fn parse_event(message: &Value) -> Option<ProtocolEvent> {
    let body = message.get("body");
    let thread_id = || body.and_then(|b| b.get("threadId")).and_then(Value::as_i64);

    match message.get("event").and_then(Value::as_str)? {
        "initialized" => Some(ProtocolEvent::Initialized),
        "stopped" => {
            let reason = body
                .and_then(|b| b.get("reason"))
                .and_then(Value::as_str)
                .unwrap_or("pause");
            Some(ProtocolEvent::Stopped {
                thread_id: thread_id(),
                reason: StopReason::from_wire(reason),
            })
        }
        "continued" => Some(ProtocolEvent::Continued {
            thread_id: thread_id(),
        }),
        "exited" => Some(ProtocolEvent::Exited {
            exit_code: body.and_then(|b| b.get("exitCode")).and_then(Value::as_i64),
        }),
        "terminated" => Some(ProtocolEvent::Terminated),
        _ => None,
    }
}

fn parse_threads(response: &Value) -> Vec<ThreadInfo> {
    response
        .get("body")
        .and_then(|b| b.get("threads"))
        .and_then(Value::as_array)
        .map(|threads| {
            threads
                .iter()
                .filter_map(|t| {
                    Some(ThreadInfo {
                        id: t.get("id").and_then(Value::as_i64)?,
                        name: t
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_owned(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_top_frame(response: &Value) -> Option<StackFrame> {
    let frame = response
        .get("body")
        .and_then(|b| b.get("stackFrames"))
        .and_then(Value::as_array)?
        .first()?;

    let source = frame.get("source");
    let source_path = source
        .and_then(|s| s.get("path").or_else(|| s.get("name")))
        .and_then(Value::as_str)
        .map(str::to_owned);

    Some(StackFrame {
        id: frame.get("id").and_then(Value::as_i64).unwrap_or_default(),
        name: frame
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("<anonymous>")
            .to_owned(),
        source_path,
        line: wire_u32(frame.get("line")),
        column: wire_u32(frame.get("column")),
    })
}

fn wire_u32(value: Option<&Value>) -> u32 {
    value
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or_default()
}
