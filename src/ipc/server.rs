//! TCP IPC server - accept loop and per-connection handler.

use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::ipc::codec::{read_frame, write_frame, MSG_ERROR, MSG_REQUEST, MSG_RESPONSE};
use crate::ipc::router;
use crate::service::ToolService;
use crate::types::IpcConfig;

/// Encode a JSON value to msgpack. Logs and returns an error on failure
/// instead of silently producing an empty vec.
fn encode_msgpack(value: &Value) -> std::io::Result<Vec<u8>> {
    rmp_serde::to_vec_named(value).map_err(|e| {
        tracing::error!("msgpack_encode_failed: error={}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
    })
}

fn error_payload(request_id: &str, code: &str, message: impl Into<String>) -> Value {
    json!({
        "id": request_id,
        "ok": false,
        "error": {
            "code": code,
            "message": message.into(),
        }
    })
}

/// IPC server wrapping the tool service.
#[derive(Debug)]
pub struct IpcServer {
    service: Arc<ToolService>,
    addr: SocketAddr,
    cancel: CancellationToken,
    ipc_config: IpcConfig,
}

impl IpcServer {
    pub fn new(service: Arc<ToolService>, addr: SocketAddr, ipc_config: IpcConfig) -> Self {
        Self {
            service,
            addr,
            cancel: CancellationToken::new(),
            ipc_config,
        }
    }

    /// Bind the configured address and serve until cancelled.
    pub async fn serve(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already-bound listener until cancelled or a fatal error.
    pub async fn serve_on(&self, listener: TcpListener) -> std::io::Result<()> {
        let conn_semaphore = Arc::new(Semaphore::new(self.ipc_config.max_connections));
        tracing::info!(
            "ipc_server_listening: addr={} max_connections={}",
            listener.local_addr()?,
            self.ipc_config.max_connections,
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("ipc_server_shutdown");
                    break;
                }
                accept = listener.accept() => {
                    let (stream, peer) = accept?;

                    // Backpressure when at capacity.
                    let permit = match conn_semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            tracing::warn!(
                                "ipc_connection_rejected: peer={} max_connections={}",
                                peer,
                                self.ipc_config.max_connections,
                            );
                            drop(stream);
                            continue;
                        }
                    };

                    tracing::debug!(
                        "ipc_connection_accepted: peer={} active={}",
                        peer,
                        self.ipc_config.max_connections - conn_semaphore.available_permits(),
                    );
                    let service = self.service.clone();
                    let cancel = self.cancel.child_token();
                    let ipc_config = self.ipc_config.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, service, cancel, ipc_config, permit).await {
                            tracing::warn!("ipc_connection_error: peer={} error={}", peer, e);
                        }
                    });
                }
            }
        }
        Ok(())
    }

    /// Request graceful shutdown. In-flight tool calls are cancelled.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Read frames, dispatch, write responses. Requests on one connection are
/// served in order.
async fn handle_connection(
    stream: TcpStream,
    service: Arc<ToolService>,
    cancel: CancellationToken,
    ipc_config: IpcConfig,
    _permit: OwnedSemaphorePermit, // held for connection lifetime
) -> std::io::Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let read_timeout = Duration::from_secs(ipc_config.read_timeout_secs);
    let write_timeout = Duration::from_secs(ipc_config.write_timeout_secs);

    // Cancel in-flight calls when this connection ends.
    let _guard = cancel.clone().drop_guard();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame_result = tokio::time::timeout(read_timeout, read_frame(&mut reader, ipc_config.max_frame_bytes)) => {
                let frame = match frame_result {
                    Err(_elapsed) => {
                        tracing::debug!("ipc_read_timeout: secs={}", ipc_config.read_timeout_secs);
                        break;
                    }
                    Ok(result) => match result? {
                        Some(f) => f,
                        None => break, // clean EOF
                    },
                };

                let (msg_type, payload_bytes) = frame;

                if msg_type != MSG_REQUEST {
                    let payload = error_payload(
                        "",
                        "INVALID_ARGUMENT",
                        format!("Unexpected message type: 0x{:02X}", msg_type),
                    );
                    timed_write(&mut writer, MSG_ERROR, &encode_msgpack(&payload)?, write_timeout).await?;
                    continue;
                }

                let request: Value = match rmp_serde::from_slice(&payload_bytes) {
                    Ok(v) => v,
                    Err(e) => {
                        let payload = error_payload("", "INVALID_ARGUMENT", format!("Invalid msgpack: {}", e));
                        timed_write(&mut writer, MSG_ERROR, &encode_msgpack(&payload)?, write_timeout).await?;
                        continue;
                    }
                };

                let request_id = request.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let service_name = request.get("service").and_then(|v| v.as_str()).unwrap_or("");
                let method = request.get("method").and_then(|v| v.as_str()).unwrap_or("");
                let body = request
                    .get("body")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

                let result = router::route_request(&service, service_name, method, body, &cancel).await;

                match result {
                    Ok(response_body) => {
                        let response = json!({
                            "id": request_id,
                            "ok": true,
                            "body": response_body,
                        });
                        timed_write(&mut writer, MSG_RESPONSE, &encode_msgpack(&response)?, write_timeout).await?;
                    }
                    Err(e) => {
                        tracing::debug!(
                            "ipc_request_failed: service={} method={} code={} error={}",
                            service_name,
                            method,
                            e.to_ipc_error_code(),
                            e
                        );
                        let mut payload = error_payload(&request_id, e.to_ipc_error_code(), e.to_string());
                        if !e.violations().is_empty() {
                            payload["error"]["violations"] = json!(e.violations());
                        }
                        timed_write(&mut writer, MSG_ERROR, &encode_msgpack(&payload)?, write_timeout).await?;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Write a frame with a timeout so slow consumers cannot hold a connection.
async fn timed_write<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg_type: u8,
    payload: &[u8],
    timeout: Duration,
) -> std::io::Result<()> {
    tokio::time::timeout(timeout, write_frame(writer, msg_type, payload))
        .await
        .map_err(|_| {
            tracing::warn!("ipc_write_timeout: secs={}", timeout.as_secs());
            std::io::Error::new(std::io::ErrorKind::TimedOut, "write timeout")
        })?
}
