// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Accepts framed requests on three transports and dispatches them through
//! a `HandlerRegistry`. Mirrors a classic reactor's `ready()` dispatch
//! loop: one accept loop per transport, handler execution offloaded so the
//! accept loop never blocks on a slow handler.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::frame;
use crate::global::CorrelationId;
use crate::handler_registry::HandlerRegistry;
use crate::transport::{self, Connection, FrameHandler};

pub struct CommandServer {
    application_name: String,
    registry: Arc<HandlerRegistry>,
    cancel: CancellationToken,
}

pub struct CommandServerHandle {
    pub rpc_port: u16,
    cancel: CancellationToken,
}

impl CommandServerHandle {
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl CommandServer {
    pub fn new(application_name: impl Into<String>, registry: Arc<HandlerRegistry>) -> CommandServer {
        CommandServer {
            application_name: application_name.into(),
            registry,
            cancel: CancellationToken::new(),
        }
    }

    /// Starts the in-process, IPC and TCP listeners and returns once the
    /// TCP port is bound. `channel_name` lets scale-out instances share one
    /// registry under distinct names (`applicationName-1`, ...).
    pub async fn start(&self, channel_name: &str, rpc_port_base: u16) -> io::Result<CommandServerHandle> {
        self.start_inproc(channel_name);
        self.start_ipc(channel_name);
        let rpc_port = self.start_tcp(rpc_port_base).await?;

        log::info!(
            "command server '{}' listening: inproc/ipc channel '{}', tcp port {}",
            self.application_name,
            channel_name,
            rpc_port
        );

        Ok(CommandServerHandle {
            rpc_port,
            cancel: self.cancel.clone(),
        })
    }

    fn start_inproc(&self, channel_name: &str) {
        let mut listener = transport::inproc::InprocListener::bind(channel_name);
        let registry = self.registry.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = listener.accept(move_handler(registry.clone(), cancel.clone())) => {
                        if accepted.is_none() {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn start_ipc(&self, channel_name: &str) {
        let registry = self.registry.clone();
        let cancel = self.cancel.clone();
        let channel_name = channel_name.to_string();
        tokio::spawn(async move {
            let listener = match transport::ipc::IpcListener::bind(&channel_name) {
                Ok(l) => l,
                Err(e) => {
                    log::warn!("failed to bind ipc listener for '{}': {}", channel_name, e);
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = listener.accept(move_handler(registry.clone(), cancel.clone())) => {
                        if accepted.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    async fn start_tcp(&self, rpc_port_base: u16) -> io::Result<u16> {
        let server = transport::tcp::TcpServer::bind_in_range(rpc_port_base).await?;
        let port = server.port();
        let registry = self.registry.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = server.accept(move_handler(registry.clone(), cancel.clone())) => {
                        if accepted.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Ok(port)
    }
}

/// Builds the per-connection frame handler: parse request, look up the
/// topic, offload the handler call to its own task, reply on completion.
fn move_handler(registry: Arc<HandlerRegistry>, cancel: CancellationToken) -> impl FnOnce(Connection) -> FrameHandler + Send + 'static {
    move |connection: Connection| {
        let registry = registry.clone();
        let cancel = cancel.clone();
        Arc::new(move |bytes: Bytes| {
            let registry = registry.clone();
            let connection = connection.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                handle_request(&registry, &connection, bytes, cancel).await;
            });
        })
    }
}

/// Runs the looked-up handler on its own task so a panic inside it unwinds
/// that task alone; the `JoinError` is folded into an empty reply, same as
/// an unregistered topic.
async fn handle_request(registry: &HandlerRegistry, connection: &Connection, bytes: Bytes, cancel: CancellationToken) {
    let (topic, correlation_id, payload) = match frame::decode_request(bytes) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::debug!("dropping malformed request frame: {}", e);
            return;
        }
    };

    let reply_payload = match registry.lookup(topic) {
        Some(dispatch) => match tokio::spawn(dispatch(payload, cancel)).await {
            Ok(bytes) => bytes,
            Err(join_err) => {
                log::warn!("handler for topic {:#x} panicked: {}", topic, join_err);
                Bytes::new()
            }
        },
        None => {
            log::debug!("no handler for topic {:#x}", topic);
            Bytes::new()
        }
    };

    reply(connection, correlation_id, reply_payload);
}

fn reply(connection: &Connection, correlation_id: CorrelationId, payload: Bytes) {
    let frame = frame::encode_reply(correlation_id, payload);
    if let Err(e) = connection.send(frame) {
        log::debug!("failed to send reply for correlation id {:?}: {}", correlation_id, e);
    }
}
