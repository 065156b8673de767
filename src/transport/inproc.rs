// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! In-process transport for the Local scope: peers that are the same
//! process never leave memory. A process-wide registry maps application
//! name to its listener; `connect` and `listen` hand each other a pair of
//! channels instead of a socket. There is no length-prefix framing here -
//! whole payloads are already discrete `Bytes` values in memory.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use tokio::sync::mpsc;

use super::{Connection, FrameHandler};

struct ConnectRequest {
    inbound: mpsc::UnboundedReceiver<Bytes>,
    reply_to: mpsc::UnboundedSender<Bytes>,
}

static REGISTRY: Lazy<DashMap<String, mpsc::UnboundedSender<ConnectRequest>>> = Lazy::new(DashMap::new);

pub struct InprocListener {
    application_name: String,
    requests: mpsc::UnboundedReceiver<ConnectRequest>,
}

impl InprocListener {
    pub fn bind(application_name: &str) -> InprocListener {
        let (tx, rx) = mpsc::unbounded_channel();
        REGISTRY.insert(application_name.to_string(), tx);
        InprocListener {
            application_name: application_name.to_string(),
            requests: rx,
        }
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    /// Accepts the next connection, wiring it through `make_handler` the
    /// same way `spawn_duplex` does for real streams.
    pub async fn accept<F>(&mut self, make_handler: F) -> Option<Connection>
    where
        F: FnOnce(Connection) -> FrameHandler + Send + 'static,
    {
        let req = self.requests.recv().await?;
        Some(wire(req.inbound, req.reply_to, make_handler))
    }
}

impl Drop for InprocListener {
    fn drop(&mut self) {
        REGISTRY.remove(&self.application_name);
    }
}

/// Connects to an in-process listener bound under `application_name`.
/// Returns `ConnectionRefused` if nothing is listening - mirroring what a
/// real socket connect would report.
pub fn connect<F>(application_name: &str, make_handler: F) -> io::Result<Connection>
where
    F: FnOnce(Connection) -> FrameHandler + Send + 'static,
{
    let listener_tx = REGISTRY
        .get(application_name)
        .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, "no in-process listener for application"))?
        .clone();

    let (to_server, server_inbound) = mpsc::unbounded_channel();
    let (to_client, client_inbound) = mpsc::unbounded_channel();

    listener_tx
        .send(ConnectRequest {
            inbound: server_inbound,
            reply_to: to_client,
        })
        .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "in-process listener went away"))?;

    Ok(wire(client_inbound, to_server, make_handler))
}

fn wire<F>(mut inbound: mpsc::UnboundedReceiver<Bytes>, outgoing: mpsc::UnboundedSender<Bytes>, make_handler: F) -> Connection
where
    F: FnOnce(Connection) -> FrameHandler + Send + 'static,
{
    let connection = Connection::from_sender(outgoing);
    let on_frame: FrameHandler = make_handler(connection.clone());

    tokio::spawn(async move {
        while let Some(frame) = inbound.recv().await {
            on_frame(frame);
        }
    });

    connection
}

#[allow(dead_code)]
fn assert_handler_is_arc(_: &Arc<dyn Fn(Bytes) + Send + Sync>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn connect_without_a_listener_is_refused() {
        let result = connect("NoSuchApp", |_| Arc::new(|_| {}));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn client_and_server_exchange_frames() {
        let mut listener = InprocListener::bind("EchoApp");

        let server_task = tokio::spawn(async move {
            let conn = listener
                .accept(|conn| {
                    let conn = conn.clone();
                    Arc::new(move |frame: Bytes| {
                        conn.send(frame).unwrap();
                    })
                })
                .await;
            conn.is_some()
        });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let received = Arc::new(Mutex::new(None));
        let received_clone = received.clone();
        let client = connect("EchoApp", move |_| {
            Arc::new(move |frame: Bytes| {
                *received_clone.lock().unwrap() = Some(frame);
            })
        })
        .unwrap();

        client.send(Bytes::from_static(b"hello")).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(received.lock().unwrap().as_deref(), Some(&b"hello"[..]));
        assert!(server_task.await.unwrap());
    }
}
