// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Per-scope connection owner. One `SocketManager` exists per scope
//! (Local/Machine/Cluster/Network); each applies its admission predicate to
//! `PeerJoined`/`PeerLeft` events and owns the resulting `mesh_id ->
//! Connection` map. Connection *establishment and teardown* is serialized
//! on a dedicated worker task (one thread owns the acceptor/connection map,
//! as in a classic reactor loop); once a connection exists,
//! sending through it is a thread-safe, non-blocking mailbox push, so
//! `schedule`/`iter`/`count` read the connection map directly without a
//! round trip through the worker.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::global::MeshId;
use crate::peer::{PeerContext, PeerEvent};
use crate::reply_router::ReplyRouter;
use crate::transport::{self, Connection};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Local,
    Machine,
    Cluster,
    Network,
}

/// What the admission predicates compare an incoming peer against.
pub struct AdmissionContext {
    pub local_mesh_id: MeshId,
    pub local_workstation_name: String,
    pub cluster_name: String,
    pub cluster_applications: Vec<String>,
    pub cluster_nodes: Vec<String>,
}

pub fn admits(scope: Scope, peer: &PeerContext, ctx: &AdmissionContext) -> bool {
    match scope {
        Scope::Local => peer.is_self,
        Scope::Machine => peer.workstation_name == ctx.local_workstation_name,
        Scope::Cluster => {
            peer.is_self
                || (!ctx.cluster_name.is_empty() && peer.cluster_name == ctx.cluster_name)
                || ctx.cluster_applications.iter().any(|a| a == &peer.application_name)
                || ctx.cluster_nodes.iter().any(|n| n == &peer.address)
        }
        Scope::Network => true,
    }
}

enum WorkerCommand {
    Joined(PeerContext),
    Left(PeerContext),
}

pub struct SocketManager {
    scope: Scope,
    connections: Arc<DashMap<MeshId, Connection>>,
    peers: Arc<DashMap<MeshId, PeerContext>>,
    reply_router: Arc<ReplyRouter>,
    admission_context: Arc<AdmissionContext>,
    worker: mpsc::UnboundedSender<WorkerCommand>,
}

impl SocketManager {
    pub fn new(scope: Scope, admission_context: AdmissionContext, reply_router: Arc<ReplyRouter>) -> Arc<SocketManager> {
        let connections: Arc<DashMap<MeshId, Connection>> = Arc::new(DashMap::new());
        let peers: Arc<DashMap<MeshId, PeerContext>> = Arc::new(DashMap::new());
        let admission_context = Arc::new(admission_context);
        let (tx, mut rx) = mpsc::unbounded_channel::<WorkerCommand>();

        {
            let connections = connections.clone();
            let peers = peers.clone();
            let reply_router = reply_router.clone();
            let admission_context = admission_context.clone();
            tokio::spawn(async move {
                while let Some(cmd) = rx.recv().await {
                    match cmd {
                        WorkerCommand::Joined(peer) => {
                            if !admits(scope, &peer, &admission_context) {
                                log::debug!("rejecting peer {:?} for scope {:?}", peer.mesh_id(), scope);
                                continue;
                            }
                            match establish(scope, &peer, reply_router.clone()).await {
                                Ok(conn) => {
                                    log::debug!("admitted peer {:?} into scope {:?}", peer.mesh_id(), scope);
                                    connections.insert(peer.mesh_id(), conn);
                                    peers.insert(peer.mesh_id(), peer);
                                }
                                Err(e) => {
                                    log::warn!("failed to connect to peer {:?}: {}", peer.mesh_id(), e);
                                }
                            }
                        }
                        WorkerCommand::Left(peer) => {
                            connections.remove(&peer.mesh_id());
                            peers.remove(&peer.mesh_id());
                        }
                    }
                }
            });
        }

        Arc::new(SocketManager {
            scope,
            connections,
            peers,
            reply_router,
            admission_context,
            worker: tx,
        })
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn handle_event(&self, event: PeerEvent) {
        let cmd = match event {
            PeerEvent::Joined(peer) => WorkerCommand::Joined(peer),
            PeerEvent::Left(peer) => WorkerCommand::Left(peer),
        };
        if self.worker.send(cmd).is_err() {
            log::warn!("socket manager worker for scope {:?} is gone", self.scope);
        }
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Up to `max` connections whose peer admits `topic`. Order
    /// follows `DashMap` iteration, which is stable within one call.
    pub fn iter(&self, max: usize, topic: u64) -> Vec<(MeshId, Connection)> {
        self.connections
            .iter()
            .filter(|entry| {
                self.peers
                    .get(entry.key())
                    .map(|p| p.admits_topic(topic))
                    .unwrap_or(true)
            })
            .take(max)
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Snapshot of the `PeerContext` this manager currently holds for
    /// `mesh_id`, if it is still connected. Used to attribute a failed
    /// reply to the peer that sent it.
    pub fn peer(&self, mesh_id: MeshId) -> Option<PeerContext> {
        self.peers.get(&mesh_id).map(|entry| entry.value().clone())
    }

    pub fn get_by_application(&self, application_name: &str, topic: u64) -> Option<(MeshId, Connection)> {
        self.peers.iter().find_map(|entry| {
            let peer = entry.value();
            if peer.application_name == application_name && peer.admits_topic(topic) {
                self.connections.get(entry.key()).map(|c| (*entry.key(), c.clone()))
            } else {
                None
            }
        })
    }

    pub fn schedule(&self, mesh_id: MeshId, frame: Bytes) -> std::io::Result<()> {
        match self.connections.get(&mesh_id) {
            Some(conn) => conn.send(frame),
            None => Err(std::io::Error::new(std::io::ErrorKind::NotFound, "unknown peer")),
        }
    }
}

async fn establish(scope: Scope, peer: &PeerContext, reply_router: Arc<ReplyRouter>) -> std::io::Result<Connection> {
    let on_frame_for = move |_conn: Connection| {
        let reply_router = reply_router.clone();
        Arc::new(move |bytes: Bytes| reply_router.on_frame(bytes)) as transport::FrameHandler
    };

    match scope {
        Scope::Local => transport::inproc::connect(&peer.application_name, on_frame_for),
        Scope::Machine => transport::ipc::connect(&peer.application_name, on_frame_for).await,
        Scope::Cluster | Scope::Network => transport::tcp::connect(&peer.address, peer.rpc_port, on_frame_for).await,
    }
}
