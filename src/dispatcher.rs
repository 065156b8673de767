// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Single entry point an application holds onto: four
//! preconfigured command scopes, one per admission scope, plus the command
//! server that answers them. It is the one object an application talks to
//! while a worker does the real connection handling underneath.

use std::sync::Arc;
use std::time::Duration;

use crate::command_scope::CommandScope;
use crate::config::MeshConfig;
use crate::command_server::{CommandServer, CommandServerHandle};
use crate::global::{IdSequence, MeshId};
use crate::handler_registry::HandlerRegistry;
use crate::peer::PeerEvent;
use crate::pending_reply::PendingReplyPool;
use crate::reply_router::ReplyRouter;
use crate::socket_manager::{AdmissionContext, Scope, SocketManager};

pub struct Dispatcher {
    pub local: CommandScope,
    pub machine: CommandScope,
    pub cluster: CommandScope,
    pub network: CommandScope,

    managers: [Arc<SocketManager>; 4],
    local_mesh_id: MeshId,
}

const POOL_CORE_SIZE: usize = 16;
const POOL_MAX_SIZE: usize = 256;
const POOL_BURST_MAX: usize = 4096;
const POOL_BURST_TTL: Duration = Duration::from_secs(30);

impl Dispatcher {
    pub fn new(config: &MeshConfig, local_mesh_id: MeshId, workstation_name: &str) -> Dispatcher {
        let id_seq = Arc::new(IdSequence::new());

        let build = |scope: Scope| -> (Arc<SocketManager>, CommandScope) {
            let reply_router = Arc::new(ReplyRouter::new());
            let admission_context = AdmissionContext {
                local_mesh_id,
                local_workstation_name: workstation_name.to_string(),
                cluster_name: config.cluster.cluster_name.clone(),
                cluster_applications: config.cluster.applications.clone(),
                cluster_nodes: config.cluster.nodes.clone(),
            };
            let manager = SocketManager::new(scope, admission_context, reply_router.clone());
            let pool = PendingReplyPool::new(POOL_CORE_SIZE, POOL_MAX_SIZE, POOL_BURST_MAX, POOL_BURST_TTL);
            pool.spawn_trimmer();
            let command_scope = CommandScope::new(manager.clone(), reply_router, pool, id_seq.clone(), config.message_timeout);
            (manager, command_scope)
        };

        let (local_mgr, local) = build(Scope::Local);
        let (machine_mgr, machine) = build(Scope::Machine);
        let (cluster_mgr, cluster) = build(Scope::Cluster);
        let (network_mgr, network) = build(Scope::Network);

        Dispatcher {
            local,
            machine,
            cluster,
            network,
            managers: [local_mgr, machine_mgr, cluster_mgr, network_mgr],
            local_mesh_id,
        }
    }

    /// Fans a discovery event out to every scope; each applies its own
    /// admission predicate independently.
    pub fn handle_peer_event(&self, event: PeerEvent) {
        for manager in &self.managers {
            manager.handle_event(event.clone());
        }
    }

    pub fn local_mesh_id(&self) -> MeshId {
        self.local_mesh_id
    }

    /// Starts the command server backing all four scopes and returns its
    /// bound TCP port, for publishing into this process's own `PeerContext`.
    pub async fn start_server(
        &self,
        application_name: &str,
        registry: Arc<HandlerRegistry>,
        rpc_port_base: u16,
        instance: Option<usize>,
    ) -> std::io::Result<CommandServerHandle> {
        let channel_name = match instance {
            Some(n) => format!("{}-{}", application_name, n),
            None => application_name.to_string(),
        };
        let server = CommandServer::new(application_name, registry);
        server.start(&channel_name, rpc_port_base).await
    }
}
