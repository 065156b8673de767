// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The stable identity of a remote mesh participant, and the join/leave
//! events the (external) discovery beacon feeds into the socket managers.

use serde::{Deserialize, Serialize};

use crate::global::MeshId;
use crate::routing_filter::RoutingFilter;

/// Announced once per peer and replaced wholesale on every re-announcement
/// with the same `mesh_id`; fields are otherwise immutable once published.
/// Serialized with MessagePack using fixed integer keys 0..8 for discovery
/// interop; `is_self` and `last_seen` are local-only and never serialized.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerContext {
    #[serde(rename = "0")]
    pub mesh_id: u64,
    #[serde(rename = "1")]
    pub application_name: String,
    #[serde(rename = "2")]
    pub workstation_name: String,
    #[serde(rename = "3")]
    pub cluster_name: String,
    #[serde(rename = "4")]
    pub address: String,
    #[serde(rename = "5")]
    pub rpc_port: u16,
    #[serde(rename = "6")]
    pub pub_port: u16,
    #[serde(rename = "7")]
    pub routing_table: Vec<u8>,

    #[serde(skip)]
    pub is_self: bool,
    #[serde(skip)]
    pub last_seen: Option<std::time::Instant>,
}

impl PeerContext {
    pub fn mesh_id(&self) -> MeshId {
        MeshId(self.mesh_id)
    }

    pub fn admits_topic(&self, topic: u64) -> bool {
        if self.routing_table.is_empty() {
            return true;
        }
        crate::routing_filter::might_contain(&self.routing_table, topic)
    }

    pub fn routing_filter(&self) -> RoutingFilter {
        RoutingFilter::from_bytes(self.routing_table.clone())
    }
}

impl PartialEq for PeerContext {
    fn eq(&self, other: &Self) -> bool {
        self.mesh_id == other.mesh_id
    }
}
impl Eq for PeerContext {}

/// Emitted by the discovery collaborator; consumed by each socket manager's
/// worker to add or remove a connection.
#[derive(Clone, Debug)]
pub enum PeerEvent {
    Joined(PeerContext),
    Left(PeerContext),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(mesh_id: u64) -> PeerContext {
        PeerContext {
            mesh_id,
            application_name: "TestApp".into(),
            workstation_name: "box1".into(),
            cluster_name: "".into(),
            address: "127.0.0.1".into(),
            rpc_port: 20000,
            pub_port: 10000,
            routing_table: Vec::new(),
            is_self: false,
            last_seen: None,
        }
    }

    #[test]
    fn equality_is_by_mesh_id_only() {
        let mut a = sample(1);
        let b = sample(1);
        a.application_name = "Other".into();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_routing_table_admits_everything() {
        let peer = sample(1);
        assert!(peer.admits_topic(crate::topic::topic_of("Anything")));
    }

    #[test]
    fn published_routing_table_round_trips_through_messagepack() {
        let mut filter = RoutingFilter::new(16, 0.01);
        filter.add(crate::topic::topic_of("Ping"));
        let mut peer = sample(1);
        peer.routing_table = filter.bytes().to_vec();

        let encoded = rmp_serde::to_vec(&peer).unwrap();
        let decoded: PeerContext = rmp_serde::from_slice(&encoded).unwrap();

        assert!(decoded.admits_topic(crate::topic::topic_of("Ping")));
    }
}
