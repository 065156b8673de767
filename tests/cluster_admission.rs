// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Cluster-scope admission scenarios: membership by cluster name and by
//! application whitelist, without any real network traffic.

use meshbus::global::MeshId;
use meshbus::peer::PeerContext;
use meshbus::socket_manager::{admits, AdmissionContext, Scope};

fn peer(mesh_id: u64, application_name: &str, cluster_name: &str, address: &str) -> PeerContext {
    PeerContext {
        mesh_id,
        application_name: application_name.to_string(),
        workstation_name: "host".to_string(),
        cluster_name: cluster_name.to_string(),
        address: address.to_string(),
        rpc_port: 20000,
        pub_port: 10000,
        routing_table: Vec::new(),
        is_self: false,
        last_seen: None,
    }
}

#[test]
fn cluster_membership_by_name_excludes_other_clusters() {
    let ctx = AdmissionContext {
        local_mesh_id: MeshId(1),
        local_workstation_name: "hostA".into(),
        cluster_name: "C1".into(),
        cluster_applications: Vec::new(),
        cluster_nodes: Vec::new(),
    };

    let same_cluster = peer(2, "Other", "C1", "10.0.0.2");
    let other_cluster = peer(3, "Other", "C2", "10.0.0.3");

    assert!(admits(Scope::Cluster, &same_cluster, &ctx));
    assert!(!admits(Scope::Cluster, &other_cluster, &ctx));
}

#[test]
fn application_whitelist_admits_regardless_of_cluster_name() {
    let ctx = AdmissionContext {
        local_mesh_id: MeshId(1),
        local_workstation_name: "hostA".into(),
        cluster_name: "C1".into(),
        cluster_applications: vec!["TestApp".into()],
        cluster_nodes: Vec::new(),
    };

    let whitelisted = peer(4, "TestApp", "C2", "10.0.0.4");
    let not_whitelisted = peer(5, "OtherApp", "C2", "10.0.0.5");

    assert!(admits(Scope::Cluster, &whitelisted, &ctx));
    assert!(!admits(Scope::Cluster, &not_whitelisted, &ctx));
}

#[test]
fn node_list_admits_by_address_alone() {
    let ctx = AdmissionContext {
        local_mesh_id: MeshId(1),
        local_workstation_name: "hostA".into(),
        cluster_name: "C1".into(),
        cluster_applications: Vec::new(),
        cluster_nodes: vec!["10.0.0.9".into()],
    };

    let matching_node = peer(6, "Unrelated", "C2", "10.0.0.9");
    let non_matching_node = peer(7, "Unrelated", "C2", "10.0.0.10");

    assert!(admits(Scope::Cluster, &matching_node, &ctx));
    assert!(!admits(Scope::Cluster, &non_matching_node, &ctx));
}
