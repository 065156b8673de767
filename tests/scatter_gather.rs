// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! End-to-end scatter-gather over real TCP loopback connections, covering
//! the concrete scenarios from the component design: two peers each
//! replying once, an unhandled topic yielding nothing, and cancellation.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use meshbus::config::MeshConfig;
use meshbus::global::MeshId;
use meshbus::handler_registry::HandlerRegistry;
use meshbus::peer::{PeerContext, PeerEvent};
use meshbus::Dispatcher;

#[derive(Serialize, Deserialize)]
struct Ping {
    text: String,
}

fn peer_context(mesh_id: u64, application_name: &str, rpc_port: u16, is_self: bool) -> PeerContext {
    PeerContext {
        mesh_id,
        application_name: application_name.to_string(),
        workstation_name: "test-host".to_string(),
        cluster_name: String::new(),
        address: "127.0.0.1".to_string(),
        rpc_port,
        pub_port: 0,
        routing_table: Vec::new(),
        is_self,
        last_seen: None,
    }
}

async fn start_peer(application_name: &str, rpc_port_base: u16, mesh_id: u64) -> (Arc<Dispatcher>, u16) {
    start_peer_with_registry(application_name, rpc_port_base, mesh_id, |registry| {
        registry.register::<Ping, String, _, _>("Ping", |ping, _cancel| async move { format!("pong:{}", ping.text) });
    })
    .await
}

async fn start_peer_with_registry(
    application_name: &str,
    rpc_port_base: u16,
    mesh_id: u64,
    configure: impl FnOnce(&HandlerRegistry),
) -> (Arc<Dispatcher>, u16) {
    let mut config = MeshConfig::default();
    config.application_name = application_name.to_string();
    config.rpc_port_base = rpc_port_base;

    let dispatcher = Arc::new(Dispatcher::new(&config, MeshId(mesh_id), "test-host"));

    let registry = Arc::new(HandlerRegistry::new());
    configure(&registry);

    let handle = dispatcher
        .start_server(application_name, registry, rpc_port_base, None)
        .await
        .expect("command server should bind");

    (dispatcher, handle.rpc_port)
}

#[tokio::test]
async fn two_peers_one_request_two_replies() {
    let (dispatcher_a, port_a) = start_peer("AppA", 21000, 1).await;
    let (dispatcher_b, port_b) = start_peer("AppB", 21100, 2).await;

    let self_a = peer_context(1, "AppA", port_a, true);
    let peer_b = peer_context(2, "AppB", port_b, false);

    dispatcher_a.handle_peer_event(PeerEvent::Joined(self_a));
    dispatcher_a.handle_peer_event(PeerEvent::Joined(peer_b));

    // Give the socket manager workers time to establish the TCP connections.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let replies: Vec<String> = dispatcher_a
        .network
        .stream::<Ping, String>(Ping { text: "hi".into() }, "Ping", Duration::from_secs(2), CancellationToken::new(), None)
        .collect()
        .await;

    assert_eq!(replies.len(), 2);
    assert!(replies.iter().all(|r| r == "pong:hi"));

    drop(dispatcher_b);
}

#[tokio::test]
async fn unhandled_topic_yields_nothing() {
    let (dispatcher_a, port_a) = start_peer("AppC", 21200, 3).await;
    let (dispatcher_b, port_b) = start_peer("AppD", 21300, 4).await;

    dispatcher_a.handle_peer_event(PeerEvent::Joined(peer_context(3, "AppC", port_a, true)));
    dispatcher_a.handle_peer_event(PeerEvent::Joined(peer_context(4, "AppD", port_b, false)));

    tokio::time::sleep(Duration::from_millis(100)).await;

    let replies: Vec<Result<String, meshbus::BusError>> = dispatcher_a
        .network
        .stream_result::<Ping, String>(Ping { text: "hi".into() }, "Smile", Duration::from_secs(1), CancellationToken::new(), None)
        .collect()
        .await;

    assert!(replies.is_empty());

    drop(dispatcher_b);
}

#[tokio::test]
async fn cancellation_cuts_off_a_slow_handler_mid_flight() {
    let (dispatcher_a, port_a) = start_peer_with_registry("AppE", 21400, 5, |registry| {
        registry.register::<Ping, String, _, _>("SlowPing", |ping, _cancel| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            format!("pong:{}", ping.text)
        });
    })
    .await;

    dispatcher_a.handle_peer_event(PeerEvent::Joined(peer_context(5, "AppE", port_a, true)));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel_clone.cancel();
    });

    let started = std::time::Instant::now();
    let replies: Vec<Result<String, meshbus::BusError>> = dispatcher_a
        .network
        .stream_result::<Ping, String>(Ping { text: "slow".into() }, "SlowPing", Duration::from_secs(10), cancel, None)
        .collect()
        .await;
    let elapsed = started.elapsed();

    // The handler sleeps 5s and the scatter's own timeout is 10s; if the
    // cancel token were not actually wired into the wait, this would only
    // return once one of those deadlines passed instead of ~100ms in.
    assert!(elapsed < Duration::from_secs(2), "cancellation did not cut the wait short: {:?}", elapsed);
    assert_eq!(replies.len(), 1);
    assert!(matches!(replies[0], Err(meshbus::BusError::TimedOut)));
}
