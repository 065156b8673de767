// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! A peer-to-peer command/event mesh: scatter-gather request/reply over a
//! self-discovering mesh of processes, with no central broker. Every
//! process that links this crate is simultaneously a client and a server.
//!
//! [`Dispatcher`] is the entry point: it owns four preconfigured
//! [`command_scope::CommandScope`]s (Local/Machine/Cluster/Network), each
//! backed by its own [`socket_manager::SocketManager`]. Feed peer discovery
//! events in through [`Dispatcher::handle_peer_event`]; register handlers
//! in a [`handler_registry::HandlerRegistry`] and start a
//! [`command_server::CommandServer`] (or go through [`Dispatcher::start_server`])
//! to answer other peers' requests.

pub mod codec;
pub mod command_scope;
pub mod command_server;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod global;
pub mod handler_registry;
pub mod peer;
pub mod pending_reply;
pub mod reply_router;
pub mod routing_filter;
pub mod socket_manager;
pub mod topic;
pub mod transport;

pub use dispatcher::Dispatcher;
pub use error::{BusError, BusResult};
