// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Scatter-gather command scope. Serializes a command once, broadcasts it
//! to every admissible peer, then asynchronously gathers replies in
//! scatter order with a linked timeout/cancellation.

use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::codec;
use crate::error::BusError;
use crate::frame;
use crate::global::IdSequence;
use crate::peer::PeerContext;
use crate::pending_reply::{PendingReply, PendingReplyPool};
use crate::reply_router::ReplyRouter;
use crate::socket_manager::SocketManager;
use crate::topic::topic_of;

/// Invoked from the gather loop when a scattered reply fails (timeout,
/// transport error, or a decode error on that one response) and the caller
/// opted to observe errors instead of having them silently dropped or
/// propagated into the result stream. `peer` is absent if the peer
/// disconnected from the manager before it could be looked up.
pub type ErrorCallback = Arc<dyn Fn(BusError, Option<PeerContext>) + Send + Sync>;

/// One scattered send's rental, held for exactly as long as its reply is
/// being awaited. Dropping it - whether the gather loop finishes normally
/// or the caller abandons the stream mid-iteration - unregisters it from
/// the reply router and returns it to the pool exactly once.
struct RentedPending {
    peer: Option<PeerContext>,
    pending: Arc<PendingReply>,
    router: Arc<ReplyRouter>,
    pool: Arc<PendingReplyPool>,
}

impl Drop for RentedPending {
    fn drop(&mut self) {
        self.router.unregister(self.pending.correlation_id());
        self.pool.give_back(self.pending.clone());
    }
}

#[derive(Clone)]
pub struct CommandScope {
    manager: Arc<SocketManager>,
    reply_router: Arc<ReplyRouter>,
    pool: Arc<PendingReplyPool>,
    id_seq: Arc<IdSequence>,
    default_timeout: Duration,
}

impl CommandScope {
    pub fn new(
        manager: Arc<SocketManager>,
        reply_router: Arc<ReplyRouter>,
        pool: Arc<PendingReplyPool>,
        id_seq: Arc<IdSequence>,
        default_timeout: Duration,
    ) -> CommandScope {
        CommandScope {
            manager,
            reply_router,
            pool,
            id_seq,
            default_timeout,
        }
    }

    /// Serializes `command` once and schedules a send to every peer whose
    /// routing filter admits `topic`. Returns the ordered list of rented
    /// replies (scatter order), already armed with a linked timeout.
    fn scatter<Req: Serialize>(
        &self,
        command: &Req,
        type_name: &str,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<Vec<RentedPending>, BusError> {
        let topic = topic_of(type_name);
        let targets = self.manager.iter(self.manager.count(), topic);
        if targets.is_empty() {
            log::debug!("scatter for topic {:#x}: no admissible peers", topic);
            return Ok(Vec::new());
        }

        let payload = codec::encode(command)?;
        log::debug!("scatter for topic {:#x}: {} admissible peers", topic, targets.len());

        let mut rented = Vec::with_capacity(targets.len());
        let mut for_timeout = Vec::with_capacity(targets.len());
        for (mesh_id, _connection) in &targets {
            let correlation_id = self.id_seq.next_correlation_id();
            let pending = self.pool.rent(correlation_id);
            let version = pending.version();
            self.reply_router.register(pending.clone());

            let frame = frame::encode_request(topic, correlation_id, &payload);
            if let Err(e) = self.manager.schedule(*mesh_id, frame) {
                pending.set_error(version, BusError::Transport(e));
            }

            for_timeout.push((pending.clone(), version));
            rented.push(RentedPending {
                peer: self.manager.peer(*mesh_id),
                pending,
                router: self.reply_router.clone(),
                pool: self.pool.clone(),
            });
        }

        arm_timeout(for_timeout, timeout, cancel);
        Ok(rented)
    }

    /// Fire-and-collect form: awaits every scattered reply, discarding
    /// successes and timeouts alike. Used for void commands where the
    /// caller only cares that delivery was attempted. `on_error`, if
    /// supplied, is still invoked per failed reply.
    pub async fn send<Req: Serialize>(
        &self,
        command: Req,
        type_name: &str,
        timeout: Duration,
        on_error: Option<ErrorCallback>,
    ) -> Result<(), BusError> {
        let rented_list = self.scatter(&command, type_name, timeout, CancellationToken::new())?;
        for rented in rented_list {
            if let Err(e) = rented.pending.wait().await {
                if let Some(cb) = &on_error {
                    cb(e, rented.peer.clone());
                }
            }
        }
        Ok(())
    }

    /// Yields one decoded `Resp` per successful, non-empty reply, in
    /// scatter order. On a failed reply: invokes `on_error` if supplied,
    /// otherwise drops it silently. Use `stream_result` to have failures
    /// surface in the yielded sequence instead.
    pub fn stream<Req, Resp>(
        &self,
        command: Req,
        type_name: &'static str,
        timeout: Duration,
        cancel: CancellationToken,
        on_error: Option<ErrorCallback>,
    ) -> impl Stream<Item = Resp>
    where
        Req: Serialize + Send + 'static,
        Resp: DeserializeOwned + Send + 'static,
    {
        let scope = self.clone();
        async_stream::stream! {
            let rented_list = match scope.scatter(&command, type_name, timeout, cancel) {
                Ok(p) => p,
                Err(e) => {
                    log::debug!("scatter failed before any send went out: {}", e);
                    return;
                }
            };
            for rented in rented_list {
                let outcome = rented.pending.wait().await;
                match outcome {
                    Ok(bytes) if bytes.is_empty() => {
                        // no handler on that peer; skip silently.
                    }
                    Ok(bytes) => match codec::decode::<Resp>(&bytes) {
                        Ok(value) => yield value,
                        Err(e) => match &on_error {
                            Some(cb) => cb(e, rented.peer.clone()),
                            None => log::debug!("dropping undecodable reply: {}", e),
                        },
                    },
                    Err(e) => match &on_error {
                        Some(cb) => cb(e, rented.peer.clone()),
                        None => log::debug!("dropping failed reply: {}", e),
                    },
                }
            }
        }
    }

    /// Like `stream`, but surfaces every outcome (including timeouts and
    /// decode errors) instead of dropping them - unless `on_error` is
    /// supplied, in which case it is invoked in place of yielding.
    pub fn stream_result<Req, Resp>(
        &self,
        command: Req,
        type_name: &'static str,
        timeout: Duration,
        cancel: CancellationToken,
        on_error: Option<ErrorCallback>,
    ) -> impl Stream<Item = Result<Resp, BusError>>
    where
        Req: Serialize + Send + 'static,
        Resp: DeserializeOwned + Send + 'static,
    {
        let scope = self.clone();
        async_stream::stream! {
            let rented_list = match scope.scatter(&command, type_name, timeout, cancel) {
                Ok(p) => p,
                Err(e) => {
                    match &on_error {
                        Some(cb) => cb(e, None),
                        None => yield Err(e),
                    }
                    return;
                }
            };
            for rented in rented_list {
                let outcome = rented.pending.wait().await;
                match outcome {
                    Ok(bytes) if bytes.is_empty() => {
                        // no handler; skipped rather than yielding a default.
                    }
                    Ok(bytes) => yield codec::decode::<Resp>(&bytes),
                    Err(e) => match &on_error {
                        Some(cb) => cb(e, rented.peer.clone()),
                        None => yield Err(e),
                    },
                }
            }
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}

fn arm_timeout(pendings: Vec<(Arc<PendingReply>, u64)>, timeout: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {}
            _ = cancel.cancelled() => {}
        }
        for (pending, version) in &pendings {
            pending.set_error(*version, BusError::TimedOut);
        }
    });
}
