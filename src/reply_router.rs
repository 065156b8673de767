// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Demultiplexes incoming reply frames by correlation id and completes the
//! matching `PendingReply`. One router is shared by every connection a
//! socket manager owns.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;

use crate::frame::decode_reply;
use crate::global::CorrelationId;
use crate::pending_reply::PendingReply;

#[derive(Default)]
pub struct ReplyRouter {
    pending: DashMap<CorrelationId, (Arc<PendingReply>, u64)>,
}

impl ReplyRouter {
    pub fn new() -> ReplyRouter {
        ReplyRouter::default()
    }

    /// Registers `pending` under its current correlation id and captures its
    /// rental epoch, so a reply that arrives after this instance has been
    /// given back and rented out again cannot complete the wrong tenant.
    pub fn register(&self, pending: Arc<PendingReply>) {
        let version = pending.version();
        self.pending.insert(pending.correlation_id(), (pending, version));
    }

    /// Removes the entry for `correlation_id`, if present. Idempotent: a
    /// late reply arriving after the scatter already unregistered it is a
    /// normal race, not an error.
    pub fn unregister(&self, correlation_id: CorrelationId) -> bool {
        self.pending.remove(&correlation_id).is_some()
    }

    /// Parses a reply frame and completes the matching pending reply.
    /// Unknown correlation ids are dropped silently: they are either a
    /// reply that arrived after its scatter timed out, or traffic for a
    /// peer that isn't ours.
    pub fn on_frame(&self, bytes: Bytes) {
        let (correlation_id, payload) = match decode_reply(bytes) {
            Ok(parsed) => parsed,
            Err(_) => {
                log::debug!("dropping malformed reply frame");
                return;
            }
        };

        if let Some(entry) = self.pending.get(&correlation_id) {
            let (pending, version) = entry.value();
            pending.set_result(*version, payload);
        } else {
            log::debug!("no pending reply for correlation id {:?}", correlation_id);
        }
    }
}
