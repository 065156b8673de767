//! Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//!
//! Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
//! or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
//! This file may not be copied, modified, or distributed except according to those terms.

use std::io;

use thiserror::Error;

/// Errors surfaced to callers of a command scope or the socket manager.
///
/// Scatter-gather isolates per-peer failures: an `Encode`/`Decode`/`TimedOut`
/// on one reply never faults the others in the same scatter.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("request timed out")]
    TimedOut,

    #[error("no peers admitted by this scope")]
    NoPeers,

    #[error("no connection to application '{application_name}'")]
    UnknownPeer { application_name: String },

    #[error("failed to encode payload: {0}")]
    Encode(String),

    #[error("failed to decode payload: {0}")]
    Decode(String),

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Server-side only. Never returned to a caller: the command server
    /// folds this into an empty-payload reply, indistinguishable
    /// from a handler that legitimately returned nothing.
    #[error("no handler registered for topic")]
    HandlerNotFound,
}

pub type BusResult<T> = Result<T, BusError>;
