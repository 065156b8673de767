// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Serializes and deserializes typed command/response payloads. MessagePack
//! via `rmp-serde` is used throughout, matching the `PeerContext` wire
//! format so a single codec choice covers both control-plane data and
//! application payloads.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::BusError;

pub fn encode<T: Serialize>(value: &T) -> Result<Bytes, BusError> {
    rmp_serde::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| BusError::Encode(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, BusError> {
    rmp_serde::from_slice(bytes).map_err(|e| BusError::Decode(e.to_string()))
}
