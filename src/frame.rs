// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Wire frame layout. A request frame is
//! `topic:u64 le | correlation_id:u64 le | payload`; a reply frame drops
//! the topic. Byte-stream transports (TCP, Unix sockets) wrap a frame in a
//! 4-byte little-endian length prefix; in-process transport hands the
//! `Bytes` straight through with no prefix since it never crosses a stream.

use byteorder::{ByteOrder, LittleEndian};
use bytes::{Bytes, BytesMut};

use crate::error::BusError;
use crate::global::CorrelationId;

const HEADER_LEN: usize = 16;
const REPLY_HEADER_LEN: usize = 8;

pub fn encode_request(topic: u64, correlation_id: CorrelationId, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    let mut header = [0u8; HEADER_LEN];
    LittleEndian::write_u64(&mut header[0..8], topic);
    LittleEndian::write_u64(&mut header[8..16], correlation_id.0);
    buf.extend_from_slice(&header);
    buf.extend_from_slice(payload);
    buf.freeze()
}

/// Parses a request frame, returning `(topic, correlation_id, payload)`.
/// `payload` excludes the 16-byte header: handlers never see it.
pub fn decode_request(bytes: Bytes) -> Result<(u64, CorrelationId, Bytes), BusError> {
    if bytes.len() < HEADER_LEN {
        return Err(BusError::Decode("request frame shorter than header".into()));
    }
    let topic = LittleEndian::read_u64(&bytes[0..8]);
    let correlation_id = CorrelationId(LittleEndian::read_u64(&bytes[8..16]));
    let payload = bytes.slice(HEADER_LEN..);
    Ok((topic, correlation_id, payload))
}

pub fn encode_reply(correlation_id: CorrelationId, payload: Bytes) -> Bytes {
    let mut buf = BytesMut::with_capacity(REPLY_HEADER_LEN + payload.len());
    let mut header = [0u8; REPLY_HEADER_LEN];
    LittleEndian::write_u64(&mut header, correlation_id.0);
    buf.extend_from_slice(&header);
    buf.extend_from_slice(&payload);
    buf.freeze()
}

pub fn decode_reply(bytes: Bytes) -> Result<(CorrelationId, Bytes), BusError> {
    if bytes.len() < REPLY_HEADER_LEN {
        return Err(BusError::Decode("reply frame shorter than header".into()));
    }
    let correlation_id = CorrelationId(LittleEndian::read_u64(&bytes[0..8]));
    let payload = bytes.slice(REPLY_HEADER_LEN..);
    Ok((correlation_id, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let frame = encode_request(42, CorrelationId(7), b"hello");
        let (topic, corr, payload) = decode_request(frame).unwrap();
        assert_eq!(topic, 42);
        assert_eq!(corr, CorrelationId(7));
        assert_eq!(&payload[..], b"hello");
    }

    #[test]
    fn reply_round_trips_with_empty_payload() {
        let frame = encode_reply(CorrelationId(3), Bytes::new());
        let (corr, payload) = decode_reply(frame).unwrap();
        assert_eq!(corr, CorrelationId(3));
        assert!(payload.is_empty());
    }

    #[test]
    fn short_frame_is_rejected() {
        assert!(decode_request(Bytes::from_static(b"short")).is_err());
        assert!(decode_reply(Bytes::from_static(b"sh")).is_err());
    }
}
