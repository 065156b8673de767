// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Transport abstraction. The rest of the crate talks to a peer through a
//! `Connection` handle (an outgoing mailbox plus a reader task that feeds
//! parsed frames to a callback); it never touches a socket directly. Each
//! connection gets its own reader/writer task pair instead of being driven
//! by readiness polling on a shared event loop.

pub mod inproc;
pub mod ipc;
pub mod tcp;

use std::io;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Invoked once per frame a connection's reader task parses off the wire.
pub type FrameHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// A live connection to one peer. Cloning shares the same outgoing mailbox,
/// so a server-side dispatch closure can hold its own handle to reply on.
#[derive(Clone)]
pub struct Connection {
    outgoing: mpsc::UnboundedSender<Bytes>,
}

impl Connection {
    pub fn send(&self, frame: Bytes) -> io::Result<()> {
        self.outgoing
            .send(frame)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "connection writer task is gone"))
    }

    /// Used by the in-process transport, which has no real byte stream to
    /// frame: payloads are handed from sender to receiver whole.
    pub(crate) fn from_sender(outgoing: mpsc::UnboundedSender<Bytes>) -> Connection {
        Connection { outgoing }
    }
}

/// Wraps a byte stream with the 4-byte little-endian length-prefixed frame
/// envelope and spawns its reader/writer tasks. `make_handler` is
/// given this connection's own send handle so a server can reply on the
/// same connection it received the request on; a client that only ever
/// reads replies can ignore the argument.
pub fn spawn_duplex<S, F>(stream: S, make_handler: F) -> Connection
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: FnOnce(Connection) -> FrameHandler + Send + 'static,
{
    let (mut reader_half, mut writer_half) = tokio::io::split(stream);
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    let connection = Connection { outgoing: tx };
    let on_frame = make_handler(connection.clone());

    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let mut len_prefix = [0u8; 4];
            LittleEndian::write_u32(&mut len_prefix, frame.len() as u32);
            if writer_half.write_all(&len_prefix).await.is_err() {
                log::debug!("connection writer task stopping: peer gone");
                break;
            }
            if writer_half.write_all(&frame).await.is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        loop {
            let mut len_prefix = [0u8; 4];
            if reader_half.read_exact(&mut len_prefix).await.is_err() {
                log::debug!("connection reader task stopping: peer gone");
                break;
            }
            let len = LittleEndian::read_u32(&len_prefix) as usize;
            let mut buf = BytesMut::zeroed(len);
            if reader_half.read_exact(&mut buf).await.is_err() {
                break;
            }
            on_frame(buf.freeze());
        }
    });

    connection
}
