// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! TCP transport for the Cluster and Network scopes. The command server
//! scans `[rpc_port_base, rpc_port_base+200)` for the first free port
//! Clients connect directly to `peer.address:peer.rpc_port`.

use std::io;

use tokio::net::{TcpListener, TcpStream};

use super::{spawn_duplex, Connection, FrameHandler};

const PORT_SCAN_RANGE: u16 = 200;

pub async fn connect<F>(address: &str, port: u16, make_handler: F) -> io::Result<Connection>
where
    F: FnOnce(Connection) -> FrameHandler + Send + 'static,
{
    let stream = TcpStream::connect((address, port)).await?;
    stream.set_nodelay(true)?;
    Ok(spawn_duplex(stream, make_handler))
}

pub struct TcpServer {
    listener: TcpListener,
    port: u16,
}

impl TcpServer {
    /// Binds the first free port starting at `base`, scanning up to
    /// `base + 200`. Returns the bound port so it can be published in the
    /// local `PeerContext`.
    pub async fn bind_in_range(base: u16) -> io::Result<TcpServer> {
        for offset in 0..PORT_SCAN_RANGE {
            let port = base.saturating_add(offset);
            if port == 0 {
                continue;
            }
            match TcpListener::bind(("0.0.0.0", port)).await {
                Ok(listener) => return Ok(TcpServer { listener, port }),
                Err(_) => continue,
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AddrInUse,
            format!("no free TCP port in [{}, {})", base, base.saturating_add(PORT_SCAN_RANGE)),
        ))
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn accept<F>(&self, make_handler: F) -> io::Result<Connection>
    where
        F: FnOnce(Connection) -> FrameHandler + Send + 'static,
    {
        let (stream, _addr) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok(spawn_duplex(stream, make_handler))
    }
}
