// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Same-machine IPC transport for the Machine scope, backed by a Unix
//! domain socket at `/tmp/<application_name>.sock`.

use std::io;
use std::path::PathBuf;

use tokio::net::{UnixListener, UnixStream};

use super::{spawn_duplex, Connection, FrameHandler};

pub fn socket_path(application_name: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/{}.sock", application_name))
}

pub async fn connect<F>(application_name: &str, make_handler: F) -> io::Result<Connection>
where
    F: FnOnce(Connection) -> FrameHandler + Send + 'static,
{
    let stream = UnixStream::connect(socket_path(application_name)).await?;
    Ok(spawn_duplex(stream, make_handler))
}

pub struct IpcListener {
    listener: UnixListener,
    path: PathBuf,
}

impl IpcListener {
    pub fn bind(application_name: &str) -> io::Result<IpcListener> {
        let path = socket_path(application_name);
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)?;
        Ok(IpcListener { listener, path })
    }

    pub async fn accept<F>(&self, make_handler: F) -> io::Result<Connection>
    where
        F: FnOnce(Connection) -> FrameHandler + Send + 'static,
    {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(spawn_duplex(stream, make_handler))
    }
}

impl Drop for IpcListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
