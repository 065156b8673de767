// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Maps a topic hash to a dispatch closure, built once at startup
//! from the handlers an application registers. Unknown topics return
//! `None` rather than raising: the server folds that into an empty reply.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::sync::CancellationToken;

use crate::codec;
use crate::topic::topic_of;

pub type DispatchFuture = Pin<Box<dyn Future<Output = Bytes> + Send>>;
pub type DispatchFn = Arc<dyn Fn(Bytes, CancellationToken) -> DispatchFuture + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<u64, DispatchFn>,
}

impl HandlerRegistry {
    pub fn new() -> HandlerRegistry {
        HandlerRegistry::default()
    }

    /// Registers a handler for a command that produces a response.
    /// `type_name` must match the name the caller's `CommandScope` hashes.
    pub fn register<Req, Resp, F, Fut>(&self, type_name: &str, handler: F)
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Req, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Resp> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let dispatch: DispatchFn = Arc::new(move |payload: Bytes, cancel: CancellationToken| {
            let handler = handler.clone();
            Box::pin(async move {
                match codec::decode::<Req>(&payload) {
                    Ok(command) => {
                        let response = handler(command, cancel).await;
                        codec::encode(&response).unwrap_or_default()
                    }
                    Err(e) => {
                        log::warn!("failed to decode command payload: {}", e);
                        Bytes::new()
                    }
                }
            })
        });
        self.handlers.insert(topic_of(type_name), dispatch);
    }

    /// Registers a handler for a void command: its reply is always empty.
    pub fn register_void<Req, F, Fut>(&self, type_name: &str, handler: F)
    where
        Req: DeserializeOwned + Send + 'static,
        F: Fn(Req, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let dispatch: DispatchFn = Arc::new(move |payload: Bytes, cancel: CancellationToken| {
            let handler = handler.clone();
            Box::pin(async move {
                match codec::decode::<Req>(&payload) {
                    Ok(command) => {
                        handler(command, cancel).await;
                    }
                    Err(e) => log::warn!("failed to decode command payload: {}", e),
                }
                Bytes::new()
            })
        });
        self.handlers.insert(topic_of(type_name), dispatch);
    }

    pub fn lookup(&self, topic: u64) -> Option<DispatchFn> {
        self.handlers.get(&topic).map(|entry| entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct Ping {
        text: String,
    }

    #[tokio::test]
    async fn registered_handler_round_trips_through_dispatch() {
        let registry = HandlerRegistry::new();
        registry.register::<Ping, String, _, _>("Ping", |ping, _cancel| async move { format!("pong:{}", ping.text) });

        let topic = topic_of("Ping");
        let dispatch = registry.lookup(topic).expect("handler registered");
        let payload = codec::encode(&Ping { text: "hi".into() }).unwrap();
        let reply = dispatch(payload, CancellationToken::new()).await;
        let decoded: String = codec::decode(&reply).unwrap();

        assert_eq!(decoded, "pong:hi");
    }

    #[test]
    fn unknown_topic_returns_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.lookup(topic_of("Nope")).is_none());
    }
}
