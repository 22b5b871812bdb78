// src/sync_server.rs

use actix::prelude::*;
use log::{debug, info};
use std::collections::HashMap;

/// Pushed to a websocket session when a collection it subscribed to
/// changed. Coarse-grained on purpose: the session re-runs its queries,
/// it does not get the changed documents.
#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct CollectionEvent {
    pub collection: String,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Subscribe {
    pub collection: String,
    pub addr: Recipient<CollectionEvent>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Unsubscribe {
    pub collection: String,
    pub addr: Recipient<CollectionEvent>,
}

/// Removes every subscription a session holds. Sent when the socket
/// closes so torn-down views never leak a live recomputation loop.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub addr: Recipient<CollectionEvent>,
}

/// Fed from the store's change feed after each commit.
#[derive(Message)]
#[rtype(result = "()")]
pub struct CollectionChanged {
    pub collection: String,
}

/// Fan-out hub between the store's change feed and websocket sessions.
pub struct SyncServer {
    sessions: HashMap<String, Vec<Recipient<CollectionEvent>>>,
}

impl SyncServer {
    pub fn new() -> Self {
        SyncServer {
            sessions: HashMap::new(),
        }
    }
}

impl Actor for SyncServer {
    type Context = Context<Self>;
}

impl Handler<Subscribe> for SyncServer {
    type Result = ();

    fn handle(&mut self, msg: Subscribe, _: &mut Context<Self>) {
        info!("Session subscribed to {}", msg.collection);
        let subscribers = self.sessions.entry(msg.collection).or_default();
        if !subscribers.contains(&msg.addr) {
            subscribers.push(msg.addr);
        }
    }
}

impl Handler<Unsubscribe> for SyncServer {
    type Result = ();

    fn handle(&mut self, msg: Unsubscribe, _: &mut Context<Self>) {
        if let Some(subscribers) = self.sessions.get_mut(&msg.collection) {
            subscribers.retain(|a| a != &msg.addr);
            if subscribers.is_empty() {
                self.sessions.remove(&msg.collection);
            }
        }
    }
}

impl Handler<Disconnect> for SyncServer {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Context<Self>) {
        info!("Session disconnected (WS)");
        self.sessions.retain(|_, subscribers| {
            subscribers.retain(|a| a != &msg.addr);
            !subscribers.is_empty()
        });
    }
}

impl Handler<CollectionChanged> for SyncServer {
    type Result = ();

    fn handle(&mut self, msg: CollectionChanged, _: &mut Context<Self>) {
        if let Some(subscribers) = self.sessions.get(&msg.collection) {
            debug!(
                "Collection {} changed, notifying {} session(s)",
                msg.collection,
                subscribers.len()
            );
            for addr in subscribers {
                addr.do_send(CollectionEvent {
                    collection: msg.collection.clone(),
                });
            }
        }
    }
}
