// src/web_socket_server.rs

use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::app_state::AppState;
use crate::sync_server::{CollectionEvent, Disconnect, Subscribe, SyncServer, Unsubscribe};

#[derive(Deserialize)]
struct IncomingCommand {
    subscribe: Option<String>,
    unsubscribe: Option<String>,
}

/// One dashboard's live connection. The client subscribes to the
/// collections its views render; every matching commit turns into a
/// `{"collection": ..., "event": "changed"}` frame telling it to
/// re-query.
pub struct WsSession {
    pub hb: Instant,
    pub sync: Addr<SyncServer>,
}

impl WsSession {
    pub fn new(sync: Addr<SyncServer>) -> Self {
        WsSession {
            hb: Instant::now(),
            sync,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(Duration::from_secs(5), |act, ctx| {
            if Instant::now().duration_since(act.hb) > Duration::from_secs(10) {
                println!("WebSocket client heartbeat failed, disconnecting.");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
    }

    fn stopped(&mut self, ctx: &mut Self::Context) {
        // Drop every subscription this session held.
        self.sync.do_send(Disconnect {
            addr: ctx.address().recipient(),
        });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<IncomingCommand>(&text) {
                Ok(command) => {
                    if let Some(collection) = command.subscribe {
                        self.sync.do_send(Subscribe {
                            collection,
                            addr: ctx.address().recipient(),
                        });
                    }
                    if let Some(collection) = command.unsubscribe {
                        self.sync.do_send(Unsubscribe {
                            collection,
                            addr: ctx.address().recipient(),
                        });
                    }
                }
                Err(e) => {
                    println!("Failed to parse ws command: {}", e);
                }
            },
            Ok(ws::Message::Close(_)) => {
                ctx.stop();
            }
            Err(e) => {
                println!("WebSocket error: {}", e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

impl Handler<CollectionEvent> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: CollectionEvent, ctx: &mut ws::WebsocketContext<Self>) {
        let frame = serde_json::json!({ "collection": msg.collection, "event": "changed" });
        ctx.text(frame.to_string());
    }
}

// GET /ws
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    ws::start(WsSession::new(data.sync_server.clone()), &req, stream)
}
