// src/main.rs

mod app_state;
mod assignment;
mod auth;
mod billing;
mod campaigns;
mod config;
mod error;
mod ledger;
mod messages;
mod models;
mod quality;
mod roles;
mod store;
mod sync_server;
mod tasks;
mod web_socket_server;
mod workload;

use std::env;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix::Actor;
use actix_cors::Cors;
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http,
    middleware::Logger,
    web, App, Error, HttpMessage, HttpResponse, HttpServer,
};
use env_logger::Env;
use futures::future::{ok, Ready};
use log::info;
use tokio::sync::broadcast::error::RecvError;

use crate::app_state::AppState;
use crate::assignment::assign_staff;
use crate::auth::{login, signup};
use crate::billing::{create_coupon, get_pricing, list_coupons, update_pricing};
use crate::campaigns::{
    approve_campaign, create_campaign, get_campaign, list_campaigns, reject_campaign,
};
use crate::ledger::{list_transactions, open_transaction, settle};
use crate::messages::{create_message, list_messages};
use crate::quality::assess_video;
use crate::roles::{get_user, get_users_by_role, set_user_active};
use crate::store::DocumentStore;
use crate::sync_server::{CollectionChanged, SyncServer};
use crate::tasks::{list_my_tasks, update_task_status};
use crate::web_socket_server::ws_index;
use crate::workload::{get_my_workload, get_role_workload};

#[derive(Debug)]
pub struct Authentication;

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware { service })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Extract "Bearer <token>" from the Authorization header if present
        if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
            if let Ok(auth_str) = auth_header.to_str() {
                if auth_str.starts_with("Bearer ") {
                    let token = auth_str.trim_start_matches("Bearer ").trim().to_string();
                    let secret = env::var("JWT_SECRET").unwrap_or_else(|_| "secret".to_string());
                    match auth::validate_jwt(&token, &secret) {
                        Ok(ctx) => {
                            req.extensions_mut().insert(ctx);
                        }
                        Err(e) => {
                            let (req_parts, _payload) = req.into_parts();
                            let resp = HttpResponse::Unauthorized()
                                .body(format!("Invalid token: {}", e))
                                .map_into_boxed_body();
                            let srv_resp = ServiceResponse::new(req_parts, resp);
                            return Box::pin(async move { Ok(srv_resp) });
                        }
                    }
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = config::Config::from_env();
    let store = Arc::new(store::MongoStore::init(&config.mongo_uri, &config.database_name).await);
    let sync_server = SyncServer::new().start();

    // Pump the store's change feed into the sync hub so every open
    // dashboard sees commits from other sessions.
    {
        let sync = sync_server.clone();
        let mut feed = store.subscribe();
        actix_web::rt::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(collection) => sync.do_send(CollectionChanged { collection }),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    let bind_addr = config.bind_addr.clone();
    let frontend_origin = config.frontend_origin.clone();

    info!("Server running at http://{}", bind_addr);
    info!("Allowed CORS Origin: {}", frontend_origin);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Authentication)
            .app_data(web::Data::new(AppState {
                sync_server: sync_server.clone(),
                store: store.clone(),
                config: config.clone(),
            }))
            .service(
                web::scope("/auth")
                    .route("/signup", web::post().to(signup))
                    .route("/login", web::post().to(login)),
            )
            // USERS / ROLE DIRECTORY
            .service(
                web::scope("/users")
                    .route("/by_role/{role}", web::get().to(get_users_by_role))
                    .route("/{id}", web::get().to(get_user))
                    .route("/{id}/active", web::put().to(set_user_active)),
            )
            // CAMPAIGNS
            .service(
                web::scope("/campaigns")
                    .route("", web::post().to(create_campaign))
                    .route("", web::get().to(list_campaigns))
                    .service(
                        web::scope("/{campaign_id}")
                            .route("", web::get().to(get_campaign))
                            .route("/approve", web::post().to(approve_campaign))
                            .route("/reject", web::post().to(reject_campaign))
                            .route("/assign", web::post().to(assign_staff))
                            .service(
                                web::scope("/messages")
                                    .route("", web::get().to(list_messages))
                                    .route("", web::post().to(create_message)),
                            ),
                    ),
            )
            // ROLE TASKS
            .service(
                web::scope("/tasks/{role}")
                    .route("/mine", web::get().to(list_my_tasks))
                    .route("/{task_id}/status", web::put().to(update_task_status)),
            )
            // WORKLOAD DASHBOARDS
            .service(
                web::scope("/stats")
                    .route("/role/{role}", web::get().to(get_role_workload))
                    .route("/me", web::get().to(get_my_workload)),
            )
            // LEDGER
            .service(
                web::scope("/transactions")
                    .route("", web::post().to(open_transaction))
                    .route("", web::get().to(list_transactions))
                    .route("/{tx_id}/settle", web::post().to(settle)),
            )
            // BILLING REFERENCE DATA
            .service(
                web::scope("/settings")
                    .route("/pricing", web::get().to(get_pricing))
                    .route("/pricing", web::put().to(update_pricing)),
            )
            .service(
                web::scope("/coupons")
                    .route("", web::get().to(list_coupons))
                    .route("", web::post().to(create_coupon)),
            )
            // QUALITY ASSESSMENT STUB
            .service(web::scope("/quality").route("/assess", web::post().to(assess_video)))
            // WEBSOCKET route for real-time
            .service(web::resource("/ws").route(web::get().to(ws_index)))
    })
    .bind(bind_addr)?
    .run()
    .await
}
