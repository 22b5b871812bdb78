// src/messages.rs

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use log::error;
use mongodb::bson::{doc, from_document, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth;
use crate::models::{bson_now, Role};
use crate::store::DocumentStore;

/// One entry in a campaign's message thread. Threads ride the same
/// change feed as every other collection, so open panels pick up new
/// messages through their `messages` subscription.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CampaignMessage {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "campaignId")]
    pub campaign_id: String,
    #[serde(rename = "senderId")]
    pub sender_id: String,
    #[serde(rename = "senderRole")]
    pub sender_role: Role,
    pub content: String,
    #[serde(rename = "sentAt", default = "bson_now")]
    pub sent_at: BsonDateTime,
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub content: String,
}

// POST /campaigns/{campaign_id}/messages
pub async fn create_message(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<CreateMessageRequest>,
) -> impl Responder {
    let ctx = match auth::context(&req) {
        Some(ctx) => ctx,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    let campaign_id = path.into_inner();
    if payload.content.trim().is_empty() {
        return HttpResponse::BadRequest().body("Message cannot be empty");
    }

    // The campaign must exist; participation is not re-checked here, any
    // panel with campaign access may post to its thread.
    if let Err(e) = data.store.get_one("campaigns", &campaign_id).await {
        return e.to_response();
    }

    let message = CampaignMessage {
        id: Uuid::new_v4().to_string(),
        campaign_id,
        sender_id: ctx.uid,
        sender_role: ctx.role,
        content: payload.content.clone(),
        sent_at: BsonDateTime::now(),
    };
    let message_doc = match mongodb::bson::to_document(&message) {
        Ok(d) => d,
        Err(e) => {
            error!("Error serializing message: {}", e);
            return HttpResponse::InternalServerError().body("Error serializing message");
        }
    };

    match data.store.create("messages", message_doc).await {
        Ok(_) => HttpResponse::Ok().json(message),
        Err(e) => {
            error!("Error creating message: {}", e);
            e.to_response()
        }
    }
}

// GET /campaigns/{campaign_id}/messages
pub async fn list_messages(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    if auth::context(&req).is_none() {
        return HttpResponse::Unauthorized().body("Unauthorized");
    }
    let campaign_id = path.into_inner();

    match data
        .store
        .get_where("messages", doc! { "campaignId": &campaign_id })
        .await
    {
        Ok(docs) => {
            let mut messages: Vec<CampaignMessage> = docs
                .into_iter()
                .filter_map(|d| from_document::<CampaignMessage>(d).ok())
                .collect();
            messages.sort_by_key(|m| m.sent_at);
            HttpResponse::Ok().json(messages)
        }
        Err(e) => {
            error!("Error listing messages for {}: {}", campaign_id, e);
            e.to_response()
        }
    }
}
