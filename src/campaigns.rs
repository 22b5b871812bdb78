// src/campaigns.rs

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use log::{error, info};
use mongodb::bson::{doc, from_document, DateTime as BsonDateTime};
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth;
use crate::models::{Campaign, Role};
use crate::store::DocumentStore;

#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    #[serde(default)]
    pub budget: f64,
    #[serde(rename = "brandName")]
    pub brand_name: Option<String>,
    #[serde(rename = "videoTitle")]
    pub video_title: Option<String>,
    /// Admins create on behalf of a brand; brands create their own.
    #[serde(rename = "brandId")]
    pub brand_id: Option<String>,
    /// "Draft" (default) or "Pending Approval".
    pub status: Option<String>,
}

// POST /campaigns
pub async fn create_campaign(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateCampaignRequest>,
) -> impl Responder {
    let ctx = match auth::context(&req) {
        Some(ctx) => ctx,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let brand_id = match ctx.role {
        Role::Brand => ctx.uid.clone(),
        Role::Admin | Role::SuperAdmin => match &payload.brand_id {
            Some(id) => id.clone(),
            None => return HttpResponse::BadRequest().body("brandId is required for admin-created campaigns"),
        },
        _ => return HttpResponse::Unauthorized().body("Only brands and admins create campaigns"),
    };

    let status = payload.status.clone().unwrap_or_else(|| "Draft".to_string());
    if !matches!(status.as_str(), "Draft" | "Pending Approval") {
        return HttpResponse::BadRequest().body("New campaigns start as Draft or Pending Approval");
    }

    let now = BsonDateTime::now();
    let campaign_id = Uuid::new_v4().to_string();
    let mut campaign_doc = doc! {
        "_id": &campaign_id,
        "name": &payload.name,
        "brandId": &brand_id,
        "budget": payload.budget,
        "status": &status,
        "assignedStaff": [],
        "createdAt": now,
        "updatedAt": now,
        "version": 0_i64,
    };
    if let Some(brand_name) = &payload.brand_name {
        campaign_doc.insert("brandName", brand_name);
    }
    if let Some(video_title) = &payload.video_title {
        campaign_doc.insert("videoTitle", video_title);
    }

    match data.store.create("campaigns", campaign_doc).await {
        Ok(_) => {
            info!("Campaign {} created by {} ({})", campaign_id, ctx.uid, status);
            match data.store.get_one("campaigns", &campaign_id).await {
                Ok(raw) => match from_document::<Campaign>(raw) {
                    Ok(campaign) => HttpResponse::Ok().json(campaign),
                    Err(e) => {
                        error!("Malformed campaign {}: {}", campaign_id, e);
                        HttpResponse::InternalServerError().body("Malformed campaign document")
                    }
                },
                Err(e) => e.to_response(),
            }
        }
        Err(e) => {
            error!("Error creating campaign: {}", e);
            e.to_response()
        }
    }
}

// GET /campaigns
// Admins see everything, brands their own, staff the campaigns whose
// assignment pointer names them.
pub async fn list_campaigns(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let ctx = match auth::context(&req) {
        Some(ctx) => ctx,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let store = data.store.as_ref();
    let result = if ctx.role.is_admin() {
        store.get_all("campaigns").await
    } else if ctx.role == Role::Brand {
        store.get_where("campaigns", doc! { "brandId": &ctx.uid }).await
    } else if let Some(field) = ctx.role.assignment_field() {
        store.get_where("campaigns", doc! { field: &ctx.uid }).await
    } else {
        return HttpResponse::Unauthorized().body("No campaign access for this role");
    };

    match result {
        Ok(docs) => {
            let campaigns: Vec<Campaign> = docs
                .into_iter()
                .filter_map(|d| from_document::<Campaign>(d).ok())
                .collect();
            HttpResponse::Ok().json(campaigns)
        }
        Err(e) => {
            error!("Error listing campaigns: {}", e);
            e.to_response()
        }
    }
}

// GET /campaigns/{campaign_id}
pub async fn get_campaign(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let ctx = match auth::context(&req) {
        Some(ctx) => ctx,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    let campaign_id = path.into_inner();

    let campaign: Campaign = match data.store.get_one("campaigns", &campaign_id).await {
        Ok(raw) => match from_document(raw) {
            Ok(campaign) => campaign,
            Err(e) => {
                error!("Malformed campaign {}: {}", campaign_id, e);
                return HttpResponse::InternalServerError().body("Malformed campaign document");
            }
        },
        Err(e) => return e.to_response(),
    };

    let is_assigned_staff = Role::STAFF
        .iter()
        .any(|role| campaign.assignee(*role) == Some(ctx.uid.as_str()));
    if !ctx.role.is_admin() && campaign.brand_id != ctx.uid && !is_assigned_staff {
        return HttpResponse::Unauthorized().body("Not a participant of this campaign");
    }

    HttpResponse::Ok().json(campaign)
}

async fn set_campaign_status(
    req: HttpRequest,
    data: web::Data<AppState>,
    campaign_id: String,
    new_status: &str,
) -> HttpResponse {
    let ctx = match auth::context(&req) {
        Some(ctx) => ctx,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if !ctx.role.is_admin() {
        return HttpResponse::Unauthorized().body("Only admins can review campaigns");
    }

    let update = doc! { "status": new_status, "updatedAt": BsonDateTime::now() };
    match data.store.patch("campaigns", &campaign_id, update).await {
        Ok(()) => {
            info!("Campaign {} set to {} by {}", campaign_id, new_status, ctx.uid);
            HttpResponse::Ok().body(format!("Campaign {}", new_status.to_lowercase()))
        }
        Err(e) => {
            error!("Error updating campaign {}: {}", campaign_id, e);
            e.to_response()
        }
    }
}

// POST /campaigns/{campaign_id}/approve
pub async fn approve_campaign(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    set_campaign_status(req, data, path.into_inner(), "Approved").await
}

// POST /campaigns/{campaign_id}/reject
pub async fn reject_campaign(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    set_campaign_status(req, data, path.into_inner(), "Rejected").await
}
