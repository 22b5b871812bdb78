// src/billing.rs

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use log::error;
use mongodb::bson::{doc, from_document, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::auth;
use crate::error::EngineError;
use crate::models::{bson_now, Role};
use crate::store::DocumentStore;

/// Reference pricing mutated by super-admins and consumed read-only by
/// billing calculations. Stored as a single well-known document.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PricingSettings {
    #[serde(rename = "_id", default = "pricing_doc_id")]
    pub id: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(rename = "scriptRate", default)]
    pub script_rate: f64,
    #[serde(rename = "editRate", default)]
    pub edit_rate: f64,
    #[serde(rename = "thumbnailRate", default)]
    pub thumbnail_rate: f64,
    #[serde(rename = "uploadRate", default)]
    pub upload_rate: f64,
    #[serde(rename = "updatedAt", default = "bson_now")]
    pub updated_at: BsonDateTime,
}

fn pricing_doc_id() -> String {
    "pricing".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Coupon {
    #[serde(rename = "_id")]
    pub code: String,
    #[serde(rename = "discountPercent")]
    pub discount_percent: f64,
    #[serde(rename = "isActive", default)]
    pub is_active: bool,
    #[serde(rename = "createdAt", default = "bson_now")]
    pub created_at: BsonDateTime,
}

// GET /settings/pricing
pub async fn get_pricing(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    if auth::context(&req).is_none() {
        return HttpResponse::Unauthorized().body("Unauthorized");
    }

    match data.store.get_one("pricing_settings", "pricing").await {
        Ok(raw) => match from_document::<PricingSettings>(raw) {
            Ok(settings) => HttpResponse::Ok().json(settings),
            Err(e) => {
                error!("Malformed pricing settings: {}", e);
                HttpResponse::InternalServerError().body("Malformed pricing settings")
            }
        },
        Err(EngineError::NotFound(_)) => HttpResponse::NotFound().body("Pricing not configured"),
        Err(e) => e.to_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatePricingRequest {
    pub currency: Option<String>,
    #[serde(rename = "scriptRate")]
    pub script_rate: Option<f64>,
    #[serde(rename = "editRate")]
    pub edit_rate: Option<f64>,
    #[serde(rename = "thumbnailRate")]
    pub thumbnail_rate: Option<f64>,
    #[serde(rename = "uploadRate")]
    pub upload_rate: Option<f64>,
}

// PUT /settings/pricing
pub async fn update_pricing(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<UpdatePricingRequest>,
) -> impl Responder {
    let ctx = match auth::context(&req) {
        Some(ctx) => ctx,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if ctx.role != Role::SuperAdmin {
        return HttpResponse::Unauthorized().body("Only super-admins can change pricing");
    }

    let mut update = doc! { "updatedAt": BsonDateTime::now() };
    if let Some(currency) = &payload.currency {
        update.insert("currency", currency);
    }
    if let Some(rate) = payload.script_rate {
        update.insert("scriptRate", rate);
    }
    if let Some(rate) = payload.edit_rate {
        update.insert("editRate", rate);
    }
    if let Some(rate) = payload.thumbnail_rate {
        update.insert("thumbnailRate", rate);
    }
    if let Some(rate) = payload.upload_rate {
        update.insert("uploadRate", rate);
    }

    let store = data.store.as_ref();
    match store.patch("pricing_settings", "pricing", update.clone()).await {
        Ok(()) => HttpResponse::Ok().body("Pricing updated"),
        Err(EngineError::NotFound(_)) => {
            update.insert("_id", "pricing");
            match store.create("pricing_settings", update).await {
                Ok(_) => HttpResponse::Ok().body("Pricing created"),
                Err(e) => {
                    error!("Error creating pricing settings: {}", e);
                    e.to_response()
                }
            }
        }
        Err(e) => {
            error!("Error updating pricing settings: {}", e);
            e.to_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCouponRequest {
    pub code: String,
    #[serde(rename = "discountPercent")]
    pub discount_percent: f64,
}

// POST /coupons
pub async fn create_coupon(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateCouponRequest>,
) -> impl Responder {
    let ctx = match auth::context(&req) {
        Some(ctx) => ctx,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if ctx.role != Role::SuperAdmin {
        return HttpResponse::Unauthorized().body("Only super-admins can create coupons");
    }
    if payload.discount_percent <= 0.0 || payload.discount_percent > 100.0 {
        return HttpResponse::BadRequest().body("Discount must be between 0 and 100");
    }

    let coupon_doc = doc! {
        "_id": &payload.code,
        "discountPercent": payload.discount_percent,
        "isActive": true,
        "createdAt": BsonDateTime::now(),
    };
    match data.store.create("coupons", coupon_doc).await {
        Ok(_) => HttpResponse::Ok().body("Coupon created"),
        Err(e) => {
            error!("Error creating coupon: {}", e);
            e.to_response()
        }
    }
}

// GET /coupons
// Read contract for billing calculations in any authenticated panel.
pub async fn list_coupons(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    if auth::context(&req).is_none() {
        return HttpResponse::Unauthorized().body("Unauthorized");
    }

    match data.store.get_all("coupons").await {
        Ok(docs) => {
            let coupons: Vec<Coupon> = docs
                .into_iter()
                .filter_map(|d| from_document::<Coupon>(d).ok())
                .collect();
            HttpResponse::Ok().json(coupons)
        }
        Err(e) => {
            error!("Error listing coupons: {}", e);
            e.to_response()
        }
    }
}
