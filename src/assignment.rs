// src/assignment.rs

use std::collections::HashMap;

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use log::{error, info};
use mongodb::bson::{from_document, to_bson, to_document, Bson, DateTime as BsonDateTime, Document};
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth;
use crate::error::EngineError;
use crate::models::{AssignmentSlot, AuthContext, Campaign, Role, RoleTask};
use crate::store::{BatchOp, DocumentStore};

/// A role selection: a uid assigns, an empty string clears the slot.
/// Roles absent from the map are left untouched.
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub selections: HashMap<Role, String>,
}

pub struct AssignOutcome {
    pub campaign: Campaign,
    /// Roles for which a new task document was fanned out, with the uid.
    pub created_tasks: Vec<(Role, String)>,
}

/// Persist a campaign's staff assignments and fan out one task document
/// per newly-assigned role, in a single atomic commit.
///
/// The delta is computed against the campaign as read here: a role whose
/// requested assignee equals the stored one is a no-op and creates no
/// task, so re-saving an unchanged form never duplicates tasks.
/// Reassigning a role creates a fresh task and leaves the old one in
/// place; task history is append-only.
pub async fn assign(
    store: &dyn DocumentStore,
    ctx: &AuthContext,
    campaign_id: &str,
    selections: &HashMap<Role, String>,
) -> Result<AssignOutcome, EngineError> {
    if !ctx.role.is_admin() {
        return Err(EngineError::Invalid("only admins can assign staff".to_string()));
    }

    let raw = store.get_one("campaigns", campaign_id).await?;
    let campaign: Campaign =
        from_document(raw).map_err(|e| EngineError::Store(format!("malformed campaign: {}", e)))?;

    // Validate every non-empty selection against the role directory
    // before writing anything.
    for (role, uid) in selections {
        if !role.is_staff() {
            return Err(EngineError::Invalid(format!(
                "{} is not an assignable role",
                role.as_str()
            )));
        }
        if uid.is_empty() {
            continue;
        }
        let user = store.get_one("users", uid).await.map_err(|e| match e {
            EngineError::NotFound(_) => {
                EngineError::Invalid(format!("unknown staff member {}", uid))
            }
            other => other,
        })?;
        if user.get_str("role").unwrap_or("") != role.as_str() {
            return Err(EngineError::Invalid(format!(
                "user {} does not hold the {} role",
                uid,
                role.as_str()
            )));
        }
        if !user.get_bool("isActive").unwrap_or(true) {
            return Err(EngineError::Invalid(format!(
                "user {} is deactivated",
                uid
            )));
        }
    }

    // Before/after per staff role. The delta is every role whose new
    // assignee is set and differs from what the campaign already holds.
    let mut after: HashMap<Role, Option<String>> = HashMap::new();
    for role in Role::STAFF {
        after.insert(role, campaign.assignee(role).map(str::to_string));
    }
    for (role, uid) in selections {
        let value = if uid.is_empty() { None } else { Some(uid.clone()) };
        after.insert(*role, value);
    }

    let mut delta: Vec<(Role, String)> = Vec::new();
    for role in Role::STAFF {
        if let Some(Some(uid)) = after.get(&role) {
            if campaign.assignee(role) != Some(uid.as_str()) {
                delta.push((role, uid.clone()));
            }
        }
    }

    let now = BsonDateTime::now();
    let mut patch = Document::new();
    for (role, uid) in selections {
        if let Some(field) = role.assignment_field() {
            let value = if uid.is_empty() {
                Bson::Null
            } else {
                Bson::String(uid.clone())
            };
            patch.insert(field, value);
        }
    }

    // Rebuild the whole slot list so it holds at most one entry per role.
    let slots: Vec<AssignmentSlot> = Role::STAFF
        .iter()
        .filter_map(|role| {
            after.get(role).and_then(|uid| {
                uid.as_ref().map(|uid| AssignmentSlot {
                    role: *role,
                    uid: uid.clone(),
                })
            })
        })
        .collect();
    patch.insert(
        "assignedStaff",
        to_bson(&slots).map_err(|e| EngineError::Store(e.to_string()))?,
    );
    patch.insert("status", "Assigned");
    patch.insert("updatedAt", now);

    let mut ops = vec![BatchOp::Patch {
        collection: "campaigns".to_string(),
        id: campaign_id.to_string(),
        data: patch,
        expected_version: Some(campaign.version),
    }];

    for (role, uid) in &delta {
        let task = RoleTask {
            id: Uuid::new_v4().to_string(),
            campaign_id: campaign_id.to_string(),
            campaign_name: campaign.name.clone(),
            brand_name: campaign
                .brand_name
                .clone()
                .unwrap_or_else(|| campaign.brand_id.clone()),
            video_title: campaign.video_title.clone().unwrap_or_default(),
            assigned_to: uid.clone(),
            assigned_by: ctx.uid.clone(),
            status: "Assigned".to_string(),
            payout: None,
            assigned_at: now,
            created_at: now,
        };
        // STAFF roles always have a task collection
        if let Some(collection) = role.task_collection() {
            ops.push(BatchOp::Create {
                collection: collection.to_string(),
                data: to_document(&task).map_err(|e| EngineError::Store(e.to_string()))?,
            });
        }
    }

    store.batch_commit(ops).await?;
    info!(
        "Campaign {} assignments saved, {} new task(s)",
        campaign_id,
        delta.len()
    );

    let updated = store.get_one("campaigns", campaign_id).await?;
    let campaign: Campaign =
        from_document(updated).map_err(|e| EngineError::Store(format!("malformed campaign: {}", e)))?;
    Ok(AssignOutcome {
        campaign,
        created_tasks: delta,
    })
}

// POST /campaigns/{campaign_id}/assign
pub async fn assign_staff(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<AssignRequest>,
) -> impl Responder {
    let campaign_id = path.into_inner();
    let ctx = match auth::context(&req) {
        Some(ctx) => ctx,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    match assign(data.store.as_ref(), &ctx, &campaign_id, &payload.selections).await {
        Ok(outcome) => HttpResponse::Ok().json(outcome.campaign),
        Err(e) => {
            error!("Error assigning staff on campaign {}: {}", campaign_id, e);
            e.to_response()
        }
    }
}
