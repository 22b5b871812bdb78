// src/roles.rs

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use log::error;
use mongodb::bson::{doc, from_document};
use serde::Deserialize;

use crate::app_state::AppState;
use crate::auth;
use crate::error::EngineError;
use crate::models::{Role, User};
use crate::store::DocumentStore;

/// Role directory: the full staff pool holding a role. No pagination;
/// rosters are tens of users. An empty result means "no staff", callers
/// must not treat it as an error.
pub async fn list_users_by_role(
    store: &dyn DocumentStore,
    role: Role,
) -> Result<Vec<User>, EngineError> {
    let docs = store.get_where("users", doc! { "role": role.as_str() }).await?;
    // Legacy documents that no longer deserialize are skipped, not fatal.
    Ok(docs
        .into_iter()
        .filter_map(|d| from_document::<User>(d).ok())
        .collect())
}

// GET /users/by_role/{role}
pub async fn get_users_by_role(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let ctx = match auth::context(&req) {
        Some(ctx) => ctx,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if !ctx.role.is_admin() {
        return HttpResponse::Unauthorized().body("Only admins can list the staff directory");
    }
    let role = match Role::parse(&path.into_inner()) {
        Some(role) => role,
        None => return HttpResponse::BadRequest().body("Unknown role"),
    };

    match list_users_by_role(data.store.as_ref(), role).await {
        Ok(users) => HttpResponse::Ok().json(users),
        Err(e) => {
            error!("Error listing {} users: {}", role.as_str(), e);
            e.to_response()
        }
    }
}

// GET /users/{id}
pub async fn get_user(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let ctx = match auth::context(&req) {
        Some(ctx) => ctx,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    let user_id = path.into_inner();
    if !ctx.role.is_admin() && ctx.uid != user_id {
        return HttpResponse::Unauthorized().body("Cannot access another user's profile");
    }

    match data.store.get_one("users", &user_id).await {
        Ok(raw) => match from_document::<User>(raw) {
            Ok(user) => HttpResponse::Ok().json(user),
            Err(e) => {
                error!("Malformed user document {}: {}", user_id, e);
                HttpResponse::InternalServerError().body("Malformed user document")
            }
        },
        Err(e) => e.to_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    #[serde(rename = "isActive")]
    pub is_active: bool,
}

// PUT /users/{id}/active
pub async fn set_user_active(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<SetActiveRequest>,
) -> impl Responder {
    let ctx = match auth::context(&req) {
        Some(ctx) => ctx,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if !ctx.role.is_admin() {
        return HttpResponse::Unauthorized().body("Only admins can toggle accounts");
    }

    let user_id = path.into_inner();
    match data
        .store
        .patch("users", &user_id, doc! { "isActive": payload.is_active })
        .await
    {
        Ok(()) => HttpResponse::Ok().body("User updated"),
        Err(e) => {
            error!("Error toggling user {}: {}", user_id, e);
            e.to_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::doc;

    use super::list_users_by_role;
    use crate::models::Role;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn directory_filters_by_role_and_skips_malformed_docs() {
        let store = MemoryStore::new();
        store.seed(
            "users",
            vec![
                doc! { "_id": "u1", "role": "uploader", "email": "u1@x.com", "name": "A" },
                doc! { "_id": "u2", "role": "script_writer", "email": "u2@x.com", "name": "B" },
                // missing email, skipped rather than failing the listing
                doc! { "_id": "u3", "role": "uploader" },
            ],
        );

        let uploaders = list_users_by_role(&store, Role::Uploader).await.unwrap();
        assert_eq!(uploaders.len(), 1);
        assert_eq!(uploaders[0].id, "u1");
    }

    #[tokio::test]
    async fn empty_roster_is_not_an_error() {
        let store = MemoryStore::new();
        let editors = list_users_by_role(&store, Role::VideoEditor).await.unwrap();
        assert!(editors.is_empty());
    }
}
