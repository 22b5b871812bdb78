// src/tasks.rs

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use log::error;
use mongodb::bson::{doc, from_document};
use serde::Deserialize;

use crate::app_state::AppState;
use crate::auth;
use crate::models::{Role, RoleTask};
use crate::store::DocumentStore;

// GET /tasks/{role}/mine
// A staff member's own task list from their role collection.
pub async fn list_my_tasks(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let ctx = match auth::context(&req) {
        Some(ctx) => ctx,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    let role = match Role::parse(&path.into_inner()) {
        Some(role) => role,
        None => return HttpResponse::BadRequest().body("Unknown role"),
    };
    let collection = match role.task_collection() {
        Some(collection) => collection,
        None => return HttpResponse::BadRequest().body("Role has no task collection"),
    };
    if ctx.role != role && !ctx.role.is_admin() {
        return HttpResponse::Unauthorized().body("Cannot read another role's tasks");
    }

    match data
        .store
        .get_where(collection, doc! { "assignedTo": &ctx.uid })
        .await
    {
        Ok(docs) => {
            let tasks: Vec<RoleTask> = docs
                .into_iter()
                .filter_map(|d| from_document::<RoleTask>(d).ok())
                .collect();
            HttpResponse::Ok().json(tasks)
        }
        Err(e) => {
            error!("Error listing {} tasks: {}", collection, e);
            e.to_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskStatusRequest {
    pub status: String,
}

// PUT /tasks/{role}/{task_id}/status
// Staff advance their own tasks; Approved is a manager/admin action.
// Tasks are never deleted, whatever status they reach.
pub async fn update_task_status(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    payload: web::Json<UpdateTaskStatusRequest>,
) -> impl Responder {
    let (role_str, task_id) = path.into_inner();
    let ctx = match auth::context(&req) {
        Some(ctx) => ctx,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    let role = match Role::parse(&role_str) {
        Some(role) => role,
        None => return HttpResponse::BadRequest().body("Unknown role"),
    };
    let collection = match role.task_collection() {
        Some(collection) => collection,
        None => return HttpResponse::BadRequest().body("Role has no task collection"),
    };

    let new_status = payload.status.as_str();
    let staff_statuses = ["Assigned", "In Progress", "Revision", "Completed"];
    let allowed = if ctx.role.is_admin() {
        new_status == "Approved" || staff_statuses.contains(&new_status)
    } else {
        staff_statuses.contains(&new_status)
    };
    if !allowed {
        return HttpResponse::BadRequest().body(format!("{} is not a valid task status", new_status));
    }

    let task = match data.store.get_one(collection, &task_id).await {
        Ok(task) => task,
        Err(e) => return e.to_response(),
    };
    if !ctx.role.is_admin() && task.get_str("assignedTo").unwrap_or("") != ctx.uid {
        return HttpResponse::Unauthorized().body("Not your task");
    }

    match data
        .store
        .patch(collection, &task_id, doc! { "status": new_status })
        .await
    {
        Ok(()) => HttpResponse::Ok().body("Task updated"),
        Err(e) => {
            error!("Error updating task {}/{}: {}", collection, task_id, e);
            e.to_response()
        }
    }
}
