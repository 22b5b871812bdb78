// src/workload.rs

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use log::error;
use mongodb::bson::{doc, Bson, Document};
use serde::Serialize;

use crate::app_state::AppState;
use crate::auth;
use crate::error::EngineError;
use crate::models::{Role, User};
use crate::roles::list_users_by_role;
use crate::store::DocumentStore;

#[derive(Debug, Serialize, PartialEq)]
pub struct WorkloadStats {
    pub assigned: u64,
    pub pending: u64,
    pub completed: u64,
    pub earnings: f64,
}

/// Numeric field read tolerant of the int/double mix legacy documents
/// carry.
fn number_field(document: &Document, key: &str) -> f64 {
    match document.get(key) {
        Some(Bson::Double(v)) => *v,
        Some(Bson::Int32(v)) => f64::from(*v),
        Some(Bson::Int64(v)) => *v as f64,
        _ => 0.0,
    }
}

/// Workload counts for one staff member, from a full scan of the role's
/// task collection (the single canonical record set; assignment fields
/// hold uids end to end, so the filter is one equality).
///
/// Terminal-success statuses are Completed and Approved; everything
/// else, including In Progress and Revision, counts as pending. Earnings
/// sum the optional payout field over terminal tasks. One store query
/// per staff member per refresh: O(N) across a roster, not O(1).
pub async fn compute_stats(
    store: &dyn DocumentStore,
    staff_uid: &str,
    role: Role,
) -> Result<WorkloadStats, EngineError> {
    let collection = role.task_collection().ok_or_else(|| {
        EngineError::Invalid(format!("{} has no task workload", role.as_str()))
    })?;

    let docs = store
        .get_where(collection, doc! { "assignedTo": staff_uid })
        .await?;

    let assigned = docs.len() as u64;
    let mut completed = 0_u64;
    let mut earnings = 0.0_f64;
    for document in &docs {
        // Missing status on a legacy record classifies as pending.
        let status = document.get_str("status").unwrap_or("");
        if matches!(status, "Completed" | "Approved") {
            completed += 1;
            earnings += number_field(document, "payout");
        }
    }

    Ok(WorkloadStats {
        assigned,
        pending: assigned - completed,
        completed,
        earnings,
    })
}

#[derive(Debug, Serialize)]
pub struct StaffWorkload {
    pub user: User,
    pub stats: WorkloadStats,
}

// GET /stats/role/{role}
// Manager dashboard fan-out: one aggregation query per staff member.
pub async fn get_role_workload(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let ctx = match auth::context(&req) {
        Some(ctx) => ctx,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if !ctx.role.is_admin() {
        return HttpResponse::Unauthorized().body("Only admins can view role workloads");
    }
    let role = match Role::parse(&path.into_inner()) {
        Some(role) if role.is_staff() => role,
        Some(role) => {
            return HttpResponse::BadRequest()
                .body(format!("{} has no task workload", role.as_str()))
        }
        None => return HttpResponse::BadRequest().body("Unknown role"),
    };

    let store = data.store.as_ref();
    let staff = match list_users_by_role(store, role).await {
        Ok(staff) => staff,
        Err(e) => {
            error!("Error listing {} staff: {}", role.as_str(), e);
            return e.to_response();
        }
    };

    let mut rows = Vec::with_capacity(staff.len());
    for user in staff {
        match compute_stats(store, &user.id, role).await {
            Ok(stats) => rows.push(StaffWorkload { user, stats }),
            Err(e) => {
                error!("Error computing stats for {}: {}", user.id, e);
                return e.to_response();
            }
        }
    }
    HttpResponse::Ok().json(rows)
}

// GET /stats/me
pub async fn get_my_workload(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let ctx = match auth::context(&req) {
        Some(ctx) => ctx,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if !ctx.role.is_staff() {
        return HttpResponse::BadRequest().body("Only staff accounts have a workload");
    }

    match compute_stats(data.store.as_ref(), &ctx.uid, ctx.role).await {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(e) => {
            error!("Error computing stats for {}: {}", ctx.uid, e);
            e.to_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::doc;

    use super::compute_stats;
    use crate::error::EngineError;
    use crate::models::Role;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn counts_split_into_assigned_pending_completed() {
        let store = MemoryStore::new();
        store.seed(
            "uploader_tasks",
            vec![
                doc! { "_id": "t1", "assignedTo": "u1", "status": "Assigned" },
                doc! { "_id": "t2", "assignedTo": "u1", "status": "In Progress" },
                doc! { "_id": "t3", "assignedTo": "u1", "status": "Completed" },
                doc! { "_id": "t4", "assignedTo": "someone-else", "status": "Completed" },
            ],
        );

        let stats = compute_stats(&store, "u1", Role::Uploader).await.unwrap();
        assert_eq!(stats.assigned, 3);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.completed, 1);
    }

    #[tokio::test]
    async fn approved_counts_as_completed_and_revision_as_pending() {
        let store = MemoryStore::new();
        store.seed(
            "script_tasks",
            vec![
                doc! { "_id": "t1", "assignedTo": "w1", "status": "Approved" },
                doc! { "_id": "t2", "assignedTo": "w1", "status": "Revision" },
            ],
        );

        let stats = compute_stats(&store, "w1", Role::ScriptWriter).await.unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 1);
    }

    #[tokio::test]
    async fn legacy_records_without_status_count_as_pending() {
        let store = MemoryStore::new();
        store.seed(
            "thumbnail_tasks",
            vec![
                doc! { "_id": "t1", "assignedTo": "m1" },
                doc! { "_id": "t2", "assignedTo": "m1", "status": "Completed" },
            ],
        );

        let stats = compute_stats(&store, "m1", Role::ThumbnailMaker).await.unwrap();
        assert_eq!(stats.assigned, 2);
        assert_eq!(stats.pending, 1);
    }

    #[tokio::test]
    async fn earnings_sum_payouts_of_terminal_tasks_only() {
        let store = MemoryStore::new();
        store.seed(
            "video_edit_tasks",
            vec![
                doc! { "_id": "t1", "assignedTo": "e1", "status": "Completed", "payout": 120.5 },
                // legacy integer payout
                doc! { "_id": "t2", "assignedTo": "e1", "status": "Approved", "payout": 80_i32 },
                doc! { "_id": "t3", "assignedTo": "e1", "status": "In Progress", "payout": 999.0 },
            ],
        );

        let stats = compute_stats(&store, "e1", Role::VideoEditor).await.unwrap();
        assert_eq!(stats.earnings, 200.5);
    }

    #[tokio::test]
    async fn non_staff_roles_have_no_workload() {
        let store = MemoryStore::new();
        let result = compute_stats(&store, "b1", Role::Brand).await;
        assert!(matches!(result, Err(EngineError::Invalid(_))));
    }
}
