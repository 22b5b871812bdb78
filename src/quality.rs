// src/quality.rs

use std::time::Duration;

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use crate::auth;

/// Stand-in for the external quality-assessment service: scores are
/// derived from the descriptor so repeated calls agree, and the fixed
/// delay mimics the real service's latency.
#[derive(Debug, Deserialize)]
pub struct AssessRequest {
    #[serde(rename = "videoUrl")]
    pub video_url: String,
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct Assessment {
    pub score: i32,
    pub issues: Vec<String>,
}

// POST /quality/assess
pub async fn assess_video(req: HttpRequest, payload: web::Json<AssessRequest>) -> impl Responder {
    if auth::context(&req).is_none() {
        return HttpResponse::Unauthorized().body("Unauthorized");
    }

    tokio::time::sleep(Duration::from_millis(1200)).await;

    let seed = payload
        .title
        .bytes()
        .chain(payload.video_url.bytes())
        .fold(0_u32, |acc, b| acc.wrapping_add(u32::from(b)));
    let score = 70 + (seed % 31) as i32;

    let mut issues = Vec::new();
    if score < 80 {
        issues.push("Audio levels vary between cuts".to_string());
    }
    if payload.title.len() < 8 {
        issues.push("Title is too short for search".to_string());
    }

    HttpResponse::Ok().json(Assessment { score, issues })
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::{test, web, HttpMessage, Responder};

    use super::{assess_video, AssessRequest};
    use crate::models::{AuthContext, Role};

    fn payload() -> web::Json<AssessRequest> {
        web::Json(AssessRequest {
            video_url: "https://videos.example/final-cut.mp4".to_string(),
            title: "Launch teaser".to_string(),
        })
    }

    #[actix_web::test]
    async fn assessment_requires_an_authenticated_caller() {
        let req = test::TestRequest::default().to_http_request();
        let res = assess_video(req.clone(), payload()).await.respond_to(&req);
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn any_authenticated_role_can_request_an_assessment() {
        let req = test::TestRequest::default().to_http_request();
        req.extensions_mut().insert(AuthContext {
            uid: "e1".to_string(),
            email: "e1@console.test".to_string(),
            role: Role::VideoEditor,
        });
        let res = assess_video(req.clone(), payload()).await.respond_to(&req);
        assert_eq!(res.status(), StatusCode::OK);
    }
}
