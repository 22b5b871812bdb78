use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{error, info};
use mongodb::bson::{doc, DateTime as BsonDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::{AuthContext, Role};
use crate::store::DocumentStore;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: usize,
}

#[derive(Deserialize)]
pub struct SignupInfo {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

#[derive(Deserialize)]
pub struct LoginInfo {
    pub email: String,
    pub password: String,
}

// JWT Creation
pub fn create_jwt(uid: &str, email: &str, role: Role, secret: &str) -> String {
    let expiration = Utc::now() + Duration::hours(24);
    let claims = Claims {
        sub: uid.to_string(),
        email: email.to_string(),
        role: role.as_str().to_string(),
        exp: expiration.timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref())).unwrap()
}

// JWT Validation
pub fn validate_jwt(token: &str, secret: &str) -> Result<AuthContext, String> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )
    .map_err(|e| format!("Token decode error: {}", e))?;
    let role = Role::parse(&token_data.claims.role)
        .ok_or_else(|| format!("Unknown role in token: {}", token_data.claims.role))?;
    Ok(AuthContext {
        uid: token_data.claims.sub,
        email: token_data.claims.email,
        role,
    })
}

/// The authenticated caller, if the middleware attached one.
pub fn context(req: &HttpRequest) -> Option<AuthContext> {
    req.extensions().get::<AuthContext>().cloned()
}

// Signup Endpoint
pub async fn signup(
    data: web::Data<AppState>,
    signup_info: web::Json<SignupInfo>,
) -> impl Responder {
    let email_re = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    if !email_re.is_match(&signup_info.email) {
        return HttpResponse::BadRequest().body("Invalid email address");
    }

    let role = match Role::parse(&signup_info.role) {
        Some(role) => role,
        None => return HttpResponse::BadRequest().body("Unknown role"),
    };
    // Admin and super-admin accounts are provisioned out of band.
    if role.is_admin() {
        return HttpResponse::BadRequest().body("Cannot self-register an admin account");
    }

    let store = data.store.as_ref();
    match store.get_where("users", doc! { "email": &signup_info.email }).await {
        Ok(existing) if !existing.is_empty() => {
            return HttpResponse::BadRequest().body("Email already registered");
        }
        Ok(_) => {}
        Err(e) => {
            error!("Error checking existing user: {}", e);
            return e.to_response();
        }
    }

    let hashed_password = match hash(&signup_info.password, DEFAULT_COST) {
        Ok(h) => h,
        Err(_) => return HttpResponse::InternalServerError().body("Error hashing password"),
    };

    let uid = Uuid::new_v4().to_string();
    let user_doc = doc! {
        "_id": &uid,
        "name": &signup_info.name,
        "email": &signup_info.email,
        "role": role.as_str(),
        "password": hashed_password,
        "balance": 0.0,
        "isActive": true,
        "version": 0_i64,
        "createdAt": BsonDateTime::now(),
    };

    match store.create("users", user_doc).await {
        Ok(_) => {
            info!("User registered: {} ({})", signup_info.email, role.as_str());
            HttpResponse::Ok().json(serde_json::json!({ "status": "User created", "user_id": uid }))
        }
        Err(e) => {
            error!("Error creating user: {}", e);
            e.to_response()
        }
    }
}

// Login Endpoint
pub async fn login(data: web::Data<AppState>, login_info: web::Json<LoginInfo>) -> impl Responder {
    let store = data.store.as_ref();
    let users = match store.get_where("users", doc! { "email": &login_info.email }).await {
        Ok(users) => users,
        Err(e) => {
            error!("Error logging in: {}", e);
            return e.to_response();
        }
    };

    let user = match users.first() {
        Some(user) => user,
        None => return HttpResponse::Unauthorized().body("User not found"),
    };

    if !user.get_bool("isActive").unwrap_or(true) {
        return HttpResponse::Unauthorized().body("Account is deactivated");
    }

    let stored_hash = user.get_str("password").unwrap_or("");
    if !verify(&login_info.password, stored_hash).unwrap_or(false) {
        return HttpResponse::Unauthorized().body("Invalid credentials");
    }

    let uid = user.get_str("_id").unwrap_or("").to_string();
    let role = Role::parse(user.get_str("role").unwrap_or("")).unwrap_or(Role::Brand);
    let token = create_jwt(&uid, &login_info.email, role, &data.config.jwt_secret);
    HttpResponse::Ok().json(serde_json::json!({
        "token": token,
        "user_id": uid,
        "role": role.as_str(),
    }))
}
