// src/models.rs

use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};

/// serde default for timestamps missing on legacy documents.
pub fn bson_now() -> BsonDateTime {
    BsonDateTime::now()
}

fn default_true() -> bool {
    true
}

/// Every role known to the console. The four staff roles each own a task
/// collection and an assignment pointer field on the campaign document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    SuperAdmin,
    Brand,
    ScriptWriter,
    VideoEditor,
    ThumbnailMaker,
    Uploader,
}

impl Role {
    pub const STAFF: [Role; 4] = [
        Role::ScriptWriter,
        Role::VideoEditor,
        Role::ThumbnailMaker,
        Role::Uploader,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
            Role::Brand => "brand",
            Role::ScriptWriter => "script_writer",
            Role::VideoEditor => "video_editor",
            Role::ThumbnailMaker => "thumbnail_maker",
            Role::Uploader => "uploader",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "super_admin" => Some(Role::SuperAdmin),
            "brand" => Some(Role::Brand),
            "script_writer" => Some(Role::ScriptWriter),
            "video_editor" => Some(Role::VideoEditor),
            "thumbnail_maker" => Some(Role::ThumbnailMaker),
            "uploader" => Some(Role::Uploader),
            _ => None,
        }
    }

    /// The per-role task collection, for staff roles only.
    /// Collection names are fixed wire strings shared with the frontend.
    pub fn task_collection(&self) -> Option<&'static str> {
        match self {
            Role::ScriptWriter => Some("script_tasks"),
            Role::VideoEditor => Some("video_edit_tasks"),
            Role::ThumbnailMaker => Some("thumbnail_tasks"),
            Role::Uploader => Some("uploader_tasks"),
            _ => None,
        }
    }

    /// The campaign field holding the current assignee for this role.
    pub fn assignment_field(&self) -> Option<&'static str> {
        match self {
            Role::ScriptWriter => Some("assignedScriptWriter"),
            Role::VideoEditor => Some("assignedVideoEditor"),
            Role::ThumbnailMaker => Some("assignedThumbnailMaker"),
            Role::Uploader => Some("assignedUploader"),
            _ => None,
        }
    }

    pub fn is_staff(&self) -> bool {
        self.task_collection().is_some()
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

/// The authenticated caller, decoded from the bearer token and passed
/// explicitly into every engine call. Staff identity is the uid; emails
/// are display-only and never used as assignment identifiers.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub uid: String,
    pub email: String,
    pub role: Role,
}

/// A user as read back from the `users` collection. The stored password
/// hash is intentionally absent so this type is safe to return from
/// handlers.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub balance: f64,
    #[serde(rename = "isActive", default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub version: i64,
}

/// One entry of the campaign's `assignedStaff` list. The invariant is at
/// most one slot per role; the engine rebuilds the whole list on every
/// save to keep it that way.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AssignmentSlot {
    pub role: Role,
    pub uid: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Campaign {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "brandId")]
    pub brand_id: String,
    #[serde(rename = "brandName", default, skip_serializing_if = "Option::is_none")]
    pub brand_name: Option<String>,
    #[serde(rename = "videoTitle", default, skip_serializing_if = "Option::is_none")]
    pub video_title: Option<String>,
    #[serde(default)]
    pub budget: f64,
    /// Free-form at the store level; the HTTP surface only writes
    /// Draft / Pending Approval / Approved / Rejected / Assigned /
    /// Active / Completed.
    pub status: String,
    #[serde(rename = "assignedUploader", default, skip_serializing_if = "Option::is_none")]
    pub assigned_uploader: Option<String>,
    #[serde(rename = "assignedVideoEditor", default, skip_serializing_if = "Option::is_none")]
    pub assigned_video_editor: Option<String>,
    #[serde(rename = "assignedScriptWriter", default, skip_serializing_if = "Option::is_none")]
    pub assigned_script_writer: Option<String>,
    #[serde(rename = "assignedThumbnailMaker", default, skip_serializing_if = "Option::is_none")]
    pub assigned_thumbnail_maker: Option<String>,
    #[serde(rename = "assignedStaff", default)]
    pub assigned_staff: Vec<AssignmentSlot>,
    #[serde(rename = "createdAt", default = "bson_now")]
    pub created_at: BsonDateTime,
    #[serde(rename = "updatedAt", default = "bson_now")]
    pub updated_at: BsonDateTime,
    #[serde(default)]
    pub version: i64,
}

impl Campaign {
    /// Current assignee uid for a staff role, None for non-staff roles.
    pub fn assignee(&self, role: Role) -> Option<&str> {
        match role {
            Role::Uploader => self.assigned_uploader.as_deref(),
            Role::VideoEditor => self.assigned_video_editor.as_deref(),
            Role::ScriptWriter => self.assigned_script_writer.as_deref(),
            Role::ThumbnailMaker => self.assigned_thumbnail_maker.as_deref(),
            _ => None,
        }
    }
}

/// A per-role work item. Created exactly once per assignment delta and
/// never deleted; reassignment appends a new task rather than rewriting
/// the old one.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RoleTask {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "campaignId")]
    pub campaign_id: String,
    #[serde(rename = "campaignName", default)]
    pub campaign_name: String,
    #[serde(rename = "brandName", default)]
    pub brand_name: String,
    #[serde(rename = "videoTitle", default)]
    pub video_title: String,
    #[serde(rename = "assignedTo")]
    pub assigned_to: String,
    #[serde(rename = "assignedBy", default)]
    pub assigned_by: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payout: Option<f64>,
    #[serde(rename = "assignedAt", default = "bson_now")]
    pub assigned_at: BsonDateTime,
    #[serde(rename = "createdAt", default = "bson_now")]
    pub created_at: BsonDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxType {
    Deposit,
    Withdrawal,
}

/// An append-only ledger record. `amount` and `brandId` never change
/// after creation; only `status` is patched, and the version field
/// guards against two admins settling the same transaction.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Transaction {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "brandId")]
    pub brand_id: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub status: String,
    #[serde(default = "bson_now")]
    pub timestamp: BsonDateTime,
    #[serde(default)]
    pub version: i64,
}
