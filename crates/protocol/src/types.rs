use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Urgency a complainant attaches to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Body of `POST /complaints`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintSubmission {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ComplaintSubmission {
    /// Creates a submission carrying only free text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            category: None,
            priority: None,
            metadata: None,
        }
    }
}

/// Server-side lifecycle of a complaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplaintStatus {
    Pending,
    Processing,
    Resolved,
}

/// Server-materialized view of a complaint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintRecord {
    pub id: String,
    pub status: ComplaintStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<AttachmentInfo>,
}

/// Virus scan verdict for an attachment. Set by the server only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Clean,
    ThreatDetected,
}

impl ScanStatus {
    /// Returns `true` once the server has reached a verdict.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A file attached to a complaint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInfo {
    pub id: String,
    pub filename: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
    pub scan_status: ScanStatus,
}

/// Body of `POST /upload-sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub complaint_id: String,
    pub filename: String,
    pub file_size: u64,
    pub mime_type: String,
    pub total_chunks: u32,
}

/// A chunked upload session as issued by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub session_id: String,
    #[serde(default)]
    pub upload_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Response of `GET /upload-sessions/{id}`.
///
/// `missing_chunks` is optional: servers that track received chunks as a
/// set report the exact indices still outstanding, which takes precedence
/// over `uploaded_chunks` when resuming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub uploaded_chunks: u32,
    pub total_chunks: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_chunks: Option<Vec<u32>>,
}
