//! # contract: domain types and the seams to the outside world
//!
//! This module defines the data the CLI moves around (courses, coursework,
//! submissions, uploaded Drive files) and the traits behind which every
//! remote or host side effect sits:
//!
//! - [`CourseService`]: Google Classroom (listing, submission lookup, attach, turn-in)
//! - [`StorageService`]: Google Drive (resumable file upload)
//! - [`LinkOpener`]: opening a URL in the user's browser
//! - [`TurnInPrompt`]: asking the user whether to finalize a submission
//!
//! ## Mocking & Testing
//! Every trait is annotated for `mockall`; the generated `Mock*` types are
//! exported with the `test-export-mocks` feature (on by default) so the
//! workflow can be driven end to end without a network or a terminal.
//!
//! ## Errors
//! Remote calls fail with [`ServiceError`]. HTTP-level failures carry an
//! [`ApiError`] decoded from Google's error envelope, which is what allows the
//! submission workflow to tell a domain-policy denial apart from everything else.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Token Classroom embeds in 403 responses when an administrator blocks
/// third-party write access to course data.
pub const POLICY_DENIED_TOKEN: &str = "ProjectPermissionDenied";

/// One page of a listing call.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_page_token: Option<String>) -> Self {
        Self {
            items,
            next_page_token,
        }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub section: Option<String>,
    pub room: Option<String>,
    pub course_state: Option<String>,
    pub alternate_link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonName {
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: PersonName,
    pub email_address: Option<String>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        self.name.full_name.as_deref().unwrap_or("Unknown")
    }

    pub fn display_email(&self) -> &str {
        match self.email_address.as_deref() {
            Some(email) if !email.is_empty() => email,
            _ => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub profile: UserProfile,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DueDate {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hours: Option<u32>,
    pub minutes: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseWork {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub work_type: Option<String>,
    pub due_date: Option<DueDate>,
    pub due_time: Option<TimeOfDay>,
    pub alternate_link: Option<String>,
}

impl CourseWork {
    /// `YYYY-MM-DD HH:MM`, or `-` when there is no due date or it is not a real date.
    /// Missing parts default to 1970-01-01 00:00.
    pub fn due_display(&self) -> String {
        if self.due_date.is_none() && self.due_time.is_none() {
            return "-".to_string();
        }
        let date = self.due_date.clone().unwrap_or_default();
        let time = self.due_time.clone().unwrap_or_default();
        let day = NaiveDate::from_ymd_opt(
            date.year.unwrap_or(1970),
            date.month.unwrap_or(1),
            date.day.unwrap_or(1),
        );
        let clock = NaiveTime::from_hms_opt(time.hours.unwrap_or(0), time.minutes.unwrap_or(0), 0);
        match (day, clock) {
            (Some(day), Some(clock)) => day.and_time(clock).format("%Y-%m-%d %H:%M").to_string(),
            _ => "-".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFileRef {
    pub id: String,
    pub title: Option<String>,
    pub alternate_link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub drive_file: Option<DriveFileRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentSubmission {
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// A student's work against one piece of coursework. The `state` is passed
/// through untouched (`NEW`, `CREATED`, `TURNED_IN`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    #[serde(default)]
    pub course_id: String,
    #[serde(default)]
    pub course_work_id: String,
    pub user_id: Option<String>,
    pub state: Option<String>,
    pub alternate_link: Option<String>,
    pub assignment_submission: Option<AssignmentSubmission>,
}

impl Submission {
    pub fn attachments(&self) -> &[Attachment] {
        self.assignment_submission
            .as_ref()
            .map(|a| a.attachments.as_slice())
            .unwrap_or(&[])
    }
}

/// What gets added to a submission. Serializes to Classroom's
/// `{"driveFile": {"id": "..."}}` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AttachmentRef {
    DriveFile { id: String },
}

impl AttachmentRef {
    pub fn drive_file(id: impl Into<String>) -> Self {
        AttachmentRef::DriveFile { id: id.into() }
    }
}

/// A Drive object created from a local file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub web_view_link: Option<String>,
}

/// HTTP error decoded from a Google API response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("HTTP {status}: {message}")]
pub struct ApiError {
    pub status: u16,
    /// Canonical status string (`PERMISSION_DENIED`) or OAuth error code (`invalid_grant`).
    pub code: Option<String>,
    pub message: String,
    /// Machine-readable reasons from `error.errors[].reason` and `error.details[].reason`.
    pub reasons: Vec<String>,
    pub body: String,
}

impl ApiError {
    /// Decodes both the `{"error": {...}}` envelope of the REST APIs and the
    /// `{"error": "...", "error_description": "..."}` shape of the OAuth token endpoint.
    /// Anything else keeps the raw body as the message.
    pub fn from_response(status: u16, body: &str) -> Self {
        let mut err = ApiError {
            status,
            code: None,
            message: body.trim().to_string(),
            reasons: Vec::new(),
            body: body.to_string(),
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
            return err;
        };
        match value.get("error") {
            Some(serde_json::Value::Object(obj)) => {
                if let Some(msg) = obj.get("message").and_then(|m| m.as_str()) {
                    err.message = msg.to_string();
                }
                err.code = obj
                    .get("status")
                    .and_then(|s| s.as_str())
                    .map(str::to_string);
                for key in ["errors", "details"] {
                    if let Some(items) = obj.get(key).and_then(|v| v.as_array()) {
                        err.reasons.extend(
                            items
                                .iter()
                                .filter_map(|i| i.get("reason").and_then(|r| r.as_str()))
                                .map(str::to_string),
                        );
                    }
                }
            }
            Some(serde_json::Value::String(code)) => {
                err.code = Some(code.clone());
                err.message = value
                    .get("error_description")
                    .and_then(|d| d.as_str())
                    .unwrap_or(code)
                    .to_string();
            }
            _ => {}
        }
        err
    }

    /// A 403 carrying the policy token. Structured reasons are checked first;
    /// the message and raw body are only a fallback because the token is not a
    /// documented part of the error schema.
    pub fn is_policy_denied(&self) -> bool {
        if self.status != 403 {
            return false;
        }
        if self.reasons.iter().any(|r| r == POLICY_DENIED_TOKEN) {
            return true;
        }
        self.message.contains(POLICY_DENIED_TOKEN) || self.body.contains(POLICY_DENIED_TOKEN)
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    pub fn is_policy_denied(&self) -> bool {
        matches!(self, ServiceError::Api(api) if api.is_policy_denied())
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceError::Api(api) => Some(api.status),
            _ => None,
        }
    }
}

/// Google Classroom, as far as this CLI needs it.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CourseService: Send + Sync {
    /// Profile of the authenticated user.
    async fn get_profile(&self) -> Result<UserProfile, ServiceError>;

    async fn list_courses(
        &self,
        page_size: Option<u32>,
        page_token: Option<String>,
    ) -> Result<Page<Course>, ServiceError>;

    async fn list_students(
        &self,
        course_id: &str,
        page_token: Option<String>,
    ) -> Result<Page<Student>, ServiceError>;

    async fn list_course_work(
        &self,
        course_id: &str,
        page_token: Option<String>,
    ) -> Result<Page<CourseWork>, ServiceError>;

    /// Submissions of the authenticated user for one piece of coursework.
    async fn list_submissions(
        &self,
        course_id: &str,
        course_work_id: &str,
    ) -> Result<Vec<Submission>, ServiceError>;

    async fn modify_attachments(
        &self,
        course_id: &str,
        course_work_id: &str,
        submission_id: &str,
        attachment: &AttachmentRef,
    ) -> Result<(), ServiceError>;

    async fn turn_in(
        &self,
        course_id: &str,
        course_work_id: &str,
        submission_id: &str,
    ) -> Result<(), ServiceError>;
}

/// Content storage (Google Drive).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Uploads the file at `path` as a new object called `name`.
    ///
    /// Implementors must use a resumable, chunked transfer; the call returns
    /// only once the whole file is committed or the upload has failed.
    async fn create_file(&self, name: &str, path: &Path) -> Result<UploadedFile, ServiceError>;
}

/// Opens links in the host's browser.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait LinkOpener: Send + Sync {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Asks whether an attached submission should be turned in now.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait TurnInPrompt: Send + Sync {
    fn confirm_turn_in(&self, assignment_url: &str) -> std::io::Result<bool>;
}
