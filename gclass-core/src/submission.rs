//! Submission workflow: upload → locate submission → attach → confirm → turn in.
//!
//! Each stage either succeeds, fails with a [`WorkflowError`] naming the stage
//! and the identifiers involved, or (lookup and attach only) ends in a
//! well-defined manual fallback. Nothing is retried here.
//!
//! # Outcomes
//! - [`SubmissionResult::TurnedIn`]: attached and turned in.
//! - [`SubmissionResult::AttachedPendingManualTurnIn`]: attached, the user
//!   declined to turn in now.
//! - [`SubmissionResult::ManualFallbackRequired`]: the user has to finish in
//!   the browser, either because no submission exists for them or because a
//!   domain policy blocks write access to Classroom.
//!
//! Every outcome comes back inside a [`SubmissionReport`] carrying the
//! assignment URL and the uploaded Drive file, which is everything the
//! presentation layer needs to hand off to the user.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::contract::{
    AttachmentRef, CourseService, ServiceError, StorageService, TurnInPrompt, UploadedFile,
};
use crate::links::assignment_url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    NoSubmissionFound,
    PolicyDenied,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::NoSubmissionFound => f.write_str("no submission found"),
            FallbackReason::PolicyDenied => f.write_str("policy-denied"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionResult {
    TurnedIn,
    AttachedPendingManualTurnIn,
    ManualFallbackRequired(FallbackReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReport {
    pub result: SubmissionResult,
    pub course_id: String,
    pub course_work_id: String,
    /// `None` only when no submission was found.
    pub submission_id: Option<String>,
    pub uploaded: UploadedFile,
    pub assignment_url: String,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("file not found: {}", .path.display())]
    FileNotFound { path: PathBuf },
    #[error("cannot derive a file name from {}", .path.display())]
    InvalidFileName { path: PathBuf },
    #[error("upload of {} failed: {source}", .path.display())]
    Upload {
        path: PathBuf,
        #[source]
        source: ServiceError,
    },
    #[error("looking up your submission for course {course_id}, assignment {course_work_id} failed: {source}")]
    Lookup {
        course_id: String,
        course_work_id: String,
        #[source]
        source: ServiceError,
    },
    #[error("attaching file {file_id} to submission {submission_id} (course {course_id}, assignment {course_work_id}) failed: {source}")]
    Attach {
        course_id: String,
        course_work_id: String,
        submission_id: String,
        file_id: String,
        #[source]
        source: ServiceError,
    },
    #[error("turning in submission {submission_id} (course {course_id}, assignment {course_work_id}) failed: {source}")]
    TurnIn {
        course_id: String,
        course_work_id: String,
        submission_id: String,
        #[source]
        source: ServiceError,
    },
    #[error("turn-in confirmation failed: {0}")]
    Prompt(#[source] std::io::Error),
}

/// Uploads a local file under its base name.
pub async fn upload_local_file<S>(storage: &S, path: &Path) -> Result<UploadedFile, WorkflowError>
where
    S: StorageService + ?Sized,
{
    if !path.is_file() {
        return Err(WorkflowError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| WorkflowError::InvalidFileName {
            path: path.to_path_buf(),
        })?;

    info!(file = %path.display(), name = %name, "[SUBMIT][UPLOAD] Uploading file to Drive");
    let uploaded = storage
        .create_file(&name, path)
        .await
        .map_err(|source| {
            error!(error = %source, file = %path.display(), "[SUBMIT][UPLOAD] Upload failed");
            WorkflowError::Upload {
                path: path.to_path_buf(),
                source,
            }
        })?;
    info!(file_id = %uploaded.id, link = ?uploaded.web_view_link, "[SUBMIT][UPLOAD] Upload complete");
    Ok(uploaded)
}

pub struct SubmitRequest<'a> {
    pub course_id: &'a str,
    pub course_work_id: &'a str,
    pub file_path: &'a Path,
}

/// The submission state machine, wired to explicit service handles.
pub struct SubmissionWorkflow<'a, C: ?Sized, S: ?Sized, P: ?Sized> {
    courses: &'a C,
    storage: &'a S,
    prompt: &'a P,
}

impl<'a, C, S, P> SubmissionWorkflow<'a, C, S, P>
where
    C: CourseService + ?Sized,
    S: StorageService + ?Sized,
    P: TurnInPrompt + ?Sized,
{
    pub fn new(courses: &'a C, storage: &'a S, prompt: &'a P) -> Self {
        Self {
            courses,
            storage,
            prompt,
        }
    }

    pub async fn submit(&self, req: SubmitRequest<'_>) -> Result<SubmissionReport, WorkflowError> {
        let SubmitRequest {
            course_id,
            course_work_id,
            file_path,
        } = req;
        let url = assignment_url(course_id, course_work_id);
        info!(course_id, course_work_id, file = %file_path.display(), "[SUBMIT] Starting submission");

        let uploaded = upload_local_file(self.storage, file_path).await?;

        let report = |result: SubmissionResult, submission_id: Option<String>| SubmissionReport {
            result,
            course_id: course_id.to_string(),
            course_work_id: course_work_id.to_string(),
            submission_id,
            uploaded: uploaded.clone(),
            assignment_url: url.clone(),
        };

        let submissions = self
            .courses
            .list_submissions(course_id, course_work_id)
            .await
            .map_err(|source| WorkflowError::Lookup {
                course_id: course_id.to_string(),
                course_work_id: course_work_id.to_string(),
                source,
            })?;

        let Some(submission) = submissions.first() else {
            warn!(course_id, course_work_id, "[SUBMIT] No submission found for this account");
            return Ok(report(
                SubmissionResult::ManualFallbackRequired(FallbackReason::NoSubmissionFound),
                None,
            ));
        };
        if submissions.len() > 1 {
            warn!(
                count = submissions.len(),
                using = %submission.id,
                "[SUBMIT] More than one submission returned, using the first"
            );
        }
        let submission_id = submission.id.clone();

        let attachment = AttachmentRef::drive_file(&uploaded.id);
        match self
            .courses
            .modify_attachments(course_id, course_work_id, &submission_id, &attachment)
            .await
        {
            Ok(()) => {
                info!(submission_id = %submission_id, file_id = %uploaded.id, "[SUBMIT][ATTACH] File attached");
            }
            Err(e) if e.is_policy_denied() => {
                warn!(error = %e, "[SUBMIT][ATTACH] Classroom write access blocked by domain policy");
                return Ok(report(
                    SubmissionResult::ManualFallbackRequired(FallbackReason::PolicyDenied),
                    Some(submission_id),
                ));
            }
            Err(source) => {
                error!(error = %source, submission_id = %submission_id, "[SUBMIT][ATTACH] Attach failed");
                return Err(WorkflowError::Attach {
                    course_id: course_id.to_string(),
                    course_work_id: course_work_id.to_string(),
                    submission_id,
                    file_id: uploaded.id.clone(),
                    source,
                });
            }
        }

        let confirmed = self
            .prompt
            .confirm_turn_in(&url)
            .map_err(WorkflowError::Prompt)?;
        if !confirmed {
            info!(submission_id = %submission_id, "[SUBMIT] Turn-in declined, left for manual turn-in");
            return Ok(report(
                SubmissionResult::AttachedPendingManualTurnIn,
                Some(submission_id),
            ));
        }

        self.courses
            .turn_in(course_id, course_work_id, &submission_id)
            .await
            .map_err(|source| {
                error!(error = %source, submission_id = %submission_id, "[SUBMIT][TURN-IN] Turn-in failed");
                WorkflowError::TurnIn {
                    course_id: course_id.to_string(),
                    course_work_id: course_work_id.to_string(),
                    submission_id: submission_id.clone(),
                    source,
                }
            })?;
        info!(submission_id = %submission_id, "[SUBMIT][TURN-IN] Turned in");
        Ok(report(SubmissionResult::TurnedIn, Some(submission_id)))
    }
}
