#![doc = "Google Classroom REST client implementing the core `CourseService` trait."]
//
//! # Classroom client
//!
//! Thin async wrapper over the Classroom v1 REST API. Every call carries the
//! user's bearer token; error responses are decoded into
//! [`ApiError`](gclass_core::contract::ApiError) so the submission workflow can
//! recognise a domain-policy denial.

use async_trait::async_trait;
use gclass_core::contract::{
    AttachmentRef, Course, CourseService, CourseWork, Page, ServiceError, Student, Submission,
    UserProfile,
};
use gclass_core::listing::collect_pages;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::http::{error_for_status, read_json, transport};

pub const DEFAULT_CLASSROOM_URL: &str = "https://classroom.googleapis.com/v1";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CourseList {
    #[serde(default)]
    courses: Vec<Course>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentList {
    #[serde(default)]
    students: Vec<Student>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CourseWorkList {
    #[serde(default)]
    course_work: Vec<CourseWork>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmissionList {
    #[serde(default)]
    student_submissions: Vec<Submission>,
    next_page_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyAttachments<'a> {
    add_attachments: [&'a AttachmentRef; 1],
}

pub struct ClassroomClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl ClassroomClient {
    pub fn new(http: Client, base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ServiceError> {
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await
            .map_err(transport)?;
        read_json(resp).await
    }

    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ServiceError> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        error_for_status(resp).await?;
        Ok(())
    }

    async fn submissions_page(
        &self,
        course_id: &str,
        course_work_id: &str,
        page_token: Option<String>,
    ) -> Result<Page<Submission>, ServiceError> {
        let mut query = vec![("userId", "me".to_string())];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        let list: SubmissionList = self
            .get_json(
                &format!("courses/{course_id}/courseWork/{course_work_id}/studentSubmissions"),
                &query,
            )
            .await?;
        Ok(Page::new(list.student_submissions, list.next_page_token))
    }
}

fn page_query(page_token: Option<String>) -> Vec<(&'static str, String)> {
    page_token
        .map(|t| vec![("pageToken", t)])
        .unwrap_or_default()
}

#[async_trait]
impl CourseService for ClassroomClient {
    async fn get_profile(&self) -> Result<UserProfile, ServiceError> {
        tracing::debug!("Fetching user profile");
        self.get_json("userProfiles/me", &[]).await
    }

    async fn list_courses(
        &self,
        page_size: Option<u32>,
        page_token: Option<String>,
    ) -> Result<Page<Course>, ServiceError> {
        let mut query = page_query(page_token);
        if let Some(size) = page_size {
            query.push(("pageSize", size.to_string()));
        }
        let list: CourseList = self.get_json("courses", &query).await?;
        tracing::debug!(count = list.courses.len(), more = list.next_page_token.is_some(), "Fetched course page");
        Ok(Page::new(list.courses, list.next_page_token))
    }

    async fn list_students(
        &self,
        course_id: &str,
        page_token: Option<String>,
    ) -> Result<Page<Student>, ServiceError> {
        let list: StudentList = self
            .get_json(&format!("courses/{course_id}/students"), &page_query(page_token))
            .await?;
        tracing::debug!(course_id, count = list.students.len(), "Fetched student page");
        Ok(Page::new(list.students, list.next_page_token))
    }

    async fn list_course_work(
        &self,
        course_id: &str,
        page_token: Option<String>,
    ) -> Result<Page<CourseWork>, ServiceError> {
        let list: CourseWorkList = self
            .get_json(&format!("courses/{course_id}/courseWork"), &page_query(page_token))
            .await?;
        tracing::debug!(course_id, count = list.course_work.len(), "Fetched coursework page");
        Ok(Page::new(list.course_work, list.next_page_token))
    }

    async fn list_submissions(
        &self,
        course_id: &str,
        course_work_id: &str,
    ) -> Result<Vec<Submission>, ServiceError> {
        tracing::info!(course_id, course_work_id, "Looking up student submissions");
        collect_pages(move |token| self.submissions_page(course_id, course_work_id, token)).await
    }

    async fn modify_attachments(
        &self,
        course_id: &str,
        course_work_id: &str,
        submission_id: &str,
        attachment: &AttachmentRef,
    ) -> Result<(), ServiceError> {
        tracing::info!(course_id, course_work_id, submission_id, ?attachment, "Adding attachment");
        self.post_json(
            &format!(
                "courses/{course_id}/courseWork/{course_work_id}/studentSubmissions/{submission_id}:modifyAttachments"
            ),
            &ModifyAttachments {
                add_attachments: [attachment],
            },
        )
        .await
    }

    async fn turn_in(
        &self,
        course_id: &str,
        course_work_id: &str,
        submission_id: &str,
    ) -> Result<(), ServiceError> {
        tracing::info!(course_id, course_work_id, submission_id, "Turning in submission");
        self.post_json(
            &format!(
                "courses/{course_id}/courseWork/{course_work_id}/studentSubmissions/{submission_id}:turnIn"
            ),
            &serde_json::json!({}),
        )
        .await
    }
}
