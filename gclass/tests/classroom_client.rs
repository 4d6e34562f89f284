use gclass::classroom::ClassroomClient;
use gclass::http::build_http_client;
use gclass_core::contract::{AttachmentRef, CourseService};
use mockito::Matcher;
use serde_json::json;
use std::time::Duration;

fn client(server: &mockito::Server) -> ClassroomClient {
    let http = build_http_client(Duration::from_secs(5)).expect("http client");
    ClassroomClient::new(http, server.url(), "access-123")
}

#[tokio::test]
async fn course_page_sends_size_token_and_bearer() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", Matcher::Regex(r"^/courses(\?.*)?$".into()))
        .match_header("authorization", "Bearer access-123")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("pageSize".into(), "50".into()),
            Matcher::UrlEncoded("pageToken".into(), "p2".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"courses":[{"id":"1","name":"Biology","section":"A"}],"nextPageToken":"p3"}"#)
        .create_async()
        .await;

    let page = client(&server)
        .list_courses(Some(50), Some("p2".into()))
        .await
        .expect("course page");

    mock.assert_async().await;
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].name, "Biology");
    assert_eq!(page.items[0].section.as_deref(), Some("A"));
    assert_eq!(page.next_page_token.as_deref(), Some("p3"));
}

#[tokio::test]
async fn empty_listing_has_no_items_and_no_token() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", Matcher::Regex(r"^/courses/c1/courseWork(\?.*)?$".into()))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let page = client(&server)
        .list_course_work("c1", None)
        .await
        .expect("empty page");
    assert!(page.items.is_empty());
    assert!(page.next_page_token.is_none());
}

#[tokio::test]
async fn own_submissions_are_collected_across_pages() {
    let mut server = mockito::Server::new_async().await;
    let path = r"^/courses/c1/courseWork/w1/studentSubmissions(\?.*)?$";
    let first = server
        .mock("GET", Matcher::Regex(path.into()))
        .match_query(Matcher::Exact("userId=me".into()))
        .with_status(200)
        .with_body(r#"{"studentSubmissions":[{"id":"s1","courseId":"c1","courseWorkId":"w1"}],"nextPageToken":"t2"}"#)
        .create_async()
        .await;
    let second = server
        .mock("GET", Matcher::Regex(path.into()))
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("userId".into(), "me".into()),
            Matcher::UrlEncoded("pageToken".into(), "t2".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"studentSubmissions":[{"id":"s2","courseId":"c1","courseWorkId":"w1"}]}"#)
        .create_async()
        .await;

    let subs = client(&server)
        .list_submissions("c1", "w1")
        .await
        .expect("submissions");

    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(
        subs.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
        vec!["s1", "s2"]
    );
}

#[tokio::test]
async fn attach_posts_drive_file_and_surfaces_policy_denial() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock(
            "POST",
            "/courses/c1/courseWork/w1/studentSubmissions/s1:modifyAttachments",
        )
        .match_body(Matcher::Json(json!({
            "addAttachments": [{ "driveFile": { "id": "f1" } }]
        })))
        .with_status(403)
        .with_body(
            r#"{"error":{"code":403,"message":"@ProjectPermissionDenied The Developer Console project is not permitted to make this request.","status":"PERMISSION_DENIED"}}"#,
        )
        .create_async()
        .await;

    let err = client(&server)
        .modify_attachments("c1", "w1", "s1", &AttachmentRef::drive_file("f1"))
        .await
        .unwrap_err();

    mock.assert_async().await;
    assert!(err.is_policy_denied());
    assert_eq!(err.status(), Some(403));
}

#[tokio::test]
async fn turn_in_posts_empty_body() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/courses/c1/courseWork/w1/studentSubmissions/s1:turnIn")
        .match_header("authorization", "Bearer access-123")
        .match_body(Matcher::Json(json!({})))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    client(&server)
        .turn_in("c1", "w1", "s1")
        .await
        .expect("turned in");
    mock.assert_async().await;
}

#[tokio::test]
async fn unparseable_body_is_a_decode_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/userProfiles/me")
        .with_status(200)
        .with_body("<html>not json</html>")
        .create_async()
        .await;

    let err = client(&server).get_profile().await.unwrap_err();
    assert!(matches!(err, gclass_core::contract::ServiceError::Decode(_)));
    assert!(!err.is_policy_denied());
}
