//! Page-token pagination over the Classroom listing calls.

use std::future::Future;
use tracing::debug;

use crate::contract::{Course, CourseService, CourseWork, Page, ServiceError, Student};

/// Calls `fetch` with the previous page's token until a page comes back
/// without one (an empty token counts as none), concatenating items in page
/// order.
pub async fn collect_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>, ServiceError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, ServiceError>>,
{
    let mut items = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0usize;
    loop {
        let page = fetch(token.take()).await?;
        pages += 1;
        items.extend(page.items);
        match page.next_page_token {
            Some(next) if !next.is_empty() => token = Some(next),
            _ => break,
        }
    }
    debug!(pages, items = items.len(), "Collected all pages");
    Ok(items)
}

pub async fn all_courses<C>(svc: &C, page_size: Option<u32>) -> Result<Vec<Course>, ServiceError>
where
    C: CourseService + ?Sized,
{
    collect_pages(move |token| svc.list_courses(page_size, token)).await
}

pub async fn all_students<C>(svc: &C, course_id: &str) -> Result<Vec<Student>, ServiceError>
where
    C: CourseService + ?Sized,
{
    collect_pages(move |token| svc.list_students(course_id, token)).await
}

pub async fn all_course_work<C>(svc: &C, course_id: &str) -> Result<Vec<CourseWork>, ServiceError>
where
    C: CourseService + ?Sized,
{
    collect_pages(move |token| svc.list_course_work(course_id, token)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_pages_of_items_is_empty() {
        let items: Vec<u32> = collect_pages(|_| async { Ok(Page::last(vec![])) })
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn empty_token_terminates() {
        let mut calls = 0;
        let items = collect_pages(|_| {
            calls += 1;
            async { Ok(Page::new(vec![1], Some(String::new()))) }
        })
        .await
        .unwrap();
        assert_eq!(items, vec![1]);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn error_on_later_page_is_returned() {
        let result: Result<Vec<u32>, _> = collect_pages(|token| async move {
            match token {
                None => Ok(Page::new(vec![1], Some("p2".into()))),
                Some(_) => Err(ServiceError::Transport("boom".into())),
            }
        })
        .await;
        assert!(matches!(result, Err(ServiceError::Transport(_))));
    }
}
