//! Classroom web links handed to the user when something has to be finished by hand.

const CLASSROOM_WEB: &str = "https://classroom.google.com";

pub fn course_url(course_id: &str) -> String {
    format!("{CLASSROOM_WEB}/c/{course_id}")
}

pub fn assignment_url(course_id: &str, course_work_id: &str) -> String {
    format!("{CLASSROOM_WEB}/c/{course_id}/a/{course_work_id}")
}
