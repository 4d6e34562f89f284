// Terminal side of the CLI: browser launching, prompts, spinners and tables.
// Everything that writes for a human lives here so the command handlers stay
// a sequence of calls.

use dialoguer::{Confirm, Input, Select};
use gclass_core::config::AppPaths;
use gclass_core::contract::{Course, CourseWork, LinkOpener, Student, TurnInPrompt};
use gclass_core::submission::{FallbackReason, SubmissionReport, SubmissionResult};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::process::{Command, Stdio};
use std::time::Duration;
use tabled::{settings::Style, Table, Tabled};

/// Opens links with the platform's URL handler. When disabled, links are only
/// printed by the callers.
#[derive(Debug, Clone, Copy)]
pub struct Browser {
    pub enabled: bool,
}

impl Browser {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

fn open_command(url: &str) -> Command {
    if cfg!(target_os = "macos") {
        let mut cmd = Command::new("open");
        cmd.arg(url);
        cmd
    } else if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", "", url]);
        cmd
    } else {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(url);
        cmd
    }
}

impl LinkOpener for Browser {
    fn open(&self, url: &str) -> io::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        tracing::debug!(url, "Opening browser");
        open_command(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
    }
}

/// Opening a link is best effort; the URL has always been printed already.
pub fn open_quietly(opener: &dyn LinkOpener, url: &str) {
    if let Err(e) = opener.open(url) {
        tracing::warn!(url, error = %e, "Could not open browser");
    }
}

/// Asks "Turn in now?" unless `assume_yes` is set. A running spinner is
/// suspended while the question is on screen.
pub struct DialoguerPrompt {
    pub assume_yes: bool,
    pub progress: Option<ProgressBar>,
}

impl DialoguerPrompt {
    fn ask(&self, assignment_url: &str) -> io::Result<bool> {
        println!("Attached to: {assignment_url}");
        if self.assume_yes {
            return Ok(true);
        }
        Confirm::new()
            .with_prompt("Turn in now?")
            .default(true)
            .interact()
    }
}

impl TurnInPrompt for DialoguerPrompt {
    fn confirm_turn_in(&self, assignment_url: &str) -> io::Result<bool> {
        match &self.progress {
            Some(pb) => pb.suspend(|| self.ask(assignment_url)),
            None => self.ask(assignment_url),
        }
    }
}

pub fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub fn prompt_course_id() -> io::Result<String> {
    println!("No course set.");
    let id: String = Input::new().with_prompt("Enter Course ID").interact_text()?;
    Ok(id.trim().to_string())
}

/// Returns the index of the chosen course, `None` if the user cancelled.
pub fn pick_course(courses: &[Course]) -> io::Result<Option<usize>> {
    let items: Vec<String> = courses
        .iter()
        .map(|c| format!("{} ({})", c.name, c.id))
        .collect();
    Select::new()
        .with_prompt("Select a default course")
        .items(&items)
        .default(0)
        .interact_opt()
}

fn or_dash(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => "-".to_string(),
    }
}

fn render<T: Tabled>(rows: Vec<T>) -> String {
    Table::new(rows).with(Style::modern()).to_string()
}

pub fn paths_table(paths: &AppPaths) -> String {
    #[derive(Tabled)]
    struct PathRow {
        #[tabled(rename = "Item")]
        item: &'static str,
        #[tabled(rename = "Path")]
        path: String,
    }

    render(vec![
        PathRow {
            item: "Config dir",
            path: paths.config_dir.display().to_string(),
        },
        PathRow {
            item: "credentials.json",
            path: paths.client_secret.display().to_string(),
        },
        PathRow {
            item: "token.json",
            path: paths.token.display().to_string(),
        },
        PathRow {
            item: "settings.json",
            path: paths.settings.display().to_string(),
        },
    ])
}

pub fn courses_table(courses: &[Course]) -> String {
    #[derive(Tabled)]
    struct CourseRow<'a> {
        #[tabled(rename = "#")]
        index: usize,
        #[tabled(rename = "ID")]
        id: &'a str,
        #[tabled(rename = "Name")]
        name: &'a str,
        #[tabled(rename = "Section")]
        section: String,
        #[tabled(rename = "Room")]
        room: String,
    }

    render(
        courses
            .iter()
            .enumerate()
            .map(|(i, c)| CourseRow {
                index: i + 1,
                id: &c.id,
                name: &c.name,
                section: or_dash(c.section.as_deref()),
                room: or_dash(c.room.as_deref()),
            })
            .collect(),
    )
}

pub fn students_table(students: &[Student]) -> String {
    #[derive(Tabled)]
    struct StudentRow<'a> {
        #[tabled(rename = "#")]
        index: usize,
        #[tabled(rename = "Name")]
        name: &'a str,
        #[tabled(rename = "Email")]
        email: &'a str,
    }

    render(
        students
            .iter()
            .enumerate()
            .map(|(i, s)| StudentRow {
                index: i + 1,
                name: s.profile.display_name(),
                email: s.profile.display_email(),
            })
            .collect(),
    )
}

pub fn assignments_table(work: &[CourseWork]) -> String {
    #[derive(Tabled)]
    struct WorkRow<'a> {
        #[tabled(rename = "ID")]
        id: &'a str,
        #[tabled(rename = "Title")]
        title: &'a str,
        #[tabled(rename = "Type")]
        work_type: String,
        #[tabled(rename = "Due")]
        due: String,
    }

    render(
        work.iter()
            .map(|w| WorkRow {
                id: &w.id,
                title: &w.title,
                work_type: or_dash(w.work_type.as_deref()),
                due: w.due_display(),
            })
            .collect(),
    )
}

/// Prints the outcome of `submit` and opens whatever the user has to finish
/// by hand. Returns `false` when the run should exit non-zero.
pub fn render_submission(report: &SubmissionReport, opener: &dyn LinkOpener) -> bool {
    let drive_link = report.uploaded.web_view_link.as_deref();
    match &report.result {
        SubmissionResult::TurnedIn => {
            println!("Turned in: {}", report.uploaded.name);
            true
        }
        SubmissionResult::AttachedPendingManualTurnIn => {
            println!("Attached. Finish here: {}", report.assignment_url);
            open_quietly(opener, &report.assignment_url);
            true
        }
        SubmissionResult::ManualFallbackRequired(reason) => {
            match reason {
                FallbackReason::PolicyDenied => {
                    println!("Classroom write blocked by domain policy (ProjectPermissionDenied).");
                    println!("Attach the uploaded file manually from the assignment page.");
                }
                FallbackReason::NoSubmissionFound => {
                    eprintln!("No submission found for this assignment.");
                }
            }
            println!("Assignment: {}", report.assignment_url);
            println!("Drive file: {}", or_dash(drive_link));
            open_quietly(opener, &report.assignment_url);
            if let Some(link) = drive_link {
                open_quietly(opener, link);
            }
            matches!(reason, FallbackReason::PolicyDenied)
        }
    }
}
