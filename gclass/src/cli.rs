/// # gclass CLI interface
///
/// Command parsing and the thin handlers behind each subcommand. The handlers
/// wire the concrete Google clients from this crate into the workflows of
/// [`gclass-core`]; anything with rules in it (credential lifecycle,
/// submission fallback, pagination) lives there.
///
/// For programmatic use and integration tests, call [`run`] with a parsed [`Cli`].
///
/// [`gclass-core`]: ../../gclass_core/
use crate::console::{self, Browser, DialoguerPrompt};
use crate::load_config::load_config;
use crate::session::Session;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gclass_core::links::{assignment_url, course_url};
use gclass_core::listing::{all_course_work, all_courses, all_students};
use gclass_core::submission::{upload_local_file, SubmissionWorkflow, SubmitRequest};
use gclass_core::contract::CourseService;
use std::path::PathBuf;

/// Google Classroom from the terminal: list courses, upload and submit work.
#[derive(Parser)]
#[clap(name = "gclass", version, about = "Google Classroom from the command line")]
pub struct Cli {
    /// Print links instead of opening them in a browser
    #[clap(long, global = true)]
    pub no_browser: bool,

    /// Log debug output to stderr
    #[clap(long, short, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show where credentials, token and settings are stored
    Paths,
    /// Sign in (or refresh the stored sign-in)
    Auth,
    /// Show the signed-in user
    Whoami,
    /// List your courses
    ListCourses {
        #[clap(long, default_value_t = 50)]
        page_size: u32,
        /// Choose one of the listed courses as the default
        #[clap(long)]
        pick: bool,
    },
    /// List the students of a course
    ListStudents {
        #[clap(long)]
        course: Option<String>,
    },
    /// List the coursework of a course
    ListAssignments {
        #[clap(long)]
        course: Option<String>,
    },
    /// Store the default course
    SetDefault {
        #[clap(long)]
        course: Option<String>,
    },
    /// Upload a file to Drive
    Upload {
        #[clap(long)]
        file: PathBuf,
    },
    /// Open a course or assignment in the browser
    Open {
        #[clap(long)]
        course: Option<String>,
        #[clap(long)]
        assignment: Option<String>,
    },
    /// Upload a file, attach it to your submission and turn it in
    Submit {
        #[clap(long)]
        course: Option<String>,
        #[clap(long)]
        assignment: String,
        #[clap(long)]
        file: PathBuf,
        /// Turn in without asking
        #[clap(long, short)]
        yes: bool,
    },
}

/// Async entrypoint shared by `main` and the integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config()?;
    let session = Session::new(config, Browser::new(!cli.no_browser))?;

    match cli.command {
        Commands::Paths => {
            println!("{}", console::paths_table(&session.config.paths));
            Ok(())
        }
        Commands::Auth => {
            let pb = console::spinner("Signing in...");
            let credential = session.sign_in().await;
            pb.finish_and_clear();
            let credential = credential?;
            let profile = session
                .classroom(&credential)
                .get_profile()
                .await
                .context("Signed in, but the profile could not be fetched")?;
            println!(
                "Signed in as {} <{}>",
                profile.display_name(),
                profile.display_email()
            );
            Ok(())
        }
        Commands::Whoami => {
            let credential = session.sign_in().await?;
            let profile = session.classroom(&credential).get_profile().await?;
            println!("{} <{}>", profile.display_name(), profile.display_email());
            Ok(())
        }
        Commands::ListCourses { page_size, pick } => {
            let credential = session.sign_in().await?;
            let courses = all_courses(&session.classroom(&credential), Some(page_size)).await?;
            tracing::info!(command = "list-courses", count = courses.len(), "Courses listed");
            if courses.is_empty() {
                println!("No courses found.");
                return Ok(());
            }
            println!("{}", console::courses_table(&courses));
            if pick {
                if let Some(index) = console::pick_course(&courses)? {
                    let chosen = &courses[index];
                    session.settings().set_default_course(&chosen.id)?;
                    println!("Default course set to {} ({})", chosen.name, chosen.id);
                }
            }
            Ok(())
        }
        Commands::ListStudents { course } => {
            let course_id = session.resolve_course(course.as_deref())?;
            let credential = session.sign_in().await?;
            let students = all_students(&session.classroom(&credential), &course_id).await?;
            if students.is_empty() {
                println!("No students found.");
            } else {
                println!("{}", console::students_table(&students));
            }
            Ok(())
        }
        Commands::ListAssignments { course } => {
            let course_id = session.resolve_course(course.as_deref())?;
            let credential = session.sign_in().await?;
            let work = all_course_work(&session.classroom(&credential), &course_id).await?;
            if work.is_empty() {
                println!("No assignments found.");
            } else {
                println!("{}", console::assignments_table(&work));
            }
            Ok(())
        }
        Commands::SetDefault { course } => {
            let course_id = session.resolve_course(course.as_deref())?;
            session.settings().set_default_course(&course_id)?;
            println!("Default course set to {course_id}");
            Ok(())
        }
        Commands::Upload { file } => {
            let credential = session.sign_in().await?;
            let pb = console::spinner("Uploading...");
            let uploaded = upload_local_file(&session.drive(&credential), &file).await;
            pb.finish_and_clear();
            let uploaded = uploaded?;
            println!("Uploaded: {}", uploaded.name);
            println!("Link: {}", uploaded.web_view_link.as_deref().unwrap_or("-"));
            Ok(())
        }
        Commands::Open { course, assignment } => {
            let course_id = session.resolve_course(course.as_deref())?;
            let url = match assignment.as_deref() {
                Some(work_id) => assignment_url(&course_id, work_id),
                None => course_url(&course_id),
            };
            println!("{url}");
            console::open_quietly(&session.browser, &url);
            Ok(())
        }
        Commands::Submit {
            course,
            assignment,
            file,
            yes,
        } => {
            let course_id = session.resolve_course(course.as_deref())?;
            let credential = session.sign_in().await?;
            let classroom = session.classroom(&credential);
            let drive = session.drive(&credential);
            let pb = console::spinner("Uploading and attaching...");
            let prompt = DialoguerPrompt {
                assume_yes: yes,
                progress: Some(pb.clone()),
            };
            tracing::info!(command = "submit", course_id = %course_id, course_work_id = %assignment, file = %file.display(), "Starting submission");

            let report = SubmissionWorkflow::new(&classroom, &drive, &prompt)
                .submit(SubmitRequest {
                    course_id: &course_id,
                    course_work_id: &assignment,
                    file_path: &file,
                })
                .await;
            pb.finish_and_clear();
            let report = report?;
            tracing::info!(command = "submit", ?report, "Submission finished");

            if !console::render_submission(&report, &session.browser) {
                bail!(
                    "no submission found for assignment {} in course {}",
                    report.course_work_id,
                    report.course_id
                );
            }
            Ok(())
        }
    }
}
