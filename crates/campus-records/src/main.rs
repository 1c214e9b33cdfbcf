//! Campus Records CLI - query and update the records backend from a terminal

use std::path::PathBuf;
use std::sync::Arc;

use campus_records::stats::{grade_statistics, project_statistics};
use campus_records::{
    to_datetime, CampusClient, Config, HttpBackend, RemoteFacade, Result, SessionGate, SyncError,
};
use clap::{Parser, Subcommand};
use external_blob::{ExternalBlob, HttpBlobTransport, ProgressChannel, UploadOptions};
use query_cache::QueryCache;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "campus-records")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List all students
    Students,
    /// List all courses
    Courses,
    /// Show a student's grades with summary statistics
    Grades {
        #[arg(long)]
        student: String,
        /// Limit to one course
        #[arg(long)]
        course: Option<String>,
    },
    /// Show a student's projects
    Projects {
        #[arg(long)]
        student: String,
    },
    /// Upload a PDF and register it as a new project
    UploadProject {
        #[arg(long)]
        student: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();

    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive("campus_records=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if config.log_format_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    let cli = Cli::parse();
    info!(backend = %config.backend_url, "Starting campus-records");

    let client = build_client(&config)?;
    let identity = config.identity().ok_or_else(|| {
        SyncError::Config("IDENTITY_TOKEN must be set to talk to the backend".to_string())
    })?;
    client.complete_login(identity);

    match cli.command {
        Command::Students => {
            for student in client.students().await?.iter() {
                println!("{}\t{}\t{}\t{}", student.id, student.name, student.program, student.year);
            }
        }
        Command::Courses => {
            for course in client.courses().await?.iter() {
                println!("{}\t{}\t{} credits", course.code, course.name, course.credits);
            }
        }
        Command::Grades { student, course } => {
            let grades = match course {
                Some(course) => client.student_grades(&student, &course).await?.to_vec(),
                None => client
                    .all_student_grades(&student)
                    .await?
                    .iter()
                    .flat_map(|(_, grades)| grades.iter().cloned())
                    .collect(),
            };
            for grade in &grades {
                println!(
                    "{}\t{}\t{}\t{}",
                    grade.course_code,
                    grade.assignment,
                    grade.score,
                    to_datetime(grade.date).format("%Y-%m-%d")
                );
            }
            let stats = grade_statistics(&grades);
            println!(
                "{} assignments, average {}, highest {}, lowest {}",
                stats.total_assignments, stats.average_score, stats.highest_score, stats.lowest_score
            );
        }
        Command::Projects { student } => {
            let projects = client.projects(&student).await?;
            for project in projects.iter() {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    project.id,
                    project.title,
                    project.status.as_str(),
                    project.grade,
                    project.pdf.url
                );
            }
            let stats = project_statistics(&projects);
            let average = stats
                .average_grade
                .map(|a| format!("{:.1}", a))
                .unwrap_or_else(|| "N/A".to_string());
            println!(
                "{} projects, {} submitted, {} graded, average grade {}",
                stats.total, stats.submitted, stats.graded, average
            );
        }
        Command::UploadProject {
            student,
            title,
            description,
            file,
        } => {
            let bytes = tokio::fs::read(&file)
                .await
                .map_err(|e| SyncError::Config(format!("cannot read {}: {}", file.display(), e)))?;

            let (progress, mut rx) = ProgressChannel::new();
            let printer = tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let pct = *rx.borrow_and_update();
                    eprintln!("upload {}%", pct);
                }
            });

            let pdf = ExternalBlob::from_bytes(bytes).with_upload_progress(progress);
            let id = client.add_project(&student, &title, &description, pdf).await?;
            let _ = printer.await;

            println!("{}", id);
        }
    }

    Ok(())
}

fn build_client(config: &Config) -> Result<CampusClient> {
    let backend = HttpBackend::new(&config.backend_url, config.request_timeout)
        .map_err(|e| SyncError::Config(e.to_string()))?;

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| SyncError::Config(e.to_string()))?;
    let mut blobs =
        HttpBlobTransport::with_client(http, &config.backend_url, config.blob_cache_capacity)
            .map_err(|e| SyncError::Config(e.to_string()))?;
    if let Some(token) = &config.identity_token {
        blobs = blobs.with_token(token.clone());
    }

    let facade = RemoteFacade::new(Arc::new(backend), SessionGate::new(), Arc::new(blobs))
        .with_upload_options(UploadOptions::with_chunk_size(config.upload_chunk_size));

    Ok(CampusClient::new(facade, QueryCache::new()).with_stale_time(config.stale_time))
}
