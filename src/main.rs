use anyhow::{Context, Result};
use chrono::Local;

use scholarhub::config::{Config, Role};
use scholarhub::dashboard::{load_for_role, AdminDashboard, Snapshot, StudentDashboard, TeacherDashboard};
use scholarhub::logger;
use scholarhub::SchoolClient;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init_logging();

    let config = Config::from_env().context("Failed to read configuration")?;
    let client = SchoolClient::from_config(&config)?;

    tracing::info!(
        api_url = client.base_url(),
        role = %config.role,
        "Loading dashboard"
    );

    let snapshot = load_for_role(&client, &config).await;
    report_errors(&snapshot);

    let now = Local::now().naive_local();
    let report = match config.role {
        Role::Admin => {
            let dashboard = AdminDashboard::build(&snapshot.collections);
            tracing::info!(
                students = dashboard.student_count,
                teachers = dashboard.teacher_count,
                subjects = dashboard.subject_count,
                graded = dashboard.graded_count,
                "Admin dashboard ready"
            );
            dashboard.to_string()
        }
        Role::Teacher => {
            let dashboard = TeacherDashboard::build(&snapshot.collections, config.teacher_id);
            tracing::info!(
                teacher_id = config.teacher_id,
                programs = dashboard.programs.len(),
                pending = dashboard.pending_work_returns.len(),
                "Teacher dashboard ready"
            );
            dashboard.to_string()
        }
        Role::Student => {
            let dashboard = StudentDashboard::build(&snapshot.collections, config.student_id, now, &config);
            tracing::info!(
                student_id = config.student_id,
                assignments = dashboard.assignment_count,
                due_this_week = dashboard.due_this_week,
                average = %dashboard.average_score,
                "Student dashboard ready"
            );
            dashboard.to_string()
        }
    };

    println!("{report}");
    Ok(())
}

fn report_errors(snapshot: &Snapshot) {
    if snapshot.is_complete() {
        return;
    }
    tracing::warn!(
        failed = snapshot.errors.len(),
        "Some collections could not be loaded and are shown empty"
    );
    for message in snapshot.error_messages() {
        tracing::warn!(error = %message, "Collection unavailable");
    }
}
