//! Per-role dashboard snapshots: fan out one request per collection, wait
//! for all of them, then normalize, join and derive in one pass.
//!
//! A failed collection is logged, recorded in [`Snapshot::errors`] and shown
//! as empty. Mutations are followed by a full re-fetch; nothing is cached.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::future::Future;

use chrono::NaiveDateTime;
use futures::future::join_all;
use serde_json::Value;

use crate::client::{FetchError, SchoolClient};
use crate::config::{Config, Role};
use crate::join::{
    join_assignments, join_grades, join_programs, join_students, join_work_returns, AssignmentView,
    Collections, GradeView, ProgramView, StudentView, WorkReturnView,
};
use crate::metrics::{
    average_score, due_within, filter_grades, mean_gpa, overall_gpa, recent_by_due_date,
    recent_grades, scores, status_counts, student_gpas, subject_performance, AverageScore,
    GradeFilter, LetterGrade, StudentGpa, SubjectPerformance, GRADES_VIEW_PASS_THRESHOLD,
};
use crate::models::{AssignmentStatus, Entity, Group, Level, Resource, Student, Teacher, NOT_AVAILABLE};
use crate::normalize::{normalize_collection, Normalize};

const RECENT_ASSIGNMENTS: usize = 3;
const RECENT_GRADES: usize = 4;
const ADMIN_PREVIEW_ROWS: usize = 3;

/// One collection read, optionally filtered by query parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRequest {
    pub resource: Resource,
    pub query: Vec<(&'static str, String)>,
}

impl CollectionRequest {
    pub fn all(resource: Resource) -> Self {
        Self {
            resource,
            query: Vec::new(),
        }
    }

    pub fn filtered(resource: Resource, key: &'static str, value: i64) -> Self {
        Self {
            resource,
            query: vec![(key, value.to_string())],
        }
    }
}

#[derive(Debug, Default)]
pub struct Snapshot {
    pub collections: Collections,
    pub errors: Vec<FetchError>,
}

impl Snapshot {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// One line per failed collection, for display.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

/// Stores a raw collection payload into its slot, normalized.
pub fn store_collection(collections: &mut Collections, resource: Resource, raw: &Value) -> usize {
    match resource {
        Resource::Students => store(&mut collections.students, raw),
        Resource::Teachers => store(&mut collections.teachers, raw),
        Resource::Groups => store(&mut collections.groups, raw),
        Resource::Levels => store(&mut collections.levels, raw),
        Resource::Subjects => store(&mut collections.subjects, raw),
        Resource::Programs => store(&mut collections.programs, raw),
        Resource::Assignments => store(&mut collections.assignments, raw),
        Resource::Grades => store(&mut collections.grades, raw),
        Resource::WorkReturns => store(&mut collections.work_returns, raw),
    }
}

fn store<T: Normalize>(slot: &mut Vec<T>, raw: &Value) -> usize {
    *slot = normalize_collection(raw);
    slot.len()
}

/// Issues every request concurrently and settles them all before
/// normalizing. A failed request leaves its collection empty.
pub async fn load_collections(client: &SchoolClient, requests: &[CollectionRequest]) -> Snapshot {
    let fetches = requests.iter().map(|request| async move {
        let result = client.list(request.resource, &request.query).await;
        (request.resource, result)
    });
    let results = join_all(fetches).await;

    let mut snapshot = Snapshot::default();
    for (resource, result) in results {
        match result {
            Ok(raw) => {
                let count = store_collection(&mut snapshot.collections, resource, &raw);
                tracing::info!(resource = %resource, count, "Loaded collection");
            }
            Err(err) => {
                tracing::warn!(resource = %resource, error = %err, "Fetch failed, collection left empty");
                snapshot.errors.push(err);
            }
        }
    }
    snapshot
}

/// Re-reads every collection in `requests`; nothing is patched locally.
pub async fn refresh(client: &SchoolClient, requests: &[CollectionRequest]) -> Snapshot {
    tracing::info!(collections = requests.len(), "Refreshing after mutation");
    load_collections(client, requests).await
}

/// Runs a mutation and, only if it succeeds, refreshes `requests`.
pub async fn mutate_and_refresh<T, F>(
    client: &SchoolClient,
    mutation: F,
    requests: &[CollectionRequest],
) -> Result<(T, Snapshot), FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    let outcome = mutation.await?;
    let snapshot = refresh(client, requests).await;
    Ok((outcome, snapshot))
}

pub fn admin_requests() -> Vec<CollectionRequest> {
    [
        Resource::Students,
        Resource::Teachers,
        Resource::Subjects,
        Resource::Grades,
        Resource::Groups,
        Resource::Levels,
    ]
    .into_iter()
    .map(CollectionRequest::all)
    .collect()
}

pub fn teacher_requests() -> Vec<CollectionRequest> {
    [
        Resource::Students,
        Resource::Teachers,
        Resource::Subjects,
        Resource::Groups,
        Resource::Programs,
        Resource::Assignments,
        Resource::Grades,
        Resource::WorkReturns,
    ]
    .into_iter()
    .map(CollectionRequest::all)
    .collect()
}

/// Requests behind the student dashboard; group-scoped lists are filtered
/// only once the student's group is known.
pub fn student_requests(student_id: i64, group_id: Option<i64>) -> Vec<CollectionRequest> {
    let scoped = |resource: Resource| match group_id {
        Some(group_id) => CollectionRequest::filtered(resource, "groupId", group_id),
        None => CollectionRequest::all(resource),
    };
    vec![
        scoped(Resource::Assignments),
        scoped(Resource::Programs),
        CollectionRequest::filtered(Resource::Grades, "studentId", student_id),
        CollectionRequest::all(Resource::Subjects),
        CollectionRequest::all(Resource::Groups),
        CollectionRequest::all(Resource::Levels),
    ]
}

/// Loads the snapshot a role's dashboard needs.
pub async fn load_for_role(client: &SchoolClient, config: &Config) -> Snapshot {
    match config.role {
        Role::Admin => load_collections(client, &admin_requests()).await,
        Role::Teacher => load_collections(client, &teacher_requests()).await,
        Role::Student => load_student_snapshot(client, config.student_id).await,
    }
}

/// Reads the student first (its group scopes the other requests), then fans
/// out the rest.
pub async fn load_student_snapshot(client: &SchoolClient, student_id: i64) -> Snapshot {
    let (student, student_error) = match client.get_normalized::<Student>(student_id).await {
        Ok(student) => (Some(student), None),
        Err(err) => {
            tracing::warn!(student_id, error = %err, "Failed to load student");
            (None, Some(err))
        }
    };
    let group_id = student.as_ref().map(|student| student.group.id).filter(|id| *id != 0);
    if group_id.is_none() {
        tracing::warn!(student_id, "Student group unknown, group-scoped lists are unfiltered");
    }

    let mut snapshot = load_collections(client, &student_requests(student_id, group_id)).await;
    snapshot.collections.students = student.into_iter().collect();
    snapshot.errors.extend(student_error);
    snapshot
}

fn student_view_or_placeholder(collections: &Collections, student_id: i64) -> StudentView {
    join_students(collections)
        .into_iter()
        .find(|view| view.student.id == student_id)
        .unwrap_or_else(|| StudentView {
            student: Student::placeholder(),
            group: Group::placeholder(),
            level: Level::placeholder(),
        })
}

fn known(ids: impl Iterator<Item = i64>) -> impl Iterator<Item = i64> {
    ids.filter(|id| *id != 0)
}

fn known_pair(group_id: i64, subject_id: i64) -> Option<(i64, i64)> {
    (group_id != 0 && subject_id != 0).then_some((group_id, subject_id))
}

fn gpa_label(gpa: Option<f64>) -> String {
    gpa.map_or_else(|| NOT_AVAILABLE.to_string(), |gpa| format!("{gpa:.1}"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentDashboard {
    pub student: StudentView,
    pub class_label: String,
    pub class_count: usize,
    pub assignment_count: usize,
    pub due_this_week: usize,
    pub upcoming: Vec<AssignmentView>,
    pub recent_assignments: Vec<AssignmentView>,
    pub recent_grades: Vec<GradeView>,
    pub average_score: AverageScore,
    pub gpa: Option<f64>,
    pub passed: usize,
    pub failed: usize,
    pub status_counts: BTreeMap<AssignmentStatus, usize>,
}

impl StudentDashboard {
    pub fn build(collections: &Collections, student_id: i64, now: NaiveDateTime, config: &Config) -> Self {
        let student = student_view_or_placeholder(collections, student_id);
        let assignments = join_assignments(collections);
        let grades: Vec<GradeView> = join_grades(collections)
            .into_iter()
            .filter(|view| view.grade.student.id == 0 || view.grade.student.id == student_id)
            .collect();
        let average = average_score(&grades);

        Self {
            class_label: format!("{} - {}", student.level.name, student.group.name),
            class_count: collections.programs.len(),
            assignment_count: assignments.len(),
            due_this_week: due_within(&assignments, now, config.due_window_days).len(),
            upcoming: due_within(&assignments, now, config.upcoming_window_days)
                .into_iter()
                .cloned()
                .collect(),
            recent_assignments: recent_by_due_date(&assignments, RECENT_ASSIGNMENTS)
                .into_iter()
                .cloned()
                .collect(),
            recent_grades: recent_grades(&grades, RECENT_GRADES).into_iter().cloned().collect(),
            average_score: average,
            gpa: average.gpa(),
            passed: filter_grades(&grades, GradeFilter::Passed, GRADES_VIEW_PASS_THRESHOLD).len(),
            failed: filter_grades(&grades, GradeFilter::Failed, GRADES_VIEW_PASS_THRESHOLD).len(),
            status_counts: status_counts(assignments.iter().map(|view| &view.assignment)),
            student,
        }
    }
}

impl fmt::Display for StudentDashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Student: {} ({})", self.student.name(), self.class_label)?;
        writeln!(
            f,
            "Assignments: {} ({} due this week)",
            self.assignment_count, self.due_this_week
        )?;
        writeln!(f, "Classes: {}", self.class_count)?;
        writeln!(
            f,
            "Average score: {} | GPA: {} | passed {} / failed {}",
            self.average_score,
            gpa_label(self.gpa),
            self.passed,
            self.failed
        )?;
        writeln!(f, "Upcoming:")?;
        if self.upcoming.is_empty() {
            writeln!(f, "  nothing due")?;
        }
        for view in &self.upcoming {
            let due = view
                .assignment
                .due_date
                .map_or_else(|| NOT_AVAILABLE.to_string(), |date| date.format("%Y-%m-%d").to_string());
            writeln!(
                f,
                "  {} | {} | due {} | {}",
                view.subject.name,
                view.assignment.title,
                due,
                view.assignment.status.label()
            )?;
        }
        writeln!(f, "Recent grades:")?;
        for view in &self.recent_grades {
            let score = view
                .grade
                .score
                .map_or_else(|| NOT_AVAILABLE.to_string(), |score| format!("{score:.0}"));
            writeln!(f, "  {} | {} | {}", view.subject.name, view.assignment.title, score)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeacherDashboard {
    pub teacher: Teacher,
    pub programs: Vec<ProgramView>,
    pub assignment_count: usize,
    pub student_count: usize,
    pub subject_count: usize,
    pub mean_gpa: Option<f64>,
    pub average_letter_grade: Option<LetterGrade>,
    pub subject_performance: Vec<SubjectPerformance>,
    pub pending_work_returns: Vec<WorkReturnView>,
}

impl TeacherDashboard {
    /// Scopes everything to the teacher's programs: their groups, and the
    /// (group, subject) pairs they teach.
    ///
    /// Scope is keyed on foreign keys as received, never on resolved records,
    /// and never includes id 0, the id every placeholder shares.
    pub fn build(collections: &Collections, teacher_id: i64) -> Self {
        let teacher = collections
            .teachers
            .iter()
            .find(|teacher| teacher.id == teacher_id)
            .cloned()
            .unwrap_or_else(Teacher::placeholder);
        let programs: Vec<ProgramView> = join_programs(collections)
            .into_iter()
            .filter(|view| teacher_id != 0 && view.program.teacher.id == teacher_id)
            .collect();

        let program_ids: HashSet<i64> = known(programs.iter().map(|view| view.program.id)).collect();
        let group_ids: HashSet<i64> = known(programs.iter().map(|view| view.program.group.id)).collect();
        let subject_ids: HashSet<i64> = known(programs.iter().map(|view| view.program.subject.id)).collect();
        let taught: HashSet<(i64, i64)> = programs
            .iter()
            .filter_map(|view| known_pair(view.program.group.id, view.program.subject.id))
            .collect();
        let teaches = |group_id: i64, subject_id: i64| {
            known_pair(group_id, subject_id).is_some_and(|pair| taught.contains(&pair))
        };

        let assignment_ids: HashSet<i64> = collections
            .assignments
            .iter()
            .filter(|assignment| {
                program_ids.contains(&assignment.program.id)
                    || teaches(assignment.group.id, assignment.subject.id)
            })
            .map(|assignment| assignment.id)
            .filter(|id| *id != 0)
            .collect();
        let student_count = collections
            .students
            .iter()
            .filter(|student| group_ids.contains(&student.group.id))
            .count();

        let grades: Vec<GradeView> = join_grades(collections)
            .into_iter()
            .filter(|view| {
                let subject_id = if view.grade.subject.id != 0 {
                    view.grade.subject.id
                } else {
                    view.assignment.subject.id
                };
                assignment_ids.contains(&view.grade.assignment.id)
                    || teaches(view.student.group.id, subject_id)
            })
            .collect();
        let pending_work_returns = join_work_returns(collections)
            .into_iter()
            .filter(|view| {
                view.work_return.grade.is_none() && assignment_ids.contains(&view.work_return.assignment.id)
            })
            .collect();

        let mean = mean_gpa(&grades);
        Self {
            teacher,
            assignment_count: assignment_ids.len(),
            student_count,
            subject_count: subject_ids.len(),
            mean_gpa: mean,
            average_letter_grade: mean.and_then(|_| average_score(&grades).letter_grade()),
            subject_performance: subject_performance(&grades),
            pending_work_returns,
            programs,
        }
    }
}

impl fmt::Display for TeacherDashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Teacher: {}", self.teacher.full_name())?;
        writeln!(
            f,
            "Students: {} | Subjects: {} | Assignments: {}",
            self.student_count, self.subject_count, self.assignment_count
        )?;
        writeln!(
            f,
            "Average grade: {} ({} GPA average)",
            self.average_letter_grade.map_or(NOT_AVAILABLE, LetterGrade::as_str),
            gpa_label(self.mean_gpa)
        )?;
        writeln!(f, "Classes:")?;
        for view in &self.programs {
            writeln!(f, "  {} | {} students", view.label(), view.student_count)?;
        }
        writeln!(f, "Work returns to grade: {}", self.pending_work_returns.len())?;
        for view in &self.pending_work_returns {
            writeln!(
                f,
                "  {} | {} | {}",
                view.student.full_name(),
                view.assignment.title,
                view.work_return.file_name()
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdminDashboard {
    pub student_count: usize,
    pub teacher_count: usize,
    pub subject_count: usize,
    pub group_count: usize,
    pub level_count: usize,
    pub graded_count: usize,
    pub overall_gpa: Option<f64>,
    pub subject_performance: Vec<SubjectPerformance>,
    pub students: Vec<StudentGpa>,
    pub teachers: Vec<String>,
}

impl AdminDashboard {
    pub fn build(collections: &Collections) -> Self {
        let grades = join_grades(collections);
        let students = join_students(collections);
        let mut student_rows = student_gpas(&students, &grades);
        student_rows.truncate(ADMIN_PREVIEW_ROWS);

        Self {
            student_count: collections.students.len(),
            teacher_count: collections.teachers.len(),
            subject_count: collections.subjects.len(),
            group_count: collections.groups.len(),
            level_count: collections.levels.len(),
            graded_count: scores(&grades).len(),
            overall_gpa: overall_gpa(&grades),
            subject_performance: subject_performance(&grades),
            students: student_rows,
            teachers: collections
                .teachers
                .iter()
                .take(ADMIN_PREVIEW_ROWS)
                .map(Teacher::full_name)
                .collect(),
        }
    }
}

impl fmt::Display for AdminDashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Students: {} | Teachers: {} | Subjects: {} | Groups: {} | Levels: {}",
            self.student_count, self.teacher_count, self.subject_count, self.group_count, self.level_count
        )?;
        writeln!(f, "Average GPA: {}", gpa_label(self.overall_gpa))?;
        writeln!(f, "Subject performance:")?;
        for row in &self.subject_performance {
            writeln!(
                f,
                "  {} | avg {} | passing {}",
                row.subject,
                row.average_grade_label(),
                row.pass_rate
            )?;
        }
        writeln!(f, "Students:")?;
        for row in &self.students {
            writeln!(f, "  {} | {} - {} | GPA {}", row.name, row.level, row.group, row.gpa_label())?;
        }
        writeln!(f, "Teachers: {}", self.teachers.join(", "))
    }
}
