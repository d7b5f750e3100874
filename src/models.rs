use std::fmt;

use chrono::NaiveDateTime;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

pub const UNKNOWN: &str = "Unknown";
pub const NOT_AVAILABLE: &str = "N/A";
pub const UNKNOWN_LEVEL: &str = "Unknown Level";
pub const UNKNOWN_GROUP: &str = "Unknown Group";
pub const UNKNOWN_SUBJECT: &str = "Unknown Subject";
pub const UNKNOWN_TEACHER: &str = "Unknown Teacher";
pub const UNKNOWN_STUDENT: &str = "Unknown Student";
pub const UNKNOWN_ASSIGNMENT: &str = "Unknown Assignment";
pub const UNTITLED: &str = "Untitled";
const TEACHER_LASTNAME: &str = "Teacher";
const STUDENT_LASTNAME: &str = "Student";

/// REST collections exposed by the backend under `/api`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Students,
    Teachers,
    Groups,
    Levels,
    Subjects,
    Programs,
    Assignments,
    Grades,
    WorkReturns,
}

impl Resource {
    pub const ALL: [Resource; 9] = [
        Resource::Students,
        Resource::Teachers,
        Resource::Groups,
        Resource::Levels,
        Resource::Subjects,
        Resource::Programs,
        Resource::Assignments,
        Resource::Grades,
        Resource::WorkReturns,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Resource::Students => "students",
            Resource::Teachers => "teachers",
            Resource::Groups => "groups",
            Resource::Levels => "levels",
            Resource::Subjects => "subjects",
            Resource::Programs => "programs",
            Resource::Assignments => "assignments",
            Resource::Grades => "grades",
            Resource::WorkReturns => "workreturns",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// A foreign key as it arrived in the payload: the flat id, plus the nested
/// object when the backend embedded one.
///
/// When `embedded` is present its id always equals `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Link<T> {
    pub id: i64,
    pub embedded: Option<T>,
}

impl<T> Link<T> {
    pub fn to(id: i64) -> Self {
        Self { id, embedded: None }
    }

    pub fn with_embedded(id: i64, value: T) -> Self {
        Self {
            id,
            embedded: Some(value),
        }
    }
}

impl<T> Default for Link<T> {
    fn default() -> Self {
        Self::to(0)
    }
}

// Serializes back into the nested shape so a normalized record re-normalizes
// to itself.
impl<T: Serialize> Serialize for Link<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.embedded {
            Some(value) => value.serialize(serializer),
            None => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("id", &self.id)?;
                map.end()
            }
        }
    }
}

/// A record that can be looked up by id and stands in for itself when a
/// reference does not resolve.
pub trait Entity: Clone {
    const KIND: Resource;

    fn id(&self) -> i64;

    /// The "Unknown X" record with id 0.
    fn placeholder() -> Self;

    /// Replaces fields still holding their default with the values from `other`.
    fn fill_from(&mut self, other: &Self);
}

fn fill_text(field: &mut String, defaults: &[&str], other: &str) {
    if defaults.contains(&field.as_str()) && !defaults.contains(&other) {
        *field = other.to_string();
    }
}

fn fill_link<T: Entity>(link: &mut Link<T>, other: &Link<T>) {
    if link.id == 0 {
        link.id = other.id;
    }
    let Some(theirs) = &other.embedded else {
        return;
    };
    if let Some(mine) = link.embedded.as_mut() {
        mine.fill_from(theirs);
    } else if link.id == theirs.id() {
        link.embedded = Some(theirs.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    pub id: i64,
    pub name: String,
}

impl Entity for Level {
    const KIND: Resource = Resource::Levels;

    fn id(&self) -> i64 {
        self.id
    }

    fn placeholder() -> Self {
        Self {
            id: 0,
            name: UNKNOWN_LEVEL.to_string(),
        }
    }

    fn fill_from(&mut self, other: &Self) {
        fill_text(&mut self.name, &[UNKNOWN_LEVEL], &other.name);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub level: Link<Level>,
}

impl Entity for Group {
    const KIND: Resource = Resource::Groups;

    fn id(&self) -> i64 {
        self.id
    }

    fn placeholder() -> Self {
        Self {
            id: 0,
            name: UNKNOWN_GROUP.to_string(),
            level: Link::default(),
        }
    }

    fn fill_from(&mut self, other: &Self) {
        fill_text(&mut self.name, &[UNKNOWN_GROUP], &other.name);
        fill_link(&mut self.level, &other.level);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub level_name: String,
}

impl Entity for Subject {
    const KIND: Resource = Resource::Subjects;

    fn id(&self) -> i64 {
        self.id
    }

    fn placeholder() -> Self {
        Self {
            id: 0,
            name: UNKNOWN_SUBJECT.to_string(),
            level_name: NOT_AVAILABLE.to_string(),
        }
    }

    fn fill_from(&mut self, other: &Self) {
        fill_text(&mut self.name, &[UNKNOWN_SUBJECT], &other.name);
        fill_text(&mut self.level_name, &[NOT_AVAILABLE], &other.level_name);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: i64,
    pub email: String,
    pub firstname: String,
    pub lastname: String,
}

impl Teacher {
    pub fn full_name(&self) -> String {
        full_name(&self.firstname, &self.lastname, UNKNOWN_TEACHER)
    }
}

impl Entity for Teacher {
    const KIND: Resource = Resource::Teachers;

    fn id(&self) -> i64 {
        self.id
    }

    fn placeholder() -> Self {
        Self {
            id: 0,
            email: NOT_AVAILABLE.to_string(),
            firstname: UNKNOWN.to_string(),
            lastname: TEACHER_LASTNAME.to_string(),
        }
    }

    fn fill_from(&mut self, other: &Self) {
        fill_text(&mut self.email, &[NOT_AVAILABLE], &other.email);
        fill_text(&mut self.firstname, &[UNKNOWN], &other.firstname);
        fill_text(&mut self.lastname, &[TEACHER_LASTNAME], &other.lastname);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub email: String,
    pub firstname: String,
    pub lastname: String,
    pub group: Link<Group>,
    pub level: Link<Level>,
}

impl Student {
    pub fn full_name(&self) -> String {
        full_name(&self.firstname, &self.lastname, UNKNOWN_STUDENT)
    }
}

impl Entity for Student {
    const KIND: Resource = Resource::Students;

    fn id(&self) -> i64 {
        self.id
    }

    fn placeholder() -> Self {
        Self {
            id: 0,
            email: NOT_AVAILABLE.to_string(),
            firstname: UNKNOWN.to_string(),
            lastname: STUDENT_LASTNAME.to_string(),
            group: Link::default(),
            level: Link::default(),
        }
    }

    fn fill_from(&mut self, other: &Self) {
        fill_text(&mut self.email, &[NOT_AVAILABLE], &other.email);
        fill_text(&mut self.firstname, &[UNKNOWN], &other.firstname);
        fill_text(&mut self.lastname, &[STUDENT_LASTNAME], &other.lastname);
        fill_link(&mut self.group, &other.group);
        fill_link(&mut self.level, &other.level);
    }
}

fn full_name(firstname: &str, lastname: &str, fallback: &str) -> String {
    let name = format!("{} {}", firstname.trim(), lastname.trim());
    let name = name.trim();
    if name.is_empty() {
        fallback.to_string()
    } else {
        name.to_string()
    }
}

/// One teacher teaching one subject to one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub id: i64,
    pub teacher: Link<Teacher>,
    pub group: Link<Group>,
    pub subject: Link<Subject>,
}

impl Entity for Program {
    const KIND: Resource = Resource::Programs;

    fn id(&self) -> i64 {
        self.id
    }

    fn placeholder() -> Self {
        Self {
            id: 0,
            teacher: Link::default(),
            group: Link::default(),
            subject: Link::default(),
        }
    }

    fn fill_from(&mut self, other: &Self) {
        fill_link(&mut self.teacher, &other.teacher);
        fill_link(&mut self.group, &other.group);
        fill_link(&mut self.subject, &other.subject);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    #[default]
    NotStarted,
    InProgress,
    Submitted,
    Graded,
}

impl AssignmentStatus {
    pub const ALL: [AssignmentStatus; 4] = [
        AssignmentStatus::NotStarted,
        AssignmentStatus::InProgress,
        AssignmentStatus::Submitted,
        AssignmentStatus::Graded,
    ];

    /// Accepts `IN_PROGRESS`, `In Progress`, `in-progress` and the like.
    pub fn parse(value: &str) -> Option<Self> {
        let key: String = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "notstarted" => Some(AssignmentStatus::NotStarted),
            "inprogress" => Some(AssignmentStatus::InProgress),
            "submitted" => Some(AssignmentStatus::Submitted),
            "graded" => Some(AssignmentStatus::Graded),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AssignmentStatus::NotStarted => "Not Started",
            AssignmentStatus::InProgress => "In Progress",
            AssignmentStatus::Submitted => "Submitted",
            AssignmentStatus::Graded => "Graded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub due_date: Option<NaiveDateTime>,
    pub subject: Link<Subject>,
    pub group: Link<Group>,
    pub program: Link<Program>,
    pub status: AssignmentStatus,
}

impl Entity for Assignment {
    const KIND: Resource = Resource::Assignments;

    fn id(&self) -> i64 {
        self.id
    }

    fn placeholder() -> Self {
        Self {
            id: 0,
            title: UNKNOWN_ASSIGNMENT.to_string(),
            description: String::new(),
            due_date: None,
            subject: Link::default(),
            group: Link::default(),
            program: Link::default(),
            status: AssignmentStatus::NotStarted,
        }
    }

    fn fill_from(&mut self, other: &Self) {
        fill_text(&mut self.title, &[UNTITLED, UNKNOWN_ASSIGNMENT], &other.title);
        fill_text(&mut self.description, &[""], &other.description);
        if self.due_date.is_none() {
            self.due_date = other.due_date;
        }
        fill_link(&mut self.subject, &other.subject);
        fill_link(&mut self.group, &other.group);
        fill_link(&mut self.program, &other.program);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: i64,
    /// Clamped to `[0, 100]`; `None` when the payload carried no usable score.
    pub score: Option<f64>,
    pub student: Link<Student>,
    pub subject: Link<Subject>,
    pub assignment: Link<Assignment>,
}

impl Entity for Grade {
    const KIND: Resource = Resource::Grades;

    fn id(&self) -> i64 {
        self.id
    }

    fn placeholder() -> Self {
        Self {
            id: 0,
            score: None,
            student: Link::default(),
            subject: Link::default(),
            assignment: Link::default(),
        }
    }

    fn fill_from(&mut self, other: &Self) {
        if self.score.is_none() {
            self.score = other.score;
        }
        fill_link(&mut self.student, &other.student);
        fill_link(&mut self.subject, &other.subject);
        fill_link(&mut self.assignment, &other.assignment);
    }
}

/// A student's file submission for an assignment, optionally graded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkReturn {
    pub id: i64,
    pub student: Link<Student>,
    pub assignment: Link<Assignment>,
    pub file_path: String,
    pub grade: Option<f64>,
    pub submitted_at: Option<NaiveDateTime>,
}

impl WorkReturn {
    /// File name without the upload directory and the backend's uuid prefix.
    pub fn file_name(&self) -> &str {
        let name = self.file_path.rsplit('/').next().unwrap_or(&self.file_path);
        match name.split_once('_') {
            Some((prefix, rest)) if prefix.len() == 36 && !rest.is_empty() => rest,
            _ => name,
        }
    }
}

impl Entity for WorkReturn {
    const KIND: Resource = Resource::WorkReturns;

    fn id(&self) -> i64 {
        self.id
    }

    fn placeholder() -> Self {
        Self {
            id: 0,
            student: Link::default(),
            assignment: Link::default(),
            file_path: String::new(),
            grade: None,
            submitted_at: None,
        }
    }

    fn fill_from(&mut self, other: &Self) {
        fill_link(&mut self.student, &other.student);
        fill_link(&mut self.assignment, &other.assignment);
        fill_text(&mut self.file_path, &[""], &other.file_path);
        if self.grade.is_none() {
            self.grade = other.grade;
        }
        if self.submitted_at.is_none() {
            self.submitted_at = other.submitted_at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_parse_accepts_backend_and_form_spellings() {
        assert_eq!(AssignmentStatus::parse("IN_PROGRESS"), Some(AssignmentStatus::InProgress));
        assert_eq!(AssignmentStatus::parse("Not Started"), Some(AssignmentStatus::NotStarted));
        assert_eq!(AssignmentStatus::parse("submitted"), Some(AssignmentStatus::Submitted));
        assert_eq!(AssignmentStatus::parse("graded "), Some(AssignmentStatus::Graded));
        assert_eq!(AssignmentStatus::parse("done"), None);
    }

    #[test]
    fn full_name_falls_back_when_blank() {
        let mut teacher = Teacher::placeholder();
        assert_eq!(teacher.full_name(), UNKNOWN_TEACHER);
        teacher.firstname = " ".to_string();
        teacher.lastname = String::new();
        assert_eq!(teacher.full_name(), UNKNOWN_TEACHER);
        teacher.firstname = "Ada".to_string();
        assert_eq!(teacher.full_name(), "Ada");
    }

    #[test]
    fn link_without_embedded_serializes_as_id_object() {
        let link: Link<Level> = Link::to(7);
        assert_eq!(serde_json::to_value(&link).unwrap(), serde_json::json!({ "id": 7 }));
    }

    #[test]
    fn fill_from_keeps_real_values() {
        let mut subject = Subject {
            id: 2,
            name: "Math".to_string(),
            level_name: NOT_AVAILABLE.to_string(),
        };
        let other = Subject {
            id: 2,
            name: "Mathematics".to_string(),
            level_name: "Level 1".to_string(),
        };
        subject.fill_from(&other);
        assert_eq!(subject.name, "Math");
        assert_eq!(subject.level_name, "Level 1");
    }

    #[test]
    fn work_return_file_name_strips_upload_prefix() {
        let mut work = WorkReturn::placeholder();
        work.file_path = "/uploads/0f8fad5b-d9cb-469f-a165-70867728950e_essay.pdf".to_string();
        assert_eq!(work.file_name(), "essay.pdf");
        work.file_path = "/uploads/my_essay.pdf".to_string();
        assert_eq!(work.file_name(), "my_essay.pdf");
    }
}
