//! Conversion of loosely-typed backend JSON into fully-defaulted records.
//!
//! Nothing in here fails: a missing, null, blank or wrongly-typed field takes
//! the documented default for its kind, and anything that is not an array at
//! the collection level becomes an empty collection.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use crate::models::{
    Assignment, AssignmentStatus, Grade, Group, Level, Link, Program, Resource, Student, Subject,
    Teacher, WorkReturn, NOT_AVAILABLE, UNKNOWN, UNKNOWN_GROUP, UNKNOWN_LEVEL, UNKNOWN_SUBJECT,
    UNTITLED,
};

const DATE_TIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// A record kind that can be built from any JSON value.
pub trait Normalize: Sized {
    fn from_fields(fields: &Fields<'_>) -> Self;

    fn from_raw(raw: &Value) -> Self {
        Self::from_fields(&Fields::new(raw))
    }
}

/// Normalizes every element of a JSON array; any other value yields an empty
/// collection.
pub fn normalize_collection<T: Normalize>(raw: &Value) -> Vec<T> {
    match raw.as_array() {
        Some(items) => items.iter().map(T::from_raw).collect(),
        None => {
            if !raw.is_null() {
                tracing::debug!(kind = json_kind(raw), "Collection payload is not an array");
            }
            Vec::new()
        }
    }
}

/// A normalized record of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Student(Student),
    Teacher(Teacher),
    Group(Group),
    Level(Level),
    Subject(Subject),
    Program(Program),
    Assignment(Assignment),
    Grade(Grade),
    WorkReturn(WorkReturn),
}

impl Record {
    pub fn kind(&self) -> Resource {
        match self {
            Record::Student(_) => Resource::Students,
            Record::Teacher(_) => Resource::Teachers,
            Record::Group(_) => Resource::Groups,
            Record::Level(_) => Resource::Levels,
            Record::Subject(_) => Resource::Subjects,
            Record::Program(_) => Resource::Programs,
            Record::Assignment(_) => Resource::Assignments,
            Record::Grade(_) => Resource::Grades,
            Record::WorkReturn(_) => Resource::WorkReturns,
        }
    }
}

/// Normalizes one raw record according to its kind tag.
pub fn normalize(kind: Resource, raw: &Value) -> Record {
    match kind {
        Resource::Students => Record::Student(Student::from_raw(raw)),
        Resource::Teachers => Record::Teacher(Teacher::from_raw(raw)),
        Resource::Groups => Record::Group(Group::from_raw(raw)),
        Resource::Levels => Record::Level(Level::from_raw(raw)),
        Resource::Subjects => Record::Subject(Subject::from_raw(raw)),
        Resource::Programs => Record::Program(Program::from_raw(raw)),
        Resource::Assignments => Record::Assignment(Assignment::from_raw(raw)),
        Resource::Grades => Record::Grade(Grade::from_raw(raw)),
        Resource::WorkReturns => Record::WorkReturn(WorkReturn::from_raw(raw)),
    }
}

/// Read-only view over one raw JSON object with defaulting accessors.
pub struct Fields<'a> {
    map: Option<&'a Map<String, Value>>,
    id_override: Option<i64>,
}

impl<'a> Fields<'a> {
    pub fn new(raw: &'a Value) -> Self {
        Self {
            map: raw.as_object(),
            id_override: None,
        }
    }

    fn from_map(map: &'a Map<String, Value>, id_override: Option<i64>) -> Self {
        Self {
            map: Some(map),
            id_override,
        }
    }

    /// The field's value; null counts as absent.
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.map
            .and_then(|map| map.get(key))
            .filter(|value| !value.is_null())
    }

    /// The record's own id, or 0.
    pub fn record_id(&self) -> i64 {
        self.id_override.unwrap_or_else(|| self.id("id"))
    }

    pub fn id(&self, key: &str) -> i64 {
        self.get(key).and_then(parse_id).unwrap_or(0)
    }

    pub fn opt_text(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    }

    pub fn text(&self, key: &str, default: &str) -> String {
        self.opt_text(key).unwrap_or_else(|| default.to_string())
    }

    pub fn score(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(parse_score)
    }

    /// First parseable date among `keys`.
    pub fn date(&self, keys: &[&str]) -> Option<NaiveDateTime> {
        keys.iter().find_map(|key| self.get(key).and_then(parse_date))
    }

    pub fn nested(&self, key: &str) -> Option<&'a Map<String, Value>> {
        self.get(key).and_then(Value::as_object)
    }

    pub fn nested_text(&self, key: &str, field: &str) -> Option<String> {
        self.nested(key)
            .map(|map| Fields::from_map(map, None))
            .and_then(|nested| nested.opt_text(field))
    }

    /// Reads a foreign key given either flat (`groupId`) or nested (`group`).
    ///
    /// The nested object's id wins over the flat one, and a nested object
    /// carrying more than its id is kept as the link's embedded record.
    pub fn link<T: Normalize>(&self, name: &str) -> Link<T> {
        let flat = self.id(&format!("{name}Id"));
        let Some(nested) = self.nested(name) else {
            return Link::to(flat);
        };

        let nested_id = nested.get("id").and_then(parse_id).unwrap_or(0);
        let id = if nested_id != 0 { nested_id } else { flat };
        let carries_fields = nested.iter().any(|(key, value)| key != "id" && !value.is_null());
        if !carries_fields {
            return Link::to(id);
        }

        let id_override = (nested_id == 0 && flat != 0).then_some(flat);
        Link::with_embedded(id, T::from_fields(&Fields::from_map(nested, id_override)))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn integral(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64).then_some(value as i64)
}

/// Integers, integral floats and numeric strings.
pub fn parse_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| number.as_f64().and_then(integral)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }
}

/// A number or numeric string, clamped to `[0, 100]`.
pub fn parse_score(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    score.is_finite().then(|| score.clamp(0.0, 100.0))
}

/// ISO local date-times, RFC 3339 timestamps, bare dates and the
/// `[year, month, day, hour, minute, second]` arrays Jackson emits.
pub fn parse_date(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::String(text) => parse_date_text(text.trim()),
        Value::Array(parts) => {
            let parts: Vec<i64> = parts.iter().map(Value::as_i64).collect::<Option<_>>()?;
            let part = |index: usize| parts.get(index).copied().unwrap_or(0);
            if parts.len() < 3 {
                return None;
            }
            NaiveDate::from_ymd_opt(
                i32::try_from(part(0)).ok()?,
                u32::try_from(part(1)).ok()?,
                u32::try_from(part(2)).ok()?,
            )?
            .and_hms_opt(
                u32::try_from(part(3)).ok()?,
                u32::try_from(part(4)).ok()?,
                u32::try_from(part(5)).ok()?,
            )
        }
        _ => None,
    }
}

fn parse_date_text(text: &str) -> Option<NaiveDateTime> {
    if text.is_empty() {
        return None;
    }
    if let Some(parsed) = DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
    {
        return Some(parsed);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

impl Normalize for Level {
    fn from_fields(f: &Fields<'_>) -> Self {
        Self {
            id: f.record_id(),
            name: f.text("name", UNKNOWN_LEVEL),
        }
    }
}

impl Normalize for Group {
    fn from_fields(f: &Fields<'_>) -> Self {
        Self {
            id: f.record_id(),
            name: f.text("name", UNKNOWN_GROUP),
            level: f.link("level"),
        }
    }
}

impl Normalize for Subject {
    fn from_fields(f: &Fields<'_>) -> Self {
        let level_name = f
            .opt_text("levelName")
            .or_else(|| f.nested_text("level", "name"))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        Self {
            id: f.record_id(),
            name: f.text("name", UNKNOWN_SUBJECT),
            level_name,
        }
    }
}

impl Normalize for Teacher {
    fn from_fields(f: &Fields<'_>) -> Self {
        Self {
            id: f.record_id(),
            email: f.text("email", NOT_AVAILABLE),
            firstname: f.text("firstname", UNKNOWN),
            lastname: f.text("lastname", "Teacher"),
        }
    }
}

impl Normalize for Student {
    fn from_fields(f: &Fields<'_>) -> Self {
        let mut group: Link<Group> = f.link("group");
        if group.embedded.is_none() {
            if let Some(name) = f.opt_text("groupName") {
                group.embedded = Some(Group {
                    id: group.id,
                    name,
                    level: Link::default(),
                });
            }
        }
        let mut level: Link<Level> = f.link("level");
        if level.embedded.is_none() {
            if let Some(name) = f.opt_text("levelName") {
                level.embedded = Some(Level { id: level.id, name });
            }
        }
        Self {
            id: f.record_id(),
            email: f.text("email", NOT_AVAILABLE),
            firstname: f.text("firstname", UNKNOWN),
            lastname: f.text("lastname", "Student"),
            group,
            level,
        }
    }
}

impl Normalize for Program {
    fn from_fields(f: &Fields<'_>) -> Self {
        Self {
            id: f.record_id(),
            teacher: f.link("teacher"),
            group: f.link("group"),
            subject: f.link("subject"),
        }
    }
}

impl Normalize for Assignment {
    fn from_fields(f: &Fields<'_>) -> Self {
        let status = f
            .opt_text("status")
            .and_then(|status| AssignmentStatus::parse(&status))
            .unwrap_or_default();
        Self {
            id: f.record_id(),
            title: f.text("title", UNTITLED),
            description: f.text("description", ""),
            due_date: f.date(&["dueDate", "delay"]),
            subject: f.link("subject"),
            group: f.link("group"),
            program: f.link("program"),
            status,
        }
    }
}

impl Normalize for Grade {
    fn from_fields(f: &Fields<'_>) -> Self {
        Self {
            id: f.record_id(),
            score: f.score("score"),
            student: f.link("student"),
            subject: f.link("subject"),
            assignment: f.link("assignment"),
        }
    }
}

impl Normalize for WorkReturn {
    fn from_fields(f: &Fields<'_>) -> Self {
        let file_path = f
            .opt_text("filePath")
            .or_else(|| f.opt_text("fileUrl"))
            .unwrap_or_default();
        Self {
            id: f.record_id(),
            student: f.link("student"),
            assignment: f.link("assignment"),
            file_path,
            grade: f.score("grade"),
            submitted_at: f.date(&["submittedAt", "submissionDate", "createdAt"]),
        }
    }
}
