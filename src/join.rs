//! Foreign-key resolution against already-normalized sibling collections.
//!
//! Resolution is total: a reference that matches nothing resolves to the
//! kind's placeholder record.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::{
    Assignment, Entity, Grade, Group, Level, Link, Program, Student, Subject, Teacher, WorkReturn,
};

/// Every normalized collection a screen may need, fetched independently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collections {
    pub students: Vec<Student>,
    pub teachers: Vec<Teacher>,
    pub groups: Vec<Group>,
    pub levels: Vec<Level>,
    pub subjects: Vec<Subject>,
    pub programs: Vec<Program>,
    pub assignments: Vec<Assignment>,
    pub grades: Vec<Grade>,
    pub work_returns: Vec<WorkReturn>,
}

/// Resolves `link` by a linear scan of `collection`.
pub fn resolve<T: Entity>(link: &Link<T>, collection: &[T]) -> T {
    let found = if link.id == 0 {
        None
    } else {
        collection.iter().find(|item| item.id() == link.id)
    };
    merge(link, found)
}

fn merge<T: Entity>(link: &Link<T>, found: Option<&T>) -> T {
    match (&link.embedded, found) {
        (Some(embedded), Some(found)) => {
            let mut resolved = embedded.clone();
            resolved.fill_from(found);
            resolved
        }
        (Some(embedded), None) => embedded.clone(),
        (None, Some(found)) => found.clone(),
        (None, None) => {
            let kind = T::KIND;
            tracing::debug!(kind = %kind, id = link.id, "Unresolved reference, using placeholder");
            T::placeholder()
        }
    }
}

/// Id index over one collection for repeated resolution.
///
/// When ids repeat, the first record wins.
pub struct Lookup<'a, T> {
    by_id: HashMap<i64, &'a T>,
}

impl<'a, T: Entity> Lookup<'a, T> {
    pub fn new(items: &'a [T]) -> Self {
        let mut by_id = HashMap::with_capacity(items.len());
        for item in items {
            by_id.entry(item.id()).or_insert(item);
        }
        Self { by_id }
    }

    pub fn get(&self, id: i64) -> Option<&'a T> {
        if id == 0 {
            return None;
        }
        self.by_id.get(&id).copied()
    }

    pub fn resolve(&self, link: &Link<T>) -> T {
        merge(link, self.get(link.id))
    }

    pub fn resolve_id(&self, id: i64) -> T {
        self.resolve(&Link::to(id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupView {
    pub group: Group,
    pub level: Level,
    pub student_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentView {
    pub student: Student,
    pub group: Group,
    pub level: Level,
}

impl StudentView {
    pub fn name(&self) -> String {
        self.student.full_name()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramView {
    pub program: Program,
    pub teacher: Teacher,
    pub group: Group,
    pub subject: Subject,
    pub student_count: usize,
}

impl ProgramView {
    pub fn label(&self) -> String {
        format!("{} - {}", self.subject.name, self.group.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentView {
    pub assignment: Assignment,
    pub subject: Subject,
    pub group: Group,
    pub program: Program,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeView {
    pub grade: Grade,
    pub student: Student,
    pub subject: Subject,
    pub assignment: Assignment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkReturnView {
    pub work_return: WorkReturn,
    pub student: Student,
    pub assignment: Assignment,
    pub subject: Subject,
}

fn level_of_group(group: &Group, levels: &Lookup<'_, Level>) -> Level {
    levels.resolve(&group.level)
}

pub fn join_groups(collections: &Collections) -> Vec<GroupView> {
    let levels = Lookup::new(&collections.levels);
    let students = join_students(collections);
    collections
        .groups
        .iter()
        .map(|group| GroupView {
            group: group.clone(),
            level: level_of_group(group, &levels),
            student_count: students
                .iter()
                .filter(|view| view.group.id != 0 && view.group.id == group.id)
                .count(),
        })
        .collect()
}

/// Students with their group and level; the level falls back to the group's
/// level when the student record carries none.
pub fn join_students(collections: &Collections) -> Vec<StudentView> {
    let groups = Lookup::new(&collections.groups);
    let levels = Lookup::new(&collections.levels);
    collections
        .students
        .iter()
        .map(|student| {
            let group = groups.resolve(&student.group);
            let level = if student.level.id == 0 && student.level.embedded.is_none() {
                level_of_group(&group, &levels)
            } else {
                levels.resolve(&student.level)
            };
            StudentView {
                student: student.clone(),
                group,
                level,
            }
        })
        .collect()
}

/// Programs with teacher, group and subject, plus how many students sit in
/// the program's group. Head counts compare group keys, so they hold even
/// when the groups collection itself is missing.
pub fn join_programs(collections: &Collections) -> Vec<ProgramView> {
    let teachers = Lookup::new(&collections.teachers);
    let groups = Lookup::new(&collections.groups);
    let subjects = Lookup::new(&collections.subjects);
    collections
        .programs
        .iter()
        .map(|program| {
            let group_id = program.group.id;
            let student_count = collections
                .students
                .iter()
                .filter(|student| group_id != 0 && student.group.id == group_id)
                .count();
            ProgramView {
                program: program.clone(),
                teacher: teachers.resolve(&program.teacher),
                group: groups.resolve(&program.group),
                subject: subjects.resolve(&program.subject),
                student_count,
            }
        })
        .collect()
}

pub fn join_assignments(collections: &Collections) -> Vec<AssignmentView> {
    let subjects = Lookup::new(&collections.subjects);
    let groups = Lookup::new(&collections.groups);
    let programs = Lookup::new(&collections.programs);
    collections
        .assignments
        .iter()
        .map(|assignment| AssignmentView {
            assignment: assignment.clone(),
            subject: subjects.resolve(&assignment.subject),
            group: groups.resolve(&assignment.group),
            program: programs.resolve(&assignment.program),
        })
        .collect()
}

/// Grades with student, subject and assignment. A grade without its own
/// subject reference takes the subject of its assignment.
pub fn join_grades(collections: &Collections) -> Vec<GradeView> {
    let students = Lookup::new(&collections.students);
    let subjects = Lookup::new(&collections.subjects);
    let assignments = Lookup::new(&collections.assignments);
    collections
        .grades
        .iter()
        .map(|grade| {
            let assignment = assignments.resolve(&grade.assignment);
            let subject_link = if grade.subject.id == 0 && grade.subject.embedded.is_none() {
                &assignment.subject
            } else {
                &grade.subject
            };
            let subject = subjects.resolve(subject_link);
            GradeView {
                grade: grade.clone(),
                student: students.resolve(&grade.student),
                subject,
                assignment,
            }
        })
        .collect()
}

pub fn join_work_returns(collections: &Collections) -> Vec<WorkReturnView> {
    let students = Lookup::new(&collections.students);
    let assignments = Lookup::new(&collections.assignments);
    let subjects = Lookup::new(&collections.subjects);
    collections
        .work_returns
        .iter()
        .map(|work_return| {
            let assignment = assignments.resolve(&work_return.assignment);
            let subject = subjects.resolve(&assignment.subject);
            WorkReturnView {
                work_return: work_return.clone(),
                student: students.resolve(&work_return.student),
                assignment,
                subject,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{UNKNOWN_GROUP, UNKNOWN_SUBJECT};
    use crate::normalize::{normalize_collection, Normalize};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn subjects() -> Vec<Subject> {
        normalize_collection(&json!([
            { "id": 2, "name": "Math", "levelName": "Level 1" },
            { "id": 3, "name": "Physics" },
        ]))
    }

    #[test]
    fn unresolved_reference_yields_placeholder() {
        let resolved = resolve(&Link::<Subject>::to(99), &subjects());
        assert_eq!(resolved, Subject::placeholder());
        assert_eq!(resolved.name, UNKNOWN_SUBJECT);
    }

    #[test]
    fn unset_reference_never_matches() {
        let mut items = subjects();
        items.push(Subject {
            id: 0,
            name: "Orphan".to_string(),
            level_name: "N/A".to_string(),
        });
        assert_eq!(resolve(&Link::<Subject>::to(0), &items).name, UNKNOWN_SUBJECT);
        assert_eq!(Lookup::new(&items).resolve_id(0).name, UNKNOWN_SUBJECT);
    }

    #[test]
    fn embedded_fields_win_and_placeholders_are_filled() {
        let raw = json!({ "subject": { "id": 2, "name": "Algebra" } });
        let assignment = Assignment::from_raw(&raw);
        let resolved = resolve(&assignment.subject, &subjects());
        assert_eq!(resolved.name, "Algebra");
        assert_eq!(resolved.level_name, "Level 1");
    }

    #[test]
    fn embedded_record_stands_alone_when_collection_misses() {
        let raw = json!({ "subject": { "id": 42, "name": "Art" } });
        let assignment = Assignment::from_raw(&raw);
        assert_eq!(resolve(&assignment.subject, &[]).name, "Art");
    }

    #[test]
    fn lookup_and_linear_scan_agree() {
        let items = subjects();
        let lookup = Lookup::new(&items);
        for id in [0, 2, 3, 99] {
            let link = Link::to(id);
            assert_eq!(lookup.resolve(&link), resolve(&link, &items));
        }
    }

    #[test]
    fn student_level_falls_back_to_group_level() {
        let collections = Collections {
            students: normalize_collection(&json!([{ "id": 1, "groupId": 5 }])),
            groups: normalize_collection(&json!([{ "id": 5, "name": "B", "levelId": 2 }])),
            levels: normalize_collection(&json!([{ "id": 2, "name": "Level 2" }])),
            ..Collections::default()
        };
        let views = join_students(&collections);
        assert_eq!(views[0].group.name, "B");
        assert_eq!(views[0].level.name, "Level 2");
        assert_eq!(views[0].name(), "Unknown Student");
    }

    #[test]
    fn programs_count_students_in_their_group() {
        let collections = Collections {
            students: normalize_collection(&json!([
                { "id": 1, "groupId": 5 },
                { "id": 2, "group": { "id": 5 } },
                { "id": 3, "groupId": 6 },
                { "id": 4 },
            ])),
            groups: normalize_collection(&json!([{ "id": 5, "name": "B" }])),
            teachers: normalize_collection(&json!([{ "id": 8, "firstname": "Ada", "lastname": "Byron" }])),
            subjects: subjects(),
            programs: normalize_collection(&json!([
                { "id": 1, "teacherId": 8, "groupId": 5, "subjectId": 2 },
                { "id": 2, "teacherId": 9, "groupId": 7, "subjectId": 3 },
            ])),
            ..Collections::default()
        };
        let views = join_programs(&collections);
        assert_eq!(views[0].student_count, 2);
        assert_eq!(views[0].teacher.full_name(), "Ada Byron");
        assert_eq!(views[0].label(), "Math - B");
        assert_eq!(views[1].student_count, 0);
        assert_eq!(views[1].teacher.full_name(), "Unknown Teacher");
        assert_eq!(views[1].group.name, UNKNOWN_GROUP);
    }

    #[test]
    fn grade_without_subject_uses_assignment_subject() {
        let collections = Collections {
            subjects: subjects(),
            assignments: normalize_collection(&json!([{ "id": 10, "title": "Quiz", "subjectId": 3 }])),
            grades: normalize_collection(&json!([{ "id": 1, "score": 75, "assignmentId": 10 }])),
            ..Collections::default()
        };
        let views = join_grades(&collections);
        assert_eq!(views[0].assignment.title, "Quiz");
        assert_eq!(views[0].subject.name, "Physics");
    }

    #[test]
    fn groups_carry_level_and_head_count() {
        let collections = Collections {
            students: normalize_collection(&json!([{ "id": 1, "groupId": 5 }])),
            groups: normalize_collection(&json!([
                { "id": 5, "name": "B", "level": { "id": 2, "name": "Level 2" } },
                { "id": 6, "name": "C", "levelId": 3 },
            ])),
            ..Collections::default()
        };
        let views = join_groups(&collections);
        assert_eq!(views[0].level.name, "Level 2");
        assert_eq!(views[0].student_count, 1);
        assert_eq!(views[1].level, Level::placeholder());
        assert_eq!(views[1].student_count, 0);
    }

    #[test]
    fn work_returns_reach_subject_through_assignment() {
        let collections = Collections {
            students: normalize_collection(&json!([{ "id": 1, "firstname": "Alex", "lastname": "Smith" }])),
            subjects: subjects(),
            assignments: normalize_collection(&json!([{ "id": 10, "subject": { "id": 2 } }])),
            work_returns: normalize_collection(&json!([
                { "id": 1, "studentId": 1, "assignmentId": 10, "filePath": "/uploads/a.pdf" },
            ])),
            ..Collections::default()
        };
        let views = join_work_returns(&collections);
        assert_eq!(views[0].student.full_name(), "Alex Smith");
        assert_eq!(views[0].subject.name, "Math");
    }
}
