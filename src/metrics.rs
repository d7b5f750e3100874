//! Presentation metrics derived from normalized grades and assignments.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::join::{AssignmentView, GradeView, StudentView};
use crate::models::{Assignment, AssignmentStatus, Grade, NOT_AVAILABLE};

/// Pass mark of the per-student grades list.
pub const GRADES_VIEW_PASS_THRESHOLD: f64 = 50.0;
/// Pass mark of the subject performance aggregate. A 55 passes the grades
/// list but not this.
pub const SUBJECT_PERFORMANCE_PASS_THRESHOLD: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    F,
}

impl LetterGrade {
    pub fn as_str(self) -> &'static str {
        match self {
            LetterGrade::A => "A",
            LetterGrade::B => "B",
            LetterGrade::C => "C",
            LetterGrade::D => "D",
            LetterGrade::F => "F",
        }
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct GradeBand {
    min_score: f64,
    gpa: f64,
    letter: LetterGrade,
}

// Shared by the GPA and letter conversions so the two never drift apart.
const GRADE_BANDS: [GradeBand; 4] = [
    GradeBand {
        min_score: 90.0,
        gpa: 4.0,
        letter: LetterGrade::A,
    },
    GradeBand {
        min_score: 80.0,
        gpa: 3.0,
        letter: LetterGrade::B,
    },
    GradeBand {
        min_score: 70.0,
        gpa: 2.0,
        letter: LetterGrade::C,
    },
    GradeBand {
        min_score: 60.0,
        gpa: 1.0,
        letter: LetterGrade::D,
    },
];

fn band(score: f64) -> Option<&'static GradeBand> {
    GRADE_BANDS.iter().find(|band| score >= band.min_score)
}

pub fn score_to_gpa(score: f64) -> f64 {
    band(score).map_or(0.0, |band| band.gpa)
}

pub fn score_to_letter_grade(score: f64) -> LetterGrade {
    band(score).map_or(LetterGrade::F, |band| band.letter)
}

pub fn is_passing(score: f64, threshold: f64) -> bool {
    score >= threshold
}

/// Anything carrying an optional 0–100 score.
pub trait Scored {
    fn score(&self) -> Option<f64>;
}

impl Scored for Grade {
    fn score(&self) -> Option<f64> {
        self.score
    }
}

impl Scored for GradeView {
    fn score(&self) -> Option<f64> {
        self.grade.score
    }
}

impl Scored for f64 {
    fn score(&self) -> Option<f64> {
        Some(*self)
    }
}

/// Scores that are present, in input order.
pub fn scores<T: Scored>(items: &[T]) -> Vec<f64> {
    items.iter().filter_map(Scored::score).collect()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AverageScore {
    Value(f64),
    NotAvailable,
}

impl AverageScore {
    pub fn value(self) -> Option<f64> {
        match self {
            AverageScore::Value(value) => Some(value),
            AverageScore::NotAvailable => None,
        }
    }

    pub fn letter_grade(self) -> Option<LetterGrade> {
        self.value().map(score_to_letter_grade)
    }

    pub fn gpa(self) -> Option<f64> {
        self.value().map(score_to_gpa)
    }
}

impl From<Option<f64>> for AverageScore {
    fn from(value: Option<f64>) -> Self {
        value.map_or(AverageScore::NotAvailable, AverageScore::Value)
    }
}

impl fmt::Display for AverageScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AverageScore::Value(value) => write!(f, "{value:.2}"),
            AverageScore::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

/// Mean of the scored items; `NotAvailable` when nothing carries a score.
pub fn average_score<T: Scored>(items: &[T]) -> AverageScore {
    mean(&scores(items)).into()
}

/// Whole-number percentage of passing scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct PassRate(pub u32);

impl fmt::Display for PassRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Share of `scores` at or above `threshold`, rounded half away from zero.
/// Empty input is 0%.
pub fn pass_rate(scores: &[f64], threshold: f64) -> PassRate {
    if scores.is_empty() {
        return PassRate(0);
    }
    let passed = scores.iter().filter(|score| is_passing(**score, threshold)).count();
    let percent = passed as f64 / scores.len() as f64 * 100.0;
    PassRate(percent.round() as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GradeFilter {
    #[default]
    All,
    Passed,
    Failed,
}

impl GradeFilter {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Some(GradeFilter::All),
            "passed" => Some(GradeFilter::Passed),
            "failed" => Some(GradeFilter::Failed),
            _ => None,
        }
    }
}

/// Items without a score only pass the `All` filter.
pub fn filter_grades<T: Scored>(items: &[T], filter: GradeFilter, threshold: f64) -> Vec<&T> {
    items
        .iter()
        .filter(|item| match (filter, item.score()) {
            (GradeFilter::All, _) => true,
            (GradeFilter::Passed, Some(score)) => is_passing(score, threshold),
            (GradeFilter::Failed, Some(score)) => !is_passing(score, threshold),
            (_, None) => false,
        })
        .collect()
}

/// Anything with an optional due date.
pub trait Dated {
    fn due_date(&self) -> Option<NaiveDateTime>;
}

impl Dated for Assignment {
    fn due_date(&self) -> Option<NaiveDateTime> {
        self.due_date
    }
}

impl Dated for AssignmentView {
    fn due_date(&self) -> Option<NaiveDateTime> {
        self.assignment.due_date
    }
}

impl Dated for NaiveDateTime {
    fn due_date(&self) -> Option<NaiveDateTime> {
        Some(*self)
    }
}

/// Items due in `[from, from + window_days]`, earliest first. Ties keep input
/// order; undated items never match. A window reaching past the calendar's
/// end is open-ended, and a negative one matches nothing.
pub fn due_within<T: Dated>(items: &[T], from: NaiveDateTime, window_days: i64) -> Vec<&T> {
    let until = Duration::try_days(window_days)
        .and_then(|window| from.checked_add_signed(window))
        .unwrap_or(if window_days < 0 { NaiveDateTime::MIN } else { NaiveDateTime::MAX });
    let mut due: Vec<(NaiveDateTime, &T)> = items
        .iter()
        .filter_map(|item| item.due_date().map(|date| (date, item)))
        .filter(|(date, _)| *date >= from && *date <= until)
        .collect();
    due.sort_by_key(|(date, _)| *date);
    due.into_iter().map(|(_, item)| item).collect()
}

/// The `limit` latest-due items; undated items come last.
pub fn recent_by_due_date<T: Dated>(items: &[T], limit: usize) -> Vec<&T> {
    let mut sorted: Vec<&T> = items.iter().collect();
    sorted.sort_by(|a, b| b.due_date().cmp(&a.due_date()));
    sorted.truncate(limit);
    sorted
}

/// The `limit` most recently recorded grades, highest id first.
pub fn recent_grades(grades: &[GradeView], limit: usize) -> Vec<&GradeView> {
    let mut sorted: Vec<&GradeView> = grades.iter().collect();
    sorted.sort_by(|a, b| b.grade.id.cmp(&a.grade.id));
    sorted.truncate(limit);
    sorted
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPerformance {
    pub subject_id: i64,
    pub subject: String,
    pub average_grade: Option<LetterGrade>,
    pub pass_rate: PassRate,
    pub graded_count: usize,
}

impl SubjectPerformance {
    pub fn average_grade_label(&self) -> &'static str {
        self.average_grade.map_or(NOT_AVAILABLE, LetterGrade::as_str)
    }
}

/// Per-subject average letter grade and pass rate, ordered by subject id.
pub fn subject_performance(grades: &[GradeView]) -> Vec<SubjectPerformance> {
    let mut by_subject: BTreeMap<i64, (String, Vec<f64>)> = BTreeMap::new();
    for view in grades {
        let entry = by_subject
            .entry(view.subject.id)
            .or_insert_with(|| (view.subject.name.clone(), Vec::new()));
        if let Some(score) = view.grade.score {
            entry.1.push(score);
        }
    }
    by_subject
        .into_iter()
        .map(|(subject_id, (subject, scores))| SubjectPerformance {
            subject_id,
            subject,
            average_grade: mean(&scores).map(score_to_letter_grade),
            pass_rate: pass_rate(&scores, SUBJECT_PERFORMANCE_PASS_THRESHOLD),
            graded_count: scores.len(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGpa {
    pub student_id: i64,
    pub name: String,
    pub group: String,
    pub level: String,
    pub gpa: Option<f64>,
}

impl StudentGpa {
    pub fn gpa_label(&self) -> String {
        self.gpa
            .map_or_else(|| NOT_AVAILABLE.to_string(), |gpa| format!("{gpa:.1}"))
    }
}

/// GPA of each student's mean score; `None` for students with no scores.
pub fn student_gpas(students: &[StudentView], grades: &[GradeView]) -> Vec<StudentGpa> {
    let mut by_student: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for view in grades {
        if let Some(score) = view.grade.score {
            by_student.entry(view.grade.student.id).or_default().push(score);
        }
    }
    students
        .iter()
        .map(|view| StudentGpa {
            student_id: view.student.id,
            name: view.name(),
            group: view.group.name.clone(),
            level: view.level.name.clone(),
            gpa: by_student
                .get(&view.student.id)
                .and_then(|scores| mean(scores))
                .map(score_to_gpa),
        })
        .collect()
}

/// GPA of the mean score across all items.
pub fn overall_gpa<T: Scored>(items: &[T]) -> Option<f64> {
    average_score(items).gpa()
}

/// Mean of the per-item GPAs.
pub fn mean_gpa<T: Scored>(items: &[T]) -> Option<f64> {
    let gpas: Vec<f64> = scores(items).into_iter().map(score_to_gpa).collect();
    mean(&gpas)
}

/// Count per status, every status present.
pub fn status_counts<'a>(
    assignments: impl IntoIterator<Item = &'a Assignment>,
) -> BTreeMap<AssignmentStatus, usize> {
    let mut counts: BTreeMap<AssignmentStatus, usize> =
        AssignmentStatus::ALL.iter().map(|status| (*status, 0)).collect();
    for assignment in assignments {
        *counts.entry(assignment.status).or_default() += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Entity;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, d)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .unwrap()
    }

    #[test]
    fn gpa_and_letter_stay_in_lock_step_at_boundaries() {
        let cases = [
            (100.0, 4.0, LetterGrade::A),
            (90.0, 4.0, LetterGrade::A),
            (89.99, 3.0, LetterGrade::B),
            (80.0, 3.0, LetterGrade::B),
            (79.5, 2.0, LetterGrade::C),
            (70.0, 2.0, LetterGrade::C),
            (60.0, 1.0, LetterGrade::D),
            (59.0, 0.0, LetterGrade::F),
            (0.0, 0.0, LetterGrade::F),
        ];
        for (score, gpa, letter) in cases {
            assert_eq!(score_to_gpa(score), gpa, "gpa for {score}");
            assert_eq!(score_to_letter_grade(score), letter, "letter for {score}");
        }
    }

    #[test]
    fn top_band_covers_ninety_through_hundred() {
        for score in 90..=100 {
            assert_eq!(score_to_gpa(f64::from(score)), 4.0);
            assert_eq!(score_to_letter_grade(f64::from(score)), LetterGrade::A);
        }
    }

    #[test]
    fn average_is_sentinel_when_empty() {
        assert_eq!(average_score::<f64>(&[]), AverageScore::NotAvailable);
        assert_eq!(average_score::<f64>(&[]).to_string(), "N/A");
        assert_eq!(average_score(&[80.0, 90.0]), AverageScore::Value(85.0));
        assert_eq!(average_score(&[80.0, 90.0]).to_string(), "85.00");
    }

    #[test]
    fn pass_rate_rounds_half_away_from_zero() {
        assert_eq!(pass_rate(&[40.0, 60.0, 80.0], 50.0), PassRate(67));
        assert_eq!(pass_rate(&[40.0, 60.0, 80.0], 50.0).to_string(), "67%");
        assert_eq!(pass_rate(&[40.0, 60.0, 80.0], 60.0), PassRate(67));
        assert_eq!(pass_rate(&[40.0, 55.0, 80.0], 60.0), PassRate(33));
        assert_eq!(pass_rate(&[], 50.0).to_string(), "0%");
    }

    #[test]
    fn thresholds_disagree_at_fifty_five() {
        assert!(is_passing(55.0, GRADES_VIEW_PASS_THRESHOLD));
        assert!(!is_passing(55.0, SUBJECT_PERFORMANCE_PASS_THRESHOLD));
    }

    #[test]
    fn filter_excludes_unscored_from_pass_and_fail() {
        let grades = [
            Grade {
                score: Some(45.0),
                ..Grade::placeholder()
            },
            Grade {
                score: Some(50.0),
                ..Grade::placeholder()
            },
            Grade::placeholder(),
        ];
        assert_eq!(filter_grades(&grades, GradeFilter::All, 50.0).len(), 3);
        assert_eq!(filter_grades(&grades, GradeFilter::Passed, 50.0).len(), 1);
        assert_eq!(filter_grades(&grades, GradeFilter::Failed, 50.0).len(), 1);
        assert_eq!(GradeFilter::parse("Passed"), Some(GradeFilter::Passed));
    }

    #[test]
    fn due_within_sorts_ascending() {
        let dates = [day(5), day(1), day(3)];
        let due: Vec<NaiveDateTime> = due_within(&dates, day(1), 7).into_iter().copied().collect();
        assert_eq!(due, vec![day(1), day(3), day(5)]);
        assert_eq!(dates, [day(5), day(1), day(3)]);
    }

    #[test]
    fn due_within_window_is_inclusive() {
        let dates = [day(1), day(8), day(9)];
        let due: Vec<NaiveDateTime> = due_within(&dates, day(1), 7).into_iter().copied().collect();
        assert_eq!(due, vec![day(1), day(8)]);
        assert!(due_within(&dates, day(10), 7).is_empty());
    }

    #[test]
    fn due_within_saturates_oversized_windows() {
        let dates = [day(9), day(1)];
        let due: Vec<NaiveDateTime> = due_within(&dates, day(1), 1_000_000_000)
            .into_iter()
            .copied()
            .collect();
        assert_eq!(due, vec![day(1), day(9)]);
        assert_eq!(due_within(&dates, day(1), i64::MAX).len(), 2);
        assert!(due_within(&dates, day(2), i64::MIN).is_empty());
        assert!(due_within(&dates, day(2), -3).is_empty());
    }

    #[test]
    fn recent_by_due_date_puts_undated_last() {
        let mut undated = Assignment::placeholder();
        undated.id = 9;
        let mut early = undated.clone();
        early.id = 1;
        early.due_date = Some(day(2));
        let mut late = undated.clone();
        late.id = 2;
        late.due_date = Some(day(20));
        let items = [undated, early, late];
        let ids: Vec<i64> = recent_by_due_date(&items, 3).iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![2, 1, 9]);
        assert_eq!(recent_by_due_date(&items, 1).len(), 1);
    }

    #[test]
    fn gpa_aggregates_differ_by_method() {
        let scores = [95.0, 65.0];
        assert_eq!(overall_gpa(&scores), Some(3.0));
        assert_eq!(mean_gpa(&scores), Some(2.5));
        assert_eq!(overall_gpa::<f64>(&[]), None);
    }

    #[test]
    fn status_counts_include_every_status() {
        let mut submitted = Assignment::placeholder();
        submitted.status = AssignmentStatus::Submitted;
        let counts = status_counts(&[submitted.clone(), submitted]);
        assert_eq!(counts[&AssignmentStatus::Submitted], 2);
        assert_eq!(counts[&AssignmentStatus::NotStarted], 0);
        assert_eq!(counts.len(), 4);
    }
}
