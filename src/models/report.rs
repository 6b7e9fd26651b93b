// src/models/report.rs

use serde::Serialize;

/// Per-question outcome inside a quiz report row.
#[derive(Debug, Serialize)]
pub struct QuestionOutcome {
    pub question_id: i64,
    pub selected_option: Option<String>,
    pub correct_option: String,
    pub correct: bool,
    pub marks: i32,
}

/// One row of the admin quiz report: a submitted attempt joined with
/// student identity fields. Pure read path, no side effects.
#[derive(Debug, Serialize)]
pub struct QuizReportRow {
    pub attempt_id: i64,
    pub student_id: i64,
    pub registration_number: String,
    pub name: String,
    pub section: String,
    pub score: i32,
    pub total_marks: i32,
    pub percentage: f64,
    pub time_spent_seconds: i64,
    pub tab_switches: i32,
    pub fullscreen_exits: i32,
    pub breakdown: Vec<QuestionOutcome>,
}

/// Per-problem outcome inside a coding report row.
/// `attempted` distinguishes "no submission at all" from "submitted, 0 passed".
#[derive(Debug, Serialize)]
pub struct ProblemOutcome {
    pub problem_id: i64,
    pub title: String,
    pub attempted: bool,
    pub solved: bool,
    pub passed_test_cases: i32,
    pub total_test_cases: i32,
    pub awarded_marks: i32,
}

/// One row of the admin coding report.
#[derive(Debug, Serialize)]
pub struct CodingReportRow {
    pub attempt_id: i64,
    pub student_id: i64,
    pub registration_number: String,
    pub name: String,
    pub section: String,
    pub score: i32,
    pub total_marks: i32,
    pub percentage: f64,
    pub time_spent_seconds: i64,
    pub tab_switches: i32,
    pub fullscreen_exits: i32,
    pub problems: Vec<ProblemOutcome>,
}
