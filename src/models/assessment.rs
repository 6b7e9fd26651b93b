// src/models/assessment.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// Assessment kind discriminator values stored in `assessments.kind`.
pub const KIND_QUIZ: &str = "quiz";
pub const KIND_CODING: &str = "coding";

/// Represents the 'assessments' table in the database.
///
/// Timing configuration: `start_date`/`end_date` bound when the assessment is
/// reachable at all; `duration_minutes` bounds a single attempt once started.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Assessment {
    pub id: i64,
    pub name: String,

    /// Owning branch/department scope (e.g., 'CSE').
    pub branch: String,

    /// 'quiz' or 'coding'.
    pub kind: String,

    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
    pub duration_minutes: Option<i32>,

    /// Coding marks policy: 'proportional' or 'all_or_nothing'.
    pub scoring_policy: String,

    pub is_active: bool,
    pub created_by: Option<i64>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// One selectable option of a quiz question.
/// Grading compares option ids verbatim, never indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: String,
    pub text: String,
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub assessment_id: i64,
    pub content: String,

    /// Stored as a JSON array in the database.
    pub options: Json<Vec<AnswerOption>>,

    /// Id of the correct option.
    pub correct_option: String,

    pub marks: i32,
    pub position: i32,
}

/// DTO for sending a question to the student (excludes the answer key).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub content: String,
    pub options: Json<Vec<AnswerOption>>,
    pub marks: i32,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        PublicQuestion {
            id: q.id,
            content: q.content,
            options: q.options,
            marks: q.marks,
        }
    }
}

/// Represents the 'coding_problems' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CodingProblem {
    pub id: i64,
    pub assessment_id: i64,
    pub title: String,
    pub description: String,
    pub marks: i32,
    pub position: i32,
}

/// Represents the 'test_cases' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TestCase {
    pub id: i64,
    pub problem_id: i64,
    pub input: String,
    pub expected_output: String,

    /// Hidden cases still count towards scoring but their data is withheld
    /// from student-facing views.
    pub is_hidden: bool,

    pub position: i32,
}

/// DTO for a sample (non-hidden) test case shown to the student.
#[derive(Debug, Serialize)]
pub struct SampleTestCase {
    pub id: i64,
    pub input: String,
    pub expected_output: String,
}

/// DTO for a coding problem with its sample test cases attached.
#[derive(Debug, Serialize)]
pub struct PublicProblem {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub marks: i32,
    pub sample_test_cases: Vec<SampleTestCase>,
}

/// DTO for creating a new assessment.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAssessmentRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 50))]
    #[serde(default)]
    pub branch: String,
    pub kind: String,
    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: Option<i32>,
    pub scoring_policy: Option<String>,
}

/// DTO for updating an assessment. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateAssessmentRequest {
    pub name: Option<String>,
    pub branch: Option<String>,
    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
    pub duration_minutes: Option<i32>,
    pub scoring_policy: Option<String>,
    pub is_active: Option<bool>,
}

/// DTO for creating a new quiz question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<AnswerOption>,
    #[validate(length(min = 1, max = 100))]
    pub correct_option: String,
    #[validate(range(min = 1, max = 100))]
    pub marks: i32,
    #[serde(default)]
    pub position: i32,
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize)]
pub struct UpdateQuestionRequest {
    pub content: Option<String>,
    pub options: Option<Vec<AnswerOption>>,
    pub correct_option: Option<String>,
    pub marks: Option<i32>,
    pub position: Option<i32>,
}

/// DTO for a test case supplied while authoring a coding problem.
#[derive(Debug, Deserialize)]
pub struct CreateTestCaseRequest {
    #[serde(default)]
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub is_hidden: bool,
}

/// DTO for creating a coding problem together with its test cases.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProblemRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[validate(range(min = 0, max = 100))]
    pub marks: i32,
    #[serde(default)]
    pub position: i32,
    pub test_cases: Vec<CreateTestCaseRequest>,
}

fn validate_options(options: &[AnswerOption]) -> Result<(), validator::ValidationError> {
    if options.len() < 2 {
        return Err(validator::ValidationError::new("at_least_two_options"));
    }
    for opt in options {
        if opt.id.is_empty() || opt.id.len() > 100 {
            return Err(validator::ValidationError::new("bad_option_id"));
        }
        if opt.text.len() > 1000 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}
