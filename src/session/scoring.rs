// src/session/scoring.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::report::{ProblemOutcome, QuestionOutcome};

/// How coding marks are awarded per problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringPolicy {
    /// floor(marks * passed / total)
    Proportional,
    /// Full marks iff every test case passed.
    AllOrNothing,
}

impl ScoringPolicy {
    /// Unknown strings fall back to the default policy.
    pub fn parse(s: &str) -> Self {
        match s {
            "all_or_nothing" => ScoringPolicy::AllOrNothing,
            _ => ScoringPolicy::Proportional,
        }
    }
}

/// The answer key of one quiz question.
#[derive(Debug, Clone)]
pub struct QuestionKey {
    pub id: i64,
    pub correct_option: String,
    pub marks: i32,
}

/// A graded quiz attempt.
#[derive(Debug, Serialize)]
pub struct QuizScore {
    pub score: i32,
    pub total_marks: i32,
    pub percentage: f64,
    pub correct_answers: usize,
    pub total_questions: usize,
    pub breakdown: Vec<QuestionOutcome>,
}

/// Grades a quiz: a question is correct iff the latest saved answer equals
/// the configured correct option id, compared verbatim.
pub fn score_quiz(questions: &[QuestionKey], answers: &HashMap<i64, String>) -> QuizScore {
    let mut score = 0;
    let mut total_marks = 0;
    let mut correct_answers = 0;
    let mut breakdown = Vec::with_capacity(questions.len());

    for q in questions {
        total_marks += q.marks;
        let selected = answers.get(&q.id);
        let correct = selected.is_some_and(|s| s == &q.correct_option);
        if correct {
            score += q.marks;
            correct_answers += 1;
        }
        breakdown.push(QuestionOutcome {
            question_id: q.id,
            selected_option: selected.cloned(),
            correct_option: q.correct_option.clone(),
            correct,
            marks: q.marks,
        });
    }

    QuizScore {
        score,
        total_marks,
        percentage: percentage(score, total_marks),
        correct_answers,
        total_questions: questions.len(),
        breakdown,
    }
}

/// A coding problem's identity and weight for grading.
#[derive(Debug, Clone)]
pub struct ProblemKey {
    pub id: i64,
    pub title: String,
    pub marks: i32,
}

/// The judged outcome of one code submission.
#[derive(Debug, Clone)]
pub struct SubmissionStat {
    pub problem_id: i64,
    pub passed_count: i32,
    pub total_count: i32,
    pub submitted_at: DateTime<Utc>,
}

/// A graded coding attempt.
#[derive(Debug, Serialize)]
pub struct CodingScore {
    pub score: i32,
    pub total_marks: i32,
    pub percentage: f64,
    pub problems: Vec<ProblemOutcome>,
}

/// Picks the best submission per problem: maximum passed_count, ties broken
/// by most recent submission.
pub fn best_per_problem(submissions: &[SubmissionStat]) -> HashMap<i64, SubmissionStat> {
    let mut best: HashMap<i64, SubmissionStat> = HashMap::new();
    for sub in submissions {
        match best.get(&sub.problem_id) {
            Some(current)
                if (current.passed_count, current.submitted_at)
                    >= (sub.passed_count, sub.submitted_at) => {}
            _ => {
                best.insert(sub.problem_id, sub.clone());
            }
        }
    }
    best
}

/// Grades a coding attempt. A problem with no submissions contributes zero
/// and is reported as not attempted, distinct from attempted-but-failed.
pub fn score_coding(
    problems: &[ProblemKey],
    submissions: &[SubmissionStat],
    policy: ScoringPolicy,
) -> CodingScore {
    let best = best_per_problem(submissions);

    let mut score = 0;
    let mut total_marks = 0;
    let mut outcomes = Vec::with_capacity(problems.len());

    for p in problems {
        total_marks += p.marks;
        let stat = best.get(&p.id);
        let (attempted, passed, total) = match stat {
            Some(s) => (true, s.passed_count, s.total_count),
            None => (false, 0, 0),
        };
        let solved = attempted && total > 0 && passed == total;
        let awarded = match policy {
            ScoringPolicy::AllOrNothing => {
                if solved {
                    p.marks
                } else {
                    0
                }
            }
            ScoringPolicy::Proportional => {
                if total > 0 {
                    ((i64::from(p.marks) * i64::from(passed)) / i64::from(total)) as i32
                } else {
                    0
                }
            }
        };
        score += awarded;
        outcomes.push(ProblemOutcome {
            problem_id: p.id,
            title: p.title.clone(),
            attempted,
            solved,
            passed_test_cases: passed,
            total_test_cases: total,
            awarded_marks: awarded,
        });
    }

    CodingScore {
        score,
        total_marks,
        percentage: percentage(score, total_marks),
        problems: outcomes,
    }
}

pub fn percentage(score: i32, total_marks: i32) -> f64 {
    if total_marks == 0 {
        return 0.0;
    }
    (f64::from(score) / f64::from(total_marks)) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn keys(n: i64) -> Vec<QuestionKey> {
        (1..=n)
            .map(|id| QuestionKey {
                id,
                correct_option: "a".to_string(),
                marks: 1,
            })
            .collect()
    }

    #[test]
    fn three_of_five_is_sixty_percent() {
        let questions = keys(5);
        let mut answers = HashMap::new();
        answers.insert(1, "a".to_string());
        answers.insert(2, "a".to_string());
        answers.insert(3, "a".to_string());
        answers.insert(4, "b".to_string());
        // question 5 unanswered

        let result = score_quiz(&questions, &answers);
        assert_eq!(result.score, 3);
        assert_eq!(result.correct_answers, 3);
        assert_eq!(result.percentage, 60.0);
    }

    #[test]
    fn option_ids_match_verbatim_not_case_insensitively() {
        let questions = keys(1);
        let mut answers = HashMap::new();
        answers.insert(1, "A".to_string());
        assert_eq!(score_quiz(&questions, &answers).score, 0);
    }

    #[test]
    fn unanswered_question_appears_in_breakdown() {
        let result = score_quiz(&keys(1), &HashMap::new());
        assert_eq!(result.breakdown.len(), 1);
        assert!(result.breakdown[0].selected_option.is_none());
        assert!(!result.breakdown[0].correct);
    }

    #[test]
    fn weighted_marks_sum_correctly() {
        let questions = vec![
            QuestionKey {
                id: 1,
                correct_option: "a".to_string(),
                marks: 2,
            },
            QuestionKey {
                id: 2,
                correct_option: "b".to_string(),
                marks: 3,
            },
        ];
        let mut answers = HashMap::new();
        answers.insert(2, "b".to_string());

        let result = score_quiz(&questions, &answers);
        assert_eq!(result.score, 3);
        assert_eq!(result.total_marks, 5);
        assert_eq!(result.percentage, 60.0);
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn stat(problem_id: i64, passed: i32, total: i32, offset_mins: i64) -> SubmissionStat {
        SubmissionStat {
            problem_id,
            passed_count: passed,
            total_count: total,
            submitted_at: t0() + Duration::minutes(offset_mins),
        }
    }

    #[test]
    fn best_submission_takes_highest_passed() {
        let subs = vec![stat(1, 2, 5, 0), stat(1, 4, 5, 1), stat(1, 3, 5, 2)];
        let best = best_per_problem(&subs);
        assert_eq!(best[&1].passed_count, 4);
    }

    #[test]
    fn best_submission_ties_break_by_recency() {
        let subs = vec![stat(1, 3, 5, 0), stat(1, 3, 5, 10)];
        let best = best_per_problem(&subs);
        assert_eq!(best[&1].submitted_at, t0() + Duration::minutes(10));
    }

    #[test]
    fn not_attempted_is_distinct_from_failed() {
        let problems = vec![
            ProblemKey {
                id: 1,
                title: "untouched".to_string(),
                marks: 10,
            },
            ProblemKey {
                id: 2,
                title: "failed".to_string(),
                marks: 10,
            },
        ];
        let subs = vec![stat(2, 0, 5, 0)];

        let result = score_coding(&problems, &subs, ScoringPolicy::Proportional);
        let untouched = &result.problems[0];
        let failed = &result.problems[1];

        assert!(!untouched.attempted);
        assert_eq!(untouched.passed_test_cases, 0);
        assert!(failed.attempted);
        assert_eq!(failed.passed_test_cases, 0);
    }

    #[test]
    fn proportional_policy_awards_partial_marks() {
        let problems = vec![ProblemKey {
            id: 1,
            title: "p".to_string(),
            marks: 10,
        }];
        let subs = vec![stat(1, 3, 5, 0)];
        let result = score_coding(&problems, &subs, ScoringPolicy::Proportional);
        assert_eq!(result.score, 6);
    }

    #[test]
    fn all_or_nothing_requires_full_pass() {
        let problems = vec![ProblemKey {
            id: 1,
            title: "p".to_string(),
            marks: 10,
        }];

        let partial = score_coding(&problems, &[stat(1, 4, 5, 0)], ScoringPolicy::AllOrNothing);
        assert_eq!(partial.score, 0);

        let full = score_coding(&problems, &[stat(1, 5, 5, 0)], ScoringPolicy::AllOrNothing);
        assert_eq!(full.score, 10);
        assert!(full.problems[0].solved);
    }

    #[test]
    fn empty_quiz_scores_zero_percent() {
        let result = score_quiz(&[], &HashMap::new());
        assert_eq!(result.percentage, 0.0);
    }
}
