use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::answer::{Answer, UNANSWERED};
use crate::models::question::Question;
use crate::models::result::{QuestionOutcome, SessionResult};
use crate::models::session::SubmissionType;

pub struct ScoringService;

impl ScoringService {
    pub fn score(
        session_id: Uuid,
        questions: &[Question],
        answers: &[Answer],
        passing_percentage: i32,
        submission_type: SubmissionType,
        computed_at: DateTime<Utc>,
    ) -> SessionResult {
        // later entries overwrite earlier ones for the same question
        let lookup: HashMap<Uuid, &Answer> = answers.iter().map(|a| (a.question_id, a)).collect();

        let mut score = 0;
        let mut total_time: i32 = 0;
        let mut breakdown = Vec::with_capacity(questions.len());

        for q in questions {
            let (selected, time_spent) = lookup
                .get(&q.id)
                .map(|a| (a.selected_answer, a.time_spent_seconds))
                .unwrap_or((UNANSWERED, 0));

            let correct_index = q.correct_index();
            if correct_index.is_none() {
                tracing::warn!(question_id = %q.id, "Stored correct answer matches no option");
            }
            let is_correct = selected >= 0 && correct_index == Some(selected as usize);
            if is_correct {
                score += 1;
            }
            total_time = total_time.saturating_add(time_spent.max(0));

            breakdown.push(QuestionOutcome {
                question_id: q.id,
                selected_answer: selected,
                time_spent_seconds: time_spent,
                is_correct,
                correct_answer: correct_index.map(|i| i as i32).unwrap_or(UNANSWERED),
                explanation: q.explanation.clone(),
            });
        }

        let total = questions.len() as i32;
        let percentage = round_half_up_percentage(score, total);

        SessionResult {
            session_id,
            score,
            total_questions: total,
            percentage,
            passed: percentage >= passing_percentage,
            passing_percentage,
            submission_type,
            total_time_spent_seconds: total_time,
            breakdown,
            computed_at,
        }
    }
}

/// `round(score / total * 100)` with halves rounded up, in integer arithmetic.
pub fn round_half_up_percentage(score: i32, total: i32) -> i32 {
    if total <= 0 {
        return 0;
    }
    let (score, total) = (score as i64, total as i64);
    ((200 * score + total) / (2 * total)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test::DEFAULT_PASSING_PERCENTAGE;
    use chrono::TimeZone;

    fn bank(n: usize) -> Vec<Question> {
        let test_id = Uuid::new_v4();
        (0..n)
            .map(|i| Question {
                id: Uuid::new_v4(),
                test_id,
                text: format!("Question {}", i),
                options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
                correct_answer: "B".into(),
                explanation: Some(format!("Because of rule {}", i)),
                category: "logical".into(),
            })
            .collect()
    }

    fn answer(q: &Question, selected: i32) -> Answer {
        Answer {
            question_id: q.id,
            selected_answer: selected,
            time_spent_seconds: 12,
        }
    }

    fn run(questions: &[Question], answers: &[Answer]) -> SessionResult {
        ScoringService::score(
            Uuid::nil(),
            questions,
            answers,
            DEFAULT_PASSING_PERCENTAGE,
            SubmissionType::Manual,
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn four_of_ten_passes_at_forty() {
        let qs = bank(10);
        let answers: Vec<Answer> = qs
            .iter()
            .enumerate()
            .map(|(i, q)| answer(q, if i < 4 { 1 } else { 2 }))
            .collect();
        let result = run(&qs, &answers);
        assert_eq!(result.score, 4);
        assert_eq!(result.percentage, 40);
        assert!(result.passed);
        assert_eq!(result.total_time_spent_seconds, 120);
    }

    #[test]
    fn rounding_at_thirds_and_halves() {
        assert_eq!(round_half_up_percentage(1, 3), 33);
        assert_eq!(round_half_up_percentage(2, 3), 67);
        assert_eq!(round_half_up_percentage(1, 8), 13);
        assert_eq!(round_half_up_percentage(3, 8), 38);
        assert_eq!(round_half_up_percentage(1, 200), 1);
        assert_eq!(round_half_up_percentage(0, 0), 0);
    }

    #[test]
    fn unanswered_questions_score_incorrect() {
        let qs = bank(3);
        let result = run(&qs, &[answer(&qs[0], 1)]);
        assert_eq!(result.score, 1);
        assert_eq!(result.percentage, 33);
        assert!(!result.passed);
        let missing = &result.breakdown[2];
        assert_eq!(missing.selected_answer, UNANSWERED);
        assert!(!missing.is_correct);
        assert_eq!(missing.correct_answer, 1);
        assert_eq!(missing.time_spent_seconds, 0);
    }

    #[test]
    fn last_answer_for_a_question_wins() {
        let qs = bank(1);
        let result = run(&qs, &[answer(&qs[0], 1), answer(&qs[0], 3)]);
        assert_eq!(result.score, 0);
        assert_eq!(result.breakdown[0].selected_answer, 3);
    }

    #[test]
    fn unmatched_correct_text_never_scores() {
        let mut qs = bank(1);
        qs[0].correct_answer = "E".into();
        let result = run(&qs, &[answer(&qs[0], UNANSWERED)]);
        assert_eq!(result.score, 0);
        assert_eq!(result.breakdown[0].correct_answer, UNANSWERED);
    }

    #[test]
    fn out_of_range_selection_is_incorrect() {
        let qs = bank(1);
        let result = run(&qs, &[answer(&qs[0], 42)]);
        assert!(!result.breakdown[0].is_correct);
    }

    #[test]
    fn total_time_saturates_instead_of_wrapping() {
        let qs = bank(2);
        let answers: Vec<Answer> = qs
            .iter()
            .map(|q| Answer {
                question_id: q.id,
                selected_answer: 1,
                time_spent_seconds: i32::MAX,
            })
            .collect();
        let result = run(&qs, &answers);
        assert_eq!(result.total_time_spent_seconds, i32::MAX);
        assert_eq!(result.score, 2);
    }

    #[test]
    fn scoring_is_deterministic() {
        let qs = bank(7);
        let answers: Vec<Answer> = qs.iter().map(|q| answer(q, 1)).collect();
        assert_eq!(run(&qs, &answers), run(&qs, &answers));
    }

    #[test]
    fn explanations_are_released_in_breakdown() {
        let qs = bank(2);
        let result = run(&qs, &[]);
        assert_eq!(
            result.breakdown[1].explanation.as_deref(),
            Some("Because of rule 1")
        );
    }
}
