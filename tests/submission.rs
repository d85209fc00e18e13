// tests/submission.rs

mod common;

use common::*;
use questionnaire::{
    engine::error::QuizError,
    models::{
        answer_record::{AnswerInput, AutoScore},
        question::QuestionType,
        session::{Session, SessionStatus},
    },
    store::Store,
};

async fn assert_final_score_is_sum(h: &Harness, session: &Session) {
    let session = h.store.session_by_id(session.id).await.unwrap().unwrap();
    let records = h.store.answer_records_for_session(session.id).await.unwrap();
    let sum: i32 = records.iter().map(|r| r.final_score).sum();
    assert_eq!(session.final_score, sum);
}

fn mixed_bank() -> Vec<questionnaire::models::question::Question> {
    vec![
        question(1, QuestionType::SingleChoice, Some("A"), &["Paris", "London", "Rome"], 5),
        question(2, QuestionType::MultipleChoice, Some("A,C"), &["Red", "Green", "Blue"], 4),
        question(3, QuestionType::FillBlank, Some("3.0"), &[], 3),
        question(4, QuestionType::Essay, None, &[], 10),
        question(5, QuestionType::Rating, Some("C"), &["Poor", "Fair", "Good"], 2),
    ]
}

async fn start_all(h: &Harness) -> Session {
    h.services
        .sessions
        .start(USER, &[1, 2, 3, 4, 5], 5, Some(30))
        .await
        .unwrap()
}

#[tokio::test]
async fn submissions_are_graded_and_totalled() {
    let h = harness(mixed_bank());
    let session = start_all(&h).await;
    let code = &session.session_code;
    let submit = |id: i64, answer: &'static str| {
        let services = h.services.clone();
        let code = code.clone();
        async move {
            services
                .submissions
                .submit(&code, USER, &AnswerInput::new(id, answer, 10))
                .await
                .unwrap()
        }
    };

    let single = submit(1, "paris").await;
    assert_eq!((single.is_correct, single.auto_score), (Some(true), 5));
    assert_eq!(single.sequence_number, 1);

    let multi = submit(2, "C,A").await;
    assert_eq!((multi.is_correct, multi.auto_score), (Some(true), 4));

    let blank = submit(3, "3.1").await;
    assert_eq!((blank.is_correct, blank.auto_score), (Some(false), 0));

    let essay = submit(4, "A long argument").await;
    assert_eq!((essay.is_correct, essay.auto_score), (None, 0));
    assert_eq!(essay.manual_score, None);

    let rating = submit(5, "good").await;
    assert_eq!((rating.is_correct, rating.auto_score), (Some(true), 2));
    assert_eq!(rating.sequence_number, 5);

    let updated = h.store.session_by_id(session.id).await.unwrap().unwrap();
    assert_eq!(updated.auto_score, 11);
    assert_eq!(updated.final_score, 11);
    assert_final_score_is_sum(&h, &session).await;
}

#[tokio::test]
async fn answer_list_is_joined_for_multi_select() {
    let h = harness(mixed_bank());
    let session = start_all(&h).await;

    let input = AnswerInput {
        question_id: 2,
        user_answer: None,
        user_answer_list: Some(vec!["Blue".to_string(), "A".to_string()]),
        time_spent_seconds: 3,
    };
    let record = h
        .services
        .submissions
        .submit(&session.session_code, USER, &input)
        .await
        .unwrap();
    assert_eq!(record.user_answer, "Blue,A");
    assert_eq!(record.is_correct, Some(true));
}

#[tokio::test]
async fn resubmission_returns_the_stored_record() {
    let h = harness(mixed_bank());
    let session = start_all(&h).await;
    let code = &session.session_code;

    let first = h
        .services
        .submissions
        .submit(code, USER, &AnswerInput::new(1, "A", 12))
        .await
        .unwrap();
    let second = h
        .services
        .submissions
        .submit(code, USER, &AnswerInput::new(1, "B", 40))
        .await
        .unwrap();

    assert_eq!(first, second);
    let records = h.services.submissions.records_for_session(code, USER).await.unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn concurrent_duplicates_create_one_record() {
    let h = harness(mixed_bank());
    let session = start_all(&h).await;
    let code = session.session_code.clone();

    let input = AnswerInput::new(3, "3", 5);
    let (a, b) = tokio::join!(
        h.services.submissions.submit(&code, USER, &input),
        h.services.submissions.submit(&code, USER, &input),
    );
    assert_eq!(a.unwrap(), b.unwrap());

    let records = h.store.answer_records_for_session(session.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_final_score_is_sum(&h, &session).await;
}

#[tokio::test]
async fn records_keep_the_question_as_answered() {
    let h = harness(mixed_bank());
    let session = start_all(&h).await;
    let code = &session.session_code;

    let record = h
        .services
        .submissions
        .submit(code, USER, &AnswerInput::new(1, "Paris", 5))
        .await
        .unwrap();
    assert_eq!(record.question_content, "Question 1\nBody of question 1");
    assert_eq!(record.correct_answer.as_deref(), Some("A"));
    assert_eq!(record.max_score, 5);

    // The bank changes its mind about question 1.
    let mut edited = question(1, QuestionType::SingleChoice, Some("B"), &["Paris", "London", "Rome"], 50);
    edited.title = "Edited".to_string();
    h.catalog.upsert(edited).await;

    let changed = h.services.submissions.batch_auto_score(session.id).await.unwrap();
    assert_eq!(changed, 0);

    let records = h.services.submissions.records_for_session(code, USER).await.unwrap();
    assert_eq!(records[0].question_content, "Question 1\nBody of question 1");
    assert_eq!(records[0].is_correct, Some(true));
    assert_eq!(records[0].auto_score, 5);
}

#[tokio::test]
async fn submission_checks() {
    let h = harness(mixed_bank());
    let session = start_all(&h).await;
    let code = &session.session_code;
    let submissions = &h.services.submissions;

    assert!(matches!(
        submissions.submit(code, OTHER_USER, &AnswerInput::new(1, "A", 1)).await,
        Err(QuizError::PermissionDenied { .. })
    ));
    assert!(matches!(
        submissions.submit(code, USER, &AnswerInput::new(999, "A", 1)).await,
        Err(QuizError::QuestionNotFound(999))
    ));
    assert!(matches!(
        submissions.submit("S-nope", USER, &AnswerInput::new(1, "A", 1)).await,
        Err(QuizError::SessionNotFound(_))
    ));
    assert!(matches!(
        submissions.submit(code, USER, &AnswerInput::new(1, "A", -1)).await,
        Err(QuizError::InvalidArgument(_))
    ));

    h.services.sessions.finish(code, USER).await.unwrap();
    assert!(matches!(
        submissions.submit(code, USER, &AnswerInput::new(1, "A", 1)).await,
        Err(QuizError::SessionFinished { status: SessionStatus::Completed })
    ));
}

#[tokio::test]
async fn unknown_type_in_the_bank_is_a_configuration_error() {
    let mut bank = mixed_bank();
    let mut broken = question(77, QuestionType::SingleChoice, Some("A"), &["x"], 1);
    broken.question_type = 9;
    bank.push(broken);
    let h = harness(bank);
    let session = start_all(&h).await;

    let err = h
        .services
        .submissions
        .submit(&session.session_code, USER, &AnswerInput::new(77, "A", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, QuizError::UnsupportedQuestionType(9)));
    assert!(h.store.answer_records_for_session(session.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn batch_submission_is_checked_up_front() {
    let h = harness(mixed_bank());
    let session = start_all(&h).await;
    let code = &session.session_code;

    let err = h
        .services
        .submissions
        .submit_batch(
            code,
            USER,
            &[AnswerInput::new(1, "A", 1), AnswerInput::new(404, "A", 1)],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, QuizError::QuestionNotFound(404)));
    assert!(h.store.answer_records_for_session(session.id).await.unwrap().is_empty());

    let records = h
        .services
        .submissions
        .submit_batch(
            code,
            USER,
            &[
                AnswerInput::new(2, "A,C", 1),
                AnswerInput::new(1, "B", 1),
                AnswerInput::new(2, "B", 1),
            ],
        )
        .await
        .unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0], records[2]);
    assert_eq!(
        records.iter().map(|r| r.sequence_number).collect::<Vec<_>>(),
        vec![1, 2, 1]
    );
    assert_final_score_is_sum(&h, &session).await;

    assert!(matches!(
        h.services.submissions.submit_batch(code, USER, &[]).await,
        Err(QuizError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn next_question_walks_the_assigned_set() {
    let h = harness(single_choices(1, 3));
    let session = h.services.sessions.start(USER, &[1], 3, None).await.unwrap();
    let code = &session.session_code;

    let mut seen = Vec::new();
    for _ in 0..3 {
        let next = h.services.submissions.next_question(code, USER).await.unwrap();
        assert!(session.question_ids.0.contains(&next.id));
        assert!(!seen.contains(&next.id));
        seen.push(next.id);
        h.services
            .submissions
            .submit(code, USER, &AnswerInput::new(next.id, "A", 1))
            .await
            .unwrap();
    }

    let err = h.services.submissions.next_question(code, USER).await.unwrap_err();
    assert!(matches!(err, QuizError::AllQuestionsCompleted { answered: 3, total: 3 }));
}

#[tokio::test]
async fn next_question_reports_vanished_questions() {
    let h = harness(single_choices(1, 2));
    let session = h.services.sessions.start(USER, &[1], 2, None).await.unwrap();
    h.catalog.remove(1).await;
    h.catalog.remove(2).await;

    let err = h
        .services
        .submissions
        .next_question(&session.session_code, USER)
        .await
        .unwrap_err();
    assert!(matches!(err, QuizError::NoMoreQuestions));
}

#[tokio::test]
async fn batch_auto_score_repairs_drifted_records() {
    let h = harness(mixed_bank());
    let session = start_all(&h).await;
    let record = h
        .services
        .submissions
        .submit(&session.session_code, USER, &AnswerInput::new(1, "A", 1))
        .await
        .unwrap();

    // Simulate a record written by an older grading rule.
    let drifted = AutoScore { record_id: record.id, is_correct: Some(false), auto_score: 0 };
    let stale = h.store.rescore_records(session.id, &[drifted]).await.unwrap();
    assert_eq!(stale.final_score, 0);

    let changed = h.services.submissions.batch_auto_score(session.id).await.unwrap();
    assert_eq!(changed, 1);
    let session = h.store.session_by_id(session.id).await.unwrap().unwrap();
    assert_eq!(session.auto_score, 5);
    assert_eq!(session.final_score, 5);

    assert!(matches!(
        h.services.submissions.batch_auto_score(12345).await,
        Err(QuizError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn answers_outside_the_assigned_set_are_recorded() {
    let h = harness(single_choices(1, 3));
    let session = h.services.sessions.start(USER, &[1], 2, None).await.unwrap();
    let stray = (1..=3)
        .find(|id| !session.question_ids.0.contains(id))
        .unwrap();

    let record = h
        .services
        .submissions
        .submit(&session.session_code, USER, &AnswerInput::new(stray, "A", 2))
        .await
        .unwrap();
    assert_eq!(record.question_id, stray);
    assert_eq!(record.auto_score, 5);
    assert_final_score_is_sum(&h, &session).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn answers_racing_a_finish_never_land_after_it() {
    let h = harness(single_choices(1, 40));

    for _ in 0..20 {
        let session = h.services.sessions.start(USER, &[1], 2, None).await.unwrap();
        let code = session.session_code.clone();
        let question_id = session.question_ids.0[0];

        let submissions = h.services.submissions.clone();
        let submit_code = code.clone();
        let submit = tokio::spawn(async move {
            submissions
                .submit(&submit_code, USER, &AnswerInput::new(question_id, "A", 1))
                .await
        });
        let sessions = h.services.sessions.clone();
        let finish = tokio::spawn(async move { sessions.finish(&code, USER).await });

        let submitted = submit.await.unwrap();
        let finished = finish.await.unwrap().unwrap();
        assert_eq!(finished.status, SessionStatus::Completed);
        let stored = h.store.answer_records_for_session(session.id).await.unwrap();

        match submitted {
            Ok(record) => assert_eq!(stored, vec![record]),
            Err(err) => {
                assert!(matches!(err, QuizError::SessionFinished { status: SessionStatus::Completed }));
                assert!(stored.is_empty());
            }
        }
        assert_final_score_is_sum(&h, &session).await;
    }
}

#[tokio::test]
async fn answer_stats_and_record_detail() {
    let h = harness(mixed_bank());
    let session = start_all(&h).await;
    let code = &session.session_code;
    let records = h
        .services
        .submissions
        .submit_batch(
            code,
            USER,
            &[AnswerInput::new(1, "A", 5), AnswerInput::new(4, "An essay", 60)],
        )
        .await
        .unwrap();

    let stats = h.services.submissions.answer_stats(code, USER).await.unwrap();
    assert_eq!(stats.total_count, 2);
    assert_eq!(stats.subjective_count, 1);
    assert_eq!(stats.scored_count, 0);
    assert_eq!(stats.total_score, 5);
    assert!(matches!(
        h.services.submissions.answer_stats(code, OTHER_USER).await,
        Err(QuizError::PermissionDenied { .. })
    ));
    assert!(matches!(
        h.services.submissions.answer_stats_by_id(4242).await,
        Err(QuizError::SessionNotFound(_))
    ));

    let detail = h.services.submissions.record_detail(records[1].id).await.unwrap();
    assert_eq!(detail.record, records[1]);
    assert!(detail.scoring_records.is_empty());
    assert!(matches!(
        h.services.submissions.record_detail(4242).await,
        Err(QuizError::AnswerRecordNotFound(4242))
    ));
}
