use super::*;

#[test]
fn paths_follow_quiz_resource_layout() {
    assert_eq!(quiz_path(7), "/api/quizzes/7");
    assert_eq!(leaderboard_path(7), "/api/quizzes/7/leaderboard");
    assert_eq!(questions_path(7), "/api/quizzes/7/questions");
}

#[test]
fn leaderboard_rows_accept_mixed_id_types() {
    let body: LeaderboardResponse = serde_json::from_value(serde_json::json!({
        "leaderboard": [
            {"user_id": 5, "score": 90, "name": "Ada"},
            {"user_id": "42", "score": 85.5}
        ]
    }))
    .unwrap();
    assert_eq!(body.leaderboard.len(), 2);
    assert_eq!(body.leaderboard[0].user_id, UserKey::from(5));
    assert_eq!(body.leaderboard[1].user_id, UserKey::from(42));
    assert_eq!(body.leaderboard[1].name, None);
}

#[test]
fn missing_leaderboard_key_is_an_empty_board() {
    let body: LeaderboardResponse = serde_json::from_value(serde_json::json!({})).unwrap();
    assert!(body.leaderboard.is_empty());
}

#[test]
fn quiz_meta_tolerates_untimed_quizzes() {
    let timed: QuizMeta = serde_json::from_value(serde_json::json!({"duration": 20, "title": "Loops"})).unwrap();
    assert_eq!(timed.duration, Some(20));
    let untimed: QuizMeta = serde_json::from_value(serde_json::json!({"duration": null})).unwrap();
    assert_eq!(untimed.duration, None);
}

#[test]
fn questions_accept_question_text_alias() {
    let body: QuestionsResponse = serde_json::from_value(serde_json::json!({
        "questions": [{"id": 1, "question_text": "2 + 2?", "points": 1}]
    }))
    .unwrap();
    assert_eq!(body.questions[0].text, "2 + 2?");
    assert_eq!(body.questions[0].time_limit, None);
}

#[test]
fn client_builds_with_token_header() {
    let mut config = EngineConfig::new("http://127.0.0.1:8000").unwrap();
    config.auth_token = Some("abc".to_owned());
    assert!(HttpQuizApi::new(&config).is_ok());
}

#[test]
fn client_rejects_token_with_newline() {
    let mut config = EngineConfig::new("http://127.0.0.1:8000").unwrap();
    config.auth_token = Some("bad\ntoken".to_owned());
    assert!(matches!(HttpQuizApi::new(&config), Err(EngineError::InvalidHeader(_))));
}
