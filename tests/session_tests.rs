// tests/session_tests.rs

mod common;

use std::collections::HashMap;

use chrono::{Duration, Utc};
use common::{question_ids, spawn_app};
use serde_json::{Value, json};

#[tokio::test]
async fn unknown_path_is_404() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(format!("{}/random_path_that_does_not_exist", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn requests_without_bearer_token_are_rejected() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/attempts"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn worker_lists_own_attempts_with_effective_status() {
    let app = spawn_app().await;
    let (event_id, attempts) = app.create_event(&[1, 2], json!({})).await;

    let response = app
        .client
        .get(app.url("/attempts"))
        .bearer_auth(app.worker(1))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let listed: Vec<Value> = response.json().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], attempts[0]);
    assert_eq!(listed[0]["event_id"], event_id);
    // Stored as upcoming, but the schedule has passed.
    assert_eq!(listed[0]["status"], "open");
    assert_eq!(listed[0]["locked"], false);
}

#[tokio::test]
async fn entry_hides_answer_key_and_starts_attempt() {
    let app = spawn_app().await;
    let (event_id, attempts) = app.create_event(&[1], json!({})).await;
    let legacy = app.add_legacy_questions(event_id, 3).await;

    let response = app.enter(attempts[0], 1).await;
    assert_eq!(response.status().as_u16(), 200);

    let text = response.text().await.unwrap();
    assert!(!text.contains("is_correct"));

    let entry: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(entry["status"], "in_progress");
    assert_eq!(question_ids(&entry), legacy);
    assert_eq!(entry["resume"]["remaining_seconds"], 1800);
    assert_eq!(entry["resume"]["expired"], false);

    // Legacy events never get an assignment row.
    let assignments = app
        .count("SELECT COUNT(*) FROM assignments WHERE attempt_id = $1", attempts[0])
        .await;
    assert_eq!(assignments, 0);
}

#[tokio::test]
async fn reentry_keeps_start_time_and_returns_saved_answers() {
    let app = spawn_app().await;
    let (event_id, attempts) = app.create_event(&[1], json!({})).await;
    let legacy = app.add_legacy_questions(event_id, 2).await;

    let first: Value = app.enter(attempts[0], 1).await.json().await.unwrap();
    let option = app.option_for(legacy[1], true).await;
    assert_eq!(
        app.save_answer(attempts[0], 1, legacy[1], Some(option)).await.status().as_u16(),
        204
    );

    let progress = app
        .client
        .put(app.url(&format!("/attempts/{}/progress", attempts[0])))
        .bearer_auth(app.worker(1))
        .json(&json!({ "elapsed_seconds": 600, "last_active_page": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(progress.status().as_u16(), 204);

    let second: Value = app.enter(attempts[0], 1).await.json().await.unwrap();
    assert_eq!(first["started_at"], second["started_at"]);
    assert_eq!(second["resume"]["elapsed_seconds"], 600);
    assert_eq!(second["resume"]["last_active_page"], 1);
    assert_eq!(second["resume"]["remaining_seconds"], 1200);
    let answers = second["resume"]["answers"].as_array().unwrap();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0]["option_id"], option);
}

#[tokio::test]
async fn elapsed_time_never_moves_backwards() {
    let app = spawn_app().await;
    let (event_id, attempts) = app.create_event(&[1], json!({})).await;
    app.add_legacy_questions(event_id, 2).await;
    app.enter(attempts[0], 1).await;

    for elapsed in [300, 120] {
        let response = app
            .client
            .put(app.url(&format!("/attempts/{}/progress", attempts[0])))
            .bearer_auth(app.worker(1))
            .json(&json!({ "elapsed_seconds": elapsed, "last_active_page": 0 }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 204);
    }

    let elapsed: i64 = sqlx::query_scalar("SELECT elapsed_seconds FROM attempts WHERE id = $1")
        .bind(attempts[0])
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(elapsed, 300);
}

#[tokio::test]
async fn repeated_saves_leave_one_record_with_last_value() {
    let app = spawn_app().await;
    let (event_id, attempts) = app.create_event(&[1], json!({})).await;
    let legacy = app.add_legacy_questions(event_id, 1).await;
    app.enter(attempts[0], 1).await;

    let right = app.option_for(legacy[0], true).await;
    let wrong = app.option_for(legacy[0], false).await;
    for option in [right, wrong, right, wrong] {
        let response = app.save_answer(attempts[0], 1, legacy[0], Some(option)).await;
        assert_eq!(response.status().as_u16(), 204);
    }

    let rows: Vec<(i64, Option<i64>)> = sqlx::query_as(
        "SELECT question_id, option_id FROM answer_records WHERE attempt_id = $1",
    )
    .bind(attempts[0])
    .fetch_all(&app.pool)
    .await
    .unwrap();
    assert_eq!(rows, vec![(legacy[0], Some(wrong))]);
}

#[tokio::test]
async fn answers_outside_the_attempt_are_rejected() {
    let app = spawn_app().await;
    let (event_id, attempts) = app.create_event(&[1], json!({})).await;
    let legacy = app.add_legacy_questions(event_id, 2).await;

    // Not started yet.
    let early = app.save_answer(attempts[0], 1, legacy[0], None).await;
    assert_eq!(early.status().as_u16(), 409);

    app.enter(attempts[0], 1).await;

    let foreign_option = app.option_for(legacy[1], true).await;
    let mismatched = app
        .save_answer(attempts[0], 1, legacy[0], Some(foreign_option))
        .await;
    assert_eq!(mismatched.status().as_u16(), 400);

    let unknown_question = app.save_answer(attempts[0], 1, 9_999, None).await;
    assert_eq!(unknown_question.status().as_u16(), 400);
}

#[tokio::test]
async fn single_package_is_served_in_stored_order() {
    let app = spawn_app().await;
    let (event_id, attempts) = app.create_event(&[1], json!({})).await;
    let package = app.add_package(event_id, "A", 5).await;

    let entry: Value = app.enter(attempts[0], 1).await.json().await.unwrap();
    assert_eq!(question_ids(&entry), package);
}

#[tokio::test]
async fn cross_package_draw_is_balanced() {
    let app = spawn_app().await;
    let (event_id, attempts) = app.create_event(&[1], json!({})).await;
    let packages = [
        app.add_package(event_id, "A", 10).await,
        app.add_package(event_id, "B", 10).await,
        app.add_package(event_id, "C", 10).await,
    ];

    let entry: Value = app.enter(attempts[0], 1).await.json().await.unwrap();
    let drawn = question_ids(&entry);
    assert_eq!(drawn.len(), 10);

    let mut unique = drawn.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), 10);

    let mut counts: Vec<usize> = packages
        .iter()
        .map(|package| drawn.iter().filter(|id| package.contains(id)).count())
        .collect();
    counts.sort_unstable();
    assert_eq!(counts, vec![3, 3, 4]);

    // The draw is materialized once; re-entry serves the same sequence.
    let again: Value = app.enter(attempts[0], 1).await.json().await.unwrap();
    assert_eq!(question_ids(&again), drawn);
}

#[tokio::test]
async fn submission_is_graded_within_grace_period() {
    let app = spawn_app().await;
    let (event_id, attempts) = app.create_event(&[1, 2], json!({})).await;
    let legacy = app.add_legacy_questions(event_id, 4).await;

    for (attempt_id, worker_id) in [(attempts[0], 1), (attempts[1], 2)] {
        assert_eq!(app.enter(attempt_id, worker_id).await.status().as_u16(), 200);
    }

    // Duration is 30 minutes: 31 minutes is inside the 2 minute grace, 33 is not.
    for (attempt_id, minutes) in [(attempts[0], 31), (attempts[1], 33)] {
        sqlx::query("UPDATE attempts SET started_at = $1 WHERE id = $2")
            .bind(Utc::now() - Duration::minutes(minutes))
            .bind(attempt_id)
            .execute(&app.pool)
            .await
            .unwrap();
    }

    let mut answers = HashMap::new();
    for question_id in &legacy[..3] {
        answers.insert(question_id.to_string(), app.option_for(*question_id, true).await);
    }
    answers.insert(legacy[3].to_string(), app.option_for(legacy[3], false).await);

    let accepted = app
        .client
        .post(app.url(&format!("/attempts/{}/submit", attempts[0])))
        .bearer_auth(app.worker(1))
        .json(&json!({ "answers": answers }))
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status().as_u16(), 200);
    let outcome: Value = accepted.json().await.unwrap();
    assert_eq!(outcome["score"], 75);
    assert_eq!(outcome["passed"], true);
    assert_eq!(outcome["correct_count"], 3);
    assert_eq!(outcome["total_questions"], 4);

    let late = app.submit(attempts[1], 2).await;
    assert_eq!(late.status().as_u16(), 409);
    let body: Value = late.json().await.unwrap();
    assert_eq!(body["code"], "time_expired");
    assert_eq!(app.attempt_row(attempts[1]).await.0, "in_progress");

    // Completed attempts cannot be submitted again.
    let twice = app.submit(attempts[0], 1).await;
    assert_eq!(twice.status().as_u16(), 409);
}

#[tokio::test]
async fn token_gate_requires_a_ticket_for_this_worker() {
    let app = spawn_app().await;
    let (event_id, attempts) = app
        .create_event(
            &[1, 2],
            json!({ "is_token_required": true, "access_token": "ABCD" }),
        )
        .await;
    app.add_legacy_questions(event_id, 2).await;

    let refused = app.enter(attempts[0], 1).await;
    assert_eq!(refused.status().as_u16(), 403);
    let body: Value = refused.json().await.unwrap();
    assert_eq!(body["code"], "token_required");

    let wrong = app
        .client
        .post(app.url(&format!("/attempts/{}/verify-token", attempts[0])))
        .bearer_auth(app.worker(1))
        .json(&json!({ "token": "WXYZ" }))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status().as_u16(), 400);

    let verified: Value = app
        .client
        .post(app.url(&format!("/attempts/{}/verify-token", attempts[0])))
        .bearer_auth(app.worker(1))
        .json(&json!({ "token": "abcd" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ticket = verified["ticket"].as_str().unwrap().to_string();
    assert_eq!(verified["expires_in"], 300);

    // A ticket is bound to the attempt it was issued for.
    let borrowed = app
        .enter_with(attempts[1], 2, json!({ "ticket": ticket }))
        .await;
    assert_eq!(borrowed.status().as_u16(), 403);

    let admitted = app
        .enter_with(attempts[0], 1, json!({ "ticket": ticket }))
        .await;
    assert_eq!(admitted.status().as_u16(), 200);

    // Once started, resuming needs no ticket.
    assert_eq!(app.enter(attempts[0], 1).await.status().as_u16(), 200);
}

#[tokio::test]
async fn workers_cannot_touch_other_attempts() {
    let app = spawn_app().await;
    let (event_id, attempts) = app.create_event(&[1, 2], json!({})).await;
    app.add_legacy_questions(event_id, 2).await;

    let entry = app.enter(attempts[0], 2).await;
    assert_eq!(entry.status().as_u16(), 403);
    let body: Value = entry.json().await.unwrap();
    assert_eq!(body["code"], "forbidden");

    let status = app
        .client
        .get(app.url(&format!("/attempts/{}/status", attempts[0])))
        .bearer_auth(app.worker(2))
        .send()
        .await
        .unwrap();
    assert_eq!(status.status().as_u16(), 403);

    app.enter(attempts[0], 1).await;
    let answers = app
        .client
        .get(app.url(&format!("/attempts/{}/answers", attempts[0])))
        .bearer_auth(app.worker(2))
        .send()
        .await
        .unwrap();
    assert_eq!(answers.status().as_u16(), 403);

    // Administrators may read them.
    let as_admin = app
        .client
        .get(app.url(&format!("/attempts/{}/answers", attempts[0])))
        .bearer_auth(app.admin())
        .send()
        .await
        .unwrap();
    assert_eq!(as_admin.status().as_u16(), 200);
}

#[tokio::test]
async fn changed_bank_clears_resume_state() {
    let app = spawn_app().await;
    let (event_id, attempts) = app.create_event(&[1], json!({})).await;
    app.add_package(event_id, "A", 3).await;
    app.add_package(event_id, "B", 3).await;

    let entry: Value = app.enter(attempts[0], 1).await.json().await.unwrap();
    let first = question_ids(&entry)[0];
    let option = app.option_for(first, true).await;
    app.save_answer(attempts[0], 1, first, Some(option)).await;
    app.client
        .put(app.url(&format!("/attempts/{}/progress", attempts[0])))
        .bearer_auth(app.worker(1))
        .json(&json!({ "elapsed_seconds": 240, "last_active_page": 2 }))
        .send()
        .await
        .unwrap();

    // A shorter package lowers the common length from 3 to 2.
    app.add_package(event_id, "C", 2).await;

    let resumed = app.enter(attempts[0], 1).await;
    assert_eq!(resumed.status().as_u16(), 409);
    let body: Value = resumed.json().await.unwrap();
    assert_eq!(body["code"], "question_bank_changed");

    let (elapsed, page): (i64, i32) =
        sqlx::query_as("SELECT elapsed_seconds, last_active_page FROM attempts WHERE id = $1")
            .bind(attempts[0])
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!((elapsed, page), (0, 0));
    let answers = app
        .count("SELECT COUNT(*) FROM answer_records WHERE attempt_id = $1", attempts[0])
        .await;
    assert_eq!(answers, 0);
}

#[tokio::test]
async fn event_without_questions_reports_configuration_error() {
    let app = spawn_app().await;
    let (_, attempts) = app.create_event(&[1], json!({})).await;

    let response = app.enter(attempts[0], 1).await;
    assert_eq!(response.status().as_u16(), 422);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "configuration");
    // Nothing was started.
    assert_eq!(app.attempt_row(attempts[0]).await.0, "upcoming");
}

#[tokio::test]
async fn abandoned_attempt_cannot_be_entered() {
    let app = spawn_app().await;
    let (event_id, attempts) = app.create_event(&[1], json!({})).await;
    app.add_legacy_questions(event_id, 2).await;
    app.enter(attempts[0], 1).await;

    let abandon = app
        .client
        .post(app.url(&format!("/attempts/{}/abandon", attempts[0])))
        .bearer_auth(app.worker(1))
        .send()
        .await
        .unwrap();
    assert_eq!(abandon.status().as_u16(), 204);

    let entry = app.enter(attempts[0], 1).await;
    assert_eq!(entry.status().as_u16(), 409);

    let status = app.status(attempts[0], 1).await;
    assert_eq!(status["status"], "abandoned");
    assert_eq!(status["closed"], true);
    assert_eq!(status["redirect_hint"], "attempts");
}

#[tokio::test]
async fn passing_raises_competencies_monotonically() {
    let app = spawn_app().await;
    let (event_id, attempts) = app.create_event(&[1], json!({})).await;
    let legacy = app.add_legacy_questions(event_id, 2).await;

    for (item, level) in [("Lifting", 4), ("Rigging", 1)] {
        let response = app
            .admin_post(
                "/admin/competency-mappings",
                json!({
                    "competency_item": item,
                    "category": "safety",
                    "title_pattern": "rigging",
                    "level_granted": level,
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
    }
    for item in ["Lifting", "Rigging"] {
        sqlx::query(
            "INSERT INTO competency_levels (worker_id, competency_item, current_level, source, updated_at) \
             VALUES (1, $1, 2, 'manual', $2)",
        )
        .bind(item)
        .bind(Utc::now())
        .execute(&app.pool)
        .await
        .unwrap();
    }

    app.enter(attempts[0], 1).await;
    for question_id in &legacy {
        let option = app.option_for(*question_id, true).await;
        app.save_answer(attempts[0], 1, *question_id, Some(option)).await;
    }
    let outcome: Value = app.submit(attempts[0], 1).await.json().await.unwrap();
    assert_eq!(outcome["score"], 100);

    let levels: Vec<Value> = app
        .client
        .get(app.url("/admin/workers/1/competencies"))
        .bearer_auth(app.admin())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let by_item: HashMap<String, i64> = levels
        .iter()
        .map(|l| {
            (
                l["competency_item"].as_str().unwrap().to_string(),
                l["current_level"].as_i64().unwrap(),
            )
        })
        .collect();
    assert_eq!(by_item["Lifting"], 4);
    assert_eq!(by_item["Rigging"], 2);

    let status = app.status(attempts[0], 1).await;
    assert_eq!(status["redirect_hint"], "results");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_entries_share_one_assignment() {
    let app = spawn_app().await;
    let (event_id, attempts) = app.create_event(&[1], json!({})).await;
    app.add_package(event_id, "A", 3).await;
    app.add_package(event_id, "B", 3).await;

    let url = app.url(&format!("/attempts/{}/enter", attempts[0]));
    let token = app.worker(1);
    let mut entries = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let client = app.client.clone();
        let (url, token) = (url.clone(), token.clone());
        entries.spawn(async move {
            let response = client
                .post(url)
                .bearer_auth(token)
                .json(&json!({}))
                .send()
                .await
                .expect("Failed to execute request");
            let status = response.status().as_u16();
            let body: Value = response.json().await.unwrap();
            (status, body)
        });
    }

    let mut orders = Vec::new();
    while let Some(joined) = entries.join_next().await {
        let (status, body) = joined.unwrap();
        assert_eq!(status, 200, "entry failed: {}", body);
        orders.push(question_ids(&body));
    }
    assert!(orders.iter().all(|order| order == &orders[0]));

    let assignments = app
        .count("SELECT COUNT(*) FROM assignments WHERE attempt_id = $1", attempts[0])
        .await;
    assert_eq!(assignments, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_saves_on_one_key_leave_one_record() {
    let app = spawn_app().await;
    let (event_id, attempts) = app.create_event(&[1], json!({})).await;
    let legacy = app.add_legacy_questions(event_id, 1).await;
    app.enter(attempts[0], 1).await;

    let options = [
        app.option_for(legacy[0], true).await,
        app.option_for(legacy[0], false).await,
    ];
    let url = app.url(&format!("/attempts/{}/answers", attempts[0]));
    let token = app.worker(1);
    let mut saves = tokio::task::JoinSet::new();
    for n in 0..10 {
        let client = app.client.clone();
        let (url, token) = (url.clone(), token.clone());
        let body = json!({ "question_id": legacy[0], "option_id": options[n % 2] });
        saves.spawn(async move {
            client
                .put(url)
                .bearer_auth(token)
                .json(&body)
                .send()
                .await
                .expect("Failed to execute request")
                .status()
                .as_u16()
        });
    }
    while let Some(status) = saves.join_next().await {
        assert_eq!(status.unwrap(), 204);
    }

    let rows = app
        .count("SELECT COUNT(*) FROM answer_records WHERE attempt_id = $1", attempts[0])
        .await;
    assert_eq!(rows, 1);
}
