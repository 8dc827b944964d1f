// tests/common/mod.rs

#![allow(dead_code)]

use std::str::FromStr;

use assessment_engine::{config::Config, routes, state::AppState, utils::jwt::sign_jwt};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use tempfile::TempDir;

pub const ADMIN_ID: i64 = 900;

pub struct TestApp {
    pub address: String,
    pub pool: SqlitePool,
    pub config: Config,
    pub client: reqwest::Client,
    // Keeps the database file alive for the duration of the test.
    _db_dir: TempDir,
}

/// Spawns the app on a random port against a fresh SQLite file.
pub async fn spawn_app() -> TestApp {
    let db_dir = TempDir::with_prefix("assessment-test-db").expect("Failed to create temp dir");
    let path = db_dir.path().join("db.sqlite");
    let database_url = format!("sqlite://{}?mode=rwc", path.display());

    let options = SqliteConnectOptions::from_str(&database_url)
        .expect("Invalid SQLite URL")
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .expect("Failed to open test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config::with_defaults(database_url, "test_secret_for_integration_tests");
    let state = AppState::new(pool.clone(), config.clone());
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        pool,
        config,
        client: reqwest::Client::new(),
        _db_dir: db_dir,
    }
}

/// A question worth `score_value` points whose first option is correct.
pub fn question(n: usize) -> Value {
    json!({
        "content": format!("Question {}", n),
        "options": [
            { "content": "Right", "is_correct": true },
            { "content": "Wrong" },
        ],
    })
}

pub fn questions(count: usize) -> Vec<Value> {
    (1..=count).map(question).collect()
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.address, path)
    }

    pub fn token(&self, worker_id: i64, role: &str) -> String {
        sign_jwt(worker_id, role, &self.config.jwt_secret, 600).unwrap()
    }

    pub fn worker(&self, worker_id: i64) -> String {
        self.token(worker_id, "worker")
    }

    pub fn admin(&self) -> String {
        self.token(ADMIN_ID, "hc")
    }

    pub async fn admin_post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(self.admin())
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Creates an event that opened an hour ago. Returns (event id, attempt ids by worker order).
    pub async fn create_event(&self, workers: &[i64], extra: Value) -> (i64, Vec<i64>) {
        let mut body = json!({
            "title": "Rigging Basics",
            "category": "Safety",
            "scheduled_at": (Utc::now() - Duration::hours(1)).to_rfc3339(),
            "duration_minutes": 30,
            "pass_percentage": 70,
            "worker_ids": workers,
        });
        if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            for (key, value) in extra {
                body.insert(key.clone(), value.clone());
            }
        }

        let response = self.admin_post("/admin/events", body).await;
        assert_eq!(response.status().as_u16(), 201);
        let created: Value = response.json().await.unwrap();
        let attempt_ids = created["attempt_ids"]
            .as_array()
            .unwrap()
            .iter()
            .map(|id| id.as_i64().unwrap())
            .collect();
        (created["id"].as_i64().unwrap(), attempt_ids)
    }

    pub async fn add_package(&self, event_id: i64, name: &str, count: usize) -> Vec<i64> {
        let response = self
            .admin_post(
                &format!("/admin/events/{}/packages", event_id),
                json!({ "name": name, "questions": questions(count) }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.unwrap();
        ids(&body["question_ids"])
    }

    pub async fn add_legacy_questions(&self, event_id: i64, count: usize) -> Vec<i64> {
        let response = self
            .admin_post(
                &format!("/admin/events/{}/questions", event_id),
                json!({ "questions": questions(count) }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.unwrap();
        ids(&body["question_ids"])
    }

    pub async fn enter(&self, attempt_id: i64, worker_id: i64) -> reqwest::Response {
        self.enter_with(attempt_id, worker_id, json!({})).await
    }

    pub async fn enter_with(&self, attempt_id: i64, worker_id: i64, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/attempts/{}/enter", attempt_id)))
            .bearer_auth(self.worker(worker_id))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn save_answer(
        &self,
        attempt_id: i64,
        worker_id: i64,
        question_id: i64,
        option_id: Option<i64>,
    ) -> reqwest::Response {
        self.client
            .put(self.url(&format!("/attempts/{}/answers", attempt_id)))
            .bearer_auth(self.worker(worker_id))
            .json(&json!({ "question_id": question_id, "option_id": option_id }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn submit(&self, attempt_id: i64, worker_id: i64) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/attempts/{}/submit", attempt_id)))
            .bearer_auth(self.worker(worker_id))
            .json(&json!({}))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn status(&self, attempt_id: i64, worker_id: i64) -> Value {
        self.client
            .get(self.url(&format!("/attempts/{}/status", attempt_id)))
            .bearer_auth(self.worker(worker_id))
            .send()
            .await
            .expect("Failed to execute request")
            .json()
            .await
            .unwrap()
    }

    pub async fn option_for(&self, question_id: i64, correct: bool) -> i64 {
        sqlx::query_scalar(
            "SELECT id FROM question_options WHERE question_id = $1 AND is_correct = $2 LIMIT 1",
        )
        .bind(question_id)
        .bind(correct)
        .fetch_one(&self.pool)
        .await
        .unwrap()
    }

    pub async fn attempt_row(&self, attempt_id: i64) -> (String, Option<i32>, Option<bool>) {
        sqlx::query_as("SELECT status, score, is_passed FROM attempts WHERE id = $1")
            .bind(attempt_id)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    pub async fn count(&self, sql: &str, id: i64) -> i64 {
        sqlx::query_scalar(sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

pub fn ids(value: &Value) -> Vec<i64> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|id| id.as_i64().unwrap())
        .collect()
}

/// Question ids in the order an entry response presented them.
pub fn question_ids(entry: &Value) -> Vec<i64> {
    entry["questions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["id"].as_i64().unwrap())
        .collect()
}
