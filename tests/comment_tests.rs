// tests/comment_tests.rs

use std::sync::Arc;

use blog_backend::{
    config::{Config, JobSettings, StorageBackend},
    jobs::{
        DeferredReplyScheduler, JobRunner, MemoryJobQueue, scheduler::AUTO_RESPONSE_JOB,
    },
    moderation::ProfanityGate,
    routes,
    services::{AutoResponseWorker, ContentService},
    state::AppState,
    store::MemoryStore,
};
use chrono::Utc;
use serde_json::{Value, json};

const PASSWORD: &str = "password123";

struct TestApp {
    address: String,
    client: reqwest::Client,
    runner: JobRunner,
    queue: Arc<MemoryJobQueue>,
}

async fn spawn_app() -> TestApp {
    let config = Config {
        storage: StorageBackend::Memory,
        database_url: None,
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        jwt_secret: "comment_test_secret".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
        admin_email: None,
        profanity_wordlist: None,
        jobs: JobSettings::default(),
    };

    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryJobQueue::new());
    let content = ContentService::new(
        store,
        Arc::new(ProfanityGate::builtin().unwrap()),
        DeferredReplyScheduler::new(queue.clone(), config.jobs.max_attempts),
    );

    // The runner is driven by hand so tests control the clock.
    let runner = JobRunner::new(queue.clone(), config.jobs.clone()).register(
        AUTO_RESPONSE_JOB,
        Arc::new(AutoResponseWorker::new(content.clone())),
    );

    let app = routes::create_router(AppState::new(content, config));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
        runner,
        queue,
    }
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    async fn user_token(&self) -> String {
        let username = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);

        let response = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": PASSWORD,
                "password2": PASSWORD,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);

        let login: Value = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": username, "password": PASSWORD }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        login["token"].as_str().unwrap().to_string()
    }

    async fn create_post(&self, token: &str, slug: &str, auto_response: &str, delay: i32) -> Value {
        let response = self
            .client
            .post(self.url("/api/posts"))
            .bearer_auth(token)
            .json(&json!({
                "title": "Auto replies",
                "slug": slug,
                "body": "Leave a comment below.",
                "status": "published",
                "auto_response_text": auto_response,
                "response_delay_minutes": delay,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);
        response.json().await.unwrap()
    }

    async fn comment(
        &self,
        token: &str,
        post_id: &Value,
        body: &str,
        parent_id: Option<&Value>,
    ) -> reqwest::Response {
        self.client
            .post(self.url("/api/comments"))
            .bearer_auth(token)
            .json(&json!({ "post_id": post_id, "body": body, "parent_id": parent_id }))
            .send()
            .await
            .unwrap()
    }

    async fn detail(&self, slug: &str) -> Value {
        self.client
            .get(self.url(&format!("/api/posts/{slug}")))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn profane_comment_is_blocked_and_counted() {
    let app = spawn_app().await;
    let token = app.user_token().await;
    let post = app.create_post(&token, "clean", "", 0).await;

    let response = app.comment(&token, &post["id"], "You absolute WANKER", None).await;
    assert_eq!(response.status().as_u16(), 400);

    // Look-alike characters do not get past the gate either.
    let response = app.comment(&token, &post["id"], "what a load of sh1t", None).await;
    assert_eq!(response.status().as_u16(), 400);

    let detail = app.detail("clean").await;
    assert_eq!(detail["post"]["blocked_comment_count"], 2);
    assert_eq!(detail["comments"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn comment_on_missing_post_is_404() {
    let app = spawn_app().await;
    let token = app.user_token().await;

    let response = app.comment(&token, &json!(9999), "Hello", None).await;

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn auto_response_is_posted_after_the_delay() {
    let app = spawn_app().await;
    let author = app.user_token().await;
    let reader = app.user_token().await;
    let post = app
        .create_post(&author, "with-reply", "Thanks for reading!", 5)
        .await;

    let response = app.comment(&reader, &post["id"], "Great read", None).await;
    assert_eq!(response.status().as_u16(), 201);
    let trigger: Value = response.json().await.unwrap();

    // Nothing is due yet.
    assert_eq!(app.runner.run_due(Utc::now()).await.unwrap(), 0);
    assert_eq!(app.detail("with-reply").await["comments"].as_array().unwrap().len(), 1);

    let later = Utc::now() + chrono::Duration::minutes(6);
    assert_eq!(app.runner.run_due(later).await.unwrap(), 1);

    let detail = app.detail("with-reply").await;
    let comments = detail["comments"].as_array().unwrap();
    assert_eq!(comments.len(), 2);

    let reply = comments
        .iter()
        .find(|c| c["id"] != trigger["id"])
        .expect("auto-response reply");
    assert_eq!(reply["body"], "Thanks for reading!");
    assert_eq!(reply["parent_id"], trigger["id"]);
    assert_eq!(reply["author_id"], post["author_id"]);

    // The reply has a parent, so it did not schedule another job.
    assert_eq!(app.queue.snapshot().await.len(), 1);
    assert_eq!(app.runner.run_due(later).await.unwrap(), 0);
}

#[tokio::test]
async fn replies_and_edits_do_not_schedule() {
    let app = spawn_app().await;
    let token = app.user_token().await;
    let post = app.create_post(&token, "quiet", "Thanks!", 0).await;

    let top: Value = app
        .comment(&token, &post["id"], "First", None)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(app.queue.snapshot().await.len(), 1);

    let response = app
        .comment(&token, &post["id"], "A reply", Some(&top["id"]))
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let response = app
        .client
        .patch(app.url(&format!("/api/comments/{}", top["id"])))
        .bearer_auth(&token)
        .json(&json!({ "body": "First, edited" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    assert_eq!(app.queue.snapshot().await.len(), 1);
}

#[tokio::test]
async fn only_the_author_can_edit_or_delete_a_comment() {
    let app = spawn_app().await;
    let author = app.user_token().await;
    let stranger = app.user_token().await;
    let post = app.create_post(&author, "owned", "", 0).await;

    let comment: Value = app
        .comment(&author, &post["id"], "Mine", None)
        .await
        .json()
        .await
        .unwrap();
    let path = format!("/api/comments/{}", comment["id"]);

    let response = app
        .client
        .patch(app.url(&path))
        .bearer_auth(&stranger)
        .json(&json!({ "body": "Not yours" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .client
        .delete(app.url(&path))
        .bearer_auth(&stranger)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .client
        .delete(app.url(&path))
        .bearer_auth(&author)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let response = app.client.get(app.url(&path)).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn profane_edit_keeps_the_old_body() {
    let app = spawn_app().await;
    let token = app.user_token().await;
    let post = app.create_post(&token, "edits", "", 0).await;

    let comment: Value = app
        .comment(&token, &post["id"], "Polite words", None)
        .await
        .json()
        .await
        .unwrap();
    let path = format!("/api/comments/{}", comment["id"]);

    let response = app
        .client
        .patch(app.url(&path))
        .bearer_auth(&token)
        .json(&json!({ "body": "shit" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let current: Value = app
        .client
        .get(app.url(&path))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(current["body"], "Polite words");
    assert_eq!(app.detail("edits").await["post"]["blocked_comment_count"], 1);
}

#[tokio::test]
async fn comment_list_is_paginated() {
    let app = spawn_app().await;
    let token = app.user_token().await;
    let post = app.create_post(&token, "paged", "", 0).await;

    for i in 0..3 {
        app.comment(&token, &post["id"], &format!("Comment {i}"), None)
            .await;
    }

    let page: Value = app
        .client
        .get(app.url("/api/comments?page=1&page_size=2"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(page["count"], 3);
    assert_eq!(page["results"].as_array().unwrap().len(), 2);
    assert_eq!(page["next"], 2);
    assert!(page["previous"].is_null());
    assert_eq!(page["results"][0]["body"], "Comment 2");
}
