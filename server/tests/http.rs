use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use semchat_protocol::UserRef;
use semchat_server::api::{build_router, AppState};
use semchat_server::auth;
use semchat_server::config::Config;
use std::net::{SocketAddr, TcpListener};
use tokio::task::JoinHandle;

const SECRET: &[u8] = b"integration-secret";

async fn spawn_server() -> (SocketAddr, JoinHandle<()>, AppState, tempfile::TempDir) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    listener.set_nonblocking(true).unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let config = Config {
        bind: addr.to_string(),
        data_dir: tmp.path().to_path_buf(),
        jwt_secret: STANDARD.encode(SECRET),
        logging_enabled: false,
        persist_timeout_ms: 2000,
    };
    let state = AppState::new(config).await.unwrap();
    let app = build_router(state.clone());
    let server = tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service())
            .await
            .unwrap();
    });
    (addr, server, state, tmp)
}

fn token(id: &str, name: &str) -> String {
    let user = UserRef {
        id: id.into(),
        name: name.into(),
    };
    auth::issue_jwt(SECRET, &user, time::Duration::hours(1)).unwrap()
}

#[tokio::test]
async fn fallback_post_persists_and_shows_in_history() {
    let (addr, server, _state, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();
    let alice = token("u1", "Alice");

    let resp = client
        .post(format!("http://{}/chat/semester/3/messages", addr))
        .bearer_auth(&alice)
        .json(&serde_json::json!({"text": "fallback msg", "tempId": "t2"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert!(body["message"]["id"].as_i64().unwrap() > 0);
    assert_eq!(body["message"]["tempId"], "t2");
    // sender comes from the session token, not the request body
    assert_eq!(body["message"]["sender"]["id"], "u1");
    assert_eq!(body["message"]["sender"]["name"], "Alice");

    let resp = client
        .get(format!("http://{}/chat/semester/3/messages", addr))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["text"], "fallback msg");
    server.abort();
}

#[tokio::test]
async fn history_pages_are_chronological_without_overlap() {
    let (addr, server, _state, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();
    let alice = token("u1", "Alice");

    for i in 0..5 {
        let resp = client
            .post(format!("http://{}/chat/semester/7/messages", addr))
            .bearer_auth(&alice)
            .json(&serde_json::json!({"text": format!("m{i}")}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
    }

    let page = |page: usize, limit: usize| {
        let client = client.clone();
        let token = alice.clone();
        async move {
            let body: serde_json::Value = client
                .get(format!(
                    "http://{}/chat/semester/7/messages?page={}&limit={}",
                    addr, page, limit
                ))
                .bearer_auth(&token)
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            body["messages"]
                .as_array()
                .unwrap()
                .iter()
                .map(|m| m["text"].as_str().unwrap().to_string())
                .collect::<Vec<_>>()
        }
    };

    assert_eq!(page(0, 50).await, ["m0", "m1", "m2", "m3", "m4"]);
    // page 0 is the live tail, page 1 the next-older batch
    assert_eq!(page(0, 2).await, ["m3", "m4"]);
    assert_eq!(page(1, 2).await, ["m1", "m2"]);
    assert_eq!(page(2, 2).await, ["m0"]);
    assert!(page(3, 2).await.is_empty());
    server.abort();
}

#[tokio::test]
async fn history_is_scoped_to_the_requested_room() {
    let (addr, server, _state, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();
    let alice = token("u1", "Alice");

    for (room, text) in [(3, "for three"), (4, "for four")] {
        client
            .post(format!("http://{}/chat/semester/{}/messages", addr, room))
            .bearer_auth(&alice)
            .json(&serde_json::json!({"text": text}))
            .send()
            .await
            .unwrap();
    }

    let body: serde_json::Value = client
        .get(format!("http://{}/chat/semester/4/messages", addr))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["text"], "for four");
    server.abort();
}

#[tokio::test]
async fn requests_without_a_valid_session_are_rejected() {
    let (addr, server, _state, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{}/chat/semester/3/messages", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);

    let resp = client
        .post(format!("http://{}/chat/semester/3/messages", addr))
        .bearer_auth("not-a-token")
        .json(&serde_json::json!({"text": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
    server.abort();
}

#[tokio::test]
async fn invalid_submissions_are_rejected_before_persistence() {
    let (addr, server, state, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();
    let alice = token("u1", "Alice");

    let resp = client
        .post(format!("http://{}/chat/semester/3/messages", addr))
        .bearer_auth(&alice)
        .json(&serde_json::json!({"text": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "validation");

    let resp = client
        .get(format!("http://{}/chat/semester/abc/messages", addr))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "bad_room");

    let count: i64 = state
        .pool
        .get()
        .unwrap()
        .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
    server.abort();
}

#[tokio::test]
async fn health_is_public() {
    let (addr, server, _state, _tmp) = spawn_server().await;
    let resp = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert!(resp.status().is_success());
    assert_eq!(resp.text().await.unwrap(), "ok");
    server.abort();
}
