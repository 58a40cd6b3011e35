//! HTTP API tests against an in-process server on a free port.

use std::sync::Arc;

use chrono::Utc;
use reminder::config::Config;
use reminder::corpus::{Book, Chapter, Corpus, Hadith, HadithCollection, Name, Quran, Verse};
use reminder::daily::{DailyBoard, DailyRotator, PushMarker};
use reminder::index::VectorIndex;
use reminder::indexer::IndexReadiness;
use reminder::llm::EchoLlm;
use reminder::push::{LogNotifier, SubscriptionRegistry};
use reminder::server::serve;
use reminder::state::AppContext;
use reminder_core::context::ContextAssembler;
use reminder_core::embedding::HashEmbedder;
use reminder_core::models::Metadata;
use reminder_core::rotation::{ContinuationPolicy, SequencePicker};
use reminder_core::session::SessionStore;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

struct TestServer {
    base: String,
    ctx: Arc<AppContext>,
    cancel: CancellationToken,
    _tmp: TempDir,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn start_server(ready: bool) -> TestServer {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::minimal();
    config.data.data_dir = tmp.path().to_path_buf();
    config.llm.provider = "echo".to_string();

    let index = Arc::new(VectorIndex::in_memory(Arc::new(HashEmbedder::new(128)), 8));
    let mut m = Metadata::new();
    m.insert("source".to_string(), "names".to_string());
    index
        .store(&m, &["The Most Merciful", "The Most Forgiving"])
        .await
        .unwrap();

    let ctx = Arc::new(AppContext {
        assembler: ContextAssembler::new(config.retrieval.context_budget),
        sessions: SessionStore::new(config.sessions.max_entries),
        daily: Arc::new(DailyBoard::open(config.data.daily_path()).unwrap()),
        subscriptions: Arc::new(
            SubscriptionRegistry::open(config.data.subscriptions_path()).unwrap(),
        ),
        llm: Arc::new(EchoLlm),
        readiness: if ready {
            IndexReadiness::ready()
        } else {
            IndexReadiness::pending()
        },
        config,
        index,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let cancel = CancellationToken::new();
    tokio::spawn(serve(listener, ctx.clone(), cancel.clone()));

    TestServer {
        base,
        ctx,
        cancel,
        _tmp: tmp,
    }
}

fn corpus() -> Corpus {
    Corpus {
        quran: Quran {
            chapters: vec![Chapter {
                number: 112,
                name: "Sincerity".to_string(),
                verses: vec![Verse {
                    number: 1,
                    text: "Say: He is God, the One.".to_string(),
                }],
            }],
            commentary: vec![],
        },
        names: vec![Name {
            number: 1,
            english: "Ar-Rahman".to_string(),
            arabic: "الرحمن".to_string(),
            meaning: "The Most Merciful".to_string(),
            description: String::new(),
        }],
        hadith: HadithCollection {
            books: vec![Book {
                number: 2,
                name: "Belief".to_string(),
                hadiths: vec![Hadith {
                    number: 8,
                    narrator: "Ibn Umar".to_string(),
                    english: "Islam is built on five.".to_string(),
                }],
            }],
        },
    }
}

#[tokio::test]
async fn test_health_reports_readiness() {
    let server = start_server(false).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["indexed"], false);
    assert!(body["version"].is_string());

    server.ctx.readiness.mark_ready();
    let body: Value = client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["indexed"], true);
    assert_eq!(body["documents"], 2);
}

#[tokio::test]
async fn test_search_before_ready_is_503() {
    let server = start_server(false).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/search", server.base))
        .json(&json!({ "q": "mercy" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "indexing");
    assert_eq!(body["error"]["message"], "indexing in progress");
}

#[tokio::test]
async fn test_search_sets_session_cookie_and_keeps_history() {
    let server = start_server(true).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/search", server.base))
        .json(&json!({ "q": "merciful" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let cookie = resp
        .headers()
        .get("set-cookie")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let session_pair = cookie.split(';').next().unwrap().to_string();
    assert!(session_pair.starts_with("session="));

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["q"], "merciful");
    assert_eq!(body["answer"], "merciful (2 references)");
    assert_eq!(body["references"].as_array().unwrap().len(), 2);
    assert_eq!(body["references"][0]["metadata"]["source"], "names");

    let resp = client
        .post(format!("{}/api/search", server.base))
        .header("cookie", &session_pair)
        .json(&json!({ "q": "forgiving" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers().get("set-cookie").is_none());

    let body: Value = client
        .get(format!("{}/api/search", server.base))
        .header("cookie", &session_pair)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        body["history"],
        json!([
            "forgiving",
            "forgiving (2 references)",
            "merciful",
            "merciful (2 references)"
        ])
    );
}

#[tokio::test]
async fn test_search_empty_question_is_400() {
    let server = start_server(true).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/search", server.base))
        .json(&json!({ "q": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_malformed_bodies_use_error_contract() {
    let server = start_server(true).await;
    let client = reqwest::Client::new();

    // no content type
    let resp = client
        .post(format!("{}/api/search", server.base))
        .body(r#"{"q": "mercy"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    // wrong shape
    let resp = client
        .post(format!("{}/api/push/unsubscribe", server.base))
        .json(&json!({ "endpoint": 7 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"].is_string());
}

#[tokio::test]
async fn test_daily_endpoints() {
    let server = start_server(true).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/api/daily", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let rotator = DailyRotator::new(
        Arc::new(corpus()),
        server.ctx.daily.clone(),
        Arc::new(SequencePicker::new([0, 0, 0, 0, 0])),
        ContinuationPolicy::default(),
        10,
        PushMarker::disabled(),
        server.ctx.subscriptions.clone(),
        Arc::new(LogNotifier),
    );
    let report = rotator.tick(Utc::now()).await.unwrap();
    let today = report.state.date.clone();

    let body: Value = client
        .get(format!("{}/api/daily", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["verse"]["text"], "Say: He is God, the One.");
    assert_eq!(body["links"]["verse"], "/quran/112#1");
    assert_eq!(body["links"]["hadith"], "/hadith/2#8");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Salam, today is "));

    let resp = client
        .get(format!("{}/api/daily/{}", server.base, today))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{}/api/daily/1999-01-01", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let body: Value = client
        .post(format!("{}/api/daily", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["date"], today);

    let resp = client
        .post(format!("{}/api/daily", server.base))
        .json(&json!({ "date": "1999-01-01" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_hijri_date_endpoint() {
    let server = start_server(true).await;
    let body: Value = reqwest::Client::new()
        .get(format!("{}/api/hijri/date", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["date"], Utc::now().format("%Y-%m-%d").to_string());
    assert!(body["display"].as_str().unwrap().contains(" of "));
    assert_eq!(body["hijri"].as_str().unwrap().len(), 10);
}

#[tokio::test]
async fn test_push_subscribe_and_unsubscribe() {
    let server = start_server(true).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/push/subscribe", server.base))
        .json(&json!({
            "endpoint": "https://push.example/abc",
            "keys": { "p256dh": "key", "auth": "secret" }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(server.ctx.subscriptions.len(), 1);
    let saved = std::fs::read_to_string(server.ctx.config.data.subscriptions_path()).unwrap();
    assert!(saved.contains("https://push.example/abc"));

    let body: Value = client
        .post(format!("{}/api/push/unsubscribe", server.base))
        .json(&json!({ "endpoint": "https://push.example/abc" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["removed"], true);
    assert!(server.ctx.subscriptions.is_empty());

    let resp = client
        .post(format!("{}/api/push/subscribe", server.base))
        .json(&json!({ "endpoint": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}
