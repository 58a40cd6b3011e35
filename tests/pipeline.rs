//! End-to-end tests for indexing, snapshots, search and the daily rotation,
//! run in-process against fake stores and a scripted LLM.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reminder::checkpoint::{Checkpoint, CheckpointStore};
use reminder::commands::{start_index, IndexStartup};
use reminder::config::Config;
use reminder::corpus::{Book, Chapter, Corpus, Hadith, HadithCollection, Name, Quran, Verse};
use reminder::daily::{DailyBoard, DailyRotator, PushMarker};
use reminder::error::{LlmError, SearchError};
use reminder::index::VectorIndex;
use reminder::indexer::{ContentIndexer, IndexReadiness};
use reminder::llm::{ChatMessage, LlmService, Role};
use reminder::push::{LogNotifier, SubscriptionRegistry};
use reminder::search::answer;
use reminder::state::AppContext;
use reminder_core::context::ContextAssembler;
use reminder_core::embedding::HashEmbedder;
use reminder_core::models::{EmbeddedDocument, Metadata, QueryResult};
use reminder_core::rotation::{ContinuationPolicy, SequencePicker};
use reminder_core::session::SessionStore;
use reminder_core::store::memory::InMemoryStore;
use reminder_core::store::{CollectionSnapshot, VectorStore};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const DIMS: usize = 256;

// ─── Fakes ──────────────────────────────────────────────────────────

/// Wraps an in-memory store, counting reads and recording stored texts.
/// Optionally cancels a token after a number of `add` calls.
struct RecordingStore {
    inner: InMemoryStore,
    reads: AtomicUsize,
    adds: AtomicUsize,
    stored: Mutex<Vec<(String, Metadata)>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl RecordingStore {
    fn new() -> Self {
        Self {
            inner: InMemoryStore::new("hash", DIMS),
            reads: AtomicUsize::new(0),
            adds: AtomicUsize::new(0),
            stored: Mutex::new(Vec::new()),
            cancel_after: None,
        }
    }

    fn cancelling_after(n: usize, token: CancellationToken) -> Self {
        Self {
            cancel_after: Some((n, token)),
            ..Self::new()
        }
    }

    fn stored_verses(&self) -> Vec<u32> {
        self.stored
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, m)| m["source"] == "quran")
            .map(|(_, m)| m["verse"].parse().unwrap())
            .collect()
    }
}

#[async_trait]
impl VectorStore for RecordingStore {
    async fn add(&self, docs: Vec<EmbeddedDocument>) -> Result<()> {
        {
            let mut stored = self.stored.lock().unwrap();
            for d in &docs {
                stored.push((d.document.content.clone(), d.document.metadata.clone()));
            }
        }
        self.inner.add(docs).await?;
        let n = self.adds.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.cancel_after {
            if n >= *limit {
                token.cancel();
            }
        }
        Ok(())
    }

    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<QueryResult>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.search(query_vec, limit).await
    }

    async fn len(&self) -> Result<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.len().await
    }

    async fn snapshot(&self) -> Result<CollectionSnapshot> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.snapshot().await
    }

    async fn restore(&self, snapshot: CollectionSnapshot) -> Result<()> {
        self.inner.restore(snapshot).await
    }
}

/// Store that rejects every document mentioning "reject".
struct PickyStore {
    inner: InMemoryStore,
}

#[async_trait]
impl VectorStore for PickyStore {
    async fn add(&self, docs: Vec<EmbeddedDocument>) -> Result<()> {
        if docs.iter().any(|d| d.document.content.contains("reject")) {
            bail!("disk full");
        }
        self.inner.add(docs).await
    }
    async fn search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<QueryResult>> {
        self.inner.search(query_vec, limit).await
    }
    async fn len(&self) -> Result<usize> {
        self.inner.len().await
    }
    async fn snapshot(&self) -> Result<CollectionSnapshot> {
        self.inner.snapshot().await
    }
    async fn restore(&self, snapshot: CollectionSnapshot) -> Result<()> {
        self.inner.restore(snapshot).await
    }
}

/// LLM that answers from a script and records what it was asked.
struct ScriptedLlm {
    answers: Mutex<Vec<String>>,
    calls: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl ScriptedLlm {
    fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().rev().map(|s| s.to_string()).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LlmService for ScriptedLlm {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), messages.to_vec()));
        self.answers
            .lock()
            .unwrap()
            .pop()
            .ok_or(LlmError::EmptyResponse)
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────

fn embedder() -> Arc<HashEmbedder> {
    Arc::new(HashEmbedder::new(DIMS))
}

fn corpus(verses: u32) -> Corpus {
    Corpus {
        quran: Quran {
            chapters: vec![Chapter {
                number: 1,
                name: "The Opening".to_string(),
                verses: (1..=verses)
                    .map(|n| Verse {
                        number: n,
                        text: format!("Verse number {} of the opening.", n),
                    })
                    .collect(),
            }],
            commentary: vec![reminder::corpus::Commentary {
                chapter: 1,
                verse: 1,
                text: "A note on the first verse.".to_string(),
            }],
        },
        names: vec![Name {
            number: 1,
            english: "Ar-Rahman".to_string(),
            arabic: "الرحمن".to_string(),
            meaning: "The Most Merciful".to_string(),
            description: "Mercy that covers all creation.".to_string(),
        }],
        hadith: HadithCollection {
            books: vec![Book {
                number: 1,
                name: "Revelation".to_string(),
                hadiths: vec![Hadith {
                    number: 1,
                    narrator: "Umar".to_string(),
                    english: "Actions are judged by intentions.".to_string(),
                }],
            }],
        },
    }
}

fn meta(pairs: &[(&str, &str)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn app(index: Arc<VectorIndex>, llm: Arc<dyn LlmService>, ready: bool) -> AppContext {
    let mut config = Config::minimal();
    config.llm.provider = "echo".to_string();
    AppContext {
        assembler: ContextAssembler::new(config.retrieval.context_budget),
        sessions: SessionStore::new(config.sessions.max_entries),
        config,
        index,
        daily: Arc::new(DailyBoard::in_memory()),
        subscriptions: Arc::new(SubscriptionRegistry::in_memory()),
        llm,
        readiness: if ready {
            IndexReadiness::ready()
        } else {
            IndexReadiness::pending()
        },
    }
}

// ─── Snapshots ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_export_import_round_trip() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("snap").join("reminder.idx.zst");

    let texts = [
        "Praise be to God, Lord of all the worlds.",
        "Do good deeds properly, sincerely and moderately.",
        "Say: He is God, the One and Only.",
    ];
    let original = VectorIndex::in_memory(embedder(), 8);
    for (i, t) in texts.iter().enumerate() {
        let n = (i + 1).to_string();
        original
            .store(&meta(&[("source", "test"), ("n", n.as_str())]), &[*t])
            .await
            .unwrap();
    }
    let before = original.query(texts[1], 3).await.unwrap();
    original.export(&path).await.unwrap();

    let restored = VectorIndex::in_memory(embedder(), 8);
    assert_eq!(restored.import(&path).await.unwrap(), 3);
    let after = restored.query(texts[1], 3).await.unwrap();

    assert_eq!(after[0].text, texts[1]);
    assert_eq!(after[0].metadata["n"], "2");
    let order = |r: &[QueryResult]| r.iter().map(|x| x.text.clone()).collect::<Vec<_>>();
    assert_eq!(order(&before), order(&after));
}

#[tokio::test]
async fn test_query_limit_clamped_to_collection() {
    let idx = VectorIndex::in_memory(embedder(), 8);
    idx.store(&meta(&[("source", "test")]), &["one", "two"])
        .await
        .unwrap();
    assert_eq!(idx.query("one", 500).await.unwrap().len(), 2);
}

// ─── Indexing ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_resume_indexes_exactly_the_rest() {
    let tmp = TempDir::new().unwrap();
    let cp_path = tmp.path().join("index-checkpoint.json");

    // crash after 7 of 20 verses, checkpointing every verse
    let cancel = CancellationToken::new();
    let first = Arc::new(RecordingStore::cancelling_after(7, cancel.clone()));
    let report = ContentIndexer::new(
        Arc::new(VectorIndex::with_store(first.clone(), embedder(), 4)),
        CheckpointStore::new(&cp_path),
    )
    .with_strides(1, 1)
    .with_cancellation(cancel)
    .run(&corpus(20))
    .await;
    assert!(report.cancelled);
    assert_eq!(first.stored_verses(), (1..=7).collect::<Vec<_>>());
    assert!(cp_path.exists());

    let second = Arc::new(RecordingStore::new());
    let report = ContentIndexer::new(
        Arc::new(VectorIndex::with_store(second.clone(), embedder(), 4)),
        CheckpointStore::new(&cp_path),
    )
    .with_strides(1, 1)
    .run(&corpus(20))
    .await;
    assert!(!report.cancelled);
    assert_eq!(report.quran.skipped, 7);
    assert_eq!(second.stored_verses(), (8..=20).collect::<Vec<_>>());
    assert_eq!(report.names.stored, 1);
    assert_eq!(report.tafsir.stored, 1);
    assert_eq!(report.hadith.stored, 1);
    assert!(!cp_path.exists(), "checkpoint removed once everything is done");
}

#[tokio::test]
async fn test_resume_replays_since_last_stride() {
    let tmp = TempDir::new().unwrap();
    let cp_path = tmp.path().join("cp.json");

    let cancel = CancellationToken::new();
    let first = Arc::new(RecordingStore::cancelling_after(7, cancel.clone()));
    ContentIndexer::new(
        Arc::new(VectorIndex::with_store(first, embedder(), 4)),
        CheckpointStore::new(&cp_path),
    )
    .with_strides(5, 100)
    .with_cancellation(cancel)
    .run(&corpus(12))
    .await;

    let second = Arc::new(RecordingStore::new());
    ContentIndexer::new(
        Arc::new(VectorIndex::with_store(second.clone(), embedder(), 4)),
        CheckpointStore::new(&cp_path),
    )
    .with_strides(5, 100)
    .run(&corpus(12))
    .await;
    assert_eq!(second.stored_verses(), (6..=12).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_finished_corpora_are_not_rewalked() {
    let tmp = TempDir::new().unwrap();
    let cp_path = tmp.path().join("cp.json");
    std::fs::write(
        &cp_path,
        r#"{"quran_done": true, "names_done": true, "tafsir_done": false, "hadith_done": false}"#,
    )
    .unwrap();

    let store = Arc::new(RecordingStore::new());
    let report = ContentIndexer::new(
        Arc::new(VectorIndex::with_store(store.clone(), embedder(), 4)),
        CheckpointStore::new(&cp_path),
    )
    .run(&corpus(5))
    .await;
    assert!(report.quran.already_done);
    assert!(report.names.already_done);
    assert!(store.stored_verses().is_empty());
    assert_eq!(report.tafsir.stored + report.hadith.stored, 2);
}

#[tokio::test]
async fn test_store_failures_do_not_stop_the_walk() {
    let mut c = corpus(3);
    c.quran.chapters[0].verses[1].text = "Please reject this verse.".to_string();
    let index = Arc::new(VectorIndex::with_store(
        Arc::new(PickyStore {
            inner: InMemoryStore::new("hash", DIMS),
        }),
        embedder(),
        4,
    ));
    let report = ContentIndexer::new(index.clone(), CheckpointStore::disabled())
        .run(&c)
        .await;
    assert_eq!(report.quran.units, 3);
    assert_eq!(report.quran.failed, 1);
    assert_eq!(report.quran.stored, 2);
    assert_eq!(index.len().await, 2 + 1 + 1 + 1);
}

#[tokio::test]
async fn test_multiline_units_become_separate_documents() {
    let mut c = corpus(1);
    c.hadith.books[0].hadiths[0].english = "First line.\n\nSecond line.".to_string();
    let store = Arc::new(RecordingStore::new());
    ContentIndexer::new(
        Arc::new(VectorIndex::with_store(store.clone(), embedder(), 4)),
        CheckpointStore::disabled(),
    )
    .run(&c)
    .await;

    let stored = store.stored.lock().unwrap();
    let hadith: Vec<&(String, Metadata)> = stored
        .iter()
        .filter(|(_, m)| m["source"] == "bukhari")
        .collect();
    assert_eq!(hadith.len(), 2);
    assert_eq!(hadith[0].1["narrator"], "Umar");
    assert_eq!(hadith[0].1["book_num"], "1");

    let names: Vec<&String> = stored
        .iter()
        .filter(|(_, m)| m["source"] == "names")
        .map(|(t, _)| t)
        .collect();
    assert_eq!(
        names,
        vec!["The Most Merciful - Ar-Rahman - Mercy that covers all creation."]
    );
}

#[tokio::test]
async fn test_checkpoint_never_outruns_snapshot() {
    let tmp = TempDir::new().unwrap();
    let cp_path = tmp.path().join("cp.json");
    let snap = tmp.path().join("reminder.idx.zst");

    // killed after verse 3 with a stride of 2: the resume point is verse 2
    let cancel = CancellationToken::new();
    let first = Arc::new(RecordingStore::cancelling_after(3, cancel.clone()));
    ContentIndexer::new(
        Arc::new(VectorIndex::with_store(first, embedder(), 4)),
        CheckpointStore::new(&cp_path),
    )
    .with_strides(2, 100)
    .with_snapshot(&snap)
    .with_cancellation(cancel)
    .run(&corpus(10))
    .await;

    let cp = CheckpointStore::new(&cp_path).load();
    assert_eq!((cp.quran_chapter, cp.quran_verse), (1, 2));
    let on_disk = VectorIndex::in_memory(embedder(), 4);
    assert_eq!(on_disk.import(&snap).await.unwrap(), 2);
}

fn serve_config(tmp: &TempDir) -> Config {
    let mut config = Config::minimal();
    config.data.data_dir = tmp.path().to_path_buf();
    config.embedding.dims = Some(DIMS);
    config.llm.provider = "echo".to_string();
    config.indexing.quran_stride = 2;
    config
}

#[tokio::test]
async fn test_serve_resumes_interrupted_index() {
    let tmp = TempDir::new().unwrap();
    let config = serve_config(&tmp);

    let cancel = CancellationToken::new();
    let first = Arc::new(RecordingStore::cancelling_after(3, cancel.clone()));
    let report = ContentIndexer::new(
        Arc::new(VectorIndex::with_store(first, embedder(), 4)),
        CheckpointStore::new(config.data.checkpoint_path()),
    )
    .with_strides(2, 100)
    .with_snapshot(config.data.snapshot_path())
    .with_cancellation(cancel)
    .run(&corpus(10))
    .await;
    assert!(report.cancelled);

    let ctx = AppContext::from_config(config.clone()).unwrap();
    match start_index(&ctx, Arc::new(corpus(10)), CancellationToken::new()).await {
        IndexStartup::Background(handle) => handle.await.unwrap(),
        IndexStartup::Loaded(n) => panic!("partial index with {} documents served as complete", n),
    }
    assert!(ctx.readiness.is_ready());
    // verses 1-2 from the snapshot, 3-10 resumed, plus one name, note and hadith
    assert_eq!(ctx.index.len().await, 13);
    assert!(!config.data.checkpoint_path().exists());

    let restarted = AppContext::from_config(config).unwrap();
    match start_index(&restarted, Arc::new(corpus(10)), CancellationToken::new()).await {
        IndexStartup::Loaded(n) => assert_eq!(n, 13),
        IndexStartup::Background(_) => panic!("complete snapshot was re-indexed"),
    }
    assert!(restarted.readiness.is_ready());
}

#[tokio::test]
async fn test_serve_drops_checkpoint_without_snapshot() {
    let tmp = TempDir::new().unwrap();
    let config = serve_config(&tmp);
    let cp = Checkpoint {
        quran_chapter: 1,
        quran_verse: 6,
        ..Checkpoint::default()
    };
    CheckpointStore::new(config.data.checkpoint_path()).save(&cp);

    let ctx = AppContext::from_config(config).unwrap();
    match start_index(&ctx, Arc::new(corpus(10)), CancellationToken::new()).await {
        IndexStartup::Background(handle) => handle.await.unwrap(),
        IndexStartup::Loaded(_) => panic!("nothing to load"),
    }
    assert_eq!(ctx.index.len().await, 13);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queries_run_while_storing() {
    let index = Arc::new(VectorIndex::in_memory(embedder(), 4));
    index
        .store(&meta(&[("source", "seed")]), &["seed document"])
        .await
        .unwrap();

    let writer = {
        let index = index.clone();
        tokio::spawn(async move {
            for i in 0..200 {
                let text = format!("stored line {}", i);
                index
                    .store(&meta(&[("source", "writer")]), &[text])
                    .await
                    .unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|r| {
            let index = index.clone();
            tokio::spawn(async move {
                let mut seen = 0;
                for _ in 0..50 {
                    let hits = index
                        .query(&format!("stored line {}", r), 1000)
                        .await
                        .unwrap();
                    assert!(hits.len() >= seen, "collection shrank under a reader");
                    assert!(hits.len() <= 201);
                    seen = hits.len();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for r in readers {
        r.await.unwrap();
    }
    assert_eq!(index.len().await, 201);
    let top = index.query("stored line 199", 1).await.unwrap();
    assert_eq!(top[0].text, "stored line 199");
}

// ─── Search ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_not_ready_reads_nothing() {
    let store = Arc::new(RecordingStore::new());
    let index = Arc::new(VectorIndex::with_store(store.clone(), embedder(), 4));
    index
        .store(&meta(&[("source", "quran")]), &["Some verse."])
        .await
        .unwrap();
    let llm = Arc::new(ScriptedLlm::new(&["unused"]));
    let ctx = app(index, llm.clone(), false);

    let err = answer(&ctx, "s1", "what is mercy?").await.unwrap_err();
    assert!(matches!(err, SearchError::NotReady(_)));
    assert_eq!(err.to_string(), "indexing in progress");
    assert_eq!(store.reads.load(Ordering::SeqCst), 0);
    assert!(llm.calls.lock().unwrap().is_empty());
    assert!(ctx.sessions.history("s1").is_empty());
}

#[tokio::test]
async fn test_search_builds_prompt_and_session() {
    let index = Arc::new(VectorIndex::in_memory(embedder(), 4));
    index
        .store(
            &meta(&[("Source", "names"), ("English", "Ar-Rahman")]),
            &["The Most Merciful"],
        )
        .await
        .unwrap();
    let llm = Arc::new(ScriptedLlm::new(&["a1", "a2"]));
    let ctx = app(index, llm.clone(), true);

    let first = answer(&ctx, "s", "  q1 ").await.unwrap();
    assert_eq!(first.q, "q1");
    assert_eq!(first.answer, "a1");
    assert_eq!(first.references.len(), 1);
    assert_eq!(first.references[0].metadata["source"], "names");
    assert!(!first.references[0].metadata.contains_key("Source"));

    answer(&ctx, "s", "q2").await.unwrap();
    assert_eq!(ctx.sessions.history("s"), vec!["q2", "a2", "q1", "a1"]);
    assert!(ctx.sessions.history("other").is_empty());

    let calls = llm.calls.lock().unwrap();
    let (prompt, messages) = &calls[1];
    assert!(prompt.contains("<context>"));
    assert!(prompt.contains("\"source\":\"names\""));
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
    assert_eq!(messages[2].content, "Question: q2");
}

#[tokio::test]
async fn test_search_rejects_blank_question() {
    let index = Arc::new(VectorIndex::in_memory(embedder(), 4));
    let ctx = app(index, Arc::new(ScriptedLlm::new(&[])), true);
    assert!(matches!(
        answer(&ctx, "s", "   ").await,
        Err(SearchError::EmptyQuestion)
    ));
}

#[tokio::test]
async fn test_llm_failure_leaves_session_untouched() {
    let index = Arc::new(VectorIndex::in_memory(embedder(), 4));
    index
        .store(&meta(&[("source", "quran")]), &["Some verse."])
        .await
        .unwrap();
    let ctx = app(index, Arc::new(ScriptedLlm::new(&[])), true);
    assert!(matches!(
        answer(&ctx, "s", "verse").await,
        Err(SearchError::Llm(LlmError::EmptyResponse))
    ));
    assert!(ctx.sessions.history("s").is_empty());
}

// ─── Daily rotation ─────────────────────────────────────────────────

#[tokio::test]
async fn test_rejected_draws_are_never_published() {
    let mut c = corpus(3);
    c.quran.chapters[0].verses = vec![
        Verse {
            number: 0,
            text: "In the name of God".to_string(),
        },
        Verse {
            number: 1,
            text: "and so it continues,".to_string(),
        },
        Verse {
            number: 2,
            text: "Truly, God is Forgiving.".to_string(),
        },
    ];

    // each draw: name, book, hadith, chapter, verse
    let picker = SequencePicker::new([0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 2]);
    let board = Arc::new(DailyBoard::in_memory());
    let rotator = DailyRotator::new(
        Arc::new(c),
        board.clone(),
        Arc::new(picker),
        ContinuationPolicy::default(),
        10,
        PushMarker::disabled(),
        Arc::new(SubscriptionRegistry::in_memory()),
        Arc::new(LogNotifier),
    );

    let report = rotator
        .tick(Utc.with_ymd_and_hms(2024, 3, 11, 6, 0, 0).unwrap())
        .await
        .unwrap();
    assert_eq!(report.redraws, 2);
    assert_eq!(report.state.verse.number, 2);
    assert_eq!(report.state.verse.text, "Truly, God is Forgiving.");
    assert_eq!(report.state.message, "Salam, today is 1st of Ramadan, 1445");

    let published = board.current().await.unwrap();
    assert_ne!(published.verse.number, 0);
    assert!(published.verse.text.starts_with(char::is_uppercase));
    assert_eq!(
        published.links,
        BTreeMap::from([
            ("hadith".to_string(), "/hadith/1#1".to_string()),
            ("name".to_string(), "/names/1".to_string()),
            ("verse".to_string(), "/quran/1#2".to_string()),
        ])
    );
}
