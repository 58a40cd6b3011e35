//! Checkpointed, best-effort corpus indexer.
//!
//! Walks the corpora in a fixed order (Quran, Names, Tafsir, Hadith) and
//! stores every unit through [`VectorIndex::store`], one document per
//! non-empty line. A failed store is logged and counted; the walk goes on.
//!
//! Quran and Hadith walks save a resume cursor every `stride` units (by
//! verse or hadith number). On restart every unit at or before the cursor
//! is skipped, so the checkpoint promises "not re-processed", never
//! "successfully processed". When every corpus is done the checkpoint file
//! is removed.
//!
//! With [`with_snapshot`](ContentIndexer::with_snapshot) the collection is
//! exported right before every checkpoint write, so a resume point on disk
//! never covers documents the snapshot lacks. If that export fails the
//! checkpoint is left where it was.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use reminder_core::models::Metadata;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::corpus::{Corpus, HadithCollection, Name, Quran};
use crate::index::VectorIndex;
use crate::progress::{IndexProgressEvent, IndexProgressReporter, NoProgress};

const REPORT_EVERY: u64 = 100;

/// Counters for one corpus walk.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CorpusReport {
    /// Units passed to the index.
    pub units: u64,
    /// Units skipped because the checkpoint covered them.
    pub skipped: u64,
    /// Documents (lines) stored.
    pub stored: u64,
    /// Units whose store call failed.
    pub failed: u64,
    /// Corpus was marked done by an earlier run.
    pub already_done: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub quran: CorpusReport,
    pub names: CorpusReport,
    pub tafsir: CorpusReport,
    pub hadith: CorpusReport,
    /// The walk stopped early on cancellation.
    pub cancelled: bool,
}

/// Completion signal for background indexing.
///
/// Search requests check [`is_ready`](IndexReadiness::is_ready) and fail
/// fast until the indexer calls [`mark_ready`](IndexReadiness::mark_ready).
#[derive(Clone, Debug)]
pub struct IndexReadiness {
    tx: Arc<watch::Sender<bool>>,
}

impl IndexReadiness {
    pub fn pending() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(false)),
        }
    }

    pub fn ready() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(true)),
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn mark_ready(&self) {
        self.tx.send_replace(true);
    }

    /// Resolve once indexing has finished.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

pub struct ContentIndexer {
    index: Arc<VectorIndex>,
    checkpoints: CheckpointStore,
    snapshot: Option<PathBuf>,
    quran_stride: u32,
    hadith_stride: u32,
    reporter: Box<dyn IndexProgressReporter>,
    cancel: CancellationToken,
}

impl ContentIndexer {
    pub fn new(index: Arc<VectorIndex>, checkpoints: CheckpointStore) -> Self {
        Self {
            index,
            checkpoints,
            snapshot: None,
            quran_stride: 50,
            hadith_stride: 100,
            reporter: Box::new(NoProgress),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_strides(mut self, quran: u32, hadith: u32) -> Self {
        self.quran_stride = quran.max(1);
        self.hadith_stride = hadith.max(1);
        self
    }

    pub fn with_reporter(mut self, reporter: Box<dyn IndexProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Export the collection to `path` ahead of each checkpoint write.
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot = Some(path.into());
        self
    }

    async fn save_checkpoint(&self, cp: &Checkpoint) {
        if self.checkpoints.path().is_none() {
            return;
        }
        if let Some(path) = &self.snapshot {
            if let Err(e) = self.index.export(path).await {
                tracing::warn!("snapshot failed, keeping previous checkpoint: {}", e);
                return;
            }
        }
        self.checkpoints.save(cp);
    }

    /// Walk every corpus in order, then clear the checkpoint if all are done.
    pub async fn run(&self, corpus: &Corpus) -> IndexReport {
        let mut report = IndexReport {
            quran: self.index_quran(&corpus.quran).await,
            ..IndexReport::default()
        };
        if self.cancel.is_cancelled() {
            report.cancelled = true;
            return report;
        }
        report.names = self.index_names(&corpus.names).await;
        if self.cancel.is_cancelled() {
            report.cancelled = true;
            return report;
        }
        report.tafsir = self.index_tafsir(&corpus.quran).await;
        if self.cancel.is_cancelled() {
            report.cancelled = true;
            return report;
        }
        report.hadith = self.index_hadith(&corpus.hadith).await;
        if self.cancel.is_cancelled() {
            report.cancelled = true;
            return report;
        }

        if self.checkpoints.load().all_done() {
            self.checkpoints.clear();
        }
        report
    }

    /// Run in the background and mark `readiness` when the walk ends.
    pub fn spawn(
        self,
        corpus: Arc<Corpus>,
        readiness: IndexReadiness,
    ) -> JoinHandle<IndexReport> {
        tokio::spawn(async move {
            tracing::info!("background indexing started");
            let report = self.run(&corpus).await;
            tracing::info!(
                quran = report.quran.stored,
                names = report.names.stored,
                tafsir = report.tafsir.stored,
                hadith = report.hadith.stored,
                cancelled = report.cancelled,
                "background indexing finished"
            );
            readiness.mark_ready();
            report
        })
    }

    async fn index_unit(&self, metadata: Metadata, text: &str, report: &mut CorpusReport) {
        let lines: Vec<&str> = text.split('\n').collect();
        report.units += 1;
        match self.index.store(&metadata, &lines).await {
            Ok(n) => report.stored += n as u64,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(
                    source = metadata.get("source").map(String::as_str).unwrap_or(""),
                    "error indexing unit: {}",
                    e
                );
            }
        }
    }

    fn progress(&self, corpus: &str, report: &CorpusReport, total: u64) {
        let n = report.units + report.skipped;
        if n % REPORT_EVERY == 0 {
            self.reporter.report(IndexProgressEvent::Indexing {
                corpus: corpus.to_string(),
                n,
                total,
            });
        }
    }

    fn finish(&self, corpus: &str, report: &CorpusReport) {
        self.reporter.report(IndexProgressEvent::Finished {
            corpus: corpus.to_string(),
            stored: report.stored,
            failed: report.failed,
        });
    }

    fn skip_done(&self, corpus: &str) -> CorpusReport {
        tracing::info!("{} already indexed, skipping", corpus);
        self.reporter.report(IndexProgressEvent::Skipped {
            corpus: corpus.to_string(),
        });
        CorpusReport {
            already_done: true,
            ..CorpusReport::default()
        }
    }

    pub async fn index_quran(&self, quran: &Quran) -> CorpusReport {
        let mut cp = self.checkpoints.load();
        if cp.quran_done {
            return self.skip_done("quran");
        }
        if cp.quran_chapter > 0 {
            tracing::info!(
                "resuming quran from chapter {}, verse {}",
                cp.quran_chapter,
                cp.quran_verse
            );
        }

        let total: u64 = quran.chapters.iter().map(|c| c.verses.len() as u64).sum();
        let resume = (cp.quran_chapter, cp.quran_verse);
        let skipped: u64 = quran
            .chapters
            .iter()
            .flat_map(|c| c.verses.iter().map(move |v| (c.number, v.number)))
            .filter(|(c, v)| *c < resume.0 || (*c == resume.0 && *v <= resume.1))
            .count() as u64;
        self.reporter.report(IndexProgressEvent::Started {
            corpus: "quran".to_string(),
            total,
            skipped,
        });

        let mut report = CorpusReport {
            skipped,
            ..CorpusReport::default()
        };
        for chapter in &quran.chapters {
            if chapter.number < resume.0 {
                continue;
            }
            for verse in &chapter.verses {
                if chapter.number == resume.0 && verse.number <= resume.1 {
                    continue;
                }
                if self.cancel.is_cancelled() {
                    return report;
                }

                let metadata = metadata(&[
                    ("source", "quran".to_string()),
                    ("chapter", chapter.number.to_string()),
                    ("verse", verse.number.to_string()),
                    ("name", chapter.name.clone()),
                ]);
                self.index_unit(metadata, &verse.text, &mut report).await;
                self.progress("quran", &report, total);

                if verse.number % self.quran_stride == 0 {
                    cp.quran_chapter = chapter.number;
                    cp.quran_verse = verse.number;
                    self.save_checkpoint(&cp).await;
                }
            }
        }

        cp.quran_done = true;
        self.save_checkpoint(&cp).await;
        self.finish("quran", &report);
        report
    }

    pub async fn index_names(&self, names: &[Name]) -> CorpusReport {
        let mut cp = self.checkpoints.load();
        if cp.names_done {
            return self.skip_done("names");
        }
        let total = names.len() as u64;
        self.reporter.report(IndexProgressEvent::Started {
            corpus: "names".to_string(),
            total,
            skipped: 0,
        });

        let mut report = CorpusReport::default();
        for name in names {
            if self.cancel.is_cancelled() {
                return report;
            }
            let metadata = metadata(&[
                ("source", "names".to_string()),
                ("meaning", name.meaning.clone()),
                ("english", name.english.clone()),
                ("arabic", name.arabic.clone()),
            ]);
            let text = [
                name.meaning.as_str(),
                name.english.as_str(),
                name.description.as_str(),
            ]
            .join(" - ");
            self.index_unit(metadata, &text, &mut report).await;
            self.progress("names", &report, total);
        }

        cp.names_done = true;
        self.save_checkpoint(&cp).await;
        self.finish("names", &report);
        report
    }

    pub async fn index_tafsir(&self, quran: &Quran) -> CorpusReport {
        let mut cp = self.checkpoints.load();
        if cp.tafsir_done {
            return self.skip_done("tafsir");
        }
        let total = quran.commentary.len() as u64;
        self.reporter.report(IndexProgressEvent::Started {
            corpus: "tafsir".to_string(),
            total,
            skipped: 0,
        });

        let mut report = CorpusReport::default();
        for comment in &quran.commentary {
            if self.cancel.is_cancelled() {
                return report;
            }
            let metadata = metadata(&[
                ("source", "tafsir".to_string()),
                ("chapter", comment.chapter.to_string()),
                ("verse", comment.verse.to_string()),
            ]);
            self.index_unit(metadata, &comment.text, &mut report).await;
            self.progress("tafsir", &report, total);
        }

        cp.tafsir_done = true;
        self.save_checkpoint(&cp).await;
        self.finish("tafsir", &report);
        report
    }

    pub async fn index_hadith(&self, hadith: &HadithCollection) -> CorpusReport {
        let mut cp = self.checkpoints.load();
        if cp.hadith_done {
            return self.skip_done("hadith");
        }
        if cp.hadith_book > 0 {
            tracing::info!(
                "resuming hadith from book {}, hadith {}",
                cp.hadith_book,
                cp.hadith_num
            );
        }

        let total: u64 = hadith.books.iter().map(|b| b.hadiths.len() as u64).sum();
        let resume = (cp.hadith_book, cp.hadith_num);
        let skipped: u64 = hadith
            .books
            .iter()
            .enumerate()
            .flat_map(|(i, b)| b.hadiths.iter().map(move |h| (i as u32 + 1, h.number)))
            .filter(|(b, n)| *b < resume.0 || (*b == resume.0 && *n <= resume.1))
            .count() as u64;
        self.reporter.report(IndexProgressEvent::Started {
            corpus: "hadith".to_string(),
            total,
            skipped,
        });

        let mut report = CorpusReport {
            skipped,
            ..CorpusReport::default()
        };
        for (i, book) in hadith.books.iter().enumerate() {
            let position = i as u32 + 1;
            if position < resume.0 {
                continue;
            }
            for h in &book.hadiths {
                if position == resume.0 && h.number <= resume.1 {
                    continue;
                }
                if self.cancel.is_cancelled() {
                    return report;
                }

                let metadata = metadata(&[
                    ("source", "bukhari".to_string()),
                    ("book", book.name.clone()),
                    ("book_num", book.number.to_string()),
                    ("narrator", h.narrator.clone()),
                    ("number", h.number.to_string()),
                ]);
                self.index_unit(metadata, &h.english, &mut report).await;
                self.progress("hadith", &report, total);

                if h.number % self.hadith_stride == 0 {
                    cp.hadith_book = position;
                    cp.hadith_num = h.number;
                    self.save_checkpoint(&cp).await;
                }
            }
        }

        cp.hadith_done = true;
        self.save_checkpoint(&cp).await;
        self.finish("hadith", &report);
        report
    }
}

fn metadata(pairs: &[(&str, String)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
