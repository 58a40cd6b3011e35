//! Indexing progress reporting.
//!
//! Reports what the indexer is walking and how far it has got. Progress is
//! emitted on **stderr** so stdout stays parseable for scripts.

use std::io::Write;

/// A single progress event from the indexer.
#[derive(Clone, Debug)]
pub enum IndexProgressEvent {
    /// A corpus walk starts at `skipped` units past the beginning.
    Started {
        corpus: String,
        total: u64,
        skipped: u64,
    },
    /// `n` of `total` units of the corpus have been walked.
    Indexing { corpus: String, n: u64, total: u64 },
    /// The corpus was already done according to the checkpoint.
    Skipped { corpus: String },
    /// The corpus walk finished.
    Finished {
        corpus: String,
        stored: u64,
        failed: u64,
    },
}

/// Reports indexing progress. Implementations write to stderr (human or JSON).
pub trait IndexProgressReporter: Send + Sync {
    fn report(&self, event: IndexProgressEvent);
}

/// Human-friendly progress on stderr: "index quran  indexing  1,234 / 6,236 units".
pub struct StderrProgress;

impl IndexProgressReporter for StderrProgress {
    fn report(&self, event: IndexProgressEvent) {
        let line = match &event {
            IndexProgressEvent::Started {
                corpus,
                total,
                skipped,
            } if *skipped > 0 => format!(
                "index {}  resuming at {} / {} units\n",
                corpus,
                format_number(*skipped),
                format_number(*total)
            ),
            IndexProgressEvent::Started { corpus, total, .. } => {
                format!("index {}  {} units\n", corpus, format_number(*total))
            }
            IndexProgressEvent::Indexing { corpus, n, total } => format!(
                "index {}  indexing  {} / {} units\n",
                corpus,
                format_number(*n),
                format_number(*total)
            ),
            IndexProgressEvent::Skipped { corpus } => {
                format!("index {}  already indexed, skipping\n", corpus)
            }
            IndexProgressEvent::Finished {
                corpus,
                stored,
                failed,
            } => format!(
                "index {}  done  {} documents, {} failures\n",
                corpus,
                format_number(*stored),
                format_number(*failed)
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IndexProgressReporter for JsonProgress {
    fn report(&self, event: IndexProgressEvent) {
        let obj = match &event {
            IndexProgressEvent::Started {
                corpus,
                total,
                skipped,
            } => serde_json::json!({
                "event": "progress",
                "corpus": corpus,
                "phase": "started",
                "total": total,
                "skipped": skipped
            }),
            IndexProgressEvent::Indexing { corpus, n, total } => serde_json::json!({
                "event": "progress",
                "corpus": corpus,
                "phase": "indexing",
                "n": n,
                "total": total
            }),
            IndexProgressEvent::Skipped { corpus } => serde_json::json!({
                "event": "progress",
                "corpus": corpus,
                "phase": "skipped"
            }),
            IndexProgressEvent::Finished {
                corpus,
                stored,
                failed,
            } => serde_json::json!({
                "event": "progress",
                "corpus": corpus,
                "phase": "finished",
                "stored": stored,
                "failed": failed
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IndexProgressReporter for NoProgress {
    fn report(&self, _event: IndexProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IndexProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
