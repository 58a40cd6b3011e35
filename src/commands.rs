//! CLI command implementations.
//!
//! Each `run_*` function backs one subcommand of the `reminder` binary.
//! Results go to stdout; logs and progress go to stderr.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use reminder_core::rotation::{ContinuationPolicy, UuidPicker};

use crate::checkpoint::CheckpointStore;
use crate::config::Config;
use crate::corpus::Corpus;
use crate::daily::{DailyRotator, PushMarker};
use crate::error::ImportError;
use crate::index::VectorIndex;
use crate::indexer::{ContentIndexer, IndexReport};
use crate::progress::ProgressMode;
use crate::push::create_notifier;
use crate::search::answer;
use crate::server::run_server;
use crate::state::AppContext;

async fn load_index(config: &Config, index: &VectorIndex) -> Result<usize, ImportError> {
    index
        .load(
            config.data.bundled_snapshot.as_deref(),
            &config.data.snapshot_path(),
        )
        .await
}

fn load_corpus(config: &Config) -> Result<Arc<Corpus>> {
    let corpus = Corpus::load(&config.data.corpus_dir)
        .with_context(|| format!("loading corpus from {}", config.data.corpus_dir.display()))?;
    Ok(Arc::new(corpus))
}

fn rotator(config: &Config, ctx: &AppContext, corpus: Arc<Corpus>) -> Result<DailyRotator> {
    Ok(DailyRotator::new(
        corpus,
        ctx.daily.clone(),
        Arc::new(UuidPicker),
        ContinuationPolicy {
            max_steps: config.daily.continuation_steps,
        },
        config.daily.max_redraws,
        PushMarker::new(config.data.push_marker_path()),
        ctx.subscriptions.clone(),
        create_notifier(&config.push)?,
    )
    .with_send_delay(Duration::from_millis(config.push.send_delay_ms)))
}

fn print_report(report: &IndexReport) {
    for (name, c) in [
        ("quran", &report.quran),
        ("names", &report.names),
        ("tafsir", &report.tafsir),
        ("hadith", &report.hadith),
    ] {
        if c.already_done {
            println!("{:<8} already indexed", name);
        } else {
            println!(
                "{:<8} {} units, {} documents, {} skipped, {} failed",
                name, c.units, c.stored, c.skipped, c.failed
            );
        }
    }
}

/// How `serve` got its index.
pub enum IndexStartup {
    /// A complete snapshot was loaded and the index is ready.
    Loaded(usize),
    /// Indexing runs in the background. The handle resolves once the walk
    /// has ended, the snapshot is saved and readiness is marked.
    Background(JoinHandle<()>),
}

/// Bring `ctx.index` up for serving.
///
/// A snapshot with no checkpoint next to it is complete and is served as
/// is. A snapshot with a checkpoint was interrupted, so indexing resumes on
/// top of it before readiness is marked. A checkpoint without a loadable
/// snapshot is stale and is dropped. `[indexing].on_start` always rebuilds.
pub async fn start_index(
    ctx: &AppContext,
    corpus: Arc<Corpus>,
    cancel: CancellationToken,
) -> IndexStartup {
    let config = &ctx.config;
    let checkpoints = CheckpointStore::new(config.data.checkpoint_path());
    let snapshot = config.data.snapshot_path();

    if config.indexing.on_start {
        checkpoints.clear();
    } else {
        match load_index(config, &ctx.index).await {
            Ok(n) if !checkpoints.exists() => {
                tracing::info!(documents = n, "index loaded from snapshot");
                ctx.readiness.mark_ready();
                return IndexStartup::Loaded(n);
            }
            Ok(n) => tracing::info!(documents = n, "resuming interrupted indexing"),
            Err(e) => {
                tracing::warn!("no usable snapshot ({}), indexing in the background", e);
                checkpoints.clear();
            }
        }
    }

    let handle = ContentIndexer::new(ctx.index.clone(), checkpoints)
        .with_strides(config.indexing.quran_stride, config.indexing.hadith_stride)
        .with_snapshot(&snapshot)
        .with_cancellation(cancel)
        .spawn(corpus, ctx.readiness.clone());

    let index = ctx.index.clone();
    IndexStartup::Background(tokio::spawn(async move {
        match handle.await {
            // the last checkpointed snapshot is already on disk
            Ok(report) if report.cancelled => {
                tracing::info!("indexing interrupted; resumes on next start")
            }
            Ok(_) => {
                if let Err(e) = index.export(&snapshot).await {
                    tracing::warn!("failed to save index snapshot: {}", e);
                }
            }
            Err(e) => tracing::error!("indexing task failed: {}", e),
        }
    }))
}

/// `reminder serve`: load or build the index, start the rotator and the
/// HTTP server, and stop everything on Ctrl-C.
pub async fn run_serve(config: Config) -> Result<()> {
    let corpus = load_corpus(&config)?;
    let ctx = Arc::new(AppContext::from_config(config.clone())?);
    let cancel = CancellationToken::new();

    start_index(&ctx, corpus.clone(), cancel.child_token()).await;

    if config.daily.enabled {
        let rotator = Arc::new(rotator(&config, &ctx, corpus)?);
        tokio::spawn(rotator.run(
            Duration::from_secs(config.daily.interval_secs),
            cancel.child_token(),
        ));
    }

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutting down");
                cancel.cancel();
            }
        });
    }

    run_server(ctx, cancel).await
}

/// `reminder index`: walk the corpora into the working snapshot.
///
/// Without `--fresh` an interrupted run resumes from the checkpoint on top
/// of the snapshot it left behind. `--fresh` rebuilds from scratch and only
/// replaces the snapshot once the walk completes.
pub async fn run_index(config: Config, fresh: bool, progress: ProgressMode) -> Result<()> {
    let corpus = load_corpus(&config)?;
    let ctx = AppContext::from_config(config.clone())?;
    let index = ctx.index.clone();
    let snapshot = config.data.snapshot_path();
    let checkpoints = CheckpointStore::new(config.data.checkpoint_path());

    let indexer = if fresh {
        checkpoints.clear();
        ContentIndexer::new(index.clone(), CheckpointStore::disabled())
    } else {
        match load_index(&config, &index).await {
            Ok(n) if !checkpoints.exists() => {
                println!(
                    "index already complete ({} documents); use --fresh to rebuild",
                    n
                );
                return Ok(());
            }
            Ok(n) => tracing::info!(documents = n, "resuming on top of existing snapshot"),
            Err(ImportError::Missing(_)) => {
                if checkpoints.exists() {
                    tracing::warn!("checkpoint has no snapshot behind it; starting over");
                    checkpoints.clear();
                }
            }
            Err(e) => bail!("existing snapshot is unusable ({}); rerun with --fresh", e),
        }
        ContentIndexer::new(index.clone(), checkpoints).with_snapshot(&snapshot)
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let report = indexer
        .with_strides(config.indexing.quran_stride, config.indexing.hadith_stride)
        .with_reporter(progress.reporter())
        .with_cancellation(cancel)
        .run(&corpus)
        .await;
    print_report(&report);

    if report.cancelled {
        if fresh {
            println!("interrupted; {} left unchanged", snapshot.display());
        } else {
            println!("interrupted; rerun to resume from the checkpoint");
        }
        return Ok(());
    }

    index.export(&snapshot).await?;
    println!(
        "{} documents written to {}",
        index.len().await,
        snapshot.display()
    );
    Ok(())
}

/// `reminder export <path>`
pub async fn run_export(config: Config, path: &Path) -> Result<()> {
    let ctx = AppContext::from_config(config.clone())?;
    let n = load_index(&config, &ctx.index)
        .await
        .context("no index to export; run `reminder index` first")?;
    ctx.index.export(path).await?;
    println!("exported {} documents to {}", n, path.display());
    Ok(())
}

/// `reminder import <path>`: validate the snapshot and make it the working copy.
pub async fn run_import(config: Config, path: &Path) -> Result<()> {
    let ctx = AppContext::from_config(config.clone())?;
    let n = ctx.index.import(path).await?;
    let target = config.data.snapshot_path();
    ctx.index.export(&target).await?;
    // an imported snapshot is complete; a leftover resume point would not match it
    CheckpointStore::new(config.data.checkpoint_path()).clear();
    println!("imported {} documents into {}", n, target.display());
    Ok(())
}

/// `reminder search <question>`
pub async fn run_search(config: Config, question: &str) -> Result<()> {
    let ctx = AppContext::from_config(config.clone())?;
    load_index(&config, &ctx.index)
        .await
        .context("no index to search; run `reminder index` first")?;
    ctx.readiness.mark_ready();

    let resp = answer(&ctx, "cli", question).await?;
    println!("{}", resp.answer);
    if !resp.references.is_empty() {
        println!();
        for (i, r) in resp.references.iter().enumerate() {
            let source = r.metadata.get("source").map(String::as_str).unwrap_or("-");
            println!("{}. [{:.3}] ({}) {}", i + 1, r.score, source, r.text);
        }
    }
    Ok(())
}

/// `reminder daily`: run one rotation tick and print the published state.
pub async fn run_daily(config: Config) -> Result<()> {
    let corpus = load_corpus(&config)?;
    let ctx = AppContext::from_config(config.clone())?;
    let report = rotator(&config, &ctx, corpus)?.tick(Utc::now()).await?;
    println!("{}", serde_json::to_string_pretty(&report.state)?);
    if report.pushed && !report.push_errors.is_empty() {
        eprintln!("{} push deliveries failed", report.push_errors.len());
    }
    Ok(())
}
