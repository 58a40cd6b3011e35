//! Shared application context.
//!
//! Built once in `main` and handed to the HTTP handlers and background
//! tasks behind an `Arc`. Each component carries its own lock; none of them
//! is held across a network call.

use std::sync::Arc;

use anyhow::{Context, Result};
use reminder_core::context::ContextAssembler;
use reminder_core::session::SessionStore;

use crate::config::Config;
use crate::daily::DailyBoard;
use crate::embedding::create_provider;
use crate::index::VectorIndex;
use crate::indexer::IndexReadiness;
use crate::llm::{create_llm, LlmService};
use crate::push::SubscriptionRegistry;

pub struct AppContext {
    pub config: Config,
    pub index: Arc<VectorIndex>,
    pub assembler: ContextAssembler,
    pub sessions: SessionStore,
    pub daily: Arc<DailyBoard>,
    pub subscriptions: Arc<SubscriptionRegistry>,
    pub llm: Arc<dyn LlmService>,
    pub readiness: IndexReadiness,
}

impl AppContext {
    /// Wire every component from `config`. The index starts empty and the
    /// readiness signal starts pending.
    pub fn from_config(config: Config) -> Result<Self> {
        let embedder = create_provider(&config.embedding).context("embedding provider")?;
        let index = Arc::new(VectorIndex::in_memory(
            embedder,
            config.embedding.batch_size,
        ));
        let llm = create_llm(&config.llm).context("llm service")?;
        let daily = Arc::new(DailyBoard::open(config.data.daily_path())?);
        let subscriptions = Arc::new(SubscriptionRegistry::open(
            config.data.subscriptions_path(),
        )?);

        Ok(Self {
            assembler: ContextAssembler::new(config.retrieval.context_budget),
            sessions: SessionStore::new(config.sessions.max_entries),
            index,
            daily,
            subscriptions,
            llm,
            readiness: IndexReadiness::pending(),
            config,
        })
    }
}
