//! Retrieval-augmented answers.
//!
//! Pipeline for one question:
//!
//! 1. Fail fast with [`NotReady`] while indexing runs (no collection reads).
//! 2. Query the index for the top `[retrieval].query_limit` results.
//! 3. Assemble the budgeted context list.
//! 4. Ask the LLM with the session history replayed before the question.
//! 5. Record the exchange in the session.
//!
//! No lock is held while the embedding or LLM call is in flight.

use serde::Serialize;

use reminder_core::models::QueryResult;

use crate::error::{NotReady, SearchError};
use crate::llm::{build_messages, system_prompt};
use crate::state::AppContext;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub q: String,
    pub answer: String,
    /// Results that made it into the context, in rank order.
    pub references: Vec<QueryResult>,
}

pub async fn answer(
    ctx: &AppContext,
    session: &str,
    question: &str,
) -> Result<SearchResponse, SearchError> {
    if !ctx.readiness.is_ready() {
        return Err(NotReady.into());
    }
    let question = question.trim();
    if question.is_empty() {
        return Err(SearchError::EmptyQuestion);
    }

    let results = ctx
        .index
        .query(question, ctx.config.retrieval.query_limit)
        .await?;
    let contexts = ctx.assembler.assemble(&results);
    let references: Vec<QueryResult> = results
        .iter()
        .take(contexts.len())
        .map(QueryResult::normalized)
        .collect();

    let history = ctx.sessions.history(session);
    let answer = ctx
        .llm
        .complete(&system_prompt(&contexts), &build_messages(&history, question))
        .await?;
    ctx.sessions.append(session, question, &answer);

    tracing::debug!(
        session,
        references = references.len(),
        history = history.len(),
        "answered question"
    );

    Ok(SearchResponse {
        q: question.to_string(),
        answer,
        references,
    })
}
