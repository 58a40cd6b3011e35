//! Context assembly for LLM prompts.
//!
//! Turns ranked [`QueryResult`]s into the list of context snippets that go
//! into the system prompt. Each snippet is the compact JSON form of one
//! result (`{"text", "score", "metadata"}`) with lower-cased metadata keys.
//!
//! The size budget is measured in bytes of serialized JSON, a cheap proxy
//! for tokens. The budget is checked *before* each item, so the item that
//! crosses it is still included and everything after it is dropped. The
//! output is always a prefix of the input.

use crate::models::QueryResult;

/// Default context budget in bytes of serialized JSON.
pub const DEFAULT_CONTEXT_BUDGET: usize = 8000;

/// Builds budgeted context lists from ranked query results.
#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    budget: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_BUDGET)
    }
}

impl ContextAssembler {
    pub fn new(budget: usize) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Serialize results in order until the running total reaches the budget.
    pub fn assemble(&self, results: &[QueryResult]) -> Vec<String> {
        let mut total = 0usize;
        let mut out = Vec::new();
        for result in results {
            if total >= self.budget {
                break;
            }
            let snippet = encode(&result.normalized());
            total += snippet.len();
            out.push(snippet);
        }
        out
    }
}

fn encode(result: &QueryResult) -> String {
    // non-finite scores serialize as null; nothing else here can fail
    serde_json::to_string(result).unwrap_or_else(|_| result.text.clone())
}
