//! Query log and usage statistics
//!
//! Every answered question is appended as one JSON line to an optional log
//! file and folded into per-tenant counters kept in memory. Opening an
//! existing log replays it, so counters survive a restart. The answering
//! path only ever writes here; `/stats` reads the in-memory view. A failing
//! log write is reported but never fails the question that produced it.

use crate::errors::Result;
use crate::models::{AnswerMode, ChunkId, RetrievalMode, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

/// A cited chunk as recorded in the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedSource {
    pub chunk_id: ChunkId,
    pub score: f32,
}

/// One answered question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub tenant_id: TenantId,
    pub question: String,
    pub answer: String,
    pub no_answer: bool,
    pub sources: Vec<LoggedSource>,
    pub retrieval_mode: RetrievalMode,
    pub answer_mode: AnswerMode,
    #[serde(default)]
    pub degraded: bool,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Aggregated counters for one tenant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TenantStats {
    pub total_queries: u64,
    pub generated_queries: u64,
    pub extractive_queries: u64,
    pub no_answer_queries: u64,
    pub semantic_queries: u64,
    pub lexical_queries: u64,
    pub degraded_queries: u64,
    /// When the tenant's credential was last used to ask a question
    pub last_query_at: Option<DateTime<Utc>>,
}

impl TenantStats {
    fn observe(&mut self, entry: &QueryLogEntry) {
        self.total_queries += 1;
        match entry.answer_mode {
            AnswerMode::Generated => self.generated_queries += 1,
            AnswerMode::Extractive => self.extractive_queries += 1,
            AnswerMode::None => {}
        }
        match entry.retrieval_mode {
            RetrievalMode::Semantic => self.semantic_queries += 1,
            RetrievalMode::Lexical => self.lexical_queries += 1,
            RetrievalMode::None => {}
        }
        if entry.no_answer {
            self.no_answer_queries += 1;
        }
        if entry.degraded {
            self.degraded_queries += 1;
        }
        self.last_query_at = self.last_query_at.max(Some(entry.created_at));
    }
}

#[derive(Default)]
struct TenantLog {
    stats: TenantStats,
    recent: VecDeque<QueryLogEntry>,
}

impl TenantLog {
    fn observe(&mut self, entry: QueryLogEntry, recent_limit: usize) {
        self.stats.observe(&entry);
        if recent_limit > 0 {
            if self.recent.len() == recent_limit {
                self.recent.pop_front();
            }
            self.recent.push_back(entry);
        }
    }
}

/// Fold the lines of an existing log into per-tenant views.
/// Lines that do not parse are skipped.
fn replay(contents: &str, recent_limit: usize) -> HashMap<TenantId, TenantLog> {
    let mut tenants: HashMap<TenantId, TenantLog> = HashMap::new();
    let mut skipped = 0usize;

    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<QueryLogEntry>(line) {
            Ok(entry) => tenants
                .entry(entry.tenant_id.clone())
                .or_default()
                .observe(entry, recent_limit),
            Err(_) => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::warn!(skipped, "Skipped unreadable query log lines");
    }
    tenants
}

/// Append-only query log with a per-tenant in-memory view
pub struct QueryLog {
    file: tokio::sync::Mutex<Option<tokio::fs::File>>,
    tenants: Mutex<HashMap<TenantId, TenantLog>>,
    recent_limit: usize,
}

impl QueryLog {
    /// Replay the log file if it exists, then open it (creating if
    /// needed) in append mode
    pub async fn open(path: Option<&Path>, recent_limit: usize) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::in_memory(recent_limit));
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tenants = match tokio::fs::read_to_string(path).await {
            Ok(contents) => replay(&contents, recent_limit),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        tracing::info!(path = %path.display(), tenants = tenants.len(), "Query log opened");

        Ok(Self {
            file: tokio::sync::Mutex::new(Some(file)),
            tenants: Mutex::new(tenants),
            recent_limit,
        })
    }

    /// Log kept only in memory
    pub fn in_memory(recent_limit: usize) -> Self {
        Self {
            file: tokio::sync::Mutex::new(None),
            tenants: Mutex::new(HashMap::new()),
            recent_limit,
        }
    }

    /// Record an answered question
    pub async fn record(&self, entry: QueryLogEntry) {
        if let Err(e) = self.append(&entry).await {
            tracing::warn!(tenant_id = %entry.tenant_id, error = %e, "Failed to append query log entry");
        }

        let mut tenants = match self.tenants.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tenants
            .entry(entry.tenant_id.clone())
            .or_default()
            .observe(entry, self.recent_limit);
    }

    async fn append(&self, entry: &QueryLogEntry) -> Result<()> {
        let mut file = self.file.lock().await;
        if let Some(file) = file.as_mut() {
            let mut line = serde_json::to_vec(entry)?;
            line.push(b'\n');
            file.write_all(&line).await?;
            file.flush().await?;
        }
        Ok(())
    }

    /// Counters for one tenant; all zero when it has asked nothing
    pub fn stats(&self, tenant_id: &TenantId) -> TenantStats {
        let tenants = match self.tenants.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tenants
            .get(tenant_id)
            .map(|log| log.stats.clone())
            .unwrap_or_default()
    }

    /// Most recent entries for one tenant, newest first
    pub fn recent(&self, tenant_id: &TenantId, limit: usize) -> Vec<QueryLogEntry> {
        let tenants = match self.tenants.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tenants
            .get(tenant_id)
            .map(|log| log.recent.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}
