//! In-memory trace store for tests and `DOCROUTE_DB_PATH=:memory:`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::TraceError;
use crate::store::traits::{
    AttemptRecord, ClassificationRecord, ExtractionRecord, SessionTrace, TraceStore,
};

#[derive(Default)]
pub struct MemoryTraceStore {
    sessions: RwLock<HashMap<Uuid, SessionTrace>>,
}

impl MemoryTraceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TraceStore for MemoryTraceStore {
    async fn record_classification(
        &self,
        record: &ClassificationRecord,
    ) -> Result<(), TraceError> {
        let mut sessions = self.sessions.write().await;
        let trace = sessions
            .entry(record.session_id)
            .or_insert_with(|| SessionTrace::empty(record.session_id));
        trace.classification = Some(record.clone());
        Ok(())
    }

    async fn record_extraction(&self, record: &ExtractionRecord) -> Result<(), TraceError> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(record.session_id)
            .or_insert_with(|| SessionTrace::empty(record.session_id))
            .extractions
            .push(record.clone());
        Ok(())
    }

    async fn record_attempt(&self, record: &AttemptRecord) -> Result<(), TraceError> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(record.session_id)
            .or_insert_with(|| SessionTrace::empty(record.session_id))
            .attempts
            .push(record.clone());
        Ok(())
    }

    async fn session_trace(&self, session_id: Uuid) -> Result<SessionTrace, TraceError> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or_else(|| TraceError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    async fn session_count(&self) -> Result<u64, TraceError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .filter(|t| t.classification.is_some())
            .count() as u64)
    }
}
