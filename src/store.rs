use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{JobStatus, PrintJobRequest, PrintJobSummary};

/// Server-side state of one print job.
#[derive(Debug, Clone)]
pub struct PrintJobRecord {
    pub id: Uuid,
    pub request: PrintJobRequest,
    pub status: JobStatus,
    pub pdf_path: Option<PathBuf>,
    pub page_count: usize,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PrintJobRecord {
    pub fn new(request: PrintJobRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            status: JobStatus::Pending,
            pdf_path: None,
            page_count: 0,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Whether the job is older than `retention` at `now`.
    pub fn is_expired(&self, retention: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at)
            .to_std()
            .map(|age| age > retention)
            .unwrap_or(false)
    }

    pub fn summary(&self, public_url: &str) -> PrintJobSummary {
        PrintJobSummary {
            id: self.id.to_string(),
            download_url: download_url(public_url, self.id),
            status: self.status,
            pages_needed: Some(self.request.pages_needed()),
            label_count: Some(self.request.label_count()),
            created_at: Some(self.created_at),
        }
    }
}

pub fn download_url(public_url: &str, id: Uuid) -> String {
    format!(
        "{}/api/mobile-print/jobs/{}/download",
        public_url.trim_end_matches('/'),
        id
    )
}

// ==============================================================================
// JOB STORE
// ==============================================================================

/// In-process job repository shared by the handlers.
///
/// With a retention period set, expired jobs are pruned on every insert and
/// their PDFs removed from disk.
#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<Uuid, PrintJobRecord>>,
    retention: Option<Duration>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            jobs: RwLock::default(),
            retention: Some(retention),
        }
    }

    pub async fn insert(&self, record: PrintJobRecord) -> Uuid {
        self.prune_expired().await;

        let id = record.id;
        self.jobs.write().await.insert(id, record);
        id
    }

    /// Drop jobs past the retention period. Returns how many were removed.
    pub async fn prune_expired(&self) -> usize {
        let Some(retention) = self.retention else {
            return 0;
        };

        let now = Utc::now();
        let expired: Vec<PrintJobRecord> = {
            let mut jobs = self.jobs.write().await;
            let ids: Vec<Uuid> = jobs
                .values()
                .filter(|job| job.is_expired(retention, now))
                .map(|job| job.id)
                .collect();
            ids.iter().filter_map(|id| jobs.remove(id)).collect()
        };

        for path in expired.iter().filter_map(|job| job.pdf_path.as_ref()) {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!("Could not remove expired label file {}: {}", path.display(), e);
            }
        }

        if !expired.is_empty() {
            info!("Pruned {} expired print jobs", expired.len());
        }
        expired.len()
    }

    pub async fn get(&self, id: Uuid) -> Result<PrintJobRecord, AppError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Print job {} not found", id)))
    }

    pub async fn mark_ready(&self, id: Uuid, pdf_path: PathBuf, page_count: usize) -> Result<PrintJobRecord, AppError> {
        self.update(id, |job| {
            job.status = JobStatus::Ready;
            job.pdf_path = Some(pdf_path);
            job.page_count = page_count;
            job.completed_at = Some(Utc::now());
        })
        .await
    }

    pub async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<PrintJobRecord, AppError> {
        self.update(id, |job| {
            job.status = JobStatus::Failed;
            job.error = Some(reason.to_string());
            job.completed_at = Some(Utc::now());
        })
        .await
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    async fn update(&self, id: Uuid, apply: impl FnOnce(&mut PrintJobRecord)) -> Result<PrintJobRecord, AppError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Print job {} not found", id)))?;
        apply(job);
        Ok(job.clone())
    }
}
