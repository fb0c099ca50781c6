use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info};

use crate::config::ClientSettings;
use crate::errors::AppError;
use crate::models::{ApiResponse, CreateJobData, PrintJobRequest, PrintJobSummary};

pub const CREATE_JOB_PATH: &str = "/api/mobile-print/create-job";
pub const EMAIL_TO_PRINTER_PATH: &str = "/api/mobile-print/email-to-printer";

/// A file pulled back from the print service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Remote side of the print pipeline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PrintService: Send + Sync {
    /// `POST /api/mobile-print/create-job`
    async fn create_job(&self, request: &PrintJobRequest) -> Result<PrintJobSummary, AppError>;

    /// `POST /api/mobile-print/email-to-printer`
    async fn email_to_printer(&self, job_id: &str, email: &str) -> Result<(), AppError>;

    /// Download the rendered labels as raw bytes.
    async fn fetch_file(&self, url: &str) -> Result<FetchedFile, AppError>;
}

// ==============================================================================
// HTTP PRINT SERVICE
// ==============================================================================

pub struct HttpPrintService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPrintService {
    pub fn new(base_url: &str, timeout_secs: Option<u64>) -> Result<Self, AppError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self, AppError> {
        Self::new(&settings.base_url, settings.timeout_secs)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl PrintService for HttpPrintService {
    async fn create_job(&self, request: &PrintJobRequest) -> Result<PrintJobSummary, AppError> {
        debug!(
            "Creating print job for {} samples ({} x{})",
            request.samples.len(),
            request.format,
            request.copies
        );

        let response = self
            .client
            .post(self.endpoint(CREATE_JOB_PATH))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body: ApiResponse<CreateJobData> = match response.json().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(AppError::ExternalService(format!(
                    "Print service returned {}",
                    status
                )))
            }
            Err(e) => return Err(e.into()),
        };

        if !status.is_success() || !body.success {
            return Err(AppError::ExternalService(
                body.message
                    .unwrap_or_else(|| format!("Failed to create print job ({})", status)),
            ));
        }

        let job = body
            .data
            .map(|data| data.print_job)
            .ok_or_else(|| AppError::ExternalService("Print service returned no job".to_string()))?;

        info!("Print job {} created", job.id);
        Ok(job)
    }

    async fn email_to_printer(&self, job_id: &str, email: &str) -> Result<(), AppError> {
        let response = self
            .client
            .post(self.endpoint(EMAIL_TO_PRINTER_PATH))
            .json(&serde_json::json!({ "jobId": job_id, "email": email }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ExternalService(format!(
                "Failed to send job {} to printer ({})",
                job_id, status
            )));
        }

        Ok(())
    }

    async fn fetch_file(&self, url: &str) -> Result<FetchedFile, AppError> {
        let response = self.client.get(url).send().await?.error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string());
        let bytes = response.bytes().await?.to_vec();

        Ok(FetchedFile { bytes, content_type })
    }
}
