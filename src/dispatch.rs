use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::client::PrintService;
use crate::errors::AppError;
use crate::models::{DeliveryMethod, PrintJobRequest, PrintJobResult};
use crate::platform::{Platform, ShareFile};

pub const POPUP_BLOCKED_MESSAGE: &str = "Please allow popups for this site to print labels.";

/// What the chosen delivery branch did with a created job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    PrintDialogOpened,
    PopupBlocked,
    Downloaded { filename: String },
    DownloadFailed { filename: String, reason: String },
    Emailed { email: String },
    EmailFailed { email: String, reason: String },
    EmailSkipped,
    Shared { filename: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub result: PrintJobResult,
    pub delivery: DeliveryOutcome,
}

// ==============================================================================
// DELIVERY DISPATCHER
// ==============================================================================

pub struct DeliveryDispatcher<S: ?Sized, P: ?Sized> {
    service: Arc<S>,
    platform: Arc<P>,
}

impl<S, P> DeliveryDispatcher<S, P>
where
    S: PrintService + ?Sized,
    P: Platform + ?Sized,
{
    pub fn new(service: Arc<S>, platform: Arc<P>) -> Self {
        Self { service, platform }
    }

    /// Create the job, then run exactly one delivery branch.
    ///
    /// Only the job-creation call can fail the dispatch. Once the job exists a
    /// failing delivery branch is reported in the outcome and the job id is
    /// still returned.
    pub async fn dispatch(&self, request: &PrintJobRequest) -> Result<Dispatched, AppError> {
        let summary = self.service.create_job(request).await?;
        let result = PrintJobResult::from(summary);

        let delivery = match request.delivery_method {
            DeliveryMethod::Browser => self.print_in_window(&result).await,
            DeliveryMethod::PdfDownload => self.download_pdf(&result).await,
            DeliveryMethod::EmailToPrinter => self.email_to_printer(&result).await,
            DeliveryMethod::NativeShare => self.share_or_download(&result).await,
        };

        info!(
            "Print job {} delivered via {}: {:?}",
            result.job_id, request.delivery_method, delivery
        );

        Ok(Dispatched { result, delivery })
    }

    async fn print_in_window(&self, result: &PrintJobResult) -> DeliveryOutcome {
        if self.platform.open_print_window(&result.download_url).await {
            DeliveryOutcome::PrintDialogOpened
        } else {
            self.platform.alert(POPUP_BLOCKED_MESSAGE);
            DeliveryOutcome::PopupBlocked
        }
    }

    async fn download_pdf(&self, result: &PrintJobResult) -> DeliveryOutcome {
        let filename = download_filename();
        match self.platform.download(&result.download_url, &filename).await {
            Ok(()) => DeliveryOutcome::Downloaded { filename },
            Err(e) => {
                warn!("Download of job {} failed: {}", result.job_id, e);
                DeliveryOutcome::DownloadFailed {
                    filename,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn email_to_printer(&self, result: &PrintJobResult) -> DeliveryOutcome {
        let email = match self.platform.prompt_email() {
            Some(email) if !email.trim().is_empty() => email.trim().to_string(),
            _ => return DeliveryOutcome::EmailSkipped,
        };

        match self.service.email_to_printer(&result.job_id, &email).await {
            Ok(()) => {
                self.platform.alert(&format!("Print job sent to {}", email));
                DeliveryOutcome::Emailed { email }
            }
            Err(e) => {
                self.platform.alert(&format!("Failed to send to printer: {}", e));
                DeliveryOutcome::EmailFailed {
                    email,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Any share failure falls back to a plain download without telling the user.
    async fn share_or_download(&self, result: &PrintJobResult) -> DeliveryOutcome {
        if !self.platform.can_share() {
            return self.download_pdf(result).await;
        }

        let filename = download_filename();
        let file = match self.service.fetch_file(&result.download_url).await {
            Ok(file) => file,
            Err(e) => {
                warn!("Fetching job {} for sharing failed: {}", result.job_id, e);
                return self.download_pdf(result).await;
            }
        };

        let mime = file.content_type.unwrap_or_else(|| {
            mime_guess::from_path(&filename)
                .first_or(mime::APPLICATION_PDF)
                .to_string()
        });
        let share = ShareFile {
            name: filename.clone(),
            mime,
            bytes: file.bytes,
        };

        match self.platform.share(share).await {
            Ok(()) => DeliveryOutcome::Shared { filename },
            Err(e) => {
                warn!("Sharing job {} failed: {}", result.job_id, e);
                self.download_pdf(result).await
            }
        }
    }
}

/// `qr-labels-<unix millis>.pdf`
pub fn download_filename() -> String {
    format!("qr-labels-{}.pdf", Utc::now().timestamp_millis())
}
