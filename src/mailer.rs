use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::config::{MailSettings, MailTransportKind};
use crate::errors::AppError;
use crate::store::PrintJobRecord;

#[derive(Debug)]
pub enum MailTransport {
    File(AsyncFileTransport<Tokio1Executor>),
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
}

impl MailTransport {
    pub fn from_settings(settings: &MailSettings) -> Result<Self, AppError> {
        Ok(match settings.transport {
            MailTransportKind::File => {
                std::fs::create_dir_all(&settings.file_dir)?;
                Self::File(AsyncFileTransport::new(&settings.file_dir))
            }
            MailTransportKind::Local => {
                Self::Smtp(AsyncSmtpTransport::<Tokio1Executor>::unencrypted_localhost())
            }
            MailTransportKind::Smtp => {
                let url = settings
                    .smtp_url
                    .as_deref()
                    .ok_or_else(|| AppError::ConfigError("mail.smtp_url is required for SMTP".to_string()))?;
                let mut transport = AsyncSmtpTransport::<Tokio1Executor>::from_url(url)
                    .map_err(|e| AppError::ConfigError(format!("Invalid SMTP url: {}", e)))?;
                if let (Some(username), Some(password)) = (&settings.smtp_username, &settings.smtp_password) {
                    transport = transport.credentials(Credentials::new(username.clone(), password.clone()));
                }
                transport = transport.timeout(settings.timeout_secs.map(Duration::from_secs));
                Self::Smtp(transport.build())
            }
        })
    }

    async fn send(&self, message: Message) -> Result<(), AppError> {
        match self {
            MailTransport::File(t) => t
                .send(message)
                .await
                .map(|_| ())
                .map_err(|e| AppError::MailError(e.to_string())),
            MailTransport::Smtp(t) => t
                .send(message)
                .await
                .map(|_| ())
                .map_err(|e| AppError::MailError(e.to_string())),
        }
    }
}

// ==============================================================================
// PRINTER MAILER
// ==============================================================================

/// Relays rendered label PDFs to email-enabled printers.
pub struct PrinterMailer {
    transport: MailTransport,
    from: Mailbox,
}

impl PrinterMailer {
    pub fn new(transport: MailTransport, from: &str) -> Result<Self, AppError> {
        let from = from
            .parse::<Mailbox>()
            .map_err(|e| AppError::ConfigError(format!("Invalid sender address {}: {}", from, e)))?;
        Ok(Self { transport, from })
    }

    pub fn from_settings(settings: &MailSettings) -> Result<Self, AppError> {
        Self::new(MailTransport::from_settings(settings)?, &settings.from)
    }

    #[tracing::instrument(skip(self, job, pdf), fields(job_id = %job.id))]
    pub async fn send_job(&self, to: &str, job: &PrintJobRecord, pdf: Vec<u8>) -> Result<(), AppError> {
        let to: Mailbox = to.parse()?;
        let filename = format!("qr-labels-{}.pdf", job.id);
        let labels = job.request.label_count();

        let body = format!(
            "Print job {}\n\n{} label(s) for {} sample(s), {} layout, {} pages.\n",
            job.id,
            labels,
            job.request.samples.len(),
            job.request.format,
            job.page_count
        );
        let pdf_type = ContentType::parse(mime::APPLICATION_PDF.as_ref())
            .map_err(|e| AppError::InternalError(format!("Invalid content type: {}", e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to.clone())
            .subject(format!("QR labels: {} label(s)", labels))
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(body))
                    .singlepart(Attachment::new(filename).body(pdf, pdf_type)),
            )?;

        debug!("Sending print job to {}", to);
        self.transport.send(message).await?;
        info!("Print job {} emailed to {}", job.id, to);
        Ok(())
    }
}
