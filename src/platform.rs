use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::dispatch::download_filename;
use crate::errors::AppError;

/// A file handed to the platform share sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Client-local effects of delivering a print job.
///
/// The print service only produces a PDF; what happens with it afterwards
/// (print dialog, saved file, share sheet, messages to the user) belongs to
/// whatever is hosting the pipeline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Platform: Send + Sync {
    /// Open `url` in a print-sized window and raise the print dialog once it
    /// has loaded. Returns `false` when the window could not be opened.
    async fn open_print_window(&self, url: &str) -> bool;

    /// Save `url` under `filename`.
    async fn download(&self, url: &str, filename: &str) -> Result<(), AppError>;

    /// Ask the user for a printer email address.
    fn prompt_email(&self) -> Option<String>;

    fn can_share(&self) -> bool;

    async fn share(&self, file: ShareFile) -> Result<(), AppError>;

    /// Blocking, user-visible message.
    fn alert(&self, message: &str);
}

// ==============================================================================
// HEADLESS PLATFORM
// ==============================================================================

/// Platform for terminals and scripts: files land in a directory, the email
/// address is known up front, sharing is unavailable.
pub struct HeadlessPlatform {
    client: reqwest::Client,
    output_dir: PathBuf,
    printer_email: Option<String>,
}

impl HeadlessPlatform {
    pub fn new(output_dir: impl AsRef<Path>, printer_email: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            output_dir: output_dir.as_ref().to_path_buf(),
            printer_email,
        }
    }

    async fn save(&self, url: &str, filename: &str) -> Result<PathBuf, AppError> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| AppError::FileError(format!("Failed to create output directory: {}", e)))?;

        let path = self.output_dir.join(filename);
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }
}

#[async_trait]
impl Platform for HeadlessPlatform {
    async fn open_print_window(&self, url: &str) -> bool {
        match self.save(url, &print_filename(url)).await {
            Ok(path) => {
                info!("Labels ready to print: {}", path.display());
                true
            }
            Err(e) => {
                warn!("Could not open labels for printing: {}", e);
                false
            }
        }
    }

    async fn download(&self, url: &str, filename: &str) -> Result<(), AppError> {
        let path = self.save(url, filename).await?;
        info!("Labels saved to {}", path.display());
        Ok(())
    }

    fn prompt_email(&self) -> Option<String> {
        self.printer_email.clone()
    }

    fn can_share(&self) -> bool {
        false
    }

    async fn share(&self, _file: ShareFile) -> Result<(), AppError> {
        Err(AppError::PlatformUnsupported("native share".to_string()))
    }

    fn alert(&self, message: &str) {
        eprintln!("{}", message);
    }
}

/// `qr-labels-<job id>.pdf` for `.../jobs/<job id>/download`, else a timestamped name.
fn print_filename(url: &str) -> String {
    url.trim_end_matches('/')
        .trim_end_matches("/download")
        .rsplit('/')
        .next()
        .map(|segment| segment.trim_end_matches(".pdf"))
        .filter(|job| !job.is_empty() && !job.contains(':'))
        .map(|job| format!("qr-labels-{}.pdf", job))
        .unwrap_or_else(download_filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{web, App, HttpResponse, HttpServer};

    #[test]
    fn print_files_are_named_after_the_job() {
        assert_eq!(
            print_filename("http://localhost:8090/api/mobile-print/jobs/4f1c/download"),
            "qr-labels-4f1c.pdf"
        );
        assert_eq!(print_filename("https://cdn.example/labels/J7.pdf"), "qr-labels-J7.pdf");
        assert!(print_filename("http://localhost:8090").starts_with("qr-labels-"));
    }

    #[actix_rt::test]
    async fn printing_two_jobs_keeps_both_files() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = HttpServer::new(|| {
            App::new().default_service(web::to(|| async {
                HttpResponse::Ok().content_type("application/pdf").body("%PDF-1.3")
            }))
        })
        .workers(1)
        .listen(listener)
        .unwrap()
        .run();
        let handle = server.handle();
        actix_rt::spawn(server);

        let dir = tempfile::tempdir().unwrap();
        let platform = HeadlessPlatform::new(dir.path(), None);
        for job in ["J1", "J2"] {
            let url = format!("http://{}/api/mobile-print/jobs/{}/download", addr, job);
            assert!(platform.open_print_window(&url).await);
        }
        handle.stop(true).await;

        assert!(dir.path().join("qr-labels-J1.pdf").exists());
        assert!(dir.path().join("qr-labels-J2.pdf").exists());
    }
}
