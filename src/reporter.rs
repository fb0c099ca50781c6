use std::sync::Arc;

use tracing::{error, info};

use crate::dispatch::{DeliveryOutcome, Dispatched};
use crate::errors::AppError;
use crate::platform::Platform;

/// Coarse error classes surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// Job creation or relay call failed.
    Api,
    /// The platform cannot perform the requested delivery.
    Unsupported,
}

impl From<&AppError> for ReportKind {
    fn from(err: &AppError) -> Self {
        match err {
            AppError::PlatformUnsupported(_) => ReportKind::Unsupported,
            _ => ReportKind::Api,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobReport {
    Created { job_id: String, delivery: DeliveryOutcome },
    Failed { kind: ReportKind, message: String },
}

type CompletionCallback = Box<dyn Fn(&str) + Send + Sync>;

pub struct JobStatusReporter<P: ?Sized> {
    platform: Arc<P>,
    on_complete: Option<CompletionCallback>,
    job_id: Option<String>,
    error: Option<String>,
}

impl<P: Platform + ?Sized> JobStatusReporter<P> {
    pub fn new(platform: Arc<P>) -> Self {
        Self {
            platform,
            on_complete: None,
            job_id: None,
            error: None,
        }
    }

    /// Called with the job id after every successful submission.
    pub fn on_complete(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn report(&mut self, outcome: Result<Dispatched, AppError>) -> JobReport {
        match outcome {
            Ok(dispatched) => {
                let job_id = dispatched.result.job_id;
                info!("Print job {} created", job_id);

                if let Some(callback) = &self.on_complete {
                    callback(&job_id);
                }

                self.job_id = Some(job_id.clone());
                self.error = None;
                JobReport::Created {
                    job_id,
                    delivery: dispatched.delivery,
                }
            }
            Err(e) => {
                let message = e.to_string();
                error!("Print job failed: {}", message);
                self.platform.alert(&message);

                self.job_id = None;
                self.error = Some(message.clone());
                JobReport::Failed {
                    kind: ReportKind::from(&e),
                    message,
                }
            }
        }
    }

    /// Id of the last job created, for display.
    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobStatus, PrintJobResult};
    use crate::platform::MockPlatform;
    use std::sync::Mutex;

    fn dispatched(job_id: &str) -> Dispatched {
        Dispatched {
            result: PrintJobResult {
                job_id: job_id.to_string(),
                download_url: format!("https://x/{job_id}.pdf"),
                status: JobStatus::Ready,
            },
            delivery: DeliveryOutcome::PrintDialogOpened,
        }
    }

    #[test]
    fn success_exposes_job_id_and_runs_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut reporter = JobStatusReporter::new(Arc::new(MockPlatform::new()))
            .on_complete(move |id| sink.lock().unwrap().push(id.to_string()));

        let report = reporter.report(Ok(dispatched("J1")));

        assert!(matches!(report, JobReport::Created { ref job_id, .. } if job_id == "J1"));
        assert_eq!(reporter.job_id(), Some("J1"));
        assert_eq!(reporter.error(), None);
        assert_eq!(*seen.lock().unwrap(), vec!["J1".to_string()]);
    }

    #[test]
    fn failure_alerts_message_verbatim() {
        let err = AppError::ExternalService("connection refused".to_string());
        let expected = err.to_string();

        let mut platform = MockPlatform::new();
        let alerted = expected.clone();
        platform
            .expect_alert()
            .withf(move |message| message == alerted)
            .times(1)
            .return_const(());

        let mut reporter = JobStatusReporter::new(Arc::new(platform));
        let report = reporter.report(Err(err));

        assert_eq!(
            report,
            JobReport::Failed { kind: ReportKind::Api, message: expected.clone() }
        );
        assert_eq!(reporter.job_id(), None);
        assert_eq!(reporter.error(), Some(expected.as_str()));
    }

    #[test]
    fn failure_does_not_block_the_next_job() {
        let mut platform = MockPlatform::new();
        platform.expect_alert().return_const(());

        let mut reporter = JobStatusReporter::new(Arc::new(platform));
        reporter.report(Err(AppError::PlatformUnsupported("native share".to_string())));
        assert!(reporter.error().is_some());

        reporter.report(Ok(dispatched("J2")));
        assert_eq!(reporter.job_id(), Some("J2"));
        assert_eq!(reporter.error(), None);
    }

    #[test]
    fn platform_errors_are_classified_unsupported() {
        let err = AppError::PlatformUnsupported("print window".to_string());
        assert_eq!(ReportKind::from(&err), ReportKind::Unsupported);
        assert_eq!(ReportKind::from(&AppError::ExternalService("x".into())), ReportKind::Api);
    }
}
