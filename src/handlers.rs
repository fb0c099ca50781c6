use std::path::{Path, PathBuf};

use actix_files::NamedFile;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::config::Settings;
use crate::errors::AppError;
use crate::labels;
use crate::mailer::PrinterMailer;
use crate::models::*;
use crate::qrcode::{render_preview, Preview, QrPayload};
use crate::store::{JobStore, PrintJobRecord};

// ==============================================================================
// HEALTH CHECK
// ==============================================================================

pub async fn health_check(store: web::Data<JobStore>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "service": "LabGuard Pro Mobile Print",
        "version": env!("CARGO_PKG_VERSION"),
        "jobs": store.len().await
    }))
}

// ==============================================================================
// PRINT JOB HANDLERS
// ==============================================================================

#[tracing::instrument(skip_all, fields(samples = body.samples.len()))]
pub async fn create_job(
    store: web::Data<JobStore>,
    settings: web::Data<Settings>,
    body: web::Json<PrintJobRequest>,
) -> Result<HttpResponse, AppError> {
    let request = body.into_inner();
    request.validate()?;

    let max = settings.storage.max_samples_per_job;
    if request.samples.len() > max {
        return Err(AppError::BadRequest(format!(
            "A print job may contain at most {} samples, got {}",
            max,
            request.samples.len()
        )));
    }

    let max_labels = settings.storage.max_labels_per_job;
    if request.label_count() > max_labels {
        return Err(AppError::BadRequest(format!(
            "A print job may contain at most {} labels, got {} ({} samples x {} copies)",
            max_labels,
            request.label_count(),
            request.samples.len(),
            request.copies
        )));
    }

    let id = store.insert(PrintJobRecord::new(request.clone())).await;
    let path = pdf_path(&settings.storage.labels_path, id);
    info!(
        "Rendering job {}: {} samples, {} x{}, {}",
        id,
        request.samples.len(),
        request.format,
        request.copies,
        request.label_size
    );

    let title = format!("QR labels {}", id);
    let target = path.clone();
    let rendered = web::block(move || -> Result<usize, AppError> {
        if let Some(dir) = target.parent() {
            std::fs::create_dir_all(dir)?;
        }
        labels::render_pdf(&request, &title, &target)
    })
    .await
    .map_err(|e| AppError::InternalError(format!("Label rendering was cancelled: {}", e)))
    .and_then(|rendered| rendered);

    let job = settle_job(&store, id, path, rendered).await?;

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        CreateJobData {
            print_job: job.summary(&settings.server.public_url),
        },
        "Print job created",
    )))
}

pub async fn get_job(
    store: web::Data<JobStore>,
    settings: web::Data<Settings>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let job = store.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(job.summary(&settings.server.public_url))))
}

pub async fn download_job(
    store: web::Data<JobStore>,
    path: web::Path<Uuid>,
) -> Result<NamedFile, AppError> {
    let job = store.get(path.into_inner()).await?;
    let pdf = ready_pdf(&job)?;

    let file = NamedFile::open_async(pdf).await?;
    Ok(file
        .set_content_type(mime::APPLICATION_PDF)
        .set_content_disposition(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(format!("qr-labels-{}.pdf", job.id))],
        }))
}

#[tracing::instrument(skip_all, fields(job_id = %body.job_id))]
pub async fn email_to_printer(
    store: web::Data<JobStore>,
    mailer: web::Data<PrinterMailer>,
    body: web::Json<EmailToPrinterRequest>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;

    let job = store.get(body.job_id).await?;
    let pdf = tokio::fs::read(ready_pdf(&job)?).await?;

    mailer.send_job(&body.email, &job, pdf).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success_message(&format!(
        "Print job sent to {}",
        body.email
    ))))
}

// ==============================================================================
// QR HANDLERS
// ==============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewData {
    pub payload: QrPayload,
    pub image_data_url: String,
}

pub async fn preview(body: web::Json<PreviewRequest>) -> Result<HttpResponse, AppError> {
    match render_preview(&body.samples) {
        Preview::Ready { payload, data_url } => Ok(HttpResponse::Ok().json(ApiResponse::success(PreviewData {
            payload,
            image_data_url: data_url,
        }))),
        Preview::Unavailable(reason) => Err(AppError::BadRequest(format!("Preview unavailable: {}", reason))),
    }
}

pub async fn scan(body: web::Json<ScanRequest>) -> Result<HttpResponse, AppError> {
    let payload = QrPayload::parse(&body.qr_data)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(payload)))
}

// ==============================================================================
// ROUTES
// ==============================================================================

pub fn configure(cfg: &mut web::ServiceConfig) {
    let json = web::JsonConfig::default()
        .limit(4 * 1024 * 1024)
        .error_handler(|err, _req| {
            warn!("Rejected request body: {}", err);
            AppError::BadRequest(err.to_string()).into()
        });

    cfg.route("/health", web::get().to(health_check)).service(
        web::scope("/api/mobile-print")
            .app_data(json)
            .route("/create-job", web::post().to(create_job))
            .route("/email-to-printer", web::post().to(email_to_printer))
            .route("/jobs/{id}", web::get().to(get_job))
            .route("/jobs/{id}/download", web::get().to(download_job))
            .route("/preview", web::post().to(preview))
            .route("/scan", web::post().to(scan)),
    );
}

/// Record the render outcome; a job never stays pending once rendering has ended.
async fn settle_job(
    store: &JobStore,
    id: Uuid,
    path: PathBuf,
    rendered: Result<usize, AppError>,
) -> Result<PrintJobRecord, AppError> {
    match rendered {
        Ok(pages) => store.mark_ready(id, path, pages).await,
        Err(e) => {
            error!("Print job {} failed: {}", id, e);
            store.mark_failed(id, &e.to_string()).await?;
            Err(e)
        }
    }
}

fn pdf_path(labels_path: &str, id: Uuid) -> PathBuf {
    Path::new(labels_path).join(format!("{}.pdf", id))
}

fn ready_pdf(job: &PrintJobRecord) -> Result<&Path, AppError> {
    match (job.status, &job.pdf_path) {
        (JobStatus::Ready, Some(path)) => Ok(path.as_path()),
        (JobStatus::Failed, _) => Err(AppError::Conflict(format!(
            "Print job {} failed: {}",
            job.id,
            job.error.as_deref().unwrap_or("unknown error")
        ))),
        _ => Err(AppError::Conflict(format!("Print job {} is not ready", job.id))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{HttpPrintService, PrintService};
    use crate::config::MailTransportKind;
    use actix_web::{http::StatusCode, test, App, HttpServer};
    use serde_json::{json, Value};

    struct Harness {
        _dir: tempfile::TempDir,
        outbox: PathBuf,
        settings: Settings,
        store: web::Data<JobStore>,
        mailer: web::Data<PrinterMailer>,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.storage.labels_path = dir.path().join("labels").to_string_lossy().to_string();
        settings.storage.max_samples_per_job = 5;
        settings.mail.transport = MailTransportKind::File;
        settings.mail.file_dir = dir.path().join("outbox").to_string_lossy().to_string();

        let mailer = PrinterMailer::from_settings(&settings.mail).unwrap();
        Harness {
            outbox: dir.path().join("outbox"),
            _dir: dir,
            settings,
            store: web::Data::new(JobStore::new()),
            mailer: web::Data::new(mailer),
        }
    }

    macro_rules! app {
        ($h:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($h.settings.clone()))
                    .app_data($h.store.clone())
                    .app_data($h.mailer.clone())
                    .configure(configure),
            )
            .await
        };
    }

    fn job_body(copies: i64) -> Value {
        json!({
            "qrCodes": [
                { "poolId": "POOL-1", "laboratoryId": "LAB-1", "trapId": "TR-9", "collectionDate": "2024-06-01" },
                { "poolId": "POOL-2", "laboratoryId": "LAB-1" }
            ],
            "printFormat": "sheet",
            "labelSize": "medium",
            "copies": copies,
            "printMethod": "pdf"
        })
    }

    #[actix_rt::test]
    async fn health_reports_service() {
        let h = harness();
        let app = app!(h);
        let resp: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp["status"], "healthy");
        assert_eq!(resp["jobs"], 0);
    }

    #[actix_rt::test]
    async fn created_job_is_ready_and_downloadable() {
        let h = harness();
        let app = app!(h);

        let req = test::TestRequest::post()
            .uri("/api/mobile-print/create-job")
            .set_json(job_body(2))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        let job = &body["data"]["printJob"];
        assert_eq!(job["status"], "ready");
        assert_eq!(job["pagesNeeded"], 1);
        assert_eq!(job["labelCount"], 4);
        let id = job["id"].as_str().unwrap().to_string();
        assert!(job["downloadUrl"].as_str().unwrap().ends_with(&format!("/jobs/{}/download", id)));

        let req = test::TestRequest::get()
            .uri(&format!("/api/mobile-print/jobs/{}/download", id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("content-type").unwrap(), "application/pdf");
        let bytes = test::read_body(resp).await;
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[actix_rt::test]
    async fn invalid_jobs_are_rejected() {
        let h = harness();
        let app = app!(h);

        for body in [
            job_body(0),
            job_body(-1),
            json!({ "qrCodes": [] }),
            json!({ "qrCodes": [{ "poolId": "", "laboratoryId": "LAB-1" }] }),
        ] {
            let req = test::TestRequest::post()
                .uri("/api/mobile-print/create-job")
                .set_json(body)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }
        assert!(h.store.is_empty().await);
    }

    #[actix_rt::test]
    async fn oversized_jobs_are_rejected() {
        let h = harness();
        let app = app!(h);

        let samples: Vec<Value> = (0..6)
            .map(|i| json!({ "poolId": format!("POOL-{i}"), "laboratoryId": "LAB-1" }))
            .collect();
        let req = test::TestRequest::post()
            .uri("/api/mobile-print/create-job")
            .set_json(json!({ "qrCodes": samples, "copies": 1 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[actix_rt::test]
    async fn jobs_over_the_label_cap_are_rejected() {
        let h = harness();
        let app = app!(h);

        let mut body = job_body(4_294_967_295);
        body["printFormat"] = json!("adhesive");
        let req = test::TestRequest::post()
            .uri("/api/mobile-print/create-job")
            .set_json(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["message"].as_str().unwrap().contains("labels"));

        let copies = (h.settings.storage.max_labels_per_job / 2 + 1) as i64;
        let req = test::TestRequest::post()
            .uri("/api/mobile-print/create-job")
            .set_json(job_body(copies))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
        assert!(h.store.is_empty().await);
    }

    #[actix_rt::test]
    async fn interrupted_render_marks_the_job_failed() {
        let h = harness();
        let id = h
            .store
            .insert(PrintJobRecord::new(PrintJobRequest::new(vec![SampleRecord::new("P", "L")])))
            .await;

        let result = settle_job(
            &h.store,
            id,
            pdf_path(&h.settings.storage.labels_path, id),
            Err(AppError::InternalError("Label rendering was cancelled".to_string())),
        )
        .await;
        assert!(matches!(result, Err(AppError::InternalError(_))));

        let job = h.store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("cancelled"));

        let app = app!(h);
        let req = test::TestRequest::get()
            .uri(&format!("/api/mobile-print/jobs/{}/download", id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["message"].as_str().unwrap().contains("failed"));
    }

    #[actix_rt::test]
    async fn unknown_jobs_are_not_found() {
        let h = harness();
        let app = app!(h);

        let req = test::TestRequest::get()
            .uri(&format!("/api/mobile-print/jobs/{}", Uuid::new_v4()))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post()
            .uri("/api/mobile-print/email-to-printer")
            .set_json(json!({ "jobId": Uuid::new_v4(), "email": "printer@lab.example" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_rt::test]
    async fn pending_jobs_cannot_be_emailed() {
        let h = harness();
        let app = app!(h);
        let id = h
            .store
            .insert(PrintJobRecord::new(PrintJobRequest::new(vec![SampleRecord::new("P", "L")])))
            .await;

        let req = test::TestRequest::post()
            .uri("/api/mobile-print/email-to-printer")
            .set_json(json!({ "jobId": id, "email": "printer@lab.example" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::get()
            .uri(&format!("/api/mobile-print/jobs/{}/download", id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);
    }

    #[actix_rt::test]
    async fn email_rejects_bad_addresses() {
        let h = harness();
        let app = app!(h);
        let req = test::TestRequest::post()
            .uri("/api/mobile-print/email-to-printer")
            .set_json(json!({ "jobId": Uuid::new_v4(), "email": "not-an-email" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn preview_renders_first_sample() {
        let h = harness();
        let app = app!(h);

        let req = test::TestRequest::post()
            .uri("/api/mobile-print/preview")
            .set_json(json!({ "qrCodes": [{ "poolId": "POOL-7", "laboratoryId": "LAB-2" }] }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["payload"]["p"], "POOL-7");
        assert_eq!(body["data"]["payload"]["t"], "surveillance_pool");
        assert!(body["data"]["imageDataUrl"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));

        let req = test::TestRequest::post()
            .uri("/api/mobile-print/preview")
            .set_json(json!({ "qrCodes": [] }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn scan_decodes_label_payloads() {
        let h = harness();
        let app = app!(h);

        let qr_data = QrPayload::encode(&SampleRecord::new("POOL-3", "LAB-3")).to_json();
        let req = test::TestRequest::post()
            .uri("/api/mobile-print/scan")
            .set_json(json!({ "qrData": qr_data }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["p"], "POOL-3");
        assert_eq!(body["data"]["lab"], "LAB-3");

        let req = test::TestRequest::post()
            .uri("/api/mobile-print/scan")
            .set_json(json!({ "qrData": r#"{"v":"1.0","t":"inventory","p":"X","lab":"L"}"# }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn http_client_drives_the_running_server() {
        let mut h = harness();
        let store = h.store.clone();
        let mailer = h.mailer.clone();

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        h.settings.server.public_url = format!("http://{}", addr);
        let settings = web::Data::new(h.settings.clone());

        let server = HttpServer::new(move || {
            App::new()
                .app_data(settings.clone())
                .app_data(store.clone())
                .app_data(mailer.clone())
                .configure(configure)
        })
        .workers(1)
        .listen(listener)
        .unwrap()
        .run();
        let handle = server.handle();
        actix_rt::spawn(server);

        let service = HttpPrintService::new(&format!("http://{}", addr), Some(10)).unwrap();
        let request = PrintJobRequest::new(vec![SampleRecord::new("POOL-1", "LAB-1")]);

        let summary = service.create_job(&request).await.unwrap();
        assert_eq!(summary.status, JobStatus::Ready);

        let file = service.fetch_file(&summary.download_url).await.unwrap();
        assert_eq!(file.content_type.as_deref(), Some("application/pdf"));
        assert!(file.bytes.starts_with(b"%PDF"));

        service
            .email_to_printer(&summary.id, "printer@lab.example")
            .await
            .unwrap();
        assert_eq!(std::fs::read_dir(&h.outbox).unwrap().count(), 1);

        let mut invalid = request.clone();
        invalid.copies = 0;
        assert!(matches!(
            service.create_job(&invalid).await,
            Err(AppError::ExternalService(_))
        ));

        handle.stop(true).await;
    }
}
