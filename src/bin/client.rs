use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use labguard_print::builder::PrintJobBuilder;
use labguard_print::client::HttpPrintService;
use labguard_print::config::Settings;
use labguard_print::dispatch::{DeliveryDispatcher, DeliveryOutcome};
use labguard_print::models::{DeliveryMethod, LabelOptions, LabelSize, PrintFormat, SampleRecord};
use labguard_print::platform::HeadlessPlatform;
use labguard_print::qrcode::{Preview, PreviewSettings, PreviewState};
use labguard_print::reporter::{JobReport, JobStatusReporter};

/// Print QR labels for surveillance sample pools.
#[derive(Parser, Debug)]
#[command(name = "labguard-print-client", version, about)]
struct Args {
    /// JSON file holding an array of sample records
    samples: PathBuf,

    /// Print service base URL (defaults to client.base_url)
    #[arg(long)]
    server: Option<String>,

    /// individual, sheet or adhesive
    #[arg(long, default_value = "sheet")]
    format: PrintFormat,

    /// small, medium or large
    #[arg(long, default_value = "medium")]
    size: LabelSize,

    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    copies: i64,

    #[arg(long)]
    no_border: bool,

    #[arg(long)]
    no_text: bool,

    #[arg(long)]
    logo: bool,

    /// browser, pdf, email or share
    #[arg(long, default_value = "pdf")]
    method: DeliveryMethod,

    /// Printer address used by the email method
    #[arg(long)]
    email: Option<String>,

    /// Where downloaded PDFs are written (defaults to client.download_dir)
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Show the first label's QR payload before submitting
    #[arg(long)]
    preview: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let settings = Settings::from_env().context("Failed to load configuration")?;

    let raw = std::fs::read_to_string(&args.samples)
        .with_context(|| format!("Failed to read {}", args.samples.display()))?;
    let samples: Vec<SampleRecord> =
        serde_json::from_str(&raw).with_context(|| format!("Invalid sample list in {}", args.samples.display()))?;

    let options = LabelOptions {
        include_border: !args.no_border,
        include_text: !args.no_text,
        include_logo: args.logo,
    };

    if args.preview {
        let mut preview = PreviewState::new();
        match preview.refresh(&samples, PreviewSettings { label_size: args.size, options }) {
            Preview::Ready { payload, .. } => println!("Preview: {}", payload.to_json()),
            Preview::Unavailable(reason) => println!("Preview unavailable: {}", reason),
        }
    }

    let request = PrintJobBuilder::new(samples)
        .format(args.format)
        .label_size(args.size)
        .copies(args.copies)
        .options(options)
        .delivery_method(args.method)
        .build();
    println!(
        "{} sample(s), {} label(s), {} page(s) per copy",
        request.samples.len(),
        request.label_count(),
        request.pages_needed()
    );

    let base_url = args.server.unwrap_or(settings.client.base_url);
    let download_dir = args
        .download_dir
        .unwrap_or_else(|| PathBuf::from(&settings.client.download_dir));

    let service = Arc::new(HttpPrintService::new(&base_url, settings.client.timeout_secs)?);
    let platform = Arc::new(HeadlessPlatform::new(download_dir, args.email));

    let dispatcher = DeliveryDispatcher::new(service, platform.clone());
    let mut reporter = JobStatusReporter::new(platform)
        .on_complete(|job_id| println!("Print job created: {}", job_id));

    match reporter.report(dispatcher.dispatch(&request).await) {
        JobReport::Created { delivery, .. } => {
            match delivery {
                DeliveryOutcome::EmailSkipped => println!("No printer email given, nothing sent"),
                DeliveryOutcome::DownloadFailed { reason, .. } => println!("Download failed: {}", reason),
                other => println!("Delivery: {:?}", other),
            }
            Ok(())
        }
        JobReport::Failed { message, .. } => anyhow::bail!(message),
    }
}
