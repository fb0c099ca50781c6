use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;

// ==============================================================================
// ENUMS
// ==============================================================================

/// Page layout of a print job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum PrintFormat {
    #[serde(rename = "individual")]
    Individual,
    #[default]
    #[serde(rename = "sheet")]
    Sheet12,
    #[serde(rename = "adhesive")]
    Adhesive24,
}

impl PrintFormat {
    pub fn labels_per_page(&self) -> usize {
        match self {
            PrintFormat::Individual => 1,
            PrintFormat::Sheet12 => 12,
            PrintFormat::Adhesive24 => 24,
        }
    }

    /// Grid of (columns, rows) used when the layout is a full sheet.
    pub fn grid(&self) -> (usize, usize) {
        match self {
            PrintFormat::Individual => (1, 1),
            PrintFormat::Sheet12 => (3, 4),
            PrintFormat::Adhesive24 => (3, 8),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrintFormat::Individual => "individual",
            PrintFormat::Sheet12 => "sheet",
            PrintFormat::Adhesive24 => "adhesive",
        }
    }
}

impl FromStr for PrintFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "individual" | "single" => Ok(PrintFormat::Individual),
            "sheet" | "sheet12" | "sheet-12" => Ok(PrintFormat::Sheet12),
            "adhesive" | "adhesive24" | "adhesive-24" => Ok(PrintFormat::Adhesive24),
            _ => Err(AppError::Validation(format!("Invalid print format: {}", s))),
        }
    }
}

impl fmt::Display for PrintFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge length of the printed QR square.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum LabelSize {
    #[serde(rename = "small")]
    Small20mm,
    #[default]
    #[serde(rename = "medium")]
    Medium25mm,
    #[serde(rename = "large")]
    Large30mm,
}

impl LabelSize {
    pub fn qr_edge_mm(&self) -> f32 {
        match self {
            LabelSize::Small20mm => 20.0,
            LabelSize::Medium25mm => 25.0,
            LabelSize::Large30mm => 30.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LabelSize::Small20mm => "small",
            LabelSize::Medium25mm => "medium",
            LabelSize::Large30mm => "large",
        }
    }
}

impl FromStr for LabelSize {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "small" | "20mm" => Ok(LabelSize::Small20mm),
            "medium" | "25mm" => Ok(LabelSize::Medium25mm),
            "large" | "30mm" => Ok(LabelSize::Large30mm),
            _ => Err(AppError::Validation(format!("Invalid label size: {}", s))),
        }
    }
}

impl fmt::Display for LabelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum DeliveryMethod {
    #[default]
    #[serde(rename = "browser")]
    Browser,
    #[serde(rename = "pdf")]
    PdfDownload,
    #[serde(rename = "email")]
    EmailToPrinter,
    #[serde(rename = "share")]
    NativeShare,
}

impl DeliveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMethod::Browser => "browser",
            DeliveryMethod::PdfDownload => "pdf",
            DeliveryMethod::EmailToPrinter => "email",
            DeliveryMethod::NativeShare => "share",
        }
    }
}

impl FromStr for DeliveryMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "browser" | "print" => Ok(DeliveryMethod::Browser),
            "pdf" | "download" => Ok(DeliveryMethod::PdfDownload),
            "email" => Ok(DeliveryMethod::EmailToPrinter),
            "share" => Ok(DeliveryMethod::NativeShare),
            _ => Err(AppError::Validation(format!("Invalid print method: {}", s))),
        }
    }
}

impl fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Ready,
    Failed,
}

// ==============================================================================
// SAMPLE RECORDS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// One collected pool as supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SampleRecord {
    #[validate(length(min = 1, message = "Pool ID is required"))]
    pub pool_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trap_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_collection_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub collection_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collected_by: Option<String>,
    #[validate(length(min = 1, message = "Laboratory ID is required"))]
    pub laboratory_id: String,
}

impl SampleRecord {
    /// A record with only the mandatory fields populated.
    pub fn new(pool_id: &str, laboratory_id: &str) -> Self {
        Self {
            pool_id: pool_id.to_string(),
            trap_id: None,
            collection_date: None,
            coordinates: None,
            species: None,
            collected_by: None,
            laboratory_id: laboratory_id.to_string(),
        }
    }
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp, keeping only the calendar date.
pub fn parse_collection_date(raw: &str) -> Result<NaiveDate, AppError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|ts| ts.date_naive()))
        .map_err(|_| AppError::Validation(format!("Invalid collection date: {}", raw)))
}

fn deserialize_collection_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| parse_collection_date(&raw).map_err(serde::de::Error::custom))
        .transpose()
}

// ==============================================================================
// PRINT JOBS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct LabelOptions {
    #[serde(default = "default_true")]
    pub include_border: bool,
    #[serde(default = "default_true")]
    pub include_text: bool,
    #[serde(default)]
    pub include_logo: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LabelOptions {
    fn default() -> Self {
        Self {
            include_border: true,
            include_text: true,
            include_logo: false,
        }
    }
}

/// Body of `POST /api/mobile-print/create-job`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrintJobRequest {
    #[serde(rename = "qrCodes")]
    #[validate(length(min = 1, message = "At least one sample is required"), nested)]
    pub samples: Vec<SampleRecord>,
    #[serde(rename = "printFormat", default)]
    pub format: PrintFormat,
    #[serde(default)]
    pub label_size: LabelSize,
    #[validate(range(min = 1, message = "Copies must be at least 1"))]
    pub copies: u32,
    #[serde(default)]
    pub options: LabelOptions,
    #[serde(rename = "printMethod", default)]
    pub delivery_method: DeliveryMethod,
}

impl PrintJobRequest {
    /// A request with default layout and delivery settings and one copy per sample.
    pub fn new(samples: Vec<SampleRecord>) -> Self {
        Self {
            samples,
            format: PrintFormat::default(),
            label_size: LabelSize::default(),
            copies: 1,
            options: LabelOptions::default(),
            delivery_method: DeliveryMethod::default(),
        }
    }

    /// Display hint: pages needed for one copy of every sample.
    pub fn pages_needed(&self) -> usize {
        self.samples.len().div_ceil(self.format.labels_per_page())
    }

    /// Labels actually rendered, counting copies.
    pub fn label_count(&self) -> usize {
        self.samples.len().saturating_mul(self.copies as usize)
    }
}

/// Job descriptor returned by the print service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrintJobSummary {
    pub id: String,
    pub download_url: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages_needed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobData {
    pub print_job: PrintJobSummary,
}

/// What the caller sees once a job has been created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrintJobResult {
    pub job_id: String,
    pub download_url: String,
    pub status: JobStatus,
}

impl From<PrintJobSummary> for PrintJobResult {
    fn from(summary: PrintJobSummary) -> Self {
        Self {
            job_id: summary.id,
            download_url: summary.download_url,
            status: summary.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EmailToPrinterRequest {
    pub job_id: Uuid,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    #[serde(rename = "qrCodes")]
    pub samples: Vec<SampleRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub qr_data: String,
}

// ==============================================================================
// API RESPONSE WRAPPER
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn success_with_message(data: T, message: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.to_string()),
        }
    }
}

impl ApiResponse<()> {
    pub fn success_message(message: &str) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.to_string()),
        }
    }
}
