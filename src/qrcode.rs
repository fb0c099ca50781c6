use crate::errors::AppError;
use crate::models::{LabelOptions, LabelSize, SampleRecord};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, Luma, Rgba, RgbaImage};
use qrcode::{Color, QrCode};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

pub const PAYLOAD_VERSION: &str = "1.0";
pub const PAYLOAD_TYPE: &str = "surveillance_pool";

// ==============================================================================
// QR PAYLOAD
// ==============================================================================

/// Compact payload embedded in each label's QR code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QrPayload {
    #[serde(rename = "v")]
    pub version: String,
    #[serde(rename = "t")]
    pub payload_type: String,
    #[serde(rename = "p")]
    pub pool_id: String,
    #[serde(rename = "tr", default, skip_serializing_if = "Option::is_none")]
    pub trap_id: Option<String>,
    #[serde(rename = "cd", default, skip_serializing_if = "Option::is_none")]
    pub collection_date: Option<String>,
    #[serde(rename = "lab")]
    pub laboratory_id: String,
}

impl QrPayload {
    pub fn encode(sample: &SampleRecord) -> Self {
        Self {
            version: PAYLOAD_VERSION.to_string(),
            payload_type: PAYLOAD_TYPE.to_string(),
            pool_id: sample.pool_id.clone(),
            trap_id: sample.trap_id.clone(),
            collection_date: sample
                .collection_date
                .map(|d| d.format("%Y-%m-%d").to_string()),
            laboratory_id: sample.laboratory_id.clone(),
        }
    }

    pub fn to_json(&self) -> String {
        // only strings and options, serialisation cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse a scanned payload, rejecting anything that is not one of our labels.
    pub fn parse(data: &str) -> Result<Self, AppError> {
        let payload: QrPayload = serde_json::from_str(data)
            .map_err(|e| AppError::Validation(format!("Invalid QR code data: {}", e)))?;

        if payload.payload_type != PAYLOAD_TYPE {
            return Err(AppError::Validation(format!(
                "Unknown payload type: {}",
                payload.payload_type
            )));
        }

        Ok(payload)
    }
}

// ==============================================================================
// QR CODE SERVICE
// ==============================================================================

pub struct QRCodeService;

impl QRCodeService {
    /// Module matrix of the QR code for a payload, row-major, `true` = dark.
    pub fn modules(payload: &QrPayload) -> Result<QrMatrix, AppError> {
        let code = QrCode::new(payload.to_json().as_bytes())
            .map_err(|e| AppError::InternalError(format!("Failed to generate QR code: {}", e)))?;

        let width = code.width();
        let dark = code
            .to_colors()
            .into_iter()
            .map(|c| c == Color::Dark)
            .collect();

        Ok(QrMatrix { width, dark })
    }

    /// Render a payload to a padded PNG image.
    pub fn render_png(payload: &QrPayload) -> Result<Vec<u8>, AppError> {
        let code = QrCode::new(payload.to_json().as_bytes())
            .map_err(|e| AppError::InternalError(format!("Failed to generate QR code: {}", e)))?;

        let image = code.render::<Luma<u8>>().build();
        let rgba_image = DynamicImage::ImageLuma8(image).to_rgba8();

        let padding = 20u32;
        let new_width = rgba_image.width() + (padding * 2);
        let new_height = rgba_image.height() + (padding * 2);

        let mut final_image = RgbaImage::from_pixel(new_width, new_height, Rgba([255, 255, 255, 255]));

        for (x, y, pixel) in rgba_image.enumerate_pixels() {
            final_image.put_pixel(x + padding, y + padding, *pixel);
        }

        let mut png_bytes = Vec::new();
        final_image
            .write_to(&mut Cursor::new(&mut png_bytes), image::ImageFormat::Png)
            .map_err(|e| AppError::InternalError(format!("Failed to encode QR image: {}", e)))?;

        Ok(png_bytes)
    }

    pub fn render_data_url(payload: &QrPayload) -> Result<String, AppError> {
        let png = Self::render_png(payload)?;
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
    }
}

#[derive(Debug, Clone)]
pub struct QrMatrix {
    pub width: usize,
    pub dark: Vec<bool>,
}

impl QrMatrix {
    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        self.dark[y * self.width + x]
    }
}

// ==============================================================================
// PREVIEW
// ==============================================================================

/// On-screen preview of the first label in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    Ready { payload: QrPayload, data_url: String },
    Unavailable(String),
}

impl Preview {
    pub fn data_url(&self) -> Option<&str> {
        match self {
            Preview::Ready { data_url, .. } => Some(data_url),
            Preview::Unavailable(_) => None,
        }
    }
}

/// Renders the first sample; a rendering failure leaves the preview blank.
pub fn render_preview(samples: &[SampleRecord]) -> Preview {
    let Some(first) = samples.first() else {
        return Preview::Unavailable("no samples selected".to_string());
    };

    let payload = QrPayload::encode(first);
    match QRCodeService::render_data_url(&payload) {
        Ok(data_url) => Preview::Ready { payload, data_url },
        Err(e) => {
            debug!("QR preview unavailable for pool {}: {}", first.pool_id, e);
            Preview::Unavailable(e.to_string())
        }
    }
}

/// Display settings the preview is redrawn for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreviewSettings {
    pub label_size: LabelSize,
    pub options: LabelOptions,
}

/// Caches the last preview and redraws when samples or display settings change.
#[derive(Debug, Default)]
pub struct PreviewState {
    inputs: Option<(Vec<SampleRecord>, PreviewSettings)>,
    preview: Option<Preview>,
    renders: usize,
}

impl PreviewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh(&mut self, samples: &[SampleRecord], settings: PreviewSettings) -> &Preview {
        let unchanged = matches!(
            &self.inputs,
            Some((last_samples, last_settings))
                if last_samples.as_slice() == samples && *last_settings == settings
        );

        if !unchanged || self.preview.is_none() {
            self.inputs = Some((samples.to_vec(), settings));
            self.renders += 1;
            self.preview = Some(render_preview(samples));
        }

        self.preview.get_or_insert_with(|| render_preview(samples))
    }

    /// Number of times the preview has been redrawn.
    pub fn renders(&self) -> usize {
        self.renders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn full_sample() -> SampleRecord {
        let mut sample = SampleRecord::new("POOL-042", "LAB-7");
        sample.trap_id = Some("TRAP-3".to_string());
        sample.collection_date = NaiveDate::from_ymd_opt(2024, 6, 1);
        sample.species = Some("Culex pipiens".to_string());
        sample
    }

    #[test]
    fn mandatory_only_sample_encodes_without_optional_fields() {
        let payload = QrPayload::encode(&SampleRecord::new("POOL-1", "LAB-1"));

        assert_eq!(payload.trap_id, None);
        assert_eq!(payload.collection_date, None);

        let value: serde_json::Value = serde_json::from_str(&payload.to_json()).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys.len(), 4);
        assert_eq!(value["v"], PAYLOAD_VERSION);
        assert_eq!(value["t"], PAYLOAD_TYPE);
        assert_eq!(value["p"], "POOL-1");
        assert_eq!(value["lab"], "LAB-1");
    }

    #[test]
    fn payload_carries_trap_and_date() {
        let payload = QrPayload::encode(&full_sample());
        let value: serde_json::Value = serde_json::from_str(&payload.to_json()).unwrap();

        assert_eq!(value["tr"], "TRAP-3");
        assert_eq!(value["cd"], "2024-06-01");
        // species is not part of the compact payload
        assert!(value.get("species").is_none());
    }

    #[test]
    fn parse_accepts_own_payload_and_rejects_foreign_ones() {
        let payload = QrPayload::encode(&full_sample());
        assert_eq!(QrPayload::parse(&payload.to_json()).unwrap(), payload);

        let foreign = r#"{"v":"1.0","t":"equipment","p":"X","lab":"L"}"#;
        assert!(matches!(QrPayload::parse(foreign), Err(AppError::Validation(_))));
        assert!(QrPayload::parse("not json").is_err());
    }

    #[test]
    fn matrix_is_square() {
        let matrix = QRCodeService::modules(&QrPayload::encode(&full_sample())).unwrap();
        assert_eq!(matrix.dark.len(), matrix.width * matrix.width);
        // finder pattern corner is always dark
        assert!(matrix.is_dark(0, 0));
    }

    #[test]
    fn preview_renders_first_sample_only() {
        let samples = vec![full_sample(), SampleRecord::new("POOL-2", "LAB-7")];
        match render_preview(&samples) {
            Preview::Ready { payload, data_url } => {
                assert_eq!(payload.pool_id, "POOL-042");
                assert!(data_url.starts_with("data:image/png;base64,"));
            }
            Preview::Unavailable(reason) => panic!("preview unavailable: {reason}"),
        }
    }

    #[test]
    fn empty_batch_has_no_preview() {
        let preview = render_preview(&[]);
        assert!(matches!(preview, Preview::Unavailable(_)));
        assert_eq!(preview.data_url(), None);
    }

    #[test]
    fn preview_redraws_on_settings_change() {
        let samples = vec![full_sample()];
        let mut state = PreviewState::new();
        let mut settings = PreviewSettings::default();

        state.refresh(&samples, settings);
        state.refresh(&samples, settings);
        assert_eq!(state.renders(), 1);

        settings.options.include_border = false;
        state.refresh(&samples, settings);
        assert_eq!(state.renders(), 2);

        settings.label_size = LabelSize::Small20mm;
        state.refresh(&samples, settings);
        assert_eq!(state.renders(), 3);

        let more = vec![full_sample(), SampleRecord::new("POOL-9", "LAB-7")];
        state.refresh(&more, settings);
        assert_eq!(state.renders(), 4);
    }
}
