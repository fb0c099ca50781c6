use crate::models::{DeliveryMethod, LabelOptions, LabelSize, PrintFormat, PrintJobRequest, SampleRecord};
use tracing::warn;

/// Assembles a [`PrintJobRequest`] from the print dialog's inputs.
///
/// Nothing beyond the type system is validated here: the full sample list is
/// forwarded in input order with all of its metadata, duplicate pool ids and
/// odd coordinates included. The one exception is `copies`, which is clamped
/// to at least 1 because a label sheet with zero copies has no meaning.
#[derive(Debug, Clone)]
pub struct PrintJobBuilder {
    samples: Vec<SampleRecord>,
    format: PrintFormat,
    label_size: LabelSize,
    copies: i64,
    options: LabelOptions,
    delivery_method: DeliveryMethod,
}

impl PrintJobBuilder {
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

    pub fn format(mut self, format: PrintFormat) -> Self {
        self.format = format;
        self
    }

    pub fn label_size(mut self, label_size: LabelSize) -> Self {
        self.label_size = label_size;
        self
    }

    /// Raw copy count as entered; clamped on [`build`](Self::build).
    pub fn copies(mut self, copies: i64) -> Self {
        self.copies = copies;
        self
    }

    pub fn options(mut self, options: LabelOptions) -> Self {
        self.options = options;
        self
    }

    pub fn delivery_method(mut self, delivery_method: DeliveryMethod) -> Self {
        self.delivery_method = delivery_method;
        self
    }

    pub fn build(self) -> PrintJobRequest {
        let copies = clamp_copies(self.copies);

        PrintJobRequest {
            samples: self.samples,
            format: self.format,
            label_size: self.label_size,
            copies,
            options: self.options,
            delivery_method: self.delivery_method,
        }
    }
}

/// One-shot form of [`PrintJobBuilder`].
pub fn build(
    samples: Vec<SampleRecord>,
    format: PrintFormat,
    label_size: LabelSize,
    copies: i64,
    options: LabelOptions,
    delivery_method: DeliveryMethod,
) -> PrintJobRequest {
    PrintJobBuilder::new(samples)
        .format(format)
        .label_size(label_size)
        .copies(copies)
        .options(options)
        .delivery_method(delivery_method)
        .build()
}

fn clamp_copies(copies: i64) -> u32 {
    if copies < 1 {
        warn!("copies {} is below 1, printing a single copy", copies);
        return 1;
    }
    u32::try_from(copies).unwrap_or(u32::MAX)
}
