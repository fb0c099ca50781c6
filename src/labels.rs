use crate::errors::AppError;
use crate::models::{PrintFormat, PrintJobRequest, SampleRecord};
use crate::qrcode::{QRCodeService, QrMatrix, QrPayload};
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::*;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::debug;

// ==============================================================================
// PAGE GEOMETRY (millimetres, origin bottom-left)
// ==============================================================================

const A4_WIDTH: f32 = 210.0;
const A4_HEIGHT: f32 = 297.0;
const SHEET_MARGIN: f32 = 10.0;
const CELL_PADDING: f32 = 2.0;
const TEXT_GAP: f32 = 3.0;
const INDIVIDUAL_TEXT_WIDTH: f32 = 40.0;
const PT_TO_MM: f32 = 0.3528;

/// Where one label lands on its page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub sample_index: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelLayout {
    pub page_width: f32,
    pub page_height: f32,
    pub qr_edge: f32,
    pub pages: Vec<Vec<Placement>>,
}

/// Lay out `copies` consecutive labels per sample, in input order.
pub fn layout(request: &PrintJobRequest) -> LabelLayout {
    let requested_edge = request.label_size.qr_edge_mm();
    let (columns, rows) = request.format.grid();

    let (page_width, page_height, cell_width, cell_height, origin_x, origin_y) = match request.format {
        PrintFormat::Individual => {
            let text = if request.options.include_text { TEXT_GAP + INDIVIDUAL_TEXT_WIDTH } else { 0.0 };
            let width = requested_edge + text + CELL_PADDING * 2.0;
            let height = requested_edge + CELL_PADDING * 2.0;
            (width, height, width, height, 0.0, 0.0)
        }
        PrintFormat::Sheet12 | PrintFormat::Adhesive24 => {
            let cell_width = (A4_WIDTH - SHEET_MARGIN * 2.0) / columns as f32;
            let cell_height = (A4_HEIGHT - SHEET_MARGIN * 2.0) / rows as f32;
            (A4_WIDTH, A4_HEIGHT, cell_width, cell_height, SHEET_MARGIN, SHEET_MARGIN)
        }
    };

    let qr_edge = requested_edge
        .min(cell_height - CELL_PADDING * 2.0)
        .min(cell_width - CELL_PADDING * 2.0);

    let per_page = request.format.labels_per_page();
    let labels: Vec<usize> = (0..request.samples.len())
        .flat_map(|index| std::iter::repeat(index).take(request.copies as usize))
        .collect();

    let pages = labels
        .chunks(per_page)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .map(|(slot, &sample_index)| {
                    let column = slot % columns;
                    let row = slot / columns;
                    Placement {
                        sample_index,
                        x: origin_x + column as f32 * cell_width,
                        // first row at the top of the sheet
                        y: page_height - origin_y - (row + 1) as f32 * cell_height,
                        width: cell_width,
                        height: cell_height,
                    }
                })
                .collect()
        })
        .collect();

    LabelLayout {
        page_width,
        page_height,
        qr_edge,
        pages,
    }
}

// ==============================================================================
// PDF RENDERING
// ==============================================================================

/// Render all labels of a job into a PDF at `path`. Returns the page count.
pub fn render_pdf(request: &PrintJobRequest, title: &str, path: &Path) -> Result<usize, AppError> {
    let layout = layout(request);
    if layout.pages.is_empty() {
        return Err(AppError::Validation("Nothing to print".to_string()));
    }

    let matrices = request
        .samples
        .iter()
        .map(|sample| QRCodeService::modules(&QrPayload::encode(sample)))
        .collect::<Result<Vec<_>, _>>()?;

    let (doc, first_page, first_layer) = PdfDocument::new(
        title,
        Mm(layout.page_width),
        Mm(layout.page_height),
        "Labels",
    );

    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| AppError::InternalError(format!("Failed to load font: {}", e)))?;
    let font_bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| AppError::InternalError(format!("Failed to load bold font: {}", e)))?;
    let fonts = Fonts { regular: font, bold: font_bold };

    for (page_index, placements) in layout.pages.iter().enumerate() {
        let (page, layer) = if page_index == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(Mm(layout.page_width), Mm(layout.page_height), "Labels")
        };
        let canvas = doc.get_page(page).get_layer(layer);

        for placement in placements {
            let sample = &request.samples[placement.sample_index];
            draw_label(
                &canvas,
                &fonts,
                placement,
                layout.qr_edge,
                &matrices[placement.sample_index],
                sample,
                request,
            );
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::FileError(format!("Failed to create labels directory: {}", e)))?;
    }

    doc.save(&mut BufWriter::new(
        File::create(path)
            .map_err(|e| AppError::FileError(format!("Failed to create PDF file: {}", e)))?,
    ))
    .map_err(|e| AppError::InternalError(format!("Failed to save PDF: {}", e)))?;

    debug!("Rendered {} label pages to {}", layout.pages.len(), path.display());
    Ok(layout.pages.len())
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

fn draw_label(
    canvas: &PdfLayerReference,
    fonts: &Fonts,
    placement: &Placement,
    qr_edge: f32,
    matrix: &QrMatrix,
    sample: &SampleRecord,
    request: &PrintJobRequest,
) {
    let options = request.options;
    let black = Color::Greyscale(Greyscale::new(0.0, None));
    canvas.set_fill_color(black.clone());
    canvas.set_outline_color(black);

    if options.include_border {
        canvas.set_outline_thickness(0.5);
        let inset = 0.5;
        canvas.add_line(Line {
            points: vec![
                (point(placement.x + inset, placement.y + inset), false),
                (point(placement.x + placement.width - inset, placement.y + inset), false),
                (point(placement.x + placement.width - inset, placement.y + placement.height - inset), false),
                (point(placement.x + inset, placement.y + placement.height - inset), false),
            ],
            is_closed: true,
        });
    }

    let qr_x = placement.x + CELL_PADDING;
    let qr_y = placement.y + (placement.height - qr_edge) / 2.0;
    draw_matrix(canvas, matrix, qr_x, qr_y, qr_edge);

    let text_x = qr_x + qr_edge + TEXT_GAP;
    let text_width = placement.x + placement.width - CELL_PADDING - text_x;
    if text_width <= 0.0 {
        return;
    }

    let mut baseline = qr_y + qr_edge;
    if options.include_logo {
        baseline -= 5.0 * PT_TO_MM + 0.5;
        canvas.use_text(fit("LabGuard Pro", 5.0, text_width), 5.0, Mm(text_x), Mm(baseline), &fonts.bold);
    }

    if !options.include_text {
        return;
    }

    let mut lines: Vec<(String, f32, &IndirectFontRef)> = vec![(sample.pool_id.clone(), 8.0, &fonts.bold)];
    if let Some(trap) = &sample.trap_id {
        lines.push((format!("Trap {}", trap), 6.0, &fonts.regular));
    }
    if let Some(date) = sample.collection_date {
        lines.push((date.format("%Y-%m-%d").to_string(), 6.0, &fonts.regular));
    }
    if let Some(species) = &sample.species {
        lines.push((species.clone(), 6.0, &fonts.regular));
    }

    for (text, size, font) in lines {
        baseline -= size * PT_TO_MM + 1.0;
        if baseline < qr_y {
            break;
        }
        canvas.use_text(fit(&text, size, text_width), size, Mm(text_x), Mm(baseline), font);
    }
}

/// Dark modules are drawn as one filled rectangle per horizontal run.
fn draw_matrix(canvas: &PdfLayerReference, matrix: &QrMatrix, x: f32, y: f32, edge: f32) {
    let module = edge / matrix.width as f32;

    for row in 0..matrix.width {
        let top = y + edge - row as f32 * module;
        let mut column = 0;
        while column < matrix.width {
            if !matrix.is_dark(column, row) {
                column += 1;
                continue;
            }
            let start = column;
            while column < matrix.width && matrix.is_dark(column, row) {
                column += 1;
            }

            let left = x + start as f32 * module;
            let right = x + column as f32 * module;
            canvas.add_polygon(Polygon {
                rings: vec![vec![
                    (point(left, top - module), false),
                    (point(right, top - module), false),
                    (point(right, top), false),
                    (point(left, top), false),
                ]],
                mode: PaintMode::Fill,
                winding_order: WindingOrder::NonZero,
            });
        }
    }
}

fn point(x: f32, y: f32) -> Point {
    Point::new(Mm(x), Mm(y))
}

/// Truncate `text` to roughly fit `width_mm` at `size_pt` in Helvetica.
fn fit(text: &str, size_pt: f32, width_mm: f32) -> String {
    let max_chars = (width_mm / (size_pt * PT_TO_MM * 0.55)).floor().max(1.0) as usize;
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}
