// src/pdf_render.rs
//
// Renders the invoice PDF from a stored snapshot. Output is deterministic:
// the same snapshot always produces the same bytes, which is what makes the
// SHA-1 fingerprint usable as the email dispatch idempotency key. Document
// metadata dates are therefore pinned instead of taken from the clock.

use printpdf::{BuiltinFont, Line, Mm, PdfDocument, PdfLayerReference, Point};
use std::env;
use time::OffsetDateTime;

use crate::models::PdfInvoice;

#[derive(Debug, Clone, Default)]
pub struct CompanyInfo {
    pub company_no: String,
    pub name: String,
    pub address: String,
    pub contact: String,
    pub logo_path: String,
    pub logo_img_type: String,
}

impl CompanyInfo {
    pub fn from_env() -> CompanyInfo {
        CompanyInfo {
            company_no: env::var("COMPANY_NO").unwrap_or_default(),
            name: env::var("COMPANY_NAME").unwrap_or_default(),
            address: env::var("COMPANY_ADDRESS").unwrap_or_default(),
            contact: env::var("COMPANY_CONTACT").unwrap_or_default(),
            logo_path: env::var("COMPANY_LOGO_PATH").unwrap_or_default(),
            logo_img_type: env::var("COMPANY_LOGO_IMG_TYPE").unwrap_or_default(),
        }
    }
}

pub fn render_invoice_pdf(invoice: &PdfInvoice, company: &CompanyInfo) -> Result<Vec<u8>, String> {
    let (doc, page, layer) = PdfDocument::new("Invoice", Mm(210.0), Mm(297.0), "Layer 1");
    let doc = doc
        .with_document_id(invoice.invoice_id.clone())
        .with_creation_date(OffsetDateTime::UNIX_EPOCH)
        .with_mod_date(OffsetDateTime::UNIX_EPOCH)
        .with_metadata_date(OffsetDateTime::UNIX_EPOCH);

    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| format!("error adding font: {e}"))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| format!("error adding font: {e}"))?;
    let oblique = doc
        .add_builtin_font(BuiltinFont::HelveticaOblique)
        .map_err(|e| format!("error adding font: {e}"))?;

    let layer = doc.get_page(page).get_layer(layer);

    if !company.logo_path.is_empty() {
        embed_logo(&layer, company);
    }

    // Company header block on the left, the big word on the right.
    layer.use_text(company.name.clone(), 16.0, Mm(10.0), Mm(268.0), &bold);
    if !company.company_no.is_empty() {
        layer.use_text(
            format!("Company No : {}", company.company_no),
            11.0,
            Mm(10.0),
            Mm(261.0),
            &oblique,
        );
    }
    layer.use_text("INVOICE", 28.0, Mm(138.0), Mm(264.0), &bold);

    let mut y = 251.0;
    for line in break_address(&company.address) {
        layer.use_text(line, 11.0, Mm(10.0), Mm(y), &regular);
        y -= 5.5;
    }
    layer.use_text(format!("Tel: {}", company.contact), 11.0, Mm(10.0), Mm(y), &oblique);
    y -= 14.0;

    // Bill-to block.
    layer.use_text("Bill To:", 11.0, Mm(10.0), Mm(y), &bold);
    rule(&layer, Mm(10.0), Mm(y - 1.5), Mm(105.0), Mm(y - 1.5));
    y -= 6.5;
    layer.use_text(invoice.name.clone(), 11.0, Mm(10.0), Mm(y), &bold);
    y -= 5.5;
    for line in break_address(&invoice.address) {
        layer.use_text(line, 11.0, Mm(10.0), Mm(y), &regular);
        y -= 5.5;
    }
    layer.use_text(format!("Tel: {}", invoice.contact), 11.0, Mm(10.0), Mm(y), &oblique);
    y -= 5.5;

    // Invoice number and date on the right-hand side.
    layer.use_text("Invoice No.:", 11.0, Mm(120.0), Mm(251.0), &regular);
    layer.use_text(invoice.invoice_id.clone(), 11.0, Mm(146.0), Mm(251.0), &regular);
    layer.use_text("Invoice Date:", 11.0, Mm(120.0), Mm(245.5), &regular);
    layer.use_text(invoice.invoice_date.clone(), 11.0, Mm(146.0), Mm(245.5), &regular);

    y -= 10.0;

    // Line-item table: No | Description | Quantity | Unit Price | Price.
    let col_x = [10.0, 20.0, 95.0, 120.0, 160.0, 200.0];
    let row_h = 8.0;
    let table_top = y;

    let header = [
        "No".to_string(),
        "Description".to_string(),
        "Quantity".to_string(),
        format!("Unit Price ({})", invoice.currency_symbol),
        format!("Price ({})", invoice.currency_symbol),
    ];
    rule(&layer, Mm(col_x[0]), Mm(y), Mm(col_x[5]), Mm(y));
    for (i, cell) in header.into_iter().enumerate() {
        layer.use_text(cell, 10.0, Mm(col_x[i] + 2.0), Mm(y - 5.5), &bold);
    }
    y -= row_h;
    rule(&layer, Mm(col_x[0]), Mm(y), Mm(col_x[5]), Mm(y));

    let row = [
        "1".to_string(),
        invoice.description.clone(),
        format!("{}", invoice.unit),
        format!("{:.2}", invoice.price_per_unit),
        format!("{:.2}", invoice.price),
    ];
    for (i, cell) in row.into_iter().enumerate() {
        layer.use_text(cell, 10.0, Mm(col_x[i] + 2.0), Mm(y - 5.5), &regular);
    }
    y -= row_h;
    rule(&layer, Mm(col_x[0]), Mm(y), Mm(col_x[5]), Mm(y));

    for x in col_x {
        rule(&layer, Mm(x), Mm(table_top), Mm(x), Mm(table_top - 2.0 * row_h));
    }

    let totals = [
        ("Subtotal", format!("{:.2}", invoice.sub_total)),
        ("Tax Amount", format!("{:.2}", invoice.tax_amount)),
        ("Grand total", format!("{:.2}", invoice.grand_total)),
    ];
    for (label, value) in totals {
        layer.use_text(label, 10.0, Mm(col_x[3] + 2.0), Mm(y - 5.5), &bold);
        layer.use_text(value, 10.0, Mm(col_x[4] + 2.0), Mm(y - 5.5), &regular);
        y -= row_h;
        rule(&layer, Mm(col_x[3]), Mm(y), Mm(col_x[5]), Mm(y));
    }

    layer.use_text(
        "Note: The tax invoice is computer generated and no signature is required.",
        10.0,
        Mm(10.0),
        Mm(y - 10.0),
        &regular,
    );

    doc.save_to_bytes().map_err(|e| format!("error writing pdf: {e}"))
}

fn rule(layer: &PdfLayerReference, x1: Mm, y1: Mm, x2: Mm, y2: Mm) {
    let line = Line {
        points: vec![
            (Point::new(x1, y1), false),
            (Point::new(x2, y2), false),
        ],
        is_closed: false,
    };
    layer.set_outline_thickness(0.4);
    layer.add_line(line);
}

fn embed_logo(layer: &PdfLayerReference, company: &CompanyInfo) {
    use printpdf::image_crate::codecs::jpeg::JpegDecoder;
    use printpdf::image_crate::codecs::png::PngDecoder;
    use printpdf::{Image, ImageTransform};

    let file = match std::fs::File::open(&company.logo_path) {
        Ok(f) => f,
        Err(e) => {
            log::warn!("logo open error path={} error={e}", company.logo_path);
            return;
        }
    };
    let reader = std::io::BufReader::new(file);

    let image = match company.logo_img_type.to_lowercase().as_str() {
        "png" => PngDecoder::new(reader)
            .map_err(|e| e.to_string())
            .and_then(|d| Image::try_from(d).map_err(|e| e.to_string())),
        "jpg" | "jpeg" => JpegDecoder::new(reader)
            .map_err(|e| e.to_string())
            .and_then(|d| Image::try_from(d).map_err(|e| e.to_string())),
        other => Err(format!("unsupported logo image type: {other}")),
    };

    match image {
        Ok(image) => image.add_to_layer(
            layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(10.0)),
                translate_y: Some(Mm(275.0)),
                ..Default::default()
            },
        ),
        Err(e) => log::warn!("logo decode error path={} error={e}", company.logo_path),
    }
}

/// Splits an address on commas into printable lines, folding short fragments
/// into the following one.
fn break_address(input: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut prev = String::new();
    for part in input.split(',') {
        if part.len() < 10 {
            prev = part.to_string();
            continue;
        }
        let mut current = part.trim().to_string();
        if !prev.is_empty() {
            current = format!("{}, {}", prev, current);
        }
        lines.push(current);
        prev.clear();
    }
    lines
}
