// src/export.rs - CSV and PDF rendering over a finalized row set. Consumes
// the output of the listing/balance queries, never talks to the store.
use chrono::{Local, NaiveDate};
use printpdf::{BuiltinFont, Mm, PdfDocument, PdfLayerReference};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::balance::BalanceRow;
use crate::error::{ApiError, ApiResult};
use crate::models::{quantize, Solution};

// ==================== LOCALE ====================

/// Decimal formatting is an explicit parameter; nothing here reads
/// process-wide locale state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvLocale {
    /// Comma decimal separator (es-AR spreadsheet conventions).
    Es,
    /// Point decimal separator.
    En,
}

impl CsvLocale {
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "en" => CsvLocale::En,
            _ => CsvLocale::Es,
        }
    }

    fn decimal_separator(&self) -> char {
        match self {
            CsvLocale::Es => ',',
            CsvLocale::En => '.',
        }
    }
}

/// `0.####`: up to 4 fractional digits, trailing zeros trimmed, locale
/// decimal separator.
pub fn format_quantity(value: Decimal, locale: CsvLocale) -> String {
    let canonical = quantize(value).normalize().to_string();
    if locale.decimal_separator() == '.' {
        canonical
    } else {
        canonical.replace('.', &locale.decimal_separator().to_string())
    }
}

// ==================== CSV ====================

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Semicolon-separated so spreadsheet tools in comma-decimal locales split
/// columns correctly; BOM so they render accents correctly; CRLF rows.
pub fn balance_to_csv(rows: &[BalanceRow], locale: CsvLocale) -> ApiResult<Vec<u8>> {
    let mut buffer = UTF8_BOM.to_vec();

    {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .terminator(csv::Terminator::CRLF)
            .from_writer(&mut buffer);

        writer
            .write_record(["Fecha", "Código interno", "Nombre", "Cantidad base (g/ml)"])
            .map_err(render_err)?;

        for row in rows {
            writer
                .write_record([
                    row.preparation_date.format("%Y-%m-%d").to_string(),
                    row.internal_code.clone(),
                    row.name.clone(),
                    format_quantity(row.base_quantity.unwrap_or(Decimal::ZERO), locale),
                ])
                .map_err(render_err)?;
        }

        writer.flush().map_err(render_err)?;
    }

    Ok(buffer)
}

// ==================== PDF ====================

/// A4 table of the filtered listing, footer with generation timestamp.
pub fn solutions_to_pdf(
    rows: &[Solution],
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> ApiResult<Vec<u8>> {
    let (doc, first_page, first_layer) =
        PdfDocument::new("Informe de soluciones preparadas", Mm(210.0), Mm(297.0), "Capa 1");

    let font = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(render_err)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(render_err)?;

    let range_label = format!("Rango aplicado: {} - {}", range_part(from), range_part(to));
    let footer_label = format!("Generado el {}", Local::now().format("%d/%m/%Y %H:%M"));

    let table_header = |layer: &PdfLayerReference, y| {
        layer.use_text("Fecha", 10.0, Mm(15.0), Mm(y), &bold);
        layer.use_text("Nombre", 10.0, Mm(45.0), Mm(y), &bold);
        layer.use_text("Lote", 10.0, Mm(110.0), Mm(y), &bold);
        layer.use_text("Volumen (ml)", 10.0, Mm(140.0), Mm(y), &bold);
        layer.use_text("Conc. obtenida", 10.0, Mm(170.0), Mm(y), &bold);
    };
    let footer = |layer: &PdfLayerReference| {
        layer.use_text(footer_label.clone(), 9.0, Mm(145.0), Mm(12.0), &font);
    };

    let mut layer = doc.get_page(first_page).get_layer(first_layer);

    layer.use_text("Informe de soluciones preparadas", 16.0, Mm(50.0), Mm(280.0), &bold);
    layer.use_text(range_label, 11.0, Mm(15.0), Mm(270.0), &font);

    let mut y = 260.0;
    table_header(&layer, y);
    y -= 6.0;

    for row in rows {
        if y < 22.0 {
            footer(&layer);
            let (page, layer_index) = doc.add_page(Mm(210.0), Mm(297.0), "Capa 1");
            layer = doc.get_page(page).get_layer(layer_index);
            y = 280.0;
            table_header(&layer, y);
            y -= 6.0;
        }

        layer.use_text(
            row.preparation_date.format("%d/%m/%Y").to_string(),
            10.0,
            Mm(15.0),
            Mm(y),
            &font,
        );
        layer.use_text(clip(&row.name, 38), 10.0, Mm(45.0), Mm(y), &font);
        layer.use_text(row.lot.as_deref().unwrap_or(""), 10.0, Mm(110.0), Mm(y), &font);
        layer.use_text(format_volume(row.final_volume), 10.0, Mm(140.0), Mm(y), &font);
        layer.use_text(clip(&row.concentration_obtained, 24), 10.0, Mm(170.0), Mm(y), &font);
        y -= 6.0;
    }

    footer(&layer);

    doc.save_to_bytes().map_err(render_err)
}

fn range_part(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| "—".to_string())
}

/// `0.##`: two fractional digits at most, trailing zeros trimmed.
fn format_volume(volume: Decimal) -> String {
    volume
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
        .to_string()
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut clipped: String = text.chars().take(max_chars.saturating_sub(1)).collect();
        clipped.push('…');
        clipped
    }
}

fn render_err(err: impl std::fmt::Display) -> ApiError {
    ApiError::RenderError(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::day_start;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rows() -> Vec<BalanceRow> {
        vec![
            BalanceRow {
                preparation_date: day_start(date(2025, 9, 1)),
                internal_code: "X".to_string(),
                name: "Ácido clorhídrico 0.1 N".to_string(),
                base_quantity: Some(Decimal::from_str("10.5").unwrap()),
            },
            BalanceRow {
                preparation_date: day_start(date(2025, 9, 15)),
                internal_code: "X".to_string(),
                name: "NaOH".to_string(),
                base_quantity: None,
            },
        ]
    }

    #[test]
    fn test_format_quantity_locale_and_trimming() {
        let v = Decimal::from_str("10.5000").unwrap();
        assert_eq!(format_quantity(v, CsvLocale::Es), "10,5");
        assert_eq!(format_quantity(v, CsvLocale::En), "10.5");

        let v = Decimal::from_str("3.14159").unwrap();
        assert_eq!(format_quantity(v, CsvLocale::Es), "3,1416");

        assert_eq!(format_quantity(Decimal::ZERO, CsvLocale::Es), "0");
    }

    #[test]
    fn test_csv_layout() {
        let bytes = balance_to_csv(&rows(), CsvLocale::Es).unwrap();

        assert_eq!(&bytes[..3], &UTF8_BOM);
        let body = String::from_utf8(bytes[3..].to_vec()).unwrap();
        let lines: Vec<&str> = body.split("\r\n").collect();

        assert_eq!(lines[0], "Fecha;Código interno;Nombre;Cantidad base (g/ml)");
        assert_eq!(lines[1], "2025-09-01;X;Ácido clorhídrico 0.1 N;10,5");
        // Absent quantity renders as zero.
        assert_eq!(lines[2], "2025-09-15;X;NaOH;0");
    }

    #[test]
    fn test_csv_is_deterministic() {
        let rows = rows();
        let first = balance_to_csv(&rows, CsvLocale::Es).unwrap();
        let second = balance_to_csv(&rows, CsvLocale::Es).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_csv_empty_set_is_header_only() {
        let bytes = balance_to_csv(&[], CsvLocale::En).unwrap();
        let body = String::from_utf8(bytes[3..].to_vec()).unwrap();
        assert_eq!(body, "Fecha;Código interno;Nombre;Cantidad base (g/ml)\r\n");
    }

    fn solution(day: NaiveDate, name: &str) -> Solution {
        Solution {
            id: 1,
            preparation_date: day_start(day),
            internal_code: "X".to_string(),
            brand: "Merck".to_string(),
            name: name.to_string(),
            base_quantity: None,
            final_volume: Decimal::from_str("1000.50").unwrap(),
            lot: Some("L-01".to_string()),
            concentration_obtained: "0.0998 N".to_string(),
            reagent_id: "R-44".to_string(),
            expiry_date: None,
            row_version: 0,
            is_expired: false,
        }
    }

    #[test]
    fn test_pdf_renders_and_paginates() {
        let many: Vec<Solution> = (0..120).map(|_| solution(date(2025, 9, 1), "NaOH 0.1 N")).collect();
        let bytes = solutions_to_pdf(&many, Some(date(2025, 9, 1)), None).unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        // Empty set still yields a valid document.
        let empty = solutions_to_pdf(&[], None, None).unwrap();
        assert!(empty.starts_with(b"%PDF"));
    }

    #[test]
    fn test_volume_column_format() {
        assert_eq!(format_volume(Decimal::from_str("1000.50").unwrap()), "1000.5");
        assert_eq!(format_volume(Decimal::from_str("250").unwrap()), "250");
        assert_eq!(format_volume(Decimal::from_str("0.125").unwrap()), "0.13");
    }
}
