//! Tax-advisor prompt rendering.

use std::fmt::Write as _;
use taxline_core::{LedgerEntry, LedgerKind, Rut};

/// Formats an amount rounded to whole units with `,` thousands separators.
#[must_use]
pub fn format_amount(value: f64) -> String {
    let rounded = format!("{value:.0}");
    let (sign, digits) = match rounded.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", rounded.as_str()),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{sign}{grouped}")
}

/// One ledger as prompt lines, or the "no data" sentence.
fn ledger_section(kind: LedgerKind, entries: Option<&[LedgerEntry]>) -> String {
    let Some(entries) = entries.filter(|e| !e.is_empty()) else {
        return format!("No se encontraron datos de {} recientes.", kind.label());
    };

    let mut out = String::new();
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let period = if entry.period.is_empty() {
            "N/A"
        } else {
            entry.period.as_str()
        };
        // Writing to a String cannot fail.
        let _ = write!(
            out,
            "- Periodo {period}: Total ${}, IVA ${}",
            format_amount(entry.total.unwrap_or(0.0)),
            format_amount(entry.iva.unwrap_or(0.0))
        );
    }
    out
}

/// Renders the tax-advisor prompt for a business.
///
/// `None` or empty ledgers render as a "no recent data" sentence, so a prompt is
/// always produced.
#[must_use]
pub fn build_vat_prompt(
    rut: &Rut,
    purchases: Option<&[LedgerEntry]>,
    sales: Option<&[LedgerEntry]>,
    question: &str,
) -> String {
    let purchases = ledger_section(LedgerKind::Purchases, purchases);
    let sales = ledger_section(LedgerKind::Sales, sales);

    format!(
        "
Contexto tributario para RUT {rut} (últimos meses disponibles):

**Resumen Compras:**
{purchases}

**Resumen Ventas:**
{sales}

Considerando la información anterior, responde la siguiente pregunta como un asesor tributario experto:

Pregunta: {question}
Respuesta:"
    )
}
