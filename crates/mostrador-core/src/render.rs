//! # Document Renderer
//!
//! Turns a committed sale plus its invoice or remito into a fixed-layout
//! printable page.
//!
//! ## Page Layout
//! ```text
//! ┌──────────────────────────────── 80 cols ───────────────────────────────┐
//! │ ====================================================================== │
//! │                                 [ B ]                                  │
//! │ Issuer name                                               FACTURA      │
//! │ Issuer address                              Nro 00003-00000042         │
//! │ ...                                                                    │
//! │ ---------------------------------------------------------------------- │
//! │ Buyer block                                                            │
//! │ ---------------------------------------------------------------------- │
//! │ Cant.   Descripcion                          P. Unit.          Importe │
//! │ line items, padded to 12 rows (max 30, the sale line limit)            │
//! │ ---------------------------------------------------------------------- │
//! │ Totals                                                                 │
//! │ CAE / barcode / QR   (electronic invoices only)                        │
//! │ blank lines up to row 66, then a form feed                             │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rendering is a pure function: the only time-dependent value on the page
//! is the `generated_at` stamp handed in by the caller.

use chrono::{DateTime, Utc};

use crate::error::RenderError;
use crate::fiscal::{barcode_digits, qr_payload_url, IssuerProfile, DOC_TYPE_CUIT, DOC_TYPE_DNI};
use crate::money::Money;
use crate::types::{
    checked_lines_total, DocumentKind, DocumentType, Invoice, LineItem, PaymentType, Remito, Sale,
    TaxCategory,
};

// =============================================================================
// Constants
// =============================================================================

/// Characters per line.
pub const PAGE_WIDTH: usize = 80;

/// Lines per page.
pub const PAGE_HEIGHT: usize = 66;

/// Rows the item table always occupies.
pub const MIN_ITEM_ROWS: usize = 12;

/// Rows the item table can hold. Sales longer than this are refused before
/// commit, so a committed sale always fits.
pub const MAX_ITEM_ROWS: usize = crate::MAX_SALE_LINES;

/// Terminates the page.
pub const FORM_FEED: u8 = 0x0C;

/// Metadata of the document being rendered.
#[derive(Debug, Clone, Copy)]
pub enum DocumentMeta<'a> {
    Invoice(&'a Invoice),
    Remito(&'a Remito),
}

impl DocumentMeta<'_> {
    fn sale_id(&self) -> &str {
        match self {
            DocumentMeta::Invoice(invoice) => &invoice.sale_id,
            DocumentMeta::Remito(remito) => &remito.sale_id,
        }
    }

    fn kind(&self) -> DocumentKind {
        match self {
            DocumentMeta::Invoice(_) => DocumentKind::Invoice,
            DocumentMeta::Remito(_) => DocumentKind::Remito,
        }
    }
}

// =============================================================================
// Page Builder
// =============================================================================

/// Line-oriented builder for a fixed-width text page.
struct Page {
    lines: Vec<String>,
    width: usize,
}

impl Page {
    fn new(width: usize) -> Self {
        Self {
            lines: Vec::with_capacity(PAGE_HEIGHT),
            width,
        }
    }

    /// Appends one line, folded to ASCII and cut to the page width.
    fn line(&mut self, s: &str) -> &mut Self {
        let mut text: String = to_ascii(s).chars().take(self.width).collect();
        let pad = self.width - text.len();
        text.extend(std::iter::repeat(' ').take(pad));
        self.lines.push(text);
        self
    }

    fn blank(&mut self) -> &mut Self {
        self.line("")
    }

    fn center(&mut self, s: &str) -> &mut Self {
        let text = to_ascii(s);
        let left = self.width.saturating_sub(text.len()) / 2;
        self.line(&format!("{}{}", " ".repeat(left), text))
    }

    /// Left text flush left, right text flush right.
    fn line_lr(&mut self, left: &str, right: &str) -> &mut Self {
        let left = to_ascii(left);
        let right = to_ascii(right);
        if left.len() + right.len() >= self.width {
            self.line(&format!("{} {}", left, right))
        } else {
            let spaces = self.width - left.len() - right.len();
            self.line(&format!("{}{}{}", left, " ".repeat(spaces), right))
        }
    }

    fn sep_double(&mut self) -> &mut Self {
        self.line(&"=".repeat(self.width))
    }

    fn sep_single(&mut self) -> &mut Self {
        self.line(&"-".repeat(self.width))
    }

    /// Splits a long token across as many lines as it needs.
    fn wrapped(&mut self, s: &str) -> &mut Self {
        let text = to_ascii(s);
        let chars: Vec<char> = text.chars().collect();
        for chunk in chars.chunks(self.width) {
            self.line(&chunk.iter().collect::<String>());
        }
        self
    }

    fn finish(self, height: usize) -> Result<Vec<u8>, RenderError> {
        if self.lines.len() > height {
            return Err(RenderError::PageOverflow {
                lines: self.lines.len(),
                max: height,
            });
        }

        let mut out = Vec::with_capacity(height * (self.width + 1) + 1);
        for line in &self.lines {
            out.extend_from_slice(line.as_bytes());
            out.push(b'\n');
        }
        for _ in self.lines.len()..height {
            out.extend(std::iter::repeat(b' ').take(self.width));
            out.push(b'\n');
        }
        out.push(FORM_FEED);
        Ok(out)
    }
}

/// Folds Spanish accented letters to ASCII; anything else non-ASCII is `?`.
fn to_ascii(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'Á' | 'À' | 'Ä' | 'Â' => 'A',
            'É' | 'È' | 'Ë' | 'Ê' => 'E',
            'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
            'Ó' | 'Ò' | 'Ö' | 'Ô' => 'O',
            'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
            'ñ' => 'n',
            'Ñ' => 'N',
            'º' | '°' => 'o',
            '\t' | '\n' | '\r' => ' ',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '?',
        })
        .collect()
}

fn amount(m: Money) -> String {
    format!("$ {}", m.to_document_string())
}

fn category_label(category: Option<TaxCategory>) -> &'static str {
    match category {
        Some(TaxCategory::RegisteredTaxpayer) => "IVA Responsable Inscripto",
        Some(TaxCategory::SimplifiedRegime) => "Responsable Monotributo",
        Some(TaxCategory::Exempt) => "IVA Exento",
        Some(TaxCategory::NonTaxable) => "No Alcanzado",
        Some(TaxCategory::FinalConsumer) | None => "Consumidor Final",
    }
}

fn payment_label(payment_type: PaymentType) -> &'static str {
    match payment_type {
        PaymentType::Cash => "Contado",
        PaymentType::Credit => "Cuenta corriente",
        PaymentType::Mixed => "Contado + Cuenta corriente",
    }
}

// =============================================================================
// Render
// =============================================================================

/// Renders `kind` for `sale` as a single printable page.
///
/// ## Arguments
/// * `kind` - Which document to print; must match `meta`
/// * `sale` - Committed sale snapshot, items included
/// * `meta` - The invoice or remito row for this sale
/// * `issuer` - Business identity for the header
/// * `generated_at` - Stamp printed in the footer
///
/// ## Returns
/// `PAGE_HEIGHT` lines of `PAGE_WIDTH` ASCII columns each, `\n` separated,
/// followed by a form feed.
pub fn render(
    kind: DocumentKind,
    sale: &Sale,
    meta: DocumentMeta<'_>,
    issuer: &IssuerProfile,
    generated_at: DateTime<Utc>,
) -> Result<Vec<u8>, RenderError> {
    check_integrity(kind, sale, &meta)?;

    let mut page = Page::new(PAGE_WIDTH);
    match meta {
        DocumentMeta::Invoice(invoice) => render_invoice(&mut page, sale, invoice, issuer),
        DocumentMeta::Remito(remito) => render_remito(&mut page, sale, remito, issuer),
    }

    page.sep_single()
        .line(&format!("Generado: {}", generated_at.format("%Y-%m-%d %H:%M:%S UTC")));

    page.finish(PAGE_HEIGHT)
}

fn check_integrity(kind: DocumentKind, sale: &Sale, meta: &DocumentMeta<'_>) -> Result<(), RenderError> {
    if meta.kind() != kind {
        return Err(RenderError::KindMismatch {
            kind: kind.to_string(),
        });
    }

    if meta.sale_id() != sale.id {
        return Err(RenderError::SaleMismatch {
            sale_id: sale.id.clone(),
            meta_sale_id: meta.sale_id().to_string(),
        });
    }

    // i64::MAX stands in for a sum that overflowed
    let lines = checked_lines_total(&sale.items).map_or(i64::MAX, |m| m.cents());
    if lines != sale.total_cents {
        return Err(RenderError::TotalsMismatch {
            lines,
            total: sale.total_cents,
        });
    }

    if sale.cash_amount_cents + sale.credit_amount_cents != sale.total_cents {
        return Err(RenderError::SplitMismatch {
            cash: sale.cash_amount_cents,
            credit: sale.credit_amount_cents,
            total: sale.total_cents,
        });
    }

    if sale.items.len() > MAX_ITEM_ROWS {
        return Err(RenderError::PageOverflow {
            lines: sale.items.len(),
            max: MAX_ITEM_ROWS,
        });
    }

    if let DocumentMeta::Invoice(invoice) = meta {
        if invoice.document_type.is_electronic() && invoice.authorization_code.is_none() {
            return Err(RenderError::MissingAuthorization {
                number: invoice.formatted_number(),
            });
        }
    }

    Ok(())
}

fn render_header(
    page: &mut Page,
    issuer: &IssuerProfile,
    glyph: char,
    title: &str,
    number: &str,
    date: &str,
) {
    page.sep_double()
        .center(&format!("[ {} ]", glyph))
        .line_lr(&issuer.business_name, title)
        .line_lr(&issuer.address, &format!("Nro {}", number))
        .line_lr(
            &format!("CUIT: {}", issuer.tax_id.as_deref().unwrap_or("-")),
            &format!("Fecha: {}", date),
        );

    let start = issuer
        .activity_start
        .map(|d| format!("Inicio de actividades: {}", d.format("%d/%m/%Y")))
        .unwrap_or_default();
    page.line_lr(issuer.condition.label(), &start);

    if let Some(iibb) = &issuer.gross_income_id {
        page.line(&format!("Ingresos Brutos: {}", iibb));
    }
}

fn render_invoice(page: &mut Page, sale: &Sale, invoice: &Invoice, issuer: &IssuerProfile) {
    let title = match invoice.document_type {
        DocumentType::Internal => "COMPROBANTE INTERNO",
        _ => "FACTURA",
    };
    let code = invoice
        .document_type
        .authority_code()
        .map(|c| format!("Cod. {:03}", c))
        .unwrap_or_else(|| "No valido como factura".to_string());

    render_header(
        page,
        issuer,
        invoice.document_type.glyph(),
        title,
        &invoice.formatted_number(),
        &invoice.issued_at.format("%d/%m/%Y").to_string(),
    );
    page.center(&code);

    // Buyer
    let doc = match invoice.buyer_doc_type {
        DOC_TYPE_CUIT => format!("CUIT: {}", invoice.buyer_doc_number),
        DOC_TYPE_DNI => format!("DNI: {}", invoice.buyer_doc_number),
        _ => "Doc: Sin identificar".to_string(),
    };
    page.sep_single()
        .line(&format!(
            "Cliente: {}",
            sale.client_name.as_deref().unwrap_or("Consumidor Final")
        ))
        .line_lr(&doc, category_label(sale.client_tax_category))
        .line(&format!("Condicion de venta: {}", payment_label(sale.payment_type)));

    render_items(page, &sale.items, true);

    // Totals
    if invoice.document_type.discriminates_vat() {
        page.line_lr("", &format!("Subtotal neto: {:>16}", amount(Money::from_cents(invoice.net_cents))))
            .line_lr("", &format!("IVA 21%: {:>16}", amount(Money::from_cents(invoice.tax_cents))));
    }
    page.line_lr("", &format!("TOTAL: {:>16}", amount(Money::from_cents(invoice.total_cents))));
    if sale.payment_type == PaymentType::Mixed {
        page.line_lr(
            &format!("Efectivo: {}", amount(Money::from_cents(sale.cash_amount_cents))),
            &format!("Cuenta corriente: {}", amount(Money::from_cents(sale.credit_amount_cents))),
        );
    }

    if let Some(code) = &invoice.authorization_code {
        render_authorization(page, invoice, issuer, code);
    }
}

fn render_authorization(page: &mut Page, invoice: &Invoice, issuer: &IssuerProfile, code: &str) {
    page.sep_single();
    if invoice.is_simulated() {
        page.center("*** AUTORIZACION SIMULADA - PENDIENTE DE CONFIRMACION ***");
    }

    let expiry = invoice
        .authorization_expiry
        .map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| "-".to_string());
    page.line_lr(&format!("CAE: {}", code), &format!("Vto. CAE: {}", expiry));

    if let Some(digits) = barcode_digits(issuer, invoice) {
        page.line(&format!("Codigo de barras: {}", digits));
    }
    if let Some(url) = qr_payload_url(issuer, invoice) {
        page.line("QR:").wrapped(&url);
    }
}

fn render_remito(page: &mut Page, sale: &Sale, remito: &Remito, issuer: &IssuerProfile) {
    render_header(
        page,
        issuer,
        'R',
        "REMITO",
        &remito.formatted_number(),
        &remito.generated_at.format("%d/%m/%Y").to_string(),
    );
    page.center("Documento no valido como factura");

    page.sep_single()
        .line(&format!(
            "Destinatario: {}",
            sale.client_name.as_deref().unwrap_or("Consumidor Final")
        ))
        .line_lr(
            &format!("Telefono: {}", sale.client_phone.as_deref().unwrap_or("-")),
            &format!("Venta: {}", sale.id),
        );

    render_items(page, &sale.items, false);

    let units: i64 = sale.items.iter().map(|i| i.quantity).sum();
    page.line_lr("", &format!("Total de unidades: {}", units))
        .blank()
        .line_lr("Recibi conforme: ____________________", "Aclaracion: ____________________");
}

fn render_items(page: &mut Page, items: &[LineItem], with_prices: bool) {
    page.sep_single()
        .line(&format!(
            "{:<8} {:<37} {:>15} {:>17}",
            "Cant.", "Descripcion", "P. Unit.", "Importe"
        ))
        .sep_single();

    for item in items {
        let name: String = to_ascii(&item.name).chars().take(37).collect();
        if with_prices {
            page.line(&format!(
                "{:<8} {:<37} {:>15} {:>17}",
                item.quantity,
                name,
                amount(Money::from_cents(item.unit_price_cents)),
                amount(item.line_total())
            ));
        } else {
            page.line(&format!("{:<8} {}", item.quantity, name));
        }
    }
    for _ in items.len()..MIN_ITEM_ROWS {
        page.blank();
    }

    page.sep_single();
}

// =============================================================================
// Unit Tests
// =============================================================================
