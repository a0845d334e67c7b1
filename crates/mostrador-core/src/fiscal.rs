//! # Fiscal Rules
//!
//! Everything about a tax-authority document that can be decided without
//! talking to the authority:
//!
//! - receiver-condition code table
//! - document type selection (A / B / C / internal)
//! - buyer document identification
//! - net / VAT split
//! - the request payload, the simulated authorization, the printed barcode
//!   and the QR verification URL
//!
//! ## Issuance Decision
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  issuer has tax id AND condition ∈ {registered, simplified}?            │
//! │      │                                                                  │
//! │      ├── no  ──► Internal  (no authority call, no CAE)                  │
//! │      │                                                                  │
//! │      └── yes ──► registered issuer ─┬─ buyer registered ──► Invoice A   │
//! │                                     └─ anyone else      ──► Invoice B   │
//! │                  simplified issuer ───────────────────────► Invoice C   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{AuthorizationSource, DocumentType, Invoice, LineItem, Sale, TaxCategory};
use crate::validation::normalize_tax_id;
use crate::VAT_RATE;

// =============================================================================
// Constants
// =============================================================================

/// Placeholder authorization code used while the authority is unreachable.
pub const SIMULATED_AUTHORIZATION_CODE: &str = "00000000000000";

/// Days a simulated authorization is considered valid.
pub const SIMULATED_VALIDITY_DAYS: i64 = 3;

/// Buyer document type: CUIT.
pub const DOC_TYPE_CUIT: i64 = 80;
/// Buyer document type: national identity document.
pub const DOC_TYPE_DNI: i64 = 96;
/// Buyer document type: anonymous final consumer.
pub const DOC_TYPE_FINAL_CONSUMER: i64 = 99;

/// Concept code for sales of goods.
pub const CONCEPT_PRODUCTS: u8 = 1;

/// Authority VAT aliquot id for 21%.
pub const VAT_ALIQUOT_21: u8 = 5;

/// Base URL of the authority's QR verification page.
pub const QR_BASE_URL: &str = "https://www.afip.gob.ar/fe/qr/?p=";

// =============================================================================
// Issuer
// =============================================================================

/// Tax condition of the business issuing the documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum IssuerCondition {
    RegisteredTaxpayer,
    SimplifiedRegime,
    Exempt,
    /// No tax registration; only internal documents are produced.
    #[default]
    Unregistered,
}

impl IssuerCondition {
    /// Label printed in the document header.
    pub const fn label(&self) -> &'static str {
        match self {
            IssuerCondition::RegisteredTaxpayer => "IVA Responsable Inscripto",
            IssuerCondition::SimplifiedRegime => "Responsable Monotributo",
            IssuerCondition::Exempt => "IVA Exento",
            IssuerCondition::Unregistered => "No inscripto",
        }
    }
}

/// Identity of the issuing business, printed on every document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct IssuerProfile {
    pub business_name: String,
    pub tax_id: Option<String>,
    pub address: String,
    pub condition: IssuerCondition,
    pub point_of_sale: u32,
    pub gross_income_id: Option<String>,
    #[ts(as = "Option<String>")]
    pub activity_start: Option<NaiveDate>,
}

impl IssuerProfile {
    /// Whether electronic invoices can be requested for this issuer.
    pub fn is_tax_registered(&self) -> bool {
        self.tax_id
            .as_deref()
            .map(|id| normalize_tax_id(id).len() == 11)
            .unwrap_or(false)
            && matches!(
                self.condition,
                IssuerCondition::RegisteredTaxpayer | IssuerCondition::SimplifiedRegime
            )
    }

    /// Issuer CUIT as a number, if it parses.
    pub fn tax_id_number(&self) -> Option<u64> {
        self.tax_id
            .as_deref()
            .and_then(|id| normalize_tax_id(id).parse().ok())
    }
}

// =============================================================================
// Buyer
// =============================================================================

/// Buyer tax data supplied when requesting an invoice.
///
/// Missing fields fall back to the client snapshot stored on the sale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BuyerTaxInfo {
    pub name: Option<String>,
    pub tax_id: Option<String>,
    pub tax_category: Option<TaxCategory>,
}

impl BuyerTaxInfo {
    /// Fills missing fields from the sale's client snapshot.
    pub fn or_from_sale(self, sale: &Sale) -> BuyerTaxInfo {
        BuyerTaxInfo {
            name: self.name.or_else(|| sale.client_name.clone()),
            tax_id: self.tax_id.or_else(|| sale.client_tax_id.clone()),
            tax_category: self.tax_category.or(sale.client_tax_category),
        }
    }
}

/// Receiver-condition code for a buyer's tax category.
///
/// | category             | code |
/// |----------------------|------|
/// | registered taxpayer  | 1    |
/// | exempt               | 4    |
/// | final consumer       | 5    |
/// | simplified regime    | 6    |
/// | non taxable          | 15   |
/// | unknown / missing    | 5    |
pub fn receiver_condition_code(category: Option<TaxCategory>) -> i64 {
    match category {
        Some(TaxCategory::RegisteredTaxpayer) => 1,
        Some(TaxCategory::Exempt) => 4,
        Some(TaxCategory::FinalConsumer) | None => 5,
        Some(TaxCategory::SimplifiedRegime) => 6,
        Some(TaxCategory::NonTaxable) => 15,
    }
}

/// Buyer identification as the authority expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerDocument {
    pub doc_type: i64,
    pub number: String,
}

/// Derives the buyer document from a raw tax id.
///
/// 11 digits is a CUIT, 7-8 digits a DNI; anything else is an anonymous
/// final consumer with number `0`.
pub fn buyer_document(tax_id: Option<&str>) -> BuyerDocument {
    let digits = tax_id.map(normalize_tax_id).unwrap_or_default();
    match digits.len() {
        11 => BuyerDocument {
            doc_type: DOC_TYPE_CUIT,
            number: digits,
        },
        7 | 8 => BuyerDocument {
            doc_type: DOC_TYPE_DNI,
            number: digits,
        },
        _ => BuyerDocument {
            doc_type: DOC_TYPE_FINAL_CONSUMER,
            number: "0".to_string(),
        },
    }
}

/// Picks the document type for a sale.
pub fn select_document_type(issuer: &IssuerProfile, buyer: Option<TaxCategory>) -> DocumentType {
    if !issuer.is_tax_registered() {
        return DocumentType::Internal;
    }

    match issuer.condition {
        IssuerCondition::RegisteredTaxpayer => match buyer {
            Some(TaxCategory::RegisteredTaxpayer) => DocumentType::InvoiceA,
            _ => DocumentType::InvoiceB,
        },
        IssuerCondition::SimplifiedRegime => DocumentType::InvoiceC,
        IssuerCondition::Exempt | IssuerCondition::Unregistered => DocumentType::Internal,
    }
}

/// `(net, tax)` for a VAT-inclusive total under `document_type`.
pub fn document_amounts(document_type: DocumentType, total: Money) -> (Money, Money) {
    if document_type.discriminates_vat() {
        total.split_inclusive_tax(VAT_RATE)
    } else {
        (total, Money::zero())
    }
}

// =============================================================================
// Authority Request
// =============================================================================

/// One line of the authority request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRequestLine {
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_cents: i64,
}

impl From<&LineItem> for InvoiceRequestLine {
    fn from(item: &LineItem) -> Self {
        InvoiceRequestLine {
            description: item.name.clone(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price_cents,
            total_cents: item.line_total().cents(),
        }
    }
}

/// Authorization request for one electronic invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub sale_id: String,
    pub issuer_tax_id: String,
    pub point_of_sale: u32,
    pub document_type: DocumentType,
    /// Authority voucher code (1, 6, 11).
    pub voucher_type: u16,
    /// Assigned after the sequence fetch.
    pub number: Option<i64>,
    pub concept: u8,
    pub date: NaiveDate,
    pub buyer_doc_type: i64,
    pub buyer_doc_number: String,
    pub receiver_condition: i64,
    pub net_cents: i64,
    pub tax_cents: i64,
    pub exempt_cents: i64,
    pub total_cents: i64,
    pub vat_aliquot: Option<u8>,
    pub currency: String,
    pub lines: Vec<InvoiceRequestLine>,
}

impl InvoiceRequest {
    /// Builds the request for `sale`. Returns `None` for internal documents.
    pub fn build(
        sale: &Sale,
        issuer: &IssuerProfile,
        buyer: &BuyerTaxInfo,
        date: NaiveDate,
    ) -> Option<InvoiceRequest> {
        let document_type = select_document_type(issuer, buyer.tax_category);
        let voucher_type = document_type.authority_code()?;
        let (net, tax) = document_amounts(document_type, sale.total());
        let doc = buyer_document(buyer.tax_id.as_deref());

        Some(InvoiceRequest {
            sale_id: sale.id.clone(),
            issuer_tax_id: issuer
                .tax_id
                .as_deref()
                .map(normalize_tax_id)
                .unwrap_or_default(),
            point_of_sale: issuer.point_of_sale,
            document_type,
            voucher_type,
            number: None,
            concept: CONCEPT_PRODUCTS,
            date,
            buyer_doc_type: doc.doc_type,
            buyer_doc_number: doc.number,
            receiver_condition: receiver_condition_code(buyer.tax_category),
            net_cents: net.cents(),
            tax_cents: tax.cents(),
            exempt_cents: 0,
            total_cents: sale.total_cents,
            vat_aliquot: document_type.discriminates_vat().then_some(VAT_ALIQUOT_21),
            currency: "PES".to_string(),
            lines: sale.items.iter().map(InvoiceRequestLine::from).collect(),
        })
    }

    /// Returns the request with its sequence number assigned.
    pub fn with_number(mut self, number: i64) -> Self {
        self.number = Some(number);
        self
    }
}

/// An authorization granted for a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub code: String,
    pub expiry: NaiveDate,
    pub number: i64,
    pub source: AuthorizationSource,
}

/// The flagged placeholder authorization used while the authority is down.
pub fn simulated_authorization(number: i64, today: NaiveDate) -> Authorization {
    Authorization {
        code: SIMULATED_AUTHORIZATION_CODE.to_string(),
        expiry: today + Duration::days(SIMULATED_VALIDITY_DAYS),
        number,
        source: AuthorizationSource::Simulated,
    }
}

// =============================================================================
// Printed Codes
// =============================================================================

/// Digits encoded in the Interleaved 2-of-5 barcode of an electronic invoice.
///
/// ```text
/// CUIT(11) + voucher type(3) + point of sale(5) + CAE(14) + expiry(8) + check(1)
/// ```
///
/// Returns `None` when a component is missing (internal documents).
pub fn barcode_digits(issuer: &IssuerProfile, invoice: &Invoice) -> Option<String> {
    let cuit = issuer.tax_id.as_deref().map(normalize_tax_id)?;
    let voucher = invoice.document_type.authority_code()?;
    let code = invoice.authorization_code.as_deref()?;
    let expiry = invoice.authorization_expiry?;

    let mut digits = format!(
        "{}{:03}{:05}{}{}",
        cuit,
        voucher,
        invoice.point_of_sale,
        code,
        expiry.format("%Y%m%d")
    );
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.push(check_digit(&digits));
    Some(digits)
}

/// Modulo-10 check digit: odd positions ×3 plus even positions.
pub fn check_digit(digits: &str) -> char {
    let (odd, even) = digits
        .chars()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .fold((0u32, 0u32), |(odd, even), (i, d)| {
            if i % 2 == 0 {
                (odd + d, even)
            } else {
                (odd, even + d)
            }
        });
    let total = odd * 3 + even;
    let check = (10 - total % 10) % 10;
    char::from_digit(check, 10).unwrap_or('0')
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QrPayload<'a> {
    ver: u8,
    fecha: String,
    cuit: u64,
    pto_vta: u32,
    tipo_cmp: u16,
    nro_cmp: i64,
    importe: f64,
    moneda: &'a str,
    ctz: u8,
    tipo_doc_rec: i64,
    nro_doc_rec: u64,
    tipo_cod_aut: &'a str,
    cod_aut: u64,
}

/// QR verification URL for an authorized invoice.
pub fn qr_payload_url(issuer: &IssuerProfile, invoice: &Invoice) -> Option<String> {
    let payload = QrPayload {
        ver: 1,
        fecha: invoice.issued_at.date_naive().format("%Y-%m-%d").to_string(),
        cuit: issuer.tax_id_number()?,
        pto_vta: invoice.point_of_sale,
        tipo_cmp: invoice.document_type.authority_code()?,
        nro_cmp: invoice.document_number,
        importe: invoice.total_cents as f64 / 100.0,
        moneda: "PES",
        ctz: 1,
        tipo_doc_rec: invoice.buyer_doc_type,
        nro_doc_rec: invoice.buyer_doc_number.parse().unwrap_or(0),
        tipo_cod_aut: "E",
        cod_aut: invoice.authorization_code.as_deref()?.parse().ok()?,
    };
    let json = serde_json::to_vec(&payload).ok()?;
    Some(format!("{}{}", QR_BASE_URL, BASE64.encode(json)))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PaymentType, SaleSource};
    use chrono::{TimeZone, Utc};

    fn issuer(condition: IssuerCondition, tax_id: Option<&str>) -> IssuerProfile {
        IssuerProfile {
            business_name: "Distribuidora El Sol".into(),
            tax_id: tax_id.map(str::to_string),
            address: "San Martín 100".into(),
            condition,
            point_of_sale: 3,
            gross_income_id: None,
            activity_start: None,
        }
    }

    fn sale(total: i64) -> Sale {
        Sale {
            id: "sale-1".into(),
            client_id: None,
            client_name: Some("Juan Pérez".into()),
            client_phone: None,
            client_tax_id: Some("20-12345678-6".into()),
            client_tax_category: Some(TaxCategory::RegisteredTaxpayer),
            seller_id: None,
            seller_name: None,
            payment_type: PaymentType::Cash,
            cash_amount_cents: total,
            credit_amount_cents: 0,
            total_cents: total,
            source: SaleSource::Direct,
            order_id: None,
            invoice_emitted: false,
            invoice_number: None,
            remito_number: None,
            created_at: Utc::now(),
            items: vec![LineItem {
                product_id: "p-1".into(),
                name: "Aceite 1L".into(),
                unit_price_cents: total,
                quantity: 1,
            }],
        }
    }

    #[test]
    fn test_receiver_condition_table() {
        assert_eq!(receiver_condition_code(Some(TaxCategory::RegisteredTaxpayer)), 1);
        assert_eq!(receiver_condition_code(Some(TaxCategory::Exempt)), 4);
        assert_eq!(receiver_condition_code(Some(TaxCategory::FinalConsumer)), 5);
        assert_eq!(receiver_condition_code(Some(TaxCategory::SimplifiedRegime)), 6);
        assert_eq!(receiver_condition_code(Some(TaxCategory::NonTaxable)), 15);
        assert_eq!(receiver_condition_code(None), 5);
    }

    #[test]
    fn test_document_type_selection() {
        let ri = issuer(IssuerCondition::RegisteredTaxpayer, Some("30-71234567-1"));
        assert_eq!(
            select_document_type(&ri, Some(TaxCategory::RegisteredTaxpayer)),
            DocumentType::InvoiceA
        );
        assert_eq!(
            select_document_type(&ri, Some(TaxCategory::FinalConsumer)),
            DocumentType::InvoiceB
        );
        assert_eq!(select_document_type(&ri, None), DocumentType::InvoiceB);

        let mono = issuer(IssuerCondition::SimplifiedRegime, Some("20123456786"));
        assert_eq!(
            select_document_type(&mono, Some(TaxCategory::RegisteredTaxpayer)),
            DocumentType::InvoiceC
        );

        let no_cuit = issuer(IssuerCondition::RegisteredTaxpayer, None);
        assert_eq!(select_document_type(&no_cuit, None), DocumentType::Internal);

        let unregistered = issuer(IssuerCondition::Unregistered, Some("20123456786"));
        assert_eq!(
            select_document_type(&unregistered, None),
            DocumentType::Internal
        );
    }

    #[test]
    fn test_buyer_document() {
        assert_eq!(
            buyer_document(Some("20-12345678-6")),
            BuyerDocument {
                doc_type: DOC_TYPE_CUIT,
                number: "20123456786".into()
            }
        );
        assert_eq!(buyer_document(Some("12.345.678")).doc_type, DOC_TYPE_DNI);
        let anon = buyer_document(None);
        assert_eq!(anon.doc_type, DOC_TYPE_FINAL_CONSUMER);
        assert_eq!(anon.number, "0");
    }

    #[test]
    fn test_build_request_invoice_a() {
        let ri = issuer(IssuerCondition::RegisteredTaxpayer, Some("30-71234567-1"));
        let s = sale(12100);
        let buyer = BuyerTaxInfo::default().or_from_sale(&s);
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        let req = InvoiceRequest::build(&s, &ri, &buyer, date).unwrap();
        assert_eq!(req.document_type, DocumentType::InvoiceA);
        assert_eq!(req.voucher_type, 1);
        assert_eq!(req.point_of_sale, 3);
        assert_eq!((req.net_cents, req.tax_cents), (10000, 2100));
        assert_eq!(req.buyer_doc_type, DOC_TYPE_CUIT);
        assert_eq!(req.receiver_condition, 1);
        assert_eq!(req.vat_aliquot, Some(VAT_ALIQUOT_21));
        assert_eq!(req.lines.len(), 1);
        assert_eq!(req.number, None);
        assert_eq!(req.with_number(43).number, Some(43));
    }

    #[test]
    fn test_build_request_internal_is_none() {
        let plain = issuer(IssuerCondition::Unregistered, None);
        let s = sale(5000);
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert!(InvoiceRequest::build(&s, &plain, &BuyerTaxInfo::default(), date).is_none());
    }

    #[test]
    fn test_invoice_c_has_no_vat() {
        let (net, tax) = document_amounts(DocumentType::InvoiceC, Money::from_cents(12100));
        assert_eq!((net.cents(), tax.cents()), (12100, 0));
    }

    #[test]
    fn test_simulated_authorization() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 30).unwrap();
        let auth = simulated_authorization(7, today);
        assert_eq!(auth.code, SIMULATED_AUTHORIZATION_CODE);
        assert_eq!(auth.expiry, NaiveDate::from_ymd_opt(2026, 4, 2).unwrap());
        assert_eq!(auth.source, AuthorizationSource::Simulated);
    }

    #[test]
    fn test_check_digit() {
        // odd = 0+2+4+6+8 = 20, even = 1+3+5+7+9 = 25, 20*3+25 = 85 → 5
        assert_eq!(check_digit("0123456789"), '5');
        assert_eq!(check_digit("0000"), '0');
    }

    fn invoice() -> Invoice {
        Invoice {
            id: "inv-1".into(),
            sale_id: "sale-1".into(),
            document_type: DocumentType::InvoiceB,
            point_of_sale: 3,
            document_number: 42,
            authorization_code: Some("71234567890123".into()),
            authorization_expiry: NaiveDate::from_ymd_opt(2026, 3, 12),
            authorization_source: AuthorizationSource::Authority,
            receiver_condition: 5,
            buyer_doc_type: DOC_TYPE_FINAL_CONSUMER,
            buyer_doc_number: "0".into(),
            net_cents: 10000,
            tax_cents: 2100,
            total_cents: 12100,
            issued_at: Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_barcode_digits_layout() {
        let ri = issuer(IssuerCondition::RegisteredTaxpayer, Some("30-71234567-1"));
        let digits = barcode_digits(&ri, &invoice()).unwrap();
        assert_eq!(digits.len(), 11 + 3 + 5 + 14 + 8 + 1);
        assert!(digits.starts_with("3071234567100600003"));
        let (body, check) = digits.split_at(digits.len() - 1);
        assert_eq!(check.chars().next(), Some(check_digit(body)));
    }

    #[test]
    fn test_qr_url_decodes_to_json() {
        let ri = issuer(IssuerCondition::RegisteredTaxpayer, Some("30-71234567-1"));
        let url = qr_payload_url(&ri, &invoice()).unwrap();
        let encoded = url.strip_prefix(QR_BASE_URL).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&BASE64.decode(encoded).unwrap()).unwrap();
        assert_eq!(json["ptoVta"], 3);
        assert_eq!(json["tipoCmp"], 6);
        assert_eq!(json["nroCmp"], 42);
        assert_eq!(json["codAut"], 71234567890123u64);
        assert_eq!(json["fecha"], "2026-03-02");
    }
}
