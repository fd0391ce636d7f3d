use crate::{
    db::DbPool,
    entities::{order::Entity as Order, user},
    errors::ServiceError,
    services::orders::{load_detail, OrderDetail},
};
use chrono::{DateTime, Utc};
use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
};
use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use std::io::BufWriter;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

const PAGE_WIDTH: Mm = Mm(210.0);
const PAGE_HEIGHT: Mm = Mm(297.0);
const MARGIN_LEFT: f32 = 20.0;
const TOP: f32 = 277.0;
const BOTTOM: f32 = 25.0;

const COL_QUANTITY: f32 = 110.0;
const COL_UNIT_PRICE: f32 = 135.0;
const COL_TOTAL: f32 = 165.0;

const PICKUP_INSTRUCTIONS: [&str; 4] = [
    "Present this invoice at the pharmacy counter to collect your order.",
    "Payment is made at pickup.",
    "Bring a valid identity document.",
    "Prescription medicines are only handed over on presentation of the prescription.",
];

/// Everything printed on an invoice
#[derive(Debug, Clone)]
pub struct InvoiceData {
    pub order_number: String,
    pub ordered_at: DateTime<Utc>,
    pub customer_name: String,
    pub customer_email: String,
    pub status_label: String,
    pub lines: Vec<InvoiceLine>,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct InvoiceLine {
    pub medicine_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

impl InvoiceData {
    pub fn new(detail: &OrderDetail, customer: &user::Model) -> Self {
        Self {
            order_number: detail.order.order_number.clone(),
            ordered_at: detail.order.created_at,
            customer_name: customer.display_name(),
            customer_email: customer.email.clone(),
            status_label: detail.status_label.clone(),
            lines: detail
                .items
                .iter()
                .map(|line| InvoiceLine {
                    medicine_name: line.medicine_name.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    total_price: line.total_price,
                })
                .collect(),
            total_amount: detail.order.total_amount,
        }
    }
}

/// Rendered invoice ready to be served as an attachment
#[derive(Debug, Clone)]
pub struct Invoice {
    pub filename: String,
    pub bytes: Vec<u8>,
}

fn pdf_error(context: &str, e: impl std::fmt::Display) -> ServiceError {
    ServiceError::PdfError(format!("{}: {}", context, e))
}

fn money(amount: Decimal, currency: &str) -> String {
    format!("{:.2} {}", amount.round_dp(2), currency)
}

/// Writes text top-down, starting a new page when the bottom margin is reached
struct PageWriter<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
    pages: usize,
}

impl<'a> PageWriter<'a> {
    fn text(&self, text: &str, size: f32, x: f32, font: &IndirectFontRef) {
        self.layer.use_text(text, size, Mm(x), Mm(self.y), font);
    }

    fn advance(&mut self, by: f32) {
        self.y -= by;
        if self.y < BOTTOM {
            self.pages += 1;
            let (page, layer) =
                self.doc
                    .add_page(PAGE_WIDTH, PAGE_HEIGHT, format!("Page {}", self.pages));
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = TOP;
        }
    }
}

/// Lays out a one-order invoice on A4 pages and returns the PDF bytes
pub fn render_invoice(
    data: &InvoiceData,
    pharmacy_name: &str,
    currency: &str,
) -> Result<Vec<u8>, ServiceError> {
    let title = format!("Invoice {}", data.order_number);
    let (doc, page, layer) = PdfDocument::new(&title, PAGE_WIDTH, PAGE_HEIGHT, "Page 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| pdf_error("font", e))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| pdf_error("font", e))?;

    let mut out = PageWriter {
        layer: doc.get_page(page).get_layer(layer),
        doc: &doc,
        y: TOP,
        pages: 1,
    };

    out.text(pharmacy_name, 20.0, MARGIN_LEFT, &bold);
    out.advance(8.0);
    out.text("INVOICE", 12.0, MARGIN_LEFT, &font);
    out.advance(14.0);

    let metadata = [
        ("Order number", data.order_number.clone()),
        ("Date", data.ordered_at.format("%d/%m/%Y %H:%M").to_string()),
        ("Client", data.customer_name.clone()),
        ("Email", data.customer_email.clone()),
        ("Status", data.status_label.clone()),
    ];
    for (label, value) in &metadata {
        out.text(&format!("{}:", label), 10.0, MARGIN_LEFT, &bold);
        out.text(value, 10.0, MARGIN_LEFT + 35.0, &font);
        out.advance(6.0);
    }
    out.advance(8.0);

    out.text("Order details", 14.0, MARGIN_LEFT, &bold);
    out.advance(9.0);

    out.text("Medicine", 10.0, MARGIN_LEFT, &bold);
    out.text("Quantity", 10.0, COL_QUANTITY, &bold);
    out.text("Unit price", 10.0, COL_UNIT_PRICE, &bold);
    out.text("Total", 10.0, COL_TOTAL, &bold);
    out.advance(7.0);

    for line in &data.lines {
        out.text(&line.medicine_name, 10.0, MARGIN_LEFT, &font);
        out.text(&line.quantity.to_string(), 10.0, COL_QUANTITY, &font);
        out.text(&money(line.unit_price, currency), 10.0, COL_UNIT_PRICE, &font);
        out.text(&money(line.total_price, currency), 10.0, COL_TOTAL, &font);
        out.advance(6.0);
    }
    out.advance(3.0);
    out.text("TOTAL", 11.0, COL_UNIT_PRICE, &bold);
    out.text(&money(data.total_amount, currency), 11.0, COL_TOTAL, &bold);
    out.advance(16.0);

    out.text("Pickup instructions", 12.0, MARGIN_LEFT, &bold);
    out.advance(7.0);
    for instruction in PICKUP_INSTRUCTIONS {
        out.text(&format!("- {}", instruction), 9.0, MARGIN_LEFT, &font);
        out.advance(5.5);
    }
    out.advance(12.0);
    out.text(
        &format!("Thank you for your trust. {}", pharmacy_name),
        9.0,
        MARGIN_LEFT,
        &font,
    );
    drop(out);

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf).map_err(|e| pdf_error("save", e))?;
    buf.into_inner().map_err(|e| pdf_error("buffer", e))
}

/// PDF invoices for orders
#[derive(Clone)]
pub struct InvoiceService {
    db_pool: Arc<DbPool>,
    pharmacy_name: String,
    currency: String,
}

impl InvoiceService {
    pub fn new(db_pool: Arc<DbPool>, pharmacy_name: String, currency: String) -> Self {
        Self {
            db_pool,
            pharmacy_name,
            currency,
        }
    }

    /// `owner` restricts access to that user's orders
    #[instrument(skip(self))]
    pub async fn generate(
        &self,
        order_id: Uuid,
        owner: Option<Uuid>,
    ) -> Result<Invoice, ServiceError> {
        let db = &*self.db_pool;
        let order = Order::find_by_id(order_id)
            .one(db)
            .await?
            .filter(|o| owner.map_or(true, |user_id| o.user_id == user_id))
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let customer = user::Entity::find_by_id(order.user_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", order.user_id)))?;

        let detail = load_detail(db, order).await?;
        let data = InvoiceData::new(&detail, &customer);

        let pharmacy_name = self.pharmacy_name.clone();
        let currency = self.currency.clone();
        let bytes = tokio::task::spawn_blocking(move || {
            render_invoice(&data, &pharmacy_name, &currency)
        })
        .await
        .map_err(|e| {
            error!(error = %e, "Invoice rendering task failed");
            ServiceError::InternalError(e.to_string())
        })??;

        info!(%order_id, size = bytes.len(), "Invoice generated");
        Ok(Invoice {
            filename: format!("invoice_{}.pdf", detail.order.order_number),
            bytes,
        })
    }
}
