use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::Validate;

/// Default sell price = buy price × this factor when a batch line carries no
/// explicit sell price (40% markup).
pub const DEFAULT_MARKUP: f64 = 1.4;

/// Business default when an invoice omits expiration: delivery date + 1 year.
pub fn default_expiration(delivery_date: NaiveDate) -> NaiveDate {
    delivery_date
        .checked_add_months(Months::new(12))
        .unwrap_or(delivery_date)
}

/// The shop a session is operating on. Passed explicitly through every
/// shop-scoped call; there is no process-global active shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopContext {
    pub id: Uuid,
    pub name: String,
    pub contact_email: Option<String>,
    pub location: Option<String>,
    pub namespace: Option<String>,
}

impl ShopContext {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            contact_email: None,
            location: None,
            namespace: None,
        }
    }
}

/// Append-only audit entry on a product definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub user_id: Uuid,
    pub shop_id: Option<Uuid>,
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

/// Global (not shop-scoped) product catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDefinition {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_supplier_id: Option<Uuid>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub audit: Vec<AuditEntry>,
}

/// DTO for registering a product in the global catalog
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProduct {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub manufacturer: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub default_supplier_id: Option<Uuid>,
    #[serde(default)]
    pub images: Vec<String>,
    pub created_by_user_id: Uuid,
}

impl ProductDefinition {
    pub fn new(input: CreateProduct, shop_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: input.name,
            manufacturer: input.manufacturer,
            category: input.category,
            description: input.description,
            default_supplier_id: input.default_supplier_id,
            images: input.images,
            audit: vec![AuditEntry {
                user_id: input.created_by_user_id,
                shop_id,
                action: "created".to_string(),
                timestamp: Utc::now(),
            }],
        }
    }
}

/// Supplier: either shop-local (`shop_id` set) or a global linked-account
/// supplier (`linked_user_id` set) — exactly one of the two.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierProfile {
    pub id: Uuid,
    #[serde(default)]
    pub shop_id: Option<Uuid>,
    #[serde(default)]
    pub linked_user_id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl SupplierProfile {
    /// Enforces the one-of scope invariant.
    pub fn check_scope(&self) -> Result<(), &'static str> {
        match (self.shop_id.is_some(), self.linked_user_id.is_some()) {
            (true, false) | (false, true) => Ok(()),
            (true, true) => Err("supplier cannot be both shop-local and account-linked"),
            (false, false) => Err("supplier must be shop-local or account-linked"),
        }
    }
}

/// DTO for supplier registration
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSupplier {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub contact: Option<String>,
    /// Linked-account supplier when set; shop-local otherwise
    pub linked_user_id: Option<Uuid>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// One line of a delivery batch — a snapshot independent from live inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchLineItem {
    #[serde(default)]
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: i64,
    pub cost: f64,
    #[serde(default)]
    pub expiration: Option<NaiveDate>,
    #[serde(default)]
    pub sell_price: Option<f64>,
}

impl BatchLineItem {
    /// Only lines with a resolved product and positive quantity yield stock.
    pub fn is_stockable(&self) -> bool {
        self.product_id.is_some() && self.quantity > 0
    }
}

/// A received delivery. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub id: Uuid,
    pub shop_id: Uuid,
    #[serde(default)]
    pub supplier_id: Option<Uuid>,
    pub delivery_date: NaiveDate,
    #[serde(default)]
    pub inventory_date: Option<NaiveDate>,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub documents: Vec<String>,
    pub line_items: Vec<BatchLineItem>,
    pub created_at: DateTime<Utc>,
    pub created_by_user_id: Uuid,
}

/// DTO for batch creation
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBatch {
    pub supplier_id: Option<Uuid>,
    pub delivery_date: NaiveDate,
    pub inventory_date: Option<NaiveDate>,
    #[validate(length(max = 100))]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub documents: Vec<String>,
    pub line_items: Vec<BatchLineItem>,
    pub created_by_user_id: Uuid,
}

impl BatchRecord {
    pub fn new(ctx: &ShopContext, input: CreateBatch) -> Self {
        Self {
            id: Uuid::now_v7(),
            shop_id: ctx.id,
            supplier_id: input.supplier_id,
            delivery_date: input.delivery_date,
            inventory_date: input.inventory_date,
            invoice_number: input.invoice_number,
            documents: input.documents,
            line_items: input.line_items,
            created_at: Utc::now(),
            created_by_user_id: input.created_by_user_id,
        }
    }
}

/// Stock line lifecycle state
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    #[default]
    Active,
    Empty,
    Expired,
}

/// A physical stock line in a shop.
///
/// `inventory_uuid` is the durable identity. Availability requires both
/// `status == Active` and `quantity > 0`; readers must treat a zero
/// quantity and a non-active status identically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockItem {
    pub inventory_uuid: Uuid,
    pub shop_id: Uuid,
    pub product_id: Uuid,
    #[serde(default)]
    pub batch_id: Option<Uuid>,
    #[serde(default)]
    pub supplier_id: Option<Uuid>,
    #[serde(default)]
    pub buy_price: Option<f64>,
    #[serde(default)]
    pub sell_price: Option<f64>,
    pub quantity: i64,
    pub expiration: NaiveDate,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub status: StockStatus,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub scan_metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub created_by_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockItem {
    /// Derive a stock line from a batch line. Fresh identity, business
    /// defaults for missing expiration and sell price.
    pub fn from_batch_line(batch: &BatchRecord, line: &BatchLineItem) -> Option<Self> {
        if !line.is_stockable() {
            return None;
        }
        let now = Utc::now();
        Some(Self {
            inventory_uuid: Uuid::now_v7(),
            shop_id: batch.shop_id,
            product_id: line.product_id?,
            batch_id: Some(batch.id),
            supplier_id: batch.supplier_id,
            buy_price: Some(line.cost),
            sell_price: Some(
                line.sell_price
                    .unwrap_or(line.cost * DEFAULT_MARKUP),
            ),
            quantity: line.quantity,
            expiration: line
                .expiration
                .unwrap_or_else(|| default_expiration(batch.delivery_date)),
            location: None,
            status: StockStatus::Active,
            images: Vec::new(),
            scan_metadata: None,
            created_by_user_id: Some(batch.created_by_user_id),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_available(&self) -> bool {
        self.status == StockStatus::Active && self.quantity > 0
    }

    pub fn unit_cost(&self) -> f64 {
        self.buy_price.unwrap_or(0.0)
    }
}

/// One line of a sale ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleLine {
    pub product_id: Uuid,
    pub quantity: i64,
    pub price_at_sale: f64,
}

/// Append-only sale/consumption ledger entry. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleTransaction {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub items: Vec<SaleLine>,
    pub total_amount: f64,
    #[serde(default)]
    pub source: Option<String>,
}

/// Marketplace listing for a shop's product
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceListing {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub product_id: Uuid,
    pub title: String,
    pub price: f64,
    pub quantity: i64,
    pub active: bool,
}

/// Registered user account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Shop master record (the persisted counterpart of [`ShopContext`])
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopRecord {
    pub id: Uuid,
    pub name: String,
    pub owner_user_id: Uuid,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Delivery driver profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverProfile {
    pub id: Uuid,
    #[serde(default)]
    pub shop_id: Option<Uuid>,
    pub name: String,
    pub available: bool,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Shop customer record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfile {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub contact: Option<String>,
}

/// A stored visual scan, searchable by image embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualScan {
    pub id: Uuid,
    pub shop_id: Uuid,
    #[serde(default)]
    pub product_id: Option<Uuid>,
    pub image_ref: String,
    pub captured_at: DateTime<Utc>,
}

/// Persisted copy of a signed registry event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DanEventRecord {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub sequence: i64,
    pub payload: serde_json::Value,
    pub signature: String,
}

/// Aggregated availability view for a product within a shop.
///
/// A pure projection over the active stock lines; recomputed whenever the
/// underlying items change, never a source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub product_id: Uuid,
    pub product_name: String,
    pub total_quantity: i64,
    pub earliest_expiration: Option<NaiveDate>,
    pub average_cost_per_unit: f64,
    pub supplier_ids: Vec<Uuid>,
    pub batch_ids: Vec<Uuid>,
}
