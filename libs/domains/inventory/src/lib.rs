//! Inventory Domain
//!
//! Multi-shop inventory over the vector record store: product catalog,
//! suppliers, delivery batches with derived stock lines, FEFO stock
//! deduction with a sale ledger, per-shop read models and the visual
//! scan pipeline.

pub mod allocator;
pub mod cache;
pub mod embedding;
pub mod error;
pub mod facade;
pub mod models;
pub mod payload;

#[cfg(test)]
pub(crate) mod test_support;

pub use allocator::{ConsumedLine, DeductionOutcome, StockAllocator};
pub use cache::{ChangeTracker, PersistQueue, ReadModelCache, ShopSnapshot};
pub use embedding::{EmbeddingService, ExtractedFields, ProductMatch};
pub use error::{InventoryError, InventoryResult};
pub use facade::InventoryFacade;
pub use models::{
    AuditEntry, BatchLineItem, BatchRecord, CreateBatch, CreateProduct, CreateSupplier,
    CustomerProfile, DEFAULT_MARKUP, DanEventRecord, DriverProfile, MarketplaceListing,
    ProductDefinition, ProductSummary, SaleLine, SaleTransaction, ShopContext, ShopRecord,
    StockItem, StockStatus, SupplierProfile, UserProfile, VisualScan, default_expiration,
};
pub use payload::StorableEntity;
