use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::InventoryResult;
use crate::facade::InventoryFacade;
use crate::models::{
    BatchLineItem, BatchRecord, CreateBatch, CreateProduct, CreateSupplier, ProductDefinition,
    ProductSummary, SaleTransaction, ShopContext, StockItem, SupplierProfile,
};

/// Records which read models local mutations have outdated.
///
/// The façade marks it on every successful write; the cache consults it on
/// every read, so a view loaded after a mutation always reflects that
/// mutation. Shop-scoped writes dirty one shop; global writes (catalog
/// products, users) bump an epoch that outdates every cached snapshot.
#[derive(Default)]
pub struct ChangeTracker {
    dirty: std::sync::Mutex<HashSet<Uuid>>,
    global_epoch: AtomicU64,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_shop(&self, shop_id: Uuid) {
        self.dirty.lock().unwrap().insert(shop_id);
    }

    pub fn mark_global(&self) {
        self.global_epoch.fetch_add(1, Ordering::Relaxed);
    }

    pub fn global_epoch(&self) -> u64 {
        self.global_epoch.load(Ordering::Relaxed)
    }

    pub fn is_shop_dirty(&self, shop_id: Uuid) -> bool {
        self.dirty.lock().unwrap().contains(&shop_id)
    }

    /// Clear the shop's dirty flag, e.g. right before reloading its view
    pub fn clear_shop(&self, shop_id: Uuid) {
        self.dirty.lock().unwrap().remove(&shop_id);
    }
}

/// Everything a shop session needs to render, loaded in one fan-out
#[derive(Debug, Clone)]
pub struct ShopSnapshot {
    pub shop_id: Uuid,
    pub products: Vec<ProductDefinition>,
    pub suppliers: Vec<SupplierProfile>,
    pub items: Vec<StockItem>,
    pub batches: Vec<BatchRecord>,
    pub sales: Vec<SaleTransaction>,
    pub loaded_at: DateTime<Utc>,
}

enum CacheEntry {
    Ready { snapshot: Arc<ShopSnapshot>, epoch: u64 },
    Stale(Arc<ShopSnapshot>),
}

/// Per-shop read model over the persisted collections.
///
/// A snapshot is served until the façade's [`ChangeTracker`] reports a
/// mutation touching it (the owning shop dirtied, or the global epoch
/// advanced); the next read then reloads from the store. Writers that
/// bypass the façade entirely can still call
/// [`mark_stale`](Self::mark_stale) by hand.
pub struct ReadModelCache {
    facade: Arc<InventoryFacade>,
    changes: Arc<ChangeTracker>,
    entries: RwLock<HashMap<Uuid, CacheEntry>>,
}

impl ReadModelCache {
    pub fn new(facade: Arc<InventoryFacade>) -> Self {
        Self {
            changes: facade.changes(),
            facade,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Current snapshot for the shop, loading or reloading as needed
    pub async fn snapshot(&self, ctx: &ShopContext) -> InventoryResult<Arc<ShopSnapshot>> {
        if let Some(CacheEntry::Ready { snapshot, epoch }) =
            self.entries.read().await.get(&ctx.id)
            && *epoch == self.changes.global_epoch()
            && !self.changes.is_shop_dirty(ctx.id)
        {
            return Ok(Arc::clone(snapshot));
        }
        self.reload(ctx).await
    }

    /// Force the next read to hit the store. The stale snapshot keeps being
    /// available to anyone already holding it.
    pub async fn mark_stale(&self, shop_id: Uuid) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.remove(&shop_id) {
            let snapshot = match entry {
                CacheEntry::Ready { snapshot, .. } => snapshot,
                CacheEntry::Stale(s) => s,
            };
            entries.insert(shop_id, CacheEntry::Stale(snapshot));
        }
    }

    pub async fn evict(&self, shop_id: Uuid) {
        self.entries.write().await.remove(&shop_id);
    }

    /// Last loaded snapshot, even if stale. Lets a view keep rendering old
    /// data while a reload is failing, without blocking on the store.
    pub async fn last_known(&self, shop_id: Uuid) -> Option<Arc<ShopSnapshot>> {
        match self.entries.read().await.get(&shop_id) {
            Some(CacheEntry::Ready { snapshot, .. }) => Some(Arc::clone(snapshot)),
            Some(CacheEntry::Stale(s)) => Some(Arc::clone(s)),
            None => None,
        }
    }

    #[instrument(skip(self, ctx), fields(shop_id = %ctx.id))]
    pub async fn reload(&self, ctx: &ShopContext) -> InventoryResult<Arc<ShopSnapshot>> {
        // Epoch is read before the fan-out and the dirty flag cleared up
        // front: a write landing mid-load re-dirties the shop and forces
        // another reload instead of being swallowed.
        let epoch = self.changes.global_epoch();
        self.changes.clear_shop(ctx.id);

        let (products, suppliers, items, batches, sales) = tokio::join!(
            self.facade.list_products(),
            self.facade.list_suppliers_for_shop(ctx),
            self.facade.list_items_for_shop(ctx),
            self.facade.list_batches_for_shop(ctx),
            self.facade.list_sales_for_shop(ctx),
        );

        let assembled = (|| {
            InventoryResult::Ok(ShopSnapshot {
                shop_id: ctx.id,
                products: products?,
                suppliers: suppliers?,
                items: items?,
                batches: batches?,
                sales: sales?,
                loaded_at: Utc::now(),
            })
        })();
        let snapshot = match assembled {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                // Keep the shop flagged so the failed load is retried on
                // the next read instead of serving the old view as fresh
                self.changes.mark_shop(ctx.id);
                return Err(e);
            }
        };

        self.entries.write().await.insert(
            ctx.id,
            CacheEntry::Ready {
                snapshot: Arc::clone(&snapshot),
                epoch,
            },
        );
        Ok(snapshot)
    }

    /// Aggregate availability per product for the shop.
    ///
    /// Only available stock lines contribute. Supplier references are
    /// restricted to the shop's visible supplier set (its own suppliers
    /// plus any extra allowed ids, e.g. linked-account suppliers granted to
    /// the shop); foreign supplier ids are dropped from the projection.
    pub async fn product_summaries(
        &self,
        ctx: &ShopContext,
        allowed_supplier_ids: &[Uuid],
    ) -> InventoryResult<Vec<ProductSummary>> {
        let snapshot = self.snapshot(ctx).await?;

        let mut visible: HashSet<Uuid> = snapshot.suppliers.iter().map(|s| s.id).collect();
        visible.extend(allowed_supplier_ids);

        let names: HashMap<Uuid, &str> = snapshot
            .products
            .iter()
            .map(|p| (p.id, p.name.as_str()))
            .collect();

        struct Acc {
            total: i64,
            cost_sum: f64,
            costed_units: i64,
            earliest: Option<NaiveDate>,
            suppliers: HashSet<Uuid>,
            batches: HashSet<Uuid>,
        }

        let mut grouped: HashMap<Uuid, Acc> = HashMap::new();
        for item in snapshot.items.iter().filter(|i| i.is_available()) {
            let acc = grouped.entry(item.product_id).or_insert(Acc {
                total: 0,
                cost_sum: 0.0,
                costed_units: 0,
                earliest: None,
                suppliers: HashSet::new(),
                batches: HashSet::new(),
            });
            acc.total += item.quantity;
            if let Some(buy_price) = item.buy_price {
                acc.cost_sum += buy_price * item.quantity as f64;
                acc.costed_units += item.quantity;
            }
            acc.earliest = Some(match acc.earliest {
                Some(current) => current.min(item.expiration),
                None => item.expiration,
            });
            if let Some(supplier_id) = item.supplier_id
                && visible.contains(&supplier_id)
            {
                acc.suppliers.insert(supplier_id);
            }
            if let Some(batch_id) = item.batch_id {
                acc.batches.insert(batch_id);
            }
        }

        let mut summaries: Vec<ProductSummary> = grouped
            .into_iter()
            .map(|(product_id, acc)| {
                let mut supplier_ids: Vec<Uuid> = acc.suppliers.into_iter().collect();
                supplier_ids.sort();
                let mut batch_ids: Vec<Uuid> = acc.batches.into_iter().collect();
                batch_ids.sort();
                ProductSummary {
                    product_id,
                    product_name: names
                        .get(&product_id)
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "Unknown product".to_string()),
                    total_quantity: acc.total,
                    earliest_expiration: acc.earliest,
                    average_cost_per_unit: if acc.costed_units > 0 {
                        acc.cost_sum / acc.costed_units as f64
                    } else {
                        0.0
                    },
                    supplier_ids,
                    batch_ids,
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.product_name.cmp(&b.product_name));
        Ok(summaries)
    }

    /// Seed a starter catalog when the shop is completely empty, so a fresh
    /// shop opens with a supplier, a product and sellable stock on screen.
    /// No-op otherwise.
    pub async fn ensure_seeded(&self, ctx: &ShopContext) -> InventoryResult<bool> {
        let snapshot = self.snapshot(ctx).await?;
        if !snapshot.suppliers.is_empty() || !snapshot.items.is_empty() {
            return Ok(false);
        }

        let supplier = self
            .facade
            .create_supplier(
                ctx,
                CreateSupplier {
                    name: "House supplier".to_string(),
                    contact: None,
                    linked_user_id: None,
                    metadata: serde_json::Value::Null,
                },
            )
            .await?;
        let product = match snapshot.products.first() {
            Some(existing) => existing.clone(),
            None => {
                self.facade
                    .create_product(
                        CreateProduct {
                            name: "Sample product".to_string(),
                            manufacturer: None,
                            category: Some("starter".to_string()),
                            description: None,
                            default_supplier_id: None,
                            images: vec![],
                            created_by_user_id: ctx.id,
                        },
                        Some(ctx),
                    )
                    .await?
            }
        };

        // A starter delivery, so the derived stock line gives the shop
        // something it can actually sell
        self.facade
            .create_batch_for_shop(
                ctx,
                CreateBatch {
                    supplier_id: Some(supplier.id),
                    delivery_date: Utc::now().date_naive(),
                    inventory_date: None,
                    invoice_number: None,
                    documents: vec![],
                    line_items: vec![BatchLineItem {
                        product_id: Some(product.id),
                        product_name: product.name.clone(),
                        quantity: 10,
                        cost: 1.0,
                        expiration: None,
                        sell_price: None,
                    }],
                    created_by_user_id: ctx.id,
                },
            )
            .await?;

        info!(shop_id = %ctx.id, "Seeded starter catalog for empty shop");
        Ok(true)
    }
}

/// Logical write stamps for last-writer-wins cache maintenance.
///
/// Every persist intent takes a stamp; on completion the writer asks
/// whether its stamp is still the newest for that entity. A stale answer
/// means a later write superseded this one while it was in flight, so its
/// result must not be applied to the read model.
#[derive(Default)]
pub struct PersistQueue {
    clock: AtomicU64,
    latest: std::sync::Mutex<HashMap<Uuid, u64>>,
}

impl PersistQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a persist intent for the entity and get its stamp
    pub fn stamp(&self, entity_id: Uuid) -> u64 {
        let stamp = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        self.latest.lock().unwrap().insert(entity_id, stamp);
        stamp
    }

    /// True if the stamp is still the newest intent for the entity
    pub fn is_current(&self, entity_id: Uuid, stamp: u64) -> bool {
        self.latest.lock().unwrap().get(&entity_id) == Some(&stamp)
    }

    /// Finish a persist: removes the tracking entry when the stamp is still
    /// current and reports whether the result may be applied.
    pub fn complete(&self, entity_id: Uuid, stamp: u64) -> bool {
        let mut latest = self.latest.lock().unwrap();
        if latest.get(&entity_id) == Some(&stamp) {
            latest.remove(&entity_id);
            true
        } else {
            false
        }
    }
}
