use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{InventoryError, InventoryResult};
use crate::facade::InventoryFacade;
use crate::models::{DEFAULT_MARKUP, SaleLine, SaleTransaction, ShopContext, StockItem};

/// One stock line touched by a deduction
#[derive(Debug, Clone)]
pub struct ConsumedLine {
    pub inventory_uuid: Uuid,
    pub quantity_taken: i64,
    pub remaining: i64,
}

/// Result of a stock deduction.
///
/// `fulfilled < requested` signals under-fulfilment: the shop simply did
/// not hold enough stock, which is an outcome to report, not an error.
#[derive(Debug, Clone)]
pub struct DeductionOutcome {
    pub requested: i64,
    pub fulfilled: i64,
    pub total_amount: f64,
    pub consumed: Vec<ConsumedLine>,
    pub sale_id: Option<Uuid>,
}

impl DeductionOutcome {
    pub fn is_complete(&self) -> bool {
        self.fulfilled == self.requested
    }
}

/// First-Expired-First-Out stock deduction.
///
/// Deductions for the same (shop, product) pair are serialized through an
/// async mutex, so two concurrent sales cannot both read the same line and
/// double-spend it. Different products proceed in parallel.
pub struct StockAllocator {
    facade: Arc<InventoryFacade>,
    locks: Mutex<HashMap<(Uuid, Uuid), Arc<Mutex<()>>>>,
}

impl StockAllocator {
    pub fn new(facade: Arc<InventoryFacade>) -> Self {
        Self {
            facade,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Deduct `quantity` units of a product from a shop's stock, consuming
    /// lines in expiration order, and record the matching sale ledger entry.
    ///
    /// Depleted lines are deleted; a partially consumed line is written back
    /// with its new quantity. One sale line is recorded per stock line
    /// touched, priced at that line's sell price.
    #[instrument(skip(self), fields(shop_id = %ctx.id, product_id = %product_id))]
    pub async fn deduct(
        &self,
        ctx: &ShopContext,
        product_id: Uuid,
        quantity: i64,
    ) -> InventoryResult<DeductionOutcome> {
        if quantity <= 0 {
            return Err(InventoryError::Validation(
                "deduction quantity must be positive".to_string(),
            ));
        }

        let lock = self.lock_for(ctx.id, product_id).await;
        let _guard = lock.lock().await;

        let mut lines = self.facade.available_items(ctx, product_id).await?;
        // FEFO: earliest expiration first; identity as a deterministic tie-break
        lines.sort_by(|a, b| {
            a.expiration
                .cmp(&b.expiration)
                .then(a.inventory_uuid.cmp(&b.inventory_uuid))
        });

        let mut outstanding = quantity;
        let mut consumed = Vec::new();
        let mut sale_lines = Vec::new();
        let mut depleted = Vec::new();
        let mut updated: Option<StockItem> = None;

        for line in lines {
            if outstanding == 0 {
                break;
            }
            let take = outstanding.min(line.quantity);
            outstanding -= take;

            let unit_price = line
                .sell_price
                .unwrap_or(line.unit_cost() * DEFAULT_MARKUP);
            sale_lines.push(SaleLine {
                product_id,
                quantity: take,
                price_at_sale: unit_price,
            });

            let remaining = line.quantity - take;
            consumed.push(ConsumedLine {
                inventory_uuid: line.inventory_uuid,
                quantity_taken: take,
                remaining,
            });

            if remaining == 0 {
                depleted.push(line.inventory_uuid);
            } else {
                let mut partial = line;
                partial.quantity = remaining;
                partial.updated_at = Utc::now();
                updated = Some(partial);
            }
        }

        let fulfilled = quantity - outstanding;
        if fulfilled == 0 {
            return Ok(DeductionOutcome {
                requested: quantity,
                fulfilled: 0,
                total_amount: 0.0,
                consumed,
                sale_id: None,
            });
        }

        if let Some(partial) = &updated {
            self.facade.upsert_entity(partial, None).await?;
        }
        self.facade.delete_entities::<StockItem>(&depleted).await?;

        let total_amount = sale_lines
            .iter()
            .map(|l| l.quantity as f64 * l.price_at_sale)
            .sum();
        let sale = SaleTransaction {
            id: Uuid::now_v7(),
            shop_id: ctx.id,
            timestamp: Utc::now(),
            items: sale_lines,
            total_amount,
            source: Some("stock_deduction".to_string()),
        };
        self.facade.record_sale(&sale).await?;

        info!(
            sale_id = %sale.id,
            requested = quantity,
            fulfilled,
            "Stock deducted"
        );
        Ok(DeductionOutcome {
            requested: quantity,
            fulfilled,
            total_amount,
            consumed,
            sale_id: Some(sale.id),
        })
    }

    async fn lock_for(&self, shop_id: Uuid, product_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry((shop_id, product_id))
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}
