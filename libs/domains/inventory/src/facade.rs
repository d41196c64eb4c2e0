use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;
use vector_store::{
    CollectionHandle, FieldCondition, LogicalCollection, PayloadFilter, PointRecord, RecordStore,
    SchemaManager, ScoredPoint, derive_point_id, resolve_vector,
};

use crate::cache::{ChangeTracker, PersistQueue};
use crate::embedding::{EmbeddingService, ExtractedFields, ProductMatch};
use crate::error::{InventoryError, InventoryResult};
use crate::models::{
    BatchRecord, CreateBatch, CreateProduct, CreateSupplier, CustomerProfile, DanEventRecord,
    DriverProfile, MarketplaceListing, ProductDefinition, SaleTransaction, ShopContext,
    ShopRecord, StockItem, SupplierProfile, UserProfile, VisualScan,
};
use crate::payload::StorableEntity;

/// Single entry point for persisting and querying domain entities.
///
/// Every write ensures its collection first and is rejected with
/// [`InventoryError::CollectionUnavailable`] when the ensure fails; list
/// reads degrade to an empty result instead, so browsing keeps working
/// while the store is unhealthy.
///
/// Successful writes are reported to the shared [`ChangeTracker`], which
/// the read-model cache watches to know when a shop's view is out of
/// date. In-flight writes are stamped through the [`PersistQueue`] so a
/// slow write superseded by a newer one for the same entity does not
/// invalidate the view on completion.
pub struct InventoryFacade {
    store: Arc<dyn RecordStore>,
    schema: Arc<SchemaManager>,
    embedder: Option<Arc<dyn EmbeddingService>>,
    changes: Arc<ChangeTracker>,
    persist_queue: Arc<PersistQueue>,
}

impl InventoryFacade {
    pub fn new(store: Arc<dyn RecordStore>, schema: Arc<SchemaManager>) -> Self {
        Self {
            store,
            schema,
            embedder: None,
            changes: Arc::new(ChangeTracker::new()),
            persist_queue: Arc::new(PersistQueue::new()),
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingService>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn schema(&self) -> Arc<SchemaManager> {
        Arc::clone(&self.schema)
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.store)
    }

    pub fn changes(&self) -> Arc<ChangeTracker> {
        Arc::clone(&self.changes)
    }

    pub fn persist_queue(&self) -> Arc<PersistQueue> {
        Arc::clone(&self.persist_queue)
    }

    // ===== Generic entity persistence =====

    /// Insert-or-replace one entity. The point id derives deterministically
    /// from the entity identity, so repeated upserts overwrite in place.
    pub async fn upsert_entity<T: StorableEntity>(
        &self,
        entity: &T,
        embedding: Option<Vec<f32>>,
    ) -> InventoryResult<()> {
        let stamp = self.persist_queue.stamp(entity.entity_id());
        let target = self.writable(T::COLLECTION).await?;
        let point = Self::to_point(entity, embedding.as_deref())?;
        self.store.upsert(&target, vec![point]).await?;
        // When a newer write for the same entity took over while this one
        // was in flight, that write invalidates the read model instead.
        if self.persist_queue.complete(entity.entity_id(), stamp) {
            self.note_mutation(entity.shop_scope());
        }
        Ok(())
    }

    /// Fetch one entity by its business identity
    pub async fn fetch_entity<T: StorableEntity + DeserializeOwned>(
        &self,
        entity_id: Uuid,
    ) -> InventoryResult<T> {
        let target = self.writable(T::COLLECTION).await?;
        let point_id = derive_point_id(T::COLLECTION.name(), &entity_id.to_string());
        let mut points = self.store.retrieve(&target, vec![point_id]).await?;
        match points.pop() {
            Some(point) => Ok(serde_json::from_value(point.payload)?),
            None => Err(InventoryError::NotFound(entity_id)),
        }
    }

    /// List all entities matching a payload filter. Returns an empty list
    /// when the collection is not ready; points whose payload no longer
    /// deserializes are skipped with a warning rather than failing the read.
    pub async fn list_entities<T: StorableEntity + DeserializeOwned>(
        &self,
        filter: Option<PayloadFilter>,
    ) -> InventoryResult<Vec<T>> {
        let Some(target) = self.readable(T::COLLECTION).await else {
            return Ok(Vec::new());
        };
        let points = self.store.scroll_all(&target, filter).await?;
        Ok(points
            .into_iter()
            .filter_map(|point| match serde_json::from_value(point.payload) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    warn!(
                        collection = T::COLLECTION.name(),
                        point_id = %point.id,
                        error = %e,
                        "Skipping undeserializable payload"
                    );
                    None
                }
            })
            .collect())
    }

    /// Delete entities by business identity
    pub async fn delete_entities<T: StorableEntity>(
        &self,
        entity_ids: &[Uuid],
    ) -> InventoryResult<()> {
        if entity_ids.is_empty() {
            return Ok(());
        }
        let target = self.writable(T::COLLECTION).await?;
        let point_ids = entity_ids
            .iter()
            .map(|id| derive_point_id(T::COLLECTION.name(), &id.to_string()))
            .collect();
        self.store.delete_points(&target, point_ids).await?;
        // Bare ids carry no shop scope; outdate every cached view
        self.note_mutation(None);
        Ok(())
    }

    // ===== Catalog =====

    #[instrument(skip(self, input))]
    pub async fn create_product(
        &self,
        input: CreateProduct,
        shop: Option<&ShopContext>,
    ) -> InventoryResult<ProductDefinition> {
        input.validate()?;
        let product = ProductDefinition::new(input, shop.map(|s| s.id));
        let embedding = self.try_embed_text(&product.name).await;
        self.upsert_entity(&product, embedding).await?;
        info!(product_id = %product.id, "Product registered");
        Ok(product)
    }

    pub async fn list_products(&self) -> InventoryResult<Vec<ProductDefinition>> {
        self.list_entities(None).await
    }

    // ===== Users and shops =====

    pub async fn upsert_user(&self, user: &UserProfile) -> InventoryResult<()> {
        self.upsert_entity(user, None).await
    }

    pub async fn upsert_shop(&self, shop: &ShopRecord) -> InventoryResult<()> {
        self.upsert_entity(shop, None).await
    }

    pub async fn shops_owned_by(&self, owner_user_id: Uuid) -> InventoryResult<Vec<ShopRecord>> {
        let filter = PayloadFilter::all([FieldCondition::matches("ownerUserId", owner_user_id)]);
        self.list_entities(Some(filter)).await
    }

    // ===== Suppliers =====

    #[instrument(skip(self, input), fields(shop_id = %ctx.id))]
    pub async fn create_supplier(
        &self,
        ctx: &ShopContext,
        input: CreateSupplier,
    ) -> InventoryResult<SupplierProfile> {
        input.validate()?;
        let supplier = SupplierProfile {
            id: Uuid::now_v7(),
            // Account-linked suppliers are global; everything else belongs
            // to the creating shop.
            shop_id: input.linked_user_id.is_none().then_some(ctx.id),
            linked_user_id: input.linked_user_id,
            name: input.name,
            contact: input.contact,
            metadata: input.metadata,
        };
        supplier
            .check_scope()
            .map_err(|reason| InventoryError::Validation(reason.to_string()))?;
        self.upsert_entity(&supplier, None).await?;
        Ok(supplier)
    }

    /// Shop-local suppliers only; linked-account suppliers are resolved
    /// separately through the allow-list.
    pub async fn list_suppliers_for_shop(
        &self,
        ctx: &ShopContext,
    ) -> InventoryResult<Vec<SupplierProfile>> {
        let filter = PayloadFilter::all([FieldCondition::matches("shopId", ctx.id)]);
        self.list_entities(Some(filter)).await
    }

    pub async fn suppliers_linked_to(
        &self,
        user_id: Uuid,
    ) -> InventoryResult<Vec<SupplierProfile>> {
        let filter = PayloadFilter::all([FieldCondition::matches("linkedUserId", user_id)]);
        self.list_entities(Some(filter)).await
    }

    // ===== Batches and stock =====

    /// Record a received delivery and derive its stock lines.
    ///
    /// Two-phase write: the batch record first, then the stock items in one
    /// bulk upsert. A failure in the second phase leaves the batch in place
    /// and surfaces as [`InventoryError::PartiallyApplied`] so the caller
    /// can retry the items against the existing batch.
    #[instrument(skip(self, input), fields(shop_id = %ctx.id))]
    pub async fn create_batch_for_shop(
        &self,
        ctx: &ShopContext,
        input: CreateBatch,
    ) -> InventoryResult<(BatchRecord, Vec<StockItem>)> {
        input.validate()?;
        if input.line_items.is_empty() {
            return Err(InventoryError::Validation(
                "batch requires at least one line item".to_string(),
            ));
        }

        // Both collections must be ready before the first write; otherwise
        // the saga could not even attempt its second phase.
        let batches_target = self.writable(LogicalCollection::Batches).await?;
        let items_target = self.writable(LogicalCollection::Items).await?;

        let batch = BatchRecord::new(ctx, input);
        let batch_point = Self::to_point(&batch, None)?;
        self.store.upsert(&batches_target, vec![batch_point]).await?;
        // The batch is durable from here on, so the shop view is already
        // outdated even if the item phase fails below.
        self.changes.mark_shop(ctx.id);

        // Stock lines embed from the product name, so similar products
        // cluster in the vector space; the name also seeds the placeholder
        // when no provider is configured.
        let mut items = Vec::new();
        let mut points = Vec::new();
        for line in &batch.line_items {
            let Some(item) = StockItem::from_batch_line(&batch, line) else {
                continue;
            };
            let embedding = self.try_embed_text(&line.product_name).await;
            points.push(Self::to_point_seeded(
                &item,
                embedding.as_deref(),
                &line.product_name,
            )?);
            items.push(item);
        }

        if !points.is_empty()
            && let Err(e) = self.store.upsert(&items_target, points).await
        {
            warn!(batch_id = %batch.id, error = %e, "Stock items failed after batch write");
            return Err(InventoryError::PartiallyApplied {
                batch_id: batch.id,
                details: e.to_string(),
            });
        }

        info!(batch_id = %batch.id, stock_lines = items.len(), "Batch recorded");
        Ok((batch, items))
    }

    pub async fn list_batches_for_shop(
        &self,
        ctx: &ShopContext,
    ) -> InventoryResult<Vec<BatchRecord>> {
        let filter = PayloadFilter::all([FieldCondition::matches("shopId", ctx.id)]);
        self.list_entities(Some(filter)).await
    }

    pub async fn list_items_for_shop(&self, ctx: &ShopContext) -> InventoryResult<Vec<StockItem>> {
        let filter = PayloadFilter::all([FieldCondition::matches("shopId", ctx.id)]);
        self.list_entities(Some(filter)).await
    }

    /// Active, non-empty stock lines for one product in one shop
    pub async fn available_items(
        &self,
        ctx: &ShopContext,
        product_id: Uuid,
    ) -> InventoryResult<Vec<StockItem>> {
        let filter = PayloadFilter::all([
            FieldCondition::matches("shopId", ctx.id),
            FieldCondition::matches("productId", product_id),
            FieldCondition::matches("status", "ACTIVE"),
            FieldCondition::greater_than("quantity", 0.0),
        ]);
        self.list_entities(Some(filter)).await
    }

    // ===== Sales =====

    pub async fn record_sale(&self, sale: &SaleTransaction) -> InventoryResult<()> {
        self.upsert_entity(sale, None).await
    }

    pub async fn list_sales_for_shop(
        &self,
        ctx: &ShopContext,
    ) -> InventoryResult<Vec<SaleTransaction>> {
        let filter = PayloadFilter::all([FieldCondition::matches("shopId", ctx.id)]);
        self.list_entities(Some(filter)).await
    }

    // ===== Marketplace, drivers, customers =====

    pub async fn upsert_listing(&self, listing: &MarketplaceListing) -> InventoryResult<()> {
        self.upsert_entity(listing, None).await
    }

    pub async fn active_listings(&self) -> InventoryResult<Vec<MarketplaceListing>> {
        let filter = PayloadFilter::all([FieldCondition::matches("active", true)]);
        self.list_entities(Some(filter)).await
    }

    pub async fn upsert_driver(&self, driver: &DriverProfile) -> InventoryResult<()> {
        self.upsert_entity(driver, None).await
    }

    pub async fn available_drivers(&self) -> InventoryResult<Vec<DriverProfile>> {
        let filter = PayloadFilter::all([FieldCondition::matches("available", true)]);
        self.list_entities(Some(filter)).await
    }

    pub async fn upsert_customer(&self, customer: &CustomerProfile) -> InventoryResult<()> {
        self.upsert_entity(customer, None).await
    }

    pub async fn list_customers_for_shop(
        &self,
        ctx: &ShopContext,
    ) -> InventoryResult<Vec<CustomerProfile>> {
        let filter = PayloadFilter::all([FieldCondition::matches("shopId", ctx.id)]);
        self.list_entities(Some(filter)).await
    }

    // ===== Registry event mirror =====

    /// Keep a queryable copy of a signed registry event alongside the rest
    /// of the shop's data
    pub async fn record_dan_event(&self, record: &DanEventRecord) -> InventoryResult<()> {
        self.upsert_entity(record, None).await
    }

    pub async fn list_dan_events_for_shop(
        &self,
        ctx: &ShopContext,
    ) -> InventoryResult<Vec<DanEventRecord>> {
        let filter = PayloadFilter::all([FieldCondition::matches("shopId", ctx.id)]);
        let mut events: Vec<DanEventRecord> = self.list_entities(Some(filter)).await?;
        events.sort_by_key(|e| e.sequence);
        Ok(events)
    }

    // ===== Visual pipeline =====

    /// Persist a captured scan, embedding the image when a provider is
    /// configured (placeholder vector otherwise).
    pub async fn record_scan(&self, scan: &VisualScan) -> InventoryResult<()> {
        let embedding = match &self.embedder {
            Some(embedder) => match embedder.embed_image(&scan.image_ref).await {
                Ok(vector) => Some(vector),
                Err(e) => {
                    warn!(scan_id = %scan.id, error = %e, "Image embedding failed, using placeholder");
                    None
                }
            },
            None => None,
        };
        self.upsert_entity(scan, embedding).await
    }

    /// Similarity search over stored scans, scoped to a shop
    pub async fn visual_search(
        &self,
        ctx: &ShopContext,
        image_ref: &str,
        limit: u64,
    ) -> InventoryResult<Vec<ScoredPoint>> {
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            InventoryError::Validation("visual search requires an embedding provider".to_string())
        })?;
        let vector = embedder.embed_image(image_ref).await?;
        let Some(target) = self.readable(LogicalCollection::Visual).await else {
            return Ok(Vec::new());
        };
        let filter = PayloadFilter::all([FieldCondition::matches("shopId", ctx.id)]);
        Ok(self
            .store
            .search(&target, vector, Some(filter), limit)
            .await?)
    }

    pub async fn extract_fields(&self, image_ref: &str) -> InventoryResult<ExtractedFields> {
        match &self.embedder {
            Some(embedder) => embedder.extract_fields(image_ref).await,
            None => Ok(ExtractedFields::default()),
        }
    }

    pub async fn identify_product(&self, image_ref: &str) -> InventoryResult<Option<ProductMatch>> {
        match &self.embedder {
            Some(embedder) => embedder.identify_product(image_ref).await,
            None => Ok(None),
        }
    }

    // ===== Internals =====

    async fn writable(&self, collection: LogicalCollection) -> InventoryResult<CollectionHandle> {
        self.schema.ensure_collection(collection).await.ok_or_else(|| {
            InventoryError::CollectionUnavailable(collection.name().to_string())
        })
    }

    async fn readable(&self, collection: LogicalCollection) -> Option<CollectionHandle> {
        let handle = self.schema.ensure_collection(collection).await;
        if handle.is_none() {
            warn!(
                collection = collection.name(),
                "Collection not ready, read degraded to empty result"
            );
        }
        handle
    }

    async fn try_embed_text(&self, text: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed_text(text).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(error = %e, "Text embedding failed, using placeholder");
                None
            }
        }
    }

    fn note_mutation(&self, scope: Option<Uuid>) {
        match scope {
            Some(shop_id) => self.changes.mark_shop(shop_id),
            None => self.changes.mark_global(),
        }
    }

    fn to_point<T: StorableEntity>(
        entity: &T,
        embedding: Option<&[f32]>,
    ) -> InventoryResult<PointRecord> {
        let seed = format!(
            "{}:{}",
            T::COLLECTION.name(),
            entity.entity_id()
        );
        Self::to_point_seeded(entity, embedding, &seed)
    }

    /// Build the point with an explicit placeholder seed, for entities whose
    /// fallback vector should derive from a semantic field instead of the
    /// identity (stock lines seed from their product name).
    fn to_point_seeded<T: StorableEntity>(
        entity: &T,
        embedding: Option<&[f32]>,
        seed: &str,
    ) -> InventoryResult<PointRecord> {
        let collection = T::COLLECTION.name();
        let entity_id = entity.entity_id().to_string();
        let point_id = derive_point_id(collection, &entity_id);
        let context = format!("{}:{}", collection, entity_id);
        let vector = resolve_vector(embedding, seed, &context);
        Ok(PointRecord::new(
            point_id,
            vector,
            serde_json::to_value(entity)?,
        ))
    }
}
