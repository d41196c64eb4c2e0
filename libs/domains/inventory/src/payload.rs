use serde::Serialize;
use uuid::Uuid;
use vector_store::LogicalCollection;

use crate::models::{
    BatchRecord, CustomerProfile, DanEventRecord, DriverProfile, MarketplaceListing,
    ProductDefinition, SaleTransaction, ShopRecord, StockItem, SupplierProfile, UserProfile,
    VisualScan,
};

/// A domain entity that persists as a point payload in one logical
/// collection. The serialized field names are the payload field names the
/// collection's indexes are declared on, so implementations must keep their
/// serde casing aligned with the index catalog.
pub trait StorableEntity: Serialize {
    const COLLECTION: LogicalCollection;

    /// Stable business identity of the entity; the point id is derived from
    /// it deterministically, so re-upserting the same entity overwrites in
    /// place.
    fn entity_id(&self) -> Uuid;

    /// Which shop's read model a mutation of this entity invalidates.
    /// `None` means the entity is global and every shop's view is affected.
    fn shop_scope(&self) -> Option<Uuid> {
        None
    }
}

impl StorableEntity for UserProfile {
    const COLLECTION: LogicalCollection = LogicalCollection::Users;

    fn entity_id(&self) -> Uuid {
        self.id
    }
}

impl StorableEntity for ShopRecord {
    const COLLECTION: LogicalCollection = LogicalCollection::Shops;

    fn entity_id(&self) -> Uuid {
        self.id
    }

    fn shop_scope(&self) -> Option<Uuid> {
        Some(self.id)
    }
}

impl StorableEntity for SupplierProfile {
    const COLLECTION: LogicalCollection = LogicalCollection::Suppliers;

    fn entity_id(&self) -> Uuid {
        self.id
    }

    fn shop_scope(&self) -> Option<Uuid> {
        self.shop_id
    }
}

impl StorableEntity for ProductDefinition {
    const COLLECTION: LogicalCollection = LogicalCollection::Products;

    fn entity_id(&self) -> Uuid {
        self.id
    }
}

impl StorableEntity for StockItem {
    const COLLECTION: LogicalCollection = LogicalCollection::Items;

    fn entity_id(&self) -> Uuid {
        self.inventory_uuid
    }

    fn shop_scope(&self) -> Option<Uuid> {
        Some(self.shop_id)
    }
}

impl StorableEntity for BatchRecord {
    const COLLECTION: LogicalCollection = LogicalCollection::Batches;

    fn entity_id(&self) -> Uuid {
        self.id
    }

    fn shop_scope(&self) -> Option<Uuid> {
        Some(self.shop_id)
    }
}

impl StorableEntity for SaleTransaction {
    const COLLECTION: LogicalCollection = LogicalCollection::Sales;

    fn entity_id(&self) -> Uuid {
        self.id
    }

    fn shop_scope(&self) -> Option<Uuid> {
        Some(self.shop_id)
    }
}

impl StorableEntity for DriverProfile {
    const COLLECTION: LogicalCollection = LogicalCollection::Drivers;

    fn entity_id(&self) -> Uuid {
        self.id
    }

    fn shop_scope(&self) -> Option<Uuid> {
        self.shop_id
    }
}

impl StorableEntity for VisualScan {
    const COLLECTION: LogicalCollection = LogicalCollection::Visual;

    fn entity_id(&self) -> Uuid {
        self.id
    }

    fn shop_scope(&self) -> Option<Uuid> {
        Some(self.shop_id)
    }
}

impl StorableEntity for MarketplaceListing {
    const COLLECTION: LogicalCollection = LogicalCollection::Marketplace;

    fn entity_id(&self) -> Uuid {
        self.id
    }

    fn shop_scope(&self) -> Option<Uuid> {
        Some(self.shop_id)
    }
}

impl StorableEntity for CustomerProfile {
    const COLLECTION: LogicalCollection = LogicalCollection::Customers;

    fn entity_id(&self) -> Uuid {
        self.id
    }

    fn shop_scope(&self) -> Option<Uuid> {
        Some(self.shop_id)
    }
}

impl StorableEntity for DanEventRecord {
    const COLLECTION: LogicalCollection = LogicalCollection::DanInventory;

    fn entity_id(&self) -> Uuid {
        self.id
    }

    fn shop_scope(&self) -> Option<Uuid> {
        Some(self.shop_id)
    }
}
