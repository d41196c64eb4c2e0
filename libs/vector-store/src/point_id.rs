use uuid::Uuid;

/// Fixed namespace under which point identifiers are derived.
const POINT_NAMESPACE: Uuid = uuid::uuid!("9f2c1b36-5a84-4d0e-b7a1-3c6e8d92f415");

/// Derive a stable point id for a logical entity within a collection.
///
/// Pure function of its inputs: repeated upserts of the same entity always
/// address the same point instead of accumulating duplicates. Entity ids
/// that are already store-native UUIDs can be used directly where the
/// collection's natural key is unique; this derivation covers everything
/// else (external ids, composite keys, names).
pub fn derive_point_id(collection: &str, entity_id: &str) -> Uuid {
    Uuid::new_v5(
        &POINT_NAMESPACE,
        format!("{}:{}", collection, entity_id).as_bytes(),
    )
}
