use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::InventoryResult;

/// Structured fields pulled out of a scanned label or invoice
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedFields {
    pub product_name: Option<String>,
    pub manufacturer: Option<String>,
    pub expiration: Option<chrono::NaiveDate>,
    pub quantity: Option<i64>,
    pub raw_text: Option<String>,
}

/// Candidate match from visual product identification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductMatch {
    pub product_id: Uuid,
    pub confidence: f32,
}

/// External embedding/extraction provider.
///
/// Optional everywhere it is consumed: when absent or failing, writes fall
/// back to deterministic placeholder vectors so persistence never blocks on
/// the provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed free text into the shared vector space
    async fn embed_text(&self, text: &str) -> InventoryResult<Vec<f32>>;

    /// Embed an image (by reference) into the shared vector space
    async fn embed_image(&self, image_ref: &str) -> InventoryResult<Vec<f32>>;

    /// Extract structured fields from a captured document image
    async fn extract_fields(&self, image_ref: &str) -> InventoryResult<ExtractedFields>;

    /// Identify which known product an image most likely shows
    async fn identify_product(&self, image_ref: &str) -> InventoryResult<Option<ProductMatch>>;
}
