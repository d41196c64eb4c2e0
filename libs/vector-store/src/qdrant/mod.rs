mod client;

pub use client::QdrantRecordStore;
