// src/products/mod.rs
//! Product-search collaborator used by the weekly objects run.

pub mod paapi;
pub mod sigv4;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// One search result, already reduced to the fields the pipeline keeps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductHit {
    pub asin: String,
    pub title: String,
    pub price_eur: Option<f64>,
    pub image: Option<String>,
    pub link: String,
}

#[async_trait::async_trait]
pub trait ProductSearch: Send + Sync {
    async fn search(&self, keywords: &str) -> Result<Vec<ProductHit>>;
    fn name(&self) -> &str;
}
