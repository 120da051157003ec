use tawar_core::domain::product::Product;
use tawar_core::errors::DomainError;

use crate::repositories::{ProductStore, RepositoryError, SqlProductStore};
use crate::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub products_seeded: usize,
}

/// Demo catalog for local runs and smoke checks. Floor prices stay inside
/// the engine; they exist here only so a seeded instance can negotiate.
pub fn demo_products() -> Result<Vec<Product>, DomainError> {
    Ok(vec![
        Product::new("sepatu-lari", "Sepatu Lari Second", 350_000, 250_000)?,
        Product::new("kamera-analog", "Kamera Analog 90an", 1_200_000, 900_000)?,
        Product::new("meja-lipat", "Meja Lipat Kayu", 100_000, 70_000)?,
    ])
}

pub async fn seed_demo_products(pool: &DbPool) -> Result<SeedResult, SeedError> {
    let store = SqlProductStore::new(pool.clone());
    let products = demo_products()?;
    let count = products.len();

    for product in products {
        store.save(product).await?;
    }

    Ok(SeedResult { products_seeded: count })
}
