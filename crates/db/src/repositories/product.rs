use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use tawar_core::domain::product::{Product, ProductId};

use super::{ProductStore, RepositoryError};
use crate::DbPool;

pub struct SqlProductStore {
    pool: DbPool,
}

impl SqlProductStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductStore for SqlProductStore {
    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, list_price, floor_price, created_at FROM products WHERE id = ?1",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Product {
            id: ProductId(row.get::<String, _>("id")),
            name: row.get::<String, _>("name"),
            list_price: row.get::<i64, _>("list_price"),
            floor_price: row.get::<i64, _>("floor_price"),
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
        }))
    }

    async fn save(&self, product: Product) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO products (id, name, list_price, floor_price, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (id) DO UPDATE SET
                 name = excluded.name,
                 list_price = excluded.list_price,
                 floor_price = excluded.floor_price",
        )
        .bind(&product.id.0)
        .bind(&product.name)
        .bind(product.list_price)
        .bind(product.floor_price)
        .bind(product.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tawar_core::domain::product::{Product, ProductId};

    use crate::repositories::{ProductStore, SqlProductStore};
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn round_trips_a_product() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let store = SqlProductStore::new(pool);

        let product = Product::new("p-1", "Sepatu Lari", 100_000, 70_000).expect("valid product");
        store.save(product.clone()).await.expect("save");

        let found = store
            .find_product(&ProductId("p-1".to_string()))
            .await
            .expect("find")
            .expect("product exists");
        assert_eq!(found.name, "Sepatu Lari");
        assert_eq!(found.list_price, 100_000);
        assert_eq!(found.floor_price, 70_000);
    }

    #[tokio::test]
    async fn save_updates_existing_prices() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let store = SqlProductStore::new(pool);

        store
            .save(Product::new("p-1", "Sepatu Lari", 100_000, 70_000).expect("valid product"))
            .await
            .expect("save");
        store
            .save(Product::new("p-1", "Sepatu Lari", 120_000, 90_000).expect("valid product"))
            .await
            .expect("update");

        let found = store
            .find_product(&ProductId("p-1".to_string()))
            .await
            .expect("find")
            .expect("product exists");
        assert_eq!(found.list_price, 120_000);
        assert_eq!(found.floor_price, 90_000);
    }

    #[tokio::test]
    async fn missing_product_is_none() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let store = SqlProductStore::new(pool);

        assert!(store
            .find_product(&ProductId("missing".to_string()))
            .await
            .expect("find")
            .is_none());
    }
}
