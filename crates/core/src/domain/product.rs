use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

/// A catalog item as the negotiation engine sees it: a buyer-visible list
/// price and a secret floor price, both in exact integer currency units.
/// The floor price must never reach any buyer-facing channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub list_price: i64,
    pub floor_price: i64,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        list_price: i64,
        floor_price: i64,
    ) -> Result<Self, DomainError> {
        let product = Self {
            id: ProductId(id.into()),
            name: name.into(),
            list_price,
            floor_price,
            created_at: Utc::now(),
        };
        product.validate_economics()?;
        Ok(product)
    }

    /// Economics are fatal when invalid: a session must never be created
    /// against a product whose floor exceeds its list price.
    pub fn validate_economics(&self) -> Result<(), DomainError> {
        if self.list_price <= 0 || self.floor_price < 0 || self.floor_price > self.list_price {
            return Err(DomainError::InvalidEconomics {
                list_price: self.list_price,
                floor_price: self.floor_price,
            });
        }
        Ok(())
    }
}
