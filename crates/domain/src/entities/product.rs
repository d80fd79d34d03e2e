use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// A single catalog entry as held by the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Option<i32>, // None until the store assigns one
    pub name: String,
    pub quantity: i32,
    pub price: f64,
    pub image_uri: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[allow(clippy::too_many_arguments)]
    pub fn with_id(
        id: i32,
        name: String,
        quantity: i32,
        price: f64,
        image_uri: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Some(id),
            name,
            quantity,
            price,
            image_uri,
            created_at,
            updated_at,
        }
    }

    /// Stock value of this entry (`quantity * price`).
    pub fn total_value(&self) -> f64 {
        f64::from(self.quantity) * self.price
    }
}

/// User-supplied fields for a product that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub quantity: i32,
    pub price: f64,
    #[serde(default)]
    pub image_uri: Option<String>,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, quantity: i32, price: f64) -> Self {
        Self {
            name: name.into(),
            quantity,
            price,
            image_uri: None,
        }
    }

    pub fn with_image(mut self, image_uri: impl Into<String>) -> Self {
        self.image_uri = Some(image_uri.into());
        self
    }

    /// Form-level checks. The catalog itself never calls this; callers that
    /// accept user input are expected to.
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_name(&self.name)?;
        validate_quantity(self.quantity)?;
        validate_price(self.price)
    }
}

/// Partial update. `None` leaves a field untouched; for `image_uri`,
/// `Some(None)` clears the stored reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub quantity: Option<i32>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_present")]
    pub image_uri: Option<Option<String>>,
}

impl ProductPatch {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn quantity(mut self, quantity: i32) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn image_uri(mut self, image_uri: Option<String>) -> Self {
        self.image_uri = Some(image_uri);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.quantity.is_none()
            && self.price.is_none()
            && self.image_uri.is_none()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(quantity) = self.quantity {
            validate_quantity(quantity)?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        Ok(())
    }
}

// An explicit `null` must become `Some(None)` rather than collapsing to `None`.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

fn validate_name(name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::ValidationError(
            "Product name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_quantity(quantity: i32) -> Result<(), DomainError> {
    if quantity <= 0 {
        return Err(DomainError::ValidationError(
            "Quantity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_price(price: f64) -> Result<(), DomainError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(DomainError::ValidationError(
            "Price must be a positive number".to_string(),
        ));
    }
    Ok(())
}
