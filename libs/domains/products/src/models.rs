use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

/// A catalog entry.
///
/// Serialized in camelCase with the identifier exposed as `productId`; `id` is accepted on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Opaque identifier, assigned at creation and never changed
    #[serde(rename = "productId", alias = "id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Unit price
    pub price: Decimal,
    /// Units on hand; never negative
    pub quantity_in_stock: i32,
}

impl Product {
    /// Build a new product from a create command under `id`.
    pub fn from_create(id: impl Into<String>, input: CreateProduct) -> Self {
        Self {
            id: id.into(),
            name: input.name,
            description: input.description,
            price: input.price,
            quantity_in_stock: input.quantity_in_stock,
        }
    }

    /// Full-field overwrite; the id is kept.
    pub fn apply_update(&mut self, input: UpdateProduct) {
        self.name = input.name;
        self.description = input.description;
        self.price = input.price;
        self.quantity_in_stock = input.quantity_in_stock;
    }
}

/// DTO for creating a new product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProduct {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[validate(custom(function = "valid_price"))]
    pub price: Decimal,
    #[validate(range(min = 0))]
    pub quantity_in_stock: i32,
}

/// DTO for replacing every field of an existing product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProduct {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[validate(custom(function = "valid_price"))]
    pub price: Decimal,
    #[validate(range(min = 0))]
    pub quantity_in_stock: i32,
}

/// Decimal places the store keeps for a price (`numeric(18,2)`).
pub const PRICE_SCALE: u32 = 2;

/// Prices are non-negative, carry at most [`PRICE_SCALE`] decimal places and fit the column.
fn valid_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price < Decimal::ZERO {
        return Err(ValidationError::new("range").with_message("price must not be negative".into()));
    }
    if price.normalize().scale() > PRICE_SCALE {
        return Err(ValidationError::new("scale")
            .with_message("price must have at most 2 decimal places".into()));
    }
    if *price >= Decimal::from(10_000_000_000_000_000i64) {
        return Err(ValidationError::new("range").with_message("price is too large".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::FromPrimitive;

    fn widget() -> CreateProduct {
        CreateProduct {
            name: "Widget".to_string(),
            description: "A widget".to_string(),
            price: Decimal::from_f64(10.0).unwrap(),
            quantity_in_stock: 5,
        }
    }

    #[test]
    fn test_product_wire_shape() {
        let product = Product::from_create("p-1", widget());
        let json = serde_json::to_value(&product).unwrap();

        assert_eq!(json["productId"], "p-1");
        assert_eq!(json["quantityInStock"], 5);
        assert_eq!(json["price"], 10.0);
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_product_accepts_id_alias() {
        let product: Product = serde_json::from_str(
            r#"{"id":"p-2","name":"Gadget","description":"","price":1.5,"quantityInStock":0}"#,
        )
        .unwrap();
        assert_eq!(product.id, "p-2");
        assert_eq!(product.price, Decimal::new(15, 1));
    }

    #[test]
    fn test_create_validation() {
        assert!(widget().validate().is_ok());

        let mut blank = widget();
        blank.name = String::new();
        assert!(blank.validate().is_err());

        let mut negative_price = widget();
        negative_price.price = Decimal::new(-1, 2);
        assert!(negative_price.validate().is_err());

        let mut negative_stock = widget();
        negative_stock.quantity_in_stock = -1;
        assert!(negative_stock.validate().is_err());
    }

    #[test]
    fn test_zero_price_is_valid() {
        let mut free = widget();
        free.price = Decimal::ZERO;
        assert!(free.validate().is_ok());
    }

    #[test]
    fn test_price_scale_limited_to_cents() {
        let mut sub_cent = widget();
        sub_cent.price = Decimal::new(10005, 3);
        let errors = sub_cent.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("price"));

        // Trailing zeros do not count.
        let mut padded = widget();
        padded.price = Decimal::new(105000, 4);
        assert!(padded.validate().is_ok());

        let update = UpdateProduct {
            name: "Widget".to_string(),
            description: String::new(),
            price: Decimal::new(1, 3),
            quantity_in_stock: 1,
        };
        assert!(update.validate().is_err());
    }

    #[test]
    fn test_price_must_fit_column() {
        let mut huge = widget();
        huge.price = Decimal::from(10_000_000_000_000_000i64);
        assert!(huge.validate().is_err());

        huge.price = Decimal::new(999_999_999_999_999_999, 2);
        assert!(huge.validate().is_ok());
    }

    #[test]
    fn test_apply_update_keeps_id() {
        let mut product = Product::from_create("p-1", widget());
        product.apply_update(UpdateProduct {
            name: "Widget v2".to_string(),
            description: String::new(),
            price: Decimal::new(1250, 2),
            quantity_in_stock: 9,
        });

        assert_eq!(product.id, "p-1");
        assert_eq!(product.name, "Widget v2");
        assert_eq!(product.quantity_in_stock, 9);
    }
}
