//! Order snapshot carried as the saga payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::money::Money;
use crate::types::{OrderId, TransactionId};

/// Product code (SKU) as known by the catalog and the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductCode(String);

impl ProductCode {
    /// Creates a new product code from a string.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the product code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the code is blank.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for ProductCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProductCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProductCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A single line item of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_code: ProductCode,
    pub quantity: u32,
    pub unit_value: Money,
}

impl OrderItem {
    /// Creates a new line item.
    pub fn new(product_code: impl Into<ProductCode>, quantity: u32, unit_value: Money) -> Self {
        Self {
            product_code: product_code.into(),
            quantity,
            unit_value,
        }
    }

    /// Returns quantity × unit value.
    pub fn subtotal(&self) -> Result<Money, ModelError> {
        self.unit_value.multiply(self.quantity)
    }
}

/// Snapshot of the order being placed.
///
/// `total_amount` and `total_items` start at zero and are filled in by the
/// payment participant once it has charged the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub products: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub transaction_id: TransactionId,
    #[serde(default)]
    pub total_amount: Money,
    #[serde(default)]
    pub total_items: u32,
}

impl Order {
    /// Creates a new order snapshot for the given attempt.
    pub fn new(id: OrderId, transaction_id: TransactionId, products: Vec<OrderItem>) -> Self {
        Self {
            id,
            products,
            created_at: Utc::now(),
            transaction_id,
            total_amount: Money::zero(),
            total_items: 0,
        }
    }

    /// Sums the subtotals of all line items.
    pub fn calculate_total_amount(&self) -> Result<Money, ModelError> {
        Money::total(self.products.iter().map(OrderItem::subtotal))
    }

    /// Sums the quantities of all line items.
    pub fn calculate_total_items(&self) -> Result<u32, ModelError> {
        self.products.iter().try_fold(0u32, |acc, p| {
            acc.checked_add(p.quantity)
                .ok_or_else(|| ModelError::Overflow("Total item count".to_string()))
        })
    }

    /// Returns a copy with the aggregate totals replaced.
    pub fn with_totals(mut self, total_amount: Money, total_items: u32) -> Self {
        self.total_amount = total_amount;
        self.total_items = total_items;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order::new(
            OrderId::new(),
            TransactionId::generate(),
            vec![
                OrderItem::new("COMIC_BOOKS", 3, Money::from_dollars(10)),
                OrderItem::new("BOOKS", 1, Money::from_dollars(5)),
            ],
        )
    }

    #[test]
    fn test_totals() {
        let order = sample_order();
        assert_eq!(order.calculate_total_amount().unwrap(), Money::from_dollars(35));
        assert_eq!(order.calculate_total_items().unwrap(), 4);
    }

    #[test]
    fn test_totals_overflow_is_an_error() {
        let order = Order::new(
            OrderId::new(),
            TransactionId::generate(),
            vec![
                OrderItem::new("BOOKS", u32::MAX, Money::from_cents(1)),
                OrderItem::new("MUSIC", 1, Money::from_cents(1)),
            ],
        );
        assert!(matches!(
            order.calculate_total_items(),
            Err(ModelError::Overflow(_))
        ));

        let order = Order::new(
            OrderId::new(),
            TransactionId::generate(),
            vec![OrderItem::new("BOOKS", 2, Money::from_cents(i64::MAX / 2 + 1))],
        );
        assert!(matches!(
            order.calculate_total_amount(),
            Err(ModelError::Overflow(_))
        ));
    }

    #[test]
    fn test_new_order_has_zero_totals() {
        let order = sample_order();
        assert!(order.total_amount.is_zero());
        assert_eq!(order.total_items, 0);
    }

    #[test]
    fn test_with_totals() {
        let order = sample_order().with_totals(Money::from_cents(3500), 4);
        assert_eq!(order.total_amount.cents(), 3500);
        assert_eq!(order.total_items, 4);
    }

    #[test]
    fn test_blank_product_code() {
        assert!(ProductCode::new("").is_empty());
        assert!(!ProductCode::new("MUSIC").is_empty());
    }

    #[test]
    fn test_missing_totals_default_on_deserialize() {
        let order = sample_order();
        let mut json = serde_json::to_value(&order).unwrap();
        let obj = json.as_object_mut().unwrap();
        obj.remove("total_amount");
        obj.remove("total_items");

        let decoded: Order = serde_json::from_value(json).unwrap();
        assert!(decoded.total_amount.is_zero());
        assert_eq!(decoded.products, order.products);
    }
}
