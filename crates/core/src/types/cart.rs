//! Cart line items and order summaries.

use serde::{Deserialize, Serialize};

use super::catalog::Product;
use super::id::ProductId;
use super::price::{CurrencyCode, Price};

/// One line item in a cart.
///
/// Display attributes are copied from the catalog when the entry is created and
/// are not re-synced afterwards. `quantity` is at least 1 for as long as the
/// entry exists; callers remove the entry instead of storing zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartEntry {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Price,
    pub image: String,
    pub quantity: u32,
}

impl CartEntry {
    /// Create an entry for `product` with the given quantity.
    #[must_use]
    pub fn from_product(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id,
            name: product.name.clone(),
            unit_price: product.price,
            image: product.image.clone(),
            quantity,
        }
    }

    /// `unit_price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// One line of an order summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Price,
    pub line_total: Price,
}

/// Read-only summary surfaced at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub lines: Vec<OrderLine>,
    /// Σ unit price × quantity over all lines.
    pub subtotal: Price,
    /// Service charge line; the storefront does not charge one.
    pub service_charge: Price,
    /// `subtotal + service_charge`.
    pub total: Price,
}

impl OrderSummary {
    /// Build a summary from cart entries, recomputing every amount.
    #[must_use]
    pub fn from_entries(entries: &[CartEntry]) -> Self {
        let currency = entries
            .first()
            .map_or(CurrencyCode::default(), |e| e.unit_price.currency_code);

        let lines: Vec<OrderLine> = entries
            .iter()
            .map(|entry| OrderLine {
                product_id: entry.product_id,
                name: entry.name.clone(),
                quantity: entry.quantity,
                unit_price: entry.unit_price,
                line_total: entry.line_total(),
            })
            .collect();

        let subtotal = lines
            .iter()
            .fold(Price::zero(currency), |acc, line| acc.plus(&line.line_total));
        let service_charge = Price::zero(currency);

        Self {
            lines,
            subtotal,
            service_charge,
            total: subtotal.plus(&service_charge),
        }
    }

    /// Whether the summary has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn entry(id: i32, price: i64, quantity: u32) -> CartEntry {
        CartEntry {
            product_id: ProductId::new(id),
            name: format!("Service {id}"),
            unit_price: Price::new(Decimal::from(price), CurrencyCode::USD),
            image: String::new(),
            quantity,
        }
    }

    #[test]
    fn test_line_total() {
        assert_eq!(entry(1, 50, 3).line_total().amount, Decimal::from(150));
    }

    #[test]
    fn test_summary_totals() {
        let summary = OrderSummary::from_entries(&[entry(1, 1500, 1), entry(2, 75, 2)]);
        assert_eq!(summary.lines.len(), 2);
        assert_eq!(summary.subtotal.amount, Decimal::from(1650));
        assert!(summary.service_charge.is_zero());
        assert_eq!(summary.total, summary.subtotal);
    }

    #[test]
    fn test_empty_summary() {
        let summary = OrderSummary::from_entries(&[]);
        assert!(summary.is_empty());
        assert!(summary.total.is_zero());
    }
}
