//! Cart contents as stored in the `carts.items` JSON column.
//!
//! The hosted database stores one cart row per user with the lines as a JSON
//! array. These types apply the merge and quantity rules before the service
//! writes that array back.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ProductId;

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// Errors from cart mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("quantity must be between {min} and {max} (got {got})")]
    InvalidQuantity { min: u32, max: u32, got: u32 },

    #[error("product {0} is not in the cart")]
    LineNotFound(ProductId),
}

/// One product and how many of it the customer wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Ordered cart lines with at most one line per product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartItems(Vec<CartLine>);

impl CartItems {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Build from stored lines, folding duplicate products together.
    ///
    /// Rows written by older clients may contain the same product twice or
    /// zero-quantity lines; both are normalised here.
    #[must_use]
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut items = Self::new();
        for line in lines {
            if line.quantity == 0 {
                continue;
            }
            items.merge(line.product_id, line.quantity);
        }
        items
    }

    /// Add `quantity` of a product, merging into an existing line.
    ///
    /// The merged quantity is capped at [`MAX_LINE_QUANTITY`]; the resulting
    /// line quantity is returned.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`] when `quantity` is 0 or above
    /// the per-line maximum.
    pub fn add(&mut self, product_id: ProductId, quantity: u32) -> Result<u32, CartError> {
        check_quantity(quantity, 1)?;
        Ok(self.merge(product_id, quantity))
    }

    /// Set the quantity of an existing line. Zero removes the line.
    ///
    /// Returns the previous quantity.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`] above the per-line maximum and
    /// [`CartError::LineNotFound`] if the product is not in the cart.
    pub fn set_quantity(&mut self, product_id: ProductId, quantity: u32) -> Result<u32, CartError> {
        check_quantity(quantity, 0)?;
        let index = self
            .position(product_id)
            .ok_or(CartError::LineNotFound(product_id))?;

        if quantity == 0 {
            return Ok(self.0.remove(index).quantity);
        }

        let line = self
            .0
            .get_mut(index)
            .ok_or(CartError::LineNotFound(product_id))?;
        let previous = line.quantity;
        line.quantity = quantity;
        Ok(previous)
    }

    /// Remove a product's line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::LineNotFound`] if the product is not in the cart.
    pub fn remove(&mut self, product_id: ProductId) -> Result<CartLine, CartError> {
        let index = self
            .position(product_id)
            .ok_or(CartError::LineNotFound(product_id))?;
        Ok(self.0.remove(index))
    }

    #[must_use]
    pub fn get(&self, product_id: ProductId) -> Option<&CartLine> {
        self.0.iter().find(|line| line.product_id == product_id)
    }

    /// Sum of all line quantities.
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.0.iter().map(|line| line.quantity).sum()
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn position(&self, product_id: ProductId) -> Option<usize> {
        self.0.iter().position(|line| line.product_id == product_id)
    }

    fn merge(&mut self, product_id: ProductId, quantity: u32) -> u32 {
        if let Some(line) = self.0.iter_mut().find(|line| line.product_id == product_id) {
            line.quantity = line.quantity.saturating_add(quantity).min(MAX_LINE_QUANTITY);
            return line.quantity;
        }

        let quantity = quantity.min(MAX_LINE_QUANTITY);
        self.0.push(CartLine {
            product_id,
            quantity,
        });
        quantity
    }
}

fn check_quantity(quantity: u32, min: u32) -> Result<(), CartError> {
    if quantity < min || quantity > MAX_LINE_QUANTITY {
        return Err(CartError::InvalidQuantity {
            min,
            max: MAX_LINE_QUANTITY,
            got: quantity,
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn product(n: u128) -> ProductId {
        ProductId::new(Uuid::from_u128(n))
    }

    #[test]
    fn test_add_merges_existing_line() {
        let mut cart = CartItems::new();
        cart.add(product(1), 2).unwrap();
        cart.add(product(2), 1).unwrap();
        let quantity = cart.add(product(1), 3).unwrap();

        assert_eq!(quantity, 5);
        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.total_quantity(), 6);
    }

    #[test]
    fn test_add_caps_merged_quantity() {
        let mut cart = CartItems::new();
        cart.add(product(1), 90).unwrap();
        cart.add(product(1), 20).unwrap();
        assert_eq!(cart.get(product(1)).unwrap().quantity, MAX_LINE_QUANTITY);
    }

    #[test]
    fn test_add_rejects_zero_and_excessive_quantity() {
        let mut cart = CartItems::new();
        assert!(matches!(
            cart.add(product(1), 0),
            Err(CartError::InvalidQuantity { got: 0, .. })
        ));
        assert!(matches!(
            cart.add(product(1), 100),
            Err(CartError::InvalidQuantity { got: 100, .. })
        ));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_set_quantity_zero_removes_line() {
        let mut cart = CartItems::new();
        cart.add(product(1), 4).unwrap();
        cart.add(product(2), 1).unwrap();

        assert_eq!(cart.set_quantity(product(1), 0).unwrap(), 4);
        assert!(cart.get(product(1)).is_none());
        assert_eq!(cart.total_quantity(), 1);
    }

    #[test]
    fn test_set_quantity_missing_line() {
        let mut cart = CartItems::new();
        assert_eq!(
            cart.set_quantity(product(9), 2),
            Err(CartError::LineNotFound(product(9)))
        );
    }

    #[test]
    fn test_remove_keeps_order_of_other_lines() {
        let mut cart = CartItems::new();
        cart.add(product(1), 1).unwrap();
        cart.add(product(2), 1).unwrap();
        cart.add(product(3), 1).unwrap();

        cart.remove(product(2)).unwrap();
        let ids: Vec<_> = cart.lines().iter().map(|l| l.product_id).collect();
        assert_eq!(ids, vec![product(1), product(3)]);
        assert!(cart.remove(product(2)).is_err());
    }

    #[test]
    fn test_from_lines_normalises_stored_rows() {
        let cart = CartItems::from_lines([
            CartLine { product_id: product(1), quantity: 2 },
            CartLine { product_id: product(2), quantity: 0 },
            CartLine { product_id: product(1), quantity: 3 },
        ]);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.total_quantity(), 5);
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let mut cart = CartItems::new();
        cart.add(product(1), 2).unwrap();
        let json = serde_json::to_value(&cart).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "product_id": "00000000-0000-0000-0000-000000000001",
                "quantity": 2
            }])
        );
    }
}
