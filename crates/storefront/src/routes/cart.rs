//! Cart route handlers.
//!
//! One cart row per customer lives in the hosted `carts` table. Handlers load
//! the row, apply the change with `CartItems`, validate stock where quantities
//! grow and write the whole row back. Concurrent writers are last-writer-wins.

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection, rejection::QueryRejection},
};
use chrono::{DateTime, Utc};
use pawpantry_core::{CartItems, ProductId, UserId};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::json_body;
use crate::backend::CartRecord;
use crate::error::{AppError, Result};
use crate::middleware::CurrentCustomer;
use crate::state::AppState;

/// Cart as returned to clients.
#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub user_id: UserId,
    pub items: CartItems,
    pub total_quantity: u32,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<CartRecord> for CartResponse {
    fn from(record: CartRecord) -> Self {
        Self {
            user_id: record.user_id,
            total_quantity: record.items.total_quantity(),
            items: record.items,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

const fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct RemoveQuery {
    pub product_id: Option<ProductId>,
}

/// Show the customer's cart.
///
/// GET /api/cart
///
/// A customer without a cart row gets an empty cart.
#[instrument(skip(state, customer), fields(user_id = %customer.user_id))]
pub async fn show(
    State(state): State<AppState>,
    customer: CurrentCustomer,
) -> Result<Json<CartResponse>> {
    let record = load(&state, customer.user_id).await?;
    Ok(Json(record.into()))
}

/// Add a product to the cart, merging with an existing line.
///
/// POST /api/cart
#[instrument(skip(state, customer, payload), fields(user_id = %customer.user_id))]
pub async fn add(
    State(state): State<AppState>,
    customer: CurrentCustomer,
    payload: std::result::Result<Json<AddToCartRequest>, JsonRejection>,
) -> Result<Json<CartResponse>> {
    let body = json_body(payload)?;
    let mut record = load(&state, customer.user_id).await?;

    let quantity = record.items.add(body.product_id, body.quantity)?;
    tracing::debug!(product_id = %body.product_id, quantity, "Line added");

    ensure_in_stock(&state, &record.items).await?;
    save(&state, customer.user_id, &record.items).await
}

/// Set a line's quantity. Zero removes the line.
///
/// PATCH /api/cart
#[instrument(skip(state, customer, payload), fields(user_id = %customer.user_id))]
pub async fn update(
    State(state): State<AppState>,
    customer: CurrentCustomer,
    payload: std::result::Result<Json<UpdateCartRequest>, JsonRejection>,
) -> Result<Json<CartResponse>> {
    let body = json_body(payload)?;
    let mut record = load(&state, customer.user_id).await?;

    let previous = record.items.set_quantity(body.product_id, body.quantity)?;
    if body.quantity > previous {
        ensure_in_stock(&state, &record.items).await?;
    }

    save(&state, customer.user_id, &record.items).await
}

/// Remove one line, or clear the cart when no product is given.
///
/// DELETE /api/cart?product_id=<uuid>
/// DELETE /api/cart
#[instrument(skip(state, customer, query), fields(user_id = %customer.user_id))]
pub async fn remove(
    State(state): State<AppState>,
    customer: CurrentCustomer,
    query: std::result::Result<Query<RemoveQuery>, QueryRejection>,
) -> Result<Json<CartResponse>> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let Some(product_id) = query.product_id else {
        state.backend().delete_cart(customer.user_id).await?;
        tracing::info!("Cart cleared");
        return Ok(Json(CartRecord::empty(customer.user_id).into()));
    };

    let mut record = load(&state, customer.user_id).await?;
    record.items.remove(product_id)?;
    save(&state, customer.user_id, &record.items).await
}

async fn load(state: &AppState, user_id: UserId) -> Result<CartRecord> {
    let record = state.backend().get_cart(user_id).await?;
    Ok(record.unwrap_or_else(|| CartRecord::empty(user_id)))
}

async fn save(state: &AppState, user_id: UserId, items: &CartItems) -> Result<Json<CartResponse>> {
    let record = state.backend().upsert_cart(user_id, items).await?;
    Ok(Json(record.into()))
}

/// Reject the change when any line exceeds available stock.
async fn ensure_in_stock(state: &AppState, items: &CartItems) -> Result<()> {
    let shortfalls = state.backend().check_stock(items).await?;
    if shortfalls.is_empty() {
        return Ok(());
    }

    let products = shortfalls
        .iter()
        .map(|s| s.product_id.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    tracing::info!(%products, "Insufficient stock");
    Err(AppError::BadRequest(format!("Insufficient stock for: {products}")))
}
