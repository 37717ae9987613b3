//! Catalogue endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::{Money, ProductId};
use serde::Serialize;
use store::{ProductRecord, Storage};

use super::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock: i32,
}

impl From<ProductRecord> for ProductResponse {
    fn from(product: ProductRecord) -> Self {
        Self {
            id: product.id,
            name: product.name,
            price: product.price,
            stock: product.stock,
        }
    }
}

/// GET /api/products: List the catalogue ordered by id.
#[tracing::instrument(skip(state))]
pub async fn list<S: Storage + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.order_service.list_products().await?;
    Ok(Json(products.into_iter().map(ProductResponse::from).collect()))
}
