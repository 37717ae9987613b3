//! Order placement, lookup and cancellation endpoints.

use std::str::FromStr;
use std::sync::Arc;

use ::orders::{CartItem, CreateOrder, OrderCancelled, OrderPlaced};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderStatus, ProductId, UserId};
use serde::{Deserialize, Serialize};
use store::{OrderDetails, Storage};

use super::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub user_id: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: String,
    pub quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub total_amount: Money,
}

impl From<OrderPlaced> for OrderCreatedResponse {
    fn from(placed: OrderPlaced) -> Self {
        Self {
            order_id: placed.order_id,
            status: placed.status,
            total_amount: placed.total_amount,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
    pub user: OrderUserResponse,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Serialize)]
pub struct OrderUserResponse {
    pub id: UserId,
    pub email: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i32,
    pub price: Money,
}

impl From<OrderDetails> for OrderResponse {
    fn from(order: OrderDetails) -> Self {
        Self {
            order_id: order.id,
            status: order.status,
            total_amount: order.total_amount,
            created_at: order.created_at,
            user: OrderUserResponse {
                id: order.user.id,
                email: order.user.email,
            },
            items: order
                .items
                .into_iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id,
                    product_name: item.product_name,
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelledResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

impl From<OrderCancelled> for OrderCancelledResponse {
    fn from(cancelled: OrderCancelled) -> Self {
        Self {
            order_id: cancelled.order_id,
            status: cancelled.status,
        }
    }
}

// -- Handlers --

/// POST /api/orders: Turn a cart into an order.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: Storage + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let Json(req) = payload?;

    let user_id = req
        .user_id
        .as_deref()
        .map(|id| parse_id::<UserId>("userId", id))
        .transpose()?;
    let items = req
        .items
        .iter()
        .map(|item| {
            let product_id = parse_id::<ProductId>("productId", &item.product_id)?;
            Ok(CartItem::new(product_id, item.quantity))
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let placed = state
        .order_service
        .create_order(CreateOrder { user_id, items })
        .await?;

    Ok((StatusCode::CREATED, Json(placed.into())))
}

/// GET /api/orders/{orderId}: Load an order with its owner and items.
#[tracing::instrument(skip(state))]
pub async fn get<S: Storage + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_id::<OrderId>("orderId", &id)?;
    let order = state.order_service.get_order(order_id).await?;
    Ok(Json(order.into()))
}

/// PUT /api/orders/{orderId}/cancel: Cancel an order and restore its stock.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: Storage + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderCancelledResponse>, ApiError> {
    let order_id = parse_id::<OrderId>("orderId", &id)?;
    let cancelled = state.order_service.cancel_order(order_id).await?;
    Ok(Json(cancelled.into()))
}

fn parse_id<T>(field: &str, value: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = uuid::Error>,
{
    T::from_str(value).map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}
