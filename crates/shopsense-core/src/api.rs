//! HTTP API over the storefront and the assistant.
//!
//! - `GET  /status`
//! - `GET  /api/search?q=&limit=&minScore=&category=`
//! - `GET  /api/products`, `POST /api/products`
//! - `POST /api/chat`

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;

use crate::assistant::{Assistant, ChatError, ChatEvent, ChatMessage};
use crate::config::SearchDefaults;
use crate::product::{NewProduct, Product};
use crate::search::{SearchError, SearchHit, SearchRequest};
use crate::storefront::{Created, Storefront, StorefrontError};

#[derive(Clone)]
pub struct AppState {
    pub storefront: Arc<Storefront>,
    pub assistant: Arc<Assistant>,
    pub search_defaults: SearchDefaults,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/api/search", get(search))
        .route("/api/products", get(list_products).post(create_product))
        .route("/api/chat", post(chat))
        .with_state(state)
}

/// Bind `addr` and serve until the process stops.
pub async fn serve(state: AppState, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(state)).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<usize>,
    pub min_score: Option<f32>,
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub meta: SearchMeta,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMeta {
    pub query: String,
    pub total_results: usize,
    pub search_params: EffectiveParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveParams {
    pub limit: usize,
    pub min_score: f32,
    pub filter_category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub events: Vec<ChatEvent>,
}

#[derive(Debug, Serialize)]
pub struct ProductsResponse {
    pub products: Vec<Product>,
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "collection": state.storefront.collection(),
        "products": state.storefront.product_count().await,
        "embeddings": state.storefront.embedding_count().await,
    }))
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = params
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Search query is required"))?;
    let limit = params.limit.unwrap_or(state.search_defaults.limit);
    let min_score = params.min_score.unwrap_or(state.search_defaults.min_score);

    let mut request = SearchRequest::new(&query)
        .with_limit(limit)
        .with_min_score(min_score);
    if let Some(category) = &params.category {
        request = request.with_filter("category", category.as_str());
    }

    let results: Vec<SearchHit> = state
        .storefront
        .search(&request)
        .await?
        .into_iter()
        .map(SearchHit::from)
        .collect();

    Ok(Json(SearchResponse {
        meta: SearchMeta {
            query,
            total_results: results.len(),
            search_params: EffectiveParams {
                limit,
                min_score,
                filter_category: params.category,
            },
        },
        results,
    }))
}

async fn list_products(State(state): State<AppState>) -> Json<ProductsResponse> {
    Json(ProductsResponse {
        products: state.storefront.list_products().await,
    })
}

async fn create_product(
    State(state): State<AppState>,
    Json(new): Json<NewProduct>,
) -> Result<(StatusCode, Json<Created>), ApiError> {
    let created = state.storefront.create_product(new, None).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = state.assistant.respond(&request.messages, &tx).await;
    drop(tx);
    result?;
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    Ok(Json(ChatResponse { events }))
}

/// Error response: status code plus `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<SearchError> for ApiError {
    fn from(e: SearchError) -> Self {
        let status = match e {
            SearchError::InvalidLimit | SearchError::InvalidMinScore(_) => StatusCode::BAD_REQUEST,
            SearchError::Embed(_) | SearchError::Store(_) => {
                tracing::error!(error = %e, "search unavailable");
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<StorefrontError> for ApiError {
    fn from(e: StorefrontError) -> Self {
        let status = match e {
            StorefrontError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => {
                tracing::error!(error = %e, "failed to create product");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        let status = match e {
            ChatError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        };
        tracing::error!(error = %e, "chat failed");
        Self {
            status,
            message: e.to_string(),
        }
    }
}
