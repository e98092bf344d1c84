// SPDX-License-Identifier: AGPL-3.0-or-later
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Integration tests for the REST API server with concurrent requests.
//!
//! These tests verify that the HTTP layer preserves the engine's
//! guarantees, in particular that racing buyers cannot oversell a listing.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use harvest_market_rs::external::{AlwaysApprove, MemoryNotifier, MemoryProofStore};
use harvest_market_rs::{
    DealId, DealStatus, Engine, InterestId, ListingId, MarketError, ProductId, Region, Unit,
    UserId,
};
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

// === DTOs (duplicated from example for test isolation) ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingRequest {
    pub producer: u32,
    pub product: u32,
    pub quantity: Decimal,
    pub unit: Unit,
    pub price_per_kg: Option<Decimal>,
    pub province: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestRequest {
    pub buyer: u32,
    pub product: u32,
    pub quantity: Decimal,
    pub unit: Unit,
    pub max_price_per_kg: Option<Decimal>,
    pub province: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptRequest {
    pub producer: u32,
    pub interest: u64,
    pub listing: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorRequest {
    pub user: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Server Setup ===

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub struct AppError(MarketError);

impl From<MarketError> for AppError {
    fn from(err: MarketError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            MarketError::ListingNotFound
            | MarketError::InterestNotFound
            | MarketError::DealNotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            MarketError::NotOwner => (StatusCode::FORBIDDEN, "NOT_OWNER"),
            MarketError::InsufficientStock => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_STOCK")
            }
            MarketError::InterestNotPending => (StatusCode::CONFLICT, "INTEREST_NOT_PENDING"),
            MarketError::AlreadyPaid => (StatusCode::CONFLICT, "ALREADY_PAID"),
            MarketError::IllegalTransition { .. } => (StatusCode::CONFLICT, "ILLEGAL_TRANSITION"),
            _ => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

async fn create_listing(
    State(state): State<AppState>,
    Json(request): Json<ListingRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let id = state.engine.publish_listing(
        UserId(request.producer),
        ProductId(request.product),
        request.quantity,
        request.unit,
        request.price_per_kg,
        Region::province(request.province),
    )?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id: id.0 })))
}

async fn create_interest(
    State(state): State<AppState>,
    Json(request): Json<InterestRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let id = state.engine.create_interest(
        UserId(request.buyer),
        ProductId(request.product),
        request.quantity,
        request.unit,
        request.max_price_per_kg,
        Region::province(request.province),
    )?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id: id.0 })))
}

async fn accept_interest(
    State(state): State<AppState>,
    Json(request): Json<AcceptRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let id = state.engine.accept_interest(
        UserId(request.producer),
        InterestId(request.interest),
        ListingId(request.listing),
    )?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id: id.0 })))
}

async fn pay_deal(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<ActorRequest>,
) -> Result<StatusCode, AppError> {
    state.engine.pay_instant(UserId(request.user), DealId(id))?;
    Ok(StatusCode::OK)
}

async fn confirm_delivery(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<ActorRequest>,
) -> Result<StatusCode, AppError> {
    state
        .engine
        .confirm_delivery(UserId(request.user), DealId(id))?;
    Ok(StatusCode::OK)
}

async fn list_listings(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(state.engine.listings()).unwrap())
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/listings", post(create_listing).get(list_listings))
        .route("/interests", post(create_interest))
        .route("/deals", post(accept_interest))
        .route("/deals/{id}/pay", post(pay_deal))
        .route("/deals/{id}/deliver", post(confirm_delivery))
        .with_state(state)
}

/// Test server that binds to an ephemeral port.
struct TestServer {
    base_url: String,
    engine: Arc<Engine>,
}

impl TestServer {
    async fn new() -> Self {
        let engine = Arc::new(Engine::new(
            Arc::new(MemoryNotifier::default()),
            Arc::new(AlwaysApprove),
            Arc::new(MemoryProofStore::default()),
        ));
        let state = AppState {
            engine: engine.clone(),
        };

        let app = create_router(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to be ready by polling with retries
        let client = Client::new();
        let health_url = format!("{}/listings", base_url);
        for _ in 0..50 {
            match client.get(&health_url).send().await {
                Ok(_) => break,
                Err(_) => tokio::time::sleep(tokio::time::Duration::from_millis(50)).await,
            }
        }

        TestServer { base_url, engine }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

// === Tests ===
// These tests are ignored in CI due to connection issues on some platforms.
// Run manually with: cargo test --test server_test -- --ignored

/// Full lifecycle over HTTP: publish, interest, accept, pay, deliver.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn lifecycle_over_http() {
    let server = TestServer::new().await;
    let client = Client::new();

    let response = client
        .post(server.url("/listings"))
        .json(&ListingRequest {
            producer: 1,
            product: 7,
            quantity: dec!(2),
            unit: Unit::Sack,
            price_per_kg: Some(dec!(50)),
            province: "Huambo".into(),
        })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let listing: CreatedResponse = response.json().await.unwrap();

    let response = client
        .post(server.url("/interests"))
        .json(&InterestRequest {
            buyer: 2,
            product: 7,
            quantity: dec!(80),
            unit: Unit::Kilogram,
            max_price_per_kg: Some(dec!(60)),
            province: "Huambo".into(),
        })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let interest: CreatedResponse = response.json().await.unwrap();

    let response = client
        .post(server.url("/deals"))
        .json(&AcceptRequest {
            producer: 1,
            interest: interest.id,
            listing: listing.id,
        })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let deal: CreatedResponse = response.json().await.unwrap();

    let response = client
        .post(server.url(&format!("/deals/{}/pay", deal.id)))
        .json(&json!({ "user": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .post(server.url(&format!("/deals/{}/deliver", deal.id)))
        .json(&json!({ "user": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let settled = server.engine.get_deal(DealId(deal.id)).unwrap();
    assert_eq!(settled.status, DealStatus::Completed);
    assert_eq!(settled.total_price, dec!(4000.00));
}

/// Racing accepts over HTTP: 10 buyers want 30 kg each from 50 kg of stock.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn concurrent_accepts_over_http_cannot_oversell() {
    let server = TestServer::new().await;
    let client = Client::new();

    const NUM_BUYERS: u32 = 10;

    let response = client
        .post(server.url("/listings"))
        .json(&ListingRequest {
            producer: 1,
            product: 7,
            quantity: dec!(50),
            unit: Unit::Kilogram,
            price_per_kg: Some(dec!(40)),
            province: "Huambo".into(),
        })
        .send()
        .await
        .unwrap();
    let listing: CreatedResponse = response.json().await.unwrap();

    let mut interest_ids = Vec::new();
    for buyer in 0..NUM_BUYERS {
        let response = client
            .post(server.url("/interests"))
            .json(&InterestRequest {
                buyer: 100 + buyer,
                product: 7,
                quantity: dec!(30),
                unit: Unit::Kilogram,
                max_price_per_kg: None,
                province: "Huambo".into(),
            })
            .send()
            .await
            .unwrap();
        let interest: CreatedResponse = response.json().await.unwrap();
        interest_ids.push(interest.id);
    }

    // All accepts fire at once; only one 30 kg reservation fits.
    let mut handles = Vec::new();
    for interest in interest_ids {
        let client = client.clone();
        let url = server.url("/deals");
        let listing = listing.id;

        handles.push(tokio::spawn(async move {
            let response = client
                .post(&url)
                .json(&AcceptRequest {
                    producer: 1,
                    interest,
                    listing,
                })
                .send()
                .await
                .unwrap();
            response.status()
        }));
    }

    let results: Vec<_> = futures::future::join_all(handles).await;
    let created = results
        .iter()
        .filter(|r| *r.as_ref().unwrap() == StatusCode::CREATED)
        .count();
    let rejected = results
        .iter()
        .filter(|r| *r.as_ref().unwrap() == StatusCode::UNPROCESSABLE_ENTITY)
        .count();

    assert_eq!(created, 1, "exactly one accept should win");
    assert_eq!(rejected, NUM_BUYERS as usize - 1);

    let listing = server.engine.get_listing(ListingId(listing.id)).unwrap();
    assert_eq!(listing.quantity_kg, dec!(20.000));
}

/// Error mapping: missing deal is 404, double payment is 409.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn error_statuses_over_http() {
    let server = TestServer::new().await;
    let client = Client::new();

    let response = client
        .post(server.url("/deals/404/pay"))
        .json(&json!({ "user": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Seed a paid deal, then pay again.
    let listing = server
        .engine
        .publish_listing(
            UserId(1),
            ProductId(7),
            dec!(100),
            Unit::Kilogram,
            Some(dec!(50)),
            Region::province("Huambo"),
        )
        .unwrap();
    let interest = server
        .engine
        .create_interest(
            UserId(2),
            ProductId(7),
            dec!(80),
            Unit::Kilogram,
            None,
            Region::province("Huambo"),
        )
        .unwrap();
    let deal = server
        .engine
        .accept_interest(UserId(1), interest, listing)
        .unwrap();
    server.engine.pay_instant(UserId(2), deal).unwrap();

    let response = client
        .post(server.url(&format!("/deals/{}/pay", deal.0)))
        .json(&json!({ "user": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body: ErrorResponse = response.json().await.unwrap();
    assert_eq!(body.code, "ALREADY_PAID");
}
