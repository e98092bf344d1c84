//! Simple REST API server example for the marketplace engine.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `POST /listings` - Publish a harvest listing
//! - `GET /listings` - List all listings
//! - `GET /listings/{id}` - Get a listing by ID
//! - `POST /listings/{id}/withdraw` - Withdraw a listing
//! - `POST /interests` - Register a purchase interest
//! - `GET /interests/{id}/matches` - Ranked compatible listings
//! - `POST /deals` - Accept an interest against a listing
//! - `GET /deals` - List all deals
//! - `GET /deals/{id}` - Get a deal by ID
//! - `POST /deals/{id}/pay` - Pay instantly through the gateway
//! - `POST /deals/{id}/proof` - Submit a transfer proof
//! - `POST /deals/{id}/validate` - Admin approves the proof
//! - `POST /deals/{id}/reject-payment` - Admin rejects the proof
//! - `POST /deals/{id}/deliver` - Producer confirms delivery
//! - `POST /deals/{id}/reject-delivery` - Producer rejects and refunds
//!
//! ## Example Usage
//!
//! ```bash
//! # Publish two sacks of maize at 50 per kg
//! curl -X POST http://localhost:3000/listings \
//!   -H "Content-Type: application/json" \
//!   -d '{"producer": 1, "product": 7, "quantity": "2", "unit": "sack", "price_per_kg": "50", "province": "Huambo"}'
//!
//! # Register an interest in 80 kg at up to 60 per kg
//! curl -X POST http://localhost:3000/interests \
//!   -H "Content-Type: application/json" \
//!   -d '{"buyer": 2, "product": 7, "quantity": "80", "unit": "kg", "max_price_per_kg": "60", "province": "Huambo"}'
//!
//! # Accept the interest
//! curl -X POST http://localhost:3000/deals \
//!   -H "Content-Type: application/json" \
//!   -d '{"producer": 1, "interest": 1, "listing": 1}'
//!
//! # Pay
//! curl -X POST http://localhost:3000/deals/1/pay \
//!   -H "Content-Type: application/json" -d '{"buyer": 2}'
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use harvest_market_rs::external::{
    MemoryNotifier, MemoryProofStore, ProofUpload, SimulatedGateway,
};
use harvest_market_rs::{
    Deal, DealId, Engine, Interest, InterestId, Listing, ListingId, MarketError, ProductId,
    Region, Unit, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

// === Request/Response DTOs ===

/// Request body for publishing a listing.
#[derive(Debug, Deserialize)]
pub struct ListingRequest {
    pub producer: u32,
    pub product: u32,
    pub quantity: Decimal,
    pub unit: Unit,
    pub price_per_kg: Option<Decimal>,
    pub province: String,
    pub municipality: Option<String>,
}

/// Request body for registering an interest.
#[derive(Debug, Deserialize)]
pub struct InterestRequest {
    pub buyer: u32,
    pub product: u32,
    pub quantity: Decimal,
    pub unit: Unit,
    pub max_price_per_kg: Option<Decimal>,
    pub province: String,
    pub municipality: Option<String>,
}

/// Request body for accepting an interest.
#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub producer: u32,
    pub interest: u64,
    pub listing: u64,
}

/// Request body for actions performed by one user.
#[derive(Debug, Deserialize)]
pub struct ActorRequest {
    #[serde(alias = "buyer", alias = "producer")]
    pub user: u32,
}

/// Request body for submitting a transfer proof.
#[derive(Debug, Deserialize)]
pub struct ProofRequest {
    pub buyer: u32,
    pub filename: String,
    #[serde(default)]
    pub content: Option<String>,
}

/// Request body for an admin proof rejection.
#[derive(Debug, Deserialize)]
pub struct RejectPaymentRequest {
    pub reason: String,
}

/// Response body carrying a freshly created ID.
#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: u64,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the marketplace engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

// === Error Handling ===

/// Wrapper for converting `MarketError` into HTTP responses.
pub struct AppError(MarketError);

impl From<MarketError> for AppError {
    fn from(err: MarketError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            MarketError::UnsupportedUnit(_) => (StatusCode::BAD_REQUEST, "UNSUPPORTED_UNIT"),
            MarketError::InvalidQuantity => (StatusCode::BAD_REQUEST, "INVALID_QUANTITY"),
            MarketError::InvalidPrice => (StatusCode::BAD_REQUEST, "INVALID_PRICE"),
            MarketError::BelowMinimumQuantity => {
                (StatusCode::BAD_REQUEST, "BELOW_MINIMUM_QUANTITY")
            }
            MarketError::Matching { .. } => (StatusCode::BAD_REQUEST, "MATCHING_FAILED"),
            MarketError::ListingNotFound => (StatusCode::NOT_FOUND, "LISTING_NOT_FOUND"),
            MarketError::InterestNotFound => (StatusCode::NOT_FOUND, "INTEREST_NOT_FOUND"),
            MarketError::DealNotFound => (StatusCode::NOT_FOUND, "DEAL_NOT_FOUND"),
            MarketError::NotOwner => (StatusCode::FORBIDDEN, "NOT_OWNER"),
            MarketError::ListingNotOpen => (StatusCode::CONFLICT, "LISTING_NOT_OPEN"),
            MarketError::ListingNotPriced => (StatusCode::CONFLICT, "LISTING_NOT_PRICED"),
            MarketError::ListingInUse => (StatusCode::CONFLICT, "LISTING_IN_USE"),
            MarketError::InterestNotPending => (StatusCode::CONFLICT, "INTEREST_NOT_PENDING"),
            MarketError::ProductMismatch => {
                (StatusCode::UNPROCESSABLE_ENTITY, "PRODUCT_MISMATCH")
            }
            MarketError::InsufficientStock => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_STOCK")
            }
            MarketError::IllegalTransition { .. } => (StatusCode::CONFLICT, "ILLEGAL_TRANSITION"),
            MarketError::AlreadyPaid => (StatusCode::CONFLICT, "ALREADY_PAID"),
            MarketError::PaymentDeclined => {
                (StatusCode::UNPROCESSABLE_ENTITY, "PAYMENT_DECLINED")
            }
            MarketError::ProofTypeRejected(_) => (StatusCode::BAD_REQUEST, "PROOF_TYPE_REJECTED"),
            MarketError::DuplicateInvoiceRef => {
                (StatusCode::CONFLICT, "DUPLICATE_INVOICE_REF")
            }
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

fn not_found(what: &str, code: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("{what} not found"),
            code: code.to_string(),
        }),
    )
}

// === Handlers ===

/// POST /listings - Publish a harvest listing.
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
        Region {
            province: request.province,
            municipality: request.municipality,
        },
    )?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id: id.0 })))
}

/// GET /listings - List all listings.
async fn list_listings(State(state): State<AppState>) -> Json<Vec<Listing>> {
    Json(state.engine.listings())
}

/// GET /listings/{id} - Get listing by ID.
async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Listing>, (StatusCode, Json<ErrorResponse>)> {
    state
        .engine
        .get_listing(ListingId(id))
        .map(Json)
        .ok_or_else(|| not_found("Listing", "LISTING_NOT_FOUND"))
}

/// POST /listings/{id}/withdraw - Withdraw a listing.
async fn withdraw_listing(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<ActorRequest>,
) -> Result<StatusCode, AppError> {
    state
        .engine
        .withdraw_listing(UserId(request.user), ListingId(id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /interests - Register a purchase interest.
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
        Region {
            province: request.province,
            municipality: request.municipality,
        },
    )?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id: id.0 })))
}

/// GET /interests/{id} - Get interest by ID.
async fn get_interest(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Interest>, (StatusCode, Json<ErrorResponse>)> {
    state
        .engine
        .get_interest(InterestId(id))
        .map(Json)
        .ok_or_else(|| not_found("Interest", "INTEREST_NOT_FOUND"))
}

/// GET /interests/{id}/matches - Ranked compatible listings, cheapest first.
async fn get_matches(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<Listing>>, AppError> {
    Ok(Json(state.engine.find_matches(InterestId(id))?))
}

/// POST /deals - Accept an interest against a listing.
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

/// GET /deals - List all deals.
async fn list_deals(State(state): State<AppState>) -> Json<Vec<Deal>> {
    Json(state.engine.deals())
}

/// GET /deals/{id} - Get deal by ID.
async fn get_deal(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Deal>, (StatusCode, Json<ErrorResponse>)> {
    state
        .engine
        .get_deal(DealId(id))
        .map(Json)
        .ok_or_else(|| not_found("Deal", "DEAL_NOT_FOUND"))
}

/// POST /deals/{id}/pay - Instant payment through the gateway.
async fn pay_deal(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<ActorRequest>,
) -> Result<StatusCode, AppError> {
    state.engine.pay_instant(UserId(request.user), DealId(id))?;
    Ok(StatusCode::OK)
}

/// POST /deals/{id}/proof - Submit a transfer proof document.
async fn submit_proof(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<ProofRequest>,
) -> Result<StatusCode, AppError> {
    let bytes = request
        .content
        .map(String::into_bytes)
        .unwrap_or_default();
    state.engine.submit_transfer_proof(
        UserId(request.buyer),
        DealId(id),
        ProofUpload {
            filename: request.filename,
            bytes,
        },
    )?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /deals/{id}/validate - Admin approves the submitted proof.
async fn validate_payment(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    state.engine.validate_payment(DealId(id))?;
    Ok(StatusCode::OK)
}

/// POST /deals/{id}/reject-payment - Admin rejects the submitted proof.
async fn reject_payment(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<RejectPaymentRequest>,
) -> Result<StatusCode, AppError> {
    state.engine.reject_payment(DealId(id), &request.reason)?;
    Ok(StatusCode::OK)
}

/// POST /deals/{id}/deliver - Producer confirms delivery.
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

/// POST /deals/{id}/reject-delivery - Producer rejects; buyer refunded.
async fn reject_delivery(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<ActorRequest>,
) -> Result<StatusCode, AppError> {
    state
        .engine
        .reject_delivery(UserId(request.user), DealId(id))?;
    Ok(StatusCode::OK)
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/listings", post(create_listing).get(list_listings))
        .route("/listings/{id}", get(get_listing))
        .route("/listings/{id}/withdraw", post(withdraw_listing))
        .route("/interests", post(create_interest))
        .route("/interests/{id}", get(get_interest))
        .route("/interests/{id}/matches", get(get_matches))
        .route("/deals", post(accept_interest).get(list_deals))
        .route("/deals/{id}", get(get_deal))
        .route("/deals/{id}/pay", post(pay_deal))
        .route("/deals/{id}/proof", post(submit_proof))
        .route("/deals/{id}/validate", post(validate_payment))
        .route("/deals/{id}/reject-payment", post(reject_payment))
        .route("/deals/{id}/deliver", post(confirm_delivery))
        .route("/deals/{id}/reject-delivery", post(reject_delivery))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    let state = AppState {
        engine: Arc::new(Engine::new(
            Arc::new(MemoryNotifier::default()),
            Arc::new(SimulatedGateway),
            Arc::new(MemoryProofStore::default()),
        )),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    println!("Harvest Market API server running on http://127.0.0.1:3000");
    println!();
    println!("Endpoints:");
    println!("  POST /listings                    - Publish a listing");
    println!("  GET  /listings                    - List all listings");
    println!("  POST /interests                   - Register an interest");
    println!("  GET  /interests/:id/matches       - Ranked compatible listings");
    println!("  POST /deals                       - Accept an interest");
    println!("  POST /deals/:id/pay               - Pay instantly");
    println!("  POST /deals/:id/proof             - Submit a transfer proof");
    println!("  POST /deals/:id/validate          - Validate the proof");
    println!("  POST /deals/:id/deliver           - Confirm delivery");

    axum::serve(listener, app).await.unwrap();
}
