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

//! # Harvest Market
//!
//! This library provides the core engine of a produce marketplace: growers
//! publish harvest listings, buyers register purchase interests, a matching
//! pass pairs them up, and accepted pairs run through an escrow-style deal
//! lifecycle from payment to settlement or refund.
//!
//! ## Core Components
//!
//! - [`Engine`]: Central orchestrator managing listings, interests and deals
//! - [`Listing`] / [`Interest`]: Supply and demand, quantities normalized to
//!   canonical kilograms
//! - [`Deal`]: The escrow state machine (payment, proof validation, delivery)
//! - [`matching`]: Compatibility predicates and the batch matcher
//! - [`MarketError`]: Error taxonomy for every operation
//!
//! ## Example
//!
//! ```
//! use harvest_market_rs::{Engine, ProductId, Region, UserId, Unit};
//! use harvest_market_rs::external::{AlwaysApprove, MemoryNotifier, MemoryProofStore};
//! use rust_decimal_macros::dec;
//! use std::sync::Arc;
//!
//! let engine = Engine::new(
//!     Arc::new(MemoryNotifier::default()),
//!     Arc::new(AlwaysApprove),
//!     Arc::new(MemoryProofStore::default()),
//! );
//!
//! // A grower publishes two sacks of maize at 50 per kg.
//! let listing = engine
//!     .publish_listing(
//!         UserId(1),
//!         ProductId(7),
//!         dec!(2),
//!         Unit::Sack,
//!         Some(dec!(50)),
//!         Region::province("Huambo"),
//!     )
//!     .unwrap();
//!
//! // A buyer wants 80 kg of the same product, paying at most 60 per kg.
//! let interest = engine
//!     .create_interest(
//!         UserId(2),
//!         ProductId(7),
//!         dec!(80),
//!         Unit::Kilogram,
//!         Some(dec!(60)),
//!         Region::province("Huambo"),
//!     )
//!     .unwrap();
//!
//! assert_eq!(engine.run_matching(), vec![(interest, listing)]);
//!
//! // The grower accepts; stock is reserved and a deal opens.
//! let deal = engine.accept_interest(UserId(1), interest, listing).unwrap();
//! assert_eq!(engine.get_deal(deal).unwrap().total_price, dec!(4000.00));
//! ```
//!
//! ## Thread Safety
//!
//! The engine is safe to share across threads. Stock reservation is checked
//! and committed under a per-listing exclusive guard, so concurrent buyers
//! can never oversell a listing.

pub mod base;
pub mod deal;
mod deal_ledger;
mod engine;
pub mod error;
pub mod external;
pub mod interest;
pub mod listing;
pub mod matching;
pub mod quantity;

pub use base::{DealId, InterestId, InvoiceRef, ListingId, ProductId, ProofRef, Region, UserId};
pub use deal::{Deal, DealStatus, PaymentMethod};
pub use deal_ledger::DealLedger;
pub use engine::Engine;
pub use error::MarketError;
pub use interest::{Interest, InterestStatus};
pub use listing::{Listing, ListingStatus};
pub use quantity::Unit;
