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

//! Error types for marketplace operations.
//!
//! Insufficient stock during a reservation check is a normal business
//! outcome surfaced as `InsufficientStock` by the engine, while the guard
//! itself ([`crate::matching::can_reserve`]) stays a plain boolean predicate.

use crate::deal::DealStatus;
use thiserror::Error;

/// Marketplace processing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    /// Measurement unit string not recognized at the boundary
    #[error("unsupported unit: {0}")]
    UnsupportedUnit(String),

    /// Quantity is zero or negative
    #[error("quantity must be positive")]
    InvalidQuantity,

    /// Price is zero or negative
    #[error("price must be positive")]
    InvalidPrice,

    /// Quantity below the per-unit minimum for publication
    #[error("quantity below the minimum for this unit")]
    BelowMinimumQuantity,

    /// Compatibility evaluation received malformed input
    #[error("{context} error: {reason}")]
    Matching {
        context: &'static str,
        reason: String,
    },

    /// Referenced listing does not exist
    #[error("listing not found")]
    ListingNotFound,

    /// Referenced interest does not exist
    #[error("interest not found")]
    InterestNotFound,

    /// Referenced deal does not exist
    #[error("deal not found")]
    DealNotFound,

    /// Caller does not own the referenced record
    #[error("operation not permitted for this user")]
    NotOwner,

    /// Listing is not open for matching or sale
    #[error("listing is not available")]
    ListingNotOpen,

    /// Listing has no unit price yet; price must be set before acceptance
    #[error("listing has no price set")]
    ListingNotPriced,

    /// Listing is referenced by at least one deal and cannot be removed
    #[error("listing is referenced by a deal")]
    ListingInUse,

    /// Interest is not in the pending state
    #[error("interest is not pending")]
    InterestNotPending,

    /// Accepted pair references two different products
    #[error("interest and listing reference different products")]
    ProductMismatch,

    /// Requested quantity exceeds the listing's available stock
    #[error("insufficient stock for the requested quantity")]
    InsufficientStock,

    /// Deal state does not permit the attempted transition
    #[error("illegal transition: {event} not allowed from {from:?}")]
    IllegalTransition {
        from: DealStatus,
        event: &'static str,
    },

    /// Re-entrant payment attempt on a deal that left `PendingPayment`
    #[error("deal already submitted for payment or validated")]
    AlreadyPaid,

    /// The payment gateway declined the instant charge
    #[error("payment declined by gateway")]
    PaymentDeclined,

    /// Uploaded proof file has a disallowed extension
    #[error("proof file type not allowed: {0}")]
    ProofTypeRejected(String),

    /// Invoice reference collided with an existing deal
    #[error("duplicate invoice reference")]
    DuplicateInvoiceRef,
}

#[cfg(test)]
mod tests {
    use super::MarketError;
    use crate::deal::DealStatus;

    #[test]
    fn error_display_messages() {
        assert_eq!(
            MarketError::UnsupportedUnit("arroba".into()).to_string(),
            "unsupported unit: arroba"
        );
        assert_eq!(
            MarketError::InvalidQuantity.to_string(),
            "quantity must be positive"
        );
        assert_eq!(
            MarketError::InvalidPrice.to_string(),
            "price must be positive"
        );
        assert_eq!(
            MarketError::InsufficientStock.to_string(),
            "insufficient stock for the requested quantity"
        );
        assert_eq!(
            MarketError::Matching {
                context: "matching",
                reason: "bad tolerance".into()
            }
            .to_string(),
            "matching error: bad tolerance"
        );
        assert_eq!(
            MarketError::IllegalTransition {
                from: DealStatus::Completed,
                event: "confirm_delivery"
            }
            .to_string(),
            "illegal transition: confirm_delivery not allowed from Completed"
        );
        assert_eq!(
            MarketError::AlreadyPaid.to_string(),
            "deal already submitted for payment or validated"
        );
        assert_eq!(
            MarketError::ProductMismatch.to_string(),
            "interest and listing reference different products"
        );
    }

    #[test]
    fn errors_are_cloneable() {
        let error = MarketError::InsufficientStock;
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }
}
