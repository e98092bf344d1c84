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

//! Deal lifecycle: the escrow-style state machine carrying an accepted
//! interest from payment to settlement or refund.
//!
//! ```text
//! PendingPayment ──instant payment──────────────► InCustody
//!       │                                            │
//!       └──proof submitted──► AwaitingValidation     ├──delivery confirmed──► Completed
//!                │                   │               │
//!                │◄──admin rejects───┘               └──producer rejects──► RejectedRefunded
//!                │    (proof cleared,
//!                     invoice ref reused)
//! ```
//!
//! Every transition method checks the current status first and fails with
//! [`MarketError::IllegalTransition`] (or [`MarketError::AlreadyPaid`] for
//! re-entrant payment attempts) without touching any field.

use crate::base::{DealId, InterestId, InvoiceRef, ListingId, ProofRef, UserId};
use crate::error::MarketError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Deal lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    /// Initial state; buyer has not paid yet.
    PendingPayment,
    /// Buyer submitted an offline-transfer proof; admin must validate it.
    AwaitingValidation,
    /// Funds are confirmed held in escrow.
    InCustody,
    /// Producer confirmed delivery; funds released. Terminal.
    Completed,
    /// Producer rejected after custody; buyer refunded. Terminal.
    RejectedRefunded,
}

/// How the buyer paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Instant payment through the gateway.
    Express,
    /// Bank transfer with an uploaded proof document.
    Transfer,
}

/// A deal in progress: an accepted interest bound to a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    pub listing: ListingId,
    pub interest: InterestId,
    pub buyer: UserId,
    /// Committed quantity in canonical kilograms, positive and never above
    /// the listing's stock at commit time.
    pub quantity_kg: Decimal,
    /// Unit price times quantity, rounded half-up to 2 decimal places.
    pub total_price: Decimal,
    pub payment_method: Option<PaymentMethod>,
    pub proof: Option<ProofRef>,
    pub invoice_ref: InvoiceRef,
    pub status: DealStatus,
    pub created_at: DateTime<Utc>,
}

impl Deal {
    pub(crate) fn new(
        id: DealId,
        listing: ListingId,
        interest: InterestId,
        buyer: UserId,
        quantity_kg: Decimal,
        total_price: Decimal,
        invoice_ref: InvoiceRef,
    ) -> Self {
        Self {
            id,
            listing,
            interest,
            buyer,
            quantity_kg,
            total_price,
            payment_method: None,
            proof: None,
            invoice_ref,
            status: DealStatus::PendingPayment,
            created_at: Utc::now(),
        }
    }

    fn illegal(&self, event: &'static str) -> MarketError {
        MarketError::IllegalTransition {
            from: self.status,
            event,
        }
    }

    /// `PendingPayment` -> `InCustody` after a confirmed gateway charge.
    ///
    /// A deal that already left `PendingPayment` must not be re-processed;
    /// that would risk double settlement.
    pub fn record_instant_payment(&mut self) -> Result<(), MarketError> {
        if self.status != DealStatus::PendingPayment {
            return Err(MarketError::AlreadyPaid);
        }
        self.payment_method = Some(PaymentMethod::Express);
        self.status = DealStatus::InCustody;
        Ok(())
    }

    /// `PendingPayment` -> `AwaitingValidation` with a stored proof.
    pub fn attach_proof(&mut self, proof: ProofRef) -> Result<(), MarketError> {
        if self.status != DealStatus::PendingPayment {
            return Err(MarketError::AlreadyPaid);
        }
        self.payment_method = Some(PaymentMethod::Transfer);
        self.proof = Some(proof);
        self.status = DealStatus::AwaitingValidation;
        Ok(())
    }

    /// `AwaitingValidation` -> `InCustody` (admin approved the proof).
    pub fn validate_proof(&mut self) -> Result<(), MarketError> {
        if self.status != DealStatus::AwaitingValidation {
            return Err(self.illegal("validate_proof"));
        }
        self.status = DealStatus::InCustody;
        Ok(())
    }

    /// `AwaitingValidation` -> `PendingPayment` (admin rejected the proof).
    ///
    /// The proof reference is cleared to force a fresh upload; the invoice
    /// reference is reused on retry.
    pub fn reject_proof(&mut self) -> Result<(), MarketError> {
        if self.status != DealStatus::AwaitingValidation {
            return Err(self.illegal("reject_proof"));
        }
        self.proof = None;
        self.status = DealStatus::PendingPayment;
        Ok(())
    }

    /// `InCustody` -> `Completed` (producer confirmed delivery).
    pub fn confirm_delivery(&mut self) -> Result<(), MarketError> {
        if self.status != DealStatus::InCustody {
            return Err(self.illegal("confirm_delivery"));
        }
        self.status = DealStatus::Completed;
        Ok(())
    }

    /// `InCustody` -> `RejectedRefunded` (producer declined after custody).
    pub fn reject_delivery(&mut self) -> Result<(), MarketError> {
        if self.status != DealStatus::InCustody {
            return Err(self.illegal("reject_delivery"));
        }
        self.status = DealStatus::RejectedRefunded;
        Ok(())
    }

    /// Terminal states.
    pub fn is_settled(&self) -> bool {
        matches!(
            self.status,
            DealStatus::Completed | DealStatus::RejectedRefunded
        )
    }
}
