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

//! Marketplace engine orchestrating listings, interests and deals.
//!
//! # Concurrency
//!
//! Listing stock is the only shared mutable resource with a real race
//! hazard: two buyers passing the reservation check against the same stale
//! quantity would over-commit stock. The engine therefore performs the
//! check and the decrement while holding the listing's exclusive [`DashMap`]
//! guard, so reserve-and-commit is serialized per listing.
//!
//! Guards are always taken in the order interests -> listings -> deals;
//! no operation takes them in any other order, which keeps the lock graph
//! acyclic.
//!
//! # Collaborators
//!
//! Notification dispatch, the payment gateway and proof storage are
//! injected as trait objects. Notification failures are logged and
//! swallowed; only the gateway result can block a payment transition.

use crate::base::{DealId, InterestId, InvoiceRef, ListingId, ProductId, Region, UserId};
use crate::deal::{Deal, DealStatus};
use crate::deal_ledger::DealLedger;
use crate::error::MarketError;
use crate::external::{Notification, Notifier, PaymentGateway, ProofStore, ProofUpload, Severity};
use crate::interest::{Interest, InterestStatus};
use crate::listing::{Listing, ListingStatus};
use crate::matching;
use crate::quantity::{self, Unit};
use chrono::{Datelike, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// Marketplace engine.
pub struct Engine {
    listings: DashMap<ListingId, Listing>,
    interests: DashMap<InterestId, Interest>,
    deals: DashMap<DealId, Deal>,
    ledger: DealLedger,
    notifier: Arc<dyn Notifier>,
    gateway: Arc<dyn PaymentGateway>,
    proofs: Arc<dyn ProofStore>,
    next_listing: AtomicU64,
    next_interest: AtomicU64,
    next_deal: AtomicU64,
}

impl Engine {
    /// Creates an engine wired to the given collaborators.
    pub fn new(
        notifier: Arc<dyn Notifier>,
        gateway: Arc<dyn PaymentGateway>,
        proofs: Arc<dyn ProofStore>,
    ) -> Self {
        Self {
            listings: DashMap::new(),
            interests: DashMap::new(),
            deals: DashMap::new(),
            ledger: DealLedger::new(),
            notifier,
            gateway,
            proofs,
            next_listing: AtomicU64::new(0),
            next_interest: AtomicU64::new(0),
            next_deal: AtomicU64::new(0),
        }
    }

    fn send(&self, notification: Notification) {
        // Fire-and-forget; a lost notification never fails the operation.
        if let Err(e) = self.notifier.notify(notification) {
            warn!("notification dropped: {e}");
        }
    }

    // === Listings ===

    /// Publishes a harvest listing. Quantity is validated against the
    /// per-unit minimum and normalized to kilograms.
    pub fn publish_listing(
        &self,
        producer: UserId,
        product: ProductId,
        quantity: Decimal,
        unit: Unit,
        price_per_kg: Option<Decimal>,
        region: Region,
    ) -> Result<ListingId, MarketError> {
        if quantity <= Decimal::ZERO {
            return Err(MarketError::InvalidQuantity);
        }
        if !quantity::meets_minimum(quantity, unit) {
            return Err(MarketError::BelowMinimumQuantity);
        }
        if let Some(price) = price_per_kg
            && price <= Decimal::ZERO
        {
            return Err(MarketError::InvalidPrice);
        }
        let quantity_kg = quantity::to_canonical(quantity, unit)?;

        let id = ListingId(self.next_listing.fetch_add(1, Ordering::Relaxed) + 1);
        self.listings.insert(
            id,
            Listing {
                id,
                producer,
                product,
                quantity_kg,
                price_per_kg,
                region,
                status: ListingStatus::Available,
                published_at: Utc::now(),
            },
        );
        info!(listing = %id, producer = %producer, %quantity_kg, "listing published");
        Ok(id)
    }

    /// Withdraws a listing from the market.
    ///
    /// Only the owning producer may withdraw, and only while no deal
    /// references the listing.
    pub fn withdraw_listing(
        &self,
        producer: UserId,
        listing_id: ListingId,
    ) -> Result<(), MarketError> {
        let mut listing = self
            .listings
            .get_mut(&listing_id)
            .ok_or(MarketError::ListingNotFound)?;
        if listing.producer != producer {
            return Err(MarketError::NotOwner);
        }
        // Scanned while holding the listing's guard: accept_interest
        // inserts its deal under the same guard, so no deal can slip in
        // between this check and the status flip.
        if self.deals.iter().any(|deal| deal.listing == listing_id) {
            return Err(MarketError::ListingInUse);
        }
        listing.status = ListingStatus::Withdrawn;
        info!(listing = %listing_id, "listing withdrawn");
        Ok(())
    }

    // === Interests ===

    /// Records a buyer's interest in a product.
    pub fn create_interest(
        &self,
        buyer: UserId,
        product: ProductId,
        quantity: Decimal,
        unit: Unit,
        max_price_per_kg: Option<Decimal>,
        target_region: Region,
    ) -> Result<InterestId, MarketError> {
        if quantity <= Decimal::ZERO {
            return Err(MarketError::InvalidQuantity);
        }
        if !quantity::meets_minimum(quantity, unit) {
            return Err(MarketError::BelowMinimumQuantity);
        }
        if let Some(ceiling) = max_price_per_kg
            && ceiling <= Decimal::ZERO
        {
            return Err(MarketError::InvalidPrice);
        }
        let quantity_kg = quantity::to_canonical(quantity, unit)?;

        let id = InterestId(self.next_interest.fetch_add(1, Ordering::Relaxed) + 1);
        self.interests.insert(
            id,
            Interest {
                id,
                buyer,
                product,
                quantity_kg,
                max_price_per_kg,
                target_region,
                status: InterestStatus::Pending,
                created_at: Utc::now(),
            },
        );
        info!(interest = %id, buyer = %buyer, %quantity_kg, "interest created");
        Ok(id)
    }

    /// Declines an active interest. Terminal for the interest.
    pub fn decline_interest(&self, interest_id: InterestId) -> Result<(), MarketError> {
        let mut interest = self
            .interests
            .get_mut(&interest_id)
            .ok_or(MarketError::InterestNotFound)?;
        if !interest.is_active() {
            return Err(MarketError::InterestNotPending);
        }
        interest.status = InterestStatus::Declined;
        let buyer = interest.buyer;
        drop(interest);

        self.send(Notification {
            user: buyer,
            title: "Interest declined".into(),
            message: "The producer declined your purchase request.".into(),
            severity: Severity::Info,
            link: None,
        });
        Ok(())
    }

    // === Matching ===

    /// Ranked compatible listings for one interest, cheapest first.
    pub fn find_matches(&self, interest_id: InterestId) -> Result<Vec<Listing>, MarketError> {
        let interest = self
            .interests
            .get(&interest_id)
            .ok_or(MarketError::InterestNotFound)?
            .clone();
        let pool = self.open_listings();
        Ok(matching::rank_candidates(&interest, &pool)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Runs matching over the whole active backlog against the open
    /// supply pool and returns best-match proposals.
    ///
    /// Proposed interests move to `Matched`, which keeps them eligible
    /// for later runs. No stock is held between proposals; callers commit
    /// a proposal via [`Engine::accept_interest`] and re-run.
    pub fn run_matching(&self) -> Vec<(InterestId, ListingId)> {
        let mut backlog: Vec<Interest> = self
            .interests
            .iter()
            .filter(|interest| interest.is_active())
            .map(|interest| interest.clone())
            .collect();
        backlog.sort_by_key(|interest| interest.id);
        let pool = self.open_listings();

        let outcome = matching::run_batch(&backlog, &pool);
        info!(
            matched = outcome.matched.len(),
            unmatched = outcome.unmatched.len(),
            "batch matching finished"
        );
        let proposals: Vec<(InterestId, ListingId)> = outcome
            .matched
            .into_iter()
            .map(|(interest, listing)| (interest.id, listing.id))
            .collect();

        for (interest_id, _) in &proposals {
            if let Some(mut interest) = self.interests.get_mut(interest_id)
                && interest.status == InterestStatus::Pending
            {
                interest.status = InterestStatus::Matched;
            }
        }
        proposals
    }

    // === Deal lifecycle ===

    /// Producer accepts an interest against one of their listings,
    /// creating a deal in `PendingPayment`.
    ///
    /// The reservation check and the stock decrement happen under the
    /// listing's exclusive guard; concurrent accepts against the same
    /// listing serialize here and the loser gets `InsufficientStock`.
    pub fn accept_interest(
        &self,
        producer: UserId,
        interest_id: InterestId,
        listing_id: ListingId,
    ) -> Result<DealId, MarketError> {
        let mut interest = self
            .interests
            .get_mut(&interest_id)
            .ok_or(MarketError::InterestNotFound)?;
        if !interest.is_active() {
            return Err(MarketError::InterestNotPending);
        }

        let mut listing = self
            .listings
            .get_mut(&listing_id)
            .ok_or(MarketError::ListingNotFound)?;
        if listing.producer != producer {
            return Err(MarketError::NotOwner);
        }
        if !listing.is_open() {
            return Err(MarketError::ListingNotOpen);
        }
        if listing.product != interest.product {
            return Err(MarketError::ProductMismatch);
        }
        let price = listing.price_per_kg.ok_or(MarketError::ListingNotPriced)?;

        let quantity_kg = interest.quantity_kg;
        if !matching::can_reserve(listing.quantity_kg, quantity_kg) {
            return Err(MarketError::InsufficientStock);
        }
        let total_price = quantity::total_price(price, quantity_kg)?;

        let deal_id = DealId(self.next_deal.fetch_add(1, Ordering::Relaxed) + 1);
        let invoice_ref = self.issue_invoice_ref(deal_id)?;

        // Commit point: stock, interest status and the new deal change
        // together while both guards are held.
        listing.commit_reservation(quantity_kg);
        interest.status = InterestStatus::Accepted;
        let buyer = interest.buyer;
        let deal = Deal::new(
            deal_id,
            listing_id,
            interest_id,
            buyer,
            quantity_kg,
            total_price,
            invoice_ref.clone(),
        );
        self.deals.insert(deal_id, deal);
        drop(listing);
        drop(interest);

        info!(deal = %deal_id, invoice = %invoice_ref, %total_price, "interest accepted, deal opened");
        self.send(Notification {
            user: buyer,
            title: "Order accepted".into(),
            message: format!(
                "Your order of {quantity_kg} kg was accepted (invoice {invoice_ref}). Please proceed with payment."
            ),
            severity: Severity::Info,
            link: Some(format!("/deals/{deal_id}/pay")),
        });
        Ok(deal_id)
    }

    fn issue_invoice_ref(&self, deal: DealId) -> Result<InvoiceRef, MarketError> {
        let year = Utc::now().year();
        let mut rng = rand::thread_rng();
        // The reference space is small by design; retry on collision.
        for _ in 0..16 {
            let candidate = InvoiceRef::generate(year, &mut rng);
            match self.ledger.register(candidate.clone(), deal) {
                Ok(()) => return Ok(candidate),
                Err(MarketError::DuplicateInvoiceRef) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(MarketError::DuplicateInvoiceRef)
    }

    /// Buyer pays instantly through the gateway: `PendingPayment` ->
    /// `InCustody`.
    ///
    /// The status guard is re-checked against the stored deal after the
    /// gateway call, so a concurrent duplicate attempt fails with
    /// `AlreadyPaid` instead of settling twice, and its already-confirmed
    /// charge is returned through the gateway.
    pub fn pay_instant(&self, buyer: UserId, deal_id: DealId) -> Result<(), MarketError> {
        let (amount, invoice_ref) = {
            let deal = self
                .deals
                .get(&deal_id)
                .ok_or(MarketError::DealNotFound)?;
            if deal.buyer != buyer {
                return Err(MarketError::NotOwner);
            }
            if deal.status != DealStatus::PendingPayment {
                return Err(MarketError::AlreadyPaid);
            }
            (deal.total_price, deal.invoice_ref.clone())
        };

        // Gateway call happens without holding the deal guard.
        if !self.gateway.charge_instant(amount, &invoice_ref) {
            warn!(deal = %deal_id, invoice = %invoice_ref, "gateway declined charge");
            return Err(MarketError::PaymentDeclined);
        }

        // A concurrent attempt may have settled while the charge was in
        // flight; a confirmed charge that loses that race is compensated
        // with a refund so the buyer is never charged twice.
        let settled = match self.deals.get_mut(&deal_id) {
            Some(mut deal) => {
                let recorded = deal.record_instant_payment();
                recorded.map(|()| deal.listing)
            }
            None => Err(MarketError::DealNotFound),
        };
        let listing_id = match settled {
            Ok(listing_id) => listing_id,
            Err(e) => {
                warn!(deal = %deal_id, invoice = %invoice_ref, "duplicate charge detected, refunding");
                if !self.gateway.refund(amount, &invoice_ref) {
                    warn!(deal = %deal_id, invoice = %invoice_ref, "compensating refund failed");
                }
                return Err(e);
            }
        };
        info!(deal = %deal_id, invoice = %invoice_ref, "instant payment confirmed, funds in custody");

        if let Some(producer) = self.listings.get(&listing_id).map(|l| l.producer) {
            self.send(Notification {
                user: producer,
                title: "Payment confirmed".into(),
                message: format!(
                    "The buyer paid instantly (invoice {invoice_ref}). Proceed with delivery."
                ),
                severity: Severity::Success,
                link: None,
            });
        }
        Ok(())
    }

    /// Buyer submits an offline-transfer proof: `PendingPayment` ->
    /// `AwaitingValidation`.
    pub fn submit_transfer_proof(
        &self,
        buyer: UserId,
        deal_id: DealId,
        upload: ProofUpload,
    ) -> Result<(), MarketError> {
        let invoice_ref = {
            let deal = self
                .deals
                .get(&deal_id)
                .ok_or(MarketError::DealNotFound)?;
            if deal.buyer != buyer {
                return Err(MarketError::NotOwner);
            }
            if deal.status != DealStatus::PendingPayment {
                return Err(MarketError::AlreadyPaid);
            }
            deal.invoice_ref.clone()
        };

        // Store first; a rejected file type must leave the deal untouched.
        let proof = self.proofs.store(&invoice_ref, &upload)?;

        let mut deal = self
            .deals
            .get_mut(&deal_id)
            .ok_or(MarketError::DealNotFound)?;
        deal.attach_proof(proof)?;
        drop(deal);

        info!(deal = %deal_id, invoice = %invoice_ref, "transfer proof submitted, awaiting validation");
        Ok(())
    }

    /// Admin approves a submitted proof: `AwaitingValidation` ->
    /// `InCustody`. Both parties are notified.
    pub fn validate_payment(&self, deal_id: DealId) -> Result<(), MarketError> {
        let (buyer, listing_id, invoice_ref) = {
            let mut deal = self
                .deals
                .get_mut(&deal_id)
                .ok_or(MarketError::DealNotFound)?;
            deal.validate_proof()?;
            (deal.buyer, deal.listing, deal.invoice_ref.clone())
        };
        info!(deal = %deal_id, invoice = %invoice_ref, "proof validated, funds in custody");

        if let Some(producer) = self.listings.get(&listing_id).map(|l| l.producer) {
            self.send(Notification {
                user: producer,
                title: "Payment validated".into(),
                message: format!(
                    "Payment for invoice {invoice_ref} was confirmed. Proceed with delivery."
                ),
                severity: Severity::Success,
                link: None,
            });
        }
        self.send(Notification {
            user: buyer,
            title: "Proof approved".into(),
            message: format!("Your proof for invoice {invoice_ref} was validated. Funds are held in custody."),
            severity: Severity::Info,
            link: None,
        });
        Ok(())
    }

    /// Admin rejects a submitted proof: `AwaitingValidation` ->
    /// `PendingPayment`, proof cleared, same invoice reference.
    pub fn reject_payment(&self, deal_id: DealId, reason: &str) -> Result<(), MarketError> {
        let (buyer, invoice_ref) = {
            let mut deal = self
                .deals
                .get_mut(&deal_id)
                .ok_or(MarketError::DealNotFound)?;
            deal.reject_proof()?;
            (deal.buyer, deal.invoice_ref.clone())
        };
        info!(deal = %deal_id, invoice = %invoice_ref, "proof rejected, back to pending payment");

        self.send(Notification {
            user: buyer,
            title: "Payment rejected".into(),
            message: format!("The proof for invoice {invoice_ref} was rejected: {reason}"),
            severity: Severity::Danger,
            link: None,
        });
        Ok(())
    }

    /// Producer confirms delivery: `InCustody` -> `Completed`. The
    /// originating interest becomes `Fulfilled`.
    pub fn confirm_delivery(&self, producer: UserId, deal_id: DealId) -> Result<(), MarketError> {
        self.check_deal_producer(producer, deal_id)?;

        let (buyer, interest_id, quantity_kg, invoice_ref) = {
            let mut deal = self
                .deals
                .get_mut(&deal_id)
                .ok_or(MarketError::DealNotFound)?;
            deal.confirm_delivery()?;
            (
                deal.buyer,
                deal.interest,
                deal.quantity_kg,
                deal.invoice_ref.clone(),
            )
        };
        if let Some(mut interest) = self.interests.get_mut(&interest_id) {
            interest.status = InterestStatus::Fulfilled;
        }
        info!(deal = %deal_id, invoice = %invoice_ref, "delivery confirmed, deal completed");

        self.send(Notification {
            user: buyer,
            title: "Delivery confirmed".into(),
            message: format!("The producer confirmed delivery of {quantity_kg} kg (invoice {invoice_ref})."),
            severity: Severity::Success,
            link: None,
        });
        Ok(())
    }

    /// Producer rejects after custody: `InCustody` -> `RejectedRefunded`.
    /// The committed quantity returns to the listing and the buyer is
    /// refunded through the gateway.
    pub fn reject_delivery(&self, producer: UserId, deal_id: DealId) -> Result<(), MarketError> {
        self.check_deal_producer(producer, deal_id)?;

        let (buyer, listing_id, quantity_kg, amount, invoice_ref) = {
            let mut deal = self
                .deals
                .get_mut(&deal_id)
                .ok_or(MarketError::DealNotFound)?;
            deal.reject_delivery()?;
            (
                deal.buyer,
                deal.listing,
                deal.quantity_kg,
                deal.total_price,
                deal.invoice_ref.clone(),
            )
        };

        if let Some(mut listing) = self.listings.get_mut(&listing_id) {
            listing.restock(quantity_kg);
        }
        // Refund is an external side effect; failure is logged, not raised.
        if !self.gateway.refund(amount, &invoice_ref) {
            warn!(deal = %deal_id, invoice = %invoice_ref, "gateway refund failed");
        }
        info!(deal = %deal_id, invoice = %invoice_ref, "delivery rejected, buyer refunded");

        self.send(Notification {
            user: buyer,
            title: "Sale rejected".into(),
            message: format!("The sale was rejected; {amount} will be returned to you (invoice {invoice_ref})."),
            severity: Severity::Warning,
            link: None,
        });
        Ok(())
    }

    /// Delivery operations are partitioned to the producer owning the
    /// deal's listing.
    fn check_deal_producer(&self, producer: UserId, deal_id: DealId) -> Result<(), MarketError> {
        let listing_id = self
            .deals
            .get(&deal_id)
            .ok_or(MarketError::DealNotFound)?
            .listing;
        let owner = self
            .listings
            .get(&listing_id)
            .ok_or(MarketError::ListingNotFound)?
            .producer;
        if owner != producer {
            return Err(MarketError::NotOwner);
        }
        Ok(())
    }

    // === Snapshots ===

    fn open_listings(&self) -> Vec<Listing> {
        let mut pool: Vec<Listing> = self
            .listings
            .iter()
            .filter(|listing| listing.is_open())
            .map(|listing| listing.clone())
            .collect();
        pool.sort_by_key(|listing| listing.id);
        pool
    }

    /// Snapshot of one listing.
    pub fn get_listing(&self, id: ListingId) -> Option<Listing> {
        self.listings.get(&id).map(|l| l.clone())
    }

    /// Snapshot of one interest.
    pub fn get_interest(&self, id: InterestId) -> Option<Interest> {
        self.interests.get(&id).map(|i| i.clone())
    }

    /// Snapshot of one deal.
    pub fn get_deal(&self, id: DealId) -> Option<Deal> {
        self.deals.get(&id).map(|d| d.clone())
    }

    /// Deal lookup by invoice reference.
    pub fn find_deal_by_invoice(&self, invoice_ref: &InvoiceRef) -> Option<Deal> {
        self.ledger
            .lookup(invoice_ref)
            .and_then(|id| self.get_deal(id))
    }

    /// All listings, ordered by id.
    pub fn listings(&self) -> Vec<Listing> {
        let mut all: Vec<Listing> = self.listings.iter().map(|l| l.clone()).collect();
        all.sort_by_key(|listing| listing.id);
        all
    }

    /// All deals, ordered by id.
    pub fn deals(&self) -> Vec<Deal> {
        let mut all: Vec<Deal> = self.deals.iter().map(|d| d.clone()).collect();
        all.sort_by_key(|deal| deal.id);
        all
    }
}
