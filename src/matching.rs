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

//! Compatibility checks between listings and interests, candidate ranking,
//! the stock reservation guard, and batch matching.
//!
//! These are pure decision functions. The reservation guard in particular
//! only supplies the predicate; the engine pairs it with the stock decrement
//! under the listing's exclusive guard so check-and-decrement commits as one
//! serialized step.

use crate::error::MarketError;
use crate::interest::Interest;
use crate::listing::{Listing, ListingStatus};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Allowed shortfall fraction between demanded and available quantity.
pub const DEFAULT_TOLERANCE: Decimal = dec!(0.10);

/// Decides whether `listing` can satisfy `interest`.
///
/// Evaluates an ordered set of independent predicates, short-circuiting on
/// the first failure: product identity, province, listing availability,
/// interest activity, quantity within `tolerance`, and price ceiling (the
/// price predicate passes when either side is unset).
///
/// # Errors
///
/// [`MarketError::Matching`] when the inputs are malformed: a non-positive
/// desired quantity or a tolerance outside `[0, 1)`.
pub fn is_compatible(
    listing: &Listing,
    interest: &Interest,
    tolerance: Decimal,
) -> Result<bool, MarketError> {
    if !(Decimal::ZERO..Decimal::ONE).contains(&tolerance) {
        return Err(MarketError::Matching {
            context: "matching",
            reason: format!("tolerance out of range [0, 1): {tolerance}"),
        });
    }
    if interest.quantity_kg <= Decimal::ZERO {
        return Err(MarketError::Matching {
            context: "matching",
            reason: format!("interest quantity must be positive: {}", interest.quantity_kg),
        });
    }

    if listing.product != interest.product {
        return Ok(false);
    }
    if !listing.region.matches(&interest.target_region) {
        return Ok(false);
    }
    if listing.status != ListingStatus::Available {
        return Ok(false);
    }
    if !interest.is_active() {
        return Ok(false);
    }

    let quantity_floor = interest.quantity_kg * (Decimal::ONE - tolerance);
    if listing.quantity_kg < quantity_floor {
        return Ok(false);
    }

    if let (Some(price), Some(ceiling)) = (listing.price_per_kg, interest.max_price_per_kg)
        && price > ceiling
    {
        return Ok(false);
    }

    Ok(true)
}

/// Filters `listings` down to those compatible with `interest` and orders
/// them ascending by unit price, unpriced listings last.
///
/// Candidates that fail compatibility evaluation with an error are skipped
/// rather than aborting the whole ranking. The sort is stable, so
/// equal-price candidates keep their input order.
pub fn rank_candidates<'a>(interest: &Interest, listings: &'a [Listing]) -> Vec<&'a Listing> {
    let mut matches: Vec<&Listing> = listings
        .iter()
        .filter(|listing| is_compatible(listing, interest, DEFAULT_TOLERANCE).unwrap_or(false))
        .collect();

    // Unpriced listings sort as +infinity for ordering purposes only.
    matches.sort_by_key(|listing| listing.price_per_kg.unwrap_or(Decimal::MAX));
    matches
}

/// The cheapest compatible listing for `interest`, if any.
pub fn best_match<'a>(interest: &Interest, listings: &'a [Listing]) -> Option<&'a Listing> {
    rank_candidates(interest, listings).into_iter().next()
}

/// Stock reservation guard.
///
/// Returns `true` iff `requested_kg` can be taken from `available_kg`.
/// Zero or negative requests and exhausted stock are normal negative
/// outcomes, not errors.
pub fn can_reserve(available_kg: Decimal, requested_kg: Decimal) -> bool {
    if requested_kg <= Decimal::ZERO {
        return false;
    }
    if available_kg <= Decimal::ZERO {
        return false;
    }
    available_kg >= requested_kg
}

/// Result of a batch matching run.
#[derive(Debug, Default)]
pub struct BatchOutcome<'a> {
    /// Interests paired with their best-price compatible listing.
    pub matched: Vec<(&'a Interest, &'a Listing)>,
    /// Interests with no compatible listing.
    pub unmatched: Vec<&'a Interest>,
}

/// Greedy best-match per interest across the whole backlog, input order
/// preserved. Per-interest failures count as unmatched so one bad record
/// never aborts the batch. Inputs are not mutated, and matched stock is not
/// held between interests of the same batch; callers re-run after
/// committing accepted matches.
pub fn run_batch<'a>(interests: &'a [Interest], listings: &'a [Listing]) -> BatchOutcome<'a> {
    let mut outcome = BatchOutcome::default();

    for interest in interests {
        match best_match(interest, listings) {
            Some(listing) => outcome.matched.push((interest, listing)),
            None => outcome.unmatched.push(interest),
        }
    }

    outcome
}
