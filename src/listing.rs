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

//! Harvest listings published by producers.

use crate::base::{ListingId, ProductId, Region, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Listing lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    /// Open for matching and acceptance.
    Available,
    /// Reserved while a negotiation is in flight.
    InNegotiation,
    /// Quantity reached zero.
    SoldOut,
    /// Taken down by its producer.
    Withdrawn,
}

/// A producer's published quantity of a product for sale.
///
/// `quantity_kg` is canonical (kilograms) and never negative; it is only
/// mutated inside the engine's atomic reserve-and-commit step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub producer: UserId,
    pub product: ProductId,
    pub quantity_kg: Decimal,
    /// `None` means not yet priced; price is negotiated later.
    pub price_per_kg: Option<Decimal>,
    pub region: Region,
    pub status: ListingStatus,
    pub published_at: DateTime<Utc>,
}

impl Listing {
    /// Whether the listing is open for matching.
    pub fn is_open(&self) -> bool {
        self.status == ListingStatus::Available
    }

    /// Decrements stock after a reservation check passed under the same
    /// exclusive guard. Flips to `SoldOut` when stock reaches zero.
    pub(crate) fn commit_reservation(&mut self, quantity_kg: Decimal) {
        self.quantity_kg -= quantity_kg;
        debug_assert!(
            self.quantity_kg >= Decimal::ZERO,
            "listing {} stock went negative: {}",
            self.id,
            self.quantity_kg
        );
        if self.quantity_kg <= Decimal::ZERO {
            self.status = ListingStatus::SoldOut;
        }
    }

    /// Returns committed stock after a refunded deal.
    pub(crate) fn restock(&mut self, quantity_kg: Decimal) {
        self.quantity_kg += quantity_kg;
        if self.status == ListingStatus::SoldOut && self.quantity_kg > Decimal::ZERO {
            self.status = ListingStatus::Available;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn listing(quantity_kg: Decimal) -> Listing {
        Listing {
            id: ListingId(1),
            producer: UserId(1),
            product: ProductId(1),
            quantity_kg,
            price_per_kg: Some(dec!(50)),
            region: Region::province("Luanda"),
            status: ListingStatus::Available,
            published_at: Utc::now(),
        }
    }

    #[test]
    fn commit_decrements_stock() {
        let mut l = listing(dec!(100));
        l.commit_reservation(dec!(80));
        assert_eq!(l.quantity_kg, dec!(20));
        assert_eq!(l.status, ListingStatus::Available);
    }

    #[test]
    fn commit_to_zero_flips_sold_out() {
        let mut l = listing(dec!(50));
        l.commit_reservation(dec!(50));
        assert_eq!(l.quantity_kg, Decimal::ZERO);
        assert_eq!(l.status, ListingStatus::SoldOut);
    }

    #[test]
    fn restock_reopens_sold_out_listing() {
        let mut l = listing(dec!(30));
        l.commit_reservation(dec!(30));
        assert_eq!(l.status, ListingStatus::SoldOut);

        l.restock(dec!(30));
        assert_eq!(l.quantity_kg, dec!(30));
        assert_eq!(l.status, ListingStatus::Available);
    }

    #[test]
    fn withdrawn_listing_is_not_open() {
        let mut l = listing(dec!(10));
        l.status = ListingStatus::Withdrawn;
        assert!(!l.is_open());
    }
}
