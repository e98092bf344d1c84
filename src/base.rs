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

//! Core identifier and value types shared across the marketplace engine.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident($inner:ty)) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type! {
    /// Unique identifier for a marketplace user (producer, buyer or admin).
    UserId(u32)
}

id_type! {
    /// Unique identifier for a catalogue product.
    ProductId(u32)
}

id_type! {
    /// Unique identifier for a published harvest listing.
    ListingId(u64)
}

id_type! {
    /// Unique identifier for a buyer's expressed interest.
    InterestId(u64)
}

id_type! {
    /// Unique identifier for a deal (an accepted interest in progress).
    DealId(u64)
}

/// Two-level geographic location.
///
/// Matching compares provinces only; the municipality is carried for display
/// and delivery planning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub province: String,
    pub municipality: Option<String>,
}

impl Region {
    /// Region known only down to the province level.
    pub fn province(name: impl Into<String>) -> Self {
        Self {
            province: name.into(),
            municipality: None,
        }
    }

    /// Geographic compatibility on the matching key (province equality).
    pub fn matches(&self, other: &Region) -> bool {
        self.province == other.province
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.municipality {
            Some(municipality) => write!(f, "{}, {}", municipality, self.province),
            None => write!(f, "{}", self.province),
        }
    }
}

/// Human-readable unique invoice reference, e.g. `HM-2026-48213`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceRef(pub String);

impl InvoiceRef {
    pub const PREFIX: &'static str = "HM";

    /// Draws a candidate reference. Uniqueness is enforced by the deal
    /// ledger, not here; callers retry on collision.
    pub fn generate(year: i32, rng: &mut impl Rng) -> Self {
        let digits: u32 = rng.gen_range(0..100_000);
        Self(format!("{}-{}-{:05}", Self::PREFIX, year, digits))
    }
}

impl fmt::Display for InvoiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage handle for an uploaded proof-of-payment document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProofRef(pub String);

impl fmt::Display for ProofRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
