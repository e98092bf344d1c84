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

//! Buyer demand records.

use crate::base::{InterestId, ProductId, Region, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Interest activity states.
///
/// `Pending` and `Matched` are open for matching and acceptance; `Matched`
/// records that batch matching proposed a listing. `Accepted` means a
/// producer committed to it and a deal exists; `Declined` and `Fulfilled`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestStatus {
    Pending,
    Matched,
    Accepted,
    Declined,
    Fulfilled,
}

/// A buyer's expressed demand for a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interest {
    pub id: InterestId,
    pub buyer: UserId,
    pub product: ProductId,
    /// Desired quantity in canonical kilograms, always positive.
    pub quantity_kg: Decimal,
    /// Optional price ceiling per kilogram.
    pub max_price_per_kg: Option<Decimal>,
    pub target_region: Region,
    pub status: InterestStatus,
    pub created_at: DateTime<Utc>,
}

impl Interest {
    /// Whether the interest is still open for matching and acceptance.
    pub fn is_active(&self) -> bool {
        matches!(self.status, InterestStatus::Pending | InterestStatus::Matched)
    }
}
