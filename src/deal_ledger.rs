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

//! Thread-safe deal registry with invoice-reference deduplication.
//!
//! Invoice references are short and human-readable, so collisions are
//! possible; registration must be atomic so two deals can never share a
//! reference even when created concurrently.

use crate::base::{DealId, InvoiceRef};
use crate::error::MarketError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Registry of issued invoice references, a [`DashMap`] giving O(1) atomic
/// duplicate detection. Safe for concurrent access.
#[derive(Debug)]
pub struct DealLedger {
    /// Invoice references mapped to their deal for duplicate detection.
    by_invoice: DashMap<InvoiceRef, DealId>,
}

impl DealLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self {
            by_invoice: DashMap::new(),
        }
    }

    /// Registers a deal under `invoice_ref`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::DuplicateInvoiceRef`] when the reference is
    /// already taken; the caller draws a fresh one and retries.
    pub fn register(&self, invoice_ref: InvoiceRef, deal: DealId) -> Result<(), MarketError> {
        // Entry API gives an atomic check-and-insert.
        match self.by_invoice.entry(invoice_ref) {
            Entry::Occupied(_) => Err(MarketError::DuplicateInvoiceRef),
            Entry::Vacant(entry) => {
                entry.insert(deal);
                Ok(())
            }
        }
    }

    /// Looks up the deal registered under `invoice_ref`.
    pub fn lookup(&self, invoice_ref: &InvoiceRef) -> Option<DealId> {
        self.by_invoice.get(invoice_ref).map(|entry| *entry.value())
    }

    /// Number of registered deals.
    pub fn len(&self) -> usize {
        self.by_invoice.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_invoice.is_empty()
    }
}

impl Default for DealLedger {
    fn default() -> Self {
        Self::new()
    }
}
