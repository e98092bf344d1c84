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

//! Capability interfaces for collaborators outside the core.
//!
//! Notification dispatch, payment-gateway charges and proof-of-payment
//! storage are injected into the engine as trait objects so production
//! adapters and test doubles plug in the same way.

use crate::base::{InvoiceRef, ProofRef, UserId};
use crate::error::MarketError;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

// === Notifications ===

/// Notification severity, mirrored in UI styling downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Danger,
}

/// A user-facing notification emitted at transition boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub user: UserId,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub link: Option<String>,
}

/// Delivery failure reported by a notifier backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("notification delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Fire-and-forget notification dispatch. The engine logs failures and
/// never surfaces them to callers.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), DeliveryError>;
}

/// Records notifications in memory; the default backend for tests and the
/// CLI.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    /// Snapshot of everything delivered so far.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notification: Notification) -> Result<(), DeliveryError> {
        self.sent.lock().push(notification);
        Ok(())
    }
}

// === Payment gateway ===

/// External payment capability. Charges and refunds return plain booleans;
/// a declined charge is an expected outcome, not an error.
pub trait PaymentGateway: Send + Sync {
    /// Attempts an instant charge; `true` means the gateway confirmed it.
    fn charge_instant(&self, amount: Decimal, invoice_ref: &InvoiceRef) -> bool;

    /// Returns funds held for `invoice_ref` to the buyer.
    fn refund(&self, amount: Decimal, invoice_ref: &InvoiceRef) -> bool;
}

/// Approves roughly 98% of charges, mimicking an instant-transfer provider.
/// Not for production use.
#[derive(Debug, Default)]
pub struct SimulatedGateway;

impl PaymentGateway for SimulatedGateway {
    fn charge_instant(&self, _amount: Decimal, _invoice_ref: &InvoiceRef) -> bool {
        rand::thread_rng().gen_bool(0.98)
    }

    fn refund(&self, _amount: Decimal, _invoice_ref: &InvoiceRef) -> bool {
        true
    }
}

/// Gateway double that confirms every charge.
#[derive(Debug, Default)]
pub struct AlwaysApprove;

impl PaymentGateway for AlwaysApprove {
    fn charge_instant(&self, _amount: Decimal, _invoice_ref: &InvoiceRef) -> bool {
        true
    }

    fn refund(&self, _amount: Decimal, _invoice_ref: &InvoiceRef) -> bool {
        true
    }
}

/// Gateway double that declines every charge.
#[derive(Debug, Default)]
pub struct AlwaysDecline;

impl PaymentGateway for AlwaysDecline {
    fn charge_instant(&self, _amount: Decimal, _invoice_ref: &InvoiceRef) -> bool {
        false
    }

    fn refund(&self, _amount: Decimal, _invoice_ref: &InvoiceRef) -> bool {
        false
    }
}

// === Proof storage ===

/// File extensions accepted for proof-of-payment uploads.
pub const ALLOWED_PROOF_EXTENSIONS: [&str; 4] = ["pdf", "png", "jpg", "jpeg"];

/// An uploaded proof-of-payment document, validated before storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl ProofUpload {
    /// Lowercased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

/// External file-storage capability for proof documents.
pub trait ProofStore: Send + Sync {
    /// Stores an upload and returns its reference.
    ///
    /// # Errors
    ///
    /// [`MarketError::ProofTypeRejected`] for disallowed file types.
    fn store(&self, invoice_ref: &InvoiceRef, upload: &ProofUpload)
    -> Result<ProofRef, MarketError>;
}

/// Keeps proof documents in memory under `COMP_<invoice>_<seq>.<ext>` names.
#[derive(Debug, Default)]
pub struct MemoryProofStore {
    files: DashMap<String, Vec<u8>>,
    seq: AtomicU64,
}

impl MemoryProofStore {
    /// Retrieves a stored document by its reference.
    pub fn fetch(&self, proof: &ProofRef) -> Option<Vec<u8>> {
        self.files.get(&proof.0).map(|entry| entry.value().clone())
    }
}

impl ProofStore for MemoryProofStore {
    fn store(
        &self,
        invoice_ref: &InvoiceRef,
        upload: &ProofUpload,
    ) -> Result<ProofRef, MarketError> {
        let extension = upload
            .extension()
            .filter(|ext| ALLOWED_PROOF_EXTENSIONS.contains(&ext.as_str()))
            .ok_or_else(|| MarketError::ProofTypeRejected(upload.filename.clone()))?;

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let name = format!("COMP_{invoice_ref}_{seq}.{extension}");
        self.files.insert(name.clone(), upload.bytes.clone());
        Ok(ProofRef(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn invoice() -> InvoiceRef {
        InvoiceRef("HM-2026-00042".into())
    }

    #[test]
    fn memory_notifier_records_notifications() {
        let notifier = MemoryNotifier::default();
        notifier
            .notify(Notification {
                user: UserId(1),
                title: "Payment confirmed".into(),
                message: "Funds in custody.".into(),
                severity: Severity::Success,
                link: None,
            })
            .unwrap();

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user, UserId(1));
        assert_eq!(sent[0].severity, Severity::Success);
    }

    #[test]
    fn proof_store_accepts_whitelisted_extensions() {
        let store = MemoryProofStore::default();
        for name in ["a.pdf", "b.PNG", "c.jpg", "d.jpeg"] {
            let upload = ProofUpload {
                filename: name.into(),
                bytes: vec![1, 2, 3],
            };
            let proof = store.store(&invoice(), &upload).unwrap();
            assert!(proof.0.starts_with("COMP_HM-2026-00042_"));
            assert_eq!(store.fetch(&proof), Some(vec![1, 2, 3]));
        }
    }

    #[test]
    fn proof_store_rejects_disallowed_types() {
        let store = MemoryProofStore::default();
        for name in ["malware.exe", "notes.txt", "no_extension", "trailing."] {
            let upload = ProofUpload {
                filename: name.into(),
                bytes: vec![],
            };
            let err = store.store(&invoice(), &upload).unwrap_err();
            assert_eq!(err, MarketError::ProofTypeRejected(name.to_string()));
        }
    }

    #[test]
    fn stored_proofs_get_distinct_names() {
        let store = MemoryProofStore::default();
        let upload = ProofUpload {
            filename: "comp.pdf".into(),
            bytes: vec![],
        };
        let first = store.store(&invoice(), &upload).unwrap();
        let second = store.store(&invoice(), &upload).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn always_doubles_behave_as_named() {
        let invoice = invoice();
        assert!(AlwaysApprove.charge_instant(dec!(100), &invoice));
        assert!(!AlwaysDecline.charge_instant(dec!(100), &invoice));
    }
}
