// marketplace_payments/src/models.rs
// Payment records, their status lifecycle and the append-only audit log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ═══════════════════════════════════════════════════════════════════════════════
// PAYMENT STATUS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Initialized,
    FailedInit,
    Success,
    Failed,
    Abandoned,
    VerificationFailed,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 7] = [
        PaymentStatus::Pending,
        PaymentStatus::Initialized,
        PaymentStatus::FailedInit,
        PaymentStatus::Success,
        PaymentStatus::Failed,
        PaymentStatus::Abandoned,
        PaymentStatus::VerificationFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Initialized => "initialized",
            PaymentStatus::FailedInit => "failed_init",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Abandoned => "abandoned",
            PaymentStatus::VerificationFailed => "verification_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Success)
    }

    /// Statuses a verify call can produce.
    fn is_verify_outcome(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Success
                | PaymentStatus::Failed
                | PaymentStatus::Abandoned
                | PaymentStatus::VerificationFailed
        )
    }

    /// Whether a record currently in `self` may move to `next`.
    ///
    /// Status only moves forward: `success` is frozen, nothing returns to
    /// `pending`, and once a transaction has been verified it cannot go back
    /// to an initialization status. A same-status update is not a change and
    /// returns `false`.
    pub fn can_advance_to(&self, next: PaymentStatus) -> bool {
        if *self == next {
            return false;
        }
        match self {
            PaymentStatus::Success => false,
            PaymentStatus::Pending => true,
            PaymentStatus::FailedInit => {
                next == PaymentStatus::Initialized || next.is_verify_outcome()
            }
            PaymentStatus::Initialized
            | PaymentStatus::Failed
            | PaymentStatus::Abandoned
            | PaymentStatus::VerificationFailed => next.is_verify_outcome(),
        }
    }

    /// Every status from which `next` is reachable.
    pub fn predecessors_of(next: PaymentStatus) -> Vec<PaymentStatus> {
        PaymentStatus::ALL
            .into_iter()
            .filter(|current| current.can_advance_to(next))
            .collect()
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown payment status '{}'", s))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PAYMENT RECORD
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub status: PaymentStatus,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn now(status: PaymentStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PaymentRecord {
    pub reference: String,
    pub gateway_reference: String,
    pub email: String,
    pub amount_minor_units: i64,
    pub status: PaymentStatus,
    pub transaction_log: Vec<LogEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// A fresh `pending` record carrying its creation entry.
    pub fn new_pending(
        reference: String,
        gateway_reference: &str,
        email: &str,
        amount_minor_units: i64,
    ) -> Self {
        let entry = LogEntry::now(PaymentStatus::Pending, "payment record created");
        Self {
            reference,
            gateway_reference: gateway_reference.to_string(),
            email: email.to_string(),
            amount_minor_units,
            status: PaymentStatus::Pending,
            created_at: entry.timestamp,
            updated_at: entry.timestamp,
            transaction_log: vec![entry],
        }
    }
}

/// Outcome of a guarded status update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusUpdate {
    Applied { previous: PaymentStatus },
    Unchanged,
    Rejected { current: PaymentStatus },
}

impl StatusUpdate {
    pub fn is_applied(&self) -> bool {
        matches!(self, StatusUpdate::Applied { .. })
    }
}
