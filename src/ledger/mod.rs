//! # Equipment ledger
//!
//! Balance reconciliation and alerting. Every recorded movement adjusts the
//! balance of its (customer, equipment type) pair and, when the balance is
//! out of range, opens or refreshes that pair's alert. All three writes share
//! one transaction.
//!
//! The pure classification rules live here; the database work is split
//! between [`reconciler`], [`alerts`] and [`rebuild`].

pub mod alerts;
pub mod rebuild;
pub mod reconciler;

use crate::config::AppConfig;
use crate::models::alert::AlertPriority;
use crate::models::customer_balance::BalanceStatus;

pub use alerts::AlertManager;
pub use rebuild::{RebuildReport, rebuild_balances};
pub use reconciler::{BalanceReconciler, NewMovement, RecordedMovement};

/// Tunables that decide starting thresholds and alert priority.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertPolicy {
    /// Threshold for balances with no applicable equipment specification
    pub default_threshold: i32,
    pub high_priority_multiplier: f64,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            default_threshold: 20,
            high_priority_multiplier: 1.5,
        }
    }
}

impl From<&AppConfig> for AlertPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            default_threshold: config.default_threshold,
            high_priority_multiplier: config.high_priority_multiplier,
        }
    }
}

impl AlertPolicy {
    /// High when the balance is beyond `threshold * multiplier`, medium otherwise.
    pub fn priority(&self, current_balance: i32, threshold: i32) -> AlertPriority {
        if f64::from(current_balance) > f64::from(threshold) * self.high_priority_multiplier {
            AlertPriority::High
        } else {
            AlertPriority::Medium
        }
    }
}

/// Status as a pure function of balance and threshold. Over-threshold wins
/// over negative so a negative threshold can never mask an overage.
pub fn classify(current_balance: i32, threshold: i32) -> BalanceStatus {
    if current_balance > threshold {
        BalanceStatus::OverThreshold
    } else if current_balance < 0 {
        BalanceStatus::Negative
    } else {
        BalanceStatus::Normal
    }
}

/// Quantity above threshold; zero for balances at or below it.
pub fn excess(current_balance: i32, threshold: i32) -> i32 {
    current_balance.saturating_sub(threshold).max(0)
}
