// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credits gating and usage accounting for AI Shell.

pub mod credits;
pub mod ledger;

pub use credits::{CreditsGate, CreditsVerdict};
pub use ledger::{UsageLedger, UsageTotals};
