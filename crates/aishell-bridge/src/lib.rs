// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Host bridge for AI Shell.
//!
//! The host application (editor, result grid, tab strip) is reached through
//! named requests correlated by id. Every request is bounded by a timeout.

pub mod host;
pub mod transport;

pub use host::BridgeHost;
pub use transport::{BridgeRequest, BridgeResponse, RequestTransport};
