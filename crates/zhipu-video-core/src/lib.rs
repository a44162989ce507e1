#![deny(missing_docs)]
//! Zhipu video core library.
//!
//! Transport-agnostic logic for driving the CogVideoX generation API from a
//! chat bot: settings, the remote client, the pending-image handshake and
//! reply formatting.

/// Configuration management.
pub mod config;
/// Tracking of per-user "send me an image" invitations.
pub mod pending;
/// Chat reply segments and formatting.
pub mod reply;
/// Command logic shared by every transport.
pub mod service;
/// Utility functions.
pub mod utils;
/// Remote video generation API.
pub mod video;

#[cfg(test)]
pub mod testing;
