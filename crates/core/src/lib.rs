//! `BankID` Gateway Core - Shared types library.
//!
//! This crate provides the types shared by all `BankID` Gateway components:
//! - `server` - JSON API, remote authority client, and identity resolution
//! - `cli` - Command-line tools for migrations and terminal logins
//!
//! # Architecture
//!
//! The core crate contains only types and pure state transitions - no I/O, no
//! database access, no HTTP clients. The order state machine lives here so it
//! can be tested without a network or a runtime.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, personal numbers, hint codes, completion data,
//!   and the [`AuthOrder`] state machine

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
