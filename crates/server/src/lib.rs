//! `BankID` Gateway server library.
//!
//! Electronic-identity sign-in against a `BankID`-style authority: starts
//! orders over mutually authenticated TLS, polls them to a terminal state,
//! and maps verified identities onto local users.
//!
//! The binary in `main.rs` wires these modules into an axum server; the CLI
//! and the integration tests drive the same modules directly.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod bankid;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
