//! Core types for `BankID` Gateway.
//!
//! This module provides type-safe wrappers for the authentication domain.

pub mod completion;
pub mod hint;
pub mod id;
pub mod order;
pub mod personal_number;

pub use completion::{CertValidity, CompletionData, Device, VerifiedUser};
pub use hint::HintCode;
pub use id::*;
pub use order::{
    Applied, AuthOrder, CollectReport, OrderRef, OrderStatus, StartTokens, TransitionError,
};
pub use personal_number::{PersonalNumber, PersonalNumberError};
