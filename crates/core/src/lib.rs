//! Core types shared across the voice agent crates
//!
//! This crate provides foundational types used everywhere else:
//! - Call phase state machine definitions
//! - Appliance categories and normalization
//! - Spoken response and fallback categories

pub mod appliance;
pub mod phase;
pub mod response;

pub use appliance::ApplianceCategory;
pub use phase::CallPhase;
pub use response::{FallbackCategory, SpokenResponse};
