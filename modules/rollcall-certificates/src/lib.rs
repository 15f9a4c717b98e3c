//! Certificate eligibility gate.
//!
//! Pull-based: the external certificate renderer asks, this crate combines
//! event status, registration validity, and the attendance outcome into a
//! single decision with a structured reason. Normal ineligibility is a
//! value, never an error.

pub mod eligibility;

pub use eligibility::{Eligibility, EligibilityGate, IneligibilityReason};
