//! Candidate-side companions to the session endpoints.

pub mod api;
pub mod countdown;
pub mod monitor;
pub mod resume;
