//! Failure handlers
//!
//! Exactly one handler is configured per chain. It runs when no backend
//! recognised the request and decides what the client sees.

pub mod basic;
pub mod redirect;
pub mod status;

pub use basic::ChallengeResponse;
pub use redirect::Redirect;
pub use status::StatusOnly;
