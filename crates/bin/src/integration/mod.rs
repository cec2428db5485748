//! Wiring between the command line and the library crates.
//!
//! Settings decide where the filing cache lives and where the issuer
//! directory comes from; these helpers open both.

pub(crate) mod cache_manager;
pub(crate) mod code_list;
