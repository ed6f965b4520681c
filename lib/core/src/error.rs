//! Error handling foundation for gatehouse.
//!
//! Only the `Result` alias lives here. Each crate owns its domain error
//! enums and reports them through rootcause so callers can attach context
//! as failures travel up toward the HTTP layer.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
