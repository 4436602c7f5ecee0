//! Utility functions for terminal output.

pub mod format;

pub use format::{format_amount, format_date, format_optional, mask_email, truncate_string};
