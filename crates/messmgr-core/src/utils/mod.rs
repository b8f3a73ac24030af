//! Calendar and display helpers.

pub mod format;
pub mod month;

pub use format::{format_amount, format_meals, truncate_string};
pub use month::{Month, MonthParseError};
