//! Data models for Mess Manager entities.
//!
//! - `User`, `LoginResponse`, `RefreshResponse`: accounts and session payloads
//! - `MealLog`, `MealToggle`, `MealSummary`: per-day meal logging
//! - `PublicUser`, `PublicUserDetail`, `PriceHistory`: the community views
//! - `AdminOverview`, `AdminSettings`: the admin console

pub mod admin;
pub mod meal;
pub mod user;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use admin::{AdminOverview, AdminRow, AdminSettings};
pub use meal::{month_calendar, MealLog, MealSummary, MealToggle, PriceHistory, PublicUser, PublicUserDetail, PublicUsersResponse};
pub use user::{
    LoginRequest, LoginResponse, ProfileUpdate, RecoveryPrompt, RefreshResponse, RegisterRequest,
    ResetPasswordRequest, User,
};

/// Record identifier. The backend sends numbers or strings depending on the table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Number(i64),
    Text(String),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Number(n) => write!(f, "{}", n),
            Id::Text(s) => f.write_str(s),
        }
    }
}
