use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Id, User};
use crate::utils::Month;

/// One day of meals for the signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealLog {
    pub date: NaiveDate,
    #[serde(default)]
    pub breakfast: bool,
    #[serde(default)]
    pub dinner: bool,
}

impl MealLog {
    pub fn toggle(&self) -> MealToggle {
        MealToggle {
            breakfast: self.breakfast,
            dinner: self.dinner,
        }
    }
}

/// Every day of `month` paired with its log, if the user has one.
pub fn month_calendar(month: Month, logs: &[MealLog]) -> Vec<(NaiveDate, Option<&MealLog>)> {
    month
        .days()
        .into_iter()
        .map(|day| (day, logs.iter().find(|log| log.date == day)))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealToggle {
    pub breakfast: bool,
    pub dinner: bool,
}

impl MealToggle {
    /// Parse the shorthand used on the command line: `b`, `d`, `bd`, `none`.
    pub fn from_flags(flags: &str) -> Option<Self> {
        let flags = flags.trim().to_ascii_lowercase();
        if flags == "none" || flags == "-" {
            return Some(Self::default());
        }
        if flags.is_empty() || !flags.chars().all(|c| c == 'b' || c == 'd') {
            return None;
        }
        Some(Self {
            breakfast: flags.contains('b'),
            dinner: flags.contains('d'),
        })
    }

    pub fn flags(&self) -> &'static str {
        match (self.breakfast, self.dinner) {
            (true, true) => "bd",
            (true, false) => "b",
            (false, true) => "d",
            (false, false) => "none",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct MealUpsert {
    pub date: NaiveDate,
    pub breakfast: bool,
    pub dinner: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MealSummary {
    #[serde(default)]
    pub month: String,
    #[serde(rename = "totalMeals", default)]
    pub total_meals: f64,
    #[serde(rename = "mealCost", default)]
    pub meal_cost: f64,
    #[serde(rename = "totalCost", default)]
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "photoUrl", default)]
    pub photo_url: Option<String>,
    #[serde(rename = "totalMeals", default)]
    pub total_meals: f64,
    #[serde(rename = "totalCost", default)]
    pub total_cost: f64,
    #[serde(default)]
    pub balance: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublicUsersResponse {
    #[serde(default)]
    pub users: Vec<PublicUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublicUserDetail {
    pub user: User,
    #[serde(rename = "totalMeals", default)]
    pub total_meals: f64,
    #[serde(rename = "totalCost", default)]
    pub total_cost: f64,
    #[serde(default)]
    pub logs: Vec<MealLog>,
}

/// Daily meal price for a month, as parallel label/value series.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PriceHistory {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub values: Vec<f64>,
}

impl PriceHistory {
    pub fn points(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}
