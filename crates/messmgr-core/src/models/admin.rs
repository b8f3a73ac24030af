use serde::{Deserialize, Serialize};

use super::Id;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminSettings {
    #[serde(rename = "mealCost")]
    pub meal_cost: f64,
    #[serde(rename = "countingRule")]
    pub counting_rule: String,
}

/// One member's month as the admin console shows it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdminRow {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "totalMeals", default)]
    pub total_meals: f64,
    #[serde(rename = "mealCost", default)]
    pub meal_cost: f64,
    #[serde(rename = "totalCost", default)]
    pub total_cost: f64,
    #[serde(default)]
    pub balance: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminOverview {
    #[serde(default)]
    pub users: Vec<AdminRow>,
    pub settings: AdminSettings,
}

impl AdminOverview {
    /// Sum of every member's spend for the month.
    pub fn total_cost(&self) -> f64 {
        self.users.iter().map(|u| u.total_cost).sum()
    }
}
