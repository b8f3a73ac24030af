use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use messmgr_core::models::MealToggle;
use messmgr_core::utils::Month;

#[derive(Parser, Debug)]
#[command(name = "messmgr")]
#[command(about = "Mess Manager from the terminal - meals, balances and the month's numbers")]
#[command(version)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Sign in (password is prompted)
    Login {
        /// Defaults to the last email used
        email: Option<String>,
    },

    /// Create an account and sign in
    Register,

    /// Sign out and forget stored credentials
    Logout,

    /// Show the signed-in member and balance
    #[command(alias = "me")]
    Whoami,

    /// Show your meal calendar for a month
    Meals {
        /// Defaults to the current month
        #[arg(value_name = "YYYY-MM", value_parser = parse_month)]
        month: Option<Month>,
    },

    /// Show your meal totals for a month
    Summary {
        #[arg(value_name = "YYYY-MM", value_parser = parse_month)]
        month: Option<Month>,
    },

    /// Set breakfast/dinner for a day
    Toggle {
        #[arg(value_name = "YYYY-MM-DD", value_parser = parse_date)]
        date: NaiveDate,
        /// b, d, bd or none
        #[arg(value_name = "MEALS", value_parser = parse_meals)]
        meals: MealToggle,
    },

    /// Show every member's month
    Users {
        #[arg(value_name = "YYYY-MM", value_parser = parse_month)]
        month: Option<Month>,
    },

    /// Show or change the API origin
    Origin { url: Option<String> },

    /// Resolve a server path to a full URL
    Url { path: String },
}

impl Commands {
    /// Commands whose 401 means "wrong credentials", not "session over".
    pub fn signs_in(&self) -> bool {
        matches!(self, Commands::Login { .. } | Commands::Register)
    }
}

fn parse_month(raw: &str) -> Result<Month, String> {
    raw.parse::<Month>().map_err(|e| e.to_string())
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date '{}': expected YYYY-MM-DD", raw))
}

fn parse_meals(raw: &str) -> Result<MealToggle, String> {
    MealToggle::from_flags(raw)
        .ok_or_else(|| format!("Invalid meal flags '{}': use b, d, bd or none", raw))
}
