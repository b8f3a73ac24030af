use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use messmgr_core::models::{month_calendar, RegisterRequest};
use messmgr_core::utils::{format_amount, format_meals, truncate_string, Month};
use messmgr_core::{ApiError, Config, SessionClient};

use crate::cli::Commands;

/// Width of the name column in member tables
const NAME_WIDTH: usize = 24;

fn prompt(label: &str) -> Result<String> {
    eprint!("{}: ", label);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn prompt_password(label: &str) -> Result<String> {
    rpassword::prompt_password(format!("{}: ", label)).context("Failed to read password")
}

/// Text shown to the user when a command fails.
///
/// A 401 normally means the stored session is gone, except while signing in,
/// where it carries the server's reason (wrong password and the like).
pub fn error_message(err: &anyhow::Error, signs_in: bool) -> String {
    match err.downcast_ref::<ApiError>() {
        Some(api) if api.is_session_ended() && !signs_in => {
            "Your session has ended. Run `messmgr login` to sign in again.".to_string()
        }
        Some(api) => api.server_message().unwrap_or_else(|| api.to_string()),
        None => format!("{:#}", err),
    }
}

pub async fn run(command: Commands, client: &SessionClient, config: &mut Config) -> Result<()> {
    match command {
        Commands::Login { email } => {
            let email = match email.or_else(|| config.last_email.clone()) {
                Some(email) => email,
                None => prompt("Email")?,
            };
            let password = prompt_password("Password")?;
            let user = client.login(&email, &password).await?;
            println!("Signed in as {} <{}>", user.name, user.email);

            config.last_email = Some(email);
            if let Err(e) = config.save() {
                tracing::warn!(error = %e, "Failed to save config");
            }
        }

        Commands::Register => {
            let name = prompt("Name")?;
            let email = prompt("Email")?;
            let password = prompt_password("Password")?;
            if password != prompt_password("Confirm password")? {
                bail!("Passwords do not match");
            }
            let answer = prompt("Recovery answer (optional)")?;
            let recovery = (!answer.is_empty()).then_some(answer);

            let request = RegisterRequest {
                name,
                email: email.clone(),
                password,
                recovery_type: recovery.as_ref().map(|_| "question".to_string()),
                recovery_answer: recovery,
            };
            let user = client.register(&request).await?;
            println!("Welcome, {}!", user.name);

            config.last_email = Some(email);
            if let Err(e) = config.save() {
                tracing::warn!(error = %e, "Failed to save config");
            }
        }

        Commands::Logout => {
            client.logout().await;
            println!("Signed out");
        }

        Commands::Whoami => {
            if !client.has_access_credential() {
                println!("Not signed in");
                return Ok(());
            }
            let user = client.me().await?;
            println!("{} <{}>", user.name, user.email);
            if let Some(ref phone) = user.phone {
                println!("Phone:   {}", phone);
            }
            if let Some(ref photo) = user.photo_url {
                println!("Photo:   {}", client.to_absolute_url(photo));
            }
            println!("Balance: {}", format_amount(user.balance_or_zero()));
        }

        Commands::Meals { month } => {
            let month = month.unwrap_or_else(Month::current);
            let logs = client.my_meals(month).await?;
            println!("Meals for {}", month);
            for (day, log) in month_calendar(month, &logs) {
                let toggle = log.map(|l| l.toggle()).unwrap_or_default();
                println!(
                    "  {}  {}  {}",
                    day.format("%d %a"),
                    if toggle.breakfast { "B" } else { "." },
                    if toggle.dinner { "D" } else { "." },
                );
            }
            let summary = client.my_meal_summary(month).await?;
            println!(
                "Total: {} meals, {} spent",
                format_meals(summary.total_meals),
                format_amount(summary.total_cost)
            );
        }

        Commands::Summary { month } => {
            let month = month.unwrap_or_else(Month::current);
            let summary = client.my_meal_summary(month).await?;
            println!("Month:     {}", month);
            println!("Meals:     {}", format_meals(summary.total_meals));
            println!("Meal cost: {}", format_amount(summary.meal_cost));
            println!("Spent:     {}", format_amount(summary.total_cost));
        }

        Commands::Toggle { date, meals } => {
            let stored = client.upsert_meal(date, meals).await?;
            println!("{}: {}", stored.date, stored.toggle().flags());
        }

        Commands::Users { month } => {
            let month = month.unwrap_or_else(Month::current);
            let users = client.public_users(month).await?;
            println!("{:<width$}  {:>6}  {:>10}  {:>10}", "Member", "Meals", "Spent", "Balance", width = NAME_WIDTH);
            for user in users {
                println!(
                    "{:<width$}  {:>6}  {:>10}  {:>10}",
                    truncate_string(&user.name, NAME_WIDTH),
                    format_meals(user.total_meals),
                    format_amount(user.total_cost),
                    format_amount(user.balance),
                    width = NAME_WIDTH,
                );
            }
        }

        Commands::Origin { url: None } => println!("{}", client.api_origin()),

        Commands::Origin { url: Some(url) } => {
            client.configure_api_origin(&url);
            println!("API origin set to {}", client.api_origin());
        }

        Commands::Url { path } => println!("{}", client.to_absolute_url(&path)),
    }
    Ok(())
}
