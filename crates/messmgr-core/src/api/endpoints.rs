//! Typed wrappers over the Mess Manager routes.

use chrono::NaiveDate;
use reqwest::Method;
use tracing::{debug, info};

use crate::config::CredentialTransport;
use crate::models::meal::MealUpsert;
use crate::models::{
    AdminOverview, AdminSettings, Id, LoginRequest, LoginResponse, MealLog, MealSummary,
    MealToggle, PriceHistory, ProfileUpdate, PublicUser, PublicUserDetail, PublicUsersResponse,
    RecoveryPrompt, RegisterRequest, ResetPasswordRequest, User,
};
use crate::utils::Month;

use super::client::{encode, RequestOptions, SessionClient};
use super::ApiError;

fn month_query(month: Month) -> RequestOptions {
    RequestOptions::new().query("month", month)
}

impl SessionClient {
    // ===== Auth =====

    /// Sign in and install the credentials the server issues.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let response: LoginResponse = self
            .send_json(Method::POST, "/auth/login", &LoginRequest { email, password })
            .await?;

        if response.access_token.is_none()
            && self.mode().transport == CredentialTransport::BearerHeader
        {
            return Err(ApiError::InvalidResponse(
                "login response carried no access token".into(),
            ));
        }
        self.set_access_credential(response.access_token.as_deref());
        // A renewal credential from an earlier session must not outlive this login.
        self.set_renewal_credential(response.refresh_token.as_deref());

        info!(renewable = response.refresh_token.is_some(), "Signed in");
        Ok(response.user)
    }

    /// Create an account, then sign in with it.
    pub async fn register(&self, request: &RegisterRequest) -> Result<User, ApiError> {
        let body = encode(request)?;
        self.request(Method::POST, "/auth/register", Some(body), RequestOptions::default())
            .await?;
        self.login(&request.email, &request.password).await
    }

    /// Tell the server the session is over. Local credentials are cleared
    /// whether or not the server call succeeds.
    pub async fn logout(&self) {
        if let Err(e) = self
            .request(Method::POST, "/auth/logout", None, RequestOptions::default())
            .await
        {
            debug!(error = %e, "Logout call failed, clearing local session anyway");
        }
        self.clear_credentials();
        info!("Signed out");
    }

    pub async fn recovery_question(&self, email: &str) -> Result<RecoveryPrompt, ApiError> {
        self.send_json(
            Method::POST,
            "/auth/recovery-question",
            &serde_json::json!({ "email": email }),
        )
        .await
    }

    pub async fn reset_password(
        &self,
        email: &str,
        answer: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        let body = encode(&ResetPasswordRequest {
            email,
            answer,
            new_password,
        })?;
        self.request(
            Method::POST,
            "/auth/reset-password",
            Some(body),
            RequestOptions::default(),
        )
        .await?;
        Ok(())
    }

    // ===== Profile =====

    pub async fn me(&self) -> Result<User, ApiError> {
        self.get_json("/users/me", RequestOptions::default()).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        self.send_json(Method::PATCH, "/users/me", update).await
    }

    // ===== Meals =====

    pub async fn my_meals(&self, month: Month) -> Result<Vec<MealLog>, ApiError> {
        self.get_json("/meals/mine", month_query(month)).await
    }

    /// Set breakfast/dinner for one day. Returns the stored log.
    pub async fn upsert_meal(&self, date: NaiveDate, toggle: MealToggle) -> Result<MealLog, ApiError> {
        let body = MealUpsert {
            date,
            breakfast: toggle.breakfast,
            dinner: toggle.dinner,
        };
        self.send_json(Method::POST, "/meals/mine", &body).await
    }

    pub async fn my_meal_summary(&self, month: Month) -> Result<MealSummary, ApiError> {
        self.get_json("/meals/summary/mine", month_query(month)).await
    }

    // ===== Community =====

    pub async fn public_users(&self, month: Month) -> Result<Vec<PublicUser>, ApiError> {
        let response: PublicUsersResponse =
            self.get_json("/public/users", month_query(month)).await?;
        Ok(response.users)
    }

    pub async fn public_user(&self, id: &Id, month: Month) -> Result<PublicUserDetail, ApiError> {
        self.get_json(&format!("/public/users/{}", id), month_query(month))
            .await
    }

    pub async fn meal_price_history(&self, month: Month) -> Result<PriceHistory, ApiError> {
        self.get_json("/public/meal-price-history", month_query(month))
            .await
    }

    // ===== Admin =====

    pub async fn admin_overview(&self, month: Month) -> Result<AdminOverview, ApiError> {
        self.get_json("/admin/overview", month_query(month)).await
    }

    pub async fn update_admin_settings(&self, settings: &AdminSettings) -> Result<(), ApiError> {
        let body = encode(settings)?;
        self.request(
            Method::PATCH,
            "/admin/settings",
            Some(body),
            RequestOptions::default(),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::testing::{reply, ScriptedTransport};
    use crate::auth::MemoryStore;
    use crate::config::{RenewalPolicy, SessionMode};

    const USER: &str = r#"{"id":1,"name":"Rahim","email":"rahim@example.com","balance":250}"#;

    fn client(transport: Arc<ScriptedTransport>) -> SessionClient {
        SessionClient::with_transport(
            transport,
            Arc::new(MemoryStore::new()),
            SessionMode::default(),
            "https://host".into(),
        )
    }

    #[tokio::test]
    async fn test_login_installs_credentials() {
        let transport = ScriptedTransport::new(|request| {
            assert_eq!(request.url, "https://host/api/auth/login");
            let body = request.body.clone().unwrap();
            assert_eq!(body["email"], "rahim@example.com");
            assert_eq!(body["password"], "secret");
            reply(
                200,
                &format!(r#"{{"user":{},"accessToken":"at","refreshToken":"rt"}}"#, USER),
            )
        });
        let client = client(transport);

        let user = client.login("rahim@example.com", "secret").await.unwrap();
        assert_eq!(user.name, "Rahim");
        assert_eq!(client.persisted_access_credential().as_deref(), Some("at"));
        assert_eq!(client.persisted_renewal_credential().as_deref(), Some("rt"));
    }

    #[tokio::test]
    async fn test_login_without_renewal_drops_stale_one() {
        let transport = ScriptedTransport::new(|_| {
            reply(200, &format!(r#"{{"user":{},"accessToken":"at"}}"#, USER))
        });
        let client = client(transport);
        client.set_renewal_credential(Some("old-rt"));

        client.login("rahim@example.com", "secret").await.unwrap();
        assert_eq!(client.persisted_renewal_credential(), None);
    }

    #[tokio::test]
    async fn test_login_requires_token_for_bearer_transport() {
        let transport = ScriptedTransport::new(|_| reply(200, &format!(r#"{{"user":{}}}"#, USER)));
        let client = client(transport);
        let err = client.login("rahim@example.com", "secret").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
        assert!(!client.has_access_credential());
    }

    #[tokio::test]
    async fn test_bad_password_surfaces_401() {
        let transport = ScriptedTransport::new(|_| reply(401, r#"{"error":"Invalid credentials"}"#));
        let client = client(transport.clone());
        let err = client.login("rahim@example.com", "wrong").await.unwrap_err();
        assert_eq!(err.server_message().as_deref(), Some("Invalid credentials"));
        assert_eq!(transport.count("/auth/refresh"), 0);
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let transport = ScriptedTransport::new(|request| {
            if request.url.ends_with("/auth/register") {
                let body = request.body.clone().unwrap();
                assert_eq!(body["recoveryType"], "question");
                reply(201, "{}")
            } else {
                reply(200, &format!(r#"{{"user":{},"accessToken":"at"}}"#, USER))
            }
        });
        let client = client(transport.clone());
        let request = RegisterRequest {
            name: "Rahim".into(),
            email: "rahim@example.com".into(),
            password: "secret".into(),
            recovery_type: Some("question".into()),
            recovery_answer: Some("Dhaka".into()),
        };

        let user = client.register(&request).await.unwrap();
        assert_eq!(user.email, "rahim@example.com");
        assert_eq!(transport.count("/auth/register"), 1);
        assert_eq!(transport.count("/auth/login"), 1);
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_server_fails() {
        let transport = ScriptedTransport::new(|_| reply(503, "maintenance"));
        let client = client(transport.clone());
        client.set_access_credential(Some("at"));
        client.set_renewal_credential(Some("rt"));

        client.logout().await;
        assert_eq!(transport.count("/auth/logout"), 1);
        assert_eq!(client.persisted_access_credential(), None);
        assert_eq!(client.persisted_renewal_credential(), None);
    }

    #[tokio::test]
    async fn test_meal_routes_send_month_and_body() {
        let transport = ScriptedTransport::new(|request| {
            if request.method == Method::POST {
                let body = request.body.clone().unwrap();
                assert_eq!(body["date"], "2024-05-03");
                assert_eq!(body["breakfast"], true);
                assert_eq!(body["dinner"], false);
                reply(200, r#"{"date":"2024-05-03","breakfast":true,"dinner":false}"#)
            } else {
                assert_eq!(request.query, vec![("month".to_string(), "2024-05".to_string())]);
                if request.url.ends_with("/meals/summary/mine") {
                    reply(200, r#"{"month":"2024-05","totalMeals":3,"mealCost":60,"totalCost":180}"#)
                } else {
                    reply(200, r#"[{"date":"2024-05-01","breakfast":true,"dinner":true}]"#)
                }
            }
        });
        let client = client(transport);
        let month: Month = "2024-05".parse().unwrap();

        let logs = client.my_meals(month).await.unwrap();
        assert_eq!(logs.len(), 1);

        let summary = client.my_meal_summary(month).await.unwrap();
        assert_eq!(summary.total_cost, 180.0);

        let date = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap();
        let toggle = MealToggle { breakfast: true, dinner: false };
        let stored = client.upsert_meal(date, toggle).await.unwrap();
        assert_eq!(stored.toggle(), toggle);
    }

    #[tokio::test]
    async fn test_public_user_path_uses_id() {
        let transport = ScriptedTransport::new(|request| {
            assert!(request.url.ends_with("/public/users/65f1"));
            reply(200, &format!(r#"{{"user":{},"totalMeals":4,"logs":[]}}"#, USER))
        });
        let client = client(transport);
        let detail = client
            .public_user(&Id::Text("65f1".into()), "2024-05".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(detail.total_meals, 4.0);
    }

    #[tokio::test]
    async fn test_account_and_admin_routes() {
        let transport = ScriptedTransport::new(|request| {
            let path = request.url.trim_start_matches("https://host/api");
            match path {
                "/auth/recovery-question" => reply(200, r#"{"prompt":"First school?"}"#),
                "/users/me" => reply(200, USER),
                "/public/meal-price-history" => reply(200, r#"{"labels":["1"],"values":[48]}"#),
                "/admin/overview" => reply(
                    200,
                    r#"{"users":[],"settings":{"mealCost":50,"countingRule":"per_meal"}}"#,
                ),
                _ => reply(200, "{}"),
            }
        });
        let client = client(transport.clone());
        let month: Month = "2024-05".parse().unwrap();
        let settings = AdminSettings {
            meal_cost: 55.0,
            counting_rule: "per_meal".into(),
        };

        let prompt = client.recovery_question("rahim@example.com").await.unwrap();
        assert_eq!(prompt.prompt_or_default(), "First school?");
        client
            .reset_password("rahim@example.com", "Dhaka", "n3w")
            .await
            .unwrap();
        let update = ProfileUpdate {
            name: Some("Rahim Uddin".into()),
            ..ProfileUpdate::default()
        };
        client.update_profile(&update).await.unwrap();
        let history = client.meal_price_history(month).await.unwrap();
        assert_eq!(history.points().count(), 1);
        let overview = client.admin_overview(month).await.unwrap();
        assert_eq!(overview.settings.meal_cost, 50.0);
        client.update_admin_settings(&settings).await.unwrap();

        let month_query = vec![("month".to_string(), "2024-05".to_string())];
        let expected = [
            (Method::POST, "/auth/recovery-question", Some(serde_json::json!({"email": "rahim@example.com"})), vec![]),
            (
                Method::POST,
                "/auth/reset-password",
                Some(serde_json::json!({"email": "rahim@example.com", "answer": "Dhaka", "newPassword": "n3w"})),
                vec![],
            ),
            (Method::PATCH, "/users/me", Some(serde_json::json!({"name": "Rahim Uddin"})), vec![]),
            (Method::GET, "/public/meal-price-history", None, month_query.clone()),
            (Method::GET, "/admin/overview", None, month_query),
            (
                Method::PATCH,
                "/admin/settings",
                Some(serde_json::json!({"mealCost": 55.0, "countingRule": "per_meal"})),
                vec![],
            ),
        ];

        let calls = transport.calls();
        assert_eq!(calls.len(), expected.len());
        for (call, (method, path, body, query)) in calls.iter().zip(expected) {
            assert_eq!(call.method, method, "{}", path);
            assert_eq!(call.url, format!("https://host/api{}", path));
            assert_eq!(call.body, body, "{}", path);
            assert_eq!(call.query, query, "{}", path);
        }
    }

    #[tokio::test]
    async fn test_endpoints_share_renewal() {
        let transport = ScriptedTransport::new(|request| {
            if request.url.ends_with("/auth/refresh") {
                return reply(200, r#"{"accessToken":"fresh"}"#);
            }
            match request.bearer_token() {
                Some("fresh") => reply(200, r#"{"users":[{"id":1,"name":"A","totalCost":10}]}"#),
                _ => reply(401, "expired"),
            }
        });
        let client = SessionClient::with_transport(
            transport.clone(),
            Arc::new(MemoryStore::new()),
            SessionMode {
                renewal: RenewalPolicy::Enabled,
                ..SessionMode::default()
            },
            "https://host".into(),
        );
        client.set_access_credential(Some("old"));
        client.set_renewal_credential(Some("rt"));

        let users = client.public_users("2024-05".parse().unwrap()).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(transport.count("/auth/refresh"), 1);
    }
}
