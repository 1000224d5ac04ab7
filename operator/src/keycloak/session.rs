use std::time::{Duration, Instant};

use reqwest::{Method, StatusCode};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock, Semaphore};

use crate::util::{
    Error,
    backoff::{SESSION_ATTEMPTS, SESSION_BACKOFF},
};

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    refresh_token: Option<String>,
}

#[derive(Debug)]
struct TokenState {
    access_token: String,
    refresh_token: Option<String>,
    acquired_at: Instant,
    expires_in: Duration,
}

/// A token is refreshed proactively once 80% of its lifetime has elapsed.
fn refresh_due(age: Duration, expires_in: Duration) -> bool {
    age >= expires_in * 4 / 5
}

impl TokenState {
    fn needs_refresh(&self) -> bool {
        refresh_due(self.acquired_at.elapsed(), self.expires_in)
    }
}

/// Path of a resource below one realm's admin root.
pub fn admin_path(realm: &str, suffix: &str) -> String {
    format!("/admin/realms/{realm}{suffix}")
}

/// In-flight admin requests allowed per session. Keeps a burst of
/// reconcilers from stampeding one Keycloak server.
const MAX_IN_FLIGHT: usize = 8;

/// An authenticated admin-API context bound to one Keycloak server and one
/// admin credential. Cheap to share; concurrent borrowers issue requests
/// through the same HTTP client while token exchanges stay serialized.
pub struct Session {
    base_url: String,
    admin_realm: String,
    username: String,
    password: String,
    http: reqwest::Client,
    token: RwLock<Option<TokenState>>,
    refresh_gate: Mutex<()>,
    in_flight: Semaphore,
}

impl Session {
    /// Builds the session and performs the initial password-grant exchange.
    pub async fn connect(
        base_url: &str,
        admin_realm: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, Error> {
        let session = Session {
            base_url: base_url.trim_end_matches('/').to_string(),
            admin_realm: admin_realm.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            http: reqwest::Client::new(),
            token: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            in_flight: Semaphore::new(MAX_IN_FLIGHT),
        };
        session.bearer(true).await?;
        Ok(session)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn token_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.base_url, self.admin_realm
        )
    }

    async fn exchange(&self, form: &[(&str, &str)]) -> Result<TokenState, Error> {
        let acquired_at = Instant::now();
        let response = self
            .http
            .post(self.token_url())
            .form(form)
            .send()
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::BAD_REQUEST {
            return Err(Error::AuthFailed(text));
        }
        if !status.is_success() {
            return Err(Error::Unavailable(format!(
                "token endpoint returned {status}: {text}"
            )));
        }
        let token: TokenResponse = serde_json::from_str(&text)?;
        Ok(TokenState {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            acquired_at,
            expires_in: Duration::from_secs(token.expires_in),
        })
    }

    async fn password_grant(&self) -> Result<TokenState, Error> {
        self.exchange(&[
            ("grant_type", "password"),
            ("client_id", "admin-cli"),
            ("username", &self.username),
            ("password", &self.password),
        ])
        .await
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenState, Error> {
        self.exchange(&[
            ("grant_type", "refresh_token"),
            ("client_id", "admin-cli"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    /// Returns a fresh access token, exchanging or refreshing as needed.
    /// Refreshes are serialized; losers of the gate reuse the winner's token.
    async fn bearer(&self, force: bool) -> Result<String, Error> {
        if !force
            && let Some(state) = self.token.read().await.as_ref()
            && !state.needs_refresh()
        {
            return Ok(state.access_token.clone());
        }
        let _gate = self.refresh_gate.lock().await;
        if !force
            && let Some(state) = self.token.read().await.as_ref()
            && !state.needs_refresh()
        {
            return Ok(state.access_token.clone());
        }
        let refresh_token = self
            .token
            .read()
            .await
            .as_ref()
            .and_then(|s| s.refresh_token.clone());
        let next = match refresh_token {
            // An expired refresh token surfaces as AuthFailed; fall back to
            // the password grant before giving up.
            Some(rt) => match self.refresh_grant(&rt).await {
                Ok(state) => state,
                Err(Error::AuthFailed(_)) => self.password_grant().await?,
                Err(e) => return Err(e),
            },
            None => self.password_grant().await?,
        };
        let access = next.access_token.clone();
        *self.token.write().await = Some(next);
        Ok(access)
    }

    /// One admin-API request with bearer injection, a bounded retry budget
    /// for connection failures and 5xx responses, and a single forced token
    /// refresh on 401. Returns the decoded body, or `None` for empty bodies.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>, Error> {
        let url = format!("{}{}", self.base_url, path);
        // Never closed, so acquire cannot fail.
        let _permit = self.in_flight.acquire().await.expect("semaphore closed");
        let mut refreshed_once = false;
        let mut attempt: u32 = 0;
        loop {
            let token = self.bearer(false).await?;
            let mut request = self.http.request(method.clone(), &url).bearer_auth(token);
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    attempt += 1;
                    if attempt >= SESSION_ATTEMPTS {
                        return Err(Error::Unavailable(e.to_string()));
                    }
                    tokio::time::sleep(SESSION_BACKOFF.delay(attempt)).await;
                    continue;
                }
            };
            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                if !refreshed_once {
                    refreshed_once = true;
                    self.bearer(true).await?;
                    continue;
                }
                return Err(Error::AuthFailed(
                    "Keycloak rejected the admin token".to_string(),
                ));
            }
            let text = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                attempt += 1;
                if attempt >= SESSION_ATTEMPTS {
                    return Err(Error::Unavailable(format!("{status}: {text}")));
                }
                tokio::time::sleep(SESSION_BACKOFF.delay(attempt)).await;
                continue;
            }
            if status == StatusCode::CONFLICT {
                return Err(Error::Conflict(text));
            }
            if !status.is_success() {
                return Err(Error::Keycloak {
                    status: status.as_u16(),
                    text,
                });
            }
            if text.trim().is_empty() {
                return Ok(None);
            }
            return Ok(Some(serde_json::from_str(&text)?));
        }
    }

    /// GET that treats 404 as absence. This is the observe primitive behind
    /// handle lookups and adoption searches.
    pub async fn get_opt(&self, path: &str) -> Result<Option<Value>, Error> {
        match self.request(Method::GET, path, None).await {
            Ok(v) => Ok(Some(v.unwrap_or(Value::Null))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn get(&self, path: &str) -> Result<Value, Error> {
        Ok(self
            .request(Method::GET, path, None)
            .await?
            .unwrap_or(Value::Null))
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<(), Error> {
        self.request(Method::POST, path, Some(body)).await?;
        Ok(())
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<(), Error> {
        self.request(Method::PUT, path, Some(body)).await?;
        Ok(())
    }

    /// DELETE where 404 counts as success; deletions are idempotent.
    pub async fn delete(&self, path: &str) -> Result<(), Error> {
        match self.request(Method::DELETE, path, None).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Health probe; returns the server version from `/admin/serverinfo`.
    pub async fn server_info(&self) -> Result<String, Error> {
        let info = self.get("/admin/serverinfo").await?;
        info.pointer("/systemInfo/version")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Keycloak {
                status: 200,
                text: "serverinfo response carried no systemInfo.version".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_fires_at_eighty_percent_of_expiry() {
        let expires = Duration::from_secs(60);
        assert!(!refresh_due(Duration::from_secs(0), expires));
        assert!(!refresh_due(Duration::from_secs(47), expires));
        assert!(refresh_due(Duration::from_secs(48), expires));
        assert!(refresh_due(Duration::from_secs(120), expires));
    }

    #[test]
    fn admin_paths_are_rooted_per_realm() {
        assert_eq!(admin_path("e2e", "/clients"), "/admin/realms/e2e/clients");
        assert_eq!(admin_path("master", ""), "/admin/realms/master");
    }
}
