use std::thread;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::notify::{Notifier, Severity};

pub const DEFAULT_SIGN_IN_URL: &str = "https://railspaapi.shohoz.com/v1.0/app/auth/sign-in";
pub const DEFAULT_MAX_RETRIES: u32 = 50;

// Transient sign-in failures; everything else is permanent.
const RETRYABLE_STATUSES: [u16; 4] = [500, 502, 503, 504];

#[derive(Debug, Clone)]
pub struct Credentials {
    pub mobile_number: String,
    pub password: String,
}

/// Opaque bearer token issued by the sign-in endpoint.
#[derive(Debug, Clone)]
pub struct SessionToken {
    raw: String,
}

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.raw)
    }

    /// Best-effort read of the JWT payload, without signature verification.
    /// Returns `None` for opaque or malformed tokens.
    pub fn claims(&self) -> Option<TokenClaims> {
        let payload = self.raw.split('.').nth(1)?;
        let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        serde_json::from_slice(&decoded).ok()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no token found in response")]
    MissingToken,
    #[error("sign-in rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("max retries reached after {attempts} attempts; last failure: {last}")]
    RetriesExhausted { attempts: u32, last: String },
    #[error("could not build sign-in client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct AuthClientConfig {
    pub sign_in_url: String,
    pub max_retries: u32,
    /// Fixed pause between transient failures; the sign-in flow uses a flat
    /// cadence, not exponential backoff.
    pub retry_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for AuthClientConfig {
    fn default() -> Self {
        Self {
            sign_in_url: DEFAULT_SIGN_IN_URL.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Serialize)]
struct SignInRequest<'a> {
    mobile_number: &'a str,
    password: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct SignInResponse {
    #[serde(default)]
    data: SignInData,
}

#[derive(Debug, Default, Deserialize)]
struct SignInData {
    #[serde(default)]
    token: Option<String>,
}

enum SignInOutcome {
    Granted(SessionToken),
    Transient(String),
    Fatal(AuthError),
}

pub struct AuthClient {
    http: reqwest::blocking::Client,
    config: AuthClientConfig,
}

impl AuthClient {
    pub fn new(config: AuthClientConfig) -> Result<Self, AuthError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    /// Sign in and return the issued token, retrying transient failures on a
    /// fixed delay up to the configured budget. The attempt counter is local
    /// to this call; every invocation starts with a fresh budget.
    ///
    /// Fatal outcomes surface immediately: a 2xx response without a usable
    /// token, and any status outside the transient set (4xx included).
    pub fn acquire_token(
        &self,
        credentials: &Credentials,
        notifier: &dyn Notifier,
    ) -> Result<SessionToken, AuthError> {
        let mut attempts = 0_u32;
        loop {
            attempts += 1;
            match self.attempt_sign_in(credentials) {
                SignInOutcome::Granted(token) => {
                    notifier.notify(Severity::Success, "Auth token retrieved.");
                    return Ok(token);
                }
                SignInOutcome::Fatal(err) => {
                    notifier.notify(Severity::Error, &err.to_string());
                    return Err(err);
                }
                SignInOutcome::Transient(reason) => {
                    if attempts >= self.config.max_retries {
                        notifier.notify(
                            Severity::Error,
                            "Max retries reached. Failed to obtain auth token.",
                        );
                        return Err(AuthError::RetriesExhausted {
                            attempts,
                            last: reason,
                        });
                    }
                    notifier.notify(
                        Severity::Warning,
                        &format!(
                            "{reason}. Retrying in {:?}... ({attempts}/{})",
                            self.config.retry_delay, self.config.max_retries
                        ),
                    );
                    thread::sleep(self.config.retry_delay);
                }
            }
        }
    }

    fn attempt_sign_in(&self, credentials: &Credentials) -> SignInOutcome {
        let request = SignInRequest {
            mobile_number: &credentials.mobile_number,
            password: &credentials.password,
        };
        let response = match self
            .http
            .post(&self.config.sign_in_url)
            .json(&request)
            .send()
        {
            Ok(response) => response,
            Err(err) => return SignInOutcome::Transient(format!("Request error: {err}")),
        };

        let status = response.status();
        if status.is_success() {
            let body = match response.json::<SignInResponse>() {
                Ok(body) => body,
                Err(_) => return SignInOutcome::Fatal(AuthError::MissingToken),
            };
            match body.data.token {
                Some(token) if !token.is_empty() => {
                    SignInOutcome::Granted(SessionToken { raw: token })
                }
                _ => SignInOutcome::Fatal(AuthError::MissingToken),
            }
        } else if RETRYABLE_STATUSES.contains(&status.as_u16()) {
            SignInOutcome::Transient(format!("Server error {}", status.as_u16()))
        } else {
            let body = response.text().unwrap_or_default();
            SignInOutcome::Fatal(AuthError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}
