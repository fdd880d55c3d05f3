//! OAuth device-flow authentication.
//!
//! Two steps: request a device/user code pair, then poll the token endpoint
//! while the user confirms the code in a browser. The caller is responsible
//! for showing `user_code` and `verification_uri`; this module never prints.

use catapult_core::RemoteError;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::api;

const DEVICE_CODE_URL: &str = "https://github.com/login/device/code";
const ACCESS_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

pub struct DeviceFlow {
    http: Client,
    client_id: String,
    scopes: Vec<String>,
    device_code_url: String,
    access_token_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthorization {
    pub device_code: String,
    /// Code the user types at the verification page.
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    /// Minimum seconds between polls.
    pub interval: u64,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

impl DeviceFlow {
    pub fn new(client_id: String, scopes: Vec<String>) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .user_agent(api::USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RemoteError::transport(e.to_string()))?;
        Ok(Self {
            http,
            client_id,
            scopes,
            device_code_url: DEVICE_CODE_URL.to_string(),
            access_token_url: ACCESS_TOKEN_URL.to_string(),
        })
    }

    pub async fn start(&self) -> Result<DeviceAuthorization, RemoteError> {
        let resp = self
            .http
            .post(&self.device_code_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("scope", &self.scopes.join(" ")),
            ])
            .send()
            .await
            .map_err(api::transport)?;
        if !resp.status().is_success() {
            return Err(RemoteError::Api {
                status: resp.status().as_u16(),
                message: "device code request rejected".to_string(),
            });
        }
        resp.json().await.map_err(api::transport)
    }

    /// Poll until the user approves, the code expires, or access is denied.
    pub async fn poll(&self, auth: &DeviceAuthorization) -> Result<String, RemoteError> {
        let deadline = Instant::now() + Duration::from_secs(auth.expires_in);
        let mut interval = auth.interval.max(1);

        loop {
            sleep(Duration::from_secs(interval)).await;
            if Instant::now() >= deadline {
                return Err(RemoteError::Api {
                    status: 401,
                    message: "device code expired before authorization".to_string(),
                });
            }

            let resp = self
                .http
                .post(&self.access_token_url)
                .header(reqwest::header::ACCEPT, "application/json")
                .form(&[
                    ("client_id", self.client_id.as_str()),
                    ("device_code", auth.device_code.as_str()),
                    ("grant_type", GRANT_TYPE),
                ])
                .send()
                .await
                .map_err(api::transport)?;
            let body: AccessTokenResponse = resp.json().await.map_err(api::transport)?;

            if let Some(token) = body.access_token {
                return Ok(token);
            }
            match body.error.as_deref() {
                Some("authorization_pending") => {
                    debug!("authorization pending, polling again");
                }
                Some("slow_down") => {
                    interval += 5;
                    debug!(interval, "server asked to slow down");
                }
                Some("expired_token") => {
                    return Err(RemoteError::Api {
                        status: 401,
                        message: "device code expired before authorization".to_string(),
                    });
                }
                Some("access_denied") => {
                    return Err(RemoteError::Permission {
                        message: "authorization was denied by the user".to_string(),
                    });
                }
                Some(other) => {
                    return Err(RemoteError::Api {
                        status: 400,
                        message: format!("authorization failed: {other}"),
                    });
                }
                None => {
                    return Err(RemoteError::Api {
                        status: 400,
                        message: "token endpoint returned neither token nor error".to_string(),
                    });
                }
            }
        }
    }
}
