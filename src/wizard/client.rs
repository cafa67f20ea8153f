//! HTTP transport for the wizard, speaking the server's JSON exchanges.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::csrf::{SESSION_HEADER, TOKEN_HEADER};
use crate::error::TransportError;

use super::machine::{CreateResponse, WizardTransport};
use super::model::{ValidationResult, WizardData};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionGrant {
    session_id: String,
    csrf_token: String,
}

#[derive(Deserialize)]
struct ErrorsBody {
    #[serde(default)]
    errors: ValidationResult,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedBody {
    user_id: i64,
}

struct Session {
    id: String,
    token: SecretString,
}

/// [`WizardTransport`] over HTTP, holding one anti-forgery session.
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
    session: RwLock<Session>,
}

impl HttpTransport {
    /// Build the client and obtain a session from the server.
    pub async fn connect(config: ClientConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Request {
                endpoint: config.base_url.clone(),
                reason: e.to_string(),
            })?;
        let session = fetch_session(&client, &config).await?;
        Ok(Self {
            client,
            config,
            session: RwLock::new(session),
        })
    }

    /// Replace the held session with a fresh one, e.g. to start a new wizard.
    pub async fn renew_session(&self) -> Result<(), TransportError> {
        let session = fetch_session(&self.client, &self.config).await?;
        *self.session.write().await = session;
        Ok(())
    }

    /// Id of the held session.
    pub async fn session_id(&self) -> String {
        self.session.read().await.id.clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    fn send_error(&self, endpoint: &str, e: reqwest::Error) -> TransportError {
        send_error(&self.config, endpoint, e)
    }
}

fn send_error(config: &ClientConfig, endpoint: &str, e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout {
            endpoint: endpoint.to_string(),
            timeout: config.request_timeout,
        }
    } else {
        TransportError::Request {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }
    }
}

async fn decode<B: DeserializeOwned>(
    endpoint: &str,
    resp: reqwest::Response,
) -> Result<B, TransportError> {
    resp.json::<B>().await.map_err(|e| TransportError::Decode {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}

async fn fetch_session(
    client: &reqwest::Client,
    config: &ClientConfig,
) -> Result<Session, TransportError> {
    const ENDPOINT: &str = "/onboarding/session";
    let resp = client
        .get(format!("{}{ENDPOINT}", config.base_url))
        .send()
        .await
        .map_err(|e| send_error(config, ENDPOINT, e))?;
    if !resp.status().is_success() {
        return Err(TransportError::UnexpectedStatus {
            endpoint: ENDPOINT.into(),
            status: resp.status().as_u16(),
        });
    }
    let grant: SessionGrant = decode(ENDPOINT, resp).await?;
    info!(session_id = %grant.session_id, "Onboarding session obtained");
    Ok(Session {
        id: grant.session_id,
        token: SecretString::from(grant.csrf_token),
    })
}

#[async_trait]
impl WizardTransport for HttpTransport {
    async fn validate_step(
        &self,
        step: i64,
        data: &WizardData,
    ) -> Result<ValidationResult, TransportError> {
        const ENDPOINT: &str = "/onboarding/validate-step";
        let resp = self
            .client
            .post(self.url(ENDPOINT))
            .json(&json!({ "step": step, "wizard": data }))
            .send()
            .await
            .map_err(|e| self.send_error(ENDPOINT, e))?;

        match resp.status() {
            StatusCode::OK => Ok(ValidationResult::new()),
            StatusCode::UNPROCESSABLE_ENTITY => {
                let body: ErrorsBody = decode(ENDPOINT, resp).await?;
                debug!(step, "Step rejected by server");
                Ok(body.errors)
            }
            status => Err(TransportError::UnexpectedStatus {
                endpoint: ENDPOINT.into(),
                status: status.as_u16(),
            }),
        }
    }

    async fn create(&self, data: &WizardData) -> Result<CreateResponse, TransportError> {
        const ENDPOINT: &str = "/onboarding/create";
        let request = {
            let session = self.session.read().await;
            self.client
                .post(self.url(ENDPOINT))
                .header(SESSION_HEADER, &session.id)
                .header(TOKEN_HEADER, session.token.expose_secret())
                .json(&json!({ "wizard": data }))
        };
        let resp = request
            .send()
            .await
            .map_err(|e| self.send_error(ENDPOINT, e))?;

        match resp.status() {
            StatusCode::CREATED => {
                let body: CreatedBody = decode(ENDPOINT, resp).await?;
                Ok(CreateResponse::Created {
                    user_id: body.user_id,
                })
            }
            StatusCode::UNPROCESSABLE_ENTITY => {
                let body: ErrorsBody = decode(ENDPOINT, resp).await?;
                Ok(CreateResponse::Invalid(body.errors))
            }
            StatusCode::FORBIDDEN => Ok(CreateResponse::Forbidden),
            status => Err(TransportError::UnexpectedStatus {
                endpoint: ENDPOINT.into(),
                status: status.as_u16(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn connect_to_nothing_is_a_transport_error() {
        let config =
            ClientConfig::new("http://127.0.0.1:1").with_timeout(Duration::from_millis(500));
        let err = match HttpTransport::connect(config).await {
            Err(e) => e,
            Ok(_) => panic!("connect should fail with nothing listening"),
        };
        assert!(matches!(
            err,
            TransportError::Request { .. } | TransportError::Timeout { .. }
        ));
        assert!(err.to_string().contains("/onboarding/session"));
    }

    #[test]
    fn error_bodies_decode_into_field_map() {
        let body: ErrorsBody = serde_json::from_str(
            r#"{"errors":{"email":["This email is already in use."],"phone":["Phone number must contain only digits."]}}"#,
        )
        .unwrap();
        assert_eq!(body.errors.fields().count(), 2);

        let body: ErrorsBody = serde_json::from_str(r#"{"error":"x"}"#).unwrap();
        assert!(body.errors.is_empty());
    }
}
