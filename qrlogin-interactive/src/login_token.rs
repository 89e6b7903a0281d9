//! Exchange of the partner's login token for credentials of the new device.

use url::Url;

use crate::session::Credentials;
use crate::Result;

/// `type` of a token login request.
pub const TOKEN_LOGIN_TYPE: &str = "m.login.token";

/// Redeems a one-time login token at a homeserver.
#[async_trait::async_trait]
pub trait LoginTokenExchanger: Send + Sync {
    /// Log in at `homeserver` with `login_token`.
    ///
    /// `homeserver` is the one named by the partner device, never a local default.
    async fn exchange(
        &self,
        homeserver: &Url,
        login_token: &str,
        device_display_name: Option<&str>,
    ) -> Result<Credentials>;
}

#[cfg(feature = "http-login")]
pub use http::HttpLoginTokenExchanger;

#[cfg(feature = "http-login")]
mod http {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};
    use url::Url;

    use super::{LoginTokenExchanger, TOKEN_LOGIN_TYPE};
    use crate::session::Credentials;
    use crate::{LoginError, Result};

    #[derive(Serialize)]
    struct TokenLoginRequest<'a> {
        #[serde(rename = "type")]
        kind: &'static str,
        token: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        initial_device_display_name: Option<&'a str>,
    }

    #[derive(Deserialize)]
    struct TokenLoginResponse {
        user_id: String,
        access_token: String,
        device_id: String,
    }

    #[derive(Deserialize)]
    struct ErrorResponse {
        errcode: Option<String>,
        error: Option<String>,
    }

    /// `POST /_matrix/client/v3/login` over reqwest.
    pub struct HttpLoginTokenExchanger {
        client: reqwest::Client,
    }

    impl HttpLoginTokenExchanger {
        pub fn new(request_timeout: Duration) -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(request_timeout)
                .build()
                .map_err(|e| {
                    LoginError::TokenExchange(format!("Failed to build HTTP client: {}", e))
                })?;
            Ok(Self { client })
        }

        fn login_url(homeserver: &Url) -> Result<Url> {
            let mut url = homeserver.clone();
            url.path_segments_mut()
                .map_err(|_| LoginError::InvalidField {
                    field: "homeserver",
                    reason: "cannot be a base URL".to_string(),
                })?
                .pop_if_empty()
                .extend(["_matrix", "client", "v3", "login"]);
            Ok(url)
        }
    }

    #[async_trait::async_trait]
    impl LoginTokenExchanger for HttpLoginTokenExchanger {
        #[tracing::instrument(skip(self, login_token), fields(homeserver = %homeserver))]
        async fn exchange(
            &self,
            homeserver: &Url,
            login_token: &str,
            device_display_name: Option<&str>,
        ) -> Result<Credentials> {
            let url = Self::login_url(homeserver)?;
            let request = TokenLoginRequest {
                kind: TOKEN_LOGIN_TYPE,
                token: login_token,
                initial_device_display_name: device_display_name,
            };

            let response = self
                .client
                .post(url)
                .json(&request)
                .send()
                .await
                .map_err(|e| LoginError::TokenExchange(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let detail = response
                    .json::<ErrorResponse>()
                    .await
                    .ok()
                    .map(|e| {
                        format!(
                            "{}: {}",
                            e.errcode.unwrap_or_default(),
                            e.error.unwrap_or_default()
                        )
                    })
                    .unwrap_or_default();
                return Err(LoginError::TokenExchange(format!(
                    "homeserver returned {} {}",
                    status, detail
                )));
            }

            let body: TokenLoginResponse = response
                .json()
                .await
                .map_err(|e| LoginError::TokenExchange(format!("invalid login response: {}", e)))?;

            tracing::debug!(user_id = %body.user_id, device_id = %body.device_id, "token login succeeded");
            Ok(Credentials::new(
                homeserver.clone(),
                body.user_id,
                body.device_id,
                body.access_token,
            ))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_login_url_keeps_path_prefix() {
            let url = HttpLoginTokenExchanger::login_url(
                &Url::parse("https://example.org/matrix/").unwrap(),
            )
            .unwrap();
            assert_eq!(url.as_str(), "https://example.org/matrix/_matrix/client/v3/login");

            let url =
                HttpLoginTokenExchanger::login_url(&Url::parse("https://example.org").unwrap())
                    .unwrap();
            assert_eq!(url.as_str(), "https://example.org/_matrix/client/v3/login");
        }
    }
}
