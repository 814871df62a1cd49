//! Google OAuth Provider
//!
//! Authorization-code flow against Google's OAuth2 endpoints and the v2
//! userinfo endpoint.

use std::time::Duration;

use kernel::error::{app_error::ResultExt, kind::ErrorKind};
use serde::Deserialize;
use url::form_urlencoded;

use crate::application::config::GoogleOAuthConfig;
use crate::application::oauth::{OAuthProvider, ProviderToken};
use crate::domain::entity::user::ProviderProfile;
use crate::domain::value_object::auth_provider::AuthProvider;
use crate::error::{AuthError, AuthResult};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const SCOPES: &str =
    "https://www.googleapis.com/auth/userinfo.email https://www.googleapis.com/auth/userinfo.profile";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// `/oauth2/v2/userinfo` response
#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: String,
    #[serde(default)]
    verified_email: bool,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
}

impl GoogleUserInfo {
    fn into_profile(self) -> ProviderProfile {
        let display_name = self.name.filter(|n| !n.is_empty()).or_else(|| {
            let joined = [self.given_name, self.family_name]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            (!joined.is_empty()).then_some(joined)
        });

        ProviderProfile {
            provider: AuthProvider::Google,
            provider_id: self.id,
            email: self.email,
            email_verified: self.verified_email,
            display_name,
            avatar_url: self.picture.filter(|p| !p.is_empty()),
        }
    }
}

#[derive(Clone)]
pub struct GoogleOAuthProvider {
    client: reqwest::Client,
    config: GoogleOAuthConfig,
}

impl GoogleOAuthProvider {
    pub fn new(config: GoogleOAuthConfig) -> AuthResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_app_err(ErrorKind::InternalServerError, "HTTP client setup failed")?;
        Ok(Self { client, config })
    }
}

impl OAuthProvider for GoogleOAuthProvider {
    fn kind(&self) -> AuthProvider {
        AuthProvider::Google
    }

    fn authorize_url(&self, state: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", SCOPES)
            .append_pair("state", state)
            .finish();
        format!("{AUTH_URL}?{query}")
    }

    async fn exchange_code(&self, code: &str) -> AuthResult<ProviderToken> {
        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AuthError::ExchangeFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::ExchangeFailed(format!(
                "token endpoint returned status: {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::ExchangeFailed(e.to_string()))?;

        Ok(ProviderToken {
            access_token: token.access_token,
        })
    }

    async fn fetch_profile(&self, token: &ProviderToken) -> AuthResult<ProviderProfile> {
        let response = self
            .client
            .get(USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| AuthError::ProfileFetchFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::ProfileFetchFailed(format!(
                "userinfo returned status: {}",
                response.status()
            )));
        }

        let info: GoogleUserInfo = response
            .json()
            .await
            .map_err(|e| AuthError::ProfileFetchFailed(e.to_string()))?;

        Ok(info.into_profile())
    }
}
