//! LinkedIn OAuth 2.0 and member posting.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::client::{PlatformClient, PlatformError, PostReceipt, TokenGrant};
use crate::constants::USER_AGENT;
use crate::platform::Platform;

const SCOPES: &str = "openid profile w_member_social";
const POST_URL_BASE: &str = "https://www.linkedin.com/feed/update";

/// App credentials and endpoints for the LinkedIn API.
#[derive(Debug, Clone)]
pub struct LinkedInSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// e.g. `https://www.linkedin.com/oauth/v2`
    pub oauth_base: String,
    /// e.g. `https://api.linkedin.com/v2`
    pub api_base: String,
}

pub struct LinkedInClient {
    settings: LinkedInSettings,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct UserInfo {
    sub: String,
}

#[derive(Deserialize)]
struct CreatedPost {
    #[serde(default)]
    id: Option<String>,
}

impl LinkedInClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: LinkedInSettings, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        let settings = LinkedInSettings {
            oauth_base: settings.oauth_base.trim_end_matches('/').to_string(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            ..settings
        };
        Ok(Self { settings, http })
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, PlatformError> {
        let url = format!("{}/accessToken", self.settings.oauth_base);
        let response = self
            .http
            .post(&url)
            .form(form)
            .send()
            .await
            .map_err(|e| PlatformError::Transient(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("LinkedIn token endpoint returned {status}: {body}");
            return Err(if is_retryable_status(status) {
                PlatformError::Transient(message)
            } else {
                PlatformError::InvalidGrant(message)
            });
        }

        response
            .json()
            .await
            .map_err(|e| PlatformError::Transient(format!("unreadable token response: {e}")))
    }

    async fn member_id(&self, access_token: &str) -> Result<String, PlatformError> {
        let url = format!("{}/userinfo", self.settings.api_base);
        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .send()
            .await
            .map_err(|e| PlatformError::Transient(format!("userinfo request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_api_error(status, body));
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| PlatformError::Transient(format!("unreadable userinfo response: {e}")))?;
        Ok(info.sub)
    }
}

#[async_trait]
impl PlatformClient for LinkedInClient {
    fn platform(&self) -> Platform {
        Platform::Linkedin
    }

    fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}/authorization?response_type=code&client_id={}&redirect_uri={}&state={}&scope={}",
            self.settings.oauth_base,
            urlencoding::encode(&self.settings.client_id),
            urlencoding::encode(&self.settings.redirect_uri),
            urlencoding::encode(state),
            urlencoding::encode(SCOPES),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, PlatformError> {
        let token = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.settings.redirect_uri),
                ("client_id", &self.settings.client_id),
                ("client_secret", &self.settings.client_secret),
            ])
            .await?;
        let member_id = self.member_id(&token.access_token).await?;
        debug!(member_id = %member_id, "LinkedIn authorization code exchanged");

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
            member_id: Some(member_id),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, PlatformError> {
        let token = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.settings.client_id),
                ("client_secret", &self.settings.client_secret),
            ])
            .await?;

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
            member_id: None,
        })
    }

    async fn create_post(
        &self,
        access_token: &str,
        member_id: Option<&str>,
        text: &str,
    ) -> Result<PostReceipt, PlatformError> {
        let member_id = match member_id {
            Some(id) => id.to_string(),
            None => self.member_id(access_token).await?,
        };

        let payload = json!({
            "author": format!("urn:li:person:{member_id}"),
            "lifecycleState": "PUBLISHED",
            "specificContent": {
                "com.linkedin.ugc.ShareContent": {
                    "shareCommentary": { "text": text },
                    "shareMediaCategory": "NONE"
                }
            },
            "visibility": {
                "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC"
            }
        });

        let url = format!("{}/ugcPosts", self.settings.api_base);
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&payload)
            .send()
            .await
            .map_err(|e| PlatformError::Transient(format!("post request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_api_error(status, body));
        }

        let header_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let post_id = match header_id {
            Some(id) => id,
            None => response
                .json::<CreatedPost>()
                .await
                .ok()
                .and_then(|p| p.id)
                .unwrap_or_default(),
        };

        let post_url = (!post_id.is_empty()).then(|| format!("{POST_URL_BASE}/{post_id}/"));
        Ok(PostReceipt { post_id, post_url })
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn classify_api_error(status: StatusCode, body: String) -> PlatformError {
    if status == StatusCode::UNAUTHORIZED {
        PlatformError::Unauthorized
    } else if is_retryable_status(status) {
        PlatformError::Transient(format!("LinkedIn returned {status}: {body}"))
    } else {
        PlatformError::Rejected {
            status: status.as_u16(),
            message: body,
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer) -> LinkedInClient {
        LinkedInClient::new(
            LinkedInSettings {
                client_id: "cid".to_string(),
                client_secret: "secret".to_string(),
                redirect_uri: "http://localhost:8080/callback".to_string(),
                oauth_base: format!("{}/oauth/v2", server.uri()),
                api_base: format!("{}/v2", server.uri()),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_authorization_url_is_encoded() {
        let server = MockServer::start().await;
        let url = client(&server).authorization_url("u1:abc");
        assert!(url.contains("/oauth/v2/authorization?response_type=code"));
        assert!(url.contains("client_id=cid"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fcallback"));
        assert!(url.contains("state=u1%3Aabc"));
        assert!(url.contains("scope=openid%20profile%20w_member_social"));
    }

    #[tokio::test]
    async fn test_exchange_code_fetches_member_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/v2/accessToken"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access",
                "expires_in": 5_184_000,
                "refresh_token": "new-refresh"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/userinfo"))
            .and(header("authorization", "Bearer new-access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sub": "m-42" })))
            .mount(&server)
            .await;

        let grant = client(&server).exchange_code("the-code").await.unwrap();
        assert_eq!(grant.access_token, "new-access");
        assert_eq!(grant.refresh_token.as_deref(), Some("new-refresh"));
        assert_eq!(grant.expires_in, Some(5_184_000));
        assert_eq!(grant.member_id.as_deref(), Some("m-42"));
    }

    #[tokio::test]
    async fn test_refresh_refused_is_invalid_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/v2/accessToken"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let err = client(&server).refresh("stale").await.unwrap_err();
        assert!(matches!(err, PlatformError::InvalidGrant(_)));
    }

    #[tokio::test]
    async fn test_refresh_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/v2/accessToken"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server).refresh("r").await.unwrap_err();
        assert!(matches!(err, PlatformError::Transient(_)));
    }

    #[tokio::test]
    async fn test_create_post_reads_restli_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/ugcPosts"))
            .and(header("X-Restli-Protocol-Version", "2.0.0"))
            .and(body_string_contains("urn:li:person:m-42"))
            .respond_with(
                ResponseTemplate::new(201).insert_header("x-restli-id", "urn:li:share:99"),
            )
            .mount(&server)
            .await;

        let receipt = client(&server)
            .create_post("access", Some("m-42"), "Hello")
            .await
            .unwrap();
        assert_eq!(receipt.post_id, "urn:li:share:99");
        assert_eq!(
            receipt.post_url.as_deref(),
            Some("https://www.linkedin.com/feed/update/urn:li:share:99/")
        );
    }

    #[tokio::test]
    async fn test_create_post_error_classes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/ugcPosts"))
            .and(header("authorization", "Bearer dead"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/ugcPosts"))
            .and(header("authorization", "Bearer dup"))
            .respond_with(ResponseTemplate::new(422).set_body_string("duplicate post"))
            .mount(&server)
            .await;

        let linkedin = client(&server);
        let err = linkedin.create_post("dead", Some("m"), "x").await.unwrap_err();
        assert!(matches!(err, PlatformError::Unauthorized));

        let err = linkedin.create_post("dup", Some("m"), "x").await.unwrap_err();
        match err {
            PlatformError::Rejected { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "duplicate post");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
