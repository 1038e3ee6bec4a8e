//! # Auth Gate
//!
//! Turns request headers into an [`Identity`]. The provider owns sessions and passwords,
//! this side only forwards the caller's credentials to its `/me` endpoint and reads the
//! role back.
//!
//! Mutations are gated here, on the server, by [`Identity::require_admin`]. Whatever the
//! client hides or shows is cosmetic.

use async_trait::async_trait;
use axum::http::{
    HeaderMap,
    header::{AUTHORIZATION, COOKIE, HeaderName},
};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Collaborator};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    #[serde(other)]
    User,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub role: Role,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    User(User),
}

impl Identity {
    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::User(user) => Some(user),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.user().is_some_and(|user| user.role == Role::Admin)
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Unauthorized)
        }
    }
}

/// Credentials lifted off an incoming request.
#[derive(Clone, Debug, Default)]
pub struct Credentials {
    pub authorization: Option<String>,
    pub cookie: Option<String>,
}

impl Credentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };

        Self {
            authorization: get(AUTHORIZATION),
            cookie: get(COOKIE),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.authorization.is_none() && self.cookie.is_none()
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn identify(&self, credentials: &Credentials) -> Result<Identity, AppError>;
}

#[derive(Deserialize)]
struct MeResponse {
    user: Option<User>,
}

pub struct RemoteAuth {
    client: Client,
    endpoint: String,
}

impl RemoteAuth {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/me", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl AuthProvider for RemoteAuth {
    async fn identify(&self, credentials: &Credentials) -> Result<Identity, AppError> {
        if credentials.is_empty() {
            return Ok(Identity::Anonymous);
        }

        let unavailable = |e| AppError::http(Collaborator::Auth, e);

        let mut request = self.client.get(&self.endpoint);
        if let Some(authorization) = &credentials.authorization {
            request = request.header(AUTHORIZATION, authorization);
        }
        if let Some(cookie) = &credentials.cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await.map_err(unavailable)?;

        // provider answers 401 for expired or unknown sessions
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(Identity::Anonymous);
        }

        let me: MeResponse = response
            .error_for_status()
            .map_err(unavailable)?
            .json()
            .await
            .map_err(unavailable)?;

        Ok(me.user.map_or(Identity::Anonymous, Identity::User))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use axum::http::HeaderValue;
    use tokio::net::TcpListener;

    use super::*;

    /// Accepts connections and never writes a byte back.
    pub(crate) async fn silent_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        format!("http://{address}")
    }

    fn session() -> Credentials {
        Credentials {
            authorization: Some("Bearer abc".into()),
            cookie: None,
        }
    }

    #[test]
    fn test_role_parsing() {
        let user: User = serde_json::from_str(r#"{"id":"1","name":"a","role":"admin"}"#).unwrap();
        assert_eq!(user.role, Role::Admin);

        let user: User = serde_json::from_str(r#"{"id":"2","name":null,"role":"editor"}"#).unwrap();
        assert_eq!(user.role, Role::User);

        let user: User = serde_json::from_str(r#"{"id":"3","name":"c"}"#).unwrap();
        assert_eq!(user.role, Role::User);
    }

    #[test]
    fn test_require_admin() {
        let admin = Identity::User(User {
            id: "1".into(),
            name: None,
            role: Role::Admin,
        });
        let user = Identity::User(User {
            id: "2".into(),
            name: None,
            role: Role::User,
        });

        assert!(admin.require_admin().is_ok());
        assert!(matches!(user.require_admin(), Err(AppError::Unauthorized)));
        assert!(matches!(
            Identity::Anonymous.require_admin(),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_credentials_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("session=abc"));

        let credentials = Credentials::from_headers(&headers);
        assert_eq!(credentials.cookie.as_deref(), Some("session=abc"));
        assert!(credentials.authorization.is_none());
        assert!(!credentials.is_empty());

        assert!(Credentials::from_headers(&HeaderMap::new()).is_empty());
    }

    #[tokio::test]
    async fn test_no_credentials_skips_provider() {
        // unroutable endpoint, must not be contacted
        let auth = RemoteAuth::new(Client::new(), "http://127.0.0.1:9");

        assert_eq!(
            auth.identify(&Credentials::default()).await.unwrap(),
            Identity::Anonymous
        );
    }

    #[tokio::test]
    async fn test_silent_provider_is_timeout() {
        let client = Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let auth = RemoteAuth::new(client, &silent_server().await);

        for _ in 0..3 {
            assert!(matches!(
                auth.identify(&session()).await,
                Err(AppError::Timeout(Collaborator::Auth))
            ));
        }
    }

    #[tokio::test]
    async fn test_refused_connection_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let auth = RemoteAuth::new(Client::new(), &format!("http://{address}"));

        assert!(matches!(
            auth.identify(&session()).await,
            Err(AppError::Unavailable {
                collaborator: Collaborator::Auth,
                ..
            })
        ));
    }
}
