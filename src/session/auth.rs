//! Authentication endpoints.

use super::model::{AuthUser, Credentials, Institute, LoginResponse};
use crate::backend::CacheBackend;
use crate::client::{unwrap_data, CachedClient, Method, Transport};
use crate::config::BaseUrl;
use crate::error::Result;
use crate::key::Params;
use crate::strategy::{FetchStrategy, GetOptions};
use std::time::Duration;

pub const LOGIN: &str = "/auth/login";
pub const ME: &str = "/auth/me";
pub const LOGOUT: &str = "/auth/logout";

/// Institute memberships change rarely; cache them longer than other reads.
pub const INSTITUTES_TTL: Duration = Duration::from_secs(60 * 60);

pub fn user_institutes_endpoint(user_id: &str) -> String {
    format!("/users/{}/institutes", user_id)
}

/// Thin wrapper over the cached client for the auth flows.
pub struct AuthApi<B: CacheBackend, T: Transport> {
    client: CachedClient<B, T>,
}

impl<B: CacheBackend, T: Transport> Clone for AuthApi<B, T> {
    fn clone(&self) -> Self {
        AuthApi {
            client: self.client.clone(),
        }
    }
}

impl<B: CacheBackend, T: Transport> AuthApi<B, T> {
    pub fn new(client: CachedClient<B, T>) -> Self {
        AuthApi { client }
    }

    /// # Errors
    ///
    /// `Error::Unauthorized` for bad credentials, otherwise request errors.
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginResponse> {
        let value = self
            .client
            .http()
            .request(
                Method::Post,
                LOGIN,
                &Params::new(),
                Some(&serde_json::to_value(credentials)?),
                BaseUrl::Primary,
            )
            .await?;
        unwrap_data(value)
    }

    /// Current user from the session cookie or token. Never cached.
    ///
    /// # Errors
    ///
    /// `Error::Unauthorized` when there is no valid session.
    pub async fn me(&self) -> Result<AuthUser> {
        self.client
            .get_data(ME, &Params::new(), GetOptions::bypass())
            .await
    }

    /// # Errors
    ///
    /// Request errors.
    pub async fn logout(&self) -> Result<()> {
        self.client
            .http()
            .request(Method::Post, LOGOUT, &Params::new(), None, BaseUrl::Primary)
            .await?;
        Ok(())
    }

    /// Institute memberships of a user.
    ///
    /// # Errors
    ///
    /// Request errors, or `Error::DeserializationError` for an unexpected body.
    pub async fn user_institutes(
        &self,
        user_id: &str,
        strategy: FetchStrategy,
    ) -> Result<Vec<Institute>> {
        let options = GetOptions::default()
            .with_strategy(strategy)
            .with_ttl(INSTITUTES_TTL);
        self.client
            .get_data(&user_institutes_endpoint(user_id), &Params::new(), options)
            .await
    }
}
