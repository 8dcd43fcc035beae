//! Client builder, used by the authorization code and refresh token
//! flows to send requests and build URLs.

use std::ops::Deref;

use chrono::{Duration, Utc};
use oauth2::{
    basic::BasicTokenResponse,
    http::{Method, Response},
    url::Url,
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    HttpRequest, HttpResponse, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken,
    Scope, TokenResponse, TokenUrl,
};
use tracing::debug;

use crate::{token::OAuthToken, Error, Result};

type BasicClient = oauth2::basic::BasicClient<
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// The OAuth 2.0 client configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OAuthConfig {
    /// Client identifier issued to the client during the registration
    /// process described by
    /// [Section 2.2](https://datatracker.ietf.org/doc/html/rfc6749#section-2.2).
    pub client_id: String,

    /// Client password issued to the client during the registration
    /// process described by
    /// [Section 2.2](https://datatracker.ietf.org/doc/html/rfc6749#section-2.2).
    pub client_secret: Option<String>,

    /// URL of the authorization server's authorization endpoint.
    pub auth_url: String,

    /// URL of the authorization server's token endpoint.
    pub token_url: String,

    /// URL of the client's redirection endpoint.
    pub redirect_url: String,

    /// Access token scope(s), as defined by the authorization server.
    pub scopes: Vec<String>,

    /// Enable the [PKCE](https://datatracker.ietf.org/doc/html/rfc7636)
    /// protection.
    pub pkce: bool,
}

/// Client used by the flows to send requests and build URLs.
#[derive(Clone, Debug)]
pub struct Client {
    inner: BasicClient,
    pkce: bool,
    scopes: Vec<String>,
}

impl Client {
    pub fn new(config: OAuthConfig) -> Result<Self> {
        let mut client = oauth2::basic::BasicClient::new(ClientId::new(config.client_id))
            .set_auth_uri(AuthUrl::new(config.auth_url).map_err(Error::BuildAuthUrlError)?)
            .set_token_uri(TokenUrl::new(config.token_url).map_err(Error::BuildTokenUrlError)?)
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_url).map_err(Error::BuildRedirectUrlError)?,
            );

        if let Some(secret) = config.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret));
        }

        Ok(Self {
            inner: client,
            pkce: config.pkce,
            scopes: config.scopes,
        })
    }

    /// Starts a new authorization code grant flow.
    pub fn authorization_code_grant(&self) -> AuthorizationCodeGrant {
        let mut grant = AuthorizationCodeGrant::new();

        if self.pkce {
            grant = grant.with_pkce();
        }

        for scope in self.scopes.clone() {
            grant = grant.with_scope(scope);
        }

        grant
    }

    /// Exchanges a refresh token for a new pair of access and refresh
    /// tokens.
    ///
    /// The previous refresh token is preserved when the authorization
    /// server omits a new one from its response.
    pub async fn refresh(&self, token: &OAuthToken) -> Result<OAuthToken> {
        let refresh_token = token
            .refresh_token
            .as_ref()
            .ok_or(Error::MissingRefreshTokenError)?;

        let res = self
            .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
            .request_async(&Client::send_oauth2_request)
            .await
            .map_err(Box::new)
            .map_err(Error::RefreshAccessTokenError)?;

        let mut refreshed = into_token(res);

        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = token.refresh_token.clone();
        }

        debug!("refreshed access token");

        Ok(refreshed)
    }

    pub(crate) async fn send_oauth2_request(oauth2_request: HttpRequest) -> Result<HttpResponse> {
        let agent = ureq::Agent::new_with_defaults();

        let response = spawn_blocking(move || match *oauth2_request.method() {
            Method::GET => {
                let mut request = agent.get(&oauth2_request.uri().to_string());

                for (key, val) in oauth2_request.headers() {
                    let Ok(val) = val.to_str() else {
                        continue;
                    };

                    request = request.header(key, val);
                }

                request.call().map_err(Error::SendRequestError)
            }
            Method::POST => {
                let mut request = agent.post(&oauth2_request.uri().to_string());

                for (key, val) in oauth2_request.headers() {
                    let Ok(val) = val.to_str() else {
                        continue;
                    };

                    request = request.header(key, val);
                }

                request
                    .send(oauth2_request.body())
                    .map_err(Error::SendRequestError)
            }
            _ => unreachable!(),
        })
        .await??;

        let mut oauth2_response = Response::builder();

        for (key, val) in response.headers() {
            oauth2_response = oauth2_response.header(key, val);
        }

        let body = response
            .into_body()
            .read_to_vec()
            .map_err(Error::SendRequestError)?;

        let oauth2_response = oauth2_response
            .body(body)
            .map_err(Error::ReadResponseBodyError)?;

        Ok(oauth2_response)
    }
}

impl Deref for Client {
    type Target = BasicClient;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// OAuth 2.0 Authorization Code Grant flow builder, as defined in the
/// [RFC6749](https://datatracker.ietf.org/doc/html/rfc6749#section-4.1).
///
/// The builder gathers the requested scopes and the optional PKCE
/// challenge, builds the authorization URL and exchanges the received
/// authorization code for a token.
#[derive(Debug, Default)]
pub struct AuthorizationCodeGrant {
    scopes: Vec<Scope>,
    pkce: Option<(PkceCodeChallenge, PkceCodeVerifier)>,
}

impl AuthorizationCodeGrant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scope(mut self, scope: impl ToString) -> Self {
        self.scopes.push(Scope::new(scope.to_string()));
        self
    }

    pub fn with_pkce(mut self) -> Self {
        self.pkce = Some(PkceCodeChallenge::new_random_sha256());
        self
    }

    /// Builds the authorization URL the resource owner needs to visit,
    /// bound to the given state. Pure construction, no request is sent.
    pub fn authorization_url(&self, client: &Client, state: impl ToString) -> (Url, CsrfToken) {
        let state = state.to_string();
        let mut url_builder = client.authorize_url(move || CsrfToken::new(state));

        for scope in self.scopes.iter().cloned() {
            url_builder = url_builder.add_scope(scope);
        }

        if let Some((challenge, _)) = &self.pkce {
            url_builder = url_builder.set_pkce_challenge(challenge.clone());
        }

        url_builder.url()
    }

    /// Exchanges the authorization code received on the redirection
    /// endpoint for a token.
    ///
    /// The granted scope is implicit from the authorization, so none
    /// is sent with this call.
    pub async fn exchange_code(&self, client: &Client, code: impl ToString) -> Result<OAuthToken> {
        let mut exchange = client.exchange_code(AuthorizationCode::new(code.to_string()));

        if let Some((_, verifier)) = &self.pkce {
            exchange = exchange.set_pkce_verifier(PkceCodeVerifier::new(verifier.secret().clone()));
        }

        let res = exchange
            .request_async(&Client::send_oauth2_request)
            .await
            .map_err(Box::new)
            .map_err(Error::ExchangeCodeError)?;

        Ok(into_token(res))
    }
}

fn into_token(res: BasicTokenResponse) -> OAuthToken {
    OAuthToken {
        access_token: res.access_token().secret().clone(),
        refresh_token: res.refresh_token().map(|token| token.secret().clone()),
        expires_at: res
            .expires_in()
            .and_then(|duration| Duration::from_std(duration).ok())
            .map(|duration| Utc::now() + duration),
        scopes: res
            .scopes()
            .map(|scopes| scopes.iter().map(|scope| scope.to_string()).collect())
            .unwrap_or_default(),
    }
}

/// Spawns a blocking task using [`async_std`].
#[cfg(feature = "async-std")]
async fn spawn_blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(async_std::task::spawn_blocking(f).await)
}

/// Spawns a blocking task using [`tokio`].
#[cfg(feature = "tokio")]
async fn spawn_blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await?)
}
