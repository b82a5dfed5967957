use std::time::Duration;

use async_trait::async_trait;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthorizationCode, CsrfToken, DeviceAuthorizationUrl, ErrorResponse, PkceCodeChallenge,
    RedirectUrl, RequestTokenError, Scope, StandardDeviceAuthorizationResponse, TokenResponse,
};
use oauth2::url::Url;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cloud::{host_of, Cloud};

use super::cache::{CachedAccessToken, CachedAccount, CachedRefreshToken};
use super::{
    decode_id_token, expiry_from, identity_client, normalize_scopes, AuthError,
    AuthenticationRecord, IdTokenClaims, IdentityClient, IdentityTokenResponse, TokenCache,
    AUTHENTICATION_RECORD_VERSION, OIDC_SCOPES, ORGANIZATIONS_TENANT, PUBLIC_CLIENT_ID,
};

const BROWSER_LOGIN_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// How long one browser connection may sit without sending a request.
const BROWSER_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REQUEST_HEAD: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFlow {
    /// Authorization code + PKCE through a loopback redirect.
    Browser,
    /// Code shown in the terminal, entered on another device.
    DeviceCode,
}

/// Produces an [`AuthenticationRecord`] by talking to the user.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self) -> Result<AuthenticationRecord, AuthError>;
}

/// One-time user-facing login. Never retries; the caller decides whether
/// to prompt again.
#[derive(Debug, Clone)]
pub struct InteractiveCredential {
    cache: TokenCache,
    cloud: &'static Cloud,
    tenant: String,
    client_id: String,
    flow: LoginFlow,
    timeout: Duration,
}

impl InteractiveCredential {
    pub fn new(cache: TokenCache, cloud: &'static Cloud, flow: LoginFlow) -> Self {
        Self {
            cache,
            cloud,
            tenant: ORGANIZATIONS_TENANT.to_string(),
            client_id: PUBLIC_CLIENT_ID.to_string(),
            flow,
            timeout: BROWSER_LOGIN_TIMEOUT,
        }
    }

    /// Sign in through a single tenant's authority instead of `organizations`.
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = tenant.into();
        self
    }

    fn requested_scopes(&self) -> Vec<Scope> {
        std::iter::once(self.cloud.resource_manager_scope)
            .chain(OIDC_SCOPES.iter().copied())
            .map(|scope| Scope::new(scope.to_string()))
            .collect()
    }

    fn client(&self) -> Result<IdentityClient, AuthError> {
        identity_client(self.cloud.authority_host, &self.tenant, &self.client_id)
    }

    async fn browser_login(&self) -> Result<IdentityTokenResponse, AuthError> {
        let listener = TcpListener::bind("127.0.0.1:0").await.map_err(|e| {
            AuthError::Interactive(format!("failed to bind local server for login redirect: {e}"))
        })?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::Interactive(format!("failed to read local server address: {e}")))?
            .port();
        let redirect_uri = RedirectUrl::new(format!("http://localhost:{port}"))
            .map_err(|e| AuthError::Configuration(format!("redirect uri: {e}")))?;
        let client = self.client()?.set_redirect_uri(redirect_uri);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, csrf_state) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.requested_scopes())
            .set_pkce_challenge(pkce_challenge)
            .add_extra_param("prompt", "select_account")
            .url();

        eprintln!("Opening browser for authentication...");
        eprintln!("If browser doesn't open, visit: {auth_url}");
        if let Err(e) = open::that(auth_url.as_str()) {
            warn!(error = %e, "failed to open browser");
        }

        let redirect = tokio::time::timeout(self.timeout, receive_redirect(listener))
            .await
            .map_err(|_| AuthError::Interactive("timed out waiting for the browser login".into()))??;

        if let Some(error) = redirect.error {
            let description = redirect.error_description.unwrap_or_default();
            return Err(AuthError::Interactive(format!("{error}: {description}")));
        }
        if redirect.state.as_deref() != Some(csrf_state.secret().as_str()) {
            return Err(AuthError::Interactive(
                "login redirect carried an unexpected state parameter".into(),
            ));
        }
        let code = redirect.code.ok_or_else(|| {
            AuthError::Interactive("login redirect carried no authorization code".into())
        })?;

        client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(async_http_client)
            .await
            .map_err(login_failure)
    }

    async fn device_code_login(&self) -> Result<IdentityTokenResponse, AuthError> {
        let device_url = DeviceAuthorizationUrl::new(format!(
            "{}/oauth2/v2.0/devicecode",
            self.cloud.authority_for(&self.tenant)
        ))
        .map_err(|e| AuthError::Configuration(format!("device code endpoint: {e}")))?;
        let client = self.client()?.set_device_authorization_url(device_url);

        let details: StandardDeviceAuthorizationResponse = client
            .exchange_device_code()
            .map_err(|e| AuthError::Configuration(e.to_string()))?
            .add_scopes(self.requested_scopes())
            .request_async(async_http_client)
            .await
            .map_err(login_failure)?;

        eprintln!(
            "To sign in, open {} and enter the code {}",
            details.verification_uri().url().as_str(),
            details.user_code().secret()
        );

        client
            .exchange_device_access_token(&details)
            .request_async(async_http_client, tokio::time::sleep, None)
            .await
            .map_err(login_failure)
    }

    /// Write what the token endpoint returned into the cache and describe
    /// where it lives.
    fn remember(&self, response: &IdentityTokenResponse) -> Result<AuthenticationRecord, AuthError> {
        let id_token = response
            .extra_fields()
            .id_token
            .as_deref()
            .ok_or_else(|| AuthError::Interactive("token response carried no id_token".into()))?;
        let claims = decode_id_token(id_token)?;
        let record = record_from_claims(&claims, self.cloud.authority_host, &self.client_id)?;

        let refresh_token = response
            .refresh_token()
            .ok_or_else(|| {
                AuthError::Interactive("token response carried no refresh token".into())
            })?
            .secret()
            .clone();
        let environment = host_of(&record.authority).to_string();
        let target = normalize_scopes(&[self.cloud.resource_manager_scope]);
        let access_token = response.access_token().secret().clone();
        let expires_on = expiry_from(response.expires_in());

        self.cache.update(|state| {
            state.upsert_account(CachedAccount {
                home_account_id: record.home_account_id.clone(),
                environment: environment.clone(),
                realm: record.tenant_id.clone(),
                username: record.username.clone(),
            });
            state.upsert_refresh_token(CachedRefreshToken {
                home_account_id: record.home_account_id.clone(),
                environment: environment.clone(),
                client_id: self.client_id.clone(),
                secret: refresh_token,
            });
            state.upsert_access_token(CachedAccessToken {
                home_account_id: record.home_account_id.clone(),
                environment,
                realm: self.tenant.clone(),
                target,
                secret: access_token,
                expires_on,
            });
        })?;

        debug!(username = %record.username, home_tenant = %record.tenant_id, "login cached");
        Ok(record)
    }
}

#[async_trait]
impl Authenticator for InteractiveCredential {
    async fn authenticate(&self) -> Result<AuthenticationRecord, AuthError> {
        let response = match self.flow {
            LoginFlow::Browser => self.browser_login().await?,
            LoginFlow::DeviceCode => self.device_code_login().await?,
        };
        self.remember(&response)
    }
}

fn login_failure<RE, TE>(err: RequestTokenError<RE, TE>) -> AuthError
where
    RE: std::error::Error + 'static,
    TE: ErrorResponse + 'static,
{
    match err {
        RequestTokenError::Request(e) => AuthError::Transport {
            context: "login token request".to_string(),
            message: e.to_string(),
        },
        other => AuthError::Interactive(other.to_string()),
    }
}

pub fn record_from_claims(
    claims: &IdTokenClaims,
    authority: &str,
    client_id: &str,
) -> Result<AuthenticationRecord, AuthError> {
    let (Some(oid), Some(tid)) = (claims.oid.as_deref(), claims.tid.as_deref()) else {
        return Err(AuthError::Interactive(
            "id_token is missing the oid or tid claim".into(),
        ));
    };

    Ok(AuthenticationRecord {
        authority: authority.to_string(),
        home_account_id: format!("{oid}.{tid}"),
        tenant_id: tid.to_string(),
        username: claims.username().unwrap_or(oid).to_string(),
        client_id: client_id.to_string(),
        version: AUTHENTICATION_RECORD_VERSION.to_string(),
    })
}

#[derive(Debug, Default, PartialEq, Eq)]
struct RedirectParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Serve the loopback redirect until one request carries `code` or `error`.
/// Browsers also open idle preconnect sockets and ask for `/favicon.ico`;
/// every connection is answered on its own task so none of them can stall
/// the real redirect.
async fn receive_redirect(listener: TcpListener) -> Result<RedirectParams, AuthError> {
    let (found, mut redirects) = mpsc::channel(1);
    loop {
        tokio::select! {
            Some(params) = redirects.recv() => return Ok(params),
            accepted = listener.accept() => {
                let (stream, peer) = accepted.map_err(|e| {
                    AuthError::Interactive(format!("login redirect listener failed: {e}"))
                })?;
                debug!(%peer, "browser connected to the redirect listener");
                let found = found.clone();
                tokio::spawn(async move {
                    if let Some(params) = answer_browser(stream).await {
                        let _ = found.send(params).await;
                    }
                });
            }
        }
    }
}

async fn answer_browser(mut stream: TcpStream) -> Option<RedirectParams> {
    let head = match tokio::time::timeout(BROWSER_IDLE_TIMEOUT, read_request_head(&mut stream)).await {
        Ok(Ok(head)) => head,
        Ok(Err(e)) => {
            debug!(error = %e, "failed to read from browser connection");
            return None;
        }
        Err(_) => return None,
    };

    let params = parse_redirect_request(&head);
    let response = match &params {
        None => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
        Some(params) => {
            let body = if params.error.is_some() {
                "<html><body><h1>Authentication failed.</h1>\
                 <p>Return to the terminal for details.</p></body></html>"
            } else {
                "<html><body><h1>Authentication successful!</h1>\
                 <p>You can close this window and return to the terminal.</p></body></html>"
            };
            format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
        }
    };
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!(error = %e, "failed to answer the browser");
    }
    let _ = stream.shutdown().await;
    params
}

/// Request line and headers; the redirect never has a body.
async fn read_request_head(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while head.len() < MAX_REQUEST_HEAD && !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

/// Parse `GET /?code=...&state=... HTTP/1.1`. Anything without `code` or
/// `error` is not the redirect.
fn parse_redirect_request(request: &str) -> Option<RedirectParams> {
    let mut request_line = request.lines().next()?.split_whitespace();
    if request_line.next()? != "GET" {
        return None;
    }
    let target = Url::parse("http://localhost/").ok()?.join(request_line.next()?).ok()?;

    let mut params = RedirectParams::default();
    for (key, value) in target.query_pairs() {
        let slot = match key.as_ref() {
            "code" => &mut params.code,
            "state" => &mut params.state,
            "error" => &mut params.error,
            "error_description" => &mut params.error_description,
            _ => continue,
        };
        *slot = Some(value.into_owned());
    }

    (params.code.is_some() || params.error.is_some()).then_some(params)
}
