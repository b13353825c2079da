use crate::api_base;
use crate::error::RegistryError;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;
use tsugi_domain::credential::{AuthMethod, RegistryCredential};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    // Some registries use this instead of `token`.
    access_token: Option<String>,
}

/// A parsed `Www-Authenticate: Bearer ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub realm: String,
    pub service: Option<String>,
}

/// One auth decision for a registry host, shared by every image on that
/// host during a batch run.
#[derive(Debug, Clone)]
pub struct ResolvedAuth {
    pub token: Option<String>,
    pub method: AuthMethod,
    pub username: Option<String>,
    pub registry: Option<String>,
    pub used_credential: bool,
}

impl ResolvedAuth {
    /// The registry required no auth at all.
    pub fn open() -> Self {
        Self {
            token: None,
            method: AuthMethod::None,
            username: None,
            registry: None,
            used_credential: false,
        }
    }

    pub fn bearer(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }
}

/// Parse the Bearer challenge into realm/service key-value pairs.
pub fn parse_www_authenticate(header: &str) -> Option<AuthChallenge> {
    let rest = header.trim().strip_prefix("Bearer ")?;
    let mut realm = None;
    let mut service = None;
    for part in rest.split(',') {
        let (key, value) = part.trim().split_once('=')?;
        let value = value.trim_matches('"');
        match key.trim() {
            "realm" => realm = Some(value.to_string()),
            "service" => service = Some(value.to_string()),
            _ => {}
        }
    }
    Some(AuthChallenge {
        realm: realm?,
        service,
    })
}

/// Probes registries for auth requirements and obtains bearer tokens,
/// anonymous or credentialed.
#[derive(Clone)]
pub struct AuthResolver {
    client: Client,
}

impl AuthResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Issue an unauthenticated probe against `/v2/`. `None` means the
    /// registry needs no auth; `Some` carries the bearer challenge.
    pub async fn check_auth(&self, host: &str) -> Result<Option<AuthChallenge>, RegistryError> {
        let url = format!("{}/v2/", api_base(host));
        let resp = self.client.get(&url).send().await?;

        if resp.status() != StatusCode::UNAUTHORIZED {
            debug!(host, status = %resp.status(), "registry probe: no auth required");
            return Ok(None);
        }

        let header = resp
            .headers()
            .get(reqwest::header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| RegistryError::ChallengeUnparsable(host.to_string()))?;
        let challenge = parse_www_authenticate(header)
            .ok_or_else(|| RegistryError::ChallengeUnparsable(header.to_string()))?;
        Ok(Some(challenge))
    }

    /// Token for a single repository. Anonymous first (the common public
    /// image case), then each enabled credential stored for this host.
    pub async fn get_token(
        &self,
        challenge: &AuthChallenge,
        host: &str,
        repository: &str,
        credentials: &[RegistryCredential],
    ) -> Result<ResolvedAuth, RegistryError> {
        let repositories = [repository.to_string()];
        self.get_token_multi(challenge, host, &repositories, credentials)
            .await
    }

    /// Token scoped to several repositories in one request, so a batch of
    /// images on one registry costs one token round trip.
    pub async fn get_token_multi(
        &self,
        challenge: &AuthChallenge,
        host: &str,
        repositories: &[String],
        credentials: &[RegistryCredential],
    ) -> Result<ResolvedAuth, RegistryError> {
        if let Ok(token) = self.request_token(challenge, repositories, None).await {
            return Ok(ResolvedAuth {
                token: Some(token),
                method: AuthMethod::Anonymous,
                username: None,
                registry: Some(host.to_string()),
                used_credential: false,
            });
        }

        for cred in credentials.iter().filter(|c| c.matches_host(host)) {
            let password = match cred.decrypt_token() {
                Ok(p) => p,
                Err(e) => {
                    debug!(host, username = %cred.username, error = %e, "skipping undecodable credential");
                    continue;
                }
            };
            match self
                .request_token(challenge, repositories, Some((&cred.username, &password)))
                .await
            {
                Ok(token) => {
                    return Ok(ResolvedAuth {
                        token: Some(token),
                        method: AuthMethod::Credential,
                        username: Some(cred.username.clone()),
                        registry: Some(host.to_string()),
                        used_credential: true,
                    })
                }
                Err(e) => {
                    debug!(host, username = %cred.username, error = %e, "credentialed token request failed");
                }
            }
        }

        Err(RegistryError::AuthenticationFailed(host.to_string()))
    }

    /// Full re-resolution used for the one-shot retry after a 401 during a
    /// digest fetch: probe again and try the complete credential list.
    pub async fn authorization_for(
        &self,
        host: &str,
        repository: &str,
        credentials: &[RegistryCredential],
    ) -> Result<Option<String>, RegistryError> {
        match self.check_auth(host).await? {
            None => Ok(None),
            Some(challenge) => {
                let auth = self.get_token(&challenge, host, repository, credentials).await?;
                Ok(auth.bearer())
            }
        }
    }

    async fn request_token(
        &self,
        challenge: &AuthChallenge,
        repositories: &[String],
        basic: Option<(&str, &str)>,
    ) -> Result<String, RegistryError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(service) = &challenge.service {
            query.push(("service", service.clone()));
        }
        for repo in repositories {
            query.push(("scope", format!("repository:{}:pull", repo)));
        }

        let mut req = self.client.get(&challenge.realm).query(&query);
        if let Some((user, pass)) = basic {
            req = req.basic_auth(user, Some(pass));
        }
        let resp = req.send().await?;

        if !resp.status().is_success() {
            return Err(RegistryError::AuthenticationFailed(format!(
                "Status: {}",
                resp.status()
            )));
        }

        let token_resp: TokenResponse = resp.json().await?;
        token_resp
            .token
            .or(token_resp.access_token)
            .ok_or_else(|| RegistryError::AuthenticationFailed("empty token response".to_string()))
    }
}
