//! Anonymous pull tokens
//!
//! Reference: <https://docs.docker.com/registry/spec/auth/token/>

use crate::{errors::PullError, image::Repository};
use reqwest::RequestBuilder;
use std::fmt;

/// Bearer token allowing pulls from one repository
///
/// Tokens only live for one run and are never logged; the [fmt::Debug]
/// output is redacted.
#[derive(Clone, Eq, PartialEq)]
pub struct Token(String);

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl Token {
    /// Wrap a bearer token string
    pub fn new<S: Into<String>>(token: S) -> Self {
        Token(token.into())
    }

    /// Parse the JSON body returned by the token endpoint
    ///
    /// Servers may use either `token` or the OAuth2 name `access_token`. A
    /// response with neither, or with an empty string, carries no token.
    pub fn from_response(body: &[u8]) -> Result<Option<Self>, PullError> {
        let response: TokenResponse = serde_json::from_slice(body)?;
        Ok(response
            .token
            .or(response.access_token)
            .filter(|token| !token.is_empty())
            .map(Token))
    }

    /// Attach this token to a request
    pub fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.0)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(..)")
    }
}

/// Scope string asking for pull access to a repository
pub fn pull_scope(repository: &Repository) -> String {
    format!("repository:{}:pull", repository)
}
