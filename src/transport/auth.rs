//! Credentials attached to outgoing requests.

use super::PreparedRequest;
use crate::Result;
use base64::Engine as _;
use std::fmt;

const AUTHORIZATION: &str = "Authorization";

/// Applies credentials to a request just before it is sent.
///
/// The request's headers are already merged, so an authenticator has the
/// final say over them. Cache keys are derived earlier and never see the
/// credentials.
pub trait Authenticator: Send + Sync {
    fn apply(&self, request: &mut PreparedRequest) -> Result<()>;

    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Replace any `Authorization` header, whatever its spelling.
pub fn set_authorization(request: &mut PreparedRequest, value: String) {
    request
        .headers
        .retain(|k, _| !k.eq_ignore_ascii_case(AUTHORIZATION));
    request.headers.insert(AUTHORIZATION.to_string(), value);
}

/// HTTP basic authentication.
#[derive(Clone)]
pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn header_value(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(raw))
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Authenticator for BasicAuth {
    fn apply(&self, request: &mut PreparedRequest) -> Result<()> {
        set_authorization(request, self.header_value());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "basic"
    }
}

/// Bearer token authentication.
#[derive(Clone)]
pub struct BearerAuth {
    token: String,
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuth").field("token", &"***").finish()
    }
}

impl Authenticator for BearerAuth {
    fn apply(&self, request: &mut PreparedRequest) -> Result<()> {
        set_authorization(request, format!("Bearer {}", self.token));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "bearer"
    }
}
