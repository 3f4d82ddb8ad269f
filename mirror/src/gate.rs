//! Authorization gate in front of git's smart-HTTP transport.
//!
//! Every request is classified as a read (clone, fetch) or a write (push).
//! Reads are always allowed and never look at credentials. Writes need HTTP
//! Basic credentials of a user allowed to edit the page the repository mirrors.
//!
//! | situation                                  | decision                 |
//! |--------------------------------------------|--------------------------|
//! | no proxy marker                            | pass-through             |
//! | read                                       | 200                      |
//! | write, no or malformed `Authorization`     | 401 + `WWW-Authenticate` |
//! | write, unknown user or wrong password      | 401 + `WWW-Authenticate` |
//! | write, page unknown or not editable        | 403                      |
//! | write, allowed                             | 200                      |

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use history::{Entity, IdentityProvider, PermissionProvider, UserId};
use regex::Regex;
use std::fmt;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::{debug, info};

/// Value of the `WWW-Authenticate` challenge sent with a 401
pub const BASIC_CHALLENGE: &str = "Basic";

const RECEIVE_PACK: &str = "git-receive-pack";

/// Smart-HTTP endpoints below a repository path
static PROTOCOL_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^/(.+)/(HEAD|info/refs|objects/info/[^/]+|objects/[0-9a-f]{2}/[0-9a-f]{38}|objects/pack/pack-[0-9a-f]{40}\.(pack|idx)|git-(receive|upload)-pack)$",
    )
    .expect("protocol suffix pattern is valid")
});

/// The parts of an HTTP request the gate looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateRequest {
    /// Original smart-HTTP URI set by the proxy, `None` for direct access
    pub original_uri: Option<String>,
    pub authorization: Option<String>,
}

impl GateRequest {
    pub fn new(original_uri: impl Into<String>) -> Self {
        Self {
            original_uri: Some(original_uri.into()),
            authorization: None,
        }
    }

    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Writes are receive-pack requests, by path or by `service` query parameter.
///
/// Path and parameters are percent-decoded first; anything that does not
/// decode is classified as a write.
pub fn classify(uri: &str) -> Access {
    let (path, query) = split_query(uri);
    let Ok(path) = urlencoding::decode(path) else {
        return Access::Write;
    };
    if path.ends_with(&format!("/{RECEIVE_PACK}")) {
        return Access::Write;
    }

    for param in query.into_iter().flat_map(|query| query.split('&')) {
        let Ok(param) = urlencoding::decode(param) else {
            return Access::Write;
        };
        if param.split_once('=') == Some(("service", RECEIVE_PACK)) {
            return Access::Write;
        }
    }
    Access::Read
}

/// Page addressed by a smart-HTTP URI, e.g. `/Main_Page/info/refs?service=...`
pub fn resolve_entity(uri: &str) -> Option<Entity> {
    let (path, _) = split_query(uri);
    let path = urlencoding::decode(path).ok()?;
    let captures = PROTOCOL_SUFFIX.captures(&path)?;
    let entity = Entity::new(captures.get(1)?.as_str());
    if entity.key().is_empty() {
        None
    } else {
        Some(entity)
    }
}

fn split_query(uri: &str) -> (&str, Option<&str>) {
    match uri.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (uri, None),
    }
}

/// Username and password from an HTTP Basic `Authorization` header
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Decode `Basic <base64(user:pass)>`; `None` for anything else
pub fn parse_basic(header: &str) -> Option<Credentials> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some(Credentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Reasons a write is refused. The messages are for logs only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("Authentication required")]
    Authentication,

    #[error("User '{user}' may not edit '{entity}'")]
    Authorization { user: String, entity: String },
}

impl GateError {
    pub fn status(&self) -> u16 {
        match self {
            GateError::Authentication => 401,
            GateError::Authorization { .. } => 403,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Not routed through the proxy; the gate takes no decision
    PassThrough,
    ReadAllowed,
    Authorized { user: UserId, entity: Entity },
    Rejected(GateError),
}

impl GateDecision {
    /// HTTP status to answer with, `None` for pass-through
    pub fn status(&self) -> Option<u16> {
        match self {
            GateDecision::PassThrough => None,
            GateDecision::ReadAllowed | GateDecision::Authorized { .. } => Some(200),
            GateDecision::Rejected(error) => Some(error.status()),
        }
    }

    /// Whether the response carries a `WWW-Authenticate: Basic` challenge
    pub fn challenge(&self) -> bool {
        matches!(self, GateDecision::Rejected(GateError::Authentication))
    }
}

/// Stateless per-request authorizer
#[derive(Clone)]
pub struct TransportGate {
    identities: Arc<dyn IdentityProvider>,
    permissions: Arc<dyn PermissionProvider>,
}

impl TransportGate {
    pub fn new(
        identities: Arc<dyn IdentityProvider>,
        permissions: Arc<dyn PermissionProvider>,
    ) -> Self {
        Self {
            identities,
            permissions,
        }
    }

    pub async fn decide(&self, request: &GateRequest) -> GateDecision {
        let Some(uri) = request.original_uri.as_deref() else {
            return GateDecision::PassThrough;
        };

        if classify(uri) == Access::Read {
            debug!(uri, "Read request allowed");
            return GateDecision::ReadAllowed;
        }

        match self.authorize_write(uri, request.authorization.as_deref()).await {
            Ok((user, entity)) => {
                info!(user = %user, entity = %entity, "Push authorized");
                GateDecision::Authorized { user, entity }
            }
            Err(error) => {
                info!(uri, error = %error, "Push refused");
                GateDecision::Rejected(error)
            }
        }
    }

    async fn authorize_write(
        &self,
        uri: &str,
        authorization: Option<&str>,
    ) -> Result<(UserId, Entity), GateError> {
        let credentials = authorization
            .and_then(parse_basic)
            .ok_or(GateError::Authentication)?;

        let user = self
            .identities
            .resolve_user(&credentials.username)
            .await
            .ok_or(GateError::Authentication)?;
        if !self
            .identities
            .check_password(&user, &credentials.password)
            .await
        {
            return Err(GateError::Authentication);
        }

        let Some(entity) = resolve_entity(uri) else {
            return Err(GateError::Authorization {
                user: user.to_string(),
                entity: uri.to_string(),
            });
        };
        if !self.permissions.can_edit(&user, &entity).await {
            return Err(GateError::Authorization {
                user: user.to_string(),
                entity: entity.to_string(),
            });
        }

        Ok((user, entity))
    }
}
