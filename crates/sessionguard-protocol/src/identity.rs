//! Identities and refresh outcomes.
//!
//! The refresh endpoint answers with one of three things, and the whole
//! session core is built around keeping them apart:
//!
//! ```text
//! 2xx ──→ Success(Identity)        session continues, retry the request
//! 429 ──→ RateLimited { hint }     provider is throttling, try again later
//! ... ──→ Failure                  the session is gone, log out
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Codec, JsonCodec, ProtocolError};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The user/session descriptor returned by a successful refresh.
///
/// Sessionguard treats it as opaque: it is a JSON object whose fields
/// belong to the backend. Only two fields are ever read by the core:
/// [`subject`](Self::subject) for log lines, and
/// [`expires_in`](Self::expires_in) to size the next proactive renewal.
///
/// Subscribers receive identities by reference and clone whatever they
/// want to keep. Nothing in the core holds on to a published identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(Map<String, Value>);

impl Identity {
    /// Keys probed, in order, by [`subject`](Self::subject).
    const SUBJECT_KEYS: [&'static str; 4] = ["id", "sub", "user_id", "email"];

    /// Wraps an already-parsed JSON object.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Parses an identity from a response body.
    ///
    /// Some backends wrap the payload as `{ "user": { ... } }`; when the
    /// top-level object has a single `user` object field, that inner object
    /// is used.
    ///
    /// # Errors
    /// - [`ProtocolError::Decode`]: the body isn't valid JSON
    /// - [`ProtocolError::InvalidPayload`]: the JSON isn't an object
    pub fn from_bytes(body: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = JsonCodec.decode(body)?;
        match value {
            Value::Object(mut fields) => {
                if fields.len() == 1 && fields.get("user").is_some_and(Value::is_object) {
                    if let Some(Value::Object(inner)) = fields.remove("user") {
                        return Ok(Self(inner));
                    }
                }
                Ok(Self(fields))
            }
            other => Err(ProtocolError::InvalidPayload(format!(
                "identity must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Reads a raw field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// A human-readable subject for logs: the first of `id`, `sub`,
    /// `user_id`, `email` that holds a string or number.
    pub fn subject(&self) -> Option<String> {
        Self::SUBJECT_KEYS.iter().find_map(|key| match self.0.get(*key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Remaining access-token lifetime in seconds, if the backend sent one.
    pub fn expires_in(&self) -> Option<u64> {
        self.0.get("expires_in")?.as_u64()
    }

    /// All fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.subject() {
            Some(subject) => write!(f, "identity({subject})"),
            None => f.write_str("identity(anonymous)"),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// RefreshOutcome
// ---------------------------------------------------------------------------

/// The classified result of one refresh attempt.
///
/// Produced exactly once per attempt and then shared, unchanged, with
/// every caller that waited on that attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// The session was renewed.
    Success(Identity),

    /// The auth provider is throttling us. Transient: never a reason to
    /// log the user out.
    RateLimited {
        /// Value of the `Retry-After` header, when present and numeric.
        retry_after_secs: Option<u64>,
    },

    /// The refresh was rejected or never reached the server. The session
    /// can't be recovered.
    Failure,
}

impl RefreshOutcome {
    /// The variant without its payload.
    pub fn tag(&self) -> OutcomeTag {
        match self {
            Self::Success(_) => OutcomeTag::Success,
            Self::RateLimited { .. } => OutcomeTag::RateLimited,
            Self::Failure => OutcomeTag::Failure,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The renewed identity, for `Success` only.
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Success(identity) => Some(identity),
            _ => None,
        }
    }
}

/// Payload-free discriminant of [`RefreshOutcome`], handy in logs and
/// assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeTag {
    Success,
    RateLimited,
    Failure,
}

impl fmt::Display for OutcomeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::RateLimited => f.write_str("rate_limited"),
            Self::Failure => f.write_str("failure"),
        }
    }
}
