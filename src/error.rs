//! Error taxonomy.
//!
//! Everything that can go wrong falls into one of two arms: a [`Problem`]
//! document signaled by the CA (see [RFC 8555 §6.7]), or a plain message for
//! decode failures, solver failures and transport faults.
//!
//! [RFC 8555 §6.7]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.7

use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Any failure produced by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A problem document returned by the ACME provider.
    #[error(transparent)]
    Problem(#[from] Problem),

    /// Anything else: JSON decode failures, solver failures, I/O faults.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Returns true if the CA rejected our anti-replay nonce.
    pub fn is_bad_nonce(&self) -> bool {
        matches!(self, Error::Problem(problem) if problem.kind == ProblemKind::BadNonce)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Error {
        Error::Msg(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Msg(err.to_string())
    }
}

/// An RFC 7807 problem document with the `type` URN resolved against the ACME
/// error registry.
///
/// # Example JSON
///
/// ```json
/// {
///   "type": "urn:ietf:params:acme:error:userActionRequired",
///   "detail": "Terms of service have changed",
///   "instance": "https://example.com/acme/agreement/?token=W8Ih3PswD-8"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub kind: ProblemKind,

    #[serde(default)]
    pub detail: Option<String>,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Problem {}

/// The registered ACME error types, i.e. the part of a problem document's
/// `type` URI after `urn:ietf:params:acme:error:`.
///
/// See [RFC 8555 §6.7]. The set is closed: a URN outside it fails decode, so
/// registry drift surfaces instead of being mislabeled.
///
/// [RFC 8555 §6.7]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.7
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemKind {
    AccountDoesNotExist,
    AlreadyRevoked,
    BadCsr,
    BadNonce,
    BadPublicKey,
    BadRevocationReason,
    BadSignatureAlgorithm,
    Caa,
    Connection,
    Dns,
    ExternalAccountRequired,
    IncorrectResponse,
    InvalidContact,
    Malformed,
    OrderNotReady,
    RateLimited,
    RejectedIdentifier,
    ServerInternal,
    Tls,
    Unauthorized,
    UnsupportedContact,
    UnsupportedIdentifier,
    UserActionRequired,
}

const URN_PREFIX: &str = "urn:ietf:params:acme:error:";

/// Pre-RFC namespace still emitted by some older ACME endpoints.
const LEGACY_URN_PREFIX: &str = "urn:acme:error:";

impl ProblemKind {
    fn suffix(self) -> &'static str {
        match self {
            ProblemKind::AccountDoesNotExist => "accountDoesNotExist",
            ProblemKind::AlreadyRevoked => "alreadyRevoked",
            ProblemKind::BadCsr => "badCSR",
            ProblemKind::BadNonce => "badNonce",
            ProblemKind::BadPublicKey => "badPublicKey",
            ProblemKind::BadRevocationReason => "badRevocationReason",
            ProblemKind::BadSignatureAlgorithm => "badSignatureAlgorithm",
            ProblemKind::Caa => "caa",
            ProblemKind::Connection => "connection",
            ProblemKind::Dns => "dns",
            ProblemKind::ExternalAccountRequired => "externalAccountRequired",
            ProblemKind::IncorrectResponse => "incorrectResponse",
            ProblemKind::InvalidContact => "invalidContact",
            ProblemKind::Malformed => "malformed",
            ProblemKind::OrderNotReady => "orderNotReady",
            ProblemKind::RateLimited => "rateLimited",
            ProblemKind::RejectedIdentifier => "rejectedIdentifier",
            ProblemKind::ServerInternal => "serverInternal",
            ProblemKind::Tls => "tls",
            ProblemKind::Unauthorized => "unauthorized",
            ProblemKind::UnsupportedContact => "unsupportedContact",
            ProblemKind::UnsupportedIdentifier => "unsupportedIdentifier",
            ProblemKind::UserActionRequired => "userActionRequired",
        }
    }
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{URN_PREFIX}{}", self.suffix())
    }
}

impl FromStr for ProblemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let suffix = s
            .strip_prefix(URN_PREFIX)
            .or_else(|| s.strip_prefix(LEGACY_URN_PREFIX))
            .ok_or_else(|| format!("unknown problem type {s}"))?;

        Ok(match suffix {
            "accountDoesNotExist" => ProblemKind::AccountDoesNotExist,
            "alreadyRevoked" => ProblemKind::AlreadyRevoked,
            "badCSR" => ProblemKind::BadCsr,
            "badNonce" => ProblemKind::BadNonce,
            "badPublicKey" => ProblemKind::BadPublicKey,
            "badRevocationReason" => ProblemKind::BadRevocationReason,
            "badSignatureAlgorithm" => ProblemKind::BadSignatureAlgorithm,
            "caa" => ProblemKind::Caa,
            "connection" => ProblemKind::Connection,
            "dns" => ProblemKind::Dns,
            "externalAccountRequired" => ProblemKind::ExternalAccountRequired,
            "incorrectResponse" => ProblemKind::IncorrectResponse,
            "invalidContact" => ProblemKind::InvalidContact,
            "malformed" => ProblemKind::Malformed,
            "orderNotReady" => ProblemKind::OrderNotReady,
            "rateLimited" => ProblemKind::RateLimited,
            "rejectedIdentifier" => ProblemKind::RejectedIdentifier,
            "serverInternal" => ProblemKind::ServerInternal,
            "tls" => ProblemKind::Tls,
            "unauthorized" => ProblemKind::Unauthorized,
            "unsupportedContact" => ProblemKind::UnsupportedContact,
            "unsupportedIdentifier" => ProblemKind::UnsupportedIdentifier,
            "userActionRequired" => ProblemKind::UserActionRequired,
            _ => return Err(format!("unknown problem type {s}")),
        })
    }
}

impl<'de> Deserialize<'de> for ProblemKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_decode() {
        let problem = serde_json::from_str::<Problem>(
            r#"{"type":"urn:ietf:params:acme:error:badNonce","detail":"stale nonce"}"#,
        )
        .unwrap();

        assert_eq!(problem.kind, ProblemKind::BadNonce);
        assert_eq!(problem.detail.as_deref(), Some("stale nonce"));
        assert_eq!(
            problem.to_string(),
            "urn:ietf:params:acme:error:badNonce: stale nonce"
        );
    }

    #[test]
    fn test_problem_decode_legacy_namespace() {
        let problem =
            serde_json::from_str::<Problem>(r#"{"type":"urn:acme:error:malformed"}"#).unwrap();

        assert_eq!(problem.kind, ProblemKind::Malformed);
        assert_eq!(problem.detail, None);
    }

    #[test]
    fn test_problem_decode_unknown_type() {
        let err = serde_json::from_str::<Problem>(
            r#"{"type":"urn:ietf:params:acme:error:quantumTunneling"}"#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("unknown problem type"), "{err}");
    }

    #[test]
    fn test_problem_kind_round_trip() {
        let kinds = [
            ProblemKind::AccountDoesNotExist,
            ProblemKind::BadCsr,
            ProblemKind::RateLimited,
            ProblemKind::UserActionRequired,
        ];

        for kind in kinds {
            assert_eq!(kind.to_string().parse::<ProblemKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_is_bad_nonce() {
        let err = Error::Problem(Problem {
            kind: ProblemKind::BadNonce,
            detail: None,
        });
        assert!(err.is_bad_nonce());

        assert!(!Error::Msg("badNonce".to_owned()).is_bad_nonce());
    }
}
