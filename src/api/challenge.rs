use serde::Deserialize;

use crate::api::string_enum;

string_enum! {
    /// The status of a [`Challenge`].
    ///
    /// See [RFC 8555 §7.1.6].
    ///
    /// [RFC 8555 §7.1.6]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.6
    ChallengeStatus, "unknown challenge status", {
        Pending => "pending",
        Processing => "processing",
        Valid => "valid",
        Invalid => "invalid",
    }
}

string_enum! {
    /// The validation methods this client understands.
    ///
    /// Challenges of any other type offered by the CA are skipped during
    /// decode; see [`Authorization`](crate::api::Authorization).
    ChallengeType, "unknown challenge type", {
        Http01 => "http-01",
        Dns01 => "dns-01",
        TlsAlpn01 => "tls-alpn-01",
    }
}

/// An ACME challenge object.
///
/// Represents a server's offer to validate a client's possession of an identifier in a specific
/// way.
///
/// See [RFC 8555 §7.1.5].
///
/// # Example JSON
///
/// ```json
/// {
///   "type": "http-01",
///   "status": "pending",
///   "url": "https://acme-staging-v02.api.letsencrypt.org/acme/challenge/YTqpYUthlVfwBncUufE8IRA2TkzZkN4eYWWLMSRqcSs/216789597",
///   "token": "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w"
/// }
/// ```
///
/// [RFC 8555 §7.1.5]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.5
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Challenge {
    /// Type of challenge encoded in the object.
    #[serde(rename = "type")]
    pub _type: ChallengeType,

    /// URL to which a response can be posted.
    pub url: String,

    /// Status of this challenge.
    pub status: ChallengeStatus,

    /// Time at which the server validated this challenge.
    ///
    /// Uses RFC 3339 format.
    pub validated: Option<String>,

    /// Error that occurred while the server was validating the challenge, if any.
    ///
    /// Kept as the raw problem JSON; the CA's wording is surfaced verbatim on
    /// failure.
    pub error: Option<serde_json::Value>,

    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_decode() {
        let challenge = serde_json::from_str::<Challenge>(
            r#"{
                "type": "http-01",
                "status": "pending",
                "url": "https://a/chall/1",
                "token": "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w"
            }"#,
        )
        .unwrap();

        assert_eq!(challenge._type, ChallengeType::Http01);
        assert_eq!(challenge.status, ChallengeStatus::Pending);
        assert_eq!(challenge.validated, None);
        assert_eq!(challenge.error, None);
    }

    #[test]
    fn test_challenge_decode_unknown_type() {
        let err = serde_json::from_str::<Challenge>(
            r#"{"type":"quic-01","status":"pending","url":"https://a/c","token":"t"}"#,
        )
        .unwrap_err();
        assert!(
            err.to_string().contains("unknown challenge type quic-01"),
            "{err}"
        );
    }

    #[test]
    fn test_challenge_decode_unknown_status() {
        let err = serde_json::from_str::<Challenge>(
            r#"{"type":"dns-01","status":"stuck","url":"https://a/c","token":"t"}"#,
        )
        .unwrap_err();
        assert!(
            err.to_string().contains("unknown challenge status stuck"),
            "{err}"
        );
    }

    #[test]
    fn test_challenge_type_display() {
        assert_eq!(ChallengeType::TlsAlpn01.to_string(), "tls-alpn-01");
        assert_eq!("dns-01".parse::<ChallengeType>(), Ok(ChallengeType::Dns01));
    }
}
