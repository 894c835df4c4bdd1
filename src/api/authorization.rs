use serde::{Deserialize, Deserializer};

use crate::api::{self, string_enum};

string_enum! {
    /// The status of an [`Authorization`].
    ///
    /// See [RFC 8555 §7.1.6].
    ///
    /// [RFC 8555 §7.1.6]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.6
    AuthorizationStatus, "unknown authorization status", {
        Pending => "pending",
        Valid => "valid",
        Invalid => "invalid",
        Deactivated => "deactivated",
        Expired => "expired",
        Revoked => "revoked",
    }
}

/// An ACME authorization object.
///
/// Represents a server's authorization for an account to represent an identifier.
///
/// See [RFC 8555 §7.1.4].
///
/// # Example JSON
///
/// ```json
/// {
///   "identifier": {
///     "type": "dns",
///     "value": "www.example.org"
///   },
///   "status": "pending",
///   "expires": "2019-01-09T08:26:43Z",
///   "challenges": [
///     {
///       "type": "http-01",
///       "status": "pending",
///       "url": "https://example.com/acme/chall/prV_B7yEyA4",
///       "token": "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w"
///     }
///   ]
/// }
/// ```
///
/// [RFC 8555 §7.1.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.4
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Authorization {
    /// Authorization identifier.
    pub identifier: api::Identifier,

    /// Authorization status.
    pub status: AuthorizationStatus,

    /// The timestamp after which the server will consider this authorization invalid.
    ///
    /// Uses RFC 3339 format.
    pub expires: Option<String>,

    /// The challenges the client can fulfill to prove possession of the identifier.
    ///
    /// - For pending authorizations, the challenges that the client can fulfill in order to prove
    ///   possession of the identifier.
    /// - For valid authorizations, the challenge that was validated.
    /// - For invalid authorizations, the challenge that was attempted and failed.
    ///
    /// CAs may offer challenge types newer than this client; those entries are
    /// dropped during decode so a novel offer never fails the authorization.
    #[serde(default, deserialize_with = "known_challenges")]
    pub challenges: Vec<api::Challenge>,

    /// Present and true only for authorizations created from a wildcard DNS
    /// identifier; see [RFC 8555 §7.1.3].
    ///
    /// [RFC 8555 §7.1.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.3
    #[serde(default)]
    pub wildcard: bool,
}

impl Authorization {
    /// Returns the first challenge of the given type, if the CA offered one.
    pub fn challenge(&self, _type: api::ChallengeType) -> Option<&api::Challenge> {
        self.challenges.iter().find(|c| c._type == _type)
    }
}

/// Decodes a challenge list, skipping entries this client cannot act on.
fn known_challenges<'de, D>(deserializer: D) -> Result<Vec<api::Challenge>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<serde_json::Value>::deserialize(deserializer)?;

    Ok(values
        .into_iter()
        .filter_map(
            |value| match serde_json::from_value::<api::Challenge>(value) {
                Ok(challenge) => Some(challenge),
                Err(err) => {
                    log::debug!("skipping challenge: {err}");
                    None
                }
            },
        )
        .collect())
}
