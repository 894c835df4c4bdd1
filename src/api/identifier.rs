use serde::{Deserialize, Serialize};

use crate::api::string_enum;

string_enum! {
    /// The type of an [`Identifier`].
    ///
    /// RFC 8555 defines only `dns`; this client orders certificates for DNS
    /// names exclusively.
    IdentifierType, "unknown identifier type", {
        Dns => "dns",
    }
}

/// A name a certificate can be requested for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub _type: IdentifierType,
    pub value: String,
}

impl Identifier {
    pub(crate) fn dns(value: &str) -> Self {
        Self {
            _type: IdentifierType::Dns,
            value: value.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_decode() {
        let identifier =
            serde_json::from_str::<Identifier>(r#"{"type":"dns","value":"example.org"}"#).unwrap();
        assert_eq!(identifier, Identifier::dns("example.org"));
    }

    #[test]
    fn test_identifier_decode_rejects_non_dns() {
        let err = serde_json::from_str::<Identifier>(r#"{"type":"ip","value":"10.0.0.1"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unknown identifier type ip"), "{err}");
    }
}
