use serde::{Deserialize, Serialize};

use crate::api::{self, string_enum};

string_enum! {
    /// The status of an [`Order`].
    ///
    /// See [RFC 8555 §7.1.6].
    ///
    /// [RFC 8555 §7.1.6]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.6
    OrderStatus, "unknown order status", {
        Pending => "pending",
        Ready => "ready",
        Processing => "processing",
        Valid => "valid",
        Invalid => "invalid",
    }
}

/// The `newOrder` request payload.
///
/// See [RFC 8555 §7.4].
///
/// [RFC 8555 §7.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.4
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOrderRequest {
    pub identifiers: Vec<api::Identifier>,
}

/// An ACME order object.
///
/// Represents a client's request for a certificate and is used to track the progress of that order
/// through to issuance.
///
/// See [RFC 8555 §7.1.3].
///
/// # Example JSON
///
/// ```json
/// {
///   "status": "pending",
///   "expires": "2019-01-09T08:26:43.570360537Z",
///   "identifiers": [
///     {
///       "type": "dns",
///       "value": "www.example.org"
///     }
///   ],
///   "authorizations": [
///     "https://example.com/acme/authz/YTqpYUthlVfwBncUufE8IRA2TkzZkN4eYWWLMSRqcSs"
///   ],
///   "finalize": "https://example.com/acme/finalize/7738992/18234324"
/// }
/// ```
///
/// [RFC 8555 §7.1.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.3
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawOrder")]
pub struct Order {
    pub status: OrderStatus,

    /// Uses RFC 3339 format.
    pub expires: Option<String>,

    pub identifiers: Vec<api::Identifier>,

    /// Uses RFC 3339 format.
    pub not_before: Option<String>,

    /// Uses RFC 3339 format.
    pub not_after: Option<String>,

    /// The raw problem JSON describing why the order moved to `invalid`.
    pub error: Option<serde_json::Value>,

    /// One authorization URL per identifier. Never empty.
    pub authorizations: Vec<String>,

    pub finalize: String,

    /// Present once the order status is `valid`.
    pub certificate: Option<String>,
}

/// Wire shape of [`Order`] before validation.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOrder {
    status: OrderStatus,
    expires: Option<String>,
    identifiers: Vec<api::Identifier>,
    not_before: Option<String>,
    not_after: Option<String>,
    error: Option<serde_json::Value>,
    #[serde(default)]
    authorizations: Option<Vec<String>>,
    finalize: String,
    certificate: Option<String>,
}

impl TryFrom<RawOrder> for Order {
    type Error = String;

    fn try_from(raw: RawOrder) -> Result<Order, String> {
        // An order without authorizations cannot be driven to completion;
        // treat it as a decode error rather than finding out mid-flow.
        let authorizations = match raw.authorizations {
            Some(urls) if !urls.is_empty() => urls,
            _ => return Err("no authorizations found in order".to_owned()),
        };

        Ok(Order {
            status: raw.status,
            expires: raw.expires,
            identifiers: raw.identifiers,
            not_before: raw.not_before,
            not_after: raw.not_after,
            error: raw.error,
            authorizations,
            finalize: raw.finalize,
            certificate: raw.certificate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_decode() {
        let order = serde_json::from_str::<Order>(
            r#"{
                "status": "pending",
                "expires": "2019-01-09T08:26:43.570360537Z",
                "identifiers": [
                    { "type": "dns", "value": "acme-test.example.com" }
                ],
                "authorizations": [
                    "https://a/acme/authz/YTqpYUthlVfwBncUufE8IRA2TkzZkN4eYWWLMSRqcSs"
                ],
                "finalize": "https://a/acme/finalize/7738992/18234324"
            }"#,
        )
        .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.identifiers[0].value, "acme-test.example.com");
        assert_eq!(order.authorizations.len(), 1);
        assert_eq!(order.certificate, None);
        assert_eq!(order.error, None);
    }

    #[test]
    fn test_order_decode_missing_authorizations() {
        let err = serde_json::from_str::<Order>(
            r#"{
                "status": "pending",
                "identifiers": [{ "type": "dns", "value": "x" }],
                "finalize": "https://a/f"
            }"#,
        )
        .unwrap_err();

        assert!(
            err.to_string().contains("no authorizations found in order"),
            "{err}"
        );
    }

    #[test]
    fn test_order_decode_empty_authorizations() {
        let err = serde_json::from_str::<Order>(
            r#"{
                "status": "pending",
                "identifiers": [{ "type": "dns", "value": "x" }],
                "authorizations": [],
                "finalize": "https://a/f"
            }"#,
        )
        .unwrap_err();

        assert!(
            err.to_string().contains("no authorizations found in order"),
            "{err}"
        );
    }

    #[test]
    fn test_order_decode_unknown_status() {
        let err = serde_json::from_str::<Order>(
            r#"{
                "status": "paused",
                "identifiers": [{ "type": "dns", "value": "x" }],
                "authorizations": ["https://a/z"],
                "finalize": "https://a/f"
            }"#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("unknown order status paused"), "{err}");
    }

    #[test]
    fn test_new_order_request_serialization() {
        let request = NewOrderRequest {
            identifiers: vec![
                api::Identifier::dns("example.org"),
                api::Identifier::dns("www.example.org"),
            ],
        };

        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"identifiers":[{"type":"dns","value":"example.org"},{"type":"dns","value":"www.example.org"}]}"#
        );
    }
}
