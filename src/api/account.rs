use serde::{Deserialize, Serialize};

use crate::api::string_enum;

string_enum! {
    /// The status of an [`Account`].
    ///
    /// See [RFC 8555 §7.1.2].
    ///
    /// [RFC 8555 §7.1.2]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.2
    AccountStatus, "unknown account status", {
        Valid => "valid",
        Deactivated => "deactivated",
        Revoked => "revoked",
    }
}

/// An ACME account resource.
///
/// Doubles as the `newAccount` request payload, which is why every field is
/// optional and absent fields stay off the wire.
///
/// See [RFC 8555 §7.1.2].
///
/// # Example JSON
///
/// ```json
/// {
///   "status": "valid",
///   "contact": [
///     "mailto:cert-admin@example.com",
///     "mailto:admin@example.com"
///   ],
///   "termsOfServiceAgreed": true,
///   "orders": "https://example.com/acme/acct/evOfKhNU60wg/orders"
/// }
/// ```
///
/// [RFC 8555 §7.1.2]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.2
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AccountStatus>,

    #[serde(
        skip_serializing_if = "Option::is_none",
        default,
        deserialize_with = "crate::util::opt_lenient_string_list"
    )]
    pub contact: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_service_agreed: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub only_return_existing: Option<bool>,

    /// Order list URL(s) for this account.
    ///
    /// RFC 8555 defines this as a single URL and requires it, but some CAs
    /// (Let's Encrypt included) omit it and list values have been seen too.
    /// Absence decodes as empty rather than failing; a string decodes as a
    /// one-element list.
    #[serde(
        skip_serializing,
        default,
        deserialize_with = "crate::util::string_or_lenient_list"
    )]
    pub orders: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_ip: Option<String>,

    /// Uses RFC 3339 format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Account {
    pub fn is_status_valid(&self) -> bool {
        self.status == Some(AccountStatus::Valid)
    }
}
