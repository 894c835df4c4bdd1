use base64::prelude::*;
use serde::{de, Deserialize, Deserializer};

pub(crate) fn base64url<T: ?Sized + AsRef<[u8]>>(input: &T) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(input)
}

fn keep_strings(values: Vec<serde_json::Value>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|value| match value {
            serde_json::Value::String(s) => Some(s),
            value => {
                log::debug!("dropping non-string list entry: {value}");
                None
            }
        })
        .collect()
}

/// Deserializes a JSON array keeping only its string elements.
///
/// Some ACME endpoints have been observed returning non-string entries in
/// fields like `contact`; those entries are dropped rather than failing the
/// whole decode.
pub(crate) fn lenient_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(keep_strings(Vec::<serde_json::Value>::deserialize(
        deserializer,
    )?))
}

/// Same as [`lenient_string_list`] for fields that may be absent.
pub(crate) fn opt_lenient_string_list<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_string_list(deserializer).map(Some)
}

/// Deserializes a JSON string into a one-element list, or an array with
/// [`lenient_string_list`] semantics.
///
/// RFC 8555 defines the account `orders` field as a single URL, but list
/// values have been seen in the wild too; both shapes decode.
pub(crate) fn string_or_lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(vec![s]),
        serde_json::Value::Array(values) => Ok(keep_strings(values)),
        value => Err(de::Error::custom(format!(
            "expected string or list of strings, got {value}"
        ))),
    }
}
