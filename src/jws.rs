//! See [RFC 8555 §6.2](https://datatracker.ietf.org/doc/html/rfc8555#section-6.2).

use rsa::{pkcs1v15::SigningKey, traits::PublicKeyParts as _, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use signature::{SignatureEncoding as _, Signer as _};

use crate::{
    error::{Error, Result},
    key::AcmeKey,
    util::base64url,
};

/// JWS Protected Header scheme as defined in [RFC 8555 §6.2].
///
/// > For newAccount requests, and for revokeCert requests authenticated by a certificate key,
/// there MUST be a "jwk" field. This field MUST contain the public key corresponding to the
/// private key used to sign the JWS.
/// >
/// > For all other requests, the request is signed using an existing account, and there MUST be a
/// "kid" field. This field MUST contain the account URL received by POSTing to the newAccount
/// resource.
///
/// The `url` header parameter is always present, as [RFC 8555 §6.4] requires.
///
/// [RFC 8555 §6.2]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.2
/// [RFC 8555 §6.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.4
#[derive(Debug, Serialize, Deserialize, Default)]
pub(crate) struct JwsProtectedHeader {
    /// Algorithm. Always "RS256"; this library signs with RSA account keys.
    ///
    /// This field MUST NOT contain "none" or a Message Authentication Code (MAC) algorithm.
    alg: String,

    /// A unique value that enables the verifier of a JWS to recognize when replay has occurred.
    ///
    /// As defined in [RFC 8555 §6.5].
    ///
    /// [RFC 8555 §6.5]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.5
    nonce: String,

    /// The target URL of the request carrying this JWS.
    url: String,

    /// JSON Web Key.
    ///
    /// Mutually exclusive with `kid` field.
    #[serde(skip_serializing_if = "Option::is_none")]
    jwk: Option<Jwk>,

    /// Key ID.
    ///
    /// Mutually exclusive with `jwk` field.
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
}

impl JwsProtectedHeader {
    pub(crate) fn new_jwk(jwk: Jwk, url: &str, nonce: String) -> Self {
        JwsProtectedHeader {
            alg: "RS256".to_owned(),
            url: url.to_owned(),
            nonce,
            jwk: Some(jwk),
            ..Default::default()
        }
    }

    pub(crate) fn new_kid(kid: &str, url: &str, nonce: String) -> Self {
        JwsProtectedHeader {
            alg: "RS256".to_owned(),
            url: url.to_owned(),
            nonce,
            kid: Some(kid.to_owned()),
            ..Default::default()
        }
    }
}

/// An RSA public key in JWK form (RFC 7517).
#[derive(Debug, Serialize, Deserialize, Clone)]
// LEXICAL ORDER OF FIELDS MATTER! RFC 7638 thumbprints hash exactly this
// member order, serialized without whitespace.
pub(crate) struct Jwk {
    e: String,
    kty: String,
    n: String,
}

impl From<&AcmeKey> for Jwk {
    fn from(key: &AcmeKey) -> Jwk {
        let public = RsaPublicKey::from(key.private_key());

        // BigUint::to_bytes_be is big-endian with leading zeros stripped,
        // which is the minimal encoding RFC 7518 §6.3 asks for.
        Jwk {
            e: base64url(&public.e().to_bytes_be()),
            kty: "RSA".to_owned(),
            n: base64url(&public.n().to_bytes_be()),
        }
    }
}

impl Jwk {
    /// The RFC 7638 key thumbprint: `base64url(SHA-256(canonical JWK))`.
    pub(crate) fn thumbprint(&self) -> Result<String> {
        let jwk_json = serde_json::to_string(self)?;
        Ok(base64url(&Sha256::digest(jwk_json)))
    }
}

/// The value a challenge solver must install on its side channel, as defined
/// in [RFC 8555 §8.1]: `token || "." || thumbprint(account JWK)`.
///
/// [RFC 8555 §8.1]: https://datatracker.ietf.org/doc/html/rfc8555#section-8.1
pub(crate) fn key_authorization(token: &str, key: &AcmeKey) -> Result<String> {
    let thumbprint = Jwk::from(key).thumbprint()?;
    Ok(format!("{token}.{thumbprint}"))
}

/// <https://datatracker.ietf.org/doc/html/rfc7515#section-7.2.2>
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct FlattenedJsonJws {
    protected: String,
    payload: String,
    signature: String,
}

/// Construct the flattened JWS JSON for `payload` according to [RFC 7515 §5.1].
///
/// A payload serializing to the JSON string `""` marks a POST-as-GET; its
/// JWS payload is the empty octet string, not `base64url("\"\"")`.
///
/// [RFC 7515 §5.1]: https://datatracker.ietf.org/doc/html/rfc7515#section-5.1
pub(crate) fn sign<T: Serialize + ?Sized>(
    protected: JwsProtectedHeader,
    key: &AcmeKey,
    payload: &T,
) -> Result<String> {
    let protected = {
        let protected_json = serde_json::to_string(&protected)?;
        base64url(&protected_json)
    };

    let payload = {
        let payload_json = serde_json::to_string(payload)?;

        if payload_json == "\"\"" {
            String::new()
        } else {
            base64url(&payload_json)
        }
    };

    let to_sign = format!("{protected}.{payload}");

    let signing_key = SigningKey::<Sha256>::new(key.private_key().clone());
    let signature = signing_key
        .try_sign(to_sign.as_bytes())
        .map_err(|err| Error::Msg(format!("RS256 signing failed: {err}")))?;
    let signature = base64url(&signature.to_bytes());

    let jws = FlattenedJsonJws {
        protected,
        payload,
        signature,
    };

    Ok(serde_json::to_string(&jws)?)
}
