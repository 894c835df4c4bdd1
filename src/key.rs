use pkcs8::{EncodePrivateKey as _, LineEnding};
use rsa::RsaPrivateKey;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// The subscriber's account key plus the account URL once the CA has told us.
///
/// Requests are signed with RS256 (RSASSA-PKCS1-v1_5 with SHA-256), the one
/// signature algorithm every ACME server must accept for RSA account keys.
#[derive(Clone)]
pub(crate) struct AcmeKey {
    private_key: RsaPrivateKey,

    /// Set once we contacted the ACME API to figure out the key ID.
    key_id: Option<String>,
}

impl AcmeKey {
    pub(crate) fn from_key(private_key: RsaPrivateKey) -> AcmeKey {
        AcmeKey {
            private_key,
            key_id: None,
        }
    }

    pub(crate) fn to_pem(&self) -> Result<Zeroizing<String>> {
        self.private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|err| Error::Msg(format!("private key to PEM failed: {err}")))
    }

    pub(crate) fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// The account URL. Panics when called before [`set_key_id`][Self::set_key_id];
    /// the transport only routes `kid`-signed calls after account setup.
    pub(crate) fn key_id(&self) -> &str {
        self.key_id.as_deref().expect("key ID must be set")
    }

    pub(crate) fn set_key_id(&mut self, kid: String) {
        self.key_id = Some(kid)
    }
}
