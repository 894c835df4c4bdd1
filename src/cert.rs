use std::{
    io::{BufReader, Cursor},
    time::SystemTime,
};

use der::{asn1::Ia5String, pem::LineEnding, Decode as _, EncodePem as _};
use rsa::{pkcs1v15::SigningKey, RsaPrivateKey};
use sha2::Sha256;
use x509_cert::{
    builder::{Builder as _, RequestBuilder as CsrBuilder},
    ext::pkix::{name::GeneralName, SubjectAltName},
    name::Name,
    request::CertReq,
};
use x509_parser::{
    certification_request::X509CertificationRequest,
    extensions::{GeneralName as ParsedGeneralName, ParsedExtension},
    prelude::FromDer as _,
};

use crate::error::{Error, Result};

/// Make an RSA private key (from which we can derive a public key).
///
/// The same key type serves both as account key and certificate key.
pub fn create_rsa_key() -> Result<RsaPrivateKey> {
    RsaPrivateKey::new(&mut rand::thread_rng(), 2048)
        .map_err(|err| Error::Msg(format!("RSA key generation failed: {err}")))
}

/// Creates a CSR for `domains` and signs it with `signer`.
///
/// The first item of `domains` is picked for the CSR's Common Name (CN). All domains are added to
/// a Subject Alternative Name (SAN) extension, as CAs require.
pub fn create_csr(signer: &RsaPrivateKey, domains: &[&str]) -> Result<CertReq> {
    let primary_domain = domains
        .first()
        .ok_or_else(|| Error::Msg("no domains for CSR".to_owned()))?;

    let subject = format!("CN={primary_domain}")
        .parse::<Name>()
        .map_err(|err| Error::Msg(format!("bad CSR subject: {err}")))?;

    let signing_key = SigningKey::<Sha256>::new(signer.clone());

    let mut csr = CsrBuilder::new(subject, &signing_key)
        .map_err(|err| Error::Msg(format!("CSR builder failed: {err}")))?;

    let alt_names = domains
        .iter()
        .map(|domain| {
            Ia5String::new(domain)
                .map(GeneralName::DnsName)
                .map_err(|err| Error::Msg(format!("bad domain {domain}: {err}")))
        })
        .collect::<Result<Vec<_>>>()?;

    csr.add_extension(&SubjectAltName(alt_names))
        .map_err(|err| Error::Msg(format!("adding SAN extension failed: {err}")))?;

    csr.build::<rsa::pkcs1v15::Signature>()
        .map_err(|err| Error::Msg(format!("building CSR failed: {err}")))
}

/// Extracts the DNS names covered by a DER-encoded CSR: the subject CN plus
/// every dNSName SAN entry, deduplicated, CN first.
pub fn csr_dns_names(csr_der: &[u8]) -> Result<Vec<String>> {
    let (_, csr) = X509CertificationRequest::from_der(csr_der)
        .map_err(|err| Error::Msg(format!("CSR parse failed: {err}")))?;

    let info = &csr.certification_request_info;

    let mut names = Vec::<String>::new();
    let mut push_unique = |name: &str| {
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_owned());
        }
    };

    for attr in info.subject.iter_common_name() {
        if let Ok(cn) = attr.as_str() {
            push_unique(cn);
        }
    }

    if let Some(extensions) = csr.requested_extensions() {
        for extension in extensions {
            if let ParsedExtension::SubjectAlternativeName(san) = extension {
                for general_name in &san.general_names {
                    if let ParsedGeneralName::DNSName(dns) = general_name {
                        push_unique(dns);
                    }
                }
            }
        }
    }

    if names.is_empty() {
        return Err(Error::Msg("no DNS names found in CSR".to_owned()));
    }

    Ok(names)
}

/// One certificate of an issued chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    pub(crate) fn from_der(der: Vec<u8>) -> Self {
        Certificate { der }
    }

    /// The certificate in DER encoding.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// The certificate in PEM format.
    pub fn to_pem(&self) -> Result<String> {
        let cert = x509_cert::Certificate::from_der(&self.der)
            .map_err(|err| Error::Msg(format!("certificate parse failed: {err}")))?;

        cert.to_pem(LineEnding::LF)
            .map_err(|err| Error::Msg(format!("certificate to PEM failed: {err}")))
    }

    /// Inspect the certificate to count the number of (whole) valid days left.
    ///
    /// It's up to the ACME API provider to decide how long an issued certificate is valid.
    /// Let's Encrypt sets the validity to 90 days. This function reports 89 days for a newly
    /// issued cert, since it counts _whole_ days.
    ///
    /// It is possible to get negative days for an expired certificate.
    pub fn valid_days_left(&self) -> Result<i64> {
        let cert = x509_cert::Certificate::from_der(&self.der)
            .map_err(|err| Error::Msg(format!("certificate parse failed: {err}")))?;

        let not_after = cert
            .tbs_certificate
            .validity
            .not_after
            .to_unix_duration()
            .as_secs() as i64;

        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_err(|err| Error::Msg(format!("system clock before epoch: {err}")))?
            .as_secs() as i64;

        Ok((not_after - now) / 86_400)
    }
}

/// Splits a `application/pem-certificate-chain` body into its certificates,
/// leaf first, as the CA delivered them.
pub(crate) fn parse_pem_chain(pem: &str) -> Result<Vec<Certificate>> {
    let mut rdr = BufReader::new(Cursor::new(pem));

    let certs = rustls_pemfile::certs(&mut rdr)
        .map(|res| res.map(|cert| Certificate::from_der(cert.to_vec())))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| Error::Msg(format!("certificate chain parse failed: {err}")))?;

    if certs.is_empty() {
        return Err(Error::Msg("empty certificate chain".to_owned()));
    }

    Ok(certs)
}

#[cfg(test)]
mod tests {
    use der::Encode as _;

    use super::*;

    fn test_csr_der(domains: &[&str]) -> Vec<u8> {
        let key = crate::test::test_key();
        let csr = create_csr(key.private_key(), domains).unwrap();
        csr.to_der().unwrap()
    }

    #[test]
    fn test_csr_name_round_trip() {
        let der = test_csr_der(&["example.org", "www.example.org"]);
        let names = csr_dns_names(&der).unwrap();
        assert_eq!(names, ["example.org", "www.example.org"]);
    }

    #[test]
    fn test_csr_names_deduplicated() {
        // the CN is repeated in the SAN; it must appear once, first
        let der = test_csr_der(&["example.org"]);
        let names = csr_dns_names(&der).unwrap();
        assert_eq!(names, ["example.org"]);
    }

    #[test]
    fn test_create_csr_requires_domains() {
        let key = crate::test::test_key();
        assert!(create_csr(key.private_key(), &[]).is_err());
    }

    #[test]
    fn test_parse_pem_chain() {
        let leaf = rcgen::generate_simple_self_signed(vec!["leaf.example.org".to_owned()]).unwrap();
        let issuer = rcgen::generate_simple_self_signed(vec!["ca.example.org".to_owned()]).unwrap();

        let body = format!("{}{}", leaf.cert.pem(), issuer.cert.pem());
        let chain = parse_pem_chain(&body).unwrap();

        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].der(), leaf.cert.der().as_ref());

        // survives a PEM round trip
        assert_eq!(
            parse_pem_chain(&chain[0].to_pem().unwrap()).unwrap()[0],
            chain[0]
        );
    }

    #[test]
    fn test_parse_pem_chain_rejects_empty() {
        assert!(parse_pem_chain("no certs here").is_err());
    }

    #[test]
    fn test_valid_days_left() {
        let cert = rcgen::generate_simple_self_signed(vec!["example.org".to_owned()]).unwrap();
        let cert = Certificate::from_der(cert.cert.der().to_vec());

        // rcgen's default validity ends far in the future
        assert!(cert.valid_days_left().unwrap() > 0);
    }
}
