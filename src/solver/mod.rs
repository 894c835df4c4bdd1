//! Challenge solvers.
//!
//! A [`Solver`] owns the side channel on which a challenge response is
//! installed: a web server's docroot for `http-01`, a DNS zone for `dns-01`,
//! a TLS listener for `tls-alpn-01`. The client computes the response value;
//! the solver's callback puts it where the CA will look.
//!
//! Constructors:
//!
//! - [`http_solver`], [`dns_solver`], [`alpn_solver`] wrap a user-supplied
//!   async callback.
//! - [`nsupdate`] provisions `dns-01` records through RFC 2136 dynamic
//!   updates signed with TSIG.
//! - [`print_http`], [`print_dns`], [`print_alpn`] print the solution and
//!   wait for Enter, for manual provisioning.

use std::{future::Future, pin::Pin};

use sha2::{Digest as _, Sha256};
use tokio::io::{AsyncBufReadExt as _, BufReader};

use crate::{
    api::{Challenge, ChallengeType},
    cert::Certificate,
    error::{Error, Result},
    util::base64url,
};

mod nsupdate;

pub use self::nsupdate::{nsupdate, Proto};

/// The ALPN protocol name negotiated for `tls-alpn-01` validation ([RFC 8737 §4]).
///
/// [RFC 8737 §4]: https://datatracker.ietf.org/doc/html/rfc8737#section-4
pub const ACME_TLS_ALPN_PROTOCOL: &str = "acme-tls/1";

/// Path prefix under which `http-01` responses are served ([RFC 8555 §8.3]).
///
/// [RFC 8555 §8.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-8.3
pub const HTTP_CHALLENGE_PREFIX: &str = ".well-known/acme-challenge";

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An `http-01` solution.
///
/// `content` must be served verbatim at
/// `http://<domain>/<prefix>/<token>` with content-type
/// `application/octet-stream`.
#[derive(Debug, Clone)]
pub struct Http01 {
    pub domain: String,
    pub prefix: String,
    pub token: String,
    pub content: String,
}

/// A `dns-01` solution.
///
/// `content` must be published as a TXT record named `record_name`.
#[derive(Debug, Clone)]
pub struct Dns01 {
    pub record_name: String,
    pub content: String,
}

/// A `tls-alpn-01` solution.
///
/// The certificate must be presented on port 443 of the domain whenever a
/// TLS ClientHello negotiates ALPN [`ACME_TLS_ALPN_PROTOCOL`]. It is
/// self-signed for `domain` and carries the critical `acmeIdentifier`
/// extension (OID 1.3.6.1.5.5.7.1.31) holding the SHA-256 of the key
/// authorization.
#[derive(Debug, Clone)]
pub struct TlsAlpn01 {
    pub domain: String,
    pub alpn_protocol: String,
    pub private_key_pem: String,
    pub certificate_der: Vec<u8>,
}

/// Any of the three solution shapes; what a cleanup callback receives.
#[derive(Debug, Clone)]
pub enum Solution {
    Http(Http01),
    Dns(Dns01),
    TlsAlpn(TlsAlpn01),
}

type HttpHandler = Box<dyn Fn(Http01) -> BoxFuture<'static, Result<()>> + Send + Sync>;
type DnsHandler = Box<dyn Fn(Dns01) -> BoxFuture<'static, Result<()>> + Send + Sync>;
type AlpnHandler = Box<dyn Fn(TlsAlpn01) -> BoxFuture<'static, Result<()>> + Send + Sync>;
type CleanupHandler = Box<dyn Fn(Solution) -> BoxFuture<'static, Result<()>> + Send + Sync>;

enum Provision {
    Http(HttpHandler),
    Dns(DnsHandler),
    TlsAlpn(AlpnHandler),
}

/// A challenge solver: one supported challenge type plus the callback that
/// installs its response.
pub struct Solver {
    provision: Provision,
    cleanup: Option<CleanupHandler>,
}

/// Builds an `http-01` solver from a provisioning callback.
pub fn http_solver<F, Fut>(f: F) -> Solver
where
    F: Fn(Http01) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Solver {
        provision: Provision::Http(Box::new(move |http| Box::pin(f(http)))),
        cleanup: None,
    }
}

/// Builds a `dns-01` solver from a provisioning callback.
pub fn dns_solver<F, Fut>(f: F) -> Solver
where
    F: Fn(Dns01) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Solver {
        provision: Provision::Dns(Box::new(move |dns| Box::pin(f(dns)))),
        cleanup: None,
    }
}

/// Builds a `tls-alpn-01` solver from a provisioning callback.
pub fn alpn_solver<F, Fut>(f: F) -> Solver
where
    F: Fn(TlsAlpn01) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Solver {
        provision: Provision::TlsAlpn(Box::new(move |alpn| Box::pin(f(alpn)))),
        cleanup: None,
    }
}

/// Interactive `http-01` solver: prints the file to serve, then waits for a
/// line on stdin.
pub fn print_http() -> Solver {
    http_solver(|http| async move {
        println!(
            "Serve the following content at http://{}/{}/{}",
            http.domain, http.prefix, http.token
        );
        println!("(content-type application/octet-stream)");
        println!();
        println!("{}", http.content);
        wait_for_enter().await
    })
}

/// Interactive `dns-01` solver: prints the TXT record to create, then waits
/// for a line on stdin.
pub fn print_dns() -> Solver {
    dns_solver(|dns| async move {
        println!("Create the following DNS record:");
        println!();
        println!("{}. 300 IN TXT \"{}\"", dns.record_name, dns.content);
        wait_for_enter().await
    })
}

/// Interactive `tls-alpn-01` solver: prints the certificate and key to serve,
/// then waits for a line on stdin.
pub fn print_alpn() -> Solver {
    alpn_solver(|alpn| async move {
        let certificate_pem = Certificate::from_der(alpn.certificate_der).to_pem()?;

        println!(
            "Present this certificate on port 443 of {} when the ClientHello \
             negotiates ALPN protocol \"{}\":",
            alpn.domain, alpn.alpn_protocol
        );
        println!();
        println!("{certificate_pem}");
        println!("{}", alpn.private_key_pem);
        wait_for_enter().await
    })
}

async fn wait_for_enter() -> Result<()> {
    println!("Press Enter when done.");

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .map_err(|err| Error::Msg(format!("stdin read failed: {err}")))?;

    Ok(())
}

impl Solver {
    /// Attaches a best-effort removal callback, invoked once the CA has
    /// settled the challenge either way. Its errors are logged, never fatal.
    pub fn with_cleanup<F, Fut>(mut self, f: F) -> Solver
    where
        F: Fn(Solution) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.cleanup = Some(Box::new(move |solution| Box::pin(f(solution))));
        self
    }

    /// The one challenge type this solver can answer.
    pub fn challenge_type(&self) -> ChallengeType {
        match self.provision {
            Provision::Http(_) => ChallengeType::Http01,
            Provision::Dns(_) => ChallengeType::Dns01,
            Provision::TlsAlpn(_) => ChallengeType::TlsAlpn01,
        }
    }

    pub(crate) async fn provision(
        &self,
        domain: &str,
        challenge: &Challenge,
        key_authorization: &str,
    ) -> Result<()> {
        match &self.provision {
            Provision::Http(f) => f(http_solution(domain, challenge, key_authorization)).await,
            Provision::Dns(f) => f(dns_solution(domain, key_authorization)).await,
            Provision::TlsAlpn(f) => f(alpn_solution(domain, key_authorization)?).await,
        }
    }

    pub(crate) async fn cleanup(&self, domain: &str, challenge: &Challenge, key_authorization: &str) {
        let Some(cleanup) = &self.cleanup else {
            return;
        };

        let solution = match &self.provision {
            Provision::Http(_) => Ok(Solution::Http(http_solution(
                domain,
                challenge,
                key_authorization,
            ))),
            Provision::Dns(_) => Ok(Solution::Dns(dns_solution(domain, key_authorization))),
            Provision::TlsAlpn(_) => {
                alpn_solution(domain, key_authorization).map(Solution::TlsAlpn)
            }
        };

        let result = match solution {
            Ok(solution) => cleanup(solution).await,
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            log::warn!("challenge cleanup for {domain} failed: {err}");
        }
    }
}

/// Name of the TXT record carrying a `dns-01` response for `domain`.
pub fn dns_record_name(domain: &str) -> String {
    format!("_acme-challenge.{domain}")
}

/// Value of the TXT record for a `dns-01` response:
/// `base64url(SHA-256(key_authorization))` ([RFC 8555 §8.4]).
///
/// [RFC 8555 §8.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-8.4
pub fn dns_record_content(key_authorization: &str) -> String {
    base64url(&Sha256::digest(key_authorization))
}

fn http_solution(domain: &str, challenge: &Challenge, key_authorization: &str) -> Http01 {
    Http01 {
        domain: domain.to_owned(),
        prefix: HTTP_CHALLENGE_PREFIX.to_owned(),
        token: challenge.token.clone(),
        content: key_authorization.to_owned(),
    }
}

fn dns_solution(domain: &str, key_authorization: &str) -> Dns01 {
    Dns01 {
        record_name: dns_record_name(domain),
        content: dns_record_content(key_authorization),
    }
}

/// A fresh key and self-signed certificate for `tls-alpn-01` ([RFC 8737 §3]).
///
/// [RFC 8737 §3]: https://datatracker.ietf.org/doc/html/rfc8737#section-3
fn alpn_solution(domain: &str, key_authorization: &str) -> Result<TlsAlpn01> {
    let key_pair = rcgen::KeyPair::generate()
        .map_err(|err| Error::Msg(format!("challenge key generation failed: {err}")))?;

    let mut params = rcgen::CertificateParams::new(vec![domain.to_owned()])
        .map_err(|err| Error::Msg(format!("bad challenge domain {domain}: {err}")))?;

    let digest: [u8; 32] = Sha256::digest(key_authorization).into();
    params
        .custom_extensions
        .push(rcgen::CustomExtension::new_acme_identifier(&digest));

    let certificate = params
        .self_signed(&key_pair)
        .map_err(|err| Error::Msg(format!("challenge certificate generation failed: {err}")))?;

    Ok(TlsAlpn01 {
        domain: domain.to_owned(),
        alpn_protocol: ACME_TLS_ALPN_PROTOCOL.to_owned(),
        private_key_pem: key_pair.serialize_pem(),
        certificate_der: certificate.der().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::api::ChallengeStatus;

    fn pending_challenge(_type: ChallengeType) -> Challenge {
        Challenge {
            _type,
            url: "https://a/chall/1".to_owned(),
            status: ChallengeStatus::Pending,
            validated: None,
            error: None,
            token: "RRo2ZcXAEqxKvMH8RGcATjSK1KknLEUmauwfQ5i3gG8".to_owned(),
        }
    }

    #[test]
    fn test_dns_record_content() {
        // base64url(SHA-256("abc.def")), no padding
        assert_eq!(
            dns_record_content("abc.def"),
            "67MSe_XHxLTkK1FxD0lGwcHQWzMdI3ndFeOlQx7ZNBY"
        );
    }

    #[test]
    fn test_dns_record_name() {
        assert_eq!(
            dns_record_name("machine.example.org"),
            "_acme-challenge.machine.example.org"
        );
    }

    #[tokio::test]
    async fn test_http_solver_inputs() {
        let seen = Arc::new(Mutex::new(None));

        let solver = http_solver({
            let seen = Arc::clone(&seen);
            move |http| {
                *seen.lock() = Some(http);
                async { Ok(()) }
            }
        });
        assert_eq!(solver.challenge_type(), ChallengeType::Http01);

        let challenge = pending_challenge(ChallengeType::Http01);
        solver
            .provision("machine.example.org", &challenge, "token.thumbprint")
            .await
            .unwrap();

        let http = seen.lock().take().unwrap();
        assert_eq!(http.domain, "machine.example.org");
        assert_eq!(http.prefix, ".well-known/acme-challenge");
        assert_eq!(http.token, challenge.token);
        // http-01 serves the key authorization itself
        assert_eq!(http.content, "token.thumbprint");
    }

    #[tokio::test]
    async fn test_dns_solver_inputs() {
        let seen = Arc::new(Mutex::new(None));

        let solver = dns_solver({
            let seen = Arc::clone(&seen);
            move |dns| {
                *seen.lock() = Some(dns);
                async { Ok(()) }
            }
        });
        assert_eq!(solver.challenge_type(), ChallengeType::Dns01);

        let challenge = pending_challenge(ChallengeType::Dns01);
        solver
            .provision("machine.example.org", &challenge, "abc.def")
            .await
            .unwrap();

        let dns = seen.lock().take().unwrap();
        assert_eq!(dns.record_name, "_acme-challenge.machine.example.org");
        assert_eq!(dns.content, "67MSe_XHxLTkK1FxD0lGwcHQWzMdI3ndFeOlQx7ZNBY");
    }

    #[tokio::test]
    async fn test_alpn_solver_certificate() {
        use x509_parser::prelude::{FromDer as _, X509Certificate};

        let seen = Arc::new(Mutex::new(None));

        let solver = alpn_solver({
            let seen = Arc::clone(&seen);
            move |alpn| {
                *seen.lock() = Some(alpn);
                async { Ok(()) }
            }
        });
        assert_eq!(solver.challenge_type(), ChallengeType::TlsAlpn01);

        let challenge = pending_challenge(ChallengeType::TlsAlpn01);
        solver
            .provision("machine.example.org", &challenge, "abc.def")
            .await
            .unwrap();

        let alpn = seen.lock().take().unwrap();
        assert_eq!(alpn.alpn_protocol, "acme-tls/1");
        assert!(alpn.private_key_pem.contains("PRIVATE KEY"));

        let (_, cert) = X509Certificate::from_der(&alpn.certificate_der).unwrap();

        // critical acmeIdentifier extension wrapping the OCTET STRING of
        // SHA-256(key authorization)
        let acme_identifier = x509_parser::oid_registry::Oid::from(&[1, 3, 6, 1, 5, 5, 7, 1, 31])
            .unwrap();
        let extension = cert
            .extensions()
            .iter()
            .find(|ext| ext.oid == acme_identifier)
            .expect("acmeIdentifier extension present");
        assert!(extension.critical);

        let digest: [u8; 32] = Sha256::digest("abc.def").into();
        // DER OCTET STRING: tag 0x04, length 0x20, then the digest
        assert_eq!(extension.value[..2], [0x04, 0x20]);
        assert_eq!(&extension.value[2..], digest);
    }

    #[tokio::test]
    async fn test_cleanup_receives_solution_and_never_fails() {
        let cleaned = Arc::new(Mutex::new(None));

        let solver = http_solver(|_| async { Ok(()) }).with_cleanup({
            let cleaned = Arc::clone(&cleaned);
            move |solution| {
                *cleaned.lock() = Some(solution);
                // cleanup errors are logged, not surfaced
                async { Err(Error::Msg("record already gone".to_owned())) }
            }
        });

        let challenge = pending_challenge(ChallengeType::Http01);
        solver
            .cleanup("machine.example.org", &challenge, "token.thumbprint")
            .await;

        let solution = cleaned.lock().take().unwrap();
        match solution {
            Solution::Http(http) => assert_eq!(http.token, challenge.token),
            other => panic!("unexpected solution: {other:?}"),
        }
    }
}
