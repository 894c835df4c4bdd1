use std::{future::Future, sync::Arc, time::Duration};

use der::Encode as _;
use reqwest::StatusCode;
use rsa::RsaPrivateKey;
use x509_cert::request::CertReq;
use zeroize::Zeroizing;

use crate::{
    api,
    cert::{self, Certificate},
    error::{Error, ProblemKind, Result},
    jws,
    key::AcmeKey,
    req::{req_expect_header, req_get, req_handle_error, retry_after_secs},
    solver::Solver,
    trans::{NonceSlot, Transport},
    util::base64url,
};

const LETSENCRYPT_URL: &str = "https://acme-v02.api.letsencrypt.org/directory";
const LETSENCRYPT_STAGING_URL: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Delay between polls of an authorization or order, unless the CA asked for
/// a different one via `Retry-After`.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Poll attempts before giving up on a pending authorization or order.
const POLL_ATTEMPTS: usize = 10;

/// Enumeration of known ACME API directories.
#[derive(Debug, Clone)]
pub enum DirectoryUrl<'a> {
    /// The main Let's Encrypt directory.
    ///
    /// Not appropriate for testing / development.
    LetsEncrypt,

    /// The staging Let's Encrypt directory.
    ///
    /// Use for testing and development. Doesn't issue "valid" certificates. The root signing
    /// certificate is not supposed to be in any trust chains.
    LetsEncryptStaging,

    /// Provide an arbitrary directory URL to connect to.
    Other(&'a str),
}

impl DirectoryUrl<'_> {
    fn to_url(&self) -> &str {
        match self {
            DirectoryUrl::LetsEncrypt => LETSENCRYPT_URL,
            DirectoryUrl::LetsEncryptStaging => LETSENCRYPT_STAGING_URL,
            DirectoryUrl::Other(url) => url,
        }
    }
}

/// An ACME client bound to one directory and one account key.
///
/// Created with [`Client::initialise()`], which registers the account (or
/// finds the existing one for the key). From then on the client drives whole
/// certificate issuances through [`Client::sign_certificate()`].
pub struct Client {
    transport: Transport,
    api_directory: api::Directory,
    api_account: api::Account,
}

impl Client {
    /// Fetches the directory at `url` and binds `private_key` to its account.
    ///
    /// The CA is first probed for an account belonging to `private_key`; when
    /// none exists one is registered, agreeing to the terms of service and
    /// carrying `contact_email` if given. The account URL returned by the CA
    /// becomes the `kid` for every subsequent request.
    pub async fn initialise(
        url: DirectoryUrl<'_>,
        contact_email: Option<&str>,
        private_key: RsaPrivateKey,
    ) -> Result<Client> {
        let res = req_handle_error(req_get(url.to_url()).await?).await?;
        let api_directory = res.json::<api::Directory>().await?;

        let nonce_slot = Arc::new(NonceSlot::new(&api_directory.new_nonce));
        let mut transport = Transport::new(nonce_slot, AcmeKey::from_key(private_key));

        // Probing with onlyReturnExisting cannot create an account by
        // accident; the CA answers 200 for a known key.
        let probe = api::Account {
            only_return_existing: Some(true),
            ..Default::default()
        };

        let res = match transport
            .call_jwk(&api_directory.new_account, &probe)
            .await
        {
            Ok(res) => res,

            Err(Error::Problem(problem)) if problem.kind == ProblemKind::AccountDoesNotExist => {
                log::debug!("no account for this key yet, registering");

                let acc = api::Account {
                    // TODO: ensure email contains no hfields or more than one addr-spec in the
                    // to component, see https://datatracker.ietf.org/doc/html/rfc8555#section-7.3
                    contact: contact_email.map(|email| vec![format!("mailto:{email}")]),
                    terms_of_service_agreed: Some(true),
                    ..Default::default()
                };

                let res = transport.call_jwk(&api_directory.new_account, &acc).await?;

                if res.status() != StatusCode::CREATED {
                    return Err(Error::Msg(format!(
                        "unexpected status {} registering account",
                        res.status()
                    )));
                }

                res
            }

            Err(err) => return Err(err),
        };

        let kid = req_expect_header(&res, "location")?;
        log::debug!("account key ID is: {kid}");
        let api_account = res.json::<api::Account>().await?;

        // fill in the server returned key ID
        transport.set_key_id(kid);

        Ok(Client {
            transport,
            api_directory,
            api_account,
        })
    }

    /// Orders, validates and downloads a certificate for the DNS names in
    /// `csr` (subject CN plus SAN entries, deduplicated).
    ///
    /// Each authorization is answered with `solver`; `sleep` is awaited
    /// between polls, so callers control pacing (`|d| tokio::time::sleep(d)`
    /// in production, a no-op in tests).
    ///
    /// Returns the issued chain, leaf certificate first.
    pub async fn sign_certificate<S, SF>(
        &self,
        solver: &Solver,
        sleep: S,
        csr: &CertReq,
    ) -> Result<Vec<Certificate>>
    where
        S: Fn(Duration) -> SF,
        SF: Future<Output = ()>,
    {
        let csr_der = csr
            .to_der()
            .map_err(|err| Error::Msg(format!("CSR encoding failed: {err}")))?;

        let domains = cert::csr_dns_names(&csr_der)?;
        log::debug!("ordering certificate for {domains:?}");

        let order = api::NewOrderRequest {
            identifiers: domains
                .iter()
                .map(|domain| api::Identifier::dns(domain))
                .collect(),
        };

        let res = self
            .transport
            .call_kid(&self.api_directory.new_order, &order)
            .await?;

        if res.status() != StatusCode::CREATED {
            return Err(Error::Msg(format!(
                "unexpected status {} creating order",
                res.status()
            )));
        }

        let order_url = req_expect_header(&res, "location")?;
        let api_order = res.json::<api::Order>().await?;

        for auth_url in &api_order.authorizations {
            self.solve_authorization(solver, &sleep, auth_url).await?;
        }

        // All identifiers are proven; trade the CSR for a certificate.
        log::debug!("finalizing order {order_url}");
        let finalize = api::Finalize::new(base64url(&csr_der));
        self.transport
            .call_kid(&api_order.finalize, &finalize)
            .await?;

        let order = self.poll_order(&sleep, &order_url).await?;

        if order.status != api::OrderStatus::Valid {
            return Err(match order.error {
                Some(error) => Error::Msg(format!("order failed: {error}")),
                None => Error::Msg(format!("order is in status {}", order.status)),
            });
        }

        let certificate_url = order
            .certificate
            .ok_or_else(|| Error::Msg("no certificate URL on valid order".to_owned()))?;

        log::debug!("downloading certificate {certificate_url}");
        let res = self
            .transport
            .call_kid(&certificate_url, &api::EmptyString)
            .await?;
        let pem_chain = res.text().await?;

        cert::parse_pem_chain(&pem_chain)
    }

    /// Drives one authorization to `valid`: provision through the solver,
    /// notify the CA, poll until it settles.
    async fn solve_authorization<S, SF>(
        &self,
        solver: &Solver,
        sleep: &S,
        auth_url: &str,
    ) -> Result<()>
    where
        S: Fn(Duration) -> SF,
        SF: Future<Output = ()>,
    {
        let res = self.transport.call_kid(auth_url, &api::EmptyString).await?;
        let auth = res.json::<api::Authorization>().await?;
        let domain = &auth.identifier.value;

        match auth.status {
            // Ownership was proven in a recent order; the CA remembers.
            api::AuthorizationStatus::Valid => {
                log::debug!("authorization for {domain} already valid");
                return Ok(());
            }
            api::AuthorizationStatus::Pending => {}
            status => {
                return Err(Error::Msg(format!(
                    "authorization for {domain} is in status {status}"
                )));
            }
        }

        let challenge = auth
            .challenge(solver.challenge_type())
            .ok_or_else(|| Error::Msg("no supported challenge".to_owned()))?;

        let key_authorization = jws::key_authorization(&challenge.token, self.transport.acme_key())?;

        log::debug!(
            "provisioning {} challenge for {domain}",
            solver.challenge_type()
        );
        solver
            .provision(domain, challenge, &key_authorization)
            .await?;

        // The response is in place; ask the CA to look at it.
        self.transport
            .call_kid(&challenge.url, &api::EmptyObject)
            .await?
            .json::<api::Challenge>()
            .await?;

        let settled = self.poll_authorization(sleep, auth_url).await;

        // Whatever the outcome, the provisioned record has served its purpose.
        solver.cleanup(domain, challenge, &key_authorization).await;

        let settled = settled?;
        match settled.status {
            api::AuthorizationStatus::Valid => Ok(()),

            api::AuthorizationStatus::Invalid => {
                let error = settled
                    .challenges
                    .into_iter()
                    .find_map(|challenge| challenge.error);

                Err(match error {
                    Some(error) => Error::Msg(format!("validation failed: {error}")),
                    None => Error::Msg("validation failed and no error reported".to_owned()),
                })
            }

            status => Err(Error::Msg(format!(
                "authorization for {domain} is in status {status}"
            ))),
        }
    }

    async fn poll_authorization<S, SF>(&self, sleep: &S, auth_url: &str) -> Result<api::Authorization>
    where
        S: Fn(Duration) -> SF,
        SF: Future<Output = ()>,
    {
        for _ in 0..POLL_ATTEMPTS {
            let res = self.transport.call_kid(auth_url, &api::EmptyString).await?;
            let retry_after = retry_after_secs(&res);
            let auth = res.json::<api::Authorization>().await?;

            match auth.status {
                api::AuthorizationStatus::Pending => {}
                _ => return Ok(auth),
            }

            sleep(poll_delay(retry_after)).await;
        }

        Err(Error::Msg("challenge/order polling exhausted".to_owned()))
    }

    async fn poll_order<S, SF>(&self, sleep: &S, order_url: &str) -> Result<api::Order>
    where
        S: Fn(Duration) -> SF,
        SF: Future<Output = ()>,
    {
        for _ in 0..POLL_ATTEMPTS {
            let res = self
                .transport
                .call_kid(order_url, &api::EmptyString)
                .await?;
            let retry_after = retry_after_secs(&res);
            let order = res.json::<api::Order>().await?;

            match order.status {
                api::OrderStatus::Valid | api::OrderStatus::Invalid => return Ok(order),
                _ => {}
            }

            sleep(poll_delay(retry_after)).await;
        }

        Err(Error::Msg("challenge/order polling exhausted".to_owned()))
    }

    /// Private key for this account in PEM format (PKCS#8).
    pub fn acme_private_key_pem(&self) -> Result<Zeroizing<String>> {
        self.transport.acme_key().to_pem()
    }

    /// Returns a reference to the directory's API object.
    ///
    /// Useful for debugging.
    pub fn api_directory(&self) -> &api::Directory {
        &self.api_directory
    }

    /// Returns a reference to the account's API object.
    ///
    /// Useful for debugging.
    pub fn api_account(&self) -> &api::Account {
        &self.api_account
    }
}

fn poll_delay(retry_after: Option<u64>) -> Duration {
    retry_after.map(Duration::from_secs).unwrap_or(POLL_INTERVAL)
}
