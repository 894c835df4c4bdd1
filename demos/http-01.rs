use std::io;

use acme_core::{create_csr, create_rsa_key, solver, Client, DirectoryUrl, Error};
use rsa::{
    pkcs8::{DecodePrivateKey as _, EncodePrivateKey as _, LineEnding},
    RsaPrivateKey,
};
use tokio::fs;

const ACCOUNTS_DIR: &str = "./acme-accounts";
const CHALLENGE_DIR: &str = "./acme-challenges";

const DOMAINS: &[&str] = &["glados.x52.dev", "oc.x52.dev"];
const CONTACT_EMAIL: Option<&str> = None;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("ensuring account and challenge dirs exist");
    fs::create_dir_all(ACCOUNTS_DIR).await?;
    fs::create_dir_all(CHALLENGE_DIR).await?;

    // NOTE: Your web server must serve the files in CHALLENGE_DIR under
    // http://<domain>/.well-known/acme-challenge/ for validation to succeed.

    let key_path = format!("{ACCOUNTS_DIR}/account.pem");

    log::info!("loading account key from disk");
    let private_key = match fs::read_to_string(&key_path).await {
        Ok(pem) => RsaPrivateKey::from_pkcs8_pem(&pem)?,

        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            log::info!("generating account key");
            let private_key = create_rsa_key()?;

            log::info!("persisting account key to {key_path}");
            let pem = private_key.to_pkcs8_pem(LineEnding::LF)?;
            fs::write(&key_path, pem.as_bytes()).await?;

            private_key
        }

        Err(err) => return Err(err.into()),
    };

    log::info!("fetching LetsEncrypt directory and looking up account");
    // Note: Change to `DirectoryUrl::LetsEncrypt` in production.
    let client = Client::initialise(
        DirectoryUrl::LetsEncryptStaging,
        CONTACT_EMAIL,
        private_key,
    )
    .await?;

    // For HTTP, the challenge is a text file that needs to be placed so it
    // is accessible over the web for the domain we are trying to get a
    // certificate for:
    //
    // http://<domain>/.well-known/acme-challenge/<token>
    let solver = solver::http_solver(|http| async move {
        let path = format!("{CHALLENGE_DIR}/{}", http.token);
        log::info!("persisting authorization proof to {path}");

        fs::write(&path, http.content)
            .await
            .map_err(|err| Error::Msg(format!("writing {path} failed: {err}")))
    })
    .with_cleanup(|solution| async move {
        let solver::Solution::Http(http) = solution else {
            return Ok(());
        };

        let path = format!("{CHALLENGE_DIR}/{}", http.token);
        log::info!("removing authorization proof {path}");

        fs::remove_file(&path)
            .await
            .map_err(|err| Error::Msg(format!("removing {path} failed: {err}")))
    });

    log::info!("creating certificate key and CSR for {DOMAINS:?}");
    let cert_key = create_rsa_key()?;
    let csr = create_csr(&cert_key, DOMAINS)?;

    log::info!("ordering certificate");
    let certs = client
        .sign_certificate(&solver, |delay| tokio::time::sleep(delay), &csr)
        .await?;

    log::info!(
        "issued: {} certificate(s), leaf valid for {} more days",
        certs.len(),
        certs[0].valid_days_left()?
    );

    // NOTE: Here you would spawn your HTTPS server and use the certificate
    // key plus chain to configure TLS on it. For this example, we just print
    // the chain and exit.
    for cert in &certs {
        println!("{}", cert.to_pem()?);
    }

    Ok(())
}
