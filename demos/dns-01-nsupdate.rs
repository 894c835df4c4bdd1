//! Provisions `dns-01` challenges by sending TSIG-signed dynamic updates
//! straight to the zone's primary name server, the way nsupdate(8) would.
//!
//! The TSIG secret (base64, as in a BIND `key` statement) is read from the
//! `TSIG_SECRET` environment variable.

use std::{
    net::SocketAddr,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use acme_core::{
    create_csr, create_rsa_key,
    solver::{nsupdate, Proto},
    Client, DirectoryUrl, Error,
};
use base64::prelude::*;
use hickory_proto::rr::Name;
use tokio::net::UdpSocket;

const DOMAINS: &[&str] = &["acme-test.example.org"];
const ZONE: &str = "example.org.";
const TSIG_KEY_NAME: &str = "acme-update.example.org.";
const DNS_SERVER: &str = "192.0.2.53:53";

#[tokio::main]
async fn main() -> eyre::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let tsig_secret = std::env::var("TSIG_SECRET")?;
    let tsig_key = BASE64_STANDARD.decode(tsig_secret.trim())?;

    let server: SocketAddr = DNS_SERVER.parse()?;
    let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
    socket.connect(server).await?;

    let send_socket = Arc::clone(&socket);
    let recv_socket = Arc::clone(&socket);

    let solver = nsupdate(
        Some(Proto::Udp),
        rand::random(),
        || {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock after epoch")
                .as_secs() as u32
        },
        move |bytes| {
            let socket = Arc::clone(&send_socket);
            async move {
                socket
                    .send(&bytes)
                    .await
                    .map_err(|err| Error::Msg(format!("DNS send failed: {err}")))?;
                Ok(())
            }
        },
        Some(move || {
            let socket = Arc::clone(&recv_socket);
            async move {
                let mut buf = vec![0u8; 4096];
                let n = socket
                    .recv(&mut buf)
                    .await
                    .map_err(|err| Error::Msg(format!("DNS recv failed: {err}")))?;
                buf.truncate(n);
                Ok(buf)
            }
        }),
        Name::from_utf8(ZONE)?,
        Name::from_utf8(TSIG_KEY_NAME)?,
        tsig_key,
    );

    log::info!("fetching LetsEncrypt directory and looking up account");
    // Note: Change to `DirectoryUrl::LetsEncrypt` in production.
    let account_key = create_rsa_key()?;
    let client = Client::initialise(DirectoryUrl::LetsEncryptStaging, None, account_key).await?;

    log::info!("creating certificate key and CSR for {DOMAINS:?}");
    let cert_key = create_rsa_key()?;
    let csr = create_csr(&cert_key, DOMAINS)?;

    log::info!("ordering certificate");
    let certs = client
        .sign_certificate(&solver, |delay| tokio::time::sleep(delay), &csr)
        .await?;

    for cert in &certs {
        println!("{}", cert.to_pem()?);
    }

    Ok(())
}
