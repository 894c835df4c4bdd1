use std::{sync::OnceLock, time::Duration};

use reqwest::header;

use crate::error::{Error, Problem, Result};

fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .expect("default TLS backend must initialize")
    })
}

pub(crate) async fn req_get(url: &str) -> Result<reqwest::Response> {
    let req = http_client().get(url);
    log::trace!("{req:?}");
    Ok(req.send().await?)
}

pub(crate) async fn req_head(url: &str) -> Result<reqwest::Response> {
    let req = http_client().head(url);
    log::trace!("{req:?}");
    Ok(req.send().await?)
}

pub(crate) async fn req_post(url: &str, body: String) -> Result<reqwest::Response> {
    let req = http_client()
        .post(url)
        .header(header::CONTENT_TYPE, "application/jose+json");
    log::trace!("{req:?} {body}");
    Ok(req.body(body).send().await?)
}

/// Passes 2xx responses through; everything else becomes an [`Error`],
/// decoding `application/problem+json` bodies into their typed form.
pub(crate) async fn req_handle_error(res: reqwest::Response) -> Result<reqwest::Response> {
    if res.status().is_success() {
        return Ok(res);
    }

    let status = res.status();
    let is_problem_json = res
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/problem+json"));
    let body = req_safe_read_body(res).await;

    if is_problem_json {
        return Err(match serde_json::from_str::<Problem>(&body) {
            Ok(problem) => Error::Problem(problem),
            Err(err) => Error::Msg(format!(
                "failed to deserialize application/problem+json ({err}) body: {body}"
            )),
        });
    }

    Err(Error::Msg(format!("{status} body: {body}")))
}

pub(crate) fn req_expect_header(res: &reqwest::Response, name: &str) -> Result<String> {
    res.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
        .ok_or_else(|| Error::Msg(format!("missing header: {name}")))
}

/// Seconds the CA asked us to wait before the next poll, if it did.
///
/// Only the delta-seconds form is understood; an HTTP-date value falls back
/// to the caller's fixed interval.
pub(crate) fn retry_after_secs(res: &reqwest::Response) -> Option<u64> {
    res.headers()
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

pub(crate) async fn req_safe_read_body(res: reqwest::Response) -> String {
    // letsencrypt sometimes closes the TLS abruptly causing io error
    // even though we did capture the body.
    res.text().await.unwrap_or_default()
}
