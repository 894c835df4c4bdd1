use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::{
    error::Result,
    jws::{self, Jwk, JwsProtectedHeader},
    key::AcmeKey,
    req::{req_expect_header, req_handle_error, req_head, req_post},
};

/// JWS payload and nonce handling for requests to the API.
///
/// Setup is:
///
/// 1. `Transport::new()`
/// 2. `call_jwk()` against newAccount url
/// 3. `set_key_id` from the returned `Location` header.
/// 4. `call_kid()` for all calls after that.
#[derive(Clone)]
pub(crate) struct Transport {
    acme_key: AcmeKey,
    nonce_slot: Arc<NonceSlot>,
}

impl Transport {
    pub fn new(nonce_slot: Arc<NonceSlot>, acme_key: AcmeKey) -> Self {
        Transport {
            acme_key,
            nonce_slot,
        }
    }

    /// Update the key ID once it is known (part of setting up the transport).
    pub fn set_key_id(&mut self, kid: String) {
        self.acme_key.set_key_id(kid);
    }

    /// The key used in the transport.
    pub fn acme_key(&self) -> &AcmeKey {
        &self.acme_key
    }

    /// Make call with an embedded `jwk` header.
    ///
    /// Only appropriate for newAccount requests, where no key ID exists yet.
    pub async fn call_jwk<T>(&self, url: &str, body: &T) -> Result<reqwest::Response>
    where
        T: Serialize + ?Sized,
    {
        fn jws_with_jwk<T: Serialize + ?Sized>(
            url: &str,
            nonce: String,
            key: &AcmeKey,
            payload: &T,
        ) -> Result<String> {
            let protected = JwsProtectedHeader::new_jwk(Jwk::from(key), url, nonce);
            jws::sign(protected, key, payload)
        }

        self.do_call(url, body, jws_with_jwk).await
    }

    /// Make call using the key ID.
    pub async fn call_kid<T>(&self, url: &str, body: &T) -> Result<reqwest::Response>
    where
        T: Serialize + ?Sized,
    {
        fn jws_with_kid<T: Serialize + ?Sized>(
            url: &str,
            nonce: String,
            key: &AcmeKey,
            payload: &T,
        ) -> Result<String> {
            let protected = JwsProtectedHeader::new_kid(key.key_id(), url, nonce);
            jws::sign(protected, key, payload)
        }

        self.do_call(url, body, jws_with_kid).await
    }

    async fn do_call<T, F>(&self, url: &str, body: &T, make_jws: F) -> Result<reqwest::Response>
    where
        T: Serialize + ?Sized,
        F: Fn(&str, String, &AcmeKey, &T) -> Result<String>,
    {
        // The ACME API may invalidate the nonce we hold at any point. One
        // retry with the replacement nonce is allowed; a second badNonce in a
        // row is reported to the caller.
        let mut retried = false;

        loop {
            // Either get a new nonce, or reuse one from a previous request.
            let nonce = self.nonce_slot.get_nonce().await?;

            // Sign the body.
            let body = make_jws(url, nonce, &self.acme_key, body)?;

            log::debug!("call endpoint: {url}");

            // Post it to the URL
            let response = req_post(url, body).await?;

            // Regardless of the request being a success or not, there might be a nonce in the
            // response.
            self.nonce_slot.extract_nonce(&response);

            match req_handle_error(response).await {
                Err(err) if err.is_bad_nonce() && !retried => {
                    log::debug!("retrying once on bad nonce");
                    retried = true;
                }
                result => return result,
            }
        }
    }
}

/// Single-slot nonce cache.
///
/// Every response refills the slot from its `Replay-Nonce` header; every
/// request drains it. One slot suffices because the client never has two
/// requests in flight, which the nonce chaining itself demands.
pub(crate) struct NonceSlot {
    nonce_url: String,
    slot: Mutex<Option<String>>,
}

impl NonceSlot {
    pub fn new(nonce_url: &str) -> Self {
        NonceSlot {
            nonce_url: nonce_url.to_owned(),
            slot: Mutex::new(None),
        }
    }

    fn extract_nonce(&self, res: &reqwest::Response) {
        if let Some(nonce) = res
            .headers()
            .get("replay-nonce")
            .and_then(|value| value.to_str().ok())
        {
            log::trace!("storing replay nonce");
            *self.slot.lock() = Some(nonce.to_owned());
        }
    }

    async fn get_nonce(&self) -> Result<String> {
        if let Some(nonce) = self.slot.lock().take() {
            log::trace!("using cached nonce");
            return Ok(nonce);
        }

        log::debug!("requesting new nonce");
        let res = req_head(&self.nonce_url).await?;
        req_expect_header(&res, "replay-nonce")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{api, test};

    fn transport_for(server: &test::TestServer) -> Transport {
        let nonce_slot = Arc::new(NonceSlot::new(&format!(
            "{}/acme/new-nonce",
            server.base_url
        )));
        let mut key = test::test_key();
        key.set_key_id(format!("{}/acme/acct/7728515", server.base_url));
        Transport::new(nonce_slot, key)
    }

    #[tokio::test]
    async fn test_nonce_chaining() {
        let server = test::with_directory_server();
        let transport = transport_for(&server);
        let url = format!("{}/acme/new-order", server.base_url);

        let order = api::NewOrderRequest {
            identifiers: vec![api::Identifier::dns("acme-test.example.com")],
        };

        transport.call_kid(&url, &order).await.unwrap();
        transport.call_kid(&url, &order).await.unwrap();

        // The first request fetches a fresh nonce over HEAD; the second one
        // must reuse the Replay-Nonce of the first response, with no second
        // HEAD round trip.
        let seen = server.state.seen_nonces.lock().clone();
        assert_eq!(seen, ["test-nonce-0", "test-nonce-1"]);
        assert_eq!(
            server
                .state
                .head_nonce_requests
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn test_bad_nonce_is_retried_once() {
        let server = test::with_directory_server_config(test::ServerConfig {
            bad_nonce_responses: 1,
            ..Default::default()
        });
        let transport = transport_for(&server);
        let url = format!("{}/acme/new-order", server.base_url);

        let order = api::NewOrderRequest {
            identifiers: vec![api::Identifier::dns("acme-test.example.com")],
        };

        transport.call_kid(&url, &order).await.unwrap();

        // Both attempts hit the wire, and the retry used the nonce delivered
        // alongside the badNonce problem.
        let seen = server.state.seen_nonces.lock().clone();
        assert_eq!(seen, ["test-nonce-0", "test-nonce-1"]);
    }

    #[tokio::test]
    async fn test_second_bad_nonce_surfaces() {
        let server = test::with_directory_server_config(test::ServerConfig {
            bad_nonce_responses: 2,
            ..Default::default()
        });
        let transport = transport_for(&server);
        let url = format!("{}/acme/new-order", server.base_url);

        let order = api::NewOrderRequest {
            identifiers: vec![api::Identifier::dns("acme-test.example.com")],
        };

        let err = transport.call_kid(&url, &order).await.unwrap_err();
        assert!(err.is_bad_nonce(), "{err}");

        // exactly one retry
        assert_eq!(server.state.seen_nonces.lock().len(), 2);
    }
}
