//! Provisioning certificates from ACME (Automatic Certificate Management Environment) providers
//! such as [Let's Encrypt](https://letsencrypt.org/).
//!
//! It follows the [RFC 8555](https://datatracker.ietf.org/doc/html/rfc8555) spec, using ACME v2 to
//! issue/renew certificates.
//!
//! # Usage
//!
//! 1. [`Client::initialise()`] fetches the CA's directory and registers (or
//!    finds) the account belonging to your RSA key.
//! 2. Pick a [`solver`] for the challenge type your infrastructure can
//!    answer.
//! 3. [`Client::sign_certificate()`] drives an order through authorization,
//!    validation, finalization and download, returning the issued chain.
//!
//! Complete usage examples are provided in the source repository for the
//! `http-01` and `dns-01` challenge types (see `demos/`).
//!
//! # Domain Ownership
//!
//! Most website TLS certificates tries to prove ownership/control over the domain they are issued
//! for. For ACME, this means proving you control either:
//!
//! - a server answering TLS or HTTP requests for that domain;
//! - the DNS server answering name lookups against the domain.
//!
//! To use this library, there are points in the flow where you would need to modify either the web
//! server or DNS server before progressing to get the certificate. That is what a [`Solver`] does:
//! its callback is handed the ready-made challenge response and installs it on the side channel it
//! owns. The [`solver::nsupdate`] solver can update a DNS zone directly via TSIG-signed dynamic
//! updates; the `print_*` solvers let a human do the provisioning.
//!
//! ## Multiple Domains
//!
//! When creating a new order, it's possible to provide multiple alt-names that will also be part
//! of the certificate. The ACME API requires you to prove ownership of each such domain; the
//! client walks every authorization in turn.
//!
//! # Rate Limits
//!
//! The ACME API provider Let's Encrypt uses [rate limits] to ensure the API is not being abused.
//! It might be tempting to make the `sleep` callback really fast in some of this library's polling
//! calls, but balance this against the real risk of having access cut off.
//!
//! ## Use Staging For Development!
//!
//! Especially take care to use the Let's Encrypt staging environment for development where the
//! rate limits are more relaxed. See [`DirectoryUrl::LetsEncryptStaging`].
//!
//! [rate limits]: https://letsencrypt.org/docs/rate-limits

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]

mod cert;
mod client;
mod error;
mod jws;
mod key;
mod req;
mod trans;
mod util;

pub mod api;
pub mod solver;

#[cfg(test)]
mod test;

pub use crate::{
    cert::{create_csr, create_rsa_key, csr_dns_names, Certificate},
    client::{Client, DirectoryUrl},
    error::{Error, Problem, ProblemKind, Result},
    solver::Solver,
};
