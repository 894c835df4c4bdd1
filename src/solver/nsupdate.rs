//! `dns-01` provisioning through RFC 2136 dynamic updates.
//!
//! The solver assembles a DNS UPDATE message adding the challenge TXT record
//! to a zone, signs it with TSIG (RFC 8945, HMAC-SHA256) and hands the wire
//! bytes to a caller-supplied `send` function. Where the packets actually go
//! (a UDP socket, a TCP stream, a VPN tunnel) is the caller's business.

use std::{future::Future, sync::Arc};

use hickory_proto::{
    op::{Message, MessageType, OpCode, Query},
    rr::{
        dnssec::{rdata::tsig::TsigAlgorithm, tsig::TSigner},
        rdata::TXT,
        DNSClass, Name, RData, Record, RecordType,
    },
};

use super::{dns_solver, Solver};
use crate::error::{Error, Result};

/// How the caller moves packets. With [`Proto::Tcp`], `send` receives the
/// message prefixed with the two-byte length framing of RFC 1035 §4.2.2;
/// `recv` is expected to deliver the reply without framing either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Proto {
    #[default]
    Udp,
    Tcp,
}

/// TSIG time window in seconds; the value nsupdate(8) uses.
const TSIG_FUDGE: u16 = 300;

/// TTL of the challenge TXT record. The record is short-lived, so caching is
/// nothing but a liability.
const CHALLENGE_TTL: u32 = 0;

/// Builds a `dns-01` solver that provisions the TXT record with a TSIG-signed
/// dynamic update.
///
/// - `id`: DNS message ID.
/// - `now`: wall clock in Unix seconds, sampled at signing time.
/// - `send`: puts the signed update on the wire.
/// - `recv`: when supplied, awaits the server's reply, whose TSIG is then
///   verified with the same key. Without it the update is fire-and-forget.
/// - `zone`: the zone to update.
/// - `keyname` / `key`: TSIG key name and HMAC-SHA256 secret.
pub fn nsupdate<N, S, SF, R, RF>(
    proto: Option<Proto>,
    id: u16,
    now: N,
    send: S,
    recv: Option<R>,
    zone: Name,
    keyname: Name,
    key: Vec<u8>,
) -> Solver
where
    N: Fn() -> u32 + Send + Sync + 'static,
    S: Fn(Vec<u8>) -> SF + Send + Sync + 'static,
    SF: Future<Output = Result<()>> + Send + 'static,
    R: Fn() -> RF + Send + Sync + 'static,
    RF: Future<Output = Result<Vec<u8>>> + Send + 'static,
{
    let proto = proto.unwrap_or_default();
    let now = Arc::new(now);
    let send = Arc::new(send);
    let recv = recv.map(Arc::new);

    dns_solver(move |dns| {
        let now = Arc::clone(&now);
        let send = Arc::clone(&send);
        let recv = recv.clone();
        let zone = zone.clone();
        let keyname = keyname.clone();
        let key = key.clone();

        async move {
            let mut message = update_message(id, &zone, &dns.record_name, &dns.content)?;

            let signer = TSigner::new(key, TsigAlgorithm::HmacSha256, keyname, TSIG_FUDGE)
                .map_err(|err| Error::Msg(format!("TSIG signer init failed: {err}")))?;

            let verifier = message
                .finalize(&signer, now())
                .map_err(|err| Error::Msg(format!("TSIG signing failed: {err}")))?;

            let mut bytes = message
                .to_vec()
                .map_err(|err| Error::Msg(format!("DNS update encoding failed: {err}")))?;

            if proto == Proto::Tcp {
                let len = u16::try_from(bytes.len())
                    .map_err(|_| Error::Msg("DNS update exceeds 64 KiB".to_owned()))?;
                let mut framed = len.to_be_bytes().to_vec();
                framed.append(&mut bytes);
                bytes = framed;
            }

            log::debug!(
                "sending dynamic update for {} to zone {zone}",
                dns.record_name
            );
            send(bytes).await?;

            if let Some(recv) = recv {
                let reply = recv().await?;

                if let Some(mut verify) = verifier {
                    verify(&reply)
                        .map_err(|err| Error::Msg(format!("TSIG reply verification failed: {err}")))?;
                }
            }

            Ok(())
        }
    })
}

/// The UPDATE message: zone in the zone section, the TXT addition in the
/// update section (RFC 2136 §2).
fn update_message(id: u16, zone: &Name, record_name: &str, content: &str) -> Result<Message> {
    // absolute name, whether or not the caller spelled the trailing dot
    let fqdn = format!("{}.", record_name.trim_end_matches('.'));
    let name = Name::from_utf8(&fqdn)
        .map_err(|err| Error::Msg(format!("bad record name {record_name}: {err}")))?;

    let mut zone_query = Query::new();
    zone_query
        .set_name(zone.clone())
        .set_query_class(DNSClass::IN)
        .set_query_type(RecordType::SOA);

    let mut record = Record::from_rdata(name, CHALLENGE_TTL, RData::TXT(TXT::new(vec![
        content.to_owned(),
    ])));
    record.set_dns_class(DNSClass::IN);

    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Update)
        .set_recursion_desired(false)
        .add_query(zone_query)
        .add_name_server(record);

    Ok(message)
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::api::{Challenge, ChallengeStatus, ChallengeType};

    fn dns_challenge() -> Challenge {
        Challenge {
            _type: ChallengeType::Dns01,
            url: "https://a/chall/1".to_owned(),
            status: ChallengeStatus::Pending,
            validated: None,
            error: None,
            token: "RRo2ZcXAEqxKvMH8RGcATjSK1KknLEUmauwfQ5i3gG8".to_owned(),
        }
    }

    fn capture_solver(proto: Option<Proto>, sent: &Arc<Mutex<Vec<Vec<u8>>>>) -> Solver {
        let sent = Arc::clone(sent);

        nsupdate(
            proto,
            17,
            || 1_700_000_000,
            move |bytes| {
                let sent = Arc::clone(&sent);
                async move {
                    sent.lock().push(bytes);
                    Ok(())
                }
            },
            None::<fn() -> std::future::Ready<Result<Vec<u8>>>>,
            Name::from_utf8("example.org.").unwrap(),
            Name::from_utf8("tsig-key.example.org.").unwrap(),
            b"0123456789abcdef0123456789abcdef".to_vec(),
        )
    }

    #[tokio::test]
    async fn test_nsupdate_packet() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let solver = capture_solver(None, &sent);
        assert_eq!(solver.challenge_type(), ChallengeType::Dns01);

        solver
            .provision("machine.example.org", &dns_challenge(), "abc.def")
            .await
            .unwrap();

        let packets = sent.lock();
        assert_eq!(packets.len(), 1);

        let message = Message::from_vec(&packets[0]).unwrap();
        assert_eq!(message.id(), 17);
        assert_eq!(message.op_code(), OpCode::Update);

        // zone section
        let zone = &message.queries()[0];
        assert_eq!(zone.name().to_utf8().trim_end_matches('.'), "example.org");
        assert_eq!(zone.query_type(), RecordType::SOA);

        // update section carries the challenge TXT record
        let update = &message.name_servers()[0];
        assert_eq!(
            update.name().to_utf8().trim_end_matches('.'),
            "_acme-challenge.machine.example.org"
        );
        let Some(RData::TXT(txt)) = update.data() else {
            panic!("expected TXT rdata, got {:?}", update.data());
        };
        assert_eq!(txt.txt_data().len(), 1);
        assert_eq!(
            &*txt.txt_data()[0],
            b"67MSe_XHxLTkK1FxD0lGwcHQWzMdI3ndFeOlQx7ZNBY".as_slice()
        );

        // signed: exactly one TSIG record in the additional section
        let tsig = &message.additionals()[0];
        assert_eq!(tsig.record_type(), RecordType::TSIG);
        assert_eq!(
            tsig.name().to_utf8().trim_end_matches('.'),
            "tsig-key.example.org"
        );
    }

    #[tokio::test]
    async fn test_nsupdate_tcp_framing() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let solver = capture_solver(Some(Proto::Tcp), &sent);

        solver
            .provision("machine.example.org", &dns_challenge(), "abc.def")
            .await
            .unwrap();

        let packets = sent.lock();
        let framed = &packets[0];
        let len = u16::from_be_bytes([framed[0], framed[1]]) as usize;
        assert_eq!(len, framed.len() - 2);

        // the framed payload is still a parseable update
        let message = Message::from_vec(&framed[2..]).unwrap();
        assert_eq!(message.op_code(), OpCode::Update);
    }

    #[tokio::test]
    async fn test_nsupdate_send_failure_propagates() {
        let solver = nsupdate(
            None,
            1,
            || 1_700_000_000,
            |_| async { Err(Error::Msg("network unreachable".to_owned())) },
            None::<fn() -> std::future::Ready<Result<Vec<u8>>>>,
            Name::from_utf8("example.org.").unwrap(),
            Name::from_utf8("tsig-key.example.org.").unwrap(),
            vec![0; 32],
        );

        let err = solver
            .provision("machine.example.org", &dns_challenge(), "abc.def")
            .await
            .unwrap_err();
        assert_eq!(err, Error::Msg("network unreachable".to_owned()));
    }
}
