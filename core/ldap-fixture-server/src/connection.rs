//! One client connection: read a request, run it on the session, reply.

use crate::error::{DirectoryError, DirectoryResult};
use crate::service::DirectoryService;
use crate::session::{CoreSession, SearchParams};
use futures::{SinkExt, StreamExt};
use ldap_fixture_proto::{
    BindAuth, ExtendedResponse, LdapCodec, LdapMessage, LdapResult, ProtocolOp, ResultCode,
    SearchEntry, WHOAMI_OID,
};
use ldap_fixture_types::{Dn, Entry};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What to do after a request.
enum Reply {
    Send(Vec<LdapMessage>),
    Close,
}

pub(crate) async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    service: Arc<DirectoryService>,
    shutdown: CancellationToken,
) {
    let mut session = match service.anonymous_session() {
        Ok(session) => session,
        Err(e) => {
            warn!(peer = %peer, error = %e, "refusing connection");
            return;
        }
    };
    let mut framed = Framed::new(stream, LdapCodec);

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => {
                break;
            }
            next = framed.next() => next,
        };
        let message = match next {
            Some(Ok(message)) => message,
            None => {
                debug!(peer = %peer, "connection closed by client");
                break;
            }
            Some(Err(e)) => {
                warn!(peer = %peer, error = %e, "closing connection after unreadable request");
                break;
            }
        };

        // Session operations hit the partition stores, so they run on the
        // blocking pool and hand the session back.
        let dispatched = tokio::task::spawn_blocking(move || {
            let reply = dispatch(&mut session, message);
            (session, reply)
        })
        .await;
        let replies = match dispatched {
            Ok((returned, Reply::Send(replies))) => {
                session = returned;
                replies
            }
            Ok((_, Reply::Close)) => break,
            Err(e) => {
                warn!(peer = %peer, error = %e, "spawn_blocking panicked");
                break;
            }
        };
        for reply in replies {
            if let Err(e) = framed.feed(reply).await {
                debug!(peer = %peer, error = %e, "failed to write response");
                return;
            }
        }
        if let Err(e) = framed.flush().await {
            debug!(peer = %peer, error = %e, "failed to flush responses");
            return;
        }
    }
    debug!(peer = %peer, "connection closed");
}

fn to_result(outcome: DirectoryResult<()>) -> LdapResult {
    match outcome {
        Ok(()) => LdapResult::success(),
        Err(err) => error_result(err),
    }
}

fn error_result(err: DirectoryError) -> LdapResult {
    let code = err.result_code();
    match err {
        DirectoryError::Operation(op) => {
            let result = LdapResult::new(code, op.message);
            match op.matched_dn {
                Some(matched) => result.with_matched_dn(matched),
                None => result,
            }
        }
        other => LdapResult::new(code, other.to_string()),
    }
}

fn dispatch(session: &mut CoreSession, message: LdapMessage) -> Reply {
    let id = message.id;
    let reply = |op: ProtocolOp| Reply::Send(vec![LdapMessage::new(id, op)]);

    match message.op {
        ProtocolOp::BindRequest(req) => {
            let result = if req.version != 3 {
                LdapResult::new(ResultCode::ProtocolError, "only LDAPv3 is supported")
            } else {
                match req.auth {
                    BindAuth::Simple(password) => to_result(session.bind(&req.name, &password)),
                    BindAuth::Sasl { mechanism } => LdapResult::new(
                        ResultCode::AuthMethodNotSupported,
                        format!("SASL mechanism '{mechanism}' is not supported"),
                    ),
                }
            };
            reply(ProtocolOp::BindResponse(result))
        }
        ProtocolOp::UnbindRequest => Reply::Close,
        ProtocolOp::SearchRequest(req) => {
            let params = SearchParams::new(req.base, req.scope, req.filter)
                .with_attributes(req.attributes)
                .with_size_limit(usize::try_from(req.size_limit).unwrap_or(0))
                .with_types_only(req.types_only);
            let mut replies = Vec::new();
            let done = match session.search(&params) {
                Ok(outcome) => {
                    for entry in outcome.entries {
                        let dn = entry.dn().to_string();
                        replies.push(LdapMessage::new(
                            id,
                            ProtocolOp::SearchResultEntry(SearchEntry {
                                dn,
                                attributes: entry.into_attributes(),
                            }),
                        ));
                    }
                    if outcome.size_limit_exceeded {
                        LdapResult::new(ResultCode::SizeLimitExceeded, "size limit exceeded")
                    } else {
                        LdapResult::success()
                    }
                }
                Err(err) => error_result(err),
            };
            replies.push(LdapMessage::new(id, ProtocolOp::SearchResultDone(done)));
            Reply::Send(replies)
        }
        ProtocolOp::ModifyRequest(req) => reply(ProtocolOp::ModifyResponse(to_result(
            session.modify(&req.dn, &req.changes),
        ))),
        ProtocolOp::AddRequest(req) => {
            let result = match Dn::parse(&req.dn) {
                Ok(dn) => to_result(session.add(Entry::from_attributes(dn, req.attributes))),
                Err(e) => LdapResult::new(ResultCode::InvalidDnSyntax, e.to_string()),
            };
            reply(ProtocolOp::AddResponse(result))
        }
        ProtocolOp::DelRequest(dn) => {
            reply(ProtocolOp::DelResponse(to_result(session.delete(&dn))))
        }
        ProtocolOp::CompareRequest(req) => {
            let result = match session.compare(&req.dn, &req.attribute, &req.value) {
                Ok(true) => LdapResult::new(ResultCode::CompareTrue, ""),
                Ok(false) => LdapResult::new(ResultCode::CompareFalse, ""),
                Err(err) => error_result(err),
            };
            reply(ProtocolOp::CompareResponse(result))
        }
        // Operations complete before the next request is read, so there is
        // never anything left to abandon.
        ProtocolOp::AbandonRequest(_) => Reply::Send(Vec::new()),
        ProtocolOp::ExtendedRequest(req) if req.name == WHOAMI_OID => {
            reply(ProtocolOp::ExtendedResponse(ExtendedResponse {
                result: LdapResult::success(),
                name: None,
                value: Some(session.who_am_i().into_bytes()),
            }))
        }
        ProtocolOp::ExtendedRequest(req) => reply(ProtocolOp::ExtendedResponse(ExtendedResponse {
            result: LdapResult::new(
                ResultCode::ProtocolError,
                format!("unsupported extended operation {}", req.name),
            ),
            name: None,
            value: None,
        })),
        other => {
            warn!(tag = other.tag(), "client sent a response operation");
            Reply::Close
        }
    }
}
