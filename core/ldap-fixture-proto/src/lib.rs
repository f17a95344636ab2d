//! LDAPv3 wire protocol for ldap-fixture.
//!
//! Covers the operations a test fixture needs to serve (bind, search,
//! add, modify, delete, compare, abandon, unbind and the Who Am I extended
//! operation). BER handling comes from `lber`; [`LdapCodec`] frames
//! messages for `tokio_util::codec::Framed`.

mod codec;
mod error;
mod message;
mod result;

pub use codec::{LdapCodec, MAX_MESSAGE_SIZE};
pub use error::{ProtoError, ProtoResult};
pub use message::{
    AddRequest, BindAuth, BindRequest, CompareRequest, ExtendedRequest, ExtendedResponse,
    LdapMessage, MAX_NESTING_DEPTH, Modification, ModifyOperation, ModifyRequest, ProtocolOp,
    SearchEntry, SearchRequest, WHOAMI_OID,
};
pub use result::{LdapResult, ResultCode};
