//! Framing of LDAP messages over a byte stream.
//!
//! [`LdapCodec`] plugs into `tokio_util::codec::Framed`: the outer
//! SEQUENCE header is read first so oversized frames are refused before
//! their body is buffered.

use crate::error::ProtoError;
use crate::message::{read_header, LdapMessage};
use bytes::BytesMut;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum message size (8 MB).
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

const LDAP_MESSAGE_TAG: u8 = 0x30;

/// Decodes requests and encodes responses, one `LDAPMessage` per frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct LdapCodec;

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

impl Decoder for LdapCodec {
    type Item = LdapMessage;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<LdapMessage>, io::Error> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };
        if first != LDAP_MESSAGE_TAG {
            return Err(invalid(format!(
                "expected LDAPMessage sequence, found tag {first:#04x}"
            )));
        }
        let (header, len) = match read_header(buf) {
            Ok((_, header, len)) => (header, len),
            Err(ProtoError::Truncated) => return Ok(None),
            Err(e) => return Err(invalid(e.to_string())),
        };

        // Validate size
        if len > MAX_MESSAGE_SIZE {
            return Err(invalid(format!("message too large: {len} bytes")));
        }

        let total = header + len;
        if buf.len() < total {
            buf.reserve(total - buf.len());
            return Ok(None);
        }
        let frame = buf.split_to(total);
        LdapMessage::decode(&frame)
            .map(Some)
            .map_err(|e| invalid(format!("LDAP decode error: {e}")))
    }
}

impl Encoder<LdapMessage> for LdapCodec {
    type Error = io::Error;

    fn encode(&mut self, message: LdapMessage, dst: &mut BytesMut) -> Result<(), io::Error> {
        let start = dst.len();
        message.encode_into(dst)?;

        // Validate size
        let size = dst.len() - start;
        if size > MAX_MESSAGE_SIZE {
            dst.truncate(start);
            return Err(invalid(format!("message too large: {size} bytes")));
        }
        Ok(())
    }
}
