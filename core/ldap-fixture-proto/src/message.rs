//! The `LDAPMessage` envelope and the protocol operations it carries.
//!
//! Requests are decoded from `lber` structure tags; responses are built
//! from `lber` tag values and encoded with `lber::write`.

use crate::error::{ProtoError, ProtoResult};
use crate::result::LdapResult;
use bytes::BytesMut;
use lber::common::TagClass;
use lber::parse::parse_tag;
use lber::structure::{StructureTag, PL};
use lber::structures::{ASNTag, Boolean, Enumerated, Integer, OctetString, Sequence, Set, Tag};
use lber::universal::Types;
use lber::write;
use ldap_fixture_types::{Attribute, Filter, SearchScope};
use std::io;
use std::vec::IntoIter;

/// Object identifier of the Who Am I extended operation (RFC 4532).
pub const WHOAMI_OID: &str = "1.3.6.1.4.1.4203.1.11.3";

/// Deepest nesting of constructed elements accepted in one message.
pub const MAX_NESTING_DEPTH: usize = 100;

/// Application tag numbers of the protocol operations.
mod app {
    pub const BIND_REQUEST: u64 = 0;
    pub const BIND_RESPONSE: u64 = 1;
    pub const UNBIND_REQUEST: u64 = 2;
    pub const SEARCH_REQUEST: u64 = 3;
    pub const SEARCH_RESULT_ENTRY: u64 = 4;
    pub const SEARCH_RESULT_DONE: u64 = 5;
    pub const MODIFY_REQUEST: u64 = 6;
    pub const MODIFY_RESPONSE: u64 = 7;
    pub const ADD_REQUEST: u64 = 8;
    pub const ADD_RESPONSE: u64 = 9;
    pub const DEL_REQUEST: u64 = 10;
    pub const DEL_RESPONSE: u64 = 11;
    pub const COMPARE_REQUEST: u64 = 14;
    pub const COMPARE_RESPONSE: u64 = 15;
    pub const ABANDON_REQUEST: u64 = 16;
    pub const EXTENDED_REQUEST: u64 = 23;
    pub const EXTENDED_RESPONSE: u64 = 24;
}

/// Context tag numbers inside operations.
mod ctx {
    pub const CONTROLS: u64 = 0;
    pub const AUTH_SIMPLE: u64 = 0;
    pub const AUTH_SASL: u64 = 3;
    pub const EXT_REQUEST_NAME: u64 = 0;
    pub const EXT_REQUEST_VALUE: u64 = 1;
    pub const EXT_RESPONSE_NAME: u64 = 10;
    pub const EXT_RESPONSE_VALUE: u64 = 11;
}

mod filter_id {
    pub const AND: u64 = 0;
    pub const OR: u64 = 1;
    pub const NOT: u64 = 2;
    pub const EQUALITY: u64 = 3;
    pub const SUBSTRINGS: u64 = 4;
    pub const GREATER_OR_EQUAL: u64 = 5;
    pub const LESS_OR_EQUAL: u64 = 6;
    pub const PRESENT: u64 = 7;
    pub const APPROX: u64 = 8;
    pub const SUB_INITIAL: u64 = 0;
    pub const SUB_ANY: u64 = 1;
    pub const SUB_FINAL: u64 = 2;
}

const SEQUENCE: u64 = Types::Sequence as u64;
const SET: u64 = Types::Set as u64;

/// Bind credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindAuth {
    Simple(String),
    /// SASL is decoded so it can be refused with `authMethodNotSupported`.
    Sasl { mechanism: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRequest {
    pub version: i64,
    pub name: String,
    pub auth: BindAuth,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base: String,
    pub scope: SearchScope,
    pub deref_aliases: i64,
    pub size_limit: i64,
    pub time_limit: i64,
    pub types_only: bool,
    pub filter: Filter,
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchEntry {
    pub dn: String,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOperation {
    Add,
    Delete,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub operation: ModifyOperation,
    pub attribute: Attribute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyRequest {
    pub dn: String,
    pub changes: Vec<Modification>,
}

/// An add request. Attribute values arrive exactly as sent, duplicates
/// included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    pub dn: String,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareRequest {
    pub dn: String,
    pub attribute: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedRequest {
    pub name: String,
    pub value: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedResponse {
    pub result: LdapResult,
    pub name: Option<String>,
    pub value: Option<Vec<u8>>,
}

/// Every operation the server reads or writes.
///
/// Requests decode and encode; responses only encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolOp {
    BindRequest(BindRequest),
    BindResponse(LdapResult),
    UnbindRequest,
    SearchRequest(SearchRequest),
    SearchResultEntry(SearchEntry),
    SearchResultDone(LdapResult),
    ModifyRequest(ModifyRequest),
    ModifyResponse(LdapResult),
    AddRequest(AddRequest),
    AddResponse(LdapResult),
    DelRequest(String),
    DelResponse(LdapResult),
    CompareRequest(CompareRequest),
    CompareResponse(LdapResult),
    AbandonRequest(i64),
    ExtendedRequest(ExtendedRequest),
    ExtendedResponse(ExtendedResponse),
}

impl ProtocolOp {
    /// Application tag number of the operation.
    pub fn tag(&self) -> u64 {
        use app::*;
        match self {
            ProtocolOp::BindRequest(_) => BIND_REQUEST,
            ProtocolOp::BindResponse(_) => BIND_RESPONSE,
            ProtocolOp::UnbindRequest => UNBIND_REQUEST,
            ProtocolOp::SearchRequest(_) => SEARCH_REQUEST,
            ProtocolOp::SearchResultEntry(_) => SEARCH_RESULT_ENTRY,
            ProtocolOp::SearchResultDone(_) => SEARCH_RESULT_DONE,
            ProtocolOp::ModifyRequest(_) => MODIFY_REQUEST,
            ProtocolOp::ModifyResponse(_) => MODIFY_RESPONSE,
            ProtocolOp::AddRequest(_) => ADD_REQUEST,
            ProtocolOp::AddResponse(_) => ADD_RESPONSE,
            ProtocolOp::DelRequest(_) => DEL_REQUEST,
            ProtocolOp::DelResponse(_) => DEL_RESPONSE,
            ProtocolOp::CompareRequest(_) => COMPARE_REQUEST,
            ProtocolOp::CompareResponse(_) => COMPARE_RESPONSE,
            ProtocolOp::AbandonRequest(_) => ABANDON_REQUEST,
            ProtocolOp::ExtendedRequest(_) => EXTENDED_REQUEST,
            ProtocolOp::ExtendedResponse(_) => EXTENDED_RESPONSE,
        }
    }
}

/// An `LDAPMessage`. Controls are accepted on input and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapMessage {
    pub id: i64,
    pub op: ProtocolOp,
}

impl LdapMessage {
    pub fn new(id: i64, op: ProtocolOp) -> Self {
        Self { id, op }
    }

    /// Decodes one complete request, including its outer SEQUENCE header.
    pub fn decode(frame: &[u8]) -> ProtoResult<Self> {
        check_nesting(frame)?;
        let (rest, tag) = match parse_tag(frame) {
            Ok(parsed) => parsed,
            Err(e) if e.is_incomplete() => return Err(ProtoError::Truncated),
            Err(_) => return Err(ProtoError::Malformed),
        };
        if !rest.is_empty() {
            return Err(ProtoError::TrailingData);
        }

        let mut msg = Fields::of(tag, TagClass::Universal, SEQUENCE, "LDAPMessage")?;
        let id = integer(msg.next("message ID")?, "message ID")?;
        let op = decode_op(msg.next("protocol operation")?)?;
        if msg.peek_is(TagClass::Context, ctx::CONTROLS) {
            msg.next("controls")?;
        }
        msg.finish()?;
        Ok(Self { id, op })
    }

    pub fn into_structure(self) -> StructureTag {
        Tag::Sequence(Sequence {
            inner: vec![integer_tag(self.id), encode_op(self.op)],
            ..Default::default()
        })
        .into_structure()
    }

    /// Appends the BER encoding to `buf`.
    pub fn encode_into(self, buf: &mut BytesMut) -> io::Result<()> {
        write::encode_into(buf, self.into_structure())
    }
}

// ── Decoding ────────────────────────────────────────────────────

/// The children of one constructed element, consumed in order.
struct Fields {
    items: IntoIter<StructureTag>,
}

impl Fields {
    fn of(tag: StructureTag, class: TagClass, id: u64, what: &'static str) -> ProtoResult<Self> {
        match expect_tag(tag, class, id, what)?.payload {
            PL::C(items) => Ok(Self {
                items: items.into_iter(),
            }),
            PL::P(_) => Err(ProtoError::WrongForm(what)),
        }
    }

    fn next(&mut self, what: &'static str) -> ProtoResult<StructureTag> {
        self.items.next().ok_or(ProtoError::Missing(what))
    }

    fn peek_is(&self, class: TagClass, id: u64) -> bool {
        self.items
            .as_slice()
            .first()
            .is_some_and(|t| t.class == class && t.id == id)
    }

    fn finish(mut self) -> ProtoResult<()> {
        match self.items.next() {
            Some(_) => Err(ProtoError::TrailingData),
            None => Ok(()),
        }
    }

    fn into_items(self) -> IntoIter<StructureTag> {
        self.items
    }
}

fn expect_tag(
    tag: StructureTag,
    class: TagClass,
    id: u64,
    what: &'static str,
) -> ProtoResult<StructureTag> {
    if tag.class == class && tag.id == id {
        Ok(tag)
    } else {
        Err(ProtoError::UnexpectedTag {
            what,
            class: tag.class,
            id: tag.id,
        })
    }
}

fn primitive(
    tag: StructureTag,
    class: TagClass,
    id: u64,
    what: &'static str,
) -> ProtoResult<Vec<u8>> {
    match expect_tag(tag, class, id, what)?.payload {
        PL::P(bytes) => Ok(bytes),
        PL::C(_) => Err(ProtoError::WrongForm(what)),
    }
}

fn utf8(bytes: Vec<u8>, what: &'static str) -> ProtoResult<String> {
    String::from_utf8(bytes).map_err(|_| ProtoError::InvalidUtf8(what))
}

fn octets(tag: StructureTag, what: &'static str) -> ProtoResult<Vec<u8>> {
    primitive(tag, TagClass::Universal, Types::OctetString as u64, what)
}

fn text(tag: StructureTag, what: &'static str) -> ProtoResult<String> {
    utf8(octets(tag, what)?, what)
}

/// Attribute values are carried as text; non-UTF-8 bytes are replaced.
fn value_string(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(value) => value,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

fn decode_integer(bytes: &[u8]) -> ProtoResult<i64> {
    if bytes.is_empty() || bytes.len() > 8 {
        return Err(ProtoError::InvalidInteger);
    }
    let sign = if bytes[0] & 0x80 != 0 { -1i64 } else { 0 };
    Ok(bytes.iter().fold(sign, |acc, &b| (acc << 8) | i64::from(b)))
}

fn integer(tag: StructureTag, what: &'static str) -> ProtoResult<i64> {
    decode_integer(&primitive(tag, TagClass::Universal, Types::Integer as u64, what)?)
}

fn enumerated(tag: StructureTag, what: &'static str) -> ProtoResult<i64> {
    decode_integer(&primitive(tag, TagClass::Universal, Types::Enumerated as u64, what)?)
}

fn boolean(tag: StructureTag, what: &'static str) -> ProtoResult<bool> {
    match primitive(tag, TagClass::Universal, Types::Boolean as u64, what)?.as_slice() {
        [value] => Ok(*value != 0),
        _ => Err(ProtoError::InvalidBoolean),
    }
}

fn decode_op(tag: StructureTag) -> ProtoResult<ProtocolOp> {
    use app::*;
    if tag.class != TagClass::Application {
        return Err(ProtoError::UnexpectedTag {
            what: "protocol operation",
            class: tag.class,
            id: tag.id,
        });
    }
    let id = tag.id;
    let what = "protocol operation";
    match id {
        UNBIND_REQUEST => {
            primitive(tag, TagClass::Application, id, what)?;
            Ok(ProtocolOp::UnbindRequest)
        }
        DEL_REQUEST => {
            let dn = utf8(primitive(tag, TagClass::Application, id, "entry name")?, "entry name")?;
            Ok(ProtocolOp::DelRequest(dn))
        }
        ABANDON_REQUEST => {
            let target = decode_integer(&primitive(tag, TagClass::Application, id, "message ID")?)?;
            Ok(ProtocolOp::AbandonRequest(target))
        }
        BIND_REQUEST => decode_bind(Fields::of(tag, TagClass::Application, id, what)?),
        SEARCH_REQUEST => decode_search(Fields::of(tag, TagClass::Application, id, what)?),
        MODIFY_REQUEST => decode_modify(Fields::of(tag, TagClass::Application, id, what)?),
        ADD_REQUEST => decode_add(Fields::of(tag, TagClass::Application, id, what)?),
        COMPARE_REQUEST => decode_compare(Fields::of(tag, TagClass::Application, id, what)?),
        EXTENDED_REQUEST => decode_extended(Fields::of(tag, TagClass::Application, id, what)?),
        other => Err(ProtoError::UnsupportedOperation(other)),
    }
}

fn decode_bind(mut f: Fields) -> ProtoResult<ProtocolOp> {
    let version = integer(f.next("version")?, "version")?;
    let name = text(f.next("bind name")?, "bind name")?;
    let auth = f.next("authentication")?;
    let auth = match (auth.class, auth.id) {
        (TagClass::Context, ctx::AUTH_SIMPLE) => {
            let password = primitive(auth, TagClass::Context, ctx::AUTH_SIMPLE, "password")?;
            BindAuth::Simple(utf8(password, "password")?)
        }
        (TagClass::Context, ctx::AUTH_SASL) => {
            let mut sasl = Fields::of(auth, TagClass::Context, ctx::AUTH_SASL, "SASL credentials")?;
            BindAuth::Sasl {
                mechanism: text(sasl.next("SASL mechanism")?, "SASL mechanism")?,
            }
        }
        (class, id) => {
            return Err(ProtoError::UnexpectedTag {
                what: "authentication",
                class,
                id,
            });
        }
    };
    f.finish()?;
    Ok(ProtocolOp::BindRequest(BindRequest { version, name, auth }))
}

fn decode_search(mut f: Fields) -> ProtoResult<ProtocolOp> {
    let base = text(f.next("search base")?, "search base")?;
    let scope = match enumerated(f.next("scope")?, "scope")? {
        0 => SearchScope::Base,
        1 => SearchScope::OneLevel,
        2 => SearchScope::Subtree,
        value => return Err(ProtoError::InvalidEnum { field: "scope", value }),
    };
    let deref_aliases = enumerated(f.next("alias dereferencing")?, "alias dereferencing")?;
    let size_limit = integer(f.next("size limit")?, "size limit")?;
    let time_limit = integer(f.next("time limit")?, "time limit")?;
    let types_only = boolean(f.next("types only")?, "types only")?;
    let filter = decode_filter(f.next("filter")?)?;
    let attributes = Fields::of(f.next("attributes")?, TagClass::Universal, SEQUENCE, "attributes")?
        .into_items()
        .map(|attr| text(attr, "attribute selector"))
        .collect::<ProtoResult<Vec<_>>>()?;
    f.finish()?;
    Ok(ProtocolOp::SearchRequest(SearchRequest {
        base,
        scope,
        deref_aliases,
        size_limit,
        time_limit,
        types_only,
        filter,
        attributes,
    }))
}

fn decode_modify(mut f: Fields) -> ProtoResult<ProtocolOp> {
    let dn = text(f.next("entry name")?, "entry name")?;
    let mut changes = Vec::new();
    let list = Fields::of(f.next("changes")?, TagClass::Universal, SEQUENCE, "changes")?;
    for change in list.into_items() {
        let mut change = Fields::of(change, TagClass::Universal, SEQUENCE, "change")?;
        let operation = match enumerated(change.next("modify operation")?, "modify operation")? {
            0 => ModifyOperation::Add,
            1 => ModifyOperation::Delete,
            2 => ModifyOperation::Replace,
            value => {
                return Err(ProtoError::InvalidEnum {
                    field: "modify operation",
                    value,
                });
            }
        };
        let attribute = decode_attribute(change.next("modification")?)?;
        change.finish()?;
        changes.push(Modification { operation, attribute });
    }
    f.finish()?;
    Ok(ProtocolOp::ModifyRequest(ModifyRequest { dn, changes }))
}

fn decode_add(mut f: Fields) -> ProtoResult<ProtocolOp> {
    let dn = text(f.next("entry name")?, "entry name")?;
    let attributes = Fields::of(f.next("attributes")?, TagClass::Universal, SEQUENCE, "attributes")?
        .into_items()
        .map(decode_attribute)
        .collect::<ProtoResult<Vec<_>>>()?;
    f.finish()?;
    Ok(ProtocolOp::AddRequest(AddRequest { dn, attributes }))
}

fn decode_compare(mut f: Fields) -> ProtoResult<ProtocolOp> {
    let dn = text(f.next("entry name")?, "entry name")?;
    let mut ava = Fields::of(f.next("assertion")?, TagClass::Universal, SEQUENCE, "assertion")?;
    let attribute = text(ava.next("attribute description")?, "attribute description")?;
    let value = value_string(octets(ava.next("assertion value")?, "assertion value")?);
    ava.finish()?;
    f.finish()?;
    Ok(ProtocolOp::CompareRequest(CompareRequest { dn, attribute, value }))
}

fn decode_extended(mut f: Fields) -> ProtoResult<ProtocolOp> {
    let name = f.next("request name")?;
    let name = primitive(name, TagClass::Context, ctx::EXT_REQUEST_NAME, "request name")?;
    let name = utf8(name, "request name")?;
    let value = if f.peek_is(TagClass::Context, ctx::EXT_REQUEST_VALUE) {
        let value = f.next("request value")?;
        Some(primitive(value, TagClass::Context, ctx::EXT_REQUEST_VALUE, "request value")?)
    } else {
        None
    };
    f.finish()?;
    Ok(ProtocolOp::ExtendedRequest(ExtendedRequest { name, value }))
}

/// Values are kept as sent, so duplicates reach schema checking.
fn decode_attribute(tag: StructureTag) -> ProtoResult<Attribute> {
    let mut f = Fields::of(tag, TagClass::Universal, SEQUENCE, "attribute")?;
    let name = text(f.next("attribute description")?, "attribute description")?;
    let set = f.next("attribute values")?;
    let values = Fields::of(set, TagClass::Universal, SET, "attribute values")?
        .into_items()
        .map(|value| octets(value, "attribute value").map(value_string))
        .collect::<ProtoResult<Vec<_>>>()?;
    f.finish()?;
    Ok(Attribute { name, values })
}

fn decode_filter(tag: StructureTag) -> ProtoResult<Filter> {
    use filter_id::*;
    if tag.class != TagClass::Context {
        return Err(ProtoError::UnexpectedTag {
            what: "filter",
            class: tag.class,
            id: tag.id,
        });
    }
    let id = tag.id;
    let filter = match id {
        AND | OR => {
            let items = Fields::of(tag, TagClass::Context, id, "filter set")?
                .into_items()
                .map(decode_filter)
                .collect::<ProtoResult<Vec<_>>>()?;
            if id == AND { Filter::And(items) } else { Filter::Or(items) }
        }
        NOT => {
            let mut f = Fields::of(tag, TagClass::Context, id, "negated filter")?;
            let inner = decode_filter(f.next("negated filter")?)?;
            f.finish()?;
            Filter::Not(Box::new(inner))
        }
        EQUALITY | GREATER_OR_EQUAL | LESS_OR_EQUAL | APPROX => {
            let mut f = Fields::of(tag, TagClass::Context, id, "assertion")?;
            let attr = text(f.next("attribute description")?, "attribute description")?;
            let value = value_string(octets(f.next("assertion value")?, "assertion value")?);
            f.finish()?;
            match id {
                EQUALITY => Filter::Equality(attr, value),
                GREATER_OR_EQUAL => Filter::GreaterOrEqual(attr, value),
                LESS_OR_EQUAL => Filter::LessOrEqual(attr, value),
                _ => Filter::Approx(attr, value),
            }
        }
        SUBSTRINGS => {
            let mut f = Fields::of(tag, TagClass::Context, id, "substring filter")?;
            let attr = text(f.next("attribute description")?, "attribute description")?;
            let pieces = f.next("substrings")?;
            let pieces = Fields::of(pieces, TagClass::Universal, SEQUENCE, "substrings")?;
            let mut initial = None;
            let mut any = Vec::new();
            let mut final_value = None;
            for piece in pieces.into_items() {
                let (class, piece_id) = (piece.class, piece.id);
                if class != TagClass::Context || piece_id > SUB_FINAL {
                    return Err(ProtoError::UnexpectedTag {
                        what: "substring",
                        class,
                        id: piece_id,
                    });
                }
                let value = value_string(primitive(piece, class, piece_id, "substring")?);
                match piece_id {
                    SUB_INITIAL => initial = Some(value),
                    SUB_ANY => any.push(value),
                    _ => final_value = Some(value),
                }
            }
            f.finish()?;
            Filter::Substrings {
                attr,
                initial,
                any,
                final_value,
            }
        }
        PRESENT => {
            let attr = primitive(tag, TagClass::Context, id, "attribute description")?;
            Filter::Present(utf8(attr, "attribute description")?)
        }
        other => return Err(ProtoError::UnsupportedFilter(other)),
    };
    Ok(filter)
}

/// Walks the TLV headers of `frame` without recursing and rejects
/// constructed elements nested deeper than [`MAX_NESTING_DEPTH`].
fn check_nesting(frame: &[u8]) -> ProtoResult<()> {
    let mut ends: Vec<usize> = Vec::new();
    let mut pos = 0;
    while pos < frame.len() {
        while ends.last().is_some_and(|&end| pos >= end) {
            ends.pop();
        }
        let (constructed, header, len) = read_header(&frame[pos..])?;
        let content = pos + header;
        let end = content.checked_add(len).ok_or(ProtoError::InvalidLength)?;
        if end > ends.last().copied().unwrap_or(frame.len()) {
            return Err(ProtoError::Truncated);
        }
        if constructed {
            ends.push(end);
            if ends.len() > MAX_NESTING_DEPTH {
                return Err(ProtoError::NestingTooDeep(MAX_NESTING_DEPTH));
            }
            pos = content;
        } else {
            pos = end;
        }
    }
    Ok(())
}

/// Reads one identifier and length header: `(constructed, header length,
/// content length)`. Indefinite lengths are refused.
pub(crate) fn read_header(bytes: &[u8]) -> ProtoResult<(bool, usize, usize)> {
    let first = *bytes.first().ok_or(ProtoError::Truncated)?;
    let mut pos = 1;
    if first & 0x1f == 0x1f {
        loop {
            let b = *bytes.get(pos).ok_or(ProtoError::Truncated)?;
            pos += 1;
            if b & 0x80 == 0 {
                break;
            }
        }
    }
    let len_byte = *bytes.get(pos).ok_or(ProtoError::Truncated)?;
    pos += 1;
    let len = if len_byte & 0x80 == 0 {
        usize::from(len_byte)
    } else {
        let count = usize::from(len_byte & 0x7f);
        if count == 0 || count > 4 {
            return Err(ProtoError::InvalidLength);
        }
        let digits = bytes.get(pos..pos + count).ok_or(ProtoError::Truncated)?;
        pos += count;
        digits.iter().fold(0usize, |acc, &b| (acc << 8) | usize::from(b))
    };
    Ok((first & 0x20 != 0, pos, len))
}

// ── Encoding ────────────────────────────────────────────────────

fn octet_string(value: impl AsRef<[u8]>) -> Tag {
    Tag::OctetString(OctetString {
        inner: value.as_ref().to_vec(),
        ..Default::default()
    })
}

fn tagged_octets(class: TagClass, id: u64, value: impl AsRef<[u8]>) -> Tag {
    Tag::OctetString(OctetString {
        id,
        class,
        inner: value.as_ref().to_vec(),
    })
}

fn integer_tag(inner: i64) -> Tag {
    Tag::Integer(Integer {
        inner,
        ..Default::default()
    })
}

fn enumerated_tag(inner: i64) -> Tag {
    Tag::Enumerated(Enumerated {
        inner,
        ..Default::default()
    })
}

fn sequence(inner: Vec<Tag>) -> Tag {
    Tag::Sequence(Sequence {
        inner,
        ..Default::default()
    })
}

fn constructed(class: TagClass, id: u64, inner: Vec<Tag>) -> Tag {
    Tag::Sequence(Sequence { id, class, inner })
}

fn result_fields(result: &LdapResult) -> Vec<Tag> {
    vec![
        enumerated_tag(result.code.code()),
        octet_string(&result.matched_dn),
        octet_string(&result.message),
    ]
}

fn attribute_tag(attribute: &Attribute) -> Tag {
    sequence(vec![
        octet_string(&attribute.name),
        Tag::Set(Set {
            inner: attribute.values.iter().map(octet_string).collect(),
            ..Default::default()
        }),
    ])
}

fn attribute_list(attributes: &[Attribute]) -> Tag {
    sequence(attributes.iter().map(attribute_tag).collect())
}

fn encode_op(op: ProtocolOp) -> Tag {
    let id = op.tag();
    let app = |inner: Vec<Tag>| constructed(TagClass::Application, id, inner);
    match op {
        ProtocolOp::BindRequest(req) => {
            let auth = match &req.auth {
                BindAuth::Simple(password) => {
                    tagged_octets(TagClass::Context, ctx::AUTH_SIMPLE, password)
                }
                BindAuth::Sasl { mechanism } => {
                    constructed(TagClass::Context, ctx::AUTH_SASL, vec![octet_string(mechanism)])
                }
            };
            app(vec![integer_tag(req.version), octet_string(&req.name), auth])
        }
        ProtocolOp::UnbindRequest => tagged_octets(TagClass::Application, id, b""),
        ProtocolOp::SearchRequest(req) => {
            let scope = match req.scope {
                SearchScope::Base => 0,
                SearchScope::OneLevel => 1,
                SearchScope::Subtree => 2,
            };
            app(vec![
                octet_string(&req.base),
                enumerated_tag(scope),
                enumerated_tag(req.deref_aliases),
                integer_tag(req.size_limit),
                integer_tag(req.time_limit),
                Tag::Boolean(Boolean {
                    inner: req.types_only,
                    ..Default::default()
                }),
                encode_filter(&req.filter),
                sequence(req.attributes.iter().map(octet_string).collect()),
            ])
        }
        ProtocolOp::SearchResultEntry(entry) => {
            app(vec![octet_string(&entry.dn), attribute_list(&entry.attributes)])
        }
        ProtocolOp::ModifyRequest(req) => {
            let changes = req
                .changes
                .iter()
                .map(|change| {
                    let operation = match change.operation {
                        ModifyOperation::Add => 0,
                        ModifyOperation::Delete => 1,
                        ModifyOperation::Replace => 2,
                    };
                    sequence(vec![enumerated_tag(operation), attribute_tag(&change.attribute)])
                })
                .collect();
            app(vec![octet_string(&req.dn), sequence(changes)])
        }
        ProtocolOp::AddRequest(req) => {
            app(vec![octet_string(&req.dn), attribute_list(&req.attributes)])
        }
        ProtocolOp::DelRequest(dn) => tagged_octets(TagClass::Application, id, dn),
        ProtocolOp::CompareRequest(req) => app(vec![
            octet_string(&req.dn),
            sequence(vec![octet_string(&req.attribute), octet_string(&req.value)]),
        ]),
        ProtocolOp::AbandonRequest(target) => Tag::Integer(Integer {
            id,
            class: TagClass::Application,
            inner: target,
        }),
        ProtocolOp::ExtendedRequest(req) => {
            let name = tagged_octets(TagClass::Context, ctx::EXT_REQUEST_NAME, &req.name);
            let mut inner = vec![name];
            if let Some(value) = &req.value {
                inner.push(tagged_octets(TagClass::Context, ctx::EXT_REQUEST_VALUE, value));
            }
            app(inner)
        }
        ProtocolOp::ExtendedResponse(resp) => {
            let mut inner = result_fields(&resp.result);
            if let Some(name) = &resp.name {
                inner.push(tagged_octets(TagClass::Context, ctx::EXT_RESPONSE_NAME, name));
            }
            if let Some(value) = &resp.value {
                inner.push(tagged_octets(TagClass::Context, ctx::EXT_RESPONSE_VALUE, value));
            }
            app(inner)
        }
        ProtocolOp::BindResponse(result)
        | ProtocolOp::SearchResultDone(result)
        | ProtocolOp::ModifyResponse(result)
        | ProtocolOp::AddResponse(result)
        | ProtocolOp::DelResponse(result)
        | ProtocolOp::CompareResponse(result) => app(result_fields(&result)),
    }
}

fn encode_filter(filter: &Filter) -> Tag {
    use filter_id::*;
    let context = |id: u64, inner: Vec<Tag>| constructed(TagClass::Context, id, inner);
    match filter {
        Filter::And(items) => context(AND, items.iter().map(encode_filter).collect()),
        Filter::Or(items) => context(OR, items.iter().map(encode_filter).collect()),
        Filter::Not(inner) => context(NOT, vec![encode_filter(inner)]),
        Filter::Equality(attr, value) => {
            context(EQUALITY, vec![octet_string(attr), octet_string(value)])
        }
        Filter::GreaterOrEqual(attr, value) => {
            context(GREATER_OR_EQUAL, vec![octet_string(attr), octet_string(value)])
        }
        Filter::LessOrEqual(attr, value) => {
            context(LESS_OR_EQUAL, vec![octet_string(attr), octet_string(value)])
        }
        Filter::Approx(attr, value) => {
            context(APPROX, vec![octet_string(attr), octet_string(value)])
        }
        Filter::Substrings {
            attr,
            initial,
            any,
            final_value,
        } => {
            let mut pieces = Vec::new();
            if let Some(initial) = initial {
                pieces.push(tagged_octets(TagClass::Context, SUB_INITIAL, initial));
            }
            for piece in any {
                pieces.push(tagged_octets(TagClass::Context, SUB_ANY, piece));
            }
            if let Some(final_value) = final_value {
                pieces.push(tagged_octets(TagClass::Context, SUB_FINAL, final_value));
            }
            context(SUBSTRINGS, vec![octet_string(attr), sequence(pieces)])
        }
        Filter::Present(attr) => tagged_octets(TagClass::Context, PRESENT, attr),
    }
}
