//! Binary wire format for votes published on the broker channel.
//!
//! Each message carries the four vote fields in a fixed order:
//!
//! | field          | encoding                         |
//! |----------------|----------------------------------|
//! | `service_name` | u16 big-endian length + UTF-8    |
//! | `timestamp`    | u16 big-endian length + UTF-8    |
//! | `username`     | u16 big-endian length + UTF-8    |
//! | `address`      | u16 big-endian length + UTF-8    |
//!
//! There is no version tag. The format is pinned by the channel name.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, VoteShareError};
use crate::vote::Vote;

/// Largest field, in bytes, the length prefix can describe.
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

const PREFIX_LEN: usize = 2;

/// Encode a vote into its wire representation.
///
/// Fails with `InvalidArgument` if any field is longer than [`MAX_FIELD_LEN`]
/// bytes once UTF-8 encoded.
pub fn encode(vote: &Vote) -> Result<Bytes> {
    let fields = fields(vote);
    let size: usize = fields.iter().map(|(_, f)| PREFIX_LEN + f.len()).sum();
    let mut buf = BytesMut::with_capacity(size);

    for (name, field) in fields {
        put_text(&mut buf, name, field)?;
    }

    Ok(buf.freeze())
}

/// Decode a vote from its wire representation.
///
/// Fails with `MalformedMessage` if the input is truncated, a length prefix
/// overruns the remaining bytes, a field is not valid UTF-8, or bytes remain
/// after the last field.
pub fn decode(mut bytes: &[u8]) -> Result<Vote> {
    let service_name = get_text(&mut bytes, "service_name")?;
    let timestamp = get_text(&mut bytes, "timestamp")?;
    let username = get_text(&mut bytes, "username")?;
    let address = get_text(&mut bytes, "address")?;

    if bytes.has_remaining() {
        return Err(VoteShareError::MalformedMessage(format!(
            "{} trailing bytes after vote",
            bytes.remaining()
        )));
    }

    Ok(Vote {
        service_name,
        timestamp,
        username,
        address,
    })
}

fn fields(vote: &Vote) -> [(&'static str, &str); 4] {
    [
        ("service_name", vote.service_name.as_str()),
        ("timestamp", vote.timestamp.as_str()),
        ("username", vote.username.as_str()),
        ("address", vote.address.as_str()),
    ]
}

fn put_text(buf: &mut BytesMut, name: &str, text: &str) -> Result<()> {
    let len = u16::try_from(text.len()).map_err(|_| {
        VoteShareError::InvalidArgument(format!(
            "{} is {} bytes, limit is {}",
            name,
            text.len(),
            MAX_FIELD_LEN
        ))
    })?;
    buf.put_u16(len);
    buf.put_slice(text.as_bytes());
    Ok(())
}

fn get_text(buf: &mut &[u8], name: &str) -> Result<String> {
    if buf.remaining() < PREFIX_LEN {
        return Err(VoteShareError::MalformedMessage(format!(
            "truncated before {} length",
            name
        )));
    }
    let len = buf.get_u16() as usize;

    if buf.remaining() < len {
        return Err(VoteShareError::MalformedMessage(format!(
            "{} length {} overruns {} remaining bytes",
            name,
            len,
            buf.remaining()
        )));
    }

    let current: &[u8] = *buf;
    let (text, rest) = current.split_at(len);
    *buf = rest;

    String::from_utf8(text.to_vec()).map_err(|e| {
        VoteShareError::MalformedMessage(format!("{} is not valid UTF-8: {}", name, e))
    })
}
