use std::io::{self, ErrorKind};

use rmp_serde::encode::write_named;
use rmp_serde::{from_slice, to_vec_named};
use serde::{de::DeserializeOwned, Serialize};

pub const LENGTH_PREFIX_LEN: usize = 4;

/// Appends `msg` to `out` behind a 4-byte big-endian length prefix.
pub fn write_delimited<T: Serialize>(out: &mut Vec<u8>, msg: &T) -> io::Result<()> {
    // Reserve the prefix and serialize directly behind it to avoid a
    // temporary payload buffer.
    let start = out.len();
    out.extend_from_slice(&[0u8; LENGTH_PREFIX_LEN]);
    if let Err(err) = write_named(out, msg) {
        out.truncate(start);
        return Err(io::Error::new(ErrorKind::InvalidData, err));
    }
    let payload_len = out.len() - start - LENGTH_PREFIX_LEN;
    let Ok(len) = u32::try_from(payload_len) else {
        out.truncate(start);
        return Err(io::Error::new(ErrorKind::InvalidData, "frame too large"));
    };
    out[start..start + LENGTH_PREFIX_LEN].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

/// Reads one delimited message from the front of `bytes` and returns it with
/// the unread remainder.
pub fn read_delimited<T: DeserializeOwned>(bytes: &[u8]) -> io::Result<(T, &[u8])> {
    if bytes.len() < LENGTH_PREFIX_LEN {
        return Err(io::Error::new(ErrorKind::UnexpectedEof, "missing frame header"));
    }
    let mut len_buf = [0u8; LENGTH_PREFIX_LEN];
    len_buf.copy_from_slice(&bytes[..LENGTH_PREFIX_LEN]);
    let len = u32::from_be_bytes(len_buf) as usize;
    let end = LENGTH_PREFIX_LEN
        .checked_add(len)
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidData, "frame length overflow"))?;
    if bytes.len() < end {
        return Err(io::Error::new(ErrorKind::UnexpectedEof, "incomplete frame"));
    }
    let msg = from_slice(&bytes[LENGTH_PREFIX_LEN..end])
        .map_err(|err| io::Error::new(ErrorKind::InvalidData, err))?;
    Ok((msg, &bytes[end..]))
}

/// Encodes a request or response body. Bodies are not length-prefixed; they
/// run to the end of the stream.
pub fn encode_body<T: Serialize>(msg: &T) -> io::Result<Vec<u8>> {
    to_vec_named(msg).map_err(|err| io::Error::new(ErrorKind::InvalidData, err))
}

pub fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> io::Result<T> {
    if bytes.is_empty() {
        return Err(io::Error::new(ErrorKind::UnexpectedEof, "empty message body"));
    }
    from_slice(bytes).map_err(|err| io::Error::new(ErrorKind::InvalidData, err))
}

#[cfg(test)]
mod tests {
    use super::{decode_body, encode_body, read_delimited, write_delimited, LENGTH_PREFIX_LEN};
    use crate::{CallContext, Guid, RequestHeader, ResponseHeader};
    use serde::{Deserialize, Serialize};
    use std::io;

    #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct Probe {
        id: u32,
        label: String,
    }

    #[test]
    fn write_delimited_prefixes_payload_length_and_leaves_body_behind() {
        let probe = Probe { id: 7, label: "ready".to_string() };
        let mut encoded = Vec::new();
        write_delimited(&mut encoded, &probe).expect("encode frame");
        encoded.extend_from_slice(b"tail");

        let mut header = [0u8; LENGTH_PREFIX_LEN];
        header.copy_from_slice(&encoded[..LENGTH_PREFIX_LEN]);
        let len = u32::from_be_bytes(header) as usize;
        assert_eq!(len + LENGTH_PREFIX_LEN + 4, encoded.len());

        let (decoded, rest): (Probe, _) = read_delimited(&encoded).expect("decode frame");
        assert_eq!(decoded, probe);
        assert_eq!(rest, b"tail");
    }

    #[test]
    fn read_delimited_rejects_short_or_incomplete_frames() {
        let err = read_delimited::<Probe>(&[1, 2, 3]).expect_err("short header should fail");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let mut incomplete = vec![0, 0, 0, 8];
        incomplete.extend_from_slice(&[1, 2, 3, 4]);
        let err = read_delimited::<Probe>(&incomplete).expect_err("incomplete payload should fail");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn empty_body_is_rejected() {
        let err = decode_body::<Probe>(&[]).expect_err("empty body");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let body = encode_body(&()).expect("unit body");
        assert!(!body.is_empty());
        decode_body::<()>(&body).expect("unit body decodes");
    }

    #[test]
    fn corrupted_headers_fail_cleanly() {
        let header = RequestHeader::new(
            Guid::new_random(),
            "Search",
            CallContext::new().with_extension("tenant", "blue"),
        );
        let mut valid = Vec::new();
        write_delimited(&mut valid, &header).expect("header");

        for len in 0..valid.len() {
            assert!(read_delimited::<RequestHeader>(&valid[..len]).is_err(), "prefix {len}");
        }

        // xorshift64 picks one byte to flip per round.
        let mut state = 0x2545_F491_4F6C_DD1D_u64;
        for _ in 0..4_000 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let mut bytes = valid.clone();
            let idx = (state % bytes.len() as u64) as usize;
            bytes[idx] ^= ((state >> 40) as u8) | 1;
            let _ = read_delimited::<RequestHeader>(&bytes);
            let _ = read_delimited::<ResponseHeader>(&bytes);
        }
    }
}
