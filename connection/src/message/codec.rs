//! Helpers shared by the payload codecs.
//!
//! Fields are read and written with `bitcoin::consensus`, which already speaks the
//! wire encoding of every bitcoin-derived protocol. What lives here covers the
//! leniency real peers need on top of it.

use bitcoin::consensus::encode::{self, Decodable, VarInt};
use bitcoin::io::{ErrorKind, Read};

/// Most entries preallocated for a counted list, whatever count the peer announces.
const MAX_PREALLOCATION: usize = 1000;

/// Decode the fields of `T` at the start of `payload`.
///
/// Trailing bytes are ignored: later protocol versions append fields to messages.
pub(crate) fn decode_prefix<T: Decodable>(payload: &[u8]) -> Result<T, encode::Error> {
    encode::deserialize_partial(payload).map(|(value, _)| value)
}

/// Decode a trailing field some peers leave out, `None` if the payload ended first.
pub(crate) fn decode_optional<T, R>(r: &mut R) -> Result<Option<T>, encode::Error>
where
    T: Decodable,
    R: Read + ?Sized,
{
    match T::consensus_decode(r) {
        Ok(value) => Ok(Some(value)),
        Err(encode::Error::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

/// Read a length-prefixed string. Invalid UTF-8 is replaced rather than rejected
/// since peers put arbitrary bytes in free-text fields.
pub(crate) fn decode_lossy_string<R: Read + ?Sized>(r: &mut R) -> Result<String, encode::Error> {
    let bytes = Vec::<u8>::consensus_decode(r)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read a list count, returning it with a capacity safe to preallocate.
pub(crate) fn decode_count<R: Read + ?Sized>(r: &mut R) -> Result<(u64, usize), encode::Error> {
    let VarInt(count) = VarInt::consensus_decode(r)?;
    let capacity = usize::try_from(count).map_or(MAX_PREALLOCATION, |c| c.min(MAX_PREALLOCATION));
    Ok((count, capacity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::consensus::encode::serialize;

    #[test]
    fn test_optional_field() {
        let mut full: &[u8] = &[1, 0, 0, 0];
        assert_eq!(decode_optional::<u32, _>(&mut full).unwrap(), Some(1));

        let mut empty: &[u8] = &[];
        assert_eq!(decode_optional::<u32, _>(&mut empty).unwrap(), None);
    }

    #[test]
    fn test_lossy_string() {
        let mut r: &[u8] = &[3, b'a', 0xff, b'b'];
        assert_eq!(decode_lossy_string(&mut r).unwrap(), "a\u{fffd}b");
        assert!(r.is_empty());
    }

    #[test]
    fn test_huge_count_is_not_preallocated() {
        let bytes = serialize(&VarInt(u64::MAX));
        let (count, capacity) = decode_count(&mut bytes.as_slice()).unwrap();
        assert_eq!(count, u64::MAX);
        assert_eq!(capacity, MAX_PREALLOCATION);
    }

    #[test]
    fn test_prefix_ignores_trailing_bytes() {
        assert_eq!(decode_prefix::<u16>(&[1, 0, 0xaa]).unwrap(), 1);
        assert!(matches!(
            decode_prefix::<u32>(&[1, 0]),
            Err(encode::Error::Io(_))
        ));
    }
}
