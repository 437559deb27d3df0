//! Fixed-width binary codec for persisted tablet records.
//!
//! All integers are written big-endian so records written by older servers
//! stay readable byte-for-byte.

mod num;

use std::io::{self, Read, Write};

/// Types that can be written into a persisted tablet record.
pub trait Encode {
    /// Write `self` to `writer`.
    fn encode<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: Write;

    /// Exact number of bytes written by [`Encode::encode`].
    fn size(&self) -> usize;
}

impl<T: Encode> Encode for &T {
    fn encode<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: Write,
    {
        Encode::encode(*self, writer)
    }

    fn size(&self) -> usize {
        Encode::size(*self)
    }
}

/// Types that can be read back from a persisted tablet record.
pub trait Decode: Sized {
    /// Read a value from `reader`.
    fn decode<R>(reader: &mut R) -> io::Result<Self>
    where
        R: Read;
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_encode_decode() {
        struct Pair(u32, i16);

        impl Encode for Pair {
            fn encode<W>(&self, writer: &mut W) -> io::Result<()>
            where
                W: Write,
            {
                self.0.encode(writer)?;
                self.1.encode(writer)
            }

            fn size(&self) -> usize {
                self.0.size() + self.1.size()
            }
        }

        impl Decode for Pair {
            fn decode<R>(reader: &mut R) -> io::Result<Self>
            where
                R: Read,
            {
                Ok(Pair(u32::decode(reader)?, i16::decode(reader)?))
            }
        }

        let original = Pair(0x0102_0304, -2);
        let mut buf = Vec::new();
        original.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), original.size());
        assert_eq!(buf, vec![0x01, 0x02, 0x03, 0x04, 0xff, 0xfe]);

        let decoded = Pair::decode(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded.0, 0x0102_0304);
        assert_eq!(decoded.1, -2);
    }

    #[test]
    fn short_input_is_an_error() {
        let err = i64::decode(&mut Cursor::new(vec![0u8; 3])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
