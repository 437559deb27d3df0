use std::{
    io::{self, Read, Write},
    mem::size_of,
};

use super::{Decode, Encode};

macro_rules! implement_encode_decode {
    ($struct_name:ident) => {
        impl Encode for $struct_name {
            fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
                writer.write_all(&self.to_be_bytes())
            }

            fn size(&self) -> usize {
                size_of::<Self>()
            }
        }

        impl Decode for $struct_name {
            fn decode<R: Read>(reader: &mut R) -> io::Result<Self> {
                let buf = {
                    let mut buf = [0; size_of::<Self>()];
                    reader.read_exact(&mut buf)?;
                    buf
                };

                Ok(Self::from_be_bytes(buf))
            }
        }
    };
}

implement_encode_decode!(i8);
implement_encode_decode!(i16);
implement_encode_decode!(i32);
implement_encode_decode!(i64);
implement_encode_decode!(u8);
implement_encode_decode!(u16);
implement_encode_decode!(u32);
implement_encode_decode!(u64);
