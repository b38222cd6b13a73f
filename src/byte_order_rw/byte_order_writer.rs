use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use std::io::{self, Write};

/// Writes values in a fixed byte order.
///
/// The crate does not write DNG files; this is used to synthesize tag streams and small TIFF
/// structures, mostly in tests.
pub struct ByteOrderWriter<W: Write> {
    writer: W,
    is_little_endian: bool,
}
impl<W: Write> ByteOrderWriter<W> {
    pub fn new(writer: W, is_little_endian: bool) -> Self {
        Self {
            writer,
            is_little_endian,
        }
    }

    pub fn is_little_endian(&self) -> bool {
        self.is_little_endian
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), io::Error> {
        self.writer.write_all(bytes)
    }

    /// A TIFF Rational: numerator then denominator.
    pub fn write_urational(&mut self, numerator: u32, denominator: u32) -> Result<(), io::Error> {
        self.write_u32(numerator)?;
        self.write_u32(denominator)
    }

    /// A TIFF SRational: numerator then denominator.
    pub fn write_srational(&mut self, numerator: i32, denominator: i32) -> Result<(), io::Error> {
        self.write_i32(numerator)?;
        self.write_i32(denominator)
    }
}

macro_rules! generate_write_function {
    ($name:ident, $kind:ty) => {
        #[allow(unused)]
        pub fn $name(&mut self, value: $kind) -> Result<(), io::Error> {
            if self.is_little_endian {
                self.writer.$name::<LittleEndian>(value)
            } else {
                self.writer.$name::<BigEndian>(value)
            }
        }
    };
}
impl<W: Write> ByteOrderWriter<W> {
    pub fn write_u8(&mut self, value: u8) -> Result<(), io::Error> {
        self.writer.write_u8(value)
    }
    pub fn write_i8(&mut self, value: i8) -> Result<(), io::Error> {
        self.writer.write_i8(value)
    }
    generate_write_function!(write_u16, u16);
    generate_write_function!(write_i16, i16);
    generate_write_function!(write_u32, u32);
    generate_write_function!(write_i32, i32);
    generate_write_function!(write_u64, u64);
    generate_write_function!(write_i64, i64);
    generate_write_function!(write_f32, f32);
    generate_write_function!(write_f64, f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_order_rw::ByteOrderReader;
    use std::io::Cursor;

    #[test]
    fn writes_what_the_reader_reads() {
        for little_endian in [true, false] {
            let mut w = ByteOrderWriter::new(Vec::new(), little_endian);
            w.write_u16(0xBEEF).unwrap();
            w.write_srational(-3, 4).unwrap();
            w.write_f64(0.25).unwrap();
            let data = w.into_inner();
            assert_eq!(data.len(), 2 + 8 + 8);

            let mut r = ByteOrderReader::new(Cursor::new(data), little_endian);
            assert_eq!(r.read_u16().unwrap(), 0xBEEF);
            assert_eq!(r.read_i32().unwrap(), -3);
            assert_eq!(r.read_i32().unwrap(), 4);
            assert_eq!(r.read_f64().unwrap(), 0.25);
        }
    }

    #[test]
    fn big_endian_puts_the_high_byte_first() {
        let mut w = ByteOrderWriter::new(Vec::new(), false);
        w.write_urational(1, 2).unwrap();
        assert_eq!(w.into_inner(), vec![0, 0, 0, 1, 0, 0, 0, 2]);
    }
}
