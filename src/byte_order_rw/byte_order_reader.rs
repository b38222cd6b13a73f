use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::{
    io::{self, Read, Seek, SeekFrom},
    ops::{Deref, DerefMut},
};

/// A reader that decodes multi-byte values in the byte order of the file it reads.
///
/// This is the positioned stream every tag value is read from. Positioning (inline value vs.
/// out-of-line offset) is the responsibility of the caller.
pub struct ByteOrderReader<R: Read> {
    reader: R,
    is_little_endian: bool,
}
impl<R: Read> ByteOrderReader<R> {
    pub fn new(reader: R, is_little_endian: bool) -> Self {
        Self {
            reader,
            is_little_endian,
        }
    }

    pub fn is_little_endian(&self) -> bool {
        self.is_little_endian
    }

    pub fn is_big_endian(&self) -> bool {
        !self.is_little_endian
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

macro_rules! generate_read_function {
    ($name:ident, $kind:ty) => {
        #[allow(unused)]
        pub fn $name(&mut self) -> Result<$kind, io::Error> {
            if self.is_little_endian {
                self.reader.$name::<LittleEndian>()
            } else {
                self.reader.$name::<BigEndian>()
            }
        }
    };
}
impl<R: Read> ByteOrderReader<R> {
    pub fn read_u8(&mut self) -> Result<u8, io::Error> {
        self.reader.read_u8()
    }
    pub fn read_i8(&mut self) -> Result<i8, io::Error> {
        self.reader.read_i8()
    }
    generate_read_function!(read_u16, u16);
    generate_read_function!(read_i16, i16);
    generate_read_function!(read_u32, u32);
    generate_read_function!(read_i32, i32);
    generate_read_function!(read_u64, u64);
    generate_read_function!(read_i64, i64);
    generate_read_function!(read_f32, f32);
    generate_read_function!(read_f64, f64);

    /// Reads exactly `count` raw bytes. Byte order does not apply.
    ///
    /// The buffer grows with the data actually read, so a bogus count cannot allocate more than
    /// the stream holds.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, io::Error> {
        let mut buf = Vec::new();
        (&mut self.reader).take(count as u64).read_to_end(&mut buf)?;
        if buf.len() != count {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {count} bytes, found {}", buf.len()),
            ));
        }
        Ok(buf)
    }
}

impl<R: Read + Seek> ByteOrderReader<R> {
    /// The absolute offset of the read cursor.
    pub fn position(&mut self) -> Result<u64, io::Error> {
        self.reader.stream_position()
    }

    pub fn set_position(&mut self, offset: u64) -> Result<(), io::Error> {
        self.reader.seek(SeekFrom::Start(offset))?;
        Ok(())
    }
}

impl<R: Read> Deref for ByteOrderReader<R> {
    type Target = R;

    fn deref(&self) -> &Self::Target {
        &self.reader
    }
}
impl<R: Read> DerefMut for ByteOrderReader<R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.reader
    }
}
