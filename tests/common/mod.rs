//! Synthesizes TIFF / DNG files in memory.

use dng_ifd::byte_order_rw::ByteOrderWriter;

pub enum Value {
    Byte(Vec<u8>),
    /// A NUL is appended.
    Ascii(&'static str),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Rational(Vec<(u32, u32)>),
    SRational(Vec<(i32, i32)>),
    Undefined(Vec<u8>),
    /// Offsets of other directories of the same file, by index.
    IfdOffsets(Vec<usize>),
    /// An entry written verbatim, whatever its type and count claim.
    Raw { dtype: u16, count: u32, value: u32 },
}

impl Value {
    fn dtype(&self) -> u16 {
        match self {
            Value::Byte(_) => 1,
            Value::Ascii(_) => 2,
            Value::Short(_) => 3,
            Value::Long(_) | Value::IfdOffsets(_) => 4,
            Value::Rational(_) => 5,
            Value::Undefined(_) => 7,
            Value::SRational(_) => 10,
            Value::Raw { dtype, .. } => *dtype,
        }
    }

    fn count(&self) -> u32 {
        let count = match self {
            Value::Byte(v) | Value::Undefined(v) => v.len(),
            Value::Ascii(s) => s.len() + 1,
            Value::Short(v) => v.len(),
            Value::Long(v) => v.len(),
            Value::Rational(v) => v.len(),
            Value::SRational(v) => v.len(),
            Value::IfdOffsets(v) => v.len(),
            Value::Raw { count, .. } => return *count,
        };
        count as u32
    }

    fn encode(&self, little_endian: bool, ifd_offsets: &[u32]) -> Vec<u8> {
        let mut w = ByteOrderWriter::new(Vec::new(), little_endian);
        match self {
            Value::Byte(v) | Value::Undefined(v) => w.write_bytes(v).unwrap(),
            Value::Ascii(s) => {
                w.write_bytes(s.as_bytes()).unwrap();
                w.write_u8(0).unwrap();
            }
            Value::Short(v) => v.iter().for_each(|x| w.write_u16(*x).unwrap()),
            Value::Long(v) => v.iter().for_each(|x| w.write_u32(*x).unwrap()),
            Value::Rational(v) => v
                .iter()
                .for_each(|(n, d)| w.write_urational(*n, *d).unwrap()),
            Value::SRational(v) => v
                .iter()
                .for_each(|(n, d)| w.write_srational(*n, *d).unwrap()),
            Value::IfdOffsets(v) => v
                .iter()
                .for_each(|index| w.write_u32(ifd_offsets[*index]).unwrap()),
            Value::Raw { value, .. } => w.write_u32(*value).unwrap(),
        }
        w.into_inner()
    }

    fn encoded_len(&self) -> usize {
        self.encode(true, &[0; 64]).len()
    }
}

#[derive(Default)]
pub struct Dir {
    pub entries: Vec<(u32, Value)>,
    /// Index of the next directory in the IFD chain.
    pub next: Option<usize>,
    /// Writes the entries as given instead of sorted by tag.
    pub unsorted: bool,
}

impl Dir {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, tag: u32, value: Value) -> Self {
        self.entries.push((tag, value));
        self
    }

    pub fn next(mut self, index: usize) -> Self {
        self.next = Some(index);
        self
    }

    pub fn unsorted(mut self) -> Self {
        self.unsorted = true;
        self
    }
}

fn padded(len: usize) -> usize {
    len + (len & 1)
}

fn block_len(dir: &Dir) -> usize {
    let values: usize = dir
        .entries
        .iter()
        .map(|(_, value)| value.encoded_len())
        .filter(|len| *len > 4)
        .map(padded)
        .sum();
    2 + 12 * dir.entries.len() + 4 + values
}

/// Lays out `dirs` one after another behind the header; the first one is IFD 0.
pub fn build(dirs: &mut [Dir], little_endian: bool) -> Vec<u8> {
    let mut offsets = Vec::new();
    let mut offset = 8;
    for dir in dirs.iter_mut() {
        if !dir.unsorted {
            dir.entries.sort_by_key(|(tag, _)| *tag);
        }
        offsets.push(offset as u32);
        offset += block_len(dir);
    }

    let mut w = ByteOrderWriter::new(Vec::new(), little_endian);
    w.write_bytes(if little_endian { b"II" } else { b"MM" }).unwrap();
    w.write_u16(42).unwrap();
    w.write_u32(offsets[0]).unwrap();

    for (index, dir) in dirs.iter().enumerate() {
        let mut data_offset = offsets[index] as usize + 2 + 12 * dir.entries.len() + 4;
        let mut data = Vec::new();
        w.write_u16(dir.entries.len() as u16).unwrap();
        for (tag, value) in &dir.entries {
            let mut bytes = value.encode(little_endian, &offsets);
            w.write_u16(*tag as u16).unwrap();
            w.write_u16(value.dtype()).unwrap();
            w.write_u32(value.count()).unwrap();
            if bytes.len() <= 4 {
                bytes.resize(4, 0);
                w.write_bytes(&bytes).unwrap();
            } else {
                w.write_u32(data_offset as u32).unwrap();
                bytes.resize(padded(bytes.len()), 0);
                data_offset += bytes.len();
                data.extend(bytes);
            }
        }
        w.write_u32(dir.next.map_or(0, |next| offsets[next])).unwrap();
        w.write_bytes(&data).unwrap();
    }
    w.into_inner()
}
