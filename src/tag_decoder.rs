//! Decoding of single tag values: typed scalars, type / count / context checks and the
//! specialized payloads (strings, matrices, vectors, date-times).
//!
//! Every check here follows the same contract: a mismatch is reported as a warning and `false`
//! is returned. Whether to skip the tag or to read it anyway is up to the caller.

use crate::byte_order_rw::ByteOrderReader;
use crate::diagnostics::{parent_name, tag_name, tag_type_name, Diagnostics};
use crate::geometry::URational;
use crate::tags::{parent, IfdValueType, PhotometricInterpretation, SubFileType};
use std::fmt::{Display, Formatter};
use std::io::{self, Read};

/// One raw directory entry, with the stream position its value is stored at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagEntry {
    pub parent_code: u32,
    pub code: u32,
    pub tag_type: u16,
    pub count: u32,
    /// Absolute position of the value (inline in the entry or out-of-line).
    pub offset: u64,
}

impl TagEntry {
    pub fn new(parent_code: u32, code: u32, tag_type: u16, count: u32, offset: u64) -> Self {
        Self {
            parent_code,
            code,
            tag_type,
            count,
            offset,
        }
    }

    pub fn value_type(&self) -> Option<IfdValueType> {
        IfdValueType::try_from(self.tag_type).ok()
    }

    /// "`<directory>` `<tag>`", the prefix of every message about this entry.
    pub fn describe(&self) -> String {
        format!(
            "{} {}",
            parent_name(self.parent_code),
            tag_name(self.parent_code, self.code)
        )
    }

    fn is_maker_note(&self) -> bool {
        self.parent_code >= parent::FIRST_MAKER_NOTE_IFD
    }
}

/// A single decoded numeric value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TagScalar {
    Unsigned(u64),
    Signed(i64),
    Real(f64),
}

impl TagScalar {
    pub fn as_f64(&self) -> f64 {
        match *self {
            TagScalar::Unsigned(v) => v as f64,
            TagScalar::Signed(v) => v as f64,
            TagScalar::Real(v) => v,
        }
    }

    /// Integers are clamped into range, reals are rounded first.
    pub fn as_u32(&self) -> u32 {
        match *self {
            TagScalar::Unsigned(v) => v.min(u32::MAX as u64) as u32,
            TagScalar::Signed(v) => v.clamp(0, u32::MAX as i64) as u32,
            TagScalar::Real(v) => {
                if v.is_nan() || v <= 0.0 {
                    0
                } else {
                    (v + 0.5).min(u32::MAX as f64) as u32
                }
            }
        }
    }

    pub fn as_i32(&self) -> i32 {
        match *self {
            TagScalar::Unsigned(v) => v.min(i32::MAX as u64) as i32,
            TagScalar::Signed(v) => v.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
            TagScalar::Real(v) => {
                if v.is_nan() {
                    0
                } else {
                    v.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32
                }
            }
        }
    }
}

fn ratio(n: f64, d: f64) -> f64 {
    if d == 0.0 {
        0.0
    } else {
        n / d
    }
}

/// Reads one value of the TIFF type `tag_type` at the current position.
///
/// Unknown type codes yield `None` and consume nothing.
pub fn read_scalar<R: Read>(
    stream: &mut ByteOrderReader<R>,
    tag_type: u16,
) -> io::Result<Option<TagScalar>> {
    let dtype = match IfdValueType::try_from(tag_type) {
        Ok(dtype) => dtype,
        Err(_) => return Ok(None),
    };
    let value = match dtype {
        IfdValueType::Byte | IfdValueType::Ascii | IfdValueType::Undefined => {
            TagScalar::Unsigned(stream.read_u8()? as u64)
        }
        IfdValueType::Short => TagScalar::Unsigned(stream.read_u16()? as u64),
        IfdValueType::Long | IfdValueType::Ifd => TagScalar::Unsigned(stream.read_u32()? as u64),
        IfdValueType::Long8 | IfdValueType::Ifd8 => TagScalar::Unsigned(stream.read_u64()?),
        IfdValueType::SignedByte => TagScalar::Signed(stream.read_i8()? as i64),
        IfdValueType::SignedShort => TagScalar::Signed(stream.read_i16()? as i64),
        IfdValueType::SignedLong => TagScalar::Signed(stream.read_i32()? as i64),
        IfdValueType::SignedLong8 => TagScalar::Signed(stream.read_i64()?),
        IfdValueType::Rational => {
            let n = stream.read_u32()?;
            let d = stream.read_u32()?;
            TagScalar::Real(ratio(n as f64, d as f64))
        }
        IfdValueType::SignedRational => {
            let n = stream.read_i32()?;
            let d = stream.read_i32()?;
            TagScalar::Real(ratio(n as f64, d as f64))
        }
        IfdValueType::Float => TagScalar::Real(stream.read_f32()? as f64),
        IfdValueType::Double => TagScalar::Real(stream.read_f64()?),
    };
    Ok(Some(value))
}

impl<R: Read> ByteOrderReader<R> {
    pub fn tag_value_u32(&mut self, tag_type: u16) -> io::Result<u32> {
        Ok(read_scalar(self, tag_type)?.map_or(0, |v| v.as_u32()))
    }

    pub fn tag_value_i32(&mut self, tag_type: u16) -> io::Result<i32> {
        Ok(read_scalar(self, tag_type)?.map_or(0, |v| v.as_i32()))
    }

    pub fn tag_value_f64(&mut self, tag_type: u16) -> io::Result<f64> {
        Ok(read_scalar(self, tag_type)?.map_or(0.0, |v| v.as_f64()))
    }

    /// Reads an unsigned rational, keeping numerator and denominator when the type has them.
    pub fn tag_value_urational(&mut self, tag_type: u16) -> io::Result<URational> {
        match IfdValueType::try_from(tag_type) {
            Ok(IfdValueType::Rational) => {
                let n = self.read_u32()?;
                let d = self.read_u32()?;
                Ok(URational::new(n, d))
            }
            Ok(IfdValueType::SignedRational) => {
                let n = self.read_i32()?;
                let d = self.read_i32()?;
                if (n < 0) == (d < 0) {
                    Ok(URational::new(n.unsigned_abs(), d.unsigned_abs()))
                } else {
                    Ok(URational::new(0, 1))
                }
            }
            Ok(IfdValueType::Byte | IfdValueType::Short | IfdValueType::Long) => {
                Ok(URational::new(self.tag_value_u32(tag_type)?, 1))
            }
            _ => Ok(URational::from_f64(self.tag_value_f64(tag_type)?)),
        }
    }
}

pub fn check_tag_type(diag: &dyn Diagnostics, entry: &TagEntry, allowed: &[IfdValueType]) -> bool {
    if allowed.iter().any(|t| u16::from(*t) == entry.tag_type) {
        return true;
    }
    diag.warning(&format!(
        "{} has unexpected type ({})",
        entry.describe(),
        tag_type_name(entry.tag_type)
    ));
    false
}

pub fn check_tag_count(diag: &dyn Diagnostics, entry: &TagEntry, min: u32, max: u32) -> bool {
    let max = max.max(min);
    if entry.count >= min && entry.count <= max {
        return true;
    }
    diag.warning(&format!(
        "{} has unexpected count ({})",
        entry.describe(),
        entry.count
    ));
    false
}

pub fn check_tag_count_exact(diag: &dyn Diagnostics, entry: &TagEntry, count: u32) -> bool {
    check_tag_count(diag, entry, count, count)
}

pub fn check_main_ifd(diag: &dyn Diagnostics, entry: &TagEntry, new_sub_file_type: u32) -> bool {
    if new_sub_file_type == u32::from(SubFileType::MainImage) {
        return true;
    }
    diag.warning(&format!(
        "{} is not allowed IFDs with NewSubFileType != 0",
        entry.describe()
    ));
    false
}

pub fn check_raw_ifd(diag: &dyn Diagnostics, entry: &TagEntry, photometric: u32) -> bool {
    if photometric == u32::from(PhotometricInterpretation::Cfa)
        || photometric == u32::from(PhotometricInterpretation::LinearRaw)
    {
        return true;
    }
    diag.warning(&format!(
        "{} is not allowed in IFDs with a non-raw PhotometricInterpretation",
        entry.describe()
    ));
    false
}

pub fn check_cfa(diag: &dyn Diagnostics, entry: &TagEntry, photometric: u32) -> bool {
    if photometric == u32::from(PhotometricInterpretation::Cfa) {
        return true;
    }
    diag.warning(&format!(
        "{} is not allowed in IFDs with a non-CFA PhotometricInterpretation",
        entry.describe()
    ));
    false
}

pub fn check_color_image(diag: &dyn Diagnostics, entry: &TagEntry, color_planes: u32) -> bool {
    match color_planes {
        0 => {
            diag.warning(&format!(
                "{} is not allowed with unknown color plane count (missing ColorMatrix1 tag?)",
                entry.describe()
            ));
            false
        }
        1 => {
            diag.warning(&format!(
                "{} is not allowed with monochrome images",
                entry.describe()
            ));
            false
        }
        _ => true,
    }
}

/// Reads `count` bytes into a buffer of `count + 1` whose last byte is always 0.
fn read_terminated<R: Read>(stream: &mut ByteOrderReader<R>, count: u32) -> io::Result<Vec<u8>> {
    let mut buffer = stream.read_bytes(count as usize)?;
    buffer.push(0);
    Ok(buffer)
}

fn until_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

/// Decodes 7-bit text; anything else becomes `?`.
fn decode_ascii(bytes: &[u8]) -> (String, bool) {
    let is_ascii = bytes.is_ascii();
    let text = bytes
        .iter()
        .map(|b| if b.is_ascii() { *b as char } else { '?' })
        .collect();
    (text, is_ascii)
}

/// Decodes UTF-8, falling back to Latin-1 for byte sequences that are not valid UTF-8.
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|b| *b as char).collect(),
    }
}

fn trim_blanks(text: &mut String) {
    let len = text.trim_end_matches(' ').len();
    text.truncate(len);
}

pub fn parse_string_tag<R: Read>(
    stream: &mut ByteOrderReader<R>,
    diag: &dyn Diagnostics,
    entry: &TagEntry,
    trim: bool,
    is_ascii: bool,
) -> io::Result<String> {
    if entry.count == 0 || entry.count == u32::MAX {
        return Ok(String::new());
    }
    let buffer = read_terminated(stream, entry.count)?;
    let data = &buffer[..entry.count as usize];
    if !data.contains(&0) && !entry.is_maker_note() {
        diag.warning(&format!("{} is not NULL terminated", entry.describe()));
    }
    let bytes = until_nul(&buffer);
    let mut text = if is_ascii {
        let (text, clean) = decode_ascii(bytes);
        if !clean && !entry.is_maker_note() {
            diag.warning(&format!("{} has non-ASCII characters", entry.describe()));
        }
        text
    } else {
        decode_text(bytes)
    };
    if trim {
        trim_blanks(&mut text);
    }
    Ok(text)
}

/// Parses two NUL separated strings packed into one value.
pub fn parse_dual_string_tag<R: Read>(
    stream: &mut ByteOrderReader<R>,
    diag: &dyn Diagnostics,
    entry: &TagEntry,
) -> io::Result<(String, String)> {
    if entry.count == 0 || entry.count == u32::MAX {
        return Ok((String::new(), String::new()));
    }
    let count = entry.count as usize;
    let buffer = read_terminated(stream, entry.count)?;
    if buffer[count - 1] != 0 {
        let nul_count = buffer[..count].iter().filter(|b| **b == 0).count();
        if nul_count < 2 && !entry.is_maker_note() {
            diag.warning(&format!("{} is not NULL terminated", entry.describe()));
        }
    }

    let (mut first, first_clean) = decode_ascii(until_nul(&buffer));
    let mut second = String::new();
    let mut second_clean = true;
    for j in 1..count.saturating_sub(1) {
        if buffer[j - 1] != 0 && buffer[j] == 0 {
            let (text, clean) = decode_ascii(until_nul(&buffer[j + 1..]));
            second = text;
            second_clean = clean;
            break;
        }
    }
    if !first_clean || !second_clean {
        diag.warning(&format!("{} has non-ASCII characters", entry.describe()));
    }
    trim_blanks(&mut first);
    trim_blanks(&mut second);
    Ok((first, second))
}

/// Parses a string prefixed by an 8 byte character code, as used by the EXIF UserComment tag.
pub fn parse_encoded_string_tag<R: Read>(
    stream: &mut ByteOrderReader<R>,
    diag: &dyn Diagnostics,
    entry: &TagEntry,
) -> io::Result<String> {
    if entry.count < 8 {
        diag.warning(&format!(
            "{} has unexpected count ({})",
            entry.describe(),
            entry.count
        ));
        return Ok(String::new());
    }

    let mut label = stream.read_bytes(8)?;
    if label.iter().any(|b| b.is_ascii_lowercase()) {
        label.make_ascii_uppercase();
        diag.warning(&format!(
            "{} text encoding label not all uppercase",
            entry.describe()
        ));
    }

    let mut text = if label == b"UNICODE\0" {
        let units = (entry.count - 8) / 2;
        let mut buffer = Vec::new();
        for _ in 0..units {
            buffer.push(stream.read_u16()?);
        }
        let end = buffer.iter().position(|u| *u == 0).unwrap_or(buffer.len());
        let buffer = &buffer[..end];
        if buffer.iter().filter(|u| **u == 0x2020).count() > 1 {
            diag.warning(&format!(
                "{} text appears to be UTF-8 rather than UTF-16",
                entry.describe()
            ));
        }
        String::from_utf16_lossy(buffer)
    } else {
        let buffer = read_terminated(stream, entry.count - 8)?;
        let bytes = until_nul(&buffer);
        if label == b"ASCII\0\0\0" {
            let (text, clean) = decode_ascii(bytes);
            if !clean {
                diag.warning(&format!("{} has non-ASCII characters", entry.describe()));
            }
            text
        } else if label == b"JIS\0\0\0\0\0" {
            decode_text(bytes)
        } else {
            if label.iter().all(|b| *b == 0) {
                if !bytes.is_empty() {
                    diag.warning(&format!("{} has unknown encoding", entry.describe()));
                }
            } else {
                diag.warning(&format!(
                    "{} has unexpected text encoding",
                    entry.describe()
                ));
            }
            // garbage is common here, only printable text is kept
            if bytes.iter().all(|b| (b' '..=b'~').contains(b)) {
                decode_ascii(bytes).0
            } else {
                String::new()
            }
        }
    };
    trim_blanks(&mut text);
    Ok(text)
}

/// A dense row-major matrix of reals.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Vector(pub Vec<f64>);

impl Vector {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Reads a `rows` x `cols` matrix. On a count mismatch `matrix` is left untouched.
pub fn parse_matrix_tag<R: Read>(
    stream: &mut ByteOrderReader<R>,
    diag: &dyn Diagnostics,
    entry: &TagEntry,
    rows: u32,
    cols: u32,
    matrix: &mut Option<Matrix>,
) -> io::Result<bool> {
    if !check_tag_count_exact(diag, entry, rows.saturating_mul(cols)) {
        return Ok(false);
    }
    let mut parsed = Matrix::new(rows as usize, cols as usize);
    for row in 0..rows as usize {
        for col in 0..cols as usize {
            parsed.set(row, col, stream.tag_value_f64(entry.tag_type)?);
        }
    }
    *matrix = Some(parsed);
    Ok(true)
}

/// Reads a vector of `count` reals. On a count mismatch `vector` is left untouched.
pub fn parse_vector_tag<R: Read>(
    stream: &mut ByteOrderReader<R>,
    diag: &dyn Diagnostics,
    entry: &TagEntry,
    count: u32,
    vector: &mut Option<Vector>,
) -> io::Result<bool> {
    if !check_tag_count_exact(diag, entry, count) {
        return Ok(false);
    }
    let mut parsed = Vec::with_capacity(count as usize);
    for _ in 0..count {
        parsed.push(stream.tag_value_f64(entry.tag_type)?);
    }
    *vector = Some(Vector(parsed));
    Ok(true)
}

/// A calendar date and time of day. All zero is the null date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DateTime {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl DateTime {
    pub fn is_valid(&self) -> bool {
        (1..=9999).contains(&self.year)
            && (1..=12).contains(&self.month)
            && (1..=31).contains(&self.day)
            && self.hour <= 23
            && self.minute <= 59
            && self.second <= 59
    }

    pub fn is_null(&self) -> bool {
        *self == Self::default()
    }

    /// Parses `YYYY:MM:DD HH:MM:SS`. Blanks and colons separate the six numbers.
    pub fn parse(text: &str) -> Option<Self> {
        let mut chars = text.chars().peekable();
        let mut fields = [0u32; 6];
        for field in fields.iter_mut() {
            while matches!(chars.peek(), Some(' ' | ':')) {
                chars.next();
            }
            let mut digits = 0;
            while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
                *field = field.checked_mul(10)?.checked_add(digit)?;
                digits += 1;
                chars.next();
            }
            if digits == 0 {
                return None;
            }
        }
        let [year, month, day, hour, minute, second] = fields;
        let parsed = Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        };
        parsed.is_valid().then_some(parsed)
    }
}

impl Display for DateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}:{:02}:{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Returns whether the value was acceptable, together with the parsed date.
///
/// Values made of blanks, colons and zeros only are accepted as the null date.
pub fn parse_date_time_tag<R: Read>(
    stream: &mut ByteOrderReader<R>,
    diag: &dyn Diagnostics,
    entry: &TagEntry,
) -> io::Result<(bool, DateTime)> {
    if !check_tag_type(diag, entry, &[IfdValueType::Ascii]) {
        return Ok((false, DateTime::default()));
    }
    // some writers use 21 bytes, so a wrong count alone does not fail the tag
    check_tag_count_exact(diag, entry, 20);
    if entry.count < 20 {
        return Ok((false, DateTime::default()));
    }

    let buffer = read_terminated(stream, 20)?;
    let bytes = until_nul(&buffer);
    if let Some(parsed) = std::str::from_utf8(bytes).ok().and_then(DateTime::parse) {
        return Ok((true, parsed));
    }
    if bytes.iter().all(|b| matches!(b, b' ' | b':' | b'0')) {
        return Ok((true, DateTime::default()));
    }
    diag.warning(&format!("{} is not a valid date/time", entry.describe()));
    Ok((false, DateTime::default()))
}
