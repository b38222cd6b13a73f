use crate::byte_order_rw::ByteOrderReader;
use crate::diagnostics::{cfa_color_name, enum_name, parent_name, Diagnostics};
use crate::ifd::{DngIfd, IfdError};
use crate::shared::SharedContext;
use crate::tag_decoder::TagEntry;
use crate::tags::{Compression, IfdValueType, PhotometricInterpretation, SubFileType};
use std::io::{self, Read, Seek};
use tracing::{debug, trace};

/// The raw entries of one IFD, read but not yet interpreted.
#[derive(Debug, PartialEq, Eq)]
pub struct IfdReader {
    pub offset: u64,
    /// The entry count stored in the file.
    pub declared_entries: u16,
    pub entries: Vec<IfdEntryReader>,
    pub next_ifd: u32,
}
impl IfdReader {
    /// Reads the directory at the current position of `reader`.
    ///
    /// Entries with a value type this crate does not know are skipped, as their size is unknown.
    /// An entry with tag code and type both 0 ends the directory early, and `next_ifd` is 0
    /// in that case.
    pub fn read(
        reader: &mut ByteOrderReader<impl Read + Seek>,
        parent_code: u32,
        diag: &dyn Diagnostics,
    ) -> Result<Self, io::Error> {
        let offset = reader.position()?;
        let declared_entries = reader.read_u16()?;
        let mut entries = Vec::new();
        let mut next_ifd = None;
        for _ in 0..declared_entries {
            let entry = IfdEntryReader::read(reader)?;
            // some encoders miscount and run into the next IFD link
            if entry.tag == 0 && entry.dtype == 0 {
                diag.warning(&format!(
                    "{} had zero/zero tag code/type entry",
                    parent_name(parent_code)
                ));
                next_ifd = Some(0);
                break;
            }
            if entry.value_type().is_some() {
                entries.push(entry);
            } else {
                diag.warning(&format!(
                    "{} has unknown type ({})",
                    entry.tag_entry(parent_code).describe(),
                    entry.dtype
                ));
            }
        }
        let next_ifd = match next_ifd {
            Some(next_ifd) => next_ifd,
            None => reader.read_u32()?,
        };
        Ok(Self {
            offset,
            declared_entries,
            entries,
            next_ifd,
        })
    }

    /// Whether every declared entry was read and every value ends within `stream_len` bytes.
    /// Empty directories are never sane.
    pub fn is_sane(&self, stream_len: u64) -> bool {
        self.declared_entries > 0
            && self.entries.len() == self.declared_entries as usize
            && self
                .entries
                .iter()
                .all(|entry| entry.value_end() <= stream_len)
    }

    /// Decodes every entry into a fresh [DngIfd], offering each one to `shared` first.
    pub fn process<R: Read + Seek>(
        &self,
        reader: &mut ByteOrderReader<R>,
        parent_code: u32,
        shared: &mut SharedContext,
        diag: &dyn Diagnostics,
    ) -> Result<DngIfd, IfdError> {
        debug!(
            parent_code,
            offset = self.offset,
            entries = self.entries.len(),
            "processing IFD"
        );
        let mut ifd = DngIfd::new();
        for entry in &self.entries {
            let tag = entry.tag_entry(parent_code);
            reader.set_position(tag.offset)?;
            if shared.parse_tag(reader, &tag, diag)? {
                continue;
            }
            reader.set_position(tag.offset)?;
            if !ifd.parse_tag(reader, &tag, diag)? {
                trace!(tag = %tag.describe(), "tag not handled");
            }
        }
        ifd.this_ifd = self.offset;
        ifd.next_ifd = self.next_ifd as u64;
        ifd.post_parse(diag);
        log_decoded(&ifd, parent_code);
        Ok(ifd)
    }

    /// Decodes only the file-global tags of a directory that holds no image, like the EXIF IFD.
    pub fn process_shared<R: Read + Seek>(
        &self,
        reader: &mut ByteOrderReader<R>,
        parent_code: u32,
        shared: &mut SharedContext,
        diag: &dyn Diagnostics,
    ) -> Result<(), IfdError> {
        debug!(parent_code, offset = self.offset, "processing metadata IFD");
        for entry in &self.entries {
            let tag = entry.tag_entry(parent_code);
            reader.set_position(tag.offset)?;
            if !shared.parse_tag(reader, &tag, diag)? {
                trace!(tag = %tag.describe(), "tag not handled");
            }
        }
        Ok(())
    }
}

fn log_decoded(ifd: &DngIfd, parent_code: u32) {
    debug!(
        ifd = %parent_name(parent_code),
        sub_file_type = %enum_name::<SubFileType>(ifd.new_sub_file_type),
        width = ifd.image_width,
        length = ifd.image_length,
        compression = %enum_name::<Compression>(ifd.compression),
        photometric = %enum_name::<PhotometricInterpretation>(ifd.photometric_interpretation),
        "decoded IFD"
    );
    if ifd.photometric() == Some(PhotometricInterpretation::Cfa) {
        let rows = (ifd.cfa_repeat_pattern_rows as usize).min(ifd.cfa_pattern.len());
        let cols = (ifd.cfa_repeat_pattern_cols as usize).min(ifd.cfa_pattern[0].len());
        let pattern: Vec<String> = ifd.cfa_pattern[..rows]
            .iter()
            .flat_map(|row| row[..cols].iter().map(|color| cfa_color_name(*color)))
            .collect();
        trace!(?pattern, "CFA pattern");
    }
}

/// One 12 byte IFD entry.
#[derive(Debug, PartialEq, Eq)]
pub struct IfdEntryReader {
    pub tag: u16,
    pub dtype: u16,
    pub count: u32,
    value_or_offset: u32,
    own_offset: u64,
}
impl IfdEntryReader {
    pub fn read(reader: &mut ByteOrderReader<impl Read + Seek>) -> Result<Self, io::Error> {
        let own_offset = reader.position()?;
        let tag = reader.read_u16()?;
        let dtype = reader.read_u16()?;
        let count = reader.read_u32()?;
        let value_or_offset = reader.read_u32()?;
        Ok(Self {
            tag,
            dtype,
            count,
            value_or_offset,
            own_offset,
        })
    }

    pub fn value_type(&self) -> Option<IfdValueType> {
        IfdValueType::try_from(self.dtype).ok()
    }

    // if the value fits into 4 byte, it is stored inline
    fn fits_inline(&self) -> bool {
        self.value_size() <= 4
    }

    fn value_size(&self) -> u64 {
        let size = self.value_type().map_or(0, |dtype| dtype.size() as u64);
        self.count as u64 * size
    }

    /// Where the value of this entry starts in the file.
    pub fn value_offset(&self) -> u64 {
        if self.fits_inline() {
            self.own_offset + 8
        } else {
            self.value_or_offset as u64
        }
    }

    /// One past the last byte of the value.
    pub fn value_end(&self) -> u64 {
        self.value_offset() + self.value_size()
    }

    pub fn tag_entry(&self, parent_code: u32) -> TagEntry {
        TagEntry::new(
            parent_code,
            self.tag as u32,
            self.dtype,
            self.count,
            self.value_offset(),
        )
    }
}
