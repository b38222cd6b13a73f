use crate::byte_order_rw::ByteOrderReader;
use crate::diagnostics::{Diagnostics, NullDiagnostics};
use crate::ifd::{DngIfd, IfdError, ValueLocation};
use crate::ifd_reader::IfdReader;
use crate::shared::SharedContext;
use crate::tags::{parent, IfdValueType, PreviewColorSpace};
use crate::FileType;
use derivative::Derivative;
use std::cell::RefCell;
use std::collections::HashSet;
use std::io::{self, Read, Seek, SeekFrom};
use thiserror::Error;
use tracing::debug;

/// The error-type produced by [DngReader]
#[derive(Error, Debug)]
pub enum DngReaderError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("format error: {0}")]
    Format(String),
    #[error(transparent)]
    Ifd(#[from] IfdError),
}

/// Controls which parts of the directory structure [DngReader] follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    pub follow_sub_ifds: bool,
    pub follow_exif_ifd: bool,
    /// Upper bound for image directories and for chained directories, each.
    pub max_ifds: usize,
}
impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            follow_sub_ifds: true,
            follow_exif_ifd: true,
            max_ifds: 128,
        }
    }
}

/// An image directory together with the parent code it was read with.
#[derive(Debug, Clone, PartialEq)]
pub struct Directory {
    pub parent_code: u32,
    pub ifd: DngIfd,
}

/// The outcome of [DngReader::validate].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// Whether the file is a valid DNG. Only problems of the main image are fatal.
    pub is_valid: bool,
    /// `(parent_code, is_valid)` for each image directory that was checked.
    pub directories: Vec<(u32, bool)>,
}

#[derive(Derivative)]
#[derivative(Debug)]
/// The main entrypoint for reading DNG/DCP files.
///
/// # Examples
///
/// ```no_run
/// use std::fs::File;
/// use dng_ifd::{DngReader, TracingDiagnostics};
///
/// let file = File::open("image.dng").expect("couldnt find file");
/// let dng = DngReader::read(file, &TracingDiagnostics).expect("couldnt read file as dng");
///
/// let report = dng.validate(&TracingDiagnostics);
/// println!("valid: {}, {} image IFDs", report.is_valid, dng.ifds().len());
/// ```
pub struct DngReader<R: Read + Seek> {
    file_type: FileType,
    #[derivative(Debug = "ignore")]
    reader: RefCell<ByteOrderReader<R>>,
    shared: SharedContext,
    ifds: Vec<Directory>,
    chained_ifds: Vec<Directory>,
    main_index: Option<usize>,
}
impl<R: Read + Seek> DngReader<R> {
    /// Reads and parses the IFD-tree eagerly, using the default [ReaderOptions].
    ///
    /// NOTE: image data is not read. Strip / tile offsets beyond the cached ones can be read
    /// later through [tile_offsets][Self::tile_offsets].
    pub fn read(reader: R, diag: &dyn Diagnostics) -> Result<Self, DngReaderError> {
        Self::read_with_options(reader, ReaderOptions::default(), diag)
    }

    pub fn read_with_options(
        mut reader: R,
        options: ReaderOptions,
        diag: &dyn Diagnostics,
    ) -> Result<Self, DngReaderError> {
        // the first two bytes set the byte order
        let mut header = [0u8; 2];
        reader.read_exact(&mut header)?;
        let is_little_endian = match header {
            [0x49, 0x49] => true,
            [0x4D, 0x4D] => false,
            _ => {
                diag.error("Unknown byte order");
                return Err(DngReaderError::Format("invalid header bytes".to_string()));
            }
        };
        let mut reader = ByteOrderReader::new(reader, is_little_endian);
        let magic = reader.read_u16()?;
        let file_type = FileType::from_magic(magic).ok_or_else(|| {
            DngReaderError::Format(format!(
                "invalid magic byte sequence (expected 42, got {magic})"
            ))
        })?;
        let first_ifd_offset = reader.read_u32()? as u64;
        let stream_len = reader.seek(SeekFrom::End(0))?;

        let mut walker = Walker {
            reader: &mut reader,
            diag,
            options,
            stream_len,
            visited: HashSet::new(),
            shared: SharedContext::new(),
            ifds: Vec::new(),
            chained_ifds: Vec::new(),
        };
        walker.walk(first_ifd_offset)?;
        let Walker {
            mut shared,
            mut ifds,
            chained_ifds,
            ..
        } = walker;

        shared.post_parse(diag);
        let main_index = if shared.is_dng() {
            finish_dng(&mut ifds, &chained_ifds, diag)
        } else {
            None
        };
        debug!(
            ?file_type,
            ifds = ifds.len(),
            chained_ifds = chained_ifds.len(),
            dng_version = shared.dng_version,
            "read file"
        );

        Ok(Self {
            file_type,
            reader: RefCell::new(reader),
            shared,
            ifds,
            chained_ifds,
            main_index,
        })
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn shared(&self) -> &SharedContext {
        &self.shared
    }

    /// IFD 0 followed by all SubIFDs, in the order they were found.
    pub fn ifds(&self) -> &[Directory] {
        &self.ifds
    }

    /// Directories chained after IFD 0. DNG readers ignore these.
    pub fn chained_ifds(&self) -> &[Directory] {
        &self.chained_ifds
    }

    /// Returns the IFD holding the main image (not a preview), if the file has one.
    pub fn main_ifd(&self) -> Option<&DngIfd> {
        self.main_index.map(|index| &self.ifds[index].ifd)
    }

    pub fn previews(&self) -> impl Iterator<Item = &Directory> {
        self.ifds.iter().filter(|directory| directory.ifd.is_preview())
    }

    /// Checks the file and every image directory for DNG conformance.
    pub fn validate(&self, diag: &dyn Diagnostics) -> ValidationReport {
        let mut report = ValidationReport {
            is_valid: false,
            directories: Vec::new(),
        };
        if !self.shared.is_valid_dng(diag) {
            return report;
        }
        if self.file_type != FileType::Dng {
            diag.error("Invalid TIFF magic number");
            return report;
        }
        let Some(main_index) = self.main_index else {
            diag.error("Unable to find main image IFD");
            return report;
        };
        report.is_valid = true;
        for (index, directory) in self.ifds.iter().enumerate() {
            let valid = directory
                .ifd
                .is_valid_dng(&self.shared, directory.parent_code, diag);
            if !valid && index == main_index {
                report.is_valid = false;
            }
            report.directories.push((directory.parent_code, valid));
        }
        report
    }

    /// Runs `f` with the underlying stream, e.g. to read values that were not decoded eagerly.
    pub fn with_stream<T>(&self, f: impl FnOnce(&mut ByteOrderReader<R>) -> T) -> T {
        f(&mut self.reader.borrow_mut())
    }

    /// All strip / tile offsets of `ifd`, re-read from the file where they were not cached.
    pub fn tile_offsets(&self, ifd: &DngIfd) -> io::Result<Vec<u32>> {
        self.with_stream(|stream| ifd.tile_offsets(stream))
    }

    pub fn tile_byte_counts(&self, ifd: &DngIfd) -> io::Result<Vec<u32>> {
        self.with_stream(|stream| ifd.tile_byte_counts(stream))
    }

    pub fn into_inner(self) -> R {
        self.reader.into_inner().into_inner()
    }
}

/// Picks the main image and fills in preview defaults. Returns the index of the main image.
fn finish_dng(
    ifds: &mut [Directory],
    chained_ifds: &[Directory],
    diag: &dyn Diagnostics,
) -> Option<usize> {
    let mut main_index = None;
    for (index, directory) in ifds.iter_mut().enumerate() {
        let ifd = &mut directory.ifd;
        if ifd.uses_new_sub_file_type && ifd.is_main_ifd() {
            if main_index.is_none() {
                main_index = Some(index);
            } else {
                diag.error("Multiple IFDs marked as main image");
            }
        } else if ifd.is_preview() && ifd.preview_info.color_space.is_none() {
            let color_space = if ifd.samples_per_pixel == 1 {
                PreviewColorSpace::GrayGamma22
            } else {
                PreviewColorSpace::Srgb
            };
            ifd.preview_info.color_space = Some(color_space.into());
        }
    }
    if !chained_ifds.is_empty() {
        diag.warning("This file has Chained IFDs, which will be ignored by DNG readers");
    }
    main_index
}

struct Walker<'a, R: Read + Seek> {
    reader: &'a mut ByteOrderReader<R>,
    diag: &'a dyn Diagnostics,
    options: ReaderOptions,
    stream_len: u64,
    visited: HashSet<u64>,
    shared: SharedContext,
    ifds: Vec<Directory>,
    chained_ifds: Vec<Directory>,
}
impl<R: Read + Seek> Walker<'_, R> {
    fn walk(&mut self, first_ifd_offset: u64) -> Result<(), DngReaderError> {
        if first_ifd_offset >= self.stream_len {
            return Err(DngReaderError::Format(format!(
                "IFD 0 offset {first_ifd_offset} is past the end of the file"
            )));
        }
        self.visited.insert(first_ifd_offset);
        let ifd0 = self.read_image_ifd(first_ifd_offset, parent::IFD0)?;
        let next_offset = ifd0.next_ifd;
        self.ifds.push(Directory {
            parent_code: parent::IFD0,
            ifd: ifd0,
        });

        self.walk_chain(next_offset)?;
        if self.options.follow_sub_ifds {
            self.walk_sub_ifds()?;
        }
        let exif_offset = self.shared.exif_ifd;
        if self.options.follow_exif_ifd && exif_offset != 0 {
            self.walk_exif(exif_offset)?;
        }
        Ok(())
    }

    fn read_image_ifd(&mut self, offset: u64, parent_code: u32) -> Result<DngIfd, DngReaderError> {
        self.reader.set_position(offset)?;
        let raw = IfdReader::read(&mut *self.reader, parent_code, self.diag)?;
        Ok(raw.process(&mut *self.reader, parent_code, &mut self.shared, self.diag)?)
    }

    fn walk_chain(&mut self, mut next_offset: u64) -> Result<(), DngReaderError> {
        while next_offset != 0 {
            if next_offset >= self.stream_len {
                self.diag.warning("Chained IFD offset past end of stream");
                break;
            }
            if !self.visited.insert(next_offset) {
                self.diag.warning("Chained IFD refers to an IFD that was already read");
                break;
            }
            if self.chained_ifds.len() >= self.options.max_ifds {
                self.diag.warning("Chained IFD count exceeds parsing limit");
                break;
            }
            let parent_code = parent::FIRST_CHAINED_IFD + self.chained_ifds.len() as u32;
            // some writers leave garbage in the next IFD link
            self.reader.set_position(next_offset)?;
            let raw = match IfdReader::read(&mut *self.reader, parent_code, &NullDiagnostics) {
                Ok(raw) if raw.is_sane(self.stream_len) => raw,
                Ok(_) => {
                    self.diag.warning("Chained IFD is not valid");
                    break;
                }
                Err(error) => {
                    debug!(%error, offset = next_offset, "unreadable chained IFD");
                    self.diag.warning("Chained IFD is not valid");
                    break;
                }
            };
            // chained directories do not contribute file-global state
            let mut scratch = SharedContext::new();
            let ifd = match raw.process(&mut *self.reader, parent_code, &mut scratch, self.diag) {
                Ok(ifd) => ifd,
                Err(error) => {
                    debug!(%error, offset = next_offset, "undecodable chained IFD");
                    self.diag.warning("Chained IFD is not valid");
                    break;
                }
            };
            next_offset = ifd.next_ifd;
            self.chained_ifds.push(Directory { parent_code, ifd });
        }
        Ok(())
    }

    /// Breadth-first over IFD 0 and the SubIFDs found so far.
    fn walk_sub_ifds(&mut self) -> Result<(), DngReaderError> {
        let mut index = 0;
        while index < self.ifds.len() {
            let location = ValueLocation {
                tag_type: IfdValueType::Long.into(),
                count: self.ifds[index].ifd.sub_ifds_count,
                offset: self.ifds[index].ifd.sub_ifds_offset,
            };
            index += 1;
            if !location.is_present() {
                continue;
            }
            let remaining = self.options.max_ifds.saturating_sub(self.ifds.len());
            if location.count as usize > remaining {
                self.diag.warning("SubIFD count exceeds parsing limit");
            }
            let offsets = ValueLocation {
                count: location.count.min(remaining as u32),
                ..location
            }
            .read_u32s(&mut *self.reader)?;

            for offset in offsets {
                let offset = offset as u64;
                if offset >= self.stream_len {
                    self.diag.warning("SubIFD offset past end of stream");
                    continue;
                }
                if !self.visited.insert(offset) {
                    self.diag.warning("SubIFD refers to an IFD that was already read");
                    continue;
                }
                let parent_code = parent::FIRST_SUB_IFD + self.ifds.len() as u32 - 1;
                let ifd = self.read_image_ifd(offset, parent_code)?;
                self.ifds.push(Directory { parent_code, ifd });
            }
        }
        Ok(())
    }

    fn walk_exif(&mut self, offset: u64) -> Result<(), DngReaderError> {
        if offset >= self.stream_len || !self.visited.insert(offset) {
            self.diag.warning("Exif IFD is not valid");
            return Ok(());
        }
        self.reader.set_position(offset)?;
        let raw = IfdReader::read(&mut *self.reader, parent::EXIF_IFD, self.diag)?;
        raw.process_shared(&mut *self.reader, parent::EXIF_IFD, &mut self.shared, self.diag)?;
        Ok(())
    }
}
