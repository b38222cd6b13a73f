//! Parsing and validation of the image file directories (IFDs) of DNG and TIFF files.
//!
//! Each entry of a directory is decoded according to its tag code and value type into a
//! [DngIfd]; file-global tags end up in a [SharedContext]. After a directory is complete it is
//! finalized with [DngIfd::post_parse] and can be checked with [DngIfd::is_valid_dng].
//! Problems are reported to a [Diagnostics] sink instead of aborting the parse.
//!
//! [DngReader] walks a whole file: IFD 0, its SubIFDs, chained IFDs and the EXIF IFD.

pub mod byte_order_rw;
pub mod diagnostics;
pub mod dng_reader;
pub mod geometry;
pub mod ifd;
pub mod ifd_reader;
pub mod shared;
pub mod tag_decoder;
pub mod tags;

pub use diagnostics::{
    CollectingDiagnostics, Diagnostics, NullDiagnostics, Severity, TracingDiagnostics,
};
pub use dng_reader::{DngReader, DngReaderError, ReaderOptions, ValidationReport};
pub use ifd::{DngIfd, IfdError};
pub use shared::SharedContext;
pub use tag_decoder::TagEntry;

/// The kind of file, as given by the magic number following the byte order mark.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum FileType {
    Dng = 42,
    /// A DNG camera profile.
    Dcp = 0x4352,
}
impl FileType {
    pub fn from_magic(magic: u16) -> Option<Self> {
        match magic {
            42 => Some(Self::Dng),
            0x4352 => Some(Self::Dcp),
            _ => None,
        }
    }
}
