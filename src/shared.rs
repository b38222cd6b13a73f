//! File-global state that is needed to interpret and validate the individual directories.

use crate::byte_order_rw::ByteOrderReader;
use crate::diagnostics::Diagnostics;
use crate::tag_decoder::{
    check_color_image, check_tag_count_exact, check_tag_type, parse_date_time_tag,
    parse_dual_string_tag, parse_encoded_string_tag, parse_matrix_tag, parse_string_tag,
    parse_vector_tag, DateTime, Matrix, TagEntry, Vector,
};
use crate::tags::{dng_version, exif, ifd, parent, IfdValueType};
use std::io::{self, Read};

/// Upper bound of the camera color planes.
pub const MAX_COLOR_PLANES: u32 = 4;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedContext {
    /// Number of color planes of the camera; 0 while unknown.
    pub color_planes: u32,
    pub dng_version: u32,
    pub dng_backward_version: u32,
    pub unique_camera_model: String,
    pub color_matrix_1: Option<Matrix>,
    pub as_shot_neutral: Option<Vector>,
    pub date_time: Option<DateTime>,
    pub copyright: String,
    pub copyright_editor: String,
    pub user_comment: String,
    pub exif_ifd: u64,
    pub xmp_count: u32,
    pub xmp_offset: u64,
}

/// Reads the four version bytes, most significant first.
fn read_version<R: Read>(stream: &mut ByteOrderReader<R>) -> io::Result<u32> {
    let bytes = stream.read_bytes(4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

impl SharedContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context for validating directories of a file with the given version and color planes.
    pub fn with_version(dng_version: u32, color_planes: u32) -> Self {
        Self {
            color_planes,
            dng_version,
            dng_backward_version: dng_version & 0xFFFF0000,
            ..Self::default()
        }
    }

    pub fn is_dng(&self) -> bool {
        self.dng_version != 0
    }

    /// Handles the file-global tags of IFD 0 and the EXIF directory.
    ///
    /// Returns `Ok(false)` for tags it does not handle and for tags that failed to parse.
    pub fn parse_tag<R: Read>(
        &mut self,
        stream: &mut ByteOrderReader<R>,
        entry: &TagEntry,
        diag: &dyn Diagnostics,
    ) -> io::Result<bool> {
        if entry.parent_code == parent::IFD0 && self.parse_ifd0_tag(stream, entry, diag)? {
            return Ok(true);
        }
        if entry.parent_code == parent::EXIF_IFD && entry.code == exif::UserComment {
            self.user_comment = parse_encoded_string_tag(stream, diag, entry)?;
            return Ok(true);
        }
        Ok(false)
    }

    fn parse_ifd0_tag<R: Read>(
        &mut self,
        stream: &mut ByteOrderReader<R>,
        entry: &TagEntry,
        diag: &dyn Diagnostics,
    ) -> io::Result<bool> {
        match entry.code {
            ifd::DNGVersion => {
                check_tag_type(diag, entry, &[IfdValueType::Byte]);
                if entry.count < 4 {
                    check_tag_count_exact(diag, entry, 4);
                    return Ok(false);
                }
                self.dng_version = read_version(stream)?;
            }
            ifd::DNGBackwardVersion => {
                check_tag_type(diag, entry, &[IfdValueType::Byte]);
                if entry.count < 4 {
                    check_tag_count_exact(diag, entry, 4);
                    return Ok(false);
                }
                self.dng_backward_version = read_version(stream)?;
            }
            ifd::UniqueCameraModel => {
                check_tag_type(diag, entry, &[IfdValueType::Ascii]);
                self.unique_camera_model = parse_string_tag(stream, diag, entry, true, true)?;
            }
            ifd::ColorMatrix1 => {
                check_tag_type(diag, entry, &[IfdValueType::SignedRational]);
                if self.color_planes == 0 {
                    self.color_planes = (entry.count / 3).min(MAX_COLOR_PLANES);
                }
                if !check_color_image(diag, entry, self.color_planes) {
                    return Ok(false);
                }
                let planes = self.color_planes;
                return parse_matrix_tag(stream, diag, entry, planes, 3, &mut self.color_matrix_1);
            }
            ifd::AsShotNeutral => {
                check_tag_type(diag, entry, &[IfdValueType::Rational]);
                if !check_color_image(diag, entry, self.color_planes) {
                    return Ok(false);
                }
                let planes = self.color_planes;
                return parse_vector_tag(stream, diag, entry, planes, &mut self.as_shot_neutral);
            }
            ifd::DateTime => {
                let (ok, date_time) = parse_date_time_tag(stream, diag, entry)?;
                if !ok {
                    return Ok(false);
                }
                self.date_time = Some(date_time);
            }
            ifd::Copyright => {
                check_tag_type(diag, entry, &[IfdValueType::Ascii]);
                let (copyright, editor) = parse_dual_string_tag(stream, diag, entry)?;
                self.copyright = copyright;
                self.copyright_editor = editor;
            }
            ifd::ExifIFD => {
                check_tag_type(diag, entry, &[IfdValueType::Long, IfdValueType::Ifd]);
                check_tag_count_exact(diag, entry, 1);
                self.exif_ifd = stream.tag_value_u32(entry.tag_type)? as u64;
            }
            ifd::XMP => {
                check_tag_type(diag, entry, &[IfdValueType::Byte, IfdValueType::Undefined]);
                self.xmp_count = entry.count;
                self.xmp_offset = if entry.count > 0 { entry.offset } else { 0 };
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Fills in defaults once every directory has been parsed. Only applies to DNG files.
    pub fn post_parse(&mut self, diag: &dyn Diagnostics) {
        if !self.is_dng() {
            return;
        }
        if self.dng_version < dng_version::V1_0_0_0 {
            diag.warning("DNGVersion less than 1.0.0.0");
            self.dng_version = dng_version::V1_0_0_0;
        }
        if self.dng_backward_version == 0 {
            self.dng_backward_version = self.dng_version & 0xFFFF0000;
        }
        if self.dng_backward_version < dng_version::V1_0_0_0 {
            diag.warning("DNGBackwardVersion less than 1.0.0.0");
            self.dng_backward_version = dng_version::V1_0_0_0;
        }
        if self.dng_backward_version > self.dng_version {
            diag.warning("DNGBackwardVersion > DNGVersion");
            self.dng_backward_version = self.dng_version;
        }
        if self.unique_camera_model.is_empty() {
            diag.warning("Missing or invalid UniqueCameraModel");
            self.unique_camera_model = "Digital Negative".to_string();
        }
        // without a color matrix the camera is monochrome
        if self.color_planes == 0 {
            self.color_planes = 1;
        }
    }

    /// Checks the file-global versions. Problems are reported as errors.
    pub fn is_valid_dng(&self, diag: &dyn Diagnostics) -> bool {
        if self.dng_version < dng_version::V1_0_0_0 {
            diag.error("Missing or invalid DNGVersion");
            return false;
        }
        if self.dng_backward_version > dng_version::CURRENT {
            diag.error("DNGBackwardVersion (or DNGVersion) is too high");
            return false;
        }
        true
    }
}
