//! The decoded state of one image file directory.
//!
//! A [DngIfd] is filled tag by tag through [DngIfd::parse_tag], finalized by
//! [DngIfd::post_parse] and then checked for conformance with [DngIfd::is_valid_dng].

mod parse;
mod validate;

use crate::byte_order_rw::ByteOrderReader;
use crate::geometry::{Rect, URational};
use crate::tags::{
    Compression, IfdValueType, PhotometricInterpretation, PlanarConfiguration, SampleFormat,
    SubFileType,
};
use derivative::Derivative;
use std::fmt::{Display, Formatter};
use std::io::{self, Read, Seek};
use thiserror::Error;

pub const MAX_SAMPLES_PER_PIXEL: usize = 4;
pub const MAX_CFA_PATTERN: usize = 8;
pub const MAX_BLACK_PATTERN: usize = 8;
pub const MAX_MASKED_AREAS: usize = 4;
/// Strip / tile offsets and byte counts up to this count are cached while parsing.
pub const MAX_TILE_INFO: usize = 32;
pub const MAX_IMAGE_SIDE: u32 = 65000;

/// The error-type produced while parsing tags into a [DngIfd].
#[derive(Error, Debug)]
pub enum IfdError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("{tag} has values that differ between samples")]
    NotConstant { tag: String },
}

/// Type, count and position of a value that is kept in the file instead of being decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValueLocation {
    pub tag_type: u16,
    pub count: u32,
    pub offset: u64,
}

impl ValueLocation {
    pub fn is_present(&self) -> bool {
        self.count != 0
    }

    pub fn read_u32s<R: Read + Seek>(
        &self,
        stream: &mut ByteOrderReader<R>,
    ) -> io::Result<Vec<u32>> {
        stream.set_position(self.offset)?;
        (0..self.count)
            .map(|_| stream.tag_value_u32(self.tag_type))
            .collect()
    }

    pub fn read_f64s<R: Read + Seek>(
        &self,
        stream: &mut ByteOrderReader<R>,
    ) -> io::Result<Vec<f64>> {
        stream.set_position(self.offset)?;
        (0..self.count)
            .map(|_| stream.tag_value_f64(self.tag_type))
            .collect()
    }
}

/// A 16 byte digest, e.g. of the settings a preview was rendered with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 16]);

impl Fingerprint {
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

#[derive(Derivative, Clone, PartialEq)]
#[derivative(Debug, Default)]
pub struct PreviewInfo {
    #[derivative(Default(value = "true"))]
    pub is_primary: bool,
    pub application_name: String,
    pub application_version: String,
    pub settings_name: String,
    pub settings_digest: Fingerprint,
    /// Raw [PreviewColorSpace](crate::tags::PreviewColorSpace) code; filled in from the sample
    /// count for previews that do not specify it.
    pub color_space: Option<u32>,
    pub date_time: String,
}

/// One TIFF / DNG image file directory.
///
/// Enumerated values are kept as raw codes so that invalid files can be represented and
/// reported on; the typed views are available through the accessor methods.
#[derive(Derivative, Clone, PartialEq)]
#[derivative(Debug, Default)]
pub struct DngIfd {
    pub uses_new_sub_file_type: bool,
    pub new_sub_file_type: u32,

    pub image_width: u32,
    pub image_length: u32,

    pub bits_per_sample: [u32; MAX_SAMPLES_PER_PIXEL],
    #[derivative(Default(value = "1"))]
    pub compression: u32,
    #[derivative(Default(value = "1"))]
    pub predictor: u32,
    #[derivative(Default(value = "0xFFFFFFFF"))]
    pub photometric_interpretation: u32,
    #[derivative(Default(value = "1"))]
    pub fill_order: u32,

    pub orientation: u32,
    pub orientation_type: u16,
    pub orientation_offset: u64,
    pub orientation_big_endian: bool,

    #[derivative(Default(value = "1"))]
    pub samples_per_pixel: u32,
    #[derivative(Default(value = "1"))]
    pub planar_configuration: u32,

    pub x_resolution: f64,
    pub y_resolution: f64,
    pub resolution_unit: u32,

    pub uses_strips: bool,
    pub uses_tiles: bool,
    pub tile_width: u32,
    pub tile_length: u32,

    pub tile_offsets_location: ValueLocation,
    #[derivative(Debug = "ignore")]
    pub tile_offset: [u32; MAX_TILE_INFO],
    pub tile_byte_counts_location: ValueLocation,
    #[derivative(Debug = "ignore")]
    pub tile_byte_count: [u32; MAX_TILE_INFO],

    pub sub_ifds_count: u32,
    pub sub_ifds_offset: u64,

    pub extra_samples_count: u32,
    pub extra_samples: [u32; MAX_SAMPLES_PER_PIXEL],
    #[derivative(Default(value = "[1; MAX_SAMPLES_PER_PIXEL]"))]
    pub sample_format: [u32; MAX_SAMPLES_PER_PIXEL],

    pub jpeg_tables_count: u32,
    pub jpeg_tables_offset: u64,
    pub jpeg_interchange_format: u32,
    pub jpeg_interchange_format_length: u32,

    pub ycbcr_coefficients: [f64; 3],
    pub ycbcr_sub_sample_h: u32,
    pub ycbcr_sub_sample_v: u32,
    pub ycbcr_positioning: u32,
    pub reference_black_white: [f64; 6],

    pub cfa_repeat_pattern_rows: u32,
    pub cfa_repeat_pattern_cols: u32,
    #[derivative(Default(value = "[[255; MAX_CFA_PATTERN]; MAX_CFA_PATTERN]"))]
    pub cfa_pattern: [[u8; MAX_CFA_PATTERN]; MAX_CFA_PATTERN],
    #[derivative(Default(value = "[0, 1, 2, 255]"))]
    pub cfa_plane_color: [u8; 4],
    #[derivative(Default(value = "1"))]
    pub cfa_layout: u32,
    pub bayer_green_split: u32,

    pub linearization_table: ValueLocation,

    #[derivative(Default(value = "1"))]
    pub black_level_repeat_rows: u32,
    #[derivative(Default(value = "1"))]
    pub black_level_repeat_cols: u32,
    #[derivative(Debug = "ignore")]
    pub black_level: [[[f64; MAX_SAMPLES_PER_PIXEL]; MAX_BLACK_PATTERN]; MAX_BLACK_PATTERN],
    pub black_level_delta_h: ValueLocation,
    pub black_level_delta_v: ValueLocation,

    /// Negative while unset.
    #[derivative(Default(value = "[-1.0; MAX_SAMPLES_PER_PIXEL]"))]
    pub white_level: [f64; MAX_SAMPLES_PER_PIXEL],

    #[derivative(Default(value = "URational::new(1, 1)"))]
    pub default_scale_h: URational,
    #[derivative(Default(value = "URational::new(1, 1)"))]
    pub default_scale_v: URational,
    #[derivative(Default(value = "URational::new(1, 1)"))]
    pub best_quality_scale: URational,
    #[derivative(Default(value = "URational::new(0, 1)"))]
    pub default_crop_origin_h: URational,
    #[derivative(Default(value = "URational::new(0, 1)"))]
    pub default_crop_origin_v: URational,
    /// A zero denominator marks the size as unset.
    pub default_crop_size_h: URational,
    pub default_crop_size_v: URational,
    pub chroma_blur_radius: URational,
    #[derivative(Default(value = "URational::new(1, 1)"))]
    pub anti_alias_strength: URational,

    pub active_area: Rect,
    pub masked_area_count: u32,
    pub masked_areas: [Rect; MAX_MASKED_AREAS],

    #[derivative(Default(value = "1"))]
    pub row_interleave_factor: u32,
    #[derivative(Default(value = "1"))]
    pub sub_tile_block_rows: u32,
    #[derivative(Default(value = "1"))]
    pub sub_tile_block_cols: u32,

    pub preview_info: PreviewInfo,

    pub opcode_list_1: ValueLocation,
    pub opcode_list_2: ValueLocation,
    pub opcode_list_3: ValueLocation,

    pub this_ifd: u64,
    pub next_ifd: u64,
}

impl DngIfd {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_main_ifd(&self) -> bool {
        self.new_sub_file_type == u32::from(SubFileType::MainImage)
    }

    pub fn sub_file_type(&self) -> Option<SubFileType> {
        SubFileType::try_from(self.new_sub_file_type).ok()
    }

    pub fn photometric(&self) -> Option<PhotometricInterpretation> {
        PhotometricInterpretation::try_from(self.photometric_interpretation).ok()
    }

    pub fn compression_kind(&self) -> Option<Compression> {
        Compression::try_from(self.compression).ok()
    }

    pub fn planar(&self) -> Option<PlanarConfiguration> {
        PlanarConfiguration::try_from(self.planar_configuration).ok()
    }

    pub fn image_area(&self) -> Rect {
        Rect::from_size(self.image_length, self.image_width)
    }

    pub fn masked_areas(&self) -> &[Rect] {
        let count = (self.masked_area_count as usize).min(MAX_MASKED_AREAS);
        &self.masked_areas[..count]
    }

    /// `(1 << BitsPerSample) - 1`, saturating for 32 bit samples.
    pub fn default_white_level(&self) -> f64 {
        match self.bits_per_sample[0] {
            bits @ 0..=31 => ((1u32 << bits) - 1) as f64,
            _ => u32::MAX as f64,
        }
    }

    pub fn tiles_across(&self) -> u32 {
        if self.tile_width == 0 {
            return 0;
        }
        let across = (self.image_width as u64).div_ceil(self.tile_width as u64);
        across as u32
    }

    pub fn tiles_down(&self) -> u32 {
        if self.tile_length == 0 {
            return 0;
        }
        let down = (self.image_length as u64).div_ceil(self.tile_length as u64);
        down as u32
    }

    pub fn tiles_per_image(&self) -> u32 {
        let mut total = self.tiles_across() as u64 * self.tiles_down() as u64;
        if self.planar_configuration == u32::from(PlanarConfiguration::Planar) {
            total *= self.samples_per_pixel as u64;
        }
        total.min(u32::MAX as u64) as u32
    }

    /// The image area covered by one tile. The last strip does not extend beyond the image.
    pub fn tile_area(&self, row: u32, col: u32) -> Rect {
        let clamp = |v: u64| v.min(i32::MAX as u64) as i32;
        let t = row as u64 * self.tile_length as u64;
        let l = col as u64 * self.tile_width as u64;
        let mut b = t + self.tile_length as u64;
        if self.uses_strips {
            b = b.min(self.image_length as u64);
        }
        Rect::new(
            clamp(t),
            clamp(l),
            clamp(b),
            clamp(l + self.tile_width as u64),
        )
    }

    /// The size of an uncompressed tile; 0 for compressed data whose size is only known from
    /// the byte counts.
    pub fn tile_byte_count(&self, tile: &Rect) -> u64 {
        if self.compression != u32::from(Compression::Uncompressed) {
            return 0;
        }
        let samples = self.samples_per_pixel as u64;
        let mut bits_per_row = tile.width() as u64 * self.bits_per_sample[0] as u64;
        if self.planar_configuration == u32::from(PlanarConfiguration::Interleaved) {
            bits_per_row *= samples;
        }
        let mut bytes_per_row = (bits_per_row + 7) >> 3;
        if self.planar_configuration == u32::from(PlanarConfiguration::RowInterleaved) {
            bytes_per_row *= samples;
        }
        bytes_per_row * tile.height() as u64
    }

    /// The smallest value type able to hold one sample.
    pub fn pixel_type(&self) -> IfdValueType {
        if self.sample_format[0] == u32::from(SampleFormat::FloatingPoint) {
            IfdValueType::Float
        } else if self.bits_per_sample[0] <= 8 {
            IfdValueType::Byte
        } else if self.bits_per_sample[0] <= 16 {
            IfdValueType::Short
        } else {
            IfdValueType::Long
        }
    }

    pub fn is_baseline_jpeg(&self) -> bool {
        if self.compression != u32::from(Compression::Jpeg)
            || self.bits_per_sample[0] != 8
            || self.sample_format[0] != u32::from(SampleFormat::UnsignedInteger)
        {
            return false;
        }
        match self.photometric() {
            Some(PhotometricInterpretation::BlackIsZero) => self.samples_per_pixel == 1,
            Some(PhotometricInterpretation::YCbCr) => {
                self.samples_per_pixel == 3
                    && self.planar_configuration == u32::from(PlanarConfiguration::Interleaved)
            }
            _ => false,
        }
    }

    /// All strip / tile offsets, re-read from the file when there were too many to cache.
    pub fn tile_offsets<R: Read + Seek>(
        &self,
        stream: &mut ByteOrderReader<R>,
    ) -> io::Result<Vec<u32>> {
        Self::cached_or_read(&self.tile_offsets_location, &self.tile_offset, stream)
    }

    pub fn tile_byte_counts<R: Read + Seek>(
        &self,
        stream: &mut ByteOrderReader<R>,
    ) -> io::Result<Vec<u32>> {
        Self::cached_or_read(&self.tile_byte_counts_location, &self.tile_byte_count, stream)
    }

    fn cached_or_read<R: Read + Seek>(
        location: &ValueLocation,
        cache: &[u32; MAX_TILE_INFO],
        stream: &mut ByteOrderReader<R>,
    ) -> io::Result<Vec<u32>> {
        let count = location.count as usize;
        if count <= MAX_TILE_INFO {
            Ok(cache[..count].to_vec())
        } else {
            location.read_u32s(stream)
        }
    }

    /// The linearization table, read from the file.
    pub fn linearization_table<R: Read + Seek>(
        &self,
        stream: &mut ByteOrderReader<R>,
    ) -> io::Result<Vec<u32>> {
        self.linearization_table.read_u32s(stream)
    }

    pub fn black_level_deltas<R: Read + Seek>(
        &self,
        stream: &mut ByteOrderReader<R>,
    ) -> io::Result<(Vec<f64>, Vec<f64>)> {
        let h = self.black_level_delta_h.read_f64s(stream)?;
        let v = self.black_level_delta_v.read_f64s(stream)?;
        Ok((h, v))
    }

    fn bytes_per_sample(&self) -> u32 {
        let bytes = self.bits_per_sample[0].div_ceil(8);
        self.samples_per_pixel.saturating_mul(bytes).max(1)
    }

    /// Lays the image out as one strip.
    pub fn set_single_strip(&mut self) {
        self.tile_width = self.image_width;
        self.tile_length = self.image_length;
        self.uses_tiles = false;
        self.uses_strips = true;
    }

    /// Picks roughly square tiles of about `bytes_per_tile` bytes, with sides that are
    /// multiples of the cell size.
    pub fn find_tile_size(&mut self, bytes_per_tile: u32, cell_h: u32, cell_v: u32) {
        let cell_h = cell_h.max(1);
        let cell_v = cell_v.max(1);
        let samples_per_tile = bytes_per_tile / self.bytes_per_sample();
        let tile_side = (samples_per_tile as f64).sqrt().round() as u32;

        self.tile_width = self.image_width.min(tile_side).max(1);
        let across = self.tiles_across().max(1);
        self.tile_width = self.image_width.div_ceil(across);
        self.tile_width = self.tile_width.div_ceil(cell_h) * cell_h;

        let rows = samples_per_tile / self.tile_width.max(1);
        self.tile_length = rows.clamp(1, self.image_length.max(1));
        let down = self.tiles_down().max(1);
        self.tile_length = self.image_length.div_ceil(down);
        self.tile_length = self.tile_length.div_ceil(cell_v) * cell_v;

        self.uses_tiles = true;
        self.uses_strips = false;
    }

    /// Picks full-width strips of about `bytes_per_strip` bytes.
    pub fn find_strip_size(&mut self, bytes_per_strip: u32, cell_v: u32) {
        let cell_v = cell_v.max(1);
        let samples_per_strip = bytes_per_strip / self.bytes_per_sample();

        self.tile_width = self.image_width;
        let rows = samples_per_strip / self.tile_width.max(1);
        self.tile_length = rows.clamp(1, self.image_length.max(1));
        let down = self.tiles_down().max(1);
        self.tile_length = self.image_length.div_ceil(down);
        self.tile_length = self.tile_length.div_ceil(cell_v) * cell_v;

        self.uses_tiles = false;
        self.uses_strips = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_order_rw::ByteOrderWriter;
    use std::io::Cursor;

    fn sized(width: u32, length: u32, tile_width: u32, tile_length: u32) -> DngIfd {
        DngIfd {
            image_width: width,
            image_length: length,
            tile_width,
            tile_length,
            ..DngIfd::default()
        }
    }

    #[test]
    fn defaults() {
        let ifd = DngIfd::new();
        assert_eq!(ifd.photometric_interpretation, 0xFFFFFFFF);
        assert_eq!(ifd.compression, 1);
        assert_eq!(ifd.cfa_plane_color, [0, 1, 2, 255]);
        assert_eq!(ifd.cfa_pattern[7][7], 255);
        assert_eq!(ifd.white_level, [-1.0; 4]);
        assert!(ifd.default_crop_size_h.is_unset());
        assert_eq!(ifd.default_crop_origin_h, URational::new(0, 1));
        assert!(ifd.preview_info.is_primary);
        assert!(ifd.is_main_ifd());
    }

    #[test]
    fn tiles_cover_the_image() {
        for (w, l, tw, tl) in [(100, 100, 16, 16), (1, 1, 1, 1), (65000, 3, 256, 2), (17, 5, 17, 5)] {
            let ifd = sized(w, l, tw, tl);
            let across = ifd.tiles_across();
            let down = ifd.tiles_down();
            assert!(across * tw >= w && across * tw < w + tw);
            assert!(down * tl >= l && down * tl < l + tl);
        }
        assert_eq!(sized(100, 100, 0, 0).tiles_across(), 0);
        assert_eq!(sized(100, 100, 0, 0).tiles_down(), 0);
    }

    #[test]
    fn planar_tiles_multiply_by_samples() {
        let mut ifd = sized(100, 100, 50, 50);
        ifd.samples_per_pixel = 3;
        assert_eq!(ifd.tiles_per_image(), 4);
        ifd.planar_configuration = PlanarConfiguration::Planar.into();
        assert_eq!(ifd.tiles_per_image(), 12);
    }

    #[test]
    fn last_strip_is_clamped() {
        let mut ifd = sized(100, 10, 100, 4);
        assert_eq!(ifd.tile_area(2, 0), Rect::new(8, 0, 12, 100));
        ifd.uses_strips = true;
        assert_eq!(ifd.tile_area(2, 0), Rect::new(8, 0, 10, 100));
    }

    #[test]
    fn uncompressed_tile_sizes() {
        let mut ifd = sized(10, 10, 10, 10);
        ifd.bits_per_sample = [12, 12, 12, 0];
        ifd.samples_per_pixel = 3;
        let tile = Rect::new(0, 0, 2, 3);
        // 3 px * 12 bit * 3 samples = 108 bit = 14 byte per row
        assert_eq!(ifd.tile_byte_count(&tile), 28);
        ifd.planar_configuration = PlanarConfiguration::RowInterleaved.into();
        // 36 bit = 5 byte per sample row
        assert_eq!(ifd.tile_byte_count(&tile), 30);
        ifd.compression = Compression::Jpeg.into();
        assert_eq!(ifd.tile_byte_count(&tile), 0);
    }

    #[test]
    fn pixel_types() {
        let mut ifd = DngIfd::new();
        ifd.bits_per_sample[0] = 8;
        assert_eq!(ifd.pixel_type(), IfdValueType::Byte);
        ifd.bits_per_sample[0] = 14;
        assert_eq!(ifd.pixel_type(), IfdValueType::Short);
        ifd.bits_per_sample[0] = 32;
        assert_eq!(ifd.pixel_type(), IfdValueType::Long);
        ifd.sample_format[0] = SampleFormat::FloatingPoint.into();
        assert_eq!(ifd.pixel_type(), IfdValueType::Float);
    }

    #[test]
    fn baseline_jpeg() {
        let mut ifd = DngIfd::new();
        ifd.compression = Compression::Jpeg.into();
        ifd.bits_per_sample[0] = 8;
        ifd.photometric_interpretation = PhotometricInterpretation::YCbCr.into();
        ifd.samples_per_pixel = 3;
        assert!(ifd.is_baseline_jpeg());
        ifd.planar_configuration = PlanarConfiguration::Planar.into();
        assert!(!ifd.is_baseline_jpeg());
        ifd.photometric_interpretation = PhotometricInterpretation::BlackIsZero.into();
        ifd.samples_per_pixel = 1;
        assert!(ifd.is_baseline_jpeg());
        ifd.bits_per_sample[0] = 12;
        assert!(!ifd.is_baseline_jpeg());
    }

    #[test]
    fn white_level_default_does_not_overflow() {
        let mut ifd = DngIfd::new();
        ifd.bits_per_sample[0] = 12;
        assert_eq!(ifd.default_white_level(), 4095.0);
        ifd.bits_per_sample[0] = 32;
        assert_eq!(ifd.default_white_level(), u32::MAX as f64);
    }

    #[test]
    fn many_offsets_are_re_read() {
        let mut writer = ByteOrderWriter::new(Vec::new(), true);
        writer.write_bytes(&[0; 8]).unwrap();
        for i in 0..40u32 {
            writer.write_u32(1000 + i).unwrap();
        }
        let mut stream = ByteOrderReader::new(Cursor::new(writer.into_inner()), true);

        let mut ifd = DngIfd::new();
        ifd.tile_offsets_location = ValueLocation {
            tag_type: IfdValueType::Long.into(),
            count: 40,
            offset: 8,
        };
        let offsets = ifd.tile_offsets(&mut stream).unwrap();
        assert_eq!(offsets.len(), 40);
        assert_eq!(offsets[39], 1039);

        ifd.tile_byte_counts_location.count = 2;
        ifd.tile_byte_count[1] = 7;
        assert_eq!(ifd.tile_byte_counts(&mut stream).unwrap(), vec![0, 7]);
    }

    #[test]
    fn sizing_helpers() {
        let mut ifd = sized(1000, 800, 0, 0);
        ifd.bits_per_sample[0] = 16;
        ifd.samples_per_pixel = 1;
        ifd.find_tile_size(128 * 128 * 2, 2, 2);
        assert!(ifd.uses_tiles && !ifd.uses_strips);
        assert_eq!(ifd.tile_width % 2, 0);
        assert_eq!(ifd.tile_length % 2, 0);
        assert!(ifd.tiles_across() * ifd.tile_width >= 1000);
        assert!(ifd.tiles_down() * ifd.tile_length >= 800);

        ifd.find_strip_size(1000 * 2 * 10, 1);
        assert!(ifd.uses_strips && !ifd.uses_tiles);
        assert_eq!(ifd.tile_width, 1000);
        assert_eq!(ifd.tile_length, 10);

        ifd.set_single_strip();
        assert_eq!((ifd.tile_width, ifd.tile_length), (1000, 800));
        assert_eq!(ifd.tiles_per_image(), 1);
    }
}
