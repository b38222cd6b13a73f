use super::{
    DngIfd, IfdError, ValueLocation, MAX_BLACK_PATTERN, MAX_CFA_PATTERN, MAX_MASKED_AREAS,
    MAX_SAMPLES_PER_PIXEL, MAX_TILE_INFO,
};
use crate::byte_order_rw::ByteOrderReader;
use crate::diagnostics::{parent_name, Diagnostics};
use crate::geometry::{Rect, URational};
use crate::tag_decoder::{
    check_cfa, check_main_ifd, check_raw_ifd, check_tag_count, check_tag_count_exact,
    check_tag_type, parse_string_tag, TagEntry,
};
use crate::tags::{ifd, Compression, IfdValueType, PlanarConfiguration, SubFileType};
use std::io::Read;

use IfdValueType::{Ascii, Byte, Ifd, Long, Rational, Short, SignedRational, Undefined};

/// Caps loops over per-sample values for entries whose count is garbage.
const MAX_SAMPLE_VALUES: u32 = 0xFFFF;

impl DngIfd {
    /// Decodes one entry into this directory.
    ///
    /// Returns `Ok(false)` for tags that do not belong to an image directory and for tags that
    /// were rejected; type and count problems are reported to `diag` and do not fail the parse.
    pub fn parse_tag<R: Read>(
        &mut self,
        stream: &mut ByteOrderReader<R>,
        entry: &TagEntry,
        diag: &dyn Diagnostics,
    ) -> Result<bool, IfdError> {
        let t = entry.tag_type;
        match entry.code {
            ifd::NewSubFileType => {
                check_tag_type(diag, entry, &[Long]);
                check_tag_count_exact(diag, entry, 1);
                self.uses_new_sub_file_type = true;
                self.new_sub_file_type = stream.tag_value_u32(t)?;
                self.preview_info.is_primary =
                    self.new_sub_file_type == u32::from(SubFileType::PreviewImage);
            }
            ifd::ImageWidth => {
                check_tag_type(diag, entry, &[Short, Long]);
                check_tag_count_exact(diag, entry, 1);
                self.image_width = stream.tag_value_u32(t)?;
            }
            ifd::ImageLength => {
                check_tag_type(diag, entry, &[Short, Long]);
                check_tag_count_exact(diag, entry, 1);
                self.image_length = stream.tag_value_u32(t)?;
            }
            ifd::BitsPerSample => {
                check_tag_type(diag, entry, &[Short]);
                check_tag_count(diag, entry, 1, 0xFFFF);
                self.bits_per_sample = read_per_sample(stream, entry, self.bits_per_sample)?;
            }
            ifd::Compression => {
                check_tag_type(diag, entry, &[Short]);
                check_tag_count_exact(diag, entry, 1);
                self.compression = stream.tag_value_u32(t)?;
                if self.compression == 0 {
                    diag.warning(&format!(
                        "{} has invalid zero compression code",
                        parent_name(entry.parent_code)
                    ));
                    self.compression = Compression::Uncompressed.into();
                }
            }
            ifd::PhotometricInterpretation => {
                check_tag_type(diag, entry, &[Short]);
                check_tag_count_exact(diag, entry, 1);
                self.photometric_interpretation = stream.tag_value_u32(t)?;
            }
            ifd::FillOrder => {
                check_tag_type(diag, entry, &[Short]);
                check_tag_count_exact(diag, entry, 1);
                self.fill_order = stream.tag_value_u32(t)?;
            }
            ifd::StripOffsets => {
                check_tag_type(diag, entry, &[Short, Long]);
                self.uses_strips = true;
                self.read_tile_offsets(stream, entry)?;
            }
            ifd::Orientation => {
                check_tag_type(diag, entry, &[Short]);
                check_tag_count_exact(diag, entry, 1);
                self.orientation_type = t;
                self.orientation_offset = entry.offset;
                self.orientation_big_endian = stream.is_big_endian();
                self.orientation = stream.tag_value_u32(t)?;
            }
            ifd::SamplesPerPixel => {
                check_tag_type(diag, entry, &[Short]);
                check_tag_count_exact(diag, entry, 1);
                self.samples_per_pixel = stream.tag_value_u32(t)?;
            }
            ifd::RowsPerStrip => {
                check_tag_type(diag, entry, &[Short, Long]);
                check_tag_count_exact(diag, entry, 1);
                self.uses_strips = true;
                self.tile_length = stream.tag_value_u32(t)?;
            }
            ifd::StripByteCounts => {
                check_tag_type(diag, entry, &[Short, Long]);
                self.uses_strips = true;
                self.read_tile_byte_counts(stream, entry)?;
            }
            ifd::XResolution => {
                check_tag_type(diag, entry, &[Rational]);
                check_tag_count_exact(diag, entry, 1);
                self.x_resolution = stream.tag_value_f64(t)?;
            }
            ifd::YResolution => {
                check_tag_type(diag, entry, &[Rational]);
                check_tag_count_exact(diag, entry, 1);
                self.y_resolution = stream.tag_value_f64(t)?;
            }
            ifd::PlanarConfiguration => {
                check_tag_type(diag, entry, &[Short]);
                check_tag_count_exact(diag, entry, 1);
                self.planar_configuration = stream.tag_value_u32(t)?;
            }
            ifd::ResolutionUnit => {
                check_tag_type(diag, entry, &[Short]);
                check_tag_count_exact(diag, entry, 1);
                self.resolution_unit = stream.tag_value_u32(t)?;
            }
            ifd::Predictor => {
                check_tag_type(diag, entry, &[Short]);
                check_tag_count_exact(diag, entry, 1);
                self.predictor = stream.tag_value_u32(t)?;
            }
            ifd::TileWidth => {
                check_tag_type(diag, entry, &[Short, Long]);
                check_tag_count_exact(diag, entry, 1);
                self.uses_tiles = true;
                self.tile_width = stream.tag_value_u32(t)?;
            }
            ifd::TileLength => {
                check_tag_type(diag, entry, &[Short, Long]);
                check_tag_count_exact(diag, entry, 1);
                self.uses_tiles = true;
                self.tile_length = stream.tag_value_u32(t)?;
            }
            ifd::TileOffsets => {
                check_tag_type(diag, entry, &[Long]);
                self.uses_tiles = true;
                self.read_tile_offsets(stream, entry)?;
            }
            ifd::TileByteCounts => {
                check_tag_type(diag, entry, &[Short, Long]);
                self.uses_tiles = true;
                self.read_tile_byte_counts(stream, entry)?;
            }
            ifd::SubIFDs => {
                check_tag_type(diag, entry, &[Long, Ifd]);
                self.sub_ifds_count = entry.count;
                self.sub_ifds_offset = entry.offset;
            }
            ifd::ExtraSamples => {
                check_tag_type(diag, entry, &[Short]);
                check_tag_count(diag, entry, 1, self.samples_per_pixel);
                self.extra_samples_count = entry.count;
                let stored = entry.count.min(MAX_SAMPLES_PER_PIXEL as u32) as usize;
                for slot in self.extra_samples.iter_mut().take(stored) {
                    *slot = stream.tag_value_u32(t)?;
                }
            }
            ifd::SampleFormat => {
                check_tag_type(diag, entry, &[Short]);
                check_tag_count_exact(diag, entry, self.samples_per_pixel);
                self.sample_format = read_per_sample(stream, entry, self.sample_format)?;
            }
            ifd::JPEGTables => {
                check_tag_type(diag, entry, &[Undefined]);
                self.jpeg_tables_count = entry.count;
                self.jpeg_tables_offset = entry.offset;
            }
            ifd::JPEGInterchangeFormat => {
                check_tag_type(diag, entry, &[Long]);
                check_tag_count_exact(diag, entry, 1);
                self.jpeg_interchange_format = stream.tag_value_u32(t)?;
            }
            ifd::JPEGInterchangeFormatLength => {
                check_tag_type(diag, entry, &[Long]);
                check_tag_count_exact(diag, entry, 1);
                self.jpeg_interchange_format_length = stream.tag_value_u32(t)?;
            }
            ifd::YCbCrCoefficients => {
                check_tag_type(diag, entry, &[Rational]);
                if !check_tag_count_exact(diag, entry, 3) {
                    return Ok(false);
                }
                for coefficient in self.ycbcr_coefficients.iter_mut() {
                    *coefficient = stream.tag_value_f64(t)?;
                }
            }
            ifd::YCbCrSubSampling => {
                check_tag_type(diag, entry, &[Short]);
                if !check_tag_count_exact(diag, entry, 2) {
                    return Ok(false);
                }
                self.ycbcr_sub_sample_h = stream.tag_value_u32(t)?;
                self.ycbcr_sub_sample_v = stream.tag_value_u32(t)?;
            }
            ifd::YCbCrPositioning => {
                check_tag_type(diag, entry, &[Short]);
                check_tag_count_exact(diag, entry, 1);
                self.ycbcr_positioning = stream.tag_value_u32(t)?;
            }
            ifd::ReferenceBlackWhite => {
                check_tag_type(diag, entry, &[Rational]);
                if !check_tag_count_exact(diag, entry, 6) {
                    return Ok(false);
                }
                for value in self.reference_black_white.iter_mut() {
                    *value = stream.tag_value_f64(t)?;
                }
            }
            ifd::CFARepeatPatternDim => {
                check_cfa(diag, entry, self.photometric_interpretation);
                check_tag_type(diag, entry, &[Short]);
                if !check_tag_count_exact(diag, entry, 2) {
                    return Ok(false);
                }
                self.cfa_repeat_pattern_rows = stream.tag_value_u32(t)?;
                self.cfa_repeat_pattern_cols = stream.tag_value_u32(t)?;
            }
            ifd::CFAPattern => {
                check_cfa(diag, entry, self.photometric_interpretation);
                if !check_tag_type(diag, entry, &[Byte]) {
                    return Ok(false);
                }
                let rows = self.cfa_repeat_pattern_rows;
                let cols = self.cfa_repeat_pattern_cols;
                if !check_tag_count_exact(diag, entry, rows.saturating_mul(cols)) {
                    return Ok(false);
                }
                let max = MAX_CFA_PATTERN as u32;
                if !(1..=max).contains(&rows) || !(1..=max).contains(&cols) {
                    return Ok(false);
                }
                for row in 0..rows as usize {
                    for col in 0..cols as usize {
                        self.cfa_pattern[row][col] = stream.read_u8()?;
                    }
                }
            }
            ifd::CFAPlaneColor => {
                check_cfa(diag, entry, self.photometric_interpretation);
                if !check_tag_type(diag, entry, &[Byte]) {
                    return Ok(false);
                }
                if !check_tag_count(diag, entry, 3, self.cfa_plane_color.len() as u32) {
                    return Ok(false);
                }
                for (j, color) in self.cfa_plane_color.iter_mut().enumerate() {
                    *color = if (j as u32) < entry.count {
                        stream.read_u8()?
                    } else {
                        255
                    };
                }
            }
            ifd::CFALayout => {
                check_cfa(diag, entry, self.photometric_interpretation);
                check_tag_type(diag, entry, &[Short]);
                check_tag_count_exact(diag, entry, 1);
                self.cfa_layout = stream.tag_value_u32(t)?;
            }
            ifd::LinearizationTable => {
                check_raw_ifd(diag, entry, self.photometric_interpretation);
                check_tag_type(diag, entry, &[Short]);
                self.linearization_table = location(entry);
            }
            ifd::BlackLevelRepeatDim => {
                check_raw_ifd(diag, entry, self.photometric_interpretation);
                check_tag_type(diag, entry, &[Short]);
                if !check_tag_count_exact(diag, entry, 2) {
                    return Ok(false);
                }
                self.black_level_repeat_rows = stream.tag_value_u32(t)?;
                self.black_level_repeat_cols = stream.tag_value_u32(t)?;
            }
            ifd::BlackLevel => {
                check_raw_ifd(diag, entry, self.photometric_interpretation);
                check_tag_type(diag, entry, &[Short, Long, Rational]);
                let rows = self.black_level_repeat_rows;
                let cols = self.black_level_repeat_cols;
                let samples = self.samples_per_pixel;
                let expected = rows.saturating_mul(cols).saturating_mul(samples);
                if !check_tag_count_exact(diag, entry, expected) {
                    return Ok(false);
                }
                let max_pattern = MAX_BLACK_PATTERN as u32;
                if !(1..=max_pattern).contains(&rows)
                    || !(1..=max_pattern).contains(&cols)
                    || !(1..=MAX_SAMPLES_PER_PIXEL as u32).contains(&samples)
                {
                    return Ok(false);
                }
                for row in 0..rows as usize {
                    for col in 0..cols as usize {
                        for sample in 0..samples as usize {
                            self.black_level[row][col][sample] = stream.tag_value_f64(t)?;
                        }
                    }
                }
            }
            ifd::BlackLevelDeltaH => {
                check_raw_ifd(diag, entry, self.photometric_interpretation);
                check_tag_type(diag, entry, &[SignedRational]);
                self.black_level_delta_h = location(entry);
            }
            ifd::BlackLevelDeltaV => {
                check_raw_ifd(diag, entry, self.photometric_interpretation);
                check_tag_type(diag, entry, &[SignedRational]);
                self.black_level_delta_v = location(entry);
            }
            ifd::WhiteLevel => {
                check_raw_ifd(diag, entry, self.photometric_interpretation);
                check_tag_type(diag, entry, &[Short, Long]);
                if !check_tag_count_exact(diag, entry, self.samples_per_pixel) {
                    return Ok(false);
                }
                let stored = entry.count.min(MAX_SAMPLES_PER_PIXEL as u32) as usize;
                for level in self.white_level.iter_mut().take(stored) {
                    *level = stream.tag_value_f64(t)?;
                }
            }
            ifd::DefaultScale => {
                check_main_ifd(diag, entry, self.new_sub_file_type);
                check_tag_type(diag, entry, &[Rational]);
                if !check_tag_count_exact(diag, entry, 2) {
                    return Ok(false);
                }
                self.default_scale_h = stream.tag_value_urational(t)?;
                self.default_scale_v = stream.tag_value_urational(t)?;
            }
            ifd::DefaultCropOrigin => {
                check_main_ifd(diag, entry, self.new_sub_file_type);
                check_tag_type(diag, entry, &[Short, Long, Rational]);
                if !check_tag_count_exact(diag, entry, 2) {
                    return Ok(false);
                }
                self.default_crop_origin_h = stream.tag_value_urational(t)?;
                self.default_crop_origin_v = stream.tag_value_urational(t)?;
            }
            ifd::DefaultCropSize => {
                check_main_ifd(diag, entry, self.new_sub_file_type);
                check_tag_type(diag, entry, &[Short, Long, Rational]);
                if !check_tag_count_exact(diag, entry, 2) {
                    return Ok(false);
                }
                self.default_crop_size_h = stream.tag_value_urational(t)?;
                self.default_crop_size_v = stream.tag_value_urational(t)?;
            }
            ifd::BayerGreenSplit => {
                check_cfa(diag, entry, self.photometric_interpretation);
                check_tag_type(diag, entry, &[Long]);
                check_tag_count_exact(diag, entry, 1);
                self.bayer_green_split = stream.tag_value_u32(t)?;
            }
            ifd::ChromaBlurRadius => {
                self.chroma_blur_radius = self.read_main_rational(stream, entry, diag)?;
            }
            ifd::AntiAliasStrength => {
                self.anti_alias_strength = self.read_main_rational(stream, entry, diag)?;
            }
            ifd::BestQualityScale => {
                self.best_quality_scale = self.read_main_rational(stream, entry, diag)?;
            }
            ifd::ActiveArea => {
                check_main_ifd(diag, entry, self.new_sub_file_type);
                check_tag_type(diag, entry, &[Short, Long]);
                if !check_tag_count_exact(diag, entry, 4) {
                    return Ok(false);
                }
                self.active_area = read_rect(stream, t)?;
            }
            ifd::MaskedAreas => {
                check_main_ifd(diag, entry, self.new_sub_file_type);
                check_tag_type(diag, entry, &[Short, Long]);
                let rect_count = entry.count / 4;
                if !check_tag_count_exact(diag, entry, rect_count * 4) {
                    return Ok(false);
                }
                self.masked_area_count = rect_count.min(MAX_MASKED_AREAS as u32);
                for j in 0..self.masked_area_count as usize {
                    self.masked_areas[j] = read_rect(stream, t)?;
                }
            }
            ifd::PreviewApplicationName => {
                check_tag_type(diag, entry, &[Ascii, Byte]);
                self.preview_info.application_name =
                    parse_string_tag(stream, diag, entry, false, false)?;
            }
            ifd::PreviewApplicationVersion => {
                check_tag_type(diag, entry, &[Ascii, Byte]);
                self.preview_info.application_version =
                    parse_string_tag(stream, diag, entry, false, false)?;
            }
            ifd::PreviewSettingsName => {
                check_tag_type(diag, entry, &[Ascii, Byte]);
                self.preview_info.settings_name =
                    parse_string_tag(stream, diag, entry, false, false)?;
            }
            ifd::PreviewSettingsDigest => {
                if !check_tag_type(diag, entry, &[Byte]) {
                    return Ok(false);
                }
                if !check_tag_count_exact(diag, entry, 16) {
                    return Ok(false);
                }
                let bytes = stream.read_bytes(16)?;
                self.preview_info.settings_digest.0.copy_from_slice(&bytes);
            }
            ifd::PreviewColorSpace => {
                check_tag_type(diag, entry, &[Long]);
                check_tag_count_exact(diag, entry, 1);
                self.preview_info.color_space = Some(stream.tag_value_u32(t)?);
            }
            ifd::PreviewDateTime => {
                check_tag_type(diag, entry, &[Ascii]);
                self.preview_info.date_time = parse_string_tag(stream, diag, entry, false, false)?;
            }
            ifd::RowInterleaveFactor => {
                check_tag_type(diag, entry, &[Short, Long]);
                if !check_tag_count_exact(diag, entry, 1) {
                    return Ok(false);
                }
                self.row_interleave_factor = stream.tag_value_u32(t)?;
            }
            ifd::SubTileBlockSize => {
                check_tag_type(diag, entry, &[Short, Long]);
                if !check_tag_count_exact(diag, entry, 2) {
                    return Ok(false);
                }
                self.sub_tile_block_rows = stream.tag_value_u32(t)?;
                self.sub_tile_block_cols = stream.tag_value_u32(t)?;
            }
            ifd::OpcodeList1 => {
                check_main_ifd(diag, entry, self.new_sub_file_type);
                check_tag_type(diag, entry, &[Undefined]);
                self.opcode_list_1 = location(entry);
            }
            ifd::OpcodeList2 => {
                check_main_ifd(diag, entry, self.new_sub_file_type);
                check_tag_type(diag, entry, &[Undefined]);
                self.opcode_list_2 = location(entry);
            }
            ifd::OpcodeList3 => {
                check_main_ifd(diag, entry, self.new_sub_file_type);
                check_tag_type(diag, entry, &[Undefined]);
                self.opcode_list_3 = location(entry);
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn read_tile_offsets<R: Read>(
        &mut self,
        stream: &mut ByteOrderReader<R>,
        entry: &TagEntry,
    ) -> Result<(), IfdError> {
        self.tile_offsets_location = location(entry);
        read_tile_cache(stream, entry, &mut self.tile_offset)
    }

    fn read_tile_byte_counts<R: Read>(
        &mut self,
        stream: &mut ByteOrderReader<R>,
        entry: &TagEntry,
    ) -> Result<(), IfdError> {
        self.tile_byte_counts_location = location(entry);
        read_tile_cache(stream, entry, &mut self.tile_byte_count)
    }

    fn read_main_rational<R: Read>(
        &self,
        stream: &mut ByteOrderReader<R>,
        entry: &TagEntry,
        diag: &dyn Diagnostics,
    ) -> Result<URational, IfdError> {
        check_main_ifd(diag, entry, self.new_sub_file_type);
        check_tag_type(diag, entry, &[Rational]);
        check_tag_count_exact(diag, entry, 1);
        Ok(stream.tag_value_urational(entry.tag_type)?)
    }

    /// Fills in the defaults that depend on other tags and drops inconsistent masked areas.
    ///
    /// Must be called once all entries of the directory are parsed. Calling it again does not
    /// change the directory any further.
    pub fn post_parse(&mut self, diag: &dyn Diagnostics) {
        if self.samples_per_pixel == 1 {
            self.planar_configuration = PlanarConfiguration::Interleaved.into();
        }

        if self.tile_width == 0 {
            self.tile_width = self.image_width;
        }
        if self.tile_length == 0 {
            self.tile_length = self.image_length;
        }

        let image_area = self.image_area();
        if self.active_area.is_zero() {
            self.active_area = image_area;
        }

        if self.default_crop_size_h.is_unset() {
            self.default_crop_size_h = URational::new(self.active_area.width(), 1);
        }
        if self.default_crop_size_v.is_unset() {
            self.default_crop_size_v = URational::new(self.active_area.height(), 1);
        }

        let default_white = self.default_white_level();
        for level in self.white_level.iter_mut() {
            if *level < 0.0 {
                *level = default_white;
            }
        }

        let strength = self.anti_alias_strength.as_f64();
        if !(0.0..=1.0).contains(&strength) {
            diag.warning("Invalid AntiAliasStrength");
            self.anti_alias_strength = URational::new(1, 1);
        }

        if let Some(problem) = self.masked_area_problem(&image_area) {
            diag.warning(problem);
            self.masked_area_count = 0;
        }
    }

    fn masked_area_problem(&self, image_area: &Rect) -> Option<&'static str> {
        let areas = self.masked_areas();
        for (j, area) in areas.iter().enumerate() {
            if area.is_empty() || !image_area.contains(area) {
                return Some("Invalid MaskedArea");
            }
            if area.overlaps(&self.active_area) {
                return Some("MaskedArea overlaps ActiveArea");
            }
            if areas[..j].iter().any(|other| area.overlaps(other)) {
                return Some("MaskedAreas overlap each other");
            }
        }
        None
    }
}

/// Reads one value per sample. Only the first few are kept; the rest must repeat the last
/// kept value.
fn read_per_sample<R: Read>(
    stream: &mut ByteOrderReader<R>,
    entry: &TagEntry,
    mut values: [u32; MAX_SAMPLES_PER_PIXEL],
) -> Result<[u32; MAX_SAMPLES_PER_PIXEL], IfdError> {
    let mut extras_match = true;
    for j in 0..entry.count.min(MAX_SAMPLE_VALUES) as usize {
        let value = stream.tag_value_u32(entry.tag_type)?;
        if j < MAX_SAMPLES_PER_PIXEL {
            values[j] = value;
        } else if value != values[MAX_SAMPLES_PER_PIXEL - 1] {
            extras_match = false;
        }
    }
    if !extras_match {
        return Err(IfdError::NotConstant {
            tag: entry.describe(),
        });
    }
    Ok(values)
}

fn location(entry: &TagEntry) -> ValueLocation {
    ValueLocation {
        tag_type: entry.tag_type,
        count: entry.count,
        offset: entry.offset,
    }
}

fn read_tile_cache<R: Read>(
    stream: &mut ByteOrderReader<R>,
    entry: &TagEntry,
    cache: &mut [u32; MAX_TILE_INFO],
) -> Result<(), IfdError> {
    if entry.count as usize <= MAX_TILE_INFO {
        for slot in cache.iter_mut().take(entry.count as usize) {
            *slot = stream.tag_value_u32(entry.tag_type)?;
        }
    }
    Ok(())
}

fn read_rect<R: Read>(stream: &mut ByteOrderReader<R>, tag_type: u16) -> Result<Rect, IfdError> {
    let t = stream.tag_value_i32(tag_type)?;
    let l = stream.tag_value_i32(tag_type)?;
    let b = stream.tag_value_i32(tag_type)?;
    let r = stream.tag_value_i32(tag_type)?;
    Ok(Rect::new(t, l, b, r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_order_rw::ByteOrderWriter;
    use crate::diagnostics::{CollectingDiagnostics, NullDiagnostics};
    use crate::tags::PhotometricInterpretation;
    use std::io::Cursor;

    fn stream(
        little_endian: bool,
        f: impl FnOnce(&mut ByteOrderWriter<Vec<u8>>),
    ) -> ByteOrderReader<Cursor<Vec<u8>>> {
        let mut writer = ByteOrderWriter::new(Vec::new(), little_endian);
        f(&mut writer);
        ByteOrderReader::new(Cursor::new(writer.into_inner()), little_endian)
    }

    fn shorts(values: &[u16]) -> ByteOrderReader<Cursor<Vec<u8>>> {
        stream(true, |w| {
            for v in values {
                w.write_u16(*v).unwrap();
            }
        })
    }

    fn entry(code: u32, tag_type: IfdValueType, count: u32) -> TagEntry {
        TagEntry::new(0, code, tag_type.into(), count, 0)
    }

    fn parse(ifd: &mut DngIfd, code: u32, tag_type: IfdValueType, values: &[u16]) -> bool {
        let e = entry(code, tag_type, values.len() as u32);
        ifd.parse_tag(&mut shorts(values), &e, &NullDiagnostics).unwrap()
    }

    #[test]
    fn unknown_tags_are_not_handled() {
        let mut ifd = DngIfd::new();
        assert!(!parse(&mut ifd, 1234, Short, &[1]));
        assert_eq!(ifd, DngIfd::new());
    }

    #[test]
    fn new_sub_file_type_sets_primary_preview() {
        let mut ifd = DngIfd::new();
        let e = entry(ifd::NewSubFileType, Long, 1);
        let mut s = stream(false, |w| w.write_u32(1).unwrap());
        assert!(ifd.parse_tag(&mut s, &e, &NullDiagnostics).unwrap());
        assert!(ifd.uses_new_sub_file_type);
        assert!(ifd.preview_info.is_primary);

        let mut s = stream(false, |w| w.write_u32(0x10001).unwrap());
        ifd.parse_tag(&mut s, &e, &NullDiagnostics).unwrap();
        assert!(!ifd.preview_info.is_primary);
        assert_eq!(ifd.sub_file_type(), Some(SubFileType::AltPreviewImage));
    }

    #[test]
    fn zero_compression_means_uncompressed() {
        let diag = CollectingDiagnostics::new();
        let mut ifd = DngIfd::new();
        let e = entry(ifd::Compression, Short, 1);
        assert!(ifd.parse_tag(&mut shorts(&[0]), &e, &diag).unwrap());
        assert_eq!(ifd.compression, 1);
        assert_eq!(
            diag.warnings(),
            vec!["IFD 0 has invalid zero compression code".to_string()]
        );
    }

    #[test]
    fn bits_per_sample_extras_must_repeat() {
        let mut ifd = DngIfd::new();
        assert!(parse(&mut ifd, ifd::BitsPerSample, Short, &[12, 12, 12, 12, 12, 12]));
        assert_eq!(ifd.bits_per_sample, [12; 4]);

        let e = entry(ifd::BitsPerSample, Short, 5);
        let result = ifd.parse_tag(&mut shorts(&[8, 8, 8, 8, 16]), &e, &NullDiagnostics);
        assert!(matches!(result, Err(IfdError::NotConstant { .. })));
    }

    #[test]
    fn wrong_types_still_parse() {
        let diag = CollectingDiagnostics::new();
        let mut ifd = DngIfd::new();
        // ImageWidth as Long is allowed, as Byte it is a warning but still read
        let e = entry(ifd::ImageWidth, Byte, 1);
        let mut s = stream(true, |w| w.write_u8(77).unwrap());
        assert!(ifd.parse_tag(&mut s, &e, &diag).unwrap());
        assert_eq!(ifd.image_width, 77);
        assert_eq!(diag.warnings().len(), 1);
    }

    #[test]
    fn strip_offsets_are_cached() {
        let mut ifd = DngIfd::new();
        assert!(parse(&mut ifd, ifd::StripOffsets, Short, &[10, 20, 30]));
        assert!(ifd.uses_strips);
        assert_eq!(&ifd.tile_offset[..3], &[10, 20, 30]);
        assert_eq!(ifd.tile_offsets_location.count, 3);

        let many: Vec<u16> = (0..40).collect();
        let mut ifd = DngIfd::new();
        assert!(parse(&mut ifd, ifd::TileByteCounts, Short, &many));
        assert!(ifd.uses_tiles);
        assert_eq!(ifd.tile_byte_count, [0; MAX_TILE_INFO]);
        assert_eq!(ifd.tile_byte_counts_location.count, 40);
    }

    #[test]
    fn orientation_remembers_where_it_was_read() {
        let mut ifd = DngIfd::new();
        let e = TagEntry::new(0, ifd::Orientation, 3, 1, 66);
        let mut s = stream(false, |w| w.write_u16(6).unwrap());
        ifd.parse_tag(&mut s, &e, &NullDiagnostics).unwrap();
        assert_eq!(ifd.orientation, 6);
        assert_eq!(ifd.orientation_offset, 66);
        assert!(ifd.orientation_big_endian);
        assert_eq!(ifd.orientation_type, 3);
    }

    #[test]
    fn cfa_tags() {
        let mut ifd = DngIfd::new();
        ifd.photometric_interpretation = PhotometricInterpretation::Cfa.into();
        // pattern before its dimensions is rejected
        let e = entry(ifd::CFAPattern, Byte, 4);
        let mut s = stream(true, |w| w.write_bytes(&[0, 1, 1, 2]).unwrap());
        assert!(!ifd.parse_tag(&mut s, &e, &NullDiagnostics).unwrap());

        assert!(parse(&mut ifd, ifd::CFARepeatPatternDim, Short, &[2, 2]));
        let mut s = stream(true, |w| w.write_bytes(&[0, 1, 1, 2]).unwrap());
        assert!(ifd.parse_tag(&mut s, &e, &NullDiagnostics).unwrap());
        assert_eq!(&ifd.cfa_pattern[0][..2], &[0, 1]);
        assert_eq!(&ifd.cfa_pattern[1][..2], &[1, 2]);

        let e = entry(ifd::CFAPlaneColor, Byte, 3);
        let mut s = stream(true, |w| w.write_bytes(&[2, 1, 0]).unwrap());
        assert!(ifd.parse_tag(&mut s, &e, &NullDiagnostics).unwrap());
        assert_eq!(ifd.cfa_plane_color, [2, 1, 0, 255]);

        let e = entry(ifd::CFAPlaneColor, Short, 3);
        assert!(!ifd.parse_tag(&mut shorts(&[0, 1, 2]), &e, &NullDiagnostics).unwrap());
    }

    #[test]
    fn cfa_dimensions_beyond_capacity_are_rejected() {
        let mut ifd = DngIfd::new();
        ifd.photometric_interpretation = PhotometricInterpretation::Cfa.into();
        assert!(parse(&mut ifd, ifd::CFARepeatPatternDim, Short, &[9, 1]));
        let e = entry(ifd::CFAPattern, Byte, 9);
        let mut s = stream(true, |w| w.write_bytes(&[0; 9]).unwrap());
        assert!(!ifd.parse_tag(&mut s, &e, &NullDiagnostics).unwrap());
        assert_eq!(ifd.cfa_pattern[0][0], 255);
    }

    #[test]
    fn guards_only_warn() {
        let diag = CollectingDiagnostics::new();
        let mut ifd = DngIfd::new();
        ifd.photometric_interpretation = PhotometricInterpretation::Rgb.into();
        let e = entry(ifd::WhiteLevel, Short, 1);
        assert!(ifd.parse_tag(&mut shorts(&[4000]), &e, &diag).unwrap());
        assert_eq!(ifd.white_level[0], 4000.0);
        assert_eq!(
            diag.warnings(),
            vec![
                "IFD 0 WhiteLevel is not allowed in IFDs with a non-raw PhotometricInterpretation"
                    .to_string()
            ]
        );
    }

    #[test]
    fn black_levels() {
        let mut ifd = DngIfd::new();
        ifd.photometric_interpretation = PhotometricInterpretation::Cfa.into();
        assert!(parse(&mut ifd, ifd::BlackLevelRepeatDim, Short, &[2, 2]));
        assert!(!parse(&mut ifd, ifd::BlackLevel, Short, &[64, 65, 66]));
        assert!(parse(&mut ifd, ifd::BlackLevel, Short, &[64, 65, 66, 67]));
        assert_eq!(ifd.black_level[1][0][0], 66.0);

        assert!(parse(&mut ifd, ifd::BlackLevelRepeatDim, Short, &[9, 1]));
        let values = [0u16; 9];
        assert!(!parse(&mut ifd, ifd::BlackLevel, Short, &values));
    }

    #[test]
    fn crop_and_areas() {
        let mut ifd = DngIfd::new();
        assert!(parse(&mut ifd, ifd::DefaultCropOrigin, Short, &[8, 6]));
        assert_eq!(ifd.default_crop_origin_h, URational::new(8, 1));
        assert!(!parse(&mut ifd, ifd::DefaultCropSize, Short, &[8]));
        assert!(parse(&mut ifd, ifd::ActiveArea, Short, &[2, 4, 100, 200]));
        assert_eq!(ifd.active_area, Rect::new(2, 4, 100, 200));
        assert!(!parse(&mut ifd, ifd::MaskedAreas, Short, &[0, 0, 2]));
        let areas: Vec<u16> = [0u16, 0, 2, 200].repeat(5);
        assert!(parse(&mut ifd, ifd::MaskedAreas, Short, &areas));
        assert_eq!(ifd.masked_area_count, 4);
    }

    #[test]
    fn preview_info() {
        let mut ifd = DngIfd::new();
        let e = entry(ifd::PreviewApplicationName, Ascii, 5);
        let mut s = stream(true, |w| w.write_bytes(b"Tool\0").unwrap());
        assert!(ifd.parse_tag(&mut s, &e, &NullDiagnostics).unwrap());
        assert_eq!(ifd.preview_info.application_name, "Tool");

        let e = entry(ifd::PreviewSettingsDigest, Byte, 16);
        let mut s = stream(true, |w| w.write_bytes(&[0xAB; 16]).unwrap());
        assert!(ifd.parse_tag(&mut s, &e, &NullDiagnostics).unwrap());
        assert_eq!(ifd.preview_info.settings_digest.to_string(), "AB".repeat(16));

        let e = entry(ifd::PreviewSettingsDigest, Byte, 15);
        let mut s = stream(true, |w| w.write_bytes(&[0; 15]).unwrap());
        assert!(!ifd.parse_tag(&mut s, &e, &NullDiagnostics).unwrap());
    }

    #[test]
    fn malformed_entries_never_fail() {
        let data = vec![0u8; 4096];
        let codes = [
            254, 256, 257, 258, 259, 262, 266, 273, 274, 277, 278, 279, 282, 283, 284, 296, 317,
            322, 323, 324, 325, 330, 338, 339, 347, 513, 514, 529, 530, 531, 532, 33421, 33422,
            50710, 50711, 50712, 50713, 50714, 50715, 50716, 50717, 50718, 50719, 50720, 50733,
            50737, 50738, 50780, 50829, 50830, 50966, 50967, 50968, 50969, 50970, 50971, 50974,
            50975, 51008, 51009, 51022,
        ];
        for code in codes {
            for tag_type in [0u16, 1, 2, 3, 4, 5, 10, 12, 99] {
                for count in [0u32, 1, 2, 3, 7] {
                    let mut ifd = DngIfd::new();
                    let mut s = ByteOrderReader::new(Cursor::new(data.clone()), true);
                    let e = TagEntry::new(0, code, tag_type, count, 0);
                    assert!(ifd.parse_tag(&mut s, &e, &NullDiagnostics).is_ok());
                }
            }
        }
    }

    #[test]
    fn post_parse_defaults() {
        let mut ifd = DngIfd::new();
        ifd.image_width = 100;
        ifd.image_length = 100;
        ifd.bits_per_sample[0] = 12;
        ifd.post_parse(&NullDiagnostics);
        assert_eq!((ifd.tile_width, ifd.tile_length), (100, 100));
        assert_eq!(ifd.active_area, Rect::new(0, 0, 100, 100));
        assert_eq!(ifd.default_crop_size_h, URational::new(100, 1));
        assert_eq!(ifd.default_crop_size_v, URational::new(100, 1));
        assert_eq!(ifd.white_level, [4095.0; 4]);

        let once = ifd.clone();
        ifd.post_parse(&NullDiagnostics);
        assert_eq!(ifd, once);
    }

    #[test]
    fn post_parse_forces_interleaved_single_sample() {
        let mut ifd = DngIfd::new();
        ifd.planar_configuration = PlanarConfiguration::Planar.into();
        ifd.post_parse(&NullDiagnostics);
        assert_eq!(ifd.planar(), Some(PlanarConfiguration::Interleaved));
    }

    #[test]
    fn post_parse_repairs_anti_alias_strength() {
        let diag = CollectingDiagnostics::new();
        let mut ifd = DngIfd::new();
        ifd.anti_alias_strength = URational::new(3, 2);
        ifd.post_parse(&diag);
        assert_eq!(ifd.anti_alias_strength, URational::new(1, 1));
        assert_eq!(diag.warnings(), vec!["Invalid AntiAliasStrength".to_string()]);
    }

    #[test]
    fn overlapping_masked_areas_are_dropped() {
        let diag = CollectingDiagnostics::new();
        let mut ifd = DngIfd::new();
        ifd.image_width = 120;
        ifd.image_length = 100;
        ifd.active_area = Rect::new(0, 20, 100, 120);
        ifd.masked_area_count = 2;
        ifd.masked_areas[0] = Rect::new(0, 0, 60, 10);
        ifd.masked_areas[1] = Rect::new(50, 0, 100, 10);
        ifd.post_parse(&diag);
        assert_eq!(ifd.masked_area_count, 0);
        assert_eq!(diag.warnings(), vec!["MaskedAreas overlap each other".to_string()]);
    }

    #[test]
    fn masked_areas_outside_or_on_the_active_area_are_dropped() {
        for (area, message) in [
            (Rect::new(0, 0, 101, 10), "Invalid MaskedArea"),
            (Rect::new(0, 0, 0, 10), "Invalid MaskedArea"),
            (Rect::new(0, 0, 100, 21), "MaskedArea overlaps ActiveArea"),
        ] {
            let diag = CollectingDiagnostics::new();
            let mut ifd = DngIfd::new();
            ifd.image_width = 120;
            ifd.image_length = 100;
            ifd.active_area = Rect::new(0, 20, 100, 120);
            ifd.masked_area_count = 1;
            ifd.masked_areas[0] = area;
            ifd.post_parse(&diag);
            assert_eq!(ifd.masked_area_count, 0);
            assert_eq!(diag.warnings(), vec![message.to_string()]);
        }

        let mut ifd = DngIfd::new();
        ifd.image_width = 120;
        ifd.image_length = 100;
        ifd.active_area = Rect::new(0, 20, 100, 120);
        ifd.masked_area_count = 1;
        ifd.masked_areas[0] = Rect::new(0, 0, 100, 20);
        ifd.post_parse(&NullDiagnostics);
        assert_eq!(ifd.masked_area_count, 1);
    }
}
