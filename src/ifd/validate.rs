use super::{DngIfd, MAX_BLACK_PATTERN, MAX_CFA_PATTERN, MAX_IMAGE_SIDE, MAX_SAMPLES_PER_PIXEL};
use crate::diagnostics::{parent_name, Diagnostics};
use crate::shared::{SharedContext, MAX_COLOR_PLANES};
use crate::tags::{
    dng_version, CfaLayout, Compression, IfdValueType, PhotometricInterpretation,
    PlanarConfiguration, Predictor, SampleFormat, SubFileType,
};

/// Crop origins closer than this to an edge of a CFA image leave too little room for demosaicing.
const MIN_CFA_PADDING: f64 = 1.9;

fn fail(diag: &dyn Diagnostics, parent_code: u32, message: &str) -> bool {
    diag.error(&format!("{message} ({})", parent_name(parent_code)));
    false
}

impl DngIfd {
    /// Checks the CFA description against the color planes of the camera.
    pub fn is_valid_cfa(
        &self,
        shared: &SharedContext,
        parent_code: u32,
        diag: &dyn Diagnostics,
    ) -> bool {
        let max = MAX_CFA_PATTERN as u32;
        let rows = self.cfa_repeat_pattern_rows;
        let cols = self.cfa_repeat_pattern_cols;
        if !(1..=max).contains(&rows) || !(1..=max).contains(&cols) {
            return fail(diag, parent_code, "Missing or invalid CFAPatternRepeatDim");
        }

        let planes = shared.color_planes.min(MAX_COLOR_PLANES) as usize;
        let plane_colors = &self.cfa_plane_color[..planes];
        let mut count = [0u32; MAX_COLOR_PLANES as usize];
        for row in &self.cfa_pattern[..rows as usize] {
            for color in &row[..cols as usize] {
                match plane_colors.iter().position(|c| c == color) {
                    Some(n) => count[n] += 1,
                    None => {
                        return fail(
                            diag,
                            parent_code,
                            "CFAPattern contains colors not included in the CFAPlaneColor tag",
                        )
                    }
                }
            }
        }
        if count[..planes].contains(&0) {
            return fail(
                diag,
                parent_code,
                "CFAPattern does not contain all the colors in the CFAPlaneColor tag",
            );
        }

        if CfaLayout::try_from(self.cfa_layout).is_err() {
            return fail(diag, parent_code, "Invalid CFALayout");
        }
        true
    }

    /// Checks that this directory conforms to the DNG format.
    ///
    /// Expects [DngIfd::post_parse] to have run. Stops at the first problem, which is reported
    /// to `diag` as an error.
    pub fn is_valid_dng(
        &self,
        shared: &SharedContext,
        parent_code: u32,
        diag: &dyn Diagnostics,
    ) -> bool {
        let image_area = self.image_area();
        let is_monochrome = shared.color_planes == 1;
        let is_color = !is_monochrome;
        let is_main_ifd = self.is_main_ifd();
        let photometric = self.photometric();

        if !self.uses_new_sub_file_type {
            return fail(diag, parent_code, "Missing NewSubFileType");
        }
        if self.sub_file_type().is_none() {
            return fail(diag, parent_code, "Unexpected NewSubFileType");
        }

        if self.image_width < 1 {
            return fail(diag, parent_code, "Missing or invalid ImageWidth");
        }
        if self.image_length < 1 {
            return fail(diag, parent_code, "Missing or invalid ImageLength");
        }
        if self.image_width > MAX_IMAGE_SIDE || self.image_length > MAX_IMAGE_SIDE {
            return fail(diag, parent_code, "Image size is larger than supported");
        }

        use PhotometricInterpretation::{BlackIsZero, Cfa, LinearRaw, Rgb, YCbCr};
        match photometric {
            Some(BlackIsZero | Rgb | YCbCr) if is_main_ifd => {
                return fail(
                    diag,
                    parent_code,
                    "PhotometricInterpretation requires NewSubFileType = 1",
                )
            }
            Some(Cfa) if !is_main_ifd => {
                return fail(
                    diag,
                    parent_code,
                    "PhotometricInterpretation requires NewSubFileType = 0",
                )
            }
            Some(BlackIsZero | Rgb | YCbCr | Cfa | LinearRaw) => {}
            _ => return fail(diag, parent_code, "Missing or invalid PhotometricInterpretation"),
        }
        match photometric {
            // grayscale previews of color images are fine, only the main image is restricted
            Some(BlackIsZero) if is_color && is_main_ifd => {
                return fail(
                    diag,
                    parent_code,
                    "PhotometricInterpretation forbids use of ColorMatrix1 tag",
                )
            }
            Some(Cfa) if is_monochrome => {
                return fail(
                    diag,
                    parent_code,
                    "PhotometricInterpretation requires use of ColorMatrix1 tag",
                )
            }
            _ => {}
        }

        let (min_samples, max_samples, max_bits) = match photometric {
            Some(Rgb | YCbCr) => (3, 3, 16),
            Some(Cfa) => (1, MAX_SAMPLES_PER_PIXEL as u32, 32),
            Some(LinearRaw) => (shared.color_planes, shared.color_planes, 32),
            _ => (1, 1, 16),
        };
        let min_bits = 8;
        if !(min_samples..=max_samples).contains(&self.samples_per_pixel) {
            return fail(diag, parent_code, "Missing or invalid SamplesPerPixel");
        }
        for (j, &bits) in self.bits_per_sample.iter().enumerate() {
            if j as u32 >= self.samples_per_pixel {
                if bits != 0 {
                    return fail(diag, parent_code, "Too many values specified in BitsPerSample");
                }
                continue;
            }
            if !(min_bits..=max_bits).contains(&bits) {
                return fail(diag, parent_code, "Missing or invalid BitsPerSample");
            }
            if max_bits == 16 && bits != 8 && bits != 16 {
                return fail(
                    diag,
                    parent_code,
                    "Rendered previews require 8 or 16 bits per sample",
                );
            }
            if bits != self.bits_per_sample[0] {
                return fail(diag, parent_code, "BitsPerSample not equal for all samples");
            }
        }

        match self.compression_kind() {
            Some(Compression::Uncompressed) => {}
            Some(Compression::Jpeg) => {
                if photometric == Some(Rgb) {
                    return fail(
                        diag,
                        parent_code,
                        "JPEG previews should use PhotometricInterpretation = YCbYb",
                    );
                }
                if self.bits_per_sample[0] > 16 {
                    return fail(
                        diag,
                        parent_code,
                        "JPEG compression is limited to 16 bits/sample",
                    );
                }
            }
            _ => return fail(diag, parent_code, "Unsupported Compression"),
        }

        if self.predictor != u32::from(Predictor::NullPredictor) {
            return fail(diag, parent_code, "Unsupported Predictor");
        }
        if self.fill_order != 1 {
            return fail(diag, parent_code, "Unsupported FillOrder");
        }
        if self.planar_configuration != u32::from(PlanarConfiguration::Interleaved) {
            return fail(diag, parent_code, "Unsupported PlanarConfiguration");
        }
        if self.extra_samples_count != 0 {
            return fail(diag, parent_code, "Unsupported ExtraSamples");
        }
        let samples = (self.samples_per_pixel as usize).min(MAX_SAMPLES_PER_PIXEL);
        if self.sample_format[..samples]
            .iter()
            .any(|format| *format != u32::from(SampleFormat::UnsignedInteger))
        {
            return fail(diag, parent_code, "Unsupported SampleFormat");
        }

        if self.orientation > 9 {
            return fail(diag, parent_code, "Unknown Orientation");
        }
        if self.orientation != 0 && parent_code != 0 {
            diag.warning(&format!("Unexpected Orientation tag ({})", parent_name(parent_code)));
        }
        if self.orientation == 0 && parent_code == 0 {
            diag.warning(&format!("Missing Orientation tag ({})", parent_name(parent_code)));
        }

        if !self.uses_strips && !self.uses_tiles {
            return fail(diag, parent_code, "IFD uses neither strips nor tiles");
        }
        if self.uses_strips && self.uses_tiles {
            return fail(diag, parent_code, "IFD uses both strips and tiles");
        }
        let tile_count = self.tiles_across() as u64 * self.tiles_down() as u64;
        if self.tile_offsets_location.count as u64 != tile_count {
            return fail(diag, parent_code, "Missing or invalid Strip/TileOffsets");
        }
        if self.tile_byte_counts_location.count as u64 != tile_count {
            return fail(diag, parent_code, "Missing or invalid Strip/TileByteCounts");
        }

        if photometric == Some(Cfa) && !self.is_valid_cfa(shared, parent_code, diag) {
            return false;
        }

        let active = self.active_area;
        if active.intersection(&image_area) != active || active.is_empty() {
            return fail(diag, parent_code, "Invalid ActiveArea");
        }
        if active != image_area && shared.dng_backward_version < dng_version::V1_1_0_0 {
            return fail(
                diag,
                parent_code,
                "Non-default ActiveArea tag not allowed in this DNG version",
            );
        }

        let linearization = &self.linearization_table;
        if linearization.is_present() {
            if linearization.tag_type != u16::from(IfdValueType::Short) {
                return fail(diag, parent_code, "Invalidate LinearizationTable type");
            }
            if !(2..=65536).contains(&linearization.count) {
                return fail(diag, parent_code, "Invalidate LinearizationTable count");
            }
        }

        let max_pattern = MAX_BLACK_PATTERN as u32;
        if !(1..=max_pattern).contains(&self.black_level_repeat_rows)
            || !(1..=max_pattern).contains(&self.black_level_repeat_cols)
        {
            return fail(diag, parent_code, "Invalid BlackLevelRepeatDim");
        }
        let delta_h = self.black_level_delta_h.count;
        if delta_h != 0 && delta_h != active.width() {
            return fail(diag, parent_code, "Invalid BlackLevelDeltaH count");
        }
        let delta_v = self.black_level_delta_v.count;
        if delta_v != 0 && delta_v != active.height() {
            return fail(diag, parent_code, "Invalid BlackLevelDeltaV count");
        }

        let max_white = if linearization.is_present() {
            65535.0
        } else {
            self.default_white_level()
        };
        if self.white_level[..samples]
            .iter()
            .any(|white| !(1.0..=max_white).contains(white))
        {
            return fail(diag, parent_code, "Invalid WhiteLevel");
        }

        if self.default_scale_h.as_f64() <= 0.0 || self.default_scale_v.as_f64() <= 0.0 {
            diag.error("Invalid DefaultScale");
            return false;
        }
        if self.best_quality_scale.as_f64() < 1.0 {
            diag.error("Invalid BestQualityScale");
            return false;
        }

        let active_w = active.width() as f64;
        let active_h = active.height() as f64;
        let origin_h = self.default_crop_origin_h.as_f64();
        let origin_v = self.default_crop_origin_v.as_f64();
        let size_h = self.default_crop_size_h.as_f64();
        let size_v = self.default_crop_size_v.as_f64();
        if origin_h < 0.0 || origin_v < 0.0 || origin_h >= active_w || origin_v >= active_h {
            diag.error("Invalid DefaultCropOrigin");
            return false;
        }
        if size_h <= 0.0 || size_v <= 0.0 || size_h > active_w || size_v > active_h {
            diag.error("Invalid DefaultCropSize");
            return false;
        }
        if origin_h + size_h > active_w || origin_v + size_v > active_h {
            diag.error("Default crop extends outside ActiveArea");
            return false;
        }

        if photometric == Some(Cfa) {
            let too_little_padding = [
                ("left", origin_h < MIN_CFA_PADDING),
                ("top", origin_v < MIN_CFA_PADDING),
                ("right", origin_h + size_h > active_w - MIN_CFA_PADDING),
                ("bottom", origin_v + size_v > active_h - MIN_CFA_PADDING),
            ];
            for (edge, _) in too_little_padding.iter().filter(|(_, short)| *short) {
                diag.warning(&format!(
                    "Too little padding on {edge} edge of CFA image (possible interpolation artifacts)"
                ));
            }
        }

        if self.row_interleave_factor != 1 {
            if !(1..=self.image_length).contains(&self.row_interleave_factor) {
                return fail(diag, parent_code, "RowInterleaveFactor out of valid range");
            }
            if shared.dng_backward_version < dng_version::V1_2_0_0 {
                return fail(
                    diag,
                    parent_code,
                    "Non-default RowInterleaveFactor tag not allowed in this DNG version",
                );
            }
        }

        let block_rows = self.sub_tile_block_rows;
        let block_cols = self.sub_tile_block_cols;
        if block_rows != 1 || block_cols != 1 {
            if !(2..=self.tile_length).contains(&block_rows)
                || !(1..=self.tile_width).contains(&block_cols)
            {
                return fail(diag, parent_code, "SubTileBlockSize out of valid range");
            }
            if self.tile_length % block_rows != 0 || self.tile_width % block_cols != 0 {
                return fail(
                    diag,
                    parent_code,
                    "TileSize not exact multiple of SubTileBlockSize",
                );
            }
            if shared.dng_backward_version < dng_version::V1_2_0_0 {
                return fail(
                    diag,
                    parent_code,
                    "Non-default SubTileBlockSize tag not allowed in this DNG version",
                );
            }
        }

        true
    }

    /// Whether this directory holds a preview of the main image.
    pub fn is_preview(&self) -> bool {
        self.sub_file_type() == Some(SubFileType::PreviewImage)
            || self.sub_file_type() == Some(SubFileType::AltPreviewImage)
    }
}
