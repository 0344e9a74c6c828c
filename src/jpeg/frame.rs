/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use log::debug;

use crate::consts::{
    DCTSIZE, JPEG_MAX_DIMENSION, MAX_COMPONENTS, MAX_SAMP_FACTOR, NUM_HUFF_TBLS, NUM_QUANT_TBLS,
};
use crate::enabled_features::EnabledFeatures;
use crate::engine_error::{err_exit_code, ExitCode, Result};
use crate::helpers::div_round_up;
use crate::jpeg::component_info::ComponentInfo;

/// What the caller declares about a component when compressing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentSpec {
    /// identifier written to the frame header
    pub component_id: u8,
    /// horizontal sampling factor, 1..=4
    pub h_samp_factor: u8,
    /// vertical sampling factor, 1..=4
    pub v_samp_factor: u8,
    /// quantization table selector, 0..4
    pub quant_tbl_no: u8,
    /// DC Huffman table selector used in every scan of the component, 0..4
    pub dc_tbl_no: u8,
    /// AC Huffman table selector used in every scan of the component, 0..4
    pub ac_tbl_no: u8,
}

/// Frame parameters supplied by the caller of a compressor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSpec {
    /// width in samples
    pub image_width: u32,
    /// height in samples
    pub image_height: u32,
    /// sample precision in bits, 8 or 12
    pub data_precision: u8,
    /// the components in frame header order
    pub components: Vec<ComponentSpec>,
}

impl FrameSpec {
    /// A frame of `num_components` components at 8 bit precision. The first of three
    /// components is sampled 2x2 with table set 0, the other components 1x1 with
    /// table set 1, which is the usual YCbCr 4:2:0 layout. Other counts use 1x1
    /// and table set 0 everywhere.
    pub fn new(image_width: u32, image_height: u32, num_components: usize) -> Self {
        let components = (0..num_components)
            .map(|i| {
                let (samp, quant) = match (num_components, i) {
                    (3, 0) => (2, 0),
                    (3, _) => (1, 1),
                    _ => (1, 0),
                };
                ComponentSpec {
                    component_id: (i + 1) as u8,
                    h_samp_factor: samp,
                    v_samp_factor: samp,
                    quant_tbl_no: quant,
                    dc_tbl_no: quant,
                    ac_tbl_no: quant,
                }
            })
            .collect();

        FrameSpec {
            image_width,
            image_height,
            data_precision: 8,
            components,
        }
    }
}

/// Everything known about the frame once the SOF marker has been parsed (or the
/// frame configured), plus the derived block geometry.
#[derive(Debug, Clone, Default)]
pub struct FrameHeader {
    /// width in samples
    pub image_width: u32,
    /// height in samples
    pub image_height: u32,
    /// bits per sample
    pub data_precision: u8,
    /// SOF2 or SOF10
    pub progressive_mode: bool,
    /// SOF9 or SOF10
    pub arith_code: bool,
    /// components in frame order
    pub components: Vec<ComponentInfo>,

    /// largest horizontal sampling factor of any component
    pub max_h_samp_factor: u32,
    /// largest vertical sampling factor of any component
    pub max_v_samp_factor: u32,
    /// scaled block width of the most sampled component
    pub min_dct_h_scaled_size: u32,
    /// scaled block height of the most sampled component
    pub min_dct_v_scaled_size: u32,

    /// number of iMCU rows in the image
    pub total_imcu_rows: u32,

    /// width after scaling
    pub output_width: u32,
    /// height after scaling
    pub output_height: u32,
}

impl FrameHeader {
    /// Validates the frame parameters and builds the component list
    pub fn from_spec(
        spec: &FrameSpec,
        progressive_mode: bool,
        features: &EnabledFeatures,
    ) -> Result<Self> {
        let components = spec
            .components
            .iter()
            .enumerate()
            .map(|(i, c)| ComponentInfo {
                component_id: c.component_id,
                component_index: i,
                h_samp_factor: c.h_samp_factor,
                v_samp_factor: c.v_samp_factor,
                quant_tbl_no: c.quant_tbl_no,
                dc_tbl_no: c.dc_tbl_no,
                ac_tbl_no: c.ac_tbl_no,
                component_needed: true,
                ..Default::default()
            })
            .collect();

        let mut frame = FrameHeader {
            image_width: spec.image_width,
            image_height: spec.image_height,
            data_precision: spec.data_precision,
            progressive_mode,
            arith_code: false,
            components,
            ..Default::default()
        };
        frame.validate(features)?;
        frame.compute_geometry(DCTSIZE)?;
        Ok(frame)
    }

    /// Checks dimensions, component count, sampling factors and identifiers.
    pub fn validate(&self, features: &EnabledFeatures) -> Result<()> {
        if self.image_width == 0 || self.image_height == 0 {
            return err_exit_code(ExitCode::InconsistentGeometry, "image has no samples");
        }

        if self.image_width > features.max_jpeg_width.min(JPEG_MAX_DIMENSION)
            || self.image_height > features.max_jpeg_height.min(JPEG_MAX_DIMENSION)
        {
            return err_exit_code(
                ExitCode::InconsistentGeometry,
                format!(
                    "image {0}x{1} exceeds maximum dimensions",
                    self.image_width, self.image_height
                ),
            );
        }

        if self.data_precision != 8 && self.data_precision != 12 {
            return err_exit_code(
                ExitCode::UnsupportedJpeg,
                format!("unsupported data precision {0}", self.data_precision),
            );
        }

        if self.components.is_empty() || self.components.len() > MAX_COMPONENTS {
            return err_exit_code(
                ExitCode::InconsistentGeometry,
                format!("invalid number of components {0}", self.components.len()),
            );
        }

        for (i, c) in self.components.iter().enumerate() {
            if c.h_samp_factor == 0
                || c.h_samp_factor > MAX_SAMP_FACTOR
                || c.v_samp_factor == 0
                || c.v_samp_factor > MAX_SAMP_FACTOR
            {
                return err_exit_code(
                    ExitCode::InconsistentGeometry,
                    format!(
                        "component {0} has invalid sampling factors {1}x{2}",
                        c.component_id, c.h_samp_factor, c.v_samp_factor
                    ),
                );
            }

            if usize::from(c.quant_tbl_no) >= NUM_QUANT_TBLS
                || usize::from(c.dc_tbl_no) >= NUM_HUFF_TBLS
                || usize::from(c.ac_tbl_no) >= NUM_HUFF_TBLS
            {
                return err_exit_code(
                    ExitCode::BadMarker,
                    format!("component {0} uses an invalid table selector", c.component_id),
                );
            }

            if self.components[..i]
                .iter()
                .any(|o| o.component_id == c.component_id)
            {
                return err_exit_code(
                    ExitCode::BadMarker,
                    format!("duplicate component id {0}", c.component_id),
                );
            }
        }

        Ok(())
    }

    /// Derives the block grid. `scaled_size` is the size of a block after inverse
    /// transform in samples (8 = no scaling).
    pub fn compute_geometry(&mut self, scaled_size: u32) -> Result<()> {
        if scaled_size == 0 || scaled_size > 16 {
            return err_exit_code(
                ExitCode::SyntaxError,
                format!("scaled block size {0} must be 1..=16", scaled_size),
            );
        }

        self.max_h_samp_factor = self
            .components
            .iter()
            .map(|c| u32::from(c.h_samp_factor))
            .max()
            .unwrap_or(1);
        self.max_v_samp_factor = self
            .components
            .iter()
            .map(|c| u32::from(c.v_samp_factor))
            .max()
            .unwrap_or(1);

        self.min_dct_h_scaled_size = scaled_size;
        self.min_dct_v_scaled_size = scaled_size;

        let max_h = self.max_h_samp_factor;
        let max_v = self.max_v_samp_factor;

        for c in self.components.iter_mut() {
            let h = u32::from(c.h_samp_factor);
            let v = u32::from(c.v_samp_factor);

            c.dct_h_scaled_size = scaled_size;
            c.dct_v_scaled_size = scaled_size;

            c.width_in_blocks = div_round_up(self.image_width * h, max_h * DCTSIZE);
            c.height_in_blocks = div_round_up(self.image_height * v, max_v * DCTSIZE);

            c.downsampled_width =
                div_round_up(self.image_width * h * scaled_size, max_h * DCTSIZE);
            c.downsampled_height =
                div_round_up(self.image_height * v * scaled_size, max_v * DCTSIZE);
        }

        self.total_imcu_rows = div_round_up(self.image_height, max_v * DCTSIZE);
        self.output_width = div_round_up(self.image_width * scaled_size, DCTSIZE);
        self.output_height = div_round_up(self.image_height * scaled_size, DCTSIZE);

        debug!(
            "frame {0}x{1} components={2} max_samp={3}x{4} imcu_rows={5}",
            self.image_width,
            self.image_height,
            self.components.len(),
            max_h,
            max_v,
            self.total_imcu_rows
        );

        Ok(())
    }

    /// number of components in the frame
    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    /// number of MCUs per row in an interleaved scan
    pub fn mcus_per_row(&self) -> u32 {
        div_round_up(self.image_width, self.max_h_samp_factor * DCTSIZE)
    }

    /// frame index of the component with the given id
    pub fn find_component_by_id(&self, component_id: u8) -> Option<usize> {
        self.components
            .iter()
            .position(|c| c.component_id == component_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(w: u32, h: u32, samp: &[(u8, u8)]) -> FrameHeader {
        let spec = FrameSpec {
            image_width: w,
            image_height: h,
            data_precision: 8,
            components: samp
                .iter()
                .enumerate()
                .map(|(i, &(h, v))| ComponentSpec {
                    component_id: i as u8,
                    h_samp_factor: h,
                    v_samp_factor: v,
                    quant_tbl_no: 0,
                    dc_tbl_no: 0,
                    ac_tbl_no: 0,
                })
                .collect(),
        };
        FrameHeader::from_spec(&spec, false, &EnabledFeatures::default()).unwrap()
    }

    #[test]
    fn yuv420_geometry() {
        let f = frame(33, 17, &[(2, 2), (1, 1), (1, 1)]);

        assert_eq!(f.components[0].width_in_blocks, 5);
        assert_eq!(f.components[0].height_in_blocks, 3);
        assert_eq!(f.components[1].width_in_blocks, 3);
        assert_eq!(f.components[1].height_in_blocks, 2);
        assert_eq!(f.components[1].downsampled_width, 17);
        assert_eq!(f.total_imcu_rows, 2);
        assert_eq!(f.mcus_per_row(), 3);
    }

    #[test]
    fn scaled_output() {
        let mut f = frame(100, 50, &[(1, 1)]);
        f.compute_geometry(4).unwrap();
        assert_eq!(f.output_width, 50);
        assert_eq!(f.output_height, 25);
        assert_eq!(f.components[0].downsampled_width, 50);
        // the block grid doesn't depend on scaling
        assert_eq!(f.components[0].width_in_blocks, 13);
        assert!(f.compute_geometry(17).is_err());
    }

    #[test]
    fn rejects_bad_frames() {
        let features = EnabledFeatures::default();
        let mut spec = FrameSpec::new(10, 10, 3);
        spec.components[2].component_id = 2;
        assert_eq!(
            FrameHeader::from_spec(&spec, false, &features)
                .unwrap_err()
                .exit_code(),
            ExitCode::BadMarker
        );

        let mut spec = FrameSpec::new(10, 10, 1);
        spec.components[0].h_samp_factor = 5;
        assert_eq!(
            FrameHeader::from_spec(&spec, false, &features)
                .unwrap_err()
                .exit_code(),
            ExitCode::InconsistentGeometry
        );

        let spec = FrameSpec::new(0, 10, 1);
        assert!(FrameHeader::from_spec(&spec, false, &features).is_err());
    }
}
