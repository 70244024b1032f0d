// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Muxer configuration shared by every output handler.

use crate::error::{PackKitError, Result};
use serde::{Deserialize, Serialize};

/// The `$Number$` placeholder recognized in segment templates.
pub const SEGMENT_NUMBER_PLACEHOLDER: &str = "$Number$";

/// Flat options struct produced by the CLI/config collaborator.
///
/// Exactly one of `output_file_name` (single-segment output) and
/// `segment_template` (multi-segment output) must be non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxerOptions {
    /// Output file path for single-segment mode.
    pub output_file_name: String,
    /// Per-segment file template containing the literal `$Number$`.
    pub segment_template: String,
    /// Segment duration in milliseconds.
    pub segment_duration_ms: u64,
    /// Fragment duration in milliseconds.
    pub fragment_duration_ms: u64,
    pub segment_sap_aligned: bool,
    pub fragment_sap_aligned: bool,
    pub normalize_presentation_timestamp: bool,
    pub num_subsegments_per_sidx: u32,
    pub temp_dir: String,
    /// Declared bandwidth in bits per second; 0 to derive from content.
    pub bandwidth: u32,
}

impl MuxerOptions {
    /// Validate the mode selection.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` unless exactly one of the output file name and the
    /// segment template is set, or when a template lacks `$Number$`.
    pub fn validate(&self) -> Result<()> {
        match (self.output_file_name.is_empty(), self.segment_template.is_empty()) {
            (true, true) => Err(PackKitError::InvalidArgument(
                "one of output_file_name and segment_template must be set".to_string(),
            )),
            (false, false) => Err(PackKitError::InvalidArgument(
                "output_file_name and segment_template are mutually exclusive".to_string(),
            )),
            (false, true) => Ok(()),
            (true, false) => {
                if self.segment_template.contains(SEGMENT_NUMBER_PLACEHOLDER) {
                    Ok(())
                } else {
                    Err(PackKitError::InvalidArgument(format!(
                        "segment_template '{}' is missing the {SEGMENT_NUMBER_PLACEHOLDER} \
                         placeholder",
                        self.segment_template
                    )))
                }
            },
        }
    }

    pub fn single_segment(&self) -> bool {
        !self.output_file_name.is_empty()
    }
}

/// Expand a segment template for the given 0-based segment index.
/// `$Number$` is substituted with the 1-based index.
pub fn segment_name(segment_template: &str, segment_index: u64) -> String {
    segment_template.replace(SEGMENT_NUMBER_PLACEHOLDER, &(segment_index + 1).to_string())
}
