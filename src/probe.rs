/// Cache unit probe
///
/// Turns a cache node's raw parameters into the on-disk layout of its output:
/// a path prefix, a four digit frame number and an extension.
use std::path::PathBuf;

use crate::error::ProbeError;
use crate::host::{NodeParameters, SceneHost};
use crate::job::CacheUnitRef;

/// Digits used for frame numbers in output file names
pub const FRAME_PADDING: usize = 4;

/// Output file type selected on the cache node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Compressed Houdini geometry (`.bgeo.sc`)
    BgeoSc,
    /// OpenVDB volume (`.vdb`)
    Vdb,
}

impl FileType {
    /// Map the node's file-type menu index; anything but 0 is VDB
    pub fn from_selector(selector: i64) -> Self {
        if selector == 0 {
            FileType::BgeoSc
        } else {
            FileType::Vdb
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FileType::BgeoSc => ".bgeo.sc",
            FileType::Vdb => ".vdb",
        }
    }

    /// Length of the `NNNN.ext` tail of an evaluated output template
    pub fn template_suffix_len(&self) -> usize {
        FRAME_PADDING + self.extension().len()
    }
}

/// Everything needed to watch one cache unit's output on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheUnitState {
    pub unit_ref: CacheUnitRef,
    pub output_prefix: String,
    pub file_type: FileType,
    pub start_frame: i64,
    pub end_frame: i64,
}

impl CacheUnitState {
    /// Build the state from raw node parameters, stripping the frame and
    /// extension from the evaluated template
    pub fn from_parameters(
        unit_ref: CacheUnitRef,
        params: &NodeParameters,
    ) -> Result<Self, ProbeError> {
        let span = params
            .end_frame
            .checked_sub(params.start_frame)
            .and_then(|span| span.checked_add(1));
        if params.start_frame > params.end_frame || span.is_none() {
            return Err(ProbeError::InvalidFrameRange {
                start: params.start_frame,
                end: params.end_frame,
            });
        }

        let file_type = FileType::from_selector(params.file_type);
        let template = &params.output_template;
        let suffix_len = file_type.template_suffix_len();

        let prefix_len = template.len().checked_sub(suffix_len);
        let output_prefix = match prefix_len {
            Some(len) if template.is_char_boundary(len) => template[..len].to_string(),
            _ => {
                return Err(ProbeError::TemplateTooShort {
                    template: template.clone(),
                    suffix: format!("{}{}", "N".repeat(FRAME_PADDING), file_type.extension()),
                })
            }
        };

        Ok(Self {
            unit_ref,
            output_prefix,
            file_type,
            start_frame: params.start_frame,
            end_frame: params.end_frame,
        })
    }

    pub fn extension(&self) -> &'static str {
        self.file_type.extension()
    }

    /// Number of frames in the inclusive range
    pub fn total_frames(&self) -> u64 {
        self.end_frame.abs_diff(self.start_frame).saturating_add(1)
    }

    /// Concrete file written for `frame`
    pub fn frame_path(&self, frame: i64) -> PathBuf {
        PathBuf::from(format!(
            "{}{:0width$}{}",
            self.output_prefix,
            frame,
            self.extension(),
            width = FRAME_PADDING
        ))
    }
}

/// Query the loaded scene for a cache unit's output layout
pub async fn probe(host: &dyn SceneHost, unit: &CacheUnitRef) -> Result<CacheUnitState, ProbeError> {
    let params = host
        .probe(unit)
        .await?
        .ok_or_else(|| ProbeError::NotFound(unit.to_string()))?;

    CacheUnitState::from_parameters(unit.clone(), &params)
}
