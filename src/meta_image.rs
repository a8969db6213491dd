//! Uncompressed MetaImage (`.mha`, `ElementDataFile = LOCAL`) reader/writer.
//!
//! This is the staging format handed to the external optimizer. Scope is
//! deliberately narrow: 3D, MET_FLOAT, little-endian, uncompressed — exactly
//! what staging produces and consumes. Direction cosines are written
//! axis-major (column 0, then 1, then 2).

use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context as _;
use glam::{DMat3, DVec3};

use crate::error::{VoxalignError, VoxalignResult};
use crate::volume::{Volume, VolumeGeometry};

/// Write a volume as an uncompressed `.mha` file.
pub fn write(volume: &Volume, path: &Path) -> VoxalignResult<()> {
    let g = &volume.geometry;

    let mut header = String::new();
    let _ = writeln!(header, "ObjectType = Image");
    let _ = writeln!(header, "NDims = 3");
    let _ = writeln!(header, "BinaryData = True");
    let _ = writeln!(header, "BinaryDataByteOrderMSB = False");
    let _ = writeln!(header, "CompressedData = False");
    let d = g.direction;
    let _ = writeln!(
        header,
        "TransformMatrix = {} {} {} {} {} {} {} {} {}",
        d.x_axis.x,
        d.x_axis.y,
        d.x_axis.z,
        d.y_axis.x,
        d.y_axis.y,
        d.y_axis.z,
        d.z_axis.x,
        d.z_axis.y,
        d.z_axis.z,
    );
    let _ = writeln!(
        header,
        "Offset = {} {} {}",
        g.origin.x, g.origin.y, g.origin.z
    );
    let _ = writeln!(
        header,
        "ElementSpacing = {} {} {}",
        g.spacing.x, g.spacing.y, g.spacing.z
    );
    let _ = writeln!(
        header,
        "DimSize = {} {} {}",
        g.dims[0], g.dims[1], g.dims[2]
    );
    let _ = writeln!(header, "ElementType = MET_FLOAT");
    let _ = writeln!(header, "ElementDataFile = LOCAL");

    let mut bytes = Vec::with_capacity(header.len() + volume.data().len() * 4);
    bytes.extend_from_slice(header.as_bytes());
    for v in volume.data() {
        bytes.extend_from_slice(&v.to_le_bytes());
    }

    std::fs::write(path, bytes)
        .with_context(|| format!("failed to write volume '{}'", path.display()))?;
    Ok(())
}

/// Read an uncompressed `.mha` file written by [`write`] (or any compatible
/// MET_FLOAT LOCAL MetaImage).
pub fn read(path: &Path) -> VoxalignResult<Volume> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read volume '{}'", path.display()))?;

    let marker = b"ElementDataFile";
    let marker_pos = bytes
        .windows(marker.len())
        .position(|w| w == marker)
        .ok_or_else(|| {
            VoxalignError::validation(format!(
                "'{}' has no ElementDataFile header line",
                path.display()
            ))
        })?;
    let newline = bytes[marker_pos..]
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| {
            VoxalignError::validation(format!(
                "'{}' header is truncated after ElementDataFile",
                path.display()
            ))
        })?;
    let data_start = marker_pos + newline + 1;

    let header = std::str::from_utf8(&bytes[..data_start])
        .map_err(|_| VoxalignError::validation("MetaImage header is not valid UTF-8"))?;

    let mut dims: Option<[usize; 3]> = None;
    let mut spacing = DVec3::ONE;
    let mut origin = DVec3::ZERO;
    let mut direction = DMat3::IDENTITY;

    for line in header.lines() {
        let Some((key, value)) = line.split_once('=') else {
            return Err(VoxalignError::validation(format!(
                "malformed MetaImage header line: {line}"
            )));
        };
        let key = key.trim();
        let value = value.trim();
        match key {
            "ObjectType" if value != "Image" => {
                return Err(VoxalignError::validation(format!(
                    "unsupported ObjectType '{value}'"
                )));
            }
            "NDims" if value != "3" => {
                return Err(VoxalignError::validation(format!(
                    "only 3D volumes are supported, got NDims = {value}"
                )));
            }
            "CompressedData" if value.eq_ignore_ascii_case("true") => {
                return Err(VoxalignError::validation(
                    "compressed MetaImage data is not supported",
                ));
            }
            "BinaryDataByteOrderMSB" if value.eq_ignore_ascii_case("true") => {
                return Err(VoxalignError::validation(
                    "big-endian MetaImage data is not supported",
                ));
            }
            "ElementType" if value != "MET_FLOAT" => {
                return Err(VoxalignError::validation(format!(
                    "unsupported ElementType '{value}' (expected MET_FLOAT)"
                )));
            }
            "ElementDataFile" if value != "LOCAL" => {
                return Err(VoxalignError::validation(
                    "detached MetaImage data files are not supported (expected LOCAL)",
                ));
            }
            "DimSize" => {
                let v = parse_floats(value, 3, "DimSize")?;
                dims = Some([v[0] as usize, v[1] as usize, v[2] as usize]);
            }
            "ElementSpacing" => {
                let v = parse_floats(value, 3, "ElementSpacing")?;
                spacing = DVec3::new(v[0], v[1], v[2]);
            }
            "Offset" | "Origin" => {
                let v = parse_floats(value, 3, key)?;
                origin = DVec3::new(v[0], v[1], v[2]);
            }
            "TransformMatrix" => {
                let v = parse_floats(value, 9, "TransformMatrix")?;
                direction = DMat3::from_cols(
                    DVec3::new(v[0], v[1], v[2]),
                    DVec3::new(v[3], v[4], v[5]),
                    DVec3::new(v[6], v[7], v[8]),
                );
            }
            _ => {}
        }
    }

    let dims = dims.ok_or_else(|| {
        VoxalignError::validation(format!("'{}' header has no DimSize", path.display()))
    })?;
    let geometry = VolumeGeometry::new(dims, spacing, origin)?.with_direction(direction);

    let raw = &bytes[data_start..];
    let expected = geometry.voxel_count() * 4;
    if raw.len() != expected {
        return Err(VoxalignError::validation(format!(
            "'{}' has {} data bytes, expected {expected}",
            path.display(),
            raw.len()
        )));
    }
    let data = raw
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Volume::new(geometry, data)
}

fn parse_floats(value: &str, expected: usize, key: &str) -> VoxalignResult<Vec<f64>> {
    let parsed: Result<Vec<f64>, _> = value.split_whitespace().map(str::parse).collect();
    let parsed = parsed
        .map_err(|_| VoxalignError::validation(format!("non-numeric value in {key}: {value}")))?;
    if parsed.len() != expected {
        return Err(VoxalignError::validation(format!(
            "{key} must have {expected} values, got {}",
            parsed.len()
        )));
    }
    Ok(parsed)
}
