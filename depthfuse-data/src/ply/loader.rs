//! PLY file loading functions

use crate::ply::PlyError;
use crate::types::PointFrame;
use glam::Vec3;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Deserialize, Debug)]
struct PlyFile {
    #[serde(rename = "vertex")]
    vertex: Vec<HashMap<String, JsonValue>>,
}

fn get_f32(prop: Option<&JsonValue>) -> Option<f32> {
    prop.and_then(|v| match v {
        JsonValue::Number(n) => n.as_f64().map(|f| f as f32),
        _ => None,
    })
}

fn get_u8(prop: Option<&JsonValue>) -> Option<u8> {
    prop.and_then(|v| match v {
        JsonValue::Number(n) => n
            .as_u64()
            .map(|u| u.min(255) as u8)
            .or_else(|| n.as_f64().map(|f| f.clamp(0.0, 255.0) as u8)),
        _ => None,
    })
}

/// Load a point cloud from a PLY file.
///
/// The result is `XyzRgb` when every vertex carries `red`/`green`/`blue`,
/// otherwise `Xyz`.
#[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_points_from_ply(path: impl AsRef<Path>) -> Result<PointFrame, PlyError> {
    let path = path.as_ref();
    debug!("Loading PLY points from: {}", path.display());
    let reader = BufReader::new(File::open(path)?);

    let ply_data: PlyFile = serde_ply::from_reader(reader).map_err(|e| {
        warn!("Failed to parse PLY file: {}", e);
        PlyError::Parse(e.to_string())
    })?;

    let mut positions = Vec::with_capacity(ply_data.vertex.len());
    let mut colors = Vec::with_capacity(ply_data.vertex.len());
    let mut colored = true;

    for (index, vertex) in ply_data.vertex.iter().enumerate() {
        let coord = |property: &'static str| {
            get_f32(vertex.get(property)).ok_or(PlyError::MissingProperty { property, index })
        };
        positions.push(Vec3::new(coord("x")?, coord("y")?, coord("z")?));

        match (
            get_u8(vertex.get("red")),
            get_u8(vertex.get("green")),
            get_u8(vertex.get("blue")),
        ) {
            (Some(r), Some(g), Some(b)) => colors.push([r, g, b]),
            _ => colored = false,
        }
    }

    info!("PLY file parsed: {} vertices (colored: {})", positions.len(), colored);
    Ok(if colored && !positions.is_empty() {
        PointFrame::xyz_rgb(positions, colors)
    } else {
        PointFrame::xyz(positions)
    })
}
