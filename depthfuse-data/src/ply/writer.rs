//! ASCII PLY writer

use crate::ply::PlyError;
use crate::types::{PointFormat, PointFrame};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

/// Write `frame` as an ASCII PLY document.
///
/// Coordinates are printed with three decimals, colors as plain integers, one
/// vertex per line. The header vertex count always equals the number of lines.
pub fn write_points<W: Write>(writer: &mut W, frame: &PointFrame) -> Result<(), PlyError> {
    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "element vertex {}", frame.len())?;
    writeln!(writer, "property float x")?;
    writeln!(writer, "property float y")?;
    writeln!(writer, "property float z")?;
    if frame.format == PointFormat::XyzRgb {
        writeln!(writer, "property uchar red")?;
        writeln!(writer, "property uchar green")?;
        writeln!(writer, "property uchar blue")?;
    }
    writeln!(writer, "end_header")?;

    match frame.format {
        PointFormat::Xyz => {
            for p in &frame.positions {
                writeln!(writer, "{:.3} {:.3} {:.3}", p.x, p.y, p.z)?;
            }
        }
        PointFormat::XyzRgb => {
            for (i, p) in frame.positions.iter().enumerate() {
                let [r, g, b] = frame.colors.get(i).copied().unwrap_or([0, 0, 0]);
                writeln!(writer, "{:.3} {:.3} {:.3} {} {} {}", p.x, p.y, p.z, r, g, b)?;
            }
        }
    }
    Ok(())
}

/// Write `frame` to `path`, replacing any existing file.
///
/// The file is flushed and synced before returning.
#[tracing::instrument(skip_all, fields(path = %path.as_ref().display(), format = %frame.format))]
pub fn save_points(path: impl AsRef<Path>, frame: &PointFrame) -> Result<(), PlyError> {
    let path = path.as_ref();
    debug!("Writing {} vertices", frame.len());
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_points(&mut writer, frame)?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    info!("Saved {} vertices to {}", frame.len(), path.display());
    Ok(())
}
