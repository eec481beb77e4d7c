//! Coordinate reprojection over the PROJ bindings

use cloudbench_core::models::Bounds;
use cloudbench_core::{CloudbenchError, Result};
use proj::Proj;

/// EPSG code of the display CRS every layer's bounds are canonicalized to.
pub const WGS84_EPSG: u32 = 4326;

fn projection(from_epsg: u32, to_epsg: u32) -> Result<Proj> {
    let from = format!("EPSG:{}", from_epsg);
    let to = format!("EPSG:{}", to_epsg);
    Proj::new_known_crs(&from, &to, None).map_err(|e| CloudbenchError::CrsTransform {
        reason: format!("Failed to create projection from {} to {}: {}", from, to, e),
    })
}

/// Reproject parallel coordinate arrays in place.
pub fn transform_coords(
    xs: &mut [f64],
    ys: &mut [f64],
    from_epsg: u32,
    to_epsg: u32,
) -> Result<()> {
    // If CRS are the same, no transformation needed
    if from_epsg == to_epsg {
        return Ok(());
    }

    let proj = projection(from_epsg, to_epsg)?;
    for (x, y) in xs.iter_mut().zip(ys.iter_mut()) {
        let (tx, ty) =
            proj.convert((*x, *y)).map_err(|e| CloudbenchError::CrsTransform {
                reason: format!("Projection failed at ({}, {}): {}", x, y, e),
            })?;
        *x = tx;
        *y = ty;
    }
    Ok(())
}

/// Reproject a bounding box between two CRS.
///
/// Only the two extreme corners are projected, the same convention the
/// metadata path uses. Z is carried through untouched; the vertical datum
/// is not part of the horizontal transform.
pub fn transform_bounds(bounds: &Bounds, from_epsg: u32, to_epsg: u32) -> Result<Bounds> {
    if from_epsg == to_epsg {
        let mut out = *bounds;
        out.epsg = Some(to_epsg);
        return Ok(out);
    }

    let proj = projection(from_epsg, to_epsg)?;
    let (minx, miny) =
        proj.convert((bounds.minx, bounds.miny)).map_err(|e| CloudbenchError::CrsTransform {
            reason: format!("Projection failed: {}", e),
        })?;
    let (maxx, maxy) =
        proj.convert((bounds.maxx, bounds.maxy)).map_err(|e| CloudbenchError::CrsTransform {
            reason: format!("Projection failed: {}", e),
        })?;

    Ok(Bounds {
        minx,
        maxx,
        miny,
        maxy,
        minz: bounds.minz,
        maxz: bounds.maxz,
        epsg: Some(to_epsg),
    })
}

/// Canonicalize dataset bounds to WGS84 for display and layer zooming.
///
/// Fails with [`CloudbenchError::CrsTransform`] when the source CRS could
/// not be identified, matching how the metadata extractor reports a file
/// whose spatial reference carries no usable EPSG code.
pub fn bounds_to_wgs84(bounds: &Bounds) -> Result<Bounds> {
    let from = bounds.epsg.ok_or_else(|| CloudbenchError::CrsTransform {
        reason: "source EPSG code is unknown".to_string(),
    })?;
    transform_bounds(bounds, from, WGS84_EPSG)
}
