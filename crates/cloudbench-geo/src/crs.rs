//! WKT spatial-reference parsing
//!
//! LAS headers carry their CRS as a WKT1 string. We only need three pieces
//! of it: the human-readable name, the EPSG code, and the linear unit. A
//! full WKT grammar is overkill for that, so this module scans the string
//! directly.

/// The pieces of a spatial reference the workbench cares about.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CrsInfo {
    /// Name of the outermost CRS object, e.g. "WGS 84 / UTM zone 35N".
    pub name: Option<String>,
    /// EPSG code of the outermost CRS object.
    pub epsg: Option<u32>,
    /// Unit of the outermost CRS object, e.g. "metre" or "degree".
    pub unit: Option<String>,
}

/// Extract name, EPSG code, and unit from a WKT spatial reference.
///
/// The EPSG code is taken from the last `AUTHORITY["EPSG","..."]` clause:
/// WKT1 nests authorities innermost-first, so the outer CRS object's code
/// is always the final one. The unit is the `UNIT[...]` clause that is a
/// direct child of the outer object (a projected CRS also carries the
/// angular unit of its base GEOGCS, which is not the one we want).
///
/// Never fails: missing or malformed pieces come back as `None`.
pub fn parse_crs_info(wkt: &str) -> CrsInfo {
    let wkt = wkt.trim();
    if wkt.is_empty() {
        return CrsInfo::default();
    }

    let info = CrsInfo {
        name: first_quoted(wkt).map(str::to_string),
        epsg: authority_epsg(wkt),
        unit: unit_name(wkt).map(str::to_string),
    };
    tracing::debug!(name = ?info.name, epsg = ?info.epsg, unit = ?info.unit, "parsed spatial reference");
    info
}

/// First quoted token of the document - the outer object's name.
fn first_quoted(wkt: &str) -> Option<&str> {
    let start = wkt.find('"')? + 1;
    let end = wkt[start..].find('"')? + start;
    Some(&wkt[start..end])
}

/// EPSG code of the last `AUTHORITY["EPSG","<digits>"]` clause.
fn authority_epsg(wkt: &str) -> Option<u32> {
    let mut code = None;
    for (pos, _) in wkt.match_indices("AUTHORITY[") {
        let clause_start = pos + "AUTHORITY[".len();
        let Some(clause_end) = wkt[clause_start..].find(']') else {
            continue;
        };
        let clause = &wkt[clause_start..clause_start + clause_end];
        let mut tokens = quoted_tokens(clause);
        let authority = tokens.next();
        let value = tokens.next();
        if let (Some(authority), Some(value)) = (authority, value) {
            if authority.eq_ignore_ascii_case("EPSG") {
                if let Ok(parsed) = value.parse::<u32>() {
                    code = Some(parsed);
                }
            }
        }
    }
    code
}

/// Unit name of the outer CRS object.
///
/// Scans for `UNIT[` clauses whose bracket depth marks them as direct
/// children of the outermost object. Falls back to the first `UNIT[`
/// anywhere when the depth scan finds nothing (truncated WKT).
fn unit_name(wkt: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut fallback = None;
    let bytes = wkt.as_bytes();

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'[' if !in_quotes => depth += 1,
            b']' if !in_quotes => depth = depth.saturating_sub(1),
            b'U' if !in_quotes && wkt[i..].starts_with("UNIT[") => {
                // Skip LENGTHUNIT/ANGLEUNIT; WKT2 spells those out and the
                // bare keyword is what WKT1 uses.
                if i > 0 && bytes[i - 1].is_ascii_alphabetic() {
                    continue;
                }
                let token = first_quoted(&wkt[i..]);
                if depth == 1 {
                    return token;
                }
                if fallback.is_none() {
                    fallback = token;
                }
            }
            _ => {}
        }
    }
    fallback
}

/// Iterate the quoted tokens of a WKT clause body.
fn quoted_tokens(clause: &str) -> impl Iterator<Item = &str> {
    clause.split('"').skip(1).step_by(2)
}

/// Parse the numeric code out of an `EPSG:nnnn` identifier.
///
/// Stage parameters name coordinate systems this way ("EPSG:3857").
/// Anything else (PROJ strings, bare WKT) comes back as `None`.
pub fn parse_epsg_code(crs: &str) -> Option<u32> {
    let rest = crs.trim().strip_prefix("EPSG:").or_else(|| crs.trim().strip_prefix("epsg:"))?;
    rest.parse::<u32>().ok()
}
