//! Range filter: keep points whose dimension values fall inside limits
//!
//! The limits DSL is the one pipeline files use: comma-joined clauses of
//! the form `Dimension[lo:hi]`, either bound optional, with `!` after the
//! dimension name negating the clause. All clauses must hold for a point
//! to survive (`Z[2:]`, `Classification![7:7]`).

use cloudbench_core::models::PointBuffers;
use cloudbench_core::{CloudbenchError, Result};

/// One parsed `Dimension[lo:hi]` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeClause {
    pub dimension: String,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub negated: bool,
}

impl RangeClause {
    /// True when `value` satisfies this clause.
    pub fn matches(&self, value: f64) -> bool {
        let inside = self.lower.map_or(true, |lo| value >= lo)
            && self.upper.map_or(true, |hi| value <= hi);
        inside != self.negated
    }
}

/// Parse a limits expression into its clauses.
pub fn parse_limits(limits: &str) -> Result<Vec<RangeClause>> {
    let trimmed = limits.trim();
    if trimmed.is_empty() {
        return Err(invalid("limits expression is empty"));
    }

    trimmed.split(',').map(|clause| parse_clause(clause.trim())).collect()
}

fn parse_clause(clause: &str) -> Result<RangeClause> {
    let open = clause
        .find('[')
        .ok_or_else(|| invalid(&format!("clause '{}' has no '[' bracket", clause)))?;
    if !clause.ends_with(']') {
        return Err(invalid(&format!("clause '{}' has no closing ']'", clause)));
    }

    let mut dimension = clause[..open].trim();
    let negated = dimension.ends_with('!');
    if negated {
        dimension = dimension[..dimension.len() - 1].trim_end();
    }
    if dimension.is_empty() {
        return Err(invalid(&format!("clause '{}' names no dimension", clause)));
    }

    let body = &clause[open + 1..clause.len() - 1];
    let (lo, hi) = body
        .split_once(':')
        .ok_or_else(|| invalid(&format!("clause '{}' has no ':' separator", clause)))?;

    let lower = parse_bound(lo, clause)?;
    let upper = parse_bound(hi, clause)?;
    if let (Some(lo), Some(hi)) = (lower, upper) {
        if lo > hi {
            return Err(invalid(&format!("clause '{}' has lower bound above upper", clause)));
        }
    }

    Ok(RangeClause {
        dimension: dimension.to_string(),
        lower,
        upper,
        negated,
    })
}

fn parse_bound(text: &str, clause: &str) -> Result<Option<f64>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse::<f64>()
        .map(Some)
        .map_err(|_| invalid(&format!("clause '{}' has non-numeric bound '{}'", clause, text)))
}

fn invalid(reason: &str) -> CloudbenchError {
    CloudbenchError::InvalidStageConfig {
        reason: reason.to_string(),
    }
}

/// Resolve each clause's dimension name against the buffers, case
/// insensitively, returning the canonical names in clause order.
fn resolve_dimensions(clauses: &[RangeClause], input: &PointBuffers) -> Result<Vec<String>> {
    let names = input.dimension_names();
    clauses
        .iter()
        .map(|clause| {
            names
                .iter()
                .find(|name| name.eq_ignore_ascii_case(&clause.dimension))
                .cloned()
                .ok_or_else(|| invalid(&format!("unknown dimension '{}'", clause.dimension)))
        })
        .collect()
}

/// Build the keep-mask for `limits` without materializing the output.
/// Shared with stages that take an `ignore` expression.
pub fn match_mask(limits: &str, input: &PointBuffers) -> Result<Vec<bool>> {
    let clauses = parse_limits(limits)?;
    let resolved = resolve_dimensions(&clauses, input)?;

    let mut mask = vec![true; input.len()];
    for (clause, name) in clauses.iter().zip(&resolved) {
        for (i, keep) in mask.iter_mut().enumerate() {
            if *keep {
                // resolved names are always present, value() cannot miss
                let value = input.value(name, i).unwrap_or(f64::NAN);
                if !clause.matches(value) {
                    *keep = false;
                }
            }
        }
    }
    Ok(mask)
}

pub fn apply(limits: &str, input: &PointBuffers) -> Result<PointBuffers> {
    let mask = match_mask(limits, input)?;
    Ok(input.retain_mask(&mask))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PointBuffers {
        let mut buffers = PointBuffers::from_xyz(
            vec![0.0, 1.0, 2.0, 3.0],
            vec![0.0, 0.0, 0.0, 0.0],
            vec![10.0, 20.0, 30.0, 40.0],
        );
        buffers.classification = Some(vec![2, 7, 7, 2]);
        buffers
    }

    #[test]
    fn test_parse_single_clause() {
        let clauses = parse_limits("Z[0:100]").unwrap();
        assert_eq!(
            clauses,
            vec![RangeClause {
                dimension: "Z".to_string(),
                lower: Some(0.0),
                upper: Some(100.0),
                negated: false,
            }]
        );
    }

    #[test]
    fn test_parse_negation_and_open_bounds() {
        let clauses = parse_limits("Classification![7:7], Z[2:]").unwrap();
        assert!(clauses[0].negated);
        assert_eq!(clauses[0].lower, Some(7.0));
        assert_eq!(clauses[1].lower, Some(2.0));
        assert_eq!(clauses[1].upper, None);
        assert!(!clauses[1].negated);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_limits("").is_err());
        assert!(parse_limits("Z").is_err());
        assert!(parse_limits("Z[0:100").is_err());
        assert!(parse_limits("[0:100]").is_err());
        assert!(parse_limits("Z[abc:1]").is_err());
        assert!(parse_limits("Z[5:1]").is_err());
    }

    #[test]
    fn test_clause_matching() {
        let clause = parse_limits("Z[10:30]").unwrap().remove(0);
        assert!(clause.matches(10.0));
        assert!(clause.matches(30.0));
        assert!(!clause.matches(30.1));

        let negated = parse_limits("Classification![7:7]").unwrap().remove(0);
        assert!(negated.matches(2.0));
        assert!(!negated.matches(7.0));
    }

    #[test]
    fn test_apply_drops_noise_class() {
        let out = apply("Classification![7:7]", &sample()).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.x, vec![0.0, 3.0]);
        assert_eq!(out.classification, Some(vec![2, 2]));
    }

    #[test]
    fn test_apply_ands_clauses() {
        let out = apply("Z[10:30], Classification[2:2]", &sample()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.x, vec![0.0]);
    }

    #[test]
    fn test_apply_is_case_insensitive() {
        let out = apply("z[20:40]", &sample()).unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_unknown_dimension_is_rejected() {
        let err = apply("Velocity[0:1]", &sample()).unwrap_err();
        assert!(matches!(err, CloudbenchError::InvalidStageConfig { .. }));
        assert!(err.to_string().contains("Velocity"));
    }
}
