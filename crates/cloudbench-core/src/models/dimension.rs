use serde::{Deserialize, Serialize};

/// Canonical point-record channels understood across the workbench.
///
/// Backend-computed channels (ClusterID and friends) are not enumerated
/// here; they travel in the extra-channel map of
/// [`PointBuffers`](crate::models::PointBuffers) under their schema name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    X,
    Y,
    Z,
    Intensity,
    Classification,
    Red,
    Green,
    Blue,
}

impl Dimension {
    /// The schema name the backend and the patch stores use for this channel
    pub fn name(&self) -> &'static str {
        match self {
            Dimension::X => "X",
            Dimension::Y => "Y",
            Dimension::Z => "Z",
            Dimension::Intensity => "Intensity",
            Dimension::Classification => "Classification",
            Dimension::Red => "Red",
            Dimension::Green => "Green",
            Dimension::Blue => "Blue",
        }
    }

    /// Resolve a schema name back to a canonical dimension
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "X" => Some(Dimension::X),
            "Y" => Some(Dimension::Y),
            "Z" => Some(Dimension::Z),
            "Intensity" => Some(Dimension::Intensity),
            "Classification" => Some(Dimension::Classification),
            "Red" => Some(Dimension::Red),
            "Green" => Some(Dimension::Green),
            "Blue" => Some(Dimension::Blue),
            _ => None,
        }
    }
}

/// ASPRS standard label for a LAS classification code.
///
/// Codes outside the standard table fall back to `Class n`.
pub fn classification_label(class_id: u8) -> String {
    let label = match class_id {
        0 => "Created, never classified",
        1 => "Unclassified",
        2 => "Ground",
        3 => "Low Vegetation",
        4 => "Medium Vegetation",
        5 => "High Vegetation",
        6 => "Building",
        7 => "Low Point (Noise)",
        8 => "Model Key-point",
        9 => "Water",
        10 => "Rail",
        11 => "Road Surface",
        12 => "Overlap",
        13 => "Wire - Guard (Shield)",
        14 => "Wire - Conductor (Phase)",
        15 => "Transmission Tower",
        16 => "Wire-Structure Connector",
        17 => "Bridge Deck",
        18 => "High Noise",
        other => return format!("Class {}", other),
    };
    label.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_name_roundtrip() {
        for dim in [
            Dimension::X,
            Dimension::Y,
            Dimension::Z,
            Dimension::Intensity,
            Dimension::Classification,
            Dimension::Red,
            Dimension::Green,
            Dimension::Blue,
        ] {
            assert_eq!(Dimension::from_name(dim.name()), Some(dim));
        }
        assert_eq!(Dimension::from_name("ClusterID"), None);
    }

    #[test]
    fn test_classification_labels() {
        assert_eq!(classification_label(2), "Ground");
        assert_eq!(classification_label(7), "Low Point (Noise)");
        assert_eq!(classification_label(18), "High Noise");
    }

    #[test]
    fn test_classification_label_fallback() {
        assert_eq!(classification_label(19), "Class 19");
        assert_eq!(classification_label(200), "Class 200");
    }
}
