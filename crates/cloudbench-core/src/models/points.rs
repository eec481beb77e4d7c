use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Columnar buffers holding one channel per vector, all of equal length.
///
/// `x`, `y`, `z` are always present. The remaining canonical channels are
/// optional and only `Some` when the source carried them. Channels computed
/// by pipeline stages (for example `ClusterID`) live in `extra`, keyed by
/// their schema name, widened to `f64`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointBuffers {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub intensity: Option<Vec<u16>>,
    pub classification: Option<Vec<u8>>,
    pub red: Option<Vec<u16>>,
    pub green: Option<Vec<u16>>,
    pub blue: Option<Vec<u16>>,
    pub extra: BTreeMap<String, Vec<f64>>,
}

impl PointBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers holding only coordinates
    pub fn from_xyz(x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> Self {
        Self {
            x,
            y,
            z,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// True when every present channel holds exactly `len()` values
    pub fn is_coherent(&self) -> bool {
        let n = self.len();
        if self.y.len() != n || self.z.len() != n {
            return false;
        }
        let u16_ok = |c: &Option<Vec<u16>>| c.as_ref().map_or(true, |v| v.len() == n);
        if !u16_ok(&self.intensity) || !u16_ok(&self.red) || !u16_ok(&self.green) || !u16_ok(&self.blue)
        {
            return false;
        }
        if self.classification.as_ref().map_or(false, |v| v.len() != n) {
            return false;
        }
        self.extra.values().all(|v| v.len() == n)
    }

    /// Names of all present channels: the canonical ones in schema order,
    /// then the extra channels in key order.
    pub fn dimension_names(&self) -> Vec<String> {
        let mut names = vec!["X".to_string(), "Y".to_string(), "Z".to_string()];
        if self.intensity.is_some() {
            names.push("Intensity".to_string());
        }
        if self.classification.is_some() {
            names.push("Classification".to_string());
        }
        if self.red.is_some() {
            names.push("Red".to_string());
        }
        if self.green.is_some() {
            names.push("Green".to_string());
        }
        if self.blue.is_some() {
            names.push("Blue".to_string());
        }
        names.extend(self.extra.keys().cloned());
        names
    }

    /// Value of the named channel at `index`, widened to `f64`.
    /// `None` when the channel is absent.
    pub fn value(&self, name: &str, index: usize) -> Option<f64> {
        match name {
            "X" => self.x.get(index).copied(),
            "Y" => self.y.get(index).copied(),
            "Z" => self.z.get(index).copied(),
            "Intensity" => self.intensity.as_ref().map(|v| v[index] as f64),
            "Classification" => self.classification.as_ref().map(|v| v[index] as f64),
            "Red" => self.red.as_ref().map(|v| v[index] as f64),
            "Green" => self.green.as_ref().map(|v| v[index] as f64),
            "Blue" => self.blue.as_ref().map(|v| v[index] as f64),
            other => self.extra.get(other).map(|v| v[index]),
        }
    }

    /// Keep every `step`-th point starting at index 0. `step` of 0 or 1
    /// returns an unchanged copy.
    pub fn take_stride(&self, step: usize) -> PointBuffers {
        if step <= 1 {
            return self.clone();
        }
        let pick = |v: &Vec<f64>| v.iter().copied().step_by(step).collect::<Vec<_>>();
        let pick_u16 =
            |c: &Option<Vec<u16>>| c.as_ref().map(|v| v.iter().copied().step_by(step).collect());
        PointBuffers {
            x: pick(&self.x),
            y: pick(&self.y),
            z: pick(&self.z),
            intensity: pick_u16(&self.intensity),
            classification: self
                .classification
                .as_ref()
                .map(|v| v.iter().copied().step_by(step).collect()),
            red: pick_u16(&self.red),
            green: pick_u16(&self.green),
            blue: pick_u16(&self.blue),
            extra: self
                .extra
                .iter()
                .map(|(k, v)| (k.clone(), pick(v)))
                .collect(),
        }
    }

    /// Keep the points whose mask entry is true. The mask length must match
    /// `len()`; extra mask entries are ignored, missing ones drop points.
    pub fn retain_mask(&self, mask: &[bool]) -> PointBuffers {
        let keep = |i: &usize| mask.get(*i).copied().unwrap_or(false);
        let indices: Vec<usize> = (0..self.len()).filter(keep).collect();
        let pick = |v: &Vec<f64>| indices.iter().map(|&i| v[i]).collect::<Vec<_>>();
        let pick_u16 = |c: &Option<Vec<u16>>| {
            c.as_ref()
                .map(|v| indices.iter().map(|&i| v[i]).collect::<Vec<u16>>())
        };
        PointBuffers {
            x: pick(&self.x),
            y: pick(&self.y),
            z: pick(&self.z),
            intensity: pick_u16(&self.intensity),
            classification: self
                .classification
                .as_ref()
                .map(|v| indices.iter().map(|&i| v[i]).collect()),
            red: pick_u16(&self.red),
            green: pick_u16(&self.green),
            blue: pick_u16(&self.blue),
            extra: self
                .extra
                .iter()
                .map(|(k, v)| (k.clone(), pick(v)))
                .collect(),
        }
    }

    /// Append `other`'s points. Optional channels survive only when both
    /// sides carry them; a channel present on one side only is dropped so
    /// the merged buffers stay coherent.
    pub fn append(&mut self, other: &PointBuffers) {
        self.x.extend_from_slice(&other.x);
        self.y.extend_from_slice(&other.y);
        self.z.extend_from_slice(&other.z);

        fn merge_u16(ours: &mut Option<Vec<u16>>, theirs: &Option<Vec<u16>>) {
            match (ours.as_mut(), theirs) {
                (Some(a), Some(b)) => a.extend_from_slice(b),
                _ => *ours = None,
            }
        }
        merge_u16(&mut self.intensity, &other.intensity);
        merge_u16(&mut self.red, &other.red);
        merge_u16(&mut self.green, &other.green);
        merge_u16(&mut self.blue, &other.blue);

        match (self.classification.as_mut(), &other.classification) {
            (Some(a), Some(b)) => a.extend_from_slice(b),
            _ => self.classification = None,
        }

        let shared: Vec<String> = self
            .extra
            .keys()
            .filter(|k| other.extra.contains_key(*k))
            .cloned()
            .collect();
        self.extra.retain(|k, _| shared.contains(k));
        for key in shared {
            if let (Some(ours), Some(theirs)) = (self.extra.get_mut(&key), other.extra.get(&key)) {
                ours.extend_from_slice(theirs);
            }
        }
    }

    /// Min/max box over the coordinates, or `None` for empty buffers
    pub fn bounds(&self) -> Option<Bounds> {
        if self.is_empty() {
            return None;
        }
        let mut bounds = Bounds::empty();
        for i in 0..self.len() {
            bounds.update(self.x[i], self.y[i], self.z[i]);
        }
        Some(bounds)
    }
}

/// Axis-aligned bounding box, optionally tagged with the EPSG code its
/// coordinates are expressed in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub minx: f64,
    pub maxx: f64,
    pub miny: f64,
    pub maxy: f64,
    pub minz: f64,
    pub maxz: f64,
    pub epsg: Option<u32>,
}

impl Bounds {
    /// An inverted box that any `update` call will snap to a real extent
    pub fn empty() -> Self {
        Self {
            minx: f64::INFINITY,
            maxx: f64::NEG_INFINITY,
            miny: f64::INFINITY,
            maxy: f64::NEG_INFINITY,
            minz: f64::INFINITY,
            maxz: f64::NEG_INFINITY,
            epsg: None,
        }
    }

    /// Grow the box to include a point
    pub fn update(&mut self, x: f64, y: f64, z: f64) {
        self.minx = self.minx.min(x);
        self.maxx = self.maxx.max(x);
        self.miny = self.miny.min(y);
        self.maxy = self.maxy.max(y);
        self.minz = self.minz.min(z);
        self.maxz = self.maxz.max(z);
    }

    /// True once at least one point has been folded in
    pub fn is_valid(&self) -> bool {
        self.minx <= self.maxx && self.miny <= self.maxy
    }

    /// Union of two boxes. The EPSG tag is kept only when both sides agree.
    pub fn merged(&self, other: &Bounds) -> Bounds {
        Bounds {
            minx: self.minx.min(other.minx),
            maxx: self.maxx.max(other.maxx),
            miny: self.miny.min(other.miny),
            maxy: self.maxy.max(other.maxy),
            minz: self.minz.min(other.minz),
            maxz: self.maxz.max(other.maxz),
            epsg: if self.epsg == other.epsg {
                self.epsg
            } else {
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PointBuffers {
        let mut buffers = PointBuffers::from_xyz(
            vec![0.0, 1.0, 2.0, 3.0],
            vec![10.0, 11.0, 12.0, 13.0],
            vec![100.0, 101.0, 102.0, 103.0],
        );
        buffers.intensity = Some(vec![5, 6, 7, 8]);
        buffers.classification = Some(vec![2, 2, 7, 2]);
        buffers
            .extra
            .insert("ClusterID".to_string(), vec![1.0, 1.0, 0.0, 2.0]);
        buffers
    }

    #[test]
    fn test_coherence() {
        let buffers = sample();
        assert!(buffers.is_coherent());

        let mut broken = sample();
        broken.intensity = Some(vec![1, 2]);
        assert!(!broken.is_coherent());
    }

    #[test]
    fn test_take_stride() {
        let buffers = sample();
        let out = buffers.take_stride(2);
        assert_eq!(out.len(), 2);
        assert_eq!(out.x, vec![0.0, 2.0]);
        assert_eq!(out.intensity, Some(vec![5, 7]));
        assert_eq!(out.classification, Some(vec![2, 7]));
        assert_eq!(out.extra["ClusterID"], vec![1.0, 0.0]);
        assert!(out.is_coherent());
    }

    #[test]
    fn test_stride_of_one_is_identity() {
        let buffers = sample();
        assert_eq!(buffers.take_stride(1), buffers);
        assert_eq!(buffers.take_stride(0), buffers);
    }

    #[test]
    fn test_retain_mask() {
        let buffers = sample();
        let out = buffers.retain_mask(&[true, false, false, true]);
        assert_eq!(out.len(), 2);
        assert_eq!(out.x, vec![0.0, 3.0]);
        assert_eq!(out.classification, Some(vec![2, 2]));
        assert!(out.is_coherent());
    }

    #[test]
    fn test_append_intersects_channels() {
        let mut left = sample();
        let mut right = PointBuffers::from_xyz(vec![9.0], vec![19.0], vec![109.0]);
        right.classification = Some(vec![6]);
        // right has no intensity and no extras

        left.append(&right);
        assert_eq!(left.len(), 5);
        assert_eq!(left.classification, Some(vec![2, 2, 7, 2, 6]));
        assert!(left.intensity.is_none());
        assert!(left.extra.is_empty());
        assert!(left.is_coherent());
    }

    #[test]
    fn test_value_lookup() {
        let buffers = sample();
        assert_eq!(buffers.value("Z", 1), Some(101.0));
        assert_eq!(buffers.value("Classification", 2), Some(7.0));
        assert_eq!(buffers.value("ClusterID", 3), Some(2.0));
        assert_eq!(buffers.value("Red", 0), None);
        assert_eq!(buffers.value("NoSuchChannel", 0), None);
    }

    #[test]
    fn test_bounds() {
        let buffers = sample();
        let bounds = buffers.bounds().unwrap();
        assert_eq!(bounds.minx, 0.0);
        assert_eq!(bounds.maxx, 3.0);
        assert_eq!(bounds.miny, 10.0);
        assert_eq!(bounds.maxy, 13.0);
        assert_eq!(bounds.minz, 100.0);
        assert_eq!(bounds.maxz, 103.0);

        assert!(PointBuffers::new().bounds().is_none());
    }

    #[test]
    fn test_bounds_merge() {
        let mut a = Bounds::empty();
        a.update(0.0, 0.0, 0.0);
        a.update(5.0, 5.0, 5.0);
        let mut b = Bounds::empty();
        b.update(3.0, -2.0, 1.0);
        b.update(10.0, 4.0, 2.0);

        let merged = a.merged(&b);
        assert_eq!(merged.minx, 0.0);
        assert_eq!(merged.maxx, 10.0);
        assert_eq!(merged.miny, -2.0);
        assert_eq!(merged.maxy, 5.0);
    }

    #[test]
    fn test_dimension_names_order() {
        let buffers = sample();
        assert_eq!(
            buffers.dimension_names(),
            vec!["X", "Y", "Z", "Intensity", "Classification", "ClusterID"]
        );
    }
}
