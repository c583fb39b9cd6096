use std::ops::Index;

/// Normalized face keypoint: `x`/`y` in `[0, 1]` image space, `z` relative depth.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance in the image plane, ignoring depth.
    pub fn planar_distance(&self, other: &Landmark) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Detector output for one face, in the detector's fixed schema order.
///
/// Empty when no face was found in the frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index)
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }
}

impl Index<usize> for LandmarkSet {
    type Output = Landmark;

    fn index(&self, index: usize) -> &Landmark {
        &self.points[index]
    }
}

impl From<Vec<Landmark>> for LandmarkSet {
    fn from(points: Vec<Landmark>) -> Self {
        Self::new(points)
    }
}
