//! Attributed three-dimensional points.
//!
//! Points are simple structures with public attributes, some optional. Coordinates are stored as
//! f64 and carry the final values after the las scale and offset from the source header have been
//! applied. Color channels are 16 bit, as required by the las specification; both output formats
//! narrow them to 8 bits at write time.

use crate::Color;

/// A three dimensional point in transit between a reader and a writer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Point {
    /// The x coordinate, as a float.
    pub x: f64,

    /// The y coordinate, as a float.
    pub y: f64,

    /// The z coordinate, as a float.
    pub z: f64,

    /// The integer representation of the pulse return magnitude.
    ///
    /// Zero could be a valid intensity, so this is not wrapped in an `Option`.
    pub intensity: u16,

    /// The red, green, and blue image channels associated with this point, if any.
    pub color: Option<Color>,

    /// The gps time tag at which the point was acquired, if any.
    pub gps_time: Option<f64>,
}
