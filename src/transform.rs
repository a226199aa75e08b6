//! The deterministic per-point transform pipeline.
//!
//! Every point a worker reads passes through [TransformPipeline::apply] before it reaches the
//! writer. The operation order is part of the output contract:
//!
//! 1. subtract the offset
//! 2. multiply by the scale, when one is configured
//! 3. swap y and z
//! 4. negate z
//! 5. negate x
//! 6. resolve the color channels (rgb, else intensity replicated into rgb, else zero)
//!
//! so the emitted coordinate is always `axis_ops(scale · (raw − offset))`. Decimation happens
//! before any of this, in the worker's read loop.

use crate::settings::ImportSettings;
use crate::{Color, Point, Vector};

/// Applies the configured geometric and colorimetric transforms, in order.
#[derive(Clone, Copy, Debug)]
pub struct TransformPipeline {
    offset: Vector<f64>,
    scale: Option<f64>,
    swap_yz: bool,
    invert_z: bool,
    invert_x: bool,
    import_rgb: bool,
    import_intensity: bool,
}

impl TransformPipeline {
    /// Builds the pipeline from the settings and the resolved offset.
    ///
    /// The offset is zero, manual, or the result of the bounds pass; that resolution has already
    /// happened by the time the pipeline is constructed.
    pub fn new(settings: &ImportSettings, offset: Vector<f64>) -> TransformPipeline {
        TransformPipeline {
            offset,
            scale: settings.scale,
            swap_yz: settings.swap_yz,
            invert_z: settings.invert_z,
            invert_x: settings.invert_x,
            import_rgb: settings.import_rgb,
            import_intensity: settings.import_intensity,
        }
    }

    /// Transforms one point.
    ///
    /// # Examples
    ///
    /// ```
    /// use pcconvert::{ImportSettings, Point, TransformPipeline, Vector};
    ///
    /// let mut settings = ImportSettings::default();
    /// settings.scale = Some(2.);
    /// settings.swap_yz = true;
    /// let pipeline = TransformPipeline::new(&settings, Vector::new(1., 1., 1.));
    /// let point = pipeline.apply(Point { x: 2., y: 3., z: 4., ..Default::default() });
    /// assert_eq!((2., 6., 4.), (point.x, point.y, point.z));
    /// ```
    pub fn apply(&self, point: Point) -> Point {
        let mut x = point.x - self.offset.x;
        let mut y = point.y - self.offset.y;
        let mut z = point.z - self.offset.z;
        if let Some(scale) = self.scale {
            x *= scale;
            y *= scale;
            z *= scale;
        }
        if self.swap_yz {
            std::mem::swap(&mut y, &mut z);
        }
        if self.invert_z {
            z = -z;
        }
        if self.invert_x {
            x = -x;
        }
        let color = self.resolve_color(&point);
        Point {
            x,
            y,
            z,
            intensity: point.intensity,
            color: Some(color),
            gps_time: point.gps_time,
        }
    }

    fn resolve_color(&self, point: &Point) -> Color {
        if self.import_rgb {
            if let Some(color) = point.color {
                return color;
            }
        }
        if self.import_intensity {
            let n = point.intensity;
            return Color::new(n, n, n);
        }
        Color::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f64, y: f64, z: f64) -> Point {
        Point {
            x,
            y,
            z,
            ..Default::default()
        }
    }

    fn xyz(point: &Point) -> (f64, f64, f64) {
        (point.x, point.y, point.z)
    }

    #[test]
    fn offset_before_scale() {
        let mut settings = ImportSettings::default();
        settings.scale = Some(10.);
        let pipeline = TransformPipeline::new(&settings, Vector::new(1., 2., 3.));
        assert_eq!((10., 10., 10.), xyz(&pipeline.apply(point(2., 3., 4.))));
    }

    #[test]
    fn swap_before_invert_z() {
        let mut settings = ImportSettings::default();
        settings.swap_yz = true;
        settings.invert_z = true;
        let pipeline = TransformPipeline::new(&settings, Vector::default());
        // y and z trade places, then the new z (the old y) is negated
        assert_eq!((1., 3., -2.), xyz(&pipeline.apply(point(1., 2., 3.))));
    }

    #[test]
    fn full_composition() {
        let mut settings = ImportSettings::default();
        settings.scale = Some(2.);
        settings.swap_yz = true;
        settings.invert_z = true;
        settings.invert_x = true;
        let pipeline = TransformPipeline::new(&settings, Vector::new(1., 1., 1.));
        // (5, 3, 2) -> offset (4, 2, 1) -> scale (8, 4, 2) -> swap (8, 2, 4)
        // -> invert z (8, 2, -4) -> invert x (-8, 2, -4)
        assert_eq!((-8., 2., -4.), xyz(&pipeline.apply(point(5., 3., 2.))));
    }

    #[test]
    fn intensity_replicates_when_rgb_is_off() {
        let mut settings = ImportSettings::default();
        settings.import_rgb = false;
        settings.import_intensity = true;
        let pipeline = TransformPipeline::new(&settings, Vector::default());
        let transformed = pipeline.apply(Point {
            intensity: 700,
            color: Some(Color::new(1, 2, 3)),
            ..Default::default()
        });
        assert_eq!(Some(Color::new(700, 700, 700)), transformed.color);
    }

    #[test]
    fn missing_color_falls_back_to_intensity() {
        let mut settings = ImportSettings::default();
        settings.import_rgb = true;
        settings.import_intensity = true;
        let pipeline = TransformPipeline::new(&settings, Vector::default());
        let transformed = pipeline.apply(Point {
            intensity: 9,
            color: None,
            ..Default::default()
        });
        assert_eq!(Some(Color::new(9, 9, 9)), transformed.color);
    }

    #[test]
    fn colorless_point_gets_zero_color() {
        let settings = ImportSettings::default();
        let pipeline = TransformPipeline::new(&settings, Vector::default());
        let transformed = pipeline.apply(Point::default());
        assert_eq!(Some(Color::default()), transformed.color);
    }
}
