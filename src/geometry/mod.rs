//! Sampling helpers for exercising camera models over their image and
//! normalized-plane domains.

use crate::camera::Resolution;
use nalgebra::{Matrix2xX, Vector2};

/// Generate a grid of sample pixels evenly distributed across the image.
///
/// The image is split into roughly `n` cells of similar aspect ratio and the
/// center of every cell is returned, one column per pixel.
pub fn sample_points(resolution: &Resolution, n: usize) -> Matrix2xX<f64> {
    let width = resolution.width as f64;
    let height = resolution.height as f64;

    let num_cells_x = ((n as f64 * (width / height)).sqrt().round() as usize).max(1);
    let num_cells_y = ((n as f64 * (height / width)).sqrt().round() as usize).max(1);

    let cell_width = width / num_cells_x as f64;
    let cell_height = height / num_cells_y as f64;

    let mut points = Matrix2xX::zeros(num_cells_x * num_cells_y);
    for i in 0..num_cells_y {
        for j in 0..num_cells_x {
            let x = (j as f64 + 0.5) * cell_width;
            let y = (i as f64 + 0.5) * cell_height;
            points.set_column(i * num_cells_x + j, &Vector2::new(x, y));
        }
    }
    points
}

/// Square grid of `steps x steps` normalized image-plane points spanning
/// `[-half_extent, half_extent]` on both axes.
pub fn sample_normalized_points(half_extent: f64, steps: usize) -> Matrix2xX<f64> {
    if steps < 2 {
        return Matrix2xX::zeros(steps);
    }
    let step = 2.0 * half_extent / (steps - 1) as f64;
    Matrix2xX::from_fn(steps * steps, |row, col| {
        let (i, j) = (col / steps, col % steps);
        match row {
            0 => -half_extent + j as f64 * step,
            _ => -half_extent + i as f64 * step,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sample_points() {
        let resolution = Resolution {
            width: 800,
            height: 600,
        };
        let n = 100;

        let points = sample_points(&resolution, n);

        // Rounding the cell counts makes the total approximate.
        let expected_count = (n as f64 * 0.8) as usize..=(n as f64 * 1.2) as usize;
        assert!(
            expected_count.contains(&points.ncols()),
            "Expected around {} points, got {}",
            n,
            points.ncols()
        );

        for point in points.column_iter() {
            assert!(point[0] > 0.0 && point[0] < 800.0, "x outside image: {}", point[0]);
            assert!(point[1] > 0.0 && point[1] < 600.0, "y outside image: {}", point[1]);
        }
    }

    #[test]
    fn test_sample_points_tiny_request() {
        let resolution = Resolution {
            width: 10,
            height: 1000,
        };
        let points = sample_points(&resolution, 1);
        assert_eq!(points.ncols(), 10);
        for point in points.column_iter() {
            assert_relative_eq!(point[0], 5.0);
        }
    }

    #[test]
    fn test_sample_normalized_points() {
        let points = sample_normalized_points(0.5, 3);
        assert_eq!(points.ncols(), 9);
        assert_relative_eq!(points.column(0).into_owned(), Vector2::new(-0.5, -0.5));
        assert_relative_eq!(points.column(4).into_owned(), Vector2::new(0.0, 0.0));
        assert_relative_eq!(points.column(5).into_owned(), Vector2::new(0.5, 0.0));
        assert_relative_eq!(points.column(8).into_owned(), Vector2::new(0.5, 0.5));

        assert_eq!(sample_normalized_points(1.0, 1).ncols(), 1);
    }
}
