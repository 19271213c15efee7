//! Face alignment via 4-DOF similarity transform.
//!
//! Warps a detected face into a canonical 112×112 RGB crop using five
//! reference points and least-squares estimation. The same warp, with a pure
//! scale + translation matrix, produces the square crops fed to the landmark
//! network.

use image::{Rgb, RgbImage};

/// Reference positions of the five alignment points in a 112×112 crop.
pub(crate) const REFERENCE_POINTS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose tip
    (41.5493, 92.3655), // left mouth corner
    (70.7299, 92.2041), // right mouth corner
];

pub const ALIGNED_SIZE: u32 = 112;

/// 2×3 similarity matrix `[a, -b, tx, b, a, ty]` mapping source pixels to output pixels.
pub(crate) type SimilarityMatrix = [f32; 6];

/// Estimate the similarity transform taking `src` points onto `dst` (least squares).
fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> SimilarityMatrix {
    // Overdetermined system A * [a, b, tx, ty]^T = B, two rows per point:
    //   sx * a - sy * b + tx = dx
    //   sy * a + sx * b + ty = dy
    let mut ata = [0.0f32; 16];
    let mut atb = [0.0f32; 4];

    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        let r1 = [sx, -sy, 1.0, 0.0];
        let r2 = [sy, sx, 0.0, 1.0];

        for j in 0..4 {
            for k in 0..4 {
                ata[j * 4 + k] += r1[j] * r1[k] + r2[j] * r2[k];
            }
            atb[j] += r1[j] * dx + r2[j] * dy;
        }
    }

    let [a, b, tx, ty] = solve_4x4(&ata, &atb);
    [a, -b, tx, b, a, ty]
}

/// Gaussian elimination with partial pivoting on the 4×4 normal equations.
#[allow(clippy::needless_range_loop)]
fn solve_4x4(ata: &[f32; 16], atb: &[f32; 4]) -> [f32; 4] {
    let mut m = [[0.0f32; 5]; 4];
    for i in 0..4 {
        for j in 0..4 {
            m[i][j] = ata[i * 4 + j];
        }
        m[i][4] = atb[i];
    }

    for col in 0..4 {
        let mut max_row = col;
        let mut max_val = m[col][col].abs();
        for row in (col + 1)..4 {
            if m[row][col].abs() > max_val {
                max_val = m[row][col].abs();
                max_row = row;
            }
        }
        m.swap(col, max_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            // Degenerate points (all coincident): identity scale, no shift.
            return [1.0, 0.0, 0.0, 0.0];
        }

        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        x[i] = m[i][4];
        for j in (i + 1)..4 {
            x[i] -= m[i][j] * x[j];
        }
        x[i] /= m[i][i];
    }

    x
}

/// Warp `image` through `matrix` into an `out_size`×`out_size` crop.
///
/// Bilinear sampling per channel; pixels mapped from outside the source are black.
pub(crate) fn warp_affine(image: &RgbImage, matrix: &SimilarityMatrix, out_size: u32) -> RgbImage {
    let (a, tx) = (matrix[0], matrix[2]);
    let (b, ty) = (matrix[3], matrix[5]);

    let mut output = RgbImage::new(out_size, out_size);

    // Inverse of [[a, -b], [b, a]] is [[a, b], [-b, a]] / (a^2 + b^2).
    let det = a * a + b * b;
    if det.abs() < 1e-12 {
        return output;
    }
    let ia = a / det;
    let ib = b / det;

    let (src_w, src_h) = (image.width() as i64, image.height() as i64);
    let sample = |x: i64, y: i64, c: usize| -> f32 {
        if x >= 0 && x < src_w && y >= 0 && y < src_h {
            image.get_pixel(x as u32, y as u32)[c] as f32
        } else {
            0.0
        }
    };

    for (ox, oy, pixel) in output.enumerate_pixels_mut() {
        let dx = ox as f32 - tx;
        let dy = oy as f32 - ty;
        let sx = ia * dx + ib * dy;
        let sy = -ib * dx + ia * dy;

        let x0 = sx.floor() as i64;
        let y0 = sy.floor() as i64;
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;

        let mut rgb = [0u8; 3];
        for (c, out) in rgb.iter_mut().enumerate() {
            let val = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1, c) * fx * fy;
            *out = val.round().clamp(0.0, 255.0) as u8;
        }
        *pixel = Rgb(rgb);
    }

    output
}

/// Matrix cropping the square of side `side` whose top-left corner is
/// `(left, top)` and scaling it to `out_size`.
pub(crate) fn crop_matrix(left: f32, top: f32, side: f32, out_size: u32) -> SimilarityMatrix {
    let s = out_size as f32 / side;
    [s, 0.0, -s * left, 0.0, s, -s * top]
}

/// Align a face to the canonical 112×112 crop from its five alignment points.
pub fn align_face(image: &RgbImage, points: &[(f32, f32); 5]) -> RgbImage {
    let matrix = estimate_similarity_transform(points, &REFERENCE_POINTS_112);
    warp_affine(image, &matrix, ALIGNED_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let pts = REFERENCE_POINTS_112;
        let m = estimate_similarity_transform(&pts, &pts);

        assert!((m[0] - 1.0).abs() < 1e-4, "a = {}", m[0]);
        assert!(m[1].abs() < 1e-4, "-b = {}", m[1]);
        assert!(m[2].abs() < 1e-3, "tx = {}", m[2]);
        assert!(m[3].abs() < 1e-4, "b = {}", m[3]);
        assert!((m[4] - 1.0).abs() < 1e-4, "a2 = {}", m[4]);
        assert!(m[5].abs() < 1e-3, "ty = {}", m[5]);
    }

    #[test]
    fn test_scaled_transform() {
        // Points at 2x the reference scale → a ≈ 0.5
        let src: [(f32, f32); 5] = [
            (76.5892, 103.3926),
            (147.0636, 103.0028),
            (112.0504, 143.4732),
            (83.0986, 184.7310),
            (141.4598, 184.4082),
        ];
        let m = estimate_similarity_transform(&src, &REFERENCE_POINTS_112);
        assert!((m[0] - 0.5).abs() < 0.05, "a = {}, expected ~0.5", m[0]);
    }

    #[test]
    fn test_degenerate_points_do_not_panic() {
        let src = [(5.0f32, 5.0f32); 5];
        let image = RgbImage::from_pixel(20, 20, Rgb([200, 200, 200]));
        let aligned = align_face(&image, &src);
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
    }

    #[test]
    fn test_align_face_output_size() {
        let image = RgbImage::from_pixel(640, 480, Rgb([128, 128, 128]));
        let aligned = align_face(&image, &REFERENCE_POINTS_112);
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
    }

    #[test]
    fn test_crop_matrix_maps_corners() {
        let m = crop_matrix(10.0, 20.0, 50.0, 100);
        // (10, 20) → (0, 0), (60, 70) → (100, 100)
        assert!((m[0] * 10.0 + m[2]).abs() < 1e-4);
        assert!((m[4] * 20.0 + m[5]).abs() < 1e-4);
        assert!((m[0] * 60.0 + m[2] - 100.0).abs() < 1e-4);
        assert!((m[4] * 70.0 + m[5] - 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_crop_outside_image_is_black() {
        let image = RgbImage::from_pixel(10, 10, Rgb([255, 255, 255]));
        let m = crop_matrix(100.0, 100.0, 10.0, 8);
        let out = warp_affine(&image, &m, 8);
        assert!(out.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_warp_keeps_colour_channels_apart() {
        let image = RgbImage::from_pixel(32, 32, Rgb([200, 50, 10]));
        let m = crop_matrix(8.0, 8.0, 16.0, 16);
        let out = warp_affine(&image, &m, 16);
        assert_eq!(out.get_pixel(8, 8).0, [200, 50, 10]);
    }

    #[test]
    fn test_eye_lands_on_reference() {
        // A bright patch at the left-eye point should land near the reference left eye.
        let mut image = RgbImage::new(200, 200);
        let src: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];
        for dy in 0..5u32 {
            for dx in 0..5u32 {
                image.put_pixel(78 + dx, 58 + dy, Rgb([255, 255, 255]));
            }
        }

        let aligned = align_face(&image, &src);

        let ref_x = REFERENCE_POINTS_112[0].0.round() as u32;
        let ref_y = REFERENCE_POINTS_112[0].1.round() as u32;
        let mut max_val = 0u8;
        for y in ref_y - 1..=ref_y + 1 {
            for x in ref_x - 1..=ref_x + 1 {
                max_val = max_val.max(aligned.get_pixel(x, y)[0]);
            }
        }
        assert!(max_val > 100, "expected bright patch near ({ref_x}, {ref_y}), max={max_val}");
    }
}
