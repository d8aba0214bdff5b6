use ndarray::Array2;

use crate::shared::frame::Frame;

/// Summed-area tables of a frame's intensities and squared intensities.
///
/// Both planes are `(height + 1) x (width + 1)` with a zero first row and
/// column, so `sum[[y, x]]` covers every pixel above and left of `(x, y)`.
#[derive(Clone, Debug)]
pub struct IntegralImage {
    sum: Array2<f64>,
    sq_sum: Array2<f64>,
    width: u32,
    height: u32,
}

impl IntegralImage {
    pub fn from_frame(frame: &Frame) -> Self {
        let w = frame.width() as usize;
        let h = frame.height() as usize;
        let pixels = frame.as_ndarray();
        let mut sum = Array2::<f64>::zeros((h + 1, w + 1));
        let mut sq_sum = Array2::<f64>::zeros((h + 1, w + 1));

        for y in 0..h {
            let mut row = 0.0;
            let mut sq_row = 0.0;
            for x in 0..w {
                let v = pixels[[y, x]] as f64;
                row += v;
                sq_row += v * v;
                sum[[y + 1, x + 1]] = sum[[y, x + 1]] + row;
                sq_sum[[y + 1, x + 1]] = sq_sum[[y, x + 1]] + sq_row;
            }
        }

        Self {
            sum,
            sq_sum,
            width: frame.width(),
            height: frame.height(),
        }
    }

    /// Width of the source frame (the planes are one wider).
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Sum of intensities in `[x, x + w) x [y, y + h)`. The rectangle must lie
    /// inside the frame.
    pub fn rect_sum(&self, x: i32, y: i32, w: i32, h: i32) -> f64 {
        Self::lookup(&self.sum, x, y, w, h)
    }

    pub fn sq_rect_sum(&self, x: i32, y: i32, w: i32, h: i32) -> f64 {
        Self::lookup(&self.sq_sum, x, y, w, h)
    }

    /// Standard deviation of the window's intensities, or 1.0 for a flat
    /// window so thresholds stay meaningful.
    pub fn std_dev(&self, x: i32, y: i32, w: i32, h: i32) -> f64 {
        let area = w as f64 * h as f64;
        if area <= 0.0 {
            return 1.0;
        }
        let mean = self.rect_sum(x, y, w, h) / area;
        let variance = self.sq_rect_sum(x, y, w, h) / area - mean * mean;
        if variance > 0.0 {
            variance.sqrt()
        } else {
            1.0
        }
    }

    /// Mean intensity of the whole frame.
    pub fn frame_mean(&self) -> f64 {
        let area = self.width as f64 * self.height as f64;
        if area <= 0.0 {
            return 0.0;
        }
        self.sum[[self.height as usize, self.width as usize]] / area
    }

    /// Both planes as `f32`, row-major: the sum plane, then the squared
    /// deviations from [`frame_mean`](Self::frame_mean). This is the layout
    /// the scan kernel reads.
    ///
    /// Centering keeps the second plane near `area * variance` instead of
    /// `area * 255^2`, so `sq / area - mean^2` does not cancel away in f32.
    pub fn to_f32_planes(&self) -> Vec<f32> {
        let m = self.frame_mean();
        let centered = self.sq_sum.indexed_iter().map(|((y, x), &sq)| {
            let prefix_area = (y * x) as f64;
            sq - 2.0 * m * self.sum[[y, x]] + m * m * prefix_area
        });
        self.sum
            .iter()
            .map(|&v| v as f32)
            .chain(centered.map(|v| v as f32))
            .collect()
    }

    pub fn plane_len(&self) -> usize {
        self.sum.len()
    }

    fn lookup(plane: &Array2<f64>, x: i32, y: i32, w: i32, h: i32) -> f64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = ((x + w) as usize, (y + h) as usize);
        plane[[y1, x1]] - plane[[y0, x1]] - plane[[y1, x0]] + plane[[y0, x0]]
    }
}
