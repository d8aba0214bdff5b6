use ndarray::ArrayView2;

/// A single intensity frame: one byte per pixel in row-major order.
///
/// Color conversion happens before frames reach this crate; the scan only
/// needs random read access to intensities.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize),
            "data length must equal width * height"
        );
        Self {
            data,
            width,
            height,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// True when the frame has no pixels to scan.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }

    pub fn as_ndarray(&self) -> ArrayView2<'_, u8> {
        ArrayView2::from_shape((self.height as usize, self.width as usize), &self.data)
            .expect("Frame data length must match dimensions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 6]; // 3x2
        let frame = Frame::new(data.clone(), 3, 2, 5);
        assert_eq!(frame.width(), 3);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.index(), 5);
        assert_eq!(frame.data(), &data[..]);
        assert!(!frame.is_empty());
    }

    #[test]
    fn test_zero_sized_frame_is_empty() {
        let frame = Frame::new(Vec::new(), 0, 0, 0);
        assert!(frame.is_empty());
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height")]
    fn test_mismatched_data_length_panics_in_debug() {
        Frame::new(vec![0u8; 5], 2, 2, 0);
    }

    #[test]
    fn test_as_ndarray_shape_and_access() {
        let frame = Frame::new(vec![1, 2, 3, 4, 5, 6], 3, 2, 0);
        let arr = frame.as_ndarray();
        assert_eq!(arr.shape(), &[2, 3]); // (height, width)
        assert_eq!(arr[[1, 2]], 6);
    }
}
