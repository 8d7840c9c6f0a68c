//! Host-side image and filter containers.
//!
//! Both types are dense row-major `f32` buffers.  The crate only ever reads
//! or writes them through device-memory mirrors; allocation and lifetime
//! stay with the caller.

/// A dense row-major image of shape `(height, width, channels)`.
///
/// The flat index of sample `(y, x, c)` is `(y * width + x) * channels + c`.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub data: Vec<f32>,
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl Image {
    /// Wrap an existing buffer.  Panics if the length does not match the
    /// shape; shape bugs at this boundary are programmer errors, not
    /// runtime conditions.
    pub fn new(data: Vec<f32>, height: usize, width: usize, channels: usize) -> Self {
        assert_eq!(
            data.len(),
            height * width * channels,
            "image buffer length does not match shape ({height}, {width}, {channels})"
        );
        Self {
            data,
            height,
            width,
            channels,
        }
    }

    /// An image with every sample set to `value`.
    pub fn filled(height: usize, width: usize, channels: usize, value: f32) -> Self {
        Self {
            data: vec![value; height * width * channels],
            height,
            width,
            channels,
        }
    }

    /// Sample at `(y, x, c)`.
    pub fn at(&self, y: usize, x: usize, c: usize) -> f32 {
        self.data[(y * self.width + x) * self.channels + c]
    }

    /// Total number of samples.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A square `K x K` convolution mask, read-only for the duration of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub data: Vec<f32>,
    pub size: usize,
}

impl Filter {
    /// Wrap an existing row-major mask.  Panics on a length mismatch.
    pub fn new(data: Vec<f32>, size: usize) -> Self {
        assert_eq!(
            data.len(),
            size * size,
            "filter buffer length does not match size {size}"
        );
        Self { data, size }
    }

    /// A mask with every weight set to `value`.
    pub fn filled(size: usize, value: f32) -> Self {
        Self {
            data: vec![value; size * size],
            size,
        }
    }

    /// Weight at row `m`, column `n`.
    pub fn at(&self, m: usize, n: usize) -> f32 {
        self.data[m * self.size + n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_indexing_is_row_major() {
        let mut data = vec![0.0; 2 * 3 * 2];
        // (y=1, x=2, c=1) -> (1*3 + 2)*2 + 1 = 11
        data[11] = 7.0;
        let img = Image::new(data, 2, 3, 2);
        assert_eq!(img.at(1, 2, 1), 7.0);
        assert_eq!(img.at(0, 0, 0), 0.0);
    }

    #[test]
    fn filled_image_has_uniform_samples() {
        let img = Image::filled(4, 5, 3, 2.5);
        assert_eq!(img.len(), 60);
        assert!(img.data.iter().all(|&v| v == 2.5));
    }

    #[test]
    #[should_panic(expected = "does not match shape")]
    fn image_shape_mismatch_panics() {
        Image::new(vec![0.0; 5], 2, 3, 1);
    }

    #[test]
    fn filter_indexing() {
        let f = Filter::new((0..9).map(|i| i as f32).collect(), 3);
        assert_eq!(f.at(0, 0), 0.0);
        assert_eq!(f.at(1, 2), 5.0);
        assert_eq!(f.at(2, 2), 8.0);
    }
}
