#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SiftError {
    /// The deepest requested octave would be smaller than one pixel.
    #[error(
        "image of {width}x{height} is too small for {num_octaves} octaves (both sides must be at least {min_size})"
    )]
    InputTooSmall {
        width: usize,
        height: usize,
        num_octaves: usize,
        min_size: usize,
    },
    #[error("pixel buffer must not be empty, got shape [{rows}, {cols}, {channels}]")]
    EmptyImage {
        rows: usize,
        cols: usize,
        channels: usize,
    },
    #[error("expected a grayscale or RGB image, got {0} channels")]
    UnsupportedChannels(usize),
    #[error("Illegal parameter: {0}")]
    InvalidParameter(String),
    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, SiftError>;
