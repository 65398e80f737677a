//! Generic `FrameSource` trait for the live video surface detectors read.

use avatar_types::AvatarError;

/// A raw image frame handed to the detectors.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Raw pixel data (e.g. RGBA8).
    pub data: Vec<u8>,
}

/// A live, video-like surface (webcam element, capture device, …).
pub trait FrameSource: Send {
    /// Stable identifier for this source, e.g. `"webcam"`.
    fn id(&self) -> &str;

    /// `true` once the source delivers full frames. Detection is skipped for
    /// any tick where this is `false`.
    fn is_ready(&self) -> bool;

    /// Current frame width and height in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Grab the current frame.
    ///
    /// # Errors
    ///
    /// Returns [`AvatarError::FrameUnavailable`] if no frame can be read even
    /// though the source claimed to be ready.
    fn capture(&mut self) -> Result<Frame, AvatarError>;
}
