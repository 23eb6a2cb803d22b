//! DRM file format specification.
//!
//! `DrmFormat` is the single source of truth for the magic signature and the
//! file extensions used by the monolithic and split variants.
//!
//! # Example
//!
//! ```
//! use drm_common::DRM_FORMAT;
//!
//! assert_eq!(DRM_FORMAT.magic, b"DRM");
//! assert_eq!(DRM_FORMAT.binary_ext, "drm");
//! assert_eq!(DRM_FORMAT.json_ext, "jdrm");
//! ```

/// DRM format specification.
#[derive(Debug, Clone, Copy)]
pub struct DrmFormat {
    /// Magic bytes at the start of a monolithic binary file (3 bytes)
    pub magic: &'static [u8; 3],

    /// Monolithic binary extension without dot
    pub binary_ext: &'static str,

    /// Split JSON metadata extension without dot
    pub json_ext: &'static str,

    /// Extension of the sibling chunk file written next to a split model
    pub sidecar_ext: &'static str,
}

impl DrmFormat {
    pub const fn new(
        magic: &'static [u8; 3],
        binary_ext: &'static str,
        json_ext: &'static str,
        sidecar_ext: &'static str,
    ) -> Self {
        Self {
            magic,
            binary_ext,
            json_ext,
            sidecar_ext,
        }
    }

    /// Check whether `bytes` start with the DRM signature
    pub fn has_magic(&self, bytes: &[u8]) -> bool {
        bytes.len() >= self.magic.len() && &bytes[..self.magic.len()] == self.magic
    }
}

/// DRM format constants.
pub const DRM_FORMAT: DrmFormat = DrmFormat::new(b"DRM", "drm", "jdrm", "bin");
