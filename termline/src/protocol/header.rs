//! Base header fields and frame classification.

use thiserror::Error;

/// Protocol version written into every outbound frame.
pub const CURRENT_VERSION: u8 = 0x00;

pub const HDR_TYPE_DATA: u16 = 0x00;
pub const HDR_TYPE_NAK: u16 = 0x02;
pub const HDR_TYPE_SM: u16 = 0x03;
pub const HDR_TYPE_ERR: u16 = 0x04;

pub(crate) const VERSION_OFFSET: usize = 0;
pub(crate) const FLAGS_OFFSET: usize = 1;
pub(crate) const TYPE_OFFSET: usize = 2;
pub(crate) const FRAME_LENGTH_OFFSET: usize = 4;
pub(crate) const SESSION_ID_OFFSET: usize = 8;
pub(crate) const CHANNEL_ID_OFFSET: usize = 12;
pub(crate) const TERM_ID_OFFSET: usize = 16;

/// Version, flags, type, frame length and session id.
pub const BASE_HEADER_LENGTH: usize = 12;

/// Errors decoding an inbound header.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },
    #[error("unexpected frame type 0x{0:04x}")]
    UnexpectedType(u16),
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
}

/// How the RX loop routes a datagram, decided from the type field alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    /// Data frame, handed to `on_data_frame`.
    Data,
    /// Anything else (SM, NAK, ERR, unknown), handed to `on_control_frame`.
    Control(u16),
}

impl FrameClass {
    /// Classifies a datagram by its type field.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError::BufferTooSmall`] when the base header is truncated.
    pub fn classify(bytes: &[u8]) -> Result<Self, HeaderError> {
        check_len(bytes, BASE_HEADER_LENGTH)?;
        Ok(match get_u16(bytes, TYPE_OFFSET) {
            HDR_TYPE_DATA => Self::Data,
            other => Self::Control(other),
        })
    }
}

pub(crate) fn check_len(bytes: &[u8], need: usize) -> Result<(), HeaderError> {
    if bytes.len() < need {
        return Err(HeaderError::BufferTooSmall {
            need,
            have: bytes.len(),
        });
    }
    Ok(())
}

// Readers assume `check_len` already covered the field.

pub(crate) fn get_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

pub(crate) fn get_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(arr)
}

pub(crate) fn put_u16(bytes: &mut [u8], offset: usize, v: u16) {
    bytes[offset..offset + 2].copy_from_slice(&v.to_le_bytes());
}

pub(crate) fn put_u32(bytes: &mut [u8], offset: usize, v: u32) {
    bytes[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
}

/// Writes the fields shared by every frame kind.
pub(crate) fn put_base(bytes: &mut [u8], frame_type: u16, flags: u8, frame_length: u32) {
    bytes[VERSION_OFFSET] = CURRENT_VERSION;
    bytes[FLAGS_OFFSET] = flags;
    put_u16(bytes, TYPE_OFFSET, frame_type);
    put_u32(bytes, FRAME_LENGTH_OFFSET, frame_length);
}
