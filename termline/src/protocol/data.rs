//! Data frame header.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ Base header: Type=0x00, Frame Length, Session ID                 │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ Channel ID (4) │ Term ID (4) │ Sequence Number (4)               │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ payload ... (Frame Length - 24 bytes)                            │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

use crate::types::{ChannelId, SessionId, TermId};

use super::header::{
    CHANNEL_ID_OFFSET, CURRENT_VERSION, FLAGS_OFFSET, FRAME_LENGTH_OFFSET, HDR_TYPE_DATA,
    HeaderError, SESSION_ID_OFFSET, TERM_ID_OFFSET, TYPE_OFFSET, VERSION_OFFSET, check_len,
    get_u16, get_u32, put_base, put_u32,
};

const SEQUENCE_NUMBER_OFFSET: usize = 20;

/// Length of the data header preceding the payload.
pub const DATA_HEADER_LENGTH: usize = 24;

/// Decoded fixed fields of an inbound data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    session_id: SessionId,
    channel_id: ChannelId,
    term_id: TermId,
    sequence_number: u32,
    frame_length: u32,
    flags: u8,
}

impl DataHeader {
    #[must_use]
    pub const fn new(
        session_id: SessionId,
        channel_id: ChannelId,
        term_id: TermId,
        sequence_number: u32,
    ) -> Self {
        Self {
            session_id,
            channel_id,
            term_id,
            sequence_number,
            frame_length: DATA_HEADER_LENGTH as u32,
            flags: 0,
        }
    }

    /// Reads the header from the start of a datagram.
    ///
    /// # Errors
    ///
    /// Fails if the datagram is shorter than [`DATA_HEADER_LENGTH`], is not a
    /// data frame, or carries a protocol version this build does not speak.
    pub fn decode(bytes: &[u8]) -> Result<Self, HeaderError> {
        check_len(bytes, DATA_HEADER_LENGTH)?;

        let frame_type = get_u16(bytes, TYPE_OFFSET);
        if frame_type != HDR_TYPE_DATA {
            return Err(HeaderError::UnexpectedType(frame_type));
        }
        let version = bytes[VERSION_OFFSET];
        if version != CURRENT_VERSION {
            return Err(HeaderError::UnsupportedVersion(version));
        }

        Ok(Self {
            session_id: SessionId::from(get_u32(bytes, SESSION_ID_OFFSET)),
            channel_id: ChannelId::from(get_u32(bytes, CHANNEL_ID_OFFSET)),
            term_id: TermId::from(get_u32(bytes, TERM_ID_OFFSET)),
            sequence_number: get_u32(bytes, SEQUENCE_NUMBER_OFFSET),
            frame_length: get_u32(bytes, FRAME_LENGTH_OFFSET),
            flags: bytes[FLAGS_OFFSET],
        })
    }

    /// Writes the header into `bytes`, e.g. for a test publisher.
    ///
    /// `frame_length` is written as the header length plus `payload_len`.
    ///
    /// # Errors
    ///
    /// Fails if `bytes` is shorter than [`DATA_HEADER_LENGTH`].
    pub fn encode(&self, bytes: &mut [u8], payload_len: u32) -> Result<usize, HeaderError> {
        check_len(bytes, DATA_HEADER_LENGTH)?;
        put_base(
            bytes,
            HDR_TYPE_DATA,
            self.flags,
            DATA_HEADER_LENGTH as u32 + payload_len,
        );
        put_u32(bytes, SESSION_ID_OFFSET, self.session_id.as_u32());
        put_u32(bytes, CHANNEL_ID_OFFSET, self.channel_id.as_u32());
        put_u32(bytes, TERM_ID_OFFSET, self.term_id.as_u32());
        put_u32(bytes, SEQUENCE_NUMBER_OFFSET, self.sequence_number);
        Ok(DATA_HEADER_LENGTH)
    }

    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub const fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    #[must_use]
    pub const fn term_id(&self) -> TermId {
        self.term_id
    }

    #[must_use]
    pub const fn sequence_number(&self) -> u32 {
        self.sequence_number
    }

    /// Header plus payload length as declared by the sender.
    #[must_use]
    pub const fn frame_length(&self) -> u32 {
        self.frame_length
    }

    #[must_use]
    pub const fn flags(&self) -> u8 {
        self.flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::header::{HDR_TYPE_SM, put_u16};

    #[test]
    fn decode_reads_identifiers_at_fixed_offsets() {
        let mut bytes = [0u8; 32];
        bytes[4..8].copy_from_slice(&32u32.to_le_bytes());
        bytes[8..12].copy_from_slice(&42u32.to_le_bytes());
        bytes[12..16].copy_from_slice(&7u32.to_le_bytes());
        bytes[16..20].copy_from_slice(&1u32.to_le_bytes());
        bytes[20..24].copy_from_slice(&1024u32.to_le_bytes());

        let header = DataHeader::decode(&bytes).unwrap();
        assert_eq!(header.session_id(), SessionId::new(42));
        assert_eq!(header.channel_id(), ChannelId::new(7));
        assert_eq!(header.term_id(), TermId::new(1));
        assert_eq!(header.sequence_number(), 1024);
        assert_eq!(header.frame_length(), 32);
    }

    #[test]
    fn encode_declares_payload_in_frame_length() {
        let header = DataHeader::new(SessionId::new(1), ChannelId::new(2), TermId::new(3), 0);
        let mut bytes = [0u8; DATA_HEADER_LENGTH];
        assert_eq!(header.encode(&mut bytes, 100), Ok(DATA_HEADER_LENGTH));

        let decoded = DataHeader::decode(&bytes).unwrap();
        assert_eq!(decoded.frame_length(), DATA_HEADER_LENGTH as u32 + 100);
        assert_eq!(decoded.channel_id(), ChannelId::new(2));
    }

    #[test]
    fn decode_rejects_truncated_header() {
        assert_eq!(
            DataHeader::decode(&[0u8; 20]),
            Err(HeaderError::BufferTooSmall {
                need: DATA_HEADER_LENGTH,
                have: 20
            })
        );
    }

    #[test]
    fn decode_rejects_control_frame() {
        let mut bytes = [0u8; DATA_HEADER_LENGTH];
        put_u16(&mut bytes, TYPE_OFFSET, HDR_TYPE_SM);
        assert_eq!(
            DataHeader::decode(&bytes),
            Err(HeaderError::UnexpectedType(HDR_TYPE_SM))
        );
    }

    #[test]
    fn decode_rejects_future_version() {
        let mut bytes = [0u8; DATA_HEADER_LENGTH];
        bytes[VERSION_OFFSET] = 9;
        assert_eq!(
            DataHeader::decode(&bytes),
            Err(HeaderError::UnsupportedVersion(9))
        );
    }
}
