//! Status Message: receiver reports progress and advertises its window.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ Base header: Type=0x03, Frame Length=28, Flags=0, Session ID     │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ Channel ID (4) │ Term ID (4)                                     │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ Highest Contiguous Sequence Number (4) │ Receiver Window (4)     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

use crate::types::{ChannelId, SessionId, TermId};

use super::header::{
    CHANNEL_ID_OFFSET, CURRENT_VERSION, HDR_TYPE_SM, HeaderError, SESSION_ID_OFFSET,
    TERM_ID_OFFSET, TYPE_OFFSET, VERSION_OFFSET, check_len, get_u16, get_u32, put_base, put_u32,
};

const HIGHEST_CONTIGUOUS_SEQUENCE_NUMBER_OFFSET: usize = 20;
const RECEIVER_WINDOW_OFFSET: usize = 24;

/// Fixed length of every status message.
pub const STATUS_MESSAGE_LENGTH: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMessage {
    pub session_id: SessionId,
    pub channel_id: ChannelId,
    pub term_id: TermId,
    pub highest_contiguous_sequence_number: u32,
    pub receiver_window: u32,
}

impl StatusMessage {
    /// Overwrites `buf` from offset 0. Flags are always zero.
    pub fn encode_into(&self, buf: &mut [u8; STATUS_MESSAGE_LENGTH]) {
        put_base(buf, HDR_TYPE_SM, 0, STATUS_MESSAGE_LENGTH as u32);
        put_u32(buf, SESSION_ID_OFFSET, self.session_id.as_u32());
        put_u32(buf, CHANNEL_ID_OFFSET, self.channel_id.as_u32());
        put_u32(buf, TERM_ID_OFFSET, self.term_id.as_u32());
        put_u32(
            buf,
            HIGHEST_CONTIGUOUS_SEQUENCE_NUMBER_OFFSET,
            self.highest_contiguous_sequence_number,
        );
        put_u32(buf, RECEIVER_WINDOW_OFFSET, self.receiver_window);
    }

    /// Reads a status message, as a publisher would.
    ///
    /// # Errors
    ///
    /// Fails on truncation, a non-SM type or an unknown version.
    pub fn decode(bytes: &[u8]) -> Result<Self, HeaderError> {
        check_len(bytes, STATUS_MESSAGE_LENGTH)?;

        let frame_type = get_u16(bytes, TYPE_OFFSET);
        if frame_type != HDR_TYPE_SM {
            return Err(HeaderError::UnexpectedType(frame_type));
        }
        if bytes[VERSION_OFFSET] != CURRENT_VERSION {
            return Err(HeaderError::UnsupportedVersion(bytes[VERSION_OFFSET]));
        }

        Ok(Self {
            session_id: SessionId::from(get_u32(bytes, SESSION_ID_OFFSET)),
            channel_id: ChannelId::from(get_u32(bytes, CHANNEL_ID_OFFSET)),
            term_id: TermId::from(get_u32(bytes, TERM_ID_OFFSET)),
            highest_contiguous_sequence_number: get_u32(
                bytes,
                HIGHEST_CONTIGUOUS_SEQUENCE_NUMBER_OFFSET,
            ),
            receiver_window: get_u32(bytes, RECEIVER_WINDOW_OFFSET),
        })
    }
}

/// Returns `(flags, frame_length)` of an encoded status message.
#[cfg(test)]
pub(crate) fn flags_and_length(buf: &[u8; STATUS_MESSAGE_LENGTH]) -> (u8, u32) {
    use super::header::{FLAGS_OFFSET, FRAME_LENGTH_OFFSET};

    (buf[FLAGS_OFFSET], get_u32(buf, FRAME_LENGTH_OFFSET))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_bytes_match_wire_layout() {
        let sm = StatusMessage {
            session_id: SessionId::new(42),
            channel_id: ChannelId::new(7),
            term_id: TermId::new(1),
            highest_contiguous_sequence_number: 0,
            receiver_window: 0x0002_0000,
        };
        let mut buf = [0xAAu8; STATUS_MESSAGE_LENGTH];
        sm.encode_into(&mut buf);

        #[rustfmt::skip]
        let expected: [u8; STATUS_MESSAGE_LENGTH] = [
            0x00, 0x00, 0x03, 0x00,     // version, flags, type
            0x1C, 0x00, 0x00, 0x00,     // frame length = 28
            0x2A, 0x00, 0x00, 0x00,     // session 42
            0x07, 0x00, 0x00, 0x00,     // channel 7
            0x01, 0x00, 0x00, 0x00,     // term 1
            0x00, 0x00, 0x00, 0x00,     // highest contiguous seq
            0x00, 0x00, 0x02, 0x00,     // receiver window 128 KiB
        ];
        assert_eq!(buf, expected);
        assert_eq!(flags_and_length(&buf), (0, 28));
    }

    #[test]
    fn decode_reads_back_encoded_message() {
        let sm = StatusMessage {
            session_id: SessionId::new(0xDEAD_BEEF),
            channel_id: ChannelId::new(9),
            term_id: TermId::new(77),
            highest_contiguous_sequence_number: 4096,
            receiver_window: 65_536,
        };
        let mut buf = [0u8; STATUS_MESSAGE_LENGTH];
        sm.encode_into(&mut buf);
        assert_eq!(StatusMessage::decode(&buf), Ok(sm));
    }

    #[test]
    fn decode_rejects_data_frame() {
        let buf = [0u8; STATUS_MESSAGE_LENGTH];
        assert_eq!(
            StatusMessage::decode(&buf),
            Err(HeaderError::UnexpectedType(0))
        );
    }
}
