//! Wire layout of the frames the receiver reads and writes.
//!
//! Every frame starts with the same 8-byte base header followed by the
//! session id. All multi-byte fields are little-endian.
//!
//! ```text
//!  0        1        2                 4                                 8
//! ┌────────┬────────┬─────────────────┬─────────────────────────────────┐
//! │ Ver(1) │ Flg(1) │ Type(2)         │ Frame Length (4)                │
//! ├────────┴────────┴─────────────────┼─────────────────────────────────┤
//! │ Session ID (4)                    │ Channel ID (4)                  │
//! ├───────────────────────────────────┼─────────────────────────────────┤
//! │ Term ID (4)                       │ kind-specific ...               │
//! └───────────────────────────────────┴─────────────────────────────────┘
//! ```
//!
//! | Type | Value | Direction |
//! |------|-------|-----------|
//! | DATA | 0x00 | publisher → receiver |
//! | NAK | 0x02 | receiver → publisher |
//! | SM (Status Message) | 0x03 | receiver → publisher |
//! | ERR | 0x04 | either |
//!
//! The receive path only needs to decode [`DataHeader`]s and encode
//! [`StatusMessage`]s; everything else is classified as control and ignored.

pub mod data;
pub mod header;
pub mod status;

pub use data::{DATA_HEADER_LENGTH, DataHeader};
pub use header::{
    BASE_HEADER_LENGTH, CURRENT_VERSION, FrameClass, HDR_TYPE_DATA, HDR_TYPE_ERR, HDR_TYPE_NAK,
    HDR_TYPE_SM, HeaderError,
};
pub use status::{STATUS_MESSAGE_LENGTH, StatusMessage};
