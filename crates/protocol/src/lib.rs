//! # Relaycast Protocol Crate
//!
//! Wire-level types shared by the hub and the gateway: the chat message
//! envelope, inbound and control frames, presence records, and the pure
//! validation functions for identities and attachments. Everything in this
//! crate is side-effect free; validation policy lives here, enforcement
//! lives in the session and hub layers.

pub mod frames;
pub mod message;
pub mod presence;
pub mod validate;

pub use frames::{ControlFrame, ErrorCode, InboundFrame};
pub use message::{ChatMessage, ImageData, MessageKind, SYSTEM_USERNAME};
pub use presence::UserStatus;
pub use validate::{
    validate_image, validate_username, ValidationError, ALLOWED_IMAGE_TYPES, MAX_FILENAME_LEN,
    MAX_IMAGE_BYTES,
};
