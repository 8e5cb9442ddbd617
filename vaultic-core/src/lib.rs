//! Vaultic Core Library
//!
//! Secure framed messaging substrate and file-vault protocol: an
//! ECDH-negotiated encrypted channel over length-prefixed TCP frames, a
//! poll-driven socket multiplexer, and per-connection session state
//! machines for both sides of the protocol.

pub mod crypto;
pub mod net;
pub mod proto;
pub mod session;
pub mod store;

pub use crypto::{ChannelError, PublicCoordinates, SecureChannel};
pub use net::{
    ClientInterface, Connection, FrameError, NetworkError, Reassembler, ServerInterface,
    FRAME_HEADER_SIZE, MAX_MESSAGE_SIZE,
};
pub use proto::{
    decode_envelope, encode_envelope, AdminData, Envelope, Interaction, PrivilegeLevel,
    ProtoError,
};
pub use session::{
    ClientError, ClientEvent, FileClient, FileServer, SessionError, UploadItem, UploadOutcome,
    MSG_INSUFFICIENT_PERMISSION, MSG_NOT_LOGGED_IN,
};
pub use store::{ServerDataManager, StoreError, UserRecord};
