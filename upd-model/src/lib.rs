//! upd Model
//!
//! Pure data types shared by the journal, the liveness tracker and the
//! daemon, decoupled from the storage engine and the runtime.

pub mod types;
pub mod event;
pub mod clock;

// Re-exports
pub use types::{PeerId, PeerIdError, PEER_ID_LEN};
pub use event::{HandshakeEvent, Timestamp};
pub use clock::{Clock, SystemClock, MockClock};
