pub mod channel;
pub mod effects;
pub mod protocol;
pub mod receipts;
pub mod runtime;
pub mod session;
pub mod socket;
pub mod store;
pub mod timer;

pub use channel::{LocalChannel, RealtimeChannel};
pub use effects::{SideEffectCoordinator, SmartReplyState};
pub use protocol::{ClientEvent, ServerEvent};
pub use receipts::{Tick, derive_tick};
pub use runtime::{SessionHandle, SessionRuntime, SessionView};
pub use session::{ChatSessionController, SessionCommand, SessionPhase};
pub use socket::SocketChannel;
pub use store::{Applied, MessageStore};
