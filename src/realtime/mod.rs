pub mod broadcaster;
pub mod events;
pub mod hub;
pub mod session;

pub use broadcaster::DiffBroadcaster;
pub use events::{ClientEvent, ServerEvent};
pub use hub::{ConnectionId, Hub};
pub use session::RealtimeService;
