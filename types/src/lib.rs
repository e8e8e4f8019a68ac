pub mod audio;
pub mod events;
pub mod status;

pub use audio::Channel;
pub use events::{ClientMessage, ServerMessage};
pub use status::SessionStatus;
