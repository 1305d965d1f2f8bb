//! GUI WebSocket channel.
//!
//! One background task serves a WebSocket endpoint and fans serialized state
//! snapshots out to connected front-ends; client actions flow back to the
//! role loop through a command channel. The core writes, the server reads;
//! no other cross-task mutation of core state occurs.

pub mod messages;
pub mod server;

pub use messages::{GuiCommand, GuiPush, SeatView};
pub use server::{start, GuiHandle};
