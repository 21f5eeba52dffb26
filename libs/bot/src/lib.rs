//! The helpdesk FAQ bot.
//!
//! [`decide`] is the whole state machine: given a room and one inbound envelope it returns the
//! actions to take, without touching the transport. [`handle_message`] records the envelope
//! and carries those actions out on a [`hdesk_session::BotSession`], and [`RoomDispatcher`]
//! feeds it transport events one room at a time.

mod dispatcher;
mod engine;

pub use dispatcher::{DispatchError, RoomDispatcher};
pub use engine::{BotAction, PassReport, decide, handle_message};
