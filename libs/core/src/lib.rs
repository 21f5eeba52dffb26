//! Helpdesk chat core contracts and value types.
//!
//! This crate holds the pieces shared by the transport, session and bot layers: channel
//! naming, the message envelope, the de-duplicated room history, FAQ reference data and the
//! text bundle lookup.
pub mod channel;
pub mod envelope;
pub mod faq;
pub mod history;
pub mod templates;
pub mod text;
pub mod timetoken;

pub use channel::*;
pub use envelope::*;
pub use faq::*;
pub use history::*;
pub use templates::*;
pub use text::*;
pub use timetoken::*;
