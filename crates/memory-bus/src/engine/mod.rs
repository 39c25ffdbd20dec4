//! Delivery engines shared by every entity type.
//!
//! [`QueueEngine`] implements FIFO delivery with peek-lock and
//! receive-and-delete semantics. [`SessionEngine`] wraps a private
//! `QueueEngine` for one session and adds the exclusive session lock and the
//! session state blob.

mod queue;
mod session;

pub use queue::QueueEngine;
pub use session::SessionEngine;
