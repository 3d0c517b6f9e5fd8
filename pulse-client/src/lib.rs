//! Client-side connection and stream engine built on `pulse-protocol`'s wire types.
//!
//! A [`context::Context`] resolves a server address, autospawns a local daemon if nothing answers
//! and autospawn is permitted, performs the `AUTH`/`SET_CLIENT_NAME` handshake, and then drives any
//! number of [`stream::Stream`]s over the one packet stream it owns. None of this crate's state
//! machines run on their own thread or assume a particular executor — they're driven by whatever
//! implements [`mainloop::Mainloop`], with `pulse-tokio` providing the concrete `tokio` reactor.

pub mod addr;
pub mod autospawn;
pub mod context;
pub mod mainloop;
pub mod operation;
pub mod smoother;
pub mod stream;

pub use context::{Context, ContextFlags};
pub use mainloop::Mainloop;
pub use operation::Operation;
pub use stream::Stream;
