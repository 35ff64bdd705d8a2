// An IAX2 stack in Rust
pub type Result<T> = std::result::Result<T, crate::error::Error>;
pub use crate::error::Error;
pub mod command;
pub mod dialog;
pub mod error;
pub mod event;
pub mod frame;
pub mod peer;
pub mod time;
pub use peer::PeerBuilder;
