//! N25Q128A protocol implementation
//!
//! [`N25q128a`] turns flash operations into command byte sequences over a
//! [`Transport`](crate::transport::Transport). It applies no policy beyond
//! the completion check every erase/program needs before the next command.

mod n25q128a;
pub mod opcodes;

pub use n25q128a::{FlashIdentity, PollConfig, N25q128a};
pub use opcodes::{FlagStatus, Status};
