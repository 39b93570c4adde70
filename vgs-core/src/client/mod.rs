pub mod buffer;
pub mod command;
pub mod peers;
pub mod pen;
pub mod sender;
pub mod sync;
pub mod window;

pub use buffer::{BufferState, DrawBuffer, SealedBuffer};
pub use command::Command;
pub use peers::PeerGroup;
pub use pen::PenState;
pub use sender::Sender;
pub use sync::{PendingReply, Synchronizer};
pub use window::{Window, WindowSinks};
