pub mod accept_loop;
pub mod listener;
pub mod sink;

pub use accept_loop::{AcceptLoop, LoopStats};
pub use listener::ThreadedListener;
pub use sink::{ChannelSink, ConnectionSink};
