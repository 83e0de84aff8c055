pub mod net;
pub mod thread;
