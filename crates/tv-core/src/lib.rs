pub mod audio;
pub mod channel;
pub mod clock;
pub mod core;
pub mod event;
pub mod host;
pub mod keep_alive;
pub mod runtime;
pub mod sim;
pub mod surface;
pub mod wake_lock;
