mod config;
mod link;
mod playback;
mod polling;
mod queuing;
mod ranking;

pub use config::*;
pub use link::*;
pub use playback::*;
pub use polling::*;
pub use queuing::*;
pub use ranking::*;
