pub mod config;
pub mod merger;
pub mod playback;
pub mod session;
pub mod video;
