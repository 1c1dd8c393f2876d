pub mod device;
pub mod token;
pub mod trigger;
pub mod window;
