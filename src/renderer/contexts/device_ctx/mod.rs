pub mod instance;
pub mod device;
pub mod queue;
pub mod surface;
