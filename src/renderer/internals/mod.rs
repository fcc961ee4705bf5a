/// "Internals" refers to low-level objects that are used to implement the "Resources" objects
/// and the frame core.

pub mod buffer;
pub mod swapchain;
