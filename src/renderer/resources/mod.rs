/// "Resources" refers to middle-level objects that are created from the device.
/// They are relatively intuitive and managed by the user.

pub mod mesh;
pub mod shader;
