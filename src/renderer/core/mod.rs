/// "Core" refers to high-level objects that are used to manage the state of the renderer.

pub mod state;
