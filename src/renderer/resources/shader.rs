use std::io::Cursor;
use std::sync::Arc;
use ash::vk;
use color_eyre::Result;

/// SPIR-V produced from `shaders/quad.wgsl` by the build script
const QUAD_SPV: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders-built/quad.spv"));

pub const VERTEX_ENTRY: &std::ffi::CStr = c"vs_main";
pub const FRAGMENT_ENTRY: &std::ffi::CStr = c"fs_main";

/// One shader module holding both the vertex and the fragment entry point
pub struct GraphicsShader {
    pub module: vk::ShaderModule,
    device: Arc<ash::Device>,
}

impl GraphicsShader {
    pub fn quad(device: Arc<ash::Device>) -> Result<Self> {
        let module = create_shader_module(QUAD_SPV, &device)?;
        Ok(Self { module, device })
    }
}

impl Drop for GraphicsShader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

fn create_shader_module(bytes: &[u8], device: &ash::Device) -> Result<vk::ShaderModule> {
    // Copies into u32 words, the embedded bytes carry no alignment guarantee
    let code = ash::util::read_spv(&mut Cursor::new(bytes))?;

    let shader_module_info = vk::ShaderModuleCreateInfo::default()
        .code(&code);

    let shader_module = unsafe {
        device.create_shader_module(&shader_module_info, None)?
    };

    Ok(shader_module)
}
