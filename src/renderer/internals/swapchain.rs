use ash::vk;
use crate::renderer::backend::{GpuDevice, SurfaceSupport, SwapchainDesc};
use crate::renderer::config::RenderConfig;
use crate::renderer::core::state::SurfaceExtent;
use crate::renderer::error::{RenderError, RenderResult, VkResultExt};

/// Swapchain plus the per-image views and framebuffers built for one extent and format.
///
/// `images`, `image_views` and `framebuffers` always have equal lengths on a live instance.
/// Every handle obtained from here is invalid once the orchestrator recreates the swapchain;
/// compare [`generation`](Self::generation) to detect that.
#[derive(Debug, Default)]
pub struct SwapchainResources {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: SurfaceExtent,
    generation: u64,
}

impl SwapchainResources {
    /// Builds a swapchain for `requested` and one view and framebuffer per image.
    ///
    /// Either everything is created or nothing is left behind.
    pub fn create<D: GpuDevice + ?Sized>(
        device: &D,
        surface: vk::SurfaceKHR,
        render_pass: vk::RenderPass,
        surface_format: vk::SurfaceFormatKHR,
        requested: SurfaceExtent,
        config: &RenderConfig,
        generation: u64,
    ) -> RenderResult<Self> {
        let support = device.surface_support(surface).during("query surface support")?;

        if !format_supported(&support, surface_format) {
            return Err(RenderError::NoSurfaceFormat);
        }
        let present_mode = select_present_mode(&support, config.vsync)?;
        let extent = clamp_extent(&support.capabilities, requested);
        if extent.is_minimized() {
            return Err(RenderError::ContractViolation("swapchain extent must be non-zero"));
        }

        let caps = &support.capabilities;
        let pre_transform = if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        };

        let swapchain = device
            .create_swapchain(&SwapchainDesc {
                surface,
                min_image_count: image_count(caps),
                format: surface_format,
                extent: extent.into(),
                present_mode,
                pre_transform,
            })
            .during("create swapchain")?;

        let mut resources = Self {
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            format: surface_format,
            present_mode,
            extent,
            generation,
        };
        if let Err(e) = resources.create_attachments(device, render_pass) {
            resources.destroy(device);
            return Err(e);
        }

        log::info!(
            "Created swapchain generation {} ({}x{}, {} images, {:?})",
            generation,
            extent.width,
            extent.height,
            resources.images.len(),
            present_mode,
        );
        Ok(resources)
    }

    fn create_attachments<D: GpuDevice + ?Sized>(
        &mut self,
        device: &D,
        render_pass: vk::RenderPass,
    ) -> RenderResult<()> {
        self.images = device
            .swapchain_images(self.swapchain)
            .during("get swapchain images")?;

        // Pushed one at a time so a failure leaves only what `destroy` can find
        for image in &self.images {
            let view = device
                .create_image_view(*image, self.format.format)
                .during("create swapchain image view")?;
            self.image_views.push(view);
        }
        for view in &self.image_views {
            let framebuffer = device
                .create_framebuffer(render_pass, *view, self.extent)
                .during("create framebuffer")?;
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    /// Destroys framebuffers, then image views, then the swapchain.
    ///
    /// The caller must make sure the device no longer uses any of them.
    /// Calling this on a destroyed or never-created instance does nothing.
    pub fn destroy<D: GpuDevice + ?Sized>(&mut self, device: &D) {
        for framebuffer in self.framebuffers.drain(..) {
            device.destroy_framebuffer(framebuffer);
        }
        for view in self.image_views.drain(..) {
            device.destroy_image_view(view);
        }
        self.images.clear();
        if self.swapchain != vk::SwapchainKHR::null() {
            device.destroy_swapchain(self.swapchain);
            self.swapchain = vk::SwapchainKHR::null();
            log::debug!("Destroyed swapchain generation {}", self.generation);
        }
    }

    pub fn is_live(&self) -> bool {
        self.swapchain != vk::SwapchainKHR::null()
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn extent(&self) -> SurfaceExtent {
        self.extent
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for SwapchainResources {
    fn drop(&mut self) {
        if self.is_live() {
            log::error!(
                "Swapchain generation {} dropped without being destroyed, leaking {} framebuffers",
                self.generation,
                self.framebuffers.len(),
            );
        }
    }
}

/// Picks the configured format if the surface offers it, otherwise the first offered one
pub fn select_surface_format(
    support: &SurfaceSupport,
    config: &RenderConfig,
) -> RenderResult<vk::SurfaceFormatKHR> {
    let preferred = config.preferred_format;
    match support.formats.as_slice() {
        [] => Err(RenderError::NoSurfaceFormat),
        // The surface has no preference at all
        [only] if only.format == vk::Format::UNDEFINED => Ok(preferred),
        formats => Ok(formats
            .iter()
            .copied()
            .find(|f| same_format(*f, preferred))
            .unwrap_or(formats[0])),
    }
}

/// FIFO when vsync is on. Otherwise MAILBOX, then IMMEDIATE, then FIFO.
pub fn select_present_mode(
    support: &SurfaceSupport,
    vsync: bool,
) -> RenderResult<vk::PresentModeKHR> {
    let candidates: &[vk::PresentModeKHR] = if vsync {
        &[vk::PresentModeKHR::FIFO]
    } else {
        &[
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO,
        ]
    };
    candidates
        .iter()
        .copied()
        .find(|mode| support.present_modes.contains(mode))
        .ok_or(RenderError::NoPresentMode)
}

/// Extent the next swapchain will actually get for `requested`
pub fn resolve_extent<D: GpuDevice + ?Sized>(
    device: &D,
    surface: vk::SurfaceKHR,
    requested: SurfaceExtent,
) -> RenderResult<SurfaceExtent> {
    let support = device.surface_support(surface).during("query surface support")?;
    Ok(clamp_extent(&support.capabilities, requested))
}

fn clamp_extent(caps: &vk::SurfaceCapabilitiesKHR, requested: SurfaceExtent) -> SurfaceExtent {
    // u32::MAX means the surface size is determined by the swapchain extent
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent.into();
    }
    if requested.is_minimized() {
        return requested;
    }
    SurfaceExtent::new(
        requested.width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        requested.height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    )
}

fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    // One more than the minimum so acquiring never waits on the driver
    let count = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

fn format_supported(support: &SurfaceSupport, format: vk::SurfaceFormatKHR) -> bool {
    match support.formats.as_slice() {
        [only] if only.format == vk::Format::UNDEFINED => true,
        formats => formats.iter().any(|f| same_format(*f, format)),
    }
}

fn same_format(a: vk::SurfaceFormatKHR, b: vk::SurfaceFormatKHR) -> bool {
    a.format == b.format && a.color_space == b.color_space
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use crate::renderer::backend::mock::{Event, MockDevice};

    fn surface() -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(0xface)
    }

    fn srgb() -> vk::SurfaceFormatKHR {
        RenderConfig::default().preferred_format
    }

    fn create(device: &MockDevice, extent: SurfaceExtent) -> RenderResult<SwapchainResources> {
        SwapchainResources::create(
            device,
            surface(),
            vk::RenderPass::from_raw(0xbeef),
            srgb(),
            extent,
            &RenderConfig::default(),
            1,
        )
    }

    #[test]
    fn create_builds_one_view_and_framebuffer_per_image() {
        let device = MockDevice::new();
        let mut swapchain = create(&device, SurfaceExtent::new(800, 600)).unwrap();

        // min_image_count 2 + 1, capped at max 3
        assert_eq!(swapchain.images().len(), 3);
        assert_eq!(swapchain.image_views().len(), 3);
        assert_eq!(swapchain.framebuffers().len(), 3);
        assert_eq!(swapchain.extent(), SurfaceExtent::new(800, 600));
        assert_eq!(swapchain.present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(swapchain.generation(), 1);
        // swapchain + 3 views + 3 framebuffers
        assert_eq!(device.live_handle_count(), 7);

        swapchain.destroy(&device);
        assert_eq!(device.live_handle_count(), 0);
    }

    #[test]
    fn destroy_runs_framebuffers_then_views_then_swapchain() {
        let device = MockDevice::new();
        let mut swapchain = create(&device, SurfaceExtent::new(800, 600)).unwrap();
        device.clear_events();
        swapchain.destroy(&device);

        let last_framebuffer = device.events().iter().rposition(|e| matches!(e, Event::DestroyFramebuffer(_)));
        let first_view = device.position(|e| matches!(e, Event::DestroyImageView(_)));
        let last_view = device.events().iter().rposition(|e| matches!(e, Event::DestroyImageView(_)));
        let swapchain_destroy = device.position(|e| matches!(e, Event::DestroySwapchain(_)));
        assert!(last_framebuffer < first_view);
        assert!(last_view < swapchain_destroy);
    }

    #[test]
    fn destroy_is_idempotent() {
        let device = MockDevice::new();
        let mut swapchain = create(&device, SurfaceExtent::new(800, 600)).unwrap();
        swapchain.destroy(&device);
        swapchain.destroy(&device);
        assert!(!swapchain.is_live());

        let mut never_created = SwapchainResources::default();
        never_created.destroy(&device);
        assert_eq!(device.count(|e| matches!(e, Event::DestroySwapchain(_))), 1);
    }

    #[test]
    fn failure_part_way_leaves_nothing_behind() {
        let device = MockDevice::new();
        device.fail_image_view_at(2);

        let result = create(&device, SurfaceExtent::new(800, 600));
        assert!(matches!(result, Err(RenderError::OutOfMemory { .. })));
        assert_eq!(device.live_handle_count(), 0);
        assert_eq!(device.count(|e| matches!(e, Event::DestroyImageView(_))), 2);
        assert_eq!(device.count(|e| matches!(e, Event::DestroySwapchain(_))), 1);
    }

    #[test]
    fn unsupported_format_is_reported() {
        let device = MockDevice::new();
        let mut support = device.surface_support(surface()).unwrap();
        support.formats = vec![vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        device.set_support(support);

        assert!(matches!(
            create(&device, SurfaceExtent::new(800, 600)),
            Err(RenderError::NoSurfaceFormat)
        ));
        assert_eq!(device.live_handle_count(), 0);
    }

    #[test]
    fn format_selection_falls_back_to_first_offered() {
        let config = RenderConfig::default();
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let mut support = SurfaceSupport {
            formats: vec![unorm],
            ..Default::default()
        };
        assert_eq!(select_surface_format(&support, &config).unwrap().format, unorm.format);

        support.formats.push(srgb());
        assert_eq!(select_surface_format(&support, &config).unwrap().format, srgb().format);

        support.formats = vec![vk::SurfaceFormatKHR::default()];
        assert_eq!(select_surface_format(&support, &config).unwrap().format, srgb().format);

        support.formats.clear();
        assert!(matches!(
            select_surface_format(&support, &config),
            Err(RenderError::NoSurfaceFormat)
        ));
    }

    #[test]
    fn present_mode_follows_vsync() {
        let mut support = SurfaceSupport {
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            ..Default::default()
        };
        assert_eq!(select_present_mode(&support, true), Ok(vk::PresentModeKHR::FIFO));
        assert_eq!(select_present_mode(&support, false), Ok(vk::PresentModeKHR::MAILBOX));

        support.present_modes = vec![vk::PresentModeKHR::FIFO];
        assert_eq!(select_present_mode(&support, false), Ok(vk::PresentModeKHR::FIFO));

        support.present_modes.clear();
        assert_eq!(select_present_mode(&support, true), Err(RenderError::NoPresentMode));
    }

    #[test]
    fn fixed_surface_extent_wins_over_request() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: 1280, height: 720 },
            ..Default::default()
        };
        assert_eq!(clamp_extent(&caps, SurfaceExtent::new(800, 600)), SurfaceExtent::new(1280, 720));

        caps.current_extent = vk::Extent2D { width: u32::MAX, height: u32::MAX };
        caps.min_image_extent = vk::Extent2D { width: 16, height: 16 };
        caps.max_image_extent = vk::Extent2D { width: 1024, height: 1024 };
        assert_eq!(clamp_extent(&caps, SurfaceExtent::new(4000, 8)), SurfaceExtent::new(1024, 16));
        assert!(clamp_extent(&caps, SurfaceExtent::new(0, 600)).is_minimized());
    }

    #[test]
    fn image_count_is_one_above_minimum_within_maximum() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(image_count(&caps), 3);
        caps.max_image_count = 2;
        assert_eq!(image_count(&caps), 2);
    }
}
