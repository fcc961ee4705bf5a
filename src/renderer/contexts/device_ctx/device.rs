use std::ffi::{c_char, CStr};
use std::str::Utf8Error;
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::queue::{Queue, QueueFamily};
use crate::renderer::contexts::device_ctx::surface::SurfaceBinding;

/// Logical device, its queues and the memory allocator
pub struct RenderDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,

    pub graphics_queue: Arc<Queue>,
    // Same queue as `graphics_queue` when the graphics family can present
    pub present_queue: Arc<Queue>,

    memory_allocator: Option<Arc<Mutex<Allocator>>>,
}

impl RenderDevice {
    pub fn new(
        ins: &RenderInstance,
        surface: &SurfaceBinding,
    ) -> Result<Self> {
        let (
            physical_device,
            graphics_queue_family,
            present_queue_family,
        ) = Self::select_physical_device(ins, surface)?;

        let (
            logical_device,
            graphics_queue,
            present_queue,
        ) = Self::create_logical_device(
            &ins.instance,
            &physical_device,
            graphics_queue_family,
            present_queue_family,
        )?;

        let memory_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: ins.instance.clone(),
            device: logical_device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: false,
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        let props = unsafe {
            ins.instance.get_physical_device_properties(physical_device)
        };
        log::info!(
            "Selected physical device {:?} (graphics family {}, present family {})",
            props.device_name_as_c_str().unwrap_or(c"<unknown>"),
            graphics_queue.family.index,
            present_queue.family.index,
        );

        Ok(Self {
            logical: Arc::new(logical_device),
            physical: physical_device,
            graphics_queue,
            present_queue,
            memory_allocator: Some(Arc::new(Mutex::new(memory_allocator))),
        })
    }

    pub fn memory_allocator(&self) -> Result<Arc<Mutex<Allocator>>> {
        self.memory_allocator
            .clone()
            .ok_or_eyre("Memory allocator already released")
    }

    fn select_physical_device(
        ins: &RenderInstance,
        surface: &SurfaceBinding,
    ) -> Result<(vk::PhysicalDevice, QueueFamily, QueueFamily)> {
        let instance = &ins.instance;
        let req_device_exts = Self::get_required_device_extensions();
        let req_device_exts = req_device_exts
            .iter()
            .map(|ext| ext.to_str())
            .collect::<std::result::Result<Vec<&str>, Utf8Error>>()?;

        let physical_devices = unsafe {
            instance.enumerate_physical_devices()?
        };

        physical_devices
            .into_iter()
            // Filter out devices that do not contain the required device extensions
            .filter(|device| {
                let supported_extensions = unsafe {
                    instance.enumerate_device_extension_properties(*device)
                }.unwrap_or_default();

                req_device_exts.iter().all(|req_ext| {
                    let req_ext_supported = supported_extensions
                        .iter()
                        .filter_map(|sup_ext| sup_ext.extension_name_as_c_str().ok())
                        .any(|sup_ext| sup_ext.to_str() == Ok(*req_ext));
                    if !req_ext_supported {
                        log::warn!("Device extension not supported: {}", req_ext);
                    }
                    req_ext_supported
                })
            })
            // Filter out devices without a graphics queue and a present queue
            .filter_map(|device| {
                let props = unsafe {
                    instance.get_physical_device_queue_family_properties(device)
                };
                let families = props
                    .iter()
                    .enumerate()
                    .map(|(i, q)| {
                        let supports_present = unsafe {
                            ins.surface_loader.get_physical_device_surface_support(
                                device,
                                i as u32,
                                surface.handle,
                            )
                        }.unwrap_or(false);
                        QueueFamily::new(i as u32, *q, supports_present)
                    })
                    .collect::<Vec<_>>();

                // Prefer a single family that does both
                let shared = families
                    .iter()
                    .find(|f| f.supports_graphics() && f.supports_present());
                let (graphics, present) = match shared {
                    Some(family) => (family.clone(), family.clone()),
                    None => (
                        families.iter().find(|f| f.supports_graphics())?.clone(),
                        families.iter().find(|f| f.supports_present())?.clone(),
                    ),
                };
                Some((device, graphics, present))
            })
            .min_by_key(|(device, _, _)| {
                let props = unsafe {
                    instance.get_physical_device_properties(*device)
                };
                match props.device_type {
                    vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                    vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                    vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                    vk::PhysicalDeviceType::CPU => 3,
                    vk::PhysicalDeviceType::OTHER => 4,
                    _ => 5,
                }
            })
            .ok_or_eyre("No suitable physical device found")
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: &vk::PhysicalDevice,
        graphics_queue_family: QueueFamily,
        present_queue_family: QueueFamily,
    ) -> Result<(ash::Device, Arc<Queue>, Arc<Queue>)> {
        let queue_priorities = [1.0];
        let mut queue_create_infos = vec![
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_queue_family.index)
                .queue_priorities(&queue_priorities),
        ];
        if present_queue_family != graphics_queue_family {
            queue_create_infos.push(
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(present_queue_family.index)
                    .queue_priorities(&queue_priorities),
            );
        }

        let enabled_extension_names = Self::get_required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();
        let enabled_features = vk::PhysicalDeviceFeatures::default();

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .enabled_features(&enabled_features);

        let device = unsafe {
            instance.create_device(*physical_device, &device_create_info, None)?
        };

        let graphics_queue = unsafe {
            let queue = device.get_device_queue(graphics_queue_family.index, 0);
            Arc::new(Queue::new(graphics_queue_family.clone(), queue))
        };
        let present_queue = if present_queue_family == graphics_queue_family {
            graphics_queue.clone()
        } else {
            unsafe {
                let queue = device.get_device_queue(present_queue_family.index, 0);
                Arc::new(Queue::new(present_queue_family, queue))
            }
        };

        Ok((device, graphics_queue, present_queue))
    }

    fn get_required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,

            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        // The allocator frees its memory blocks through the device, so it goes first
        if let Some(allocator) = self.memory_allocator.take() {
            match Arc::try_unwrap(allocator) {
                Ok(allocator) => drop(allocator),
                Err(_) => log::error!("Memory allocator still shared while destroying device"),
            }
        }
        unsafe {
            if let Err(e) = self.logical.device_wait_idle() {
                log::error!("Failed to wait for device idle before destroying it: {}", e);
            }
            self.logical.destroy_device(None);
        }
    }
}
