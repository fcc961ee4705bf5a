use std::hash::Hash;
use ash::vk;

pub struct Queue {
    pub family: QueueFamily,
    pub handle: vk::Queue,
}

impl Queue {
    pub fn new(
        family: QueueFamily,
        handle: vk::Queue,
    ) -> Self {
        Self {
            family,
            handle,
        }
    }
}

#[derive(Clone, Debug)]
pub struct QueueFamily {
    pub index: u32,
    pub properties: vk::QueueFamilyProperties,
    supports_present: bool,
}

impl QueueFamily {
    pub fn new(
        index: u32,
        properties: vk::QueueFamilyProperties,
        supports_present: bool
    ) -> Self {
        Self {
            index,
            properties,
            supports_present,
        }
    }

    pub fn supports_present(&self) -> bool {
        self.supports_present
    }

    pub fn supports_graphics(&self) -> bool {
        self.properties.queue_flags.contains(vk::QueueFlags::GRAPHICS)
    }
}

impl PartialEq for QueueFamily {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for QueueFamily {}

impl Hash for QueueFamily {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_compare_by_index() {
        let graphics = vk::QueueFamilyProperties {
            queue_flags: vk::QueueFlags::GRAPHICS,
            ..Default::default()
        };
        let transfer = vk::QueueFamilyProperties {
            queue_flags: vk::QueueFlags::TRANSFER,
            ..Default::default()
        };
        let a = QueueFamily::new(0, graphics, true);
        let b = QueueFamily::new(0, transfer, false);
        assert_eq!(a, b);
        assert!(a.supports_graphics() && a.supports_present());
        assert!(!b.supports_graphics() && !b.supports_present());
    }
}
