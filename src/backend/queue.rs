// Queue family resolution
//
// Maps requested queue capabilities onto concrete family indices. Hardware
// often exposes dedicated compute and transfer families that run async to
// graphics; those are preferred whenever they exist.

use ash::vk;

/// Resolved family indices, one per capability. Capabilities that were not
/// requested alias the graphics family so a single queue can serve
/// multiple roles. Resolved once, before device creation, and never again
/// for the lifetime of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub compute: u32,
    pub transfer: u32,
}

impl QueueFamilyIndices {
    pub fn resolve(
        requested: vk::QueueFlags,
        families: &[vk::QueueFamilyProperties],
    ) -> Self {
        let graphics = if requested.contains(vk::QueueFlags::GRAPHICS) {
            queue_family_index(families, vk::QueueFlags::GRAPHICS)
        } else {
            0
        };

        let compute = if requested.contains(vk::QueueFlags::COMPUTE) {
            queue_family_index(families, vk::QueueFlags::COMPUTE)
        } else {
            graphics
        };

        let transfer = if requested.contains(vk::QueueFlags::TRANSFER) {
            queue_family_index(families, vk::QueueFlags::TRANSFER)
        } else {
            graphics
        };

        Self {
            graphics,
            compute,
            transfer,
        }
    }
}

/// Index of a family supporting `flags`, or panic.
///
/// Resolution failure is an unconditional abort: there is no index to
/// return and no degraded mode to fall back to.
pub fn queue_family_index(
    families: &[vk::QueueFamilyProperties],
    flags: vk::QueueFlags,
) -> u32 {
    find_queue_family_index(families, flags)
        .unwrap_or_else(|| panic!("no queue family supports {flags:?}"))
}

/// Index of a family supporting `flags`, preferring dedicated families.
pub fn find_queue_family_index(
    families: &[vk::QueueFamilyProperties],
    flags: vk::QueueFlags,
) -> Option<u32> {
    // Compute-only request: a family with compute set and graphics clear
    // runs async to the graphics queue
    if flags.contains(vk::QueueFlags::COMPUTE) && !flags.contains(vk::QueueFlags::GRAPHICS) {
        let dedicated = families.iter().position(|family| {
            family.queue_flags.contains(vk::QueueFlags::COMPUTE)
                && !family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        });
        if let Some(index) = dedicated {
            return Some(index as u32);
        }
    }

    // Transfer-only request: prefer a family that does neither graphics
    // nor compute (typically a DMA engine)
    if flags.contains(vk::QueueFlags::TRANSFER)
        && !flags.contains(vk::QueueFlags::GRAPHICS)
        && !flags.contains(vk::QueueFlags::COMPUTE)
    {
        let dedicated = families.iter().position(|family| {
            family.queue_flags.contains(vk::QueueFlags::TRANSFER)
                && !family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                && !family.queue_flags.contains(vk::QueueFlags::COMPUTE)
        });
        if let Some(index) = dedicated {
            return Some(index as u32);
        }
    }

    // Otherwise the first family whose flags are a superset of the request
    families
        .iter()
        .position(|family| family.queue_flags.contains(flags))
        .map(|index| index as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn compute_prefers_dedicated_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
        ];

        assert_eq!(
            find_queue_family_index(&families, vk::QueueFlags::COMPUTE),
            Some(1)
        );
    }

    #[test]
    fn compute_falls_back_to_combined_family() {
        let families = [family(
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
        )];

        assert_eq!(
            find_queue_family_index(&families, vk::QueueFlags::COMPUTE),
            Some(0)
        );
    }

    #[test]
    fn transfer_prefers_family_without_graphics_or_compute() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::TRANSFER),
        ];

        assert_eq!(
            find_queue_family_index(&families, vk::QueueFlags::TRANSFER),
            Some(2)
        );
    }

    #[test]
    fn missing_capability_resolves_to_none() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER)];

        assert_eq!(
            find_queue_family_index(&families, vk::QueueFlags::COMPUTE),
            None
        );
    }

    #[test]
    fn unrequested_capabilities_alias_graphics() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::TRANSFER),
        ];

        let indices = QueueFamilyIndices::resolve(vk::QueueFlags::GRAPHICS, &families);
        assert_eq!(indices.graphics, 0);
        assert_eq!(indices.compute, 0);
        assert_eq!(indices.transfer, 0);
    }

    #[test]
    fn requested_capabilities_get_dedicated_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::TRANSFER),
        ];

        let indices = QueueFamilyIndices::resolve(
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
            &families,
        );
        assert_eq!(indices.graphics, 0);
        assert_eq!(indices.compute, 1);
        assert_eq!(indices.transfer, 2);
    }

    #[test]
    #[should_panic(expected = "no queue family supports")]
    fn unsatisfiable_request_aborts() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        QueueFamilyIndices::resolve(
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
            &families,
        );
    }
}
