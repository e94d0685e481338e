// Physical device selection
//
// Scoring works on plain capability snapshots (`PhysicalDeviceCandidate`), so
// the whole algorithm runs without a GPU. `device.rs` fills the snapshots from
// the driver and turns the winner into a logical device.

use ash::vk;
use std::fmt;

use super::error::{BackendError, BackendResult};
use super::swapchain::SwapchainSupport;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

// Dedicated-transfer pass: start high, lose a point per extra capability,
// gain a boost for an explicit transfer bit.
const TRANSFER_BASE_SCORE: i32 = 3;
const TRANSFER_CAPABILITY_PENALTY: i32 = 1;
const TRANSFER_BIT_BOOST: i32 = 10;

// Role pass: sharing the transfer family costs a role this much.
const ROLE_BASE_SCORE: i32 = 10;
const SHARED_TRANSFER_PENALTY: i32 = 5;

/// A single capability check: whether it must pass, and what it adds when it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub required: bool,
    pub weight: u32,
}

impl Requirement {
    pub const fn required(weight: u32) -> Self {
        Self {
            required: true,
            weight,
        }
    }

    pub const fn optional(weight: u32) -> Self {
        Self {
            required: false,
            weight,
        }
    }
}

/// What the renderer asks of a GPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRequirements {
    pub graphics_queue: Requirement,
    pub present_queue: Requirement,
    pub compute_queue: Requirement,
    pub transfer_queue: Requirement,
    pub discrete_gpu: Requirement,
    pub sampler_anisotropy: Requirement,
    pub depth_format: Requirement,
    /// Device extensions that must all be present; a device missing one is skipped.
    pub device_extensions: Vec<String>,
    /// Winning scores below this are accepted with a warning.
    pub low_score_threshold: u32,
}

impl Default for DeviceRequirements {
    fn default() -> Self {
        Self {
            graphics_queue: Requirement::required(100),
            present_queue: Requirement::required(100),
            compute_queue: Requirement::optional(50),
            transfer_queue: Requirement::required(50),
            discrete_gpu: Requirement::optional(1000),
            sampler_anisotropy: Requirement::optional(100),
            depth_format: Requirement::required(100),
            device_extensions: vec!["VK_KHR_swapchain".to_string()],
            low_score_threshold: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
    /// Whether this family can present to the target surface.
    pub present_support: bool,
}

impl QueueFamilyInfo {
    fn has(&self, flag: vk::QueueFlags) -> bool {
        self.queue_count > 0 && self.flags.contains(flag)
    }

    /// Graphics and compute queues implicitly accept transfer commands.
    fn can_transfer(&self) -> bool {
        self.queue_count > 0
            && self.flags.intersects(
                vk::QueueFlags::TRANSFER | vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
            )
    }
}

/// Family index per role; `None` means no family satisfied the role.
/// Roles may alias the same family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyAssignment {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
    pub compute: Option<u32>,
    pub transfer: Option<u32>,
}

impl QueueFamilyAssignment {
    /// Distinct resolved families, ascending.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families: Vec<u32> = [self.graphics, self.present, self.compute, self.transfer]
            .into_iter()
            .flatten()
            .collect();
        families.sort_unstable();
        families.dedup();
        families
    }
}

/// Static capability snapshot of one GPU.
#[derive(Debug, Clone)]
pub struct PhysicalDeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: Vec<QueueFamilyInfo>,
    pub extensions: Vec<String>,
    /// Format properties for each entry of `DEPTH_FORMAT_CANDIDATES`.
    pub depth_format_support: Vec<(vk::Format, vk::FormatProperties)>,
    pub swapchain_support: SwapchainSupport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoSurfaceFormats,
    NoPresentModes,
    MissingExtension(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSurfaceFormats => write!(f, "no surface formats for this surface"),
            Self::NoPresentModes => write!(f, "no present modes for this surface"),
            Self::MissingExtension(name) => write!(f, "missing device extension {}", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceScore {
    pub score: u32,
    pub queues: QueueFamilyAssignment,
    pub depth_format: Option<vk::Format>,
}

/// Result of scoring one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// The device cannot drive the surface at all and was not scored.
    Skipped(SkipReason),
    /// A required check failed; the score is zero and no queues are assigned.
    Rejected(String),
    Scored(DeviceScore),
}

impl Evaluation {
    pub fn score(&self) -> u32 {
        match self {
            Self::Scored(score) => score.score,
            _ => 0,
        }
    }
}

/// The winning candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
    pub score: DeviceScore,
}

/// First depth format in preference order usable as an optimally tiled
/// depth/stencil attachment, the tiling the depth image is created with.
pub fn pick_depth_format(support: &[(vk::Format, vk::FormatProperties)]) -> Option<vk::Format> {
    DEPTH_FORMAT_CANDIDATES.iter().copied().find(|candidate| {
        support.iter().any(|(format, props)| {
            format == candidate
                && props
                    .optimal_tiling_features
                    .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
    })
}

/// Resolve the four queue roles in two passes.
///
/// The transfer family is chosen first, preferring a transfer-only family.
/// Graphics, compute and present are then chosen with a penalty for sharing
/// the transfer family. Ties keep the first family iterated.
pub fn assign_queue_families(families: &[QueueFamilyInfo]) -> QueueFamilyAssignment {
    let mut assignment = QueueFamilyAssignment::default();

    // Scores can reach zero for a transfer-capable family, so any candidate beats none.
    let mut best_transfer: Option<i32> = None;
    for (index, family) in families.iter().enumerate() {
        if !family.can_transfer() {
            continue;
        }
        let mut score = TRANSFER_BASE_SCORE;
        if family.has(vk::QueueFlags::GRAPHICS) {
            score -= TRANSFER_CAPABILITY_PENALTY;
        }
        if family.has(vk::QueueFlags::COMPUTE) {
            score -= TRANSFER_CAPABILITY_PENALTY;
        }
        if family.present_support {
            score -= TRANSFER_CAPABILITY_PENALTY;
        }
        if family.has(vk::QueueFlags::TRANSFER) {
            score += TRANSFER_BIT_BOOST;
        }
        if best_transfer.map_or(true, |best| score > best) {
            best_transfer = Some(score);
            assignment.transfer = Some(index as u32);
        }
    }

    let mut best_graphics = 0;
    let mut best_compute = 0;
    let mut best_present = 0;
    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        let role_score = if assignment.transfer == Some(index) {
            ROLE_BASE_SCORE - SHARED_TRANSFER_PENALTY
        } else {
            ROLE_BASE_SCORE
        };

        if family.has(vk::QueueFlags::GRAPHICS) && role_score > best_graphics {
            best_graphics = role_score;
            assignment.graphics = Some(index);
        }
        if family.has(vk::QueueFlags::COMPUTE) && role_score > best_compute {
            best_compute = role_score;
            assignment.compute = Some(index);
        }
        if family.queue_count > 0 && family.present_support && role_score > best_present {
            best_present = role_score;
            assignment.present = Some(index);
        }
    }

    assignment
}

/// Add `requirement.weight` when satisfied; fail when a required check is not.
fn apply(
    score: &mut u32,
    requirement: Requirement,
    satisfied: bool,
    what: &str,
) -> Result<(), String> {
    if satisfied {
        *score = score.saturating_add(requirement.weight);
        Ok(())
    } else if requirement.required {
        Err(format!("missing required {}", what))
    } else {
        Ok(())
    }
}

fn score_capabilities(
    candidate: &PhysicalDeviceCandidate,
    requirements: &DeviceRequirements,
) -> Result<DeviceScore, String> {
    let mut score = 0;

    apply(
        &mut score,
        requirements.discrete_gpu,
        candidate.device_type == vk::PhysicalDeviceType::DISCRETE_GPU,
        "discrete GPU",
    )?;
    apply(
        &mut score,
        requirements.sampler_anisotropy,
        candidate.features.sampler_anisotropy == vk::TRUE,
        "sampler anisotropy",
    )?;

    let depth_format = pick_depth_format(&candidate.depth_format_support);
    apply(
        &mut score,
        requirements.depth_format,
        depth_format.is_some(),
        "depth format",
    )?;

    let queues = assign_queue_families(&candidate.queue_families);
    apply(
        &mut score,
        requirements.graphics_queue,
        queues.graphics.is_some(),
        "graphics queue",
    )?;
    apply(
        &mut score,
        requirements.present_queue,
        queues.present.is_some(),
        "present queue",
    )?;
    apply(
        &mut score,
        requirements.transfer_queue,
        queues.transfer.is_some(),
        "transfer queue",
    )?;
    apply(
        &mut score,
        requirements.compute_queue,
        queues.compute.is_some(),
        "compute queue",
    )?;

    Ok(DeviceScore {
        score,
        queues,
        depth_format,
    })
}

/// Score one candidate against `requirements`.
pub fn evaluate(
    candidate: &PhysicalDeviceCandidate,
    requirements: &DeviceRequirements,
) -> Evaluation {
    let support = &candidate.swapchain_support;
    if support.formats.is_empty() {
        return Evaluation::Skipped(SkipReason::NoSurfaceFormats);
    }
    if support.present_modes.is_empty() {
        return Evaluation::Skipped(SkipReason::NoPresentModes);
    }
    if let Some(missing) = requirements
        .device_extensions
        .iter()
        .find(|ext| !candidate.extensions.contains(ext))
    {
        return Evaluation::Skipped(SkipReason::MissingExtension(missing.clone()));
    }

    match score_capabilities(candidate, requirements) {
        Ok(score) => Evaluation::Scored(score),
        Err(reason) => Evaluation::Rejected(reason),
    }
}

/// Pick the highest-scoring candidate; the earliest one wins a tie.
pub fn select_device(
    candidates: &[PhysicalDeviceCandidate],
    requirements: &DeviceRequirements,
) -> BackendResult<Selection> {
    let mut best: Option<Selection> = None;
    let mut best_score = 0;

    for (index, candidate) in candidates.iter().enumerate() {
        match evaluate(candidate, requirements) {
            Evaluation::Skipped(reason) => {
                log::info!("Skipping GPU '{}': {}", candidate.name, reason);
            }
            Evaluation::Rejected(reason) => {
                log::info!("GPU '{}' does not qualify: {}", candidate.name, reason);
            }
            Evaluation::Scored(score) => {
                log::info!(
                    "GPU '{}' ({:?}) scored {}",
                    candidate.name,
                    candidate.device_type,
                    score.score
                );
                if score.score > best_score {
                    best_score = score.score;
                    best = Some(Selection { index, score });
                }
            }
        }
    }

    let Some(selection) = best else {
        log::error!(
            "None of the {} GPU(s) meets the renderer's requirements",
            candidates.len()
        );
        return Err(BackendError::NoSuitableDevice);
    };

    if selection.score.score < requirements.low_score_threshold {
        log::warn!(
            "GPU '{}' scored only {} (threshold {}); continuing anyway",
            candidates[selection.index].name,
            selection.score.score,
            requirements.low_score_threshold
        );
    }

    Ok(selection)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAPHICS: vk::QueueFlags = vk::QueueFlags::GRAPHICS;
    const COMPUTE: vk::QueueFlags = vk::QueueFlags::COMPUTE;
    const TRANSFER: vk::QueueFlags = vk::QueueFlags::TRANSFER;

    fn family(flags: vk::QueueFlags, present_support: bool) -> QueueFamilyInfo {
        QueueFamilyInfo {
            flags,
            queue_count: 1,
            present_support,
        }
    }

    fn depth_support(format: vk::Format) -> (vk::Format, vk::FormatProperties) {
        (
            format,
            vk::FormatProperties {
                optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
        )
    }

    fn candidate(
        name: &str,
        device_type: vk::PhysicalDeviceType,
        queue_families: Vec<QueueFamilyInfo>,
    ) -> PhysicalDeviceCandidate {
        PhysicalDeviceCandidate {
            handle: vk::PhysicalDevice::null(),
            name: name.to_string(),
            device_type,
            properties: vk::PhysicalDeviceProperties::default(),
            features: vk::PhysicalDeviceFeatures {
                sampler_anisotropy: vk::TRUE,
                ..Default::default()
            },
            memory_properties: vk::PhysicalDeviceMemoryProperties::default(),
            queue_families,
            extensions: vec!["VK_KHR_swapchain".to_string()],
            depth_format_support: vec![depth_support(vk::Format::D32_SFLOAT)],
            swapchain_support: SwapchainSupport {
                capabilities: vk::SurfaceCapabilitiesKHR::default(),
                formats: vec![vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                }],
                present_modes: vec![vk::PresentModeKHR::FIFO],
            },
        }
    }

    fn general_purpose(name: &str, device_type: vk::PhysicalDeviceType) -> PhysicalDeviceCandidate {
        candidate(
            name,
            device_type,
            vec![family(GRAPHICS | COMPUTE | TRANSFER, true)],
        )
    }

    #[test]
    fn picks_strictly_highest_score() {
        let candidates = vec![
            general_purpose("integrated", vk::PhysicalDeviceType::INTEGRATED_GPU),
            general_purpose("discrete", vk::PhysicalDeviceType::DISCRETE_GPU),
        ];

        let selection = select_device(&candidates, &DeviceRequirements::default()).unwrap();

        assert_eq!(selection.index, 1);
        assert_eq!(
            selection.score.score,
            evaluate(&candidates[1], &DeviceRequirements::default()).score()
        );
    }

    #[test]
    fn ties_go_to_first_enumerated() {
        let candidates = vec![
            general_purpose("first", vk::PhysicalDeviceType::DISCRETE_GPU),
            general_purpose("second", vk::PhysicalDeviceType::DISCRETE_GPU),
        ];

        let selection = select_device(&candidates, &DeviceRequirements::default()).unwrap();

        assert_eq!(selection.index, 0);
    }

    #[test]
    fn fails_when_no_candidate_meets_required_checks() {
        let mut no_depth = general_purpose("no depth", vk::PhysicalDeviceType::DISCRETE_GPU);
        no_depth.depth_format_support.clear();
        let no_graphics = candidate(
            "compute only",
            vk::PhysicalDeviceType::DISCRETE_GPU,
            vec![family(COMPUTE | TRANSFER, true)],
        );

        let result = select_device(&[no_depth, no_graphics], &DeviceRequirements::default());

        assert!(matches!(result, Err(BackendError::NoSuitableDevice)));
    }

    #[test]
    fn empty_candidate_list_fails() {
        let result = select_device(&[], &DeviceRequirements::default());
        assert!(matches!(result, Err(BackendError::NoSuitableDevice)));
    }

    #[test]
    fn required_present_queue_beats_raw_score() {
        let requirements = DeviceRequirements {
            graphics_queue: Requirement::required(10),
            present_queue: Requirement::required(10),
            transfer_queue: Requirement::required(10),
            compute_queue: Requirement::optional(10),
            ..DeviceRequirements::default()
        };
        // A is discrete with every optional feature but cannot present.
        let device_a = candidate(
            "A",
            vk::PhysicalDeviceType::DISCRETE_GPU,
            vec![family(GRAPHICS | COMPUTE | TRANSFER, false), family(TRANSFER, false)],
        );
        let mut device_b = candidate(
            "B",
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            vec![family(GRAPHICS | TRANSFER, true)],
        );
        device_b.features.sampler_anisotropy = vk::FALSE;

        assert_eq!(evaluate(&device_a, &requirements).score(), 0);
        assert!(matches!(
            evaluate(&device_a, &requirements),
            Evaluation::Rejected(_)
        ));

        let selection = select_device(&[device_a, device_b], &requirements).unwrap();
        assert_eq!(selection.index, 1);
        assert_eq!(selection.score.queues.present, Some(0));
        assert_eq!(selection.score.queues.compute, None);
    }

    #[test]
    fn devices_without_surface_support_are_skipped() {
        let mut no_formats = general_purpose("no formats", vk::PhysicalDeviceType::DISCRETE_GPU);
        no_formats.swapchain_support.formats.clear();
        let mut no_modes = general_purpose("no modes", vk::PhysicalDeviceType::DISCRETE_GPU);
        no_modes.swapchain_support.present_modes.clear();

        let requirements = DeviceRequirements::default();
        assert_eq!(
            evaluate(&no_formats, &requirements),
            Evaluation::Skipped(SkipReason::NoSurfaceFormats)
        );
        assert_eq!(
            evaluate(&no_modes, &requirements),
            Evaluation::Skipped(SkipReason::NoPresentModes)
        );
    }

    #[test]
    fn missing_extension_skips_device() {
        let mut device = general_purpose("old driver", vk::PhysicalDeviceType::DISCRETE_GPU);
        device.extensions.clear();

        assert_eq!(
            evaluate(&device, &DeviceRequirements::default()),
            Evaluation::Skipped(SkipReason::MissingExtension("VK_KHR_swapchain".to_string()))
        );
    }

    #[test]
    fn transfer_pass_prefers_dedicated_family() {
        let families = vec![
            family(GRAPHICS | COMPUTE | TRANSFER, true),
            family(COMPUTE | TRANSFER, false),
            family(TRANSFER, false),
        ];

        let queues = assign_queue_families(&families);

        assert_eq!(queues.transfer, Some(2));
        assert_eq!(queues.graphics, Some(0));
        assert_eq!(queues.compute, Some(0));
        assert_eq!(queues.present, Some(0));
    }

    #[test]
    fn roles_avoid_transfer_family_when_possible() {
        // Family 1 wins transfer (fewest extra capabilities); compute moves to
        // family 0 rather than sharing it.
        let families = vec![
            family(GRAPHICS | COMPUTE | TRANSFER, true),
            family(COMPUTE | TRANSFER, false),
        ];

        let queues = assign_queue_families(&families);

        assert_eq!(queues.transfer, Some(1));
        assert_eq!(queues.compute, Some(0));
    }

    #[test]
    fn single_family_serves_every_role() {
        let queues = assign_queue_families(&[family(GRAPHICS | COMPUTE | TRANSFER, true)]);

        assert_eq!(
            queues,
            QueueFamilyAssignment {
                graphics: Some(0),
                present: Some(0),
                compute: Some(0),
                transfer: Some(0),
            }
        );
        assert_eq!(queues.unique_families(), vec![0]);
    }

    #[test]
    fn graphics_family_counts_as_transfer_capable() {
        let queues = assign_queue_families(&[family(GRAPHICS, true)]);
        assert_eq!(queues.transfer, Some(0));
    }

    #[test]
    fn general_family_without_transfer_bit_still_takes_transfer() {
        // Graphics and compute imply transfer even when the bit is not reported.
        let queues = assign_queue_families(&[family(GRAPHICS | COMPUTE, true)]);

        assert_eq!(queues.transfer, Some(0));
        assert_eq!(queues.graphics, Some(0));
        assert_eq!(queues.compute, Some(0));
        assert_eq!(queues.present, Some(0));
    }

    #[test]
    fn single_implicit_transfer_family_is_selectable() {
        let candidates = vec![candidate(
            "implicit transfer",
            vk::PhysicalDeviceType::DISCRETE_GPU,
            vec![family(GRAPHICS | COMPUTE, true)],
        )];

        let selection = select_device(&candidates, &DeviceRequirements::default()).unwrap();

        assert_eq!(selection.index, 0);
        assert_eq!(selection.score.queues.transfer, Some(0));
    }

    #[test]
    fn empty_families_are_ignored() {
        let mut empty = family(GRAPHICS | TRANSFER, true);
        empty.queue_count = 0;

        let queues = assign_queue_families(&[empty, family(GRAPHICS | TRANSFER, true)]);

        assert_eq!(queues.graphics, Some(1));
        assert_eq!(queues.present, Some(1));
        assert_eq!(queues.transfer, Some(1));
    }

    #[test]
    fn unique_families_deduplicates_aliases() {
        let queues = QueueFamilyAssignment {
            graphics: Some(0),
            present: Some(0),
            compute: None,
            transfer: Some(2),
        };
        assert_eq!(queues.unique_families(), vec![0, 2]);
    }

    #[test]
    fn depth_format_follows_preference_order() {
        let support = vec![
            depth_support(vk::Format::D24_UNORM_S8_UINT),
            depth_support(vk::Format::D32_SFLOAT_S8_UINT),
        ];
        assert_eq!(
            pick_depth_format(&support),
            Some(vk::Format::D32_SFLOAT_S8_UINT)
        );

        let unusable = vec![(vk::Format::D32_SFLOAT, vk::FormatProperties::default())];
        assert_eq!(pick_depth_format(&unusable), None);
    }

    #[test]
    fn linear_only_tiling_is_not_enough() {
        let linear_only = (
            vk::Format::D32_SFLOAT,
            vk::FormatProperties {
                linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
        );
        assert_eq!(pick_depth_format(&[linear_only]), None);

        let support = vec![linear_only, depth_support(vk::Format::D24_UNORM_S8_UINT)];
        assert_eq!(
            pick_depth_format(&support),
            Some(vk::Format::D24_UNORM_S8_UINT)
        );
    }

    #[test]
    fn optional_checks_only_add_weight() {
        let requirements = DeviceRequirements::default();
        let mut plain = general_purpose("plain", vk::PhysicalDeviceType::INTEGRATED_GPU);
        plain.features.sampler_anisotropy = vk::FALSE;
        let with_aniso = general_purpose("aniso", vk::PhysicalDeviceType::INTEGRATED_GPU);

        let base = evaluate(&plain, &requirements).score();
        let boosted = evaluate(&with_aniso, &requirements).score();

        assert!(base > 0);
        assert_eq!(boosted - base, requirements.sampler_anisotropy.weight);
    }

    #[test]
    fn required_anisotropy_rejects_device_without_it() {
        let requirements = DeviceRequirements {
            sampler_anisotropy: Requirement::required(100),
            ..DeviceRequirements::default()
        };
        let mut device = general_purpose("no aniso", vk::PhysicalDeviceType::DISCRETE_GPU);
        device.features.sampler_anisotropy = vk::FALSE;

        assert_eq!(
            evaluate(&device, &requirements),
            Evaluation::Rejected("missing required sampler anisotropy".to_string())
        );
    }

    #[test]
    fn low_score_is_accepted() {
        let requirements = DeviceRequirements {
            low_score_threshold: u32::MAX,
            ..DeviceRequirements::default()
        };
        let candidates = vec![general_purpose("weak", vk::PhysicalDeviceType::CPU)];

        let selection = select_device(&candidates, &requirements).unwrap();

        assert_eq!(selection.index, 0);
        assert!(selection.score.score > 0);
    }
}
