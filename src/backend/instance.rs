// Vulkan instance
//
// Responsibilities:
// - Load the Vulkan library
// - Instance creation with platform surface extensions
// - Validation layers + debug messenger routed into `log`

use ash::extensions::{ext::DebugUtils, khr::Surface};
use ash::{vk, Entry};
use std::ffi::{c_char, CStr, CString};

use super::error::{BackendError, BackendResult, VkResultExt};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance-level Vulkan objects. Dropped last, after every device object.
pub struct VulkanInstance {
    pub instance: ash::Instance,
    pub surface_loader: Surface,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    // Keeps the loader library mapped; must outlive `instance`
    pub entry: Entry,
}

impl VulkanInstance {
    /// Create the instance.
    ///
    /// # Arguments
    /// * `app_name` - Application name reported to the driver
    /// * `enable_validation` - Enable Khronos validation and the debug messenger
    /// * `surface_extensions` - Extensions the platform needs to create a surface
    pub fn new(
        app_name: &str,
        enable_validation: bool,
        surface_extensions: &[&CStr],
    ) -> BackendResult<Self> {
        log::info!("Creating Vulkan instance: {}", app_name);

        let entry = unsafe { Entry::load() }?;

        let mut extensions: Vec<&CStr> = surface_extensions.to_vec();
        if enable_validation {
            extensions.push(DebugUtils::name());
        }
        let layers: Vec<&CStr> = if enable_validation {
            vec![VALIDATION_LAYER]
        } else {
            Vec::new()
        };

        Self::check_layers(&entry, &layers)?;
        Self::check_extensions(&entry, &extensions)?;

        let instance = Self::create_instance(&entry, app_name, &extensions, &layers)?;

        let debug_utils = if enable_validation {
            match Self::setup_debug_messenger(&entry, &instance) {
                Ok(debug) => Some(debug),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        let surface_loader = Surface::new(&entry, &instance);

        Ok(Self {
            instance,
            surface_loader,
            debug_utils,
            entry,
        })
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        extensions: &[&CStr],
        layers: &[&CStr],
    ) -> BackendResult<ash::Instance> {
        let app_name_cstr = CString::new(app_name).unwrap_or_else(|_| c"lumen".to_owned());
        let engine_name = c"Lumen Engine";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_2);

        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

        for ext in extensions {
            log::debug!("Instance extension: {}", ext.to_string_lossy());
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        unsafe { entry.create_instance(&create_info, None) }.vk("vkCreateInstance")
    }

    fn check_layers(entry: &Entry, required: &[&CStr]) -> BackendResult<()> {
        if required.is_empty() {
            return Ok(());
        }
        let available = unsafe { entry.enumerate_instance_layer_properties() }
            .vk("vkEnumerateInstanceLayerProperties")?;
        let names: Vec<String> = available
            .iter()
            .map(|layer| fixed_str(&layer.layer_name))
            .collect();

        match find_missing(required, &names) {
            Some(missing) => {
                log::error!("Required validation layer is missing: {}", missing);
                Err(BackendError::MissingLayer(missing))
            }
            None => {
                log::info!("Validation layers enabled");
                Ok(())
            }
        }
    }

    fn check_extensions(entry: &Entry, required: &[&CStr]) -> BackendResult<()> {
        let available = unsafe { entry.enumerate_instance_extension_properties(None) }
            .vk("vkEnumerateInstanceExtensionProperties")?;
        let names: Vec<String> = available
            .iter()
            .map(|ext| fixed_str(&ext.extension_name))
            .collect();

        match find_missing(required, &names) {
            Some(missing) => {
                log::error!("Required instance extension is missing: {}", missing);
                Err(BackendError::MissingExtension(missing))
            }
            None => Ok(()),
        }
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> BackendResult<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .vk("vkCreateDebugUtilsMessengerEXT")?;

        log::debug!("Vulkan debug messenger created");
        Ok((debug_utils, messenger))
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance...");
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Convert a fixed-size, nul-terminated Vulkan name into a `String`.
pub(crate) fn fixed_str(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// First name in `required` that is not present in `available`.
pub(crate) fn find_missing(required: &[&CStr], available: &[String]) -> Option<String> {
    required
        .iter()
        .map(|name| name.to_string_lossy())
        .find(|name| !available.iter().any(|a| a == name))
        .map(|name| name.into_owned())
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[Vulkan] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[Vulkan] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::info!("[Vulkan] {}", message),
        _ => log::trace!("[Vulkan] {}", message),
    }

    vk::FALSE
}
