//! Deformation shader source, reflection and permutation setup.
//!
//! [`DEFORMATION_SHADER_SOURCE`] is the WGSL vertex shader that skins a render
//! mesh against the tet mesh. [`ShaderParameterMap`] reflects the resource
//! bindings a WGSL module declares, using naga, so per-draw binding code can
//! skip parameters a shader does not use.
//!
//! # Example
//!
//! ```ignore
//! let map = ShaderParameterMap::from_wgsl_entry_point(DEFORMATION_SHADER_SOURCE, "vs_main")?;
//! let mut parameters = DeformationShaderParameters::construct(ShaderStage::Vertex).unwrap();
//! parameters.bind(&map);
//!
//! let mut environment = ShaderCompilationEnvironment::new();
//! if should_compile_permutation(device.capabilities()) {
//!     modify_compilation_environment(device.capabilities(), &mut environment);
//! }
//! ```

use std::collections::{BTreeMap, HashMap};

use femfx_core::profile_scope;

use crate::device::DeviceCapabilities;
use crate::error::GraphicsError;

/// WGSL source of the deformation vertex shader.
pub const DEFORMATION_SHADER_SOURCE: &str = include_str!("../../shaders/fem_deform.wgsl");

/// Pipeline-overridable constant that switches color reads to manual fetch.
pub const MANUAL_VERTEX_FETCH: &str = "MANUAL_VERTEX_FETCH";

/// Name of the per-draw uniform block.
pub const VERTEX_FETCH_UNIFORMS: &str = "fem_vertex_fetch";

/// Shader pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl From<naga::ShaderStage> for ShaderStage {
    fn from(stage: naga::ShaderStage) -> Self {
        match stage {
            naga::ShaderStage::Vertex => Self::Vertex,
            naga::ShaderStage::Fragment => Self::Fragment,
            _ => Self::Compute,
        }
    }
}

/// Bind group slot of a shader resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceBinding {
    pub group: u32,
    pub binding: u32,
}

/// Resource bindings a compiled shader declares, by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderParameterMap {
    parameters: HashMap<String, ResourceBinding>,
    overrides: Vec<String>,
}

impl ShaderParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reflect every named resource binding of a WGSL module.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::ShaderReflection`] if the source does not parse
    /// or validate.
    pub fn from_wgsl(source: &str) -> Result<Self, GraphicsError> {
        let (module, _) = parse_and_validate(source)?;
        let mut map = Self::new();
        for (_, global) in module.global_variables.iter() {
            if let (Some(name), Some(binding)) = (&global.name, &global.binding) {
                map.insert(name, binding);
            }
        }
        map.collect_overrides(&module);
        Ok(map)
    }

    /// Reflect only the resource bindings used by one entry point.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::ShaderReflection`] if the source is invalid or
    /// has no entry point called `entry_point`.
    pub fn from_wgsl_entry_point(source: &str, entry_point: &str) -> Result<Self, GraphicsError> {
        let (module, info) = parse_and_validate(source)?;
        let index = module
            .entry_points
            .iter()
            .position(|ep| ep.name == entry_point)
            .ok_or_else(|| {
                GraphicsError::ShaderReflection(format!("entry point '{entry_point}' not found"))
            })?;
        let function_info = info.get_entry_point(index);

        let mut map = Self::new();
        for (handle, global) in module.global_variables.iter() {
            if function_info[handle].is_empty() {
                continue;
            }
            if let (Some(name), Some(binding)) = (&global.name, &global.binding) {
                map.insert(name, binding);
            }
        }
        map.collect_overrides(&module);
        Ok(map)
    }

    /// Add a parameter by hand.
    pub fn with_parameter(mut self, name: impl Into<String>, group: u32, binding: u32) -> Self {
        self.parameters
            .insert(name.into(), ResourceBinding { group, binding });
        self
    }

    fn insert(&mut self, name: &str, binding: &naga::ResourceBinding) {
        self.parameters.insert(
            name.to_string(),
            ResourceBinding {
                group: binding.group,
                binding: binding.binding,
            },
        );
    }

    fn collect_overrides(&mut self, module: &naga::Module) {
        self.overrides = module
            .overrides
            .iter()
            .filter_map(|(_, o)| o.name.clone())
            .collect();
    }

    /// Find the binding slot of a parameter.
    pub fn find(&self, name: &str) -> Option<ResourceBinding> {
        self.parameters.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    /// Check whether the module declares a pipeline-overridable constant.
    pub fn has_override(&self, name: &str) -> bool {
        self.overrides.iter().any(|o| o == name)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Parameter names in binding order.
    pub fn names(&self) -> Vec<&str> {
        let mut entries: Vec<_> = self.parameters.iter().collect();
        entries.sort_by_key(|(_, binding)| **binding);
        entries.into_iter().map(|(name, _)| name.as_str()).collect()
    }
}

fn parse_and_validate(source: &str) -> Result<(naga::Module, naga::valid::ModuleInfo), GraphicsError> {
    profile_scope!("shader_reflect");

    let module = naga::front::wgsl::parse_str(source).map_err(|e| {
        GraphicsError::ShaderReflection(format!("WGSL parse error:\n{}", e.emit_to_string(source)))
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    let info = validator
        .validate(&module)
        .map_err(|e| GraphicsError::ShaderReflection(format!("Validation error: {e}")))?;

    Ok((module, info))
}

/// Values of pipeline-overridable constants for one shader permutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderCompilationEnvironment {
    overrides: BTreeMap<String, f64>,
}

impl ShaderCompilationEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_override(&mut self, name: impl Into<String>, value: f64) {
        self.overrides.insert(name.into(), value);
    }

    pub fn with_override(mut self, name: impl Into<String>, value: f64) -> Self {
        self.set_override(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.overrides.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.overrides.contains_key(name)
    }

    /// Constants in the form pipeline creation takes them.
    pub fn constants(&self) -> Vec<(&str, f64)> {
        self.overrides
            .iter()
            .map(|(name, value)| (name.as_str(), *value))
            .collect()
    }
}

/// Whether the deformation shader can run on a device at all.
///
/// The vertex stage reads the tet mesh from storage buffers.
pub fn should_compile_permutation(capabilities: &DeviceCapabilities) -> bool {
    capabilities.vertex_storage_buffers
}

/// Enable manual vertex fetch when the device supports it, unless the
/// environment already chose a value.
pub fn modify_compilation_environment(
    capabilities: &DeviceCapabilities,
    environment: &mut ShaderCompilationEnvironment,
) {
    if !environment.contains(MANUAL_VERTEX_FETCH) && capabilities.manual_vertex_fetch {
        environment.set_override(MANUAL_VERTEX_FETCH, 1.0);
    }
}
