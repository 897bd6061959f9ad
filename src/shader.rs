//! Shader stages with named-parameter assignment.
//!
//! A [`Stage`] is one compiled WGSL program of a declared kind (vertex,
//! fragment or compute). Sources are parsed and validated with naga before
//! the device ever sees them, so a broken shader surfaces as a typed
//! [`ShaderError`] carrying the complete diagnostic log instead of a device
//! panic deep inside a constructor.
//!
//! Validation also yields the module IR, from which the stage reflects its
//! uniform blocks: every struct member of every `var<uniform>` becomes a
//! named parameter. [`Stage::set_parameter`] writes the value into a CPU-side
//! shadow of the block; the owner flushes the shadow into its uniform buffer
//! before each dispatch or draw. Setting a name the shader does not declare
//! is ignored by default (logged at debug level); strict mode turns it into
//! an error.

use glam::{UVec2, Vec2, Vec3, Vec4};

use crate::error::ShaderError;
use crate::gpu::GpuContext;
use crate::handle::GpuHandle;

/// Kind of a shader stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Vertex,
    Fragment,
    Compute,
}

impl StageKind {
    pub(crate) fn index(self) -> usize {
        match self {
            StageKind::Vertex => 0,
            StageKind::Fragment => 1,
            StageKind::Compute => 2,
        }
    }

    fn naga_stage(self) -> naga::ShaderStage {
        match self {
            StageKind::Vertex => naga::ShaderStage::Vertex,
            StageKind::Fragment => naga::ShaderStage::Fragment,
            StageKind::Compute => naga::ShaderStage::Compute,
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StageKind::Vertex => "vertex",
            StageKind::Fragment => "fragment",
            StageKind::Compute => "compute",
        };
        f.write_str(name)
    }
}

/// Supported parameter value types.
#[derive(Clone, Copy, Debug)]
pub enum ParamValue {
    Bool(bool),
    F32(f32),
    I32(i32),
    U32(u32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    UVec2(UVec2),
}

impl ParamValue {
    /// Byte size as a uniform struct member (without trailing padding).
    fn byte_size(&self) -> u32 {
        match self {
            ParamValue::Bool(_) | ParamValue::F32(_) | ParamValue::I32(_) | ParamValue::U32(_) => 4,
            ParamValue::Vec2(_) | ParamValue::UVec2(_) => 8,
            ParamValue::Vec3(_) => 12,
            ParamValue::Vec4(_) => 16,
        }
    }

    fn write_bytes(&self, dst: &mut [u8]) {
        match self {
            // WGSL has no bool in uniform blocks; booleans ride as u32.
            ParamValue::Bool(v) => dst.copy_from_slice(&(*v as u32).to_le_bytes()),
            ParamValue::F32(v) => dst.copy_from_slice(&v.to_le_bytes()),
            ParamValue::I32(v) => dst.copy_from_slice(&v.to_le_bytes()),
            ParamValue::U32(v) => dst.copy_from_slice(&v.to_le_bytes()),
            ParamValue::Vec2(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
            ParamValue::Vec3(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
            ParamValue::Vec4(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
            ParamValue::UVec2(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::F32(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::I32(v)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::U32(v)
    }
}

impl From<Vec2> for ParamValue {
    fn from(v: Vec2) -> Self {
        ParamValue::Vec2(v)
    }
}

impl From<Vec3> for ParamValue {
    fn from(v: Vec3) -> Self {
        ParamValue::Vec3(v)
    }
}

impl From<Vec4> for ParamValue {
    fn from(v: Vec4) -> Self {
        ParamValue::Vec4(v)
    }
}

impl From<UVec2> for ParamValue {
    fn from(v: UVec2) -> Self {
        ParamValue::UVec2(v)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct BlockMember {
    name: String,
    offset: u32,
    size: u32,
}

/// CPU shadow of one `var<uniform>` block.
#[derive(Debug, Clone)]
pub(crate) struct UniformBlock {
    group: u32,
    binding: u32,
    bytes: Vec<u8>,
    members: Vec<BlockMember>,
}

/// One compiled WGSL stage of a declared kind.
#[derive(Debug)]
pub struct Stage {
    module: GpuHandle<wgpu::ShaderModule>,
    kind: StageKind,
    entry_point: String,
    workgroup_size: [u32; 3],
    blocks: Vec<UniformBlock>,
    strict: bool,
    label: String,
}

impl Stage {
    /// Compile a standalone stage of the given kind from WGSL source.
    ///
    /// Fails with the full diagnostic log on parse or validation errors, and
    /// when the source declares no entry point of the requested kind. There
    /// is no fallback path; callers propagate this to the run loop, which
    /// treats it as fatal.
    pub fn new(
        ctx: &GpuContext,
        kind: StageKind,
        label: &str,
        source: &str,
    ) -> Result<Self, ShaderError> {
        let ir = naga::front::wgsl::parse_str(source).map_err(|e| ShaderError::Parse {
            label: label.to_string(),
            log: e.emit_to_string(source),
        })?;

        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&ir)
        .map_err(|e| ShaderError::Validation {
            label: label.to_string(),
            log: format_validation_error(source, &e),
        })?;

        let entry = ir
            .entry_points
            .iter()
            .find(|ep| ep.stage == kind.naga_stage())
            .ok_or_else(|| ShaderError::MissingEntryPoint {
                label: label.to_string(),
                kind,
            })?;
        let entry_point = entry.name.clone();
        let workgroup_size = entry.workgroup_size;

        let blocks = reflect_uniform_blocks(&ir);

        let module = ctx
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

        log::debug!(
            "compiled {} stage '{}' (entry '{}', {} uniform block(s))",
            kind,
            label,
            entry_point,
            blocks.len()
        );

        Ok(Self {
            module: GpuHandle::new(module),
            kind,
            entry_point,
            workgroup_size,
            blocks,
            strict: false,
            label: label.to_string(),
        })
    }

    /// Fail on unresolved parameter names instead of silently ignoring them.
    pub fn with_strict_parameters(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    #[inline]
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Workgroup size of the compute entry point. Zero for other kinds.
    #[inline]
    pub fn workgroup_size(&self) -> [u32; 3] {
        self.workgroup_size
    }

    pub(crate) fn module(&self) -> &wgpu::ShaderModule {
        self.module.get()
    }

    /// Assign a named uniform parameter.
    ///
    /// The name is resolved against the reflected uniform blocks at call
    /// time. An unknown name is a no-op (logged at debug level); a known
    /// name whose declared member size does not match the value is also a
    /// no-op but logged at warn level. Strict mode turns each case into its
    /// own error.
    pub fn set_parameter(
        &mut self,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<(), ShaderError> {
        let value = value.into();
        match write_param(&mut self.blocks, name, value) {
            ParamWrite::Written => Ok(()),
            ParamWrite::SizeMismatch { expected } => {
                if self.strict {
                    return Err(ShaderError::ParameterSizeMismatch {
                        stage: self.label.clone(),
                        name: name.to_string(),
                        expected,
                        got: value.byte_size(),
                    });
                }
                log::warn!(
                    "stage '{}': parameter '{}' expects {} bytes, got {}; ignoring",
                    self.label,
                    name,
                    expected,
                    value.byte_size()
                );
                Ok(())
            }
            ParamWrite::UnknownName => {
                if self.strict {
                    return Err(ShaderError::UnknownParameter {
                        stage: self.label.clone(),
                        name: name.to_string(),
                    });
                }
                log::debug!("stage '{}': ignoring unknown parameter '{}'", self.label, name);
                Ok(())
            }
        }
    }

    /// Byte size of the uniform block at (group, binding), if the stage
    /// declares one.
    pub fn uniform_block_size(&self, group: u32, binding: u32) -> Option<u64> {
        self.block(group, binding).map(|b| b.bytes.len() as u64)
    }

    /// Current shadow contents for the uniform block at (group, binding).
    /// The owner writes these into its uniform buffer before use.
    pub fn param_bytes(&self, group: u32, binding: u32) -> Option<&[u8]> {
        self.block(group, binding).map(|b| b.bytes.as_slice())
    }

    fn block(&self, group: u32, binding: u32) -> Option<&UniformBlock> {
        self.blocks
            .iter()
            .find(|b| b.group == group && b.binding == binding)
    }
}

/// Outcome of resolving a parameter name against the reflected blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParamWrite {
    Written,
    UnknownName,
    SizeMismatch { expected: u32 },
}

/// Write `value` into the member named `name`, if a block declares one of
/// matching size.
pub(crate) fn write_param(blocks: &mut [UniformBlock], name: &str, value: ParamValue) -> ParamWrite {
    for block in blocks {
        if let Some(member) = block.members.iter().find(|m| m.name == name) {
            if member.size != value.byte_size() {
                return ParamWrite::SizeMismatch {
                    expected: member.size,
                };
            }
            let start = member.offset as usize;
            let end = start + member.size as usize;
            value.write_bytes(&mut block.bytes[start..end]);
            return ParamWrite::Written;
        }
    }
    ParamWrite::UnknownName
}

/// Collect every `var<uniform>` struct in the module as a named block.
pub(crate) fn reflect_uniform_blocks(module: &naga::Module) -> Vec<UniformBlock> {
    let mut blocks = Vec::new();
    for (_, var) in module.global_variables.iter() {
        if var.space != naga::AddressSpace::Uniform {
            continue;
        }
        let Some(resource) = &var.binding else { continue };
        let naga::TypeInner::Struct { members, span } = &module.types[var.ty].inner else {
            continue;
        };

        let members = members
            .iter()
            .filter_map(|m| {
                let name = m.name.clone()?;
                let size = module.types[m.ty].inner.size(module.to_ctx());
                Some(BlockMember {
                    name,
                    offset: m.offset,
                    size,
                })
            })
            .collect();

        blocks.push(UniformBlock {
            group: resource.group,
            binding: resource.binding,
            bytes: vec![0; *span as usize],
            members,
        });
    }
    blocks
}

fn format_validation_error(
    source: &str,
    err: &naga::WithSpan<naga::valid::ValidationError>,
) -> String {
    use std::fmt::Write;

    let mut log = String::new();
    let _ = writeln!(log, "{}", err);

    let mut cause: &dyn std::error::Error = err.as_inner();
    while let Some(next) = cause.source() {
        let _ = writeln!(log, "  caused by: {}", next);
        cause = next;
    }

    for (span, context) in err.spans() {
        let location = span.location(source);
        let _ = writeln!(
            log,
            "  at line {}:{}: {}",
            location.line_number, location.line_position, context
        );
    }
    log
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK_SOURCE: &str = r#"
struct SimUniforms {
    resolution: vec2<u32>,
    step_index: u32,
    flavor: f32,
};

@group(0) @binding(2)
var<uniform> sim: SimUniforms;

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x >= sim.resolution.x || f32(sim.step_index) < sim.flavor {
        return;
    }
}
"#;

    fn parse(source: &str) -> naga::Module {
        naga::front::wgsl::parse_str(source).expect("test source must parse")
    }

    #[test]
    fn test_reflects_uniform_block_members() {
        let blocks = reflect_uniform_blocks(&parse(BLOCK_SOURCE));
        assert_eq!(blocks.len(), 1);

        let block = &blocks[0];
        assert_eq!((block.group, block.binding), (0, 2));
        assert_eq!(block.bytes.len(), 16);

        let names: Vec<_> = block.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["resolution", "step_index", "flavor"]);

        let step = &block.members[1];
        assert_eq!(step.offset, 8);
        assert_eq!(step.size, 4);
    }

    #[test]
    fn test_reflection_skips_storage_bindings() {
        let source = r#"
@group(0) @binding(0)
var<storage, read_write> cells: array<u32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x < arrayLength(&cells) {
        cells[gid.x] = 0u;
    }
}
"#;
        assert!(reflect_uniform_blocks(&parse(source)).is_empty());
    }

    #[test]
    fn test_parse_error_log_mentions_location() {
        let err = naga::front::wgsl::parse_str("fn broken( {").unwrap_err();
        let log = err.emit_to_string("fn broken( {");
        assert!(!log.is_empty());
    }

    #[test]
    fn test_param_value_sizes() {
        assert_eq!(ParamValue::from(1.0f32).byte_size(), 4);
        assert_eq!(ParamValue::from(true).byte_size(), 4);
        assert_eq!(ParamValue::from(Vec3::ZERO).byte_size(), 12);
        assert_eq!(ParamValue::from(UVec2::new(4, 4)).byte_size(), 8);
    }

    #[test]
    fn test_default_rule_and_present_shaders_validate() {
        for (label, source) in [
            ("rule", crate::engine::DEFAULT_RULE),
            ("present.vert", crate::present::VERTEX_SOURCE),
            ("present.frag", crate::present::FRAGMENT_SOURCE),
        ] {
            let module = naga::front::wgsl::parse_str(source)
                .unwrap_or_else(|e| panic!("{label}: {}", e.emit_to_string(source)));
            naga::valid::Validator::new(
                naga::valid::ValidationFlags::all(),
                naga::valid::Capabilities::all(),
            )
            .validate(&module)
            .unwrap_or_else(|e| panic!("{label}: {}", format_validation_error(source, &e)));
        }
    }

    #[test]
    fn test_write_param_distinguishes_unknown_from_mismatched() {
        let mut blocks = reflect_uniform_blocks(&parse(BLOCK_SOURCE));

        assert_eq!(
            write_param(&mut blocks, "missing", ParamValue::from(1.0f32)),
            ParamWrite::UnknownName
        );
        assert_eq!(
            write_param(&mut blocks, "flavor", ParamValue::from(Vec3::ZERO)),
            ParamWrite::SizeMismatch { expected: 4 }
        );
        // The rejected write must not touch the block.
        assert!(blocks[0].bytes.iter().all(|&b| b == 0));

        assert_eq!(
            write_param(&mut blocks, "flavor", ParamValue::from(2.0f32)),
            ParamWrite::Written
        );
        assert_eq!(&blocks[0].bytes[12..16], &2.0f32.to_le_bytes());
    }

    #[test]
    fn test_step_uniforms_expose_expected_parameters() {
        let blocks = reflect_uniform_blocks(&parse(crate::engine::DEFAULT_RULE));
        assert_eq!(blocks.len(), 1);
        let names: Vec<_> = blocks[0].members.iter().map(|m| m.name.as_str()).collect();
        assert!(names.contains(&"resolution"));
        assert!(names.contains(&"step_index"));
    }
}
