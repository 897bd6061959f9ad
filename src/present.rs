//! Fullscreen presentation of the cell grid.
//!
//! Draws one oversized triangle and shades each fragment by loading the cell
//! under it, stretching the grid to the window. The grid is read-only here;
//! presentation binds whichever grid currently holds the state, so it always
//! shows the most recent step of the frame.

use crate::error::ShaderError;
use crate::gpu::GpuContext;
use crate::grid::CellGrid;
use crate::handle::GpuHandle;
use crate::pipeline::{uniform_layout_entry, Pipeline};
use crate::shader::{Stage, StageKind};

pub(crate) const VERTEX_SOURCE: &str = r#"
struct VsOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn fullscreen(@builtin(vertex_index) index: u32) -> VsOut {
    // One triangle large enough to cover the viewport.
    let corner = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: VsOut;
    out.position = vec4<f32>(corner * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(corner.x, 1.0 - corner.y);
    return out;
}
"#;

pub(crate) const FRAGMENT_SOURCE: &str = r#"
struct PresentUniforms {
    resolution: vec2<u32>,
};

@group(0) @binding(0) var cells: texture_2d<u32>;
@group(0) @binding(1) var<uniform> present: PresentUniforms;

@fragment
fn shade(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    let res = vec2<f32>(present.resolution);
    let pos = vec2<i32>(clamp(uv * res, vec2<f32>(0.0), res - 1.0));
    let v = f32(min(textureLoad(cells, pos, 0).r, 1u));
    return vec4<f32>(v * 0.85, v, v * 0.6, 1.0);
}
"#;

/// Renders a cell grid to a surface target.
pub struct Presenter {
    pipeline: Pipeline,
    uniform_buffer: GpuHandle<wgpu::Buffer>,
}

impl Presenter {
    /// Build the presentation pipeline for targets of `format`, sized for
    /// grids shaped like `grid`.
    pub fn new(
        ctx: &GpuContext,
        format: wgpu::TextureFormat,
        grid: &CellGrid,
    ) -> Result<Self, ShaderError> {
        let vertex = Stage::new(ctx, StageKind::Vertex, "Present Vertex", VERTEX_SOURCE)?;
        let mut fragment =
            Stage::new(ctx, StageKind::Fragment, "Present Fragment", FRAGMENT_SOURCE)?;
        fragment.set_parameter("resolution", grid.resolution())?;

        let uniform_size = fragment.uniform_block_size(0, 1).unwrap_or(8);
        let uniform_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Present Uniform Buffer"),
            size: uniform_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut pipeline = Pipeline::new("Present");
        pipeline.attach(vertex);
        pipeline.attach(fragment);
        pipeline.link_render(
            ctx,
            &[
                grid.layout_for_sample(0),
                uniform_layout_entry(1, wgpu::ShaderStages::FRAGMENT),
            ],
            format,
        )?;

        Ok(Self {
            pipeline,
            uniform_buffer: GpuHandle::new(uniform_buffer),
        })
    }

    /// Draw `grid` stretched over `target`.
    pub fn draw(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        grid: &CellGrid,
    ) -> Result<(), ShaderError> {
        if let Some(bytes) = self
            .pipeline
            .stage(StageKind::Fragment)
            .and_then(|s| s.param_bytes(0, 1))
        {
            ctx.queue.write_buffer(self.uniform_buffer.get(), 0, bytes);
        }

        self.pipeline.draw(
            ctx,
            encoder,
            target,
            &[
                grid.bind_for_sample(0),
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.uniform_buffer.get().as_entire_binding(),
                },
            ],
            3,
        )
    }
}
