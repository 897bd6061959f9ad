//! Stage composition and execution.
//!
//! A [`Pipeline`] holds at most one [`Stage`] per kind. Attaching a stage of
//! a kind already present replaces it and returns the previous stage, so
//! callers can hot-swap a rule shader without rebuilding the rest of the
//! pipeline. After attachment the pipeline is linked for one role (compute
//! or render), which bakes the bind-group layout and the device pipeline.
//!
//! Execution is scoped: [`dispatch`](Pipeline::dispatch) and
//! [`draw`](Pipeline::draw) open a pass, run it and close it before
//! returning. Work recorded in distinct passes on one encoder is ordered,
//! and writes from an earlier pass are visible to later passes, so a
//! dispatch that wrote a grid can be followed by a draw that samples it with
//! no explicit barrier.

use glam::UVec2;

use crate::error::ShaderError;
use crate::gpu::GpuContext;
use crate::handle::GpuHandle;
use crate::shader::{Stage, StageKind};

enum Compiled {
    None,
    Compute {
        pipeline: GpuHandle<wgpu::ComputePipeline>,
        layout: wgpu::BindGroupLayout,
        workgroup_size: [u32; 3],
    },
    Render {
        pipeline: GpuHandle<wgpu::RenderPipeline>,
        layout: wgpu::BindGroupLayout,
    },
}

/// A set of shader stages linked into one executable GPU pipeline.
pub struct Pipeline {
    label: String,
    stages: [Option<Stage>; 3],
    compiled: Compiled,
}

impl Pipeline {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            stages: [None, None, None],
            compiled: Compiled::None,
        }
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Attach a stage, replacing any stage of the same kind.
    ///
    /// Returns the replaced stage so the caller can keep or drop it. Any
    /// previous link is invalidated; the pipeline must be re-linked before
    /// the next dispatch or draw.
    pub fn attach(&mut self, stage: Stage) -> Option<Stage> {
        let replaced = self.stages[stage.kind().index()].replace(stage);
        self.compiled = Compiled::None;
        replaced
    }

    pub fn stage(&self, kind: StageKind) -> Option<&Stage> {
        self.stages[kind.index()].as_ref()
    }

    pub fn stage_mut(&mut self, kind: StageKind) -> Option<&mut Stage> {
        self.stages[kind.index()].as_mut()
    }

    fn require(&self, kind: StageKind) -> Result<&Stage, ShaderError> {
        self.stage(kind).ok_or(ShaderError::MissingStage(kind))
    }

    /// Link the attached compute stage against the given resource layout.
    pub fn link_compute(
        &mut self,
        ctx: &GpuContext,
        layout_entries: &[wgpu::BindGroupLayoutEntry],
    ) -> Result<(), ShaderError> {
        let stage = self.require(StageKind::Compute)?;

        let layout = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{} Bind Group Layout", self.label)),
                entries: layout_entries,
            });
        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{} Layout", self.label)),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
        let pipeline = ctx
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&self.label),
                layout: Some(&pipeline_layout),
                module: stage.module(),
                entry_point: Some(stage.entry_point()),
                compilation_options: Default::default(),
                cache: None,
            });

        self.compiled = Compiled::Compute {
            pipeline: GpuHandle::new(pipeline),
            layout,
            workgroup_size: stage.workgroup_size(),
        };
        Ok(())
    }

    /// Link the attached vertex and fragment stages for a render target of
    /// the given format.
    pub fn link_render(
        &mut self,
        ctx: &GpuContext,
        layout_entries: &[wgpu::BindGroupLayoutEntry],
        target_format: wgpu::TextureFormat,
    ) -> Result<(), ShaderError> {
        let vertex = self.require(StageKind::Vertex)?;
        let fragment = self.require(StageKind::Fragment)?;

        let layout = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{} Bind Group Layout", self.label)),
                entries: layout_entries,
            });
        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{} Layout", self.label)),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
        let pipeline = ctx
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&self.label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: vertex.module(),
                    entry_point: Some(vertex.entry_point()),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: fragment.module(),
                    entry_point: Some(fragment.entry_point()),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: target_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

        self.compiled = Compiled::Render {
            pipeline: GpuHandle::new(pipeline),
            layout,
        };
        Ok(())
    }

    /// Run the linked compute pipeline over `extent` items.
    ///
    /// Group counts are the ceiling of extent over the stage's workgroup
    /// size, so edge cells on non-multiple resolutions are still covered;
    /// the shader bounds-checks the overhang. The pass is opened and closed
    /// inside this call.
    pub fn dispatch(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        bindings: &[wgpu::BindGroupEntry],
        extent: UVec2,
    ) -> Result<(), ShaderError> {
        let Compiled::Compute {
            pipeline,
            layout,
            workgroup_size,
        } = &self.compiled
        else {
            return Err(ShaderError::NotLinked(self.label.clone()));
        };

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Bind Group", self.label)),
            layout,
            entries: bindings,
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(&self.label),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline.get());
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(
            extent.x.div_ceil(workgroup_size[0].max(1)),
            extent.y.div_ceil(workgroup_size[1].max(1)),
            1,
        );
        Ok(())
    }

    /// Run the linked render pipeline in its own pass, clearing `target`
    /// first and drawing `vertex_count` vertices.
    pub fn draw(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        bindings: &[wgpu::BindGroupEntry],
        vertex_count: u32,
    ) -> Result<(), ShaderError> {
        let Compiled::Render { pipeline, layout } = &self.compiled else {
            return Err(ShaderError::NotLinked(self.label.clone()));
        };

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Bind Group", self.label)),
            layout,
            entries: bindings,
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&self.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline.get());
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..vertex_count, 0..1);
        Ok(())
    }
}

/// Layout entry for a uniform buffer bound at `slot`.
pub fn uniform_layout_entry(slot: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: slot,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
