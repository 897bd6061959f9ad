//! The slime simulation engine.
//!
//! Owns the ping-pong pair of cell grids, the compute pipeline that applies
//! the update rule, and the step counter. Each [`step`](SlimeEngine::step)
//! reads the whole current grid, writes the whole next grid in one dispatch
//! and then swaps the two by exchanging ownership, so the roles flip without
//! copying a single cell. Host-visible identity follows the swap: after a
//! step, [`current_state`](SlimeEngine::current_state) is the grid that was
//! just written.

use glam::UVec2;

use crate::error::{GpuError, ShaderError};
use crate::gpu::GpuContext;
use crate::grid::{CellFormat, CellGrid, StorageAccess};
use crate::handle::GpuHandle;
use crate::pipeline::{uniform_layout_entry, Pipeline};
use crate::shader::{Stage, StageKind};

/// Built-in update rule: an outer-totalistic automaton on a torus with an
/// 8-cell neighborhood, survival on 2 or 3 neighbors and birth on 3.
pub const DEFAULT_RULE: &str = r#"
struct SimUniforms {
    resolution: vec2<u32>,
    step_index: u32,
    _pad: u32,
};

@group(0) @binding(0) var state_in: texture_2d<u32>;
@group(0) @binding(1) var state_out: texture_storage_2d<r32uint, write>;
@group(0) @binding(2) var<uniform> sim: SimUniforms;

fn cell_at(pos: vec2<i32>, res: vec2<i32>) -> u32 {
    let wrapped = (pos + res) % res;
    return min(textureLoad(state_in, wrapped, 0).r, 1u);
}

@compute @workgroup_size(16, 16)
fn step_cells(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= sim.resolution.x || gid.y >= sim.resolution.y) {
        return;
    }
    let res = vec2<i32>(sim.resolution);
    let pos = vec2<i32>(gid.xy);

    var neighbors = 0u;
    for (var dy = -1; dy <= 1; dy++) {
        for (var dx = -1; dx <= 1; dx++) {
            if (dx == 0 && dy == 0) {
                continue;
            }
            neighbors += cell_at(pos + vec2<i32>(dx, dy), res);
        }
    }

    let alive = cell_at(pos, res) == 1u;
    var next = 0u;
    if (alive && (neighbors == 2u || neighbors == 3u)) {
        next = 1u;
    } else if (!alive && neighbors == 3u) {
        next = 1u;
    }
    textureStore(state_out, pos, vec4<u32>(next, 0u, 0u, 0u));
}
"#;

/// Construction-time engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Grid resolution in cells.
    pub resolution: UVec2,
    /// Live-cell probability for the initial seed.
    pub density: f32,
    /// WGSL source of the update rule. `None` selects [`DEFAULT_RULE`].
    pub rule: Option<String>,
    /// Error on unknown rule parameter names instead of ignoring them.
    pub strict_parameters: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolution: UVec2::new(400, 400),
            density: 0.5,
            rule: None,
            strict_parameters: false,
        }
    }
}

/// GPU-resident cellular automaton with a double-buffered state.
pub struct SlimeEngine {
    front: CellGrid,
    back: CellGrid,
    pipeline: Pipeline,
    uniform_buffer: GpuHandle<wgpu::Buffer>,
    resolution: UVec2,
    step_count: u64,
}

impl SlimeEngine {
    /// Build the engine, compile the rule and seed the initial state.
    pub fn new(ctx: &GpuContext, config: &EngineConfig) -> Result<Self, ShaderError> {
        let resolution = UVec2::new(config.resolution.x.max(1), config.resolution.y.max(1));

        let front = CellGrid::new(ctx, "Cell Grid A", resolution, CellFormat::Occupancy);
        let back = CellGrid::new(ctx, "Cell Grid B", resolution, CellFormat::Occupancy);

        let source = config.rule.as_deref().unwrap_or(DEFAULT_RULE);
        let mut stage = Stage::new(ctx, StageKind::Compute, "Slime Rule", source)?
            .with_strict_parameters(config.strict_parameters);
        stage.set_parameter("resolution", resolution)?;

        let uniform_size = stage.uniform_block_size(0, 2).unwrap_or(16);
        let uniform_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sim Uniform Buffer"),
            size: uniform_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut pipeline = Pipeline::new("Slime Step");
        pipeline.attach(stage);
        pipeline.link_compute(
            ctx,
            &[
                front.layout_for_compute(0, StorageAccess::Read),
                back.layout_for_compute(1, StorageAccess::Write),
                uniform_layout_entry(2, wgpu::ShaderStages::COMPUTE),
            ],
        )?;

        let mut engine = Self {
            front,
            back,
            pipeline,
            uniform_buffer: GpuHandle::new(uniform_buffer),
            resolution,
            step_count: 0,
        };
        engine.randomize(ctx, config.density);
        Ok(engine)
    }

    #[inline]
    pub fn resolution(&self) -> UVec2 {
        self.resolution
    }

    /// Steps applied since construction. Reseeding does not reset it.
    #[inline]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// The grid holding the current simulation state.
    pub fn current_state(&self) -> &CellGrid {
        &self.front
    }

    /// Reseed the current state: each cell is live with probability
    /// `density`, independently.
    pub fn randomize(&mut self, ctx: &GpuContext, density: f32) {
        use rand::Rng;

        let density = density.clamp(0.0, 1.0);
        let mut rng = rand::thread_rng();
        let cells: Vec<u8> = (0..self.resolution.x as usize * self.resolution.y as usize)
            .map(|_| u8::from(rng.gen::<f32>() < density))
            .collect();

        self.front
            .upload(ctx, &cells, self.resolution, CellFormat::Occupancy);
        log::debug!(
            "reseeded {}x{} grid at density {:.2}",
            self.resolution.x,
            self.resolution.y,
            density
        );
    }

    /// Load an explicit cell pattern as the current state. One byte per
    /// cell, row-major, nonzero means live.
    pub fn load_state(&mut self, ctx: &GpuContext, cells: &[u8]) {
        self.front
            .upload(ctx, cells, self.resolution, CellFormat::Occupancy);
    }

    /// Apply the rule once to every cell.
    ///
    /// Records and submits its own command buffer so consecutive steps see
    /// their own `step_index`, then swaps the grid pair by ownership
    /// exchange.
    pub fn step(&mut self, ctx: &GpuContext) -> Result<(), ShaderError> {
        let step_index = self.step_count as u32;
        let stage = self
            .pipeline
            .stage_mut(StageKind::Compute)
            .ok_or(ShaderError::MissingStage(StageKind::Compute))?;
        stage.set_parameter("step_index", step_index)?;

        if let Some(bytes) = self
            .pipeline
            .stage(StageKind::Compute)
            .and_then(|s| s.param_bytes(0, 2))
        {
            ctx.queue.write_buffer(self.uniform_buffer.get(), 0, bytes);
        }

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Slime Step Encoder"),
            });
        self.pipeline.dispatch(
            ctx,
            &mut encoder,
            &[
                self.front.bind_for_compute(0, StorageAccess::Read),
                self.back.bind_for_compute(1, StorageAccess::Write),
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.uniform_buffer.get().as_entire_binding(),
                },
            ],
            self.resolution,
        )?;
        ctx.queue.submit(std::iter::once(encoder.finish()));

        std::mem::swap(&mut self.front, &mut self.back);
        self.step_count += 1;
        Ok(())
    }

    /// Count live cells in the current state. Blocks on a GPU readback.
    pub fn live_cells(&self, ctx: &GpuContext) -> Result<u64, GpuError> {
        let cells = self.front.read_back(ctx)?;
        Ok(cells.iter().filter(|&&c| c != 0).count() as u64)
    }
}
