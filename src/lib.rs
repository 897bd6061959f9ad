//! physarum - a GPU-resident slime cellular automaton.
//!
//! The simulation state lives entirely on the GPU as a double-buffered pair
//! of cell grids. A compute pipeline applies the update rule to every cell
//! once per step; a fixed-step scheduler decides how many steps each frame
//! owes at the configured rate; a render pipeline stretches the current
//! grid over the window. GPU objects are owned through move-only handles,
//! so every texture, shader and pipeline has exactly one owner and is
//! released exactly once.
//!
//! The windowed application is started with [`run`]. The engine itself has
//! no window dependency and runs against a headless device in tests.

pub mod app;
pub mod engine;
pub mod error;
pub mod gpu;
pub mod grid;
pub mod handle;
pub mod params;
pub mod pipeline;
pub mod present;
pub mod shader;
pub mod time;

pub use app::run;
pub use engine::{EngineConfig, SlimeEngine};
pub use error::{GpuError, RunError, ShaderError};
pub use gpu::GpuContext;
pub use grid::{CellFormat, CellGrid, StorageAccess};
pub use handle::GpuHandle;
pub use params::SimParams;
pub use pipeline::Pipeline;
pub use shader::{ParamValue, Stage, StageKind};
pub use time::{Clock, FixedStep};
