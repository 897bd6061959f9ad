//! Window, event loop and per-frame orchestration.
//!
//! One frame is: tick the clock, consume a pending reseed request, run the
//! fixed-step scheduler and apply that many simulation steps, then draw the
//! current state and the overlay. Setup failures and step failures are
//! fatal; the handler stores the error, exits the loop and [`run`] returns
//! it to `main`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use winit::{
    application::ApplicationHandler,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::engine::{EngineConfig, SlimeEngine};
use crate::error::RunError;
use crate::gpu::{GpuContext, SurfaceState};
use crate::params::SimParams;
use crate::present::Presenter;
use crate::time::{Clock, FixedStep};

const WINDOW_TITLE: &str = "Slime Simulation";
const WINDOW_SIZE: (u32, u32) = (1440, 1080);
/// Steps applied in one frame are capped so a stall cannot spiral.
const MAX_STEPS_PER_FRAME: u32 = 500;
const LIVE_CELL_REFRESH: Duration = Duration::from_secs(1);

#[cfg(feature = "egui")]
struct EguiLayer {
    ctx: egui::Context,
    state: egui_winit::State,
    renderer: egui_wgpu::Renderer,
}

#[cfg(feature = "egui")]
impl EguiLayer {
    fn new(ctx: &GpuContext, window: &Window, format: wgpu::TextureFormat) -> Self {
        let egui_ctx = egui::Context::default();
        let state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        let renderer = egui_wgpu::Renderer::new(&ctx.device, format, None, 1, false);
        Self {
            ctx: egui_ctx,
            state,
            renderer,
        }
    }
}

struct FrameState {
    ctx: GpuContext,
    surface: SurfaceState,
    engine: SlimeEngine,
    presenter: Presenter,
    clock: Clock,
    stepper: FixedStep,
    live_cells: u64,
    live_cells_updated: Instant,
    #[cfg(feature = "egui")]
    egui: EguiLayer,
}

struct App {
    window: Option<Arc<Window>>,
    state: Option<FrameState>,
    params: SimParams,
    fatal: Option<RunError>,
}

impl App {
    fn new() -> Self {
        Self {
            window: None,
            state: None,
            params: SimParams::default(),
            fatal: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<(), RunError> {
        let attrs = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(winit::dpi::LogicalSize::new(WINDOW_SIZE.0, WINDOW_SIZE.1));
        let window = Arc::new(event_loop.create_window(attrs)?);

        let (ctx, surface) = pollster::block_on(GpuContext::for_window(window.clone()))?;
        let engine = SlimeEngine::new(&ctx, &EngineConfig::default())?;
        let presenter = Presenter::new(&ctx, surface.config.format, engine.current_state())?;

        #[cfg(feature = "egui")]
        let egui = EguiLayer::new(&ctx, &window, surface.config.format);

        self.state = Some(FrameState {
            ctx,
            surface,
            engine,
            presenter,
            clock: Clock::new(),
            stepper: FixedStep::new().with_max_steps(MAX_STEPS_PER_FRAME),
            live_cells: 0,
            live_cells_updated: Instant::now(),
            #[cfg(feature = "egui")]
            egui,
        });

        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: RunError) {
        log::error!("{}", err);
        self.fatal = Some(err);
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let Some(window) = self.window.as_ref() else {
            return;
        };

        let delta = state.clock.tick();

        if self.params.take_randomize() {
            state
                .engine
                .randomize(&state.ctx, self.params.randomize_density());
        }

        let steps = state
            .stepper
            .advance(delta, self.params.steps_per_second());
        for _ in 0..steps {
            if let Err(e) = state.engine.step(&state.ctx) {
                let err = RunError::from(e);
                log::error!("{}", err);
                self.fatal = Some(err);
                event_loop.exit();
                return;
            }
        }

        // Counting live cells needs a blocking readback, so refresh at most
        // once a second.
        if state.live_cells_updated.elapsed() >= LIVE_CELL_REFRESH {
            match state.engine.live_cells(&state.ctx) {
                Ok(count) => {
                    log::debug!("live cells: {}", count);
                    state.live_cells = count;
                    state.live_cells_updated = Instant::now();
                }
                Err(e) => log::warn!("live cell readback failed: {}", e),
            }
        }

        let output = match state.surface.surface.get_current_texture() {
            Ok(output) => output,
            Err(e) => {
                match surface_error_action(&e) {
                    SurfaceAction::Reconfigure => {
                        let (w, h) = (state.surface.config.width, state.surface.config.height);
                        state.surface.resize(&state.ctx, w, h);
                    }
                    SurfaceAction::SkipFrame => log::warn!("surface error: {:?}", e),
                    SurfaceAction::Exit => event_loop.exit(),
                }
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = state
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        if let Err(e) = state
            .presenter
            .draw(&state.ctx, &mut encoder, &view, state.engine.current_state())
        {
            let err = RunError::from(e);
            log::error!("{}", err);
            self.fatal = Some(err);
            event_loop.exit();
            return;
        }

        #[cfg(feature = "egui")]
        draw_overlay(state, window, &mut self.params, &mut encoder, &view);

        state.ctx.queue.submit(std::iter::once(encoder.finish()));
        output.present();
    }
}

/// How `redraw` responds to a failed surface acquisition. Only an
/// out-of-memory surface ends the loop; everything else costs one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurfaceAction {
    Reconfigure,
    SkipFrame,
    Exit,
}

fn surface_error_action(error: &wgpu::SurfaceError) -> SurfaceAction {
    match error {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => SurfaceAction::Reconfigure,
        wgpu::SurfaceError::OutOfMemory => SurfaceAction::Exit,
        _ => SurfaceAction::SkipFrame,
    }
}

/// Build and render the control panel into its own pass over the frame.
#[cfg(feature = "egui")]
fn draw_overlay(
    state: &mut FrameState,
    window: &Window,
    params: &mut SimParams,
    encoder: &mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
) {
    let raw_input = state.egui.state.take_egui_input(window);

    let fps = state.clock.fps();
    let step_count = state.engine.step_count();
    let live_cells = state.live_cells;

    let output = state.egui.ctx.run(raw_input, |ctx| {
        egui::Window::new("Simulation")
            .resizable(false)
            .show(ctx, |ui| {
                let mut sps = params.steps_per_second();
                if ui
                    .add(egui::Slider::new(&mut sps, 1..=500).text("steps / second"))
                    .changed()
                {
                    params.set_steps_per_second(sps);
                }

                let mut density = params.randomize_density();
                if ui
                    .add(egui::Slider::new(&mut density, 0.0..=1.0).text("seed density"))
                    .changed()
                {
                    params.set_randomize_density(density);
                }

                if ui.button("Randomize").clicked() {
                    params.request_randomize();
                }

                ui.separator();
                ui.label(format!("{:.1} fps", fps));
                ui.label(format!("step {}", step_count));
                ui.label(format!("{} live cells", live_cells));
            });
    });

    state
        .egui
        .state
        .handle_platform_output(window, output.platform_output);

    let paint_jobs = state
        .egui
        .ctx
        .tessellate(output.shapes, output.pixels_per_point);
    let screen = egui_wgpu::ScreenDescriptor {
        size_in_pixels: [state.surface.config.width, state.surface.config.height],
        pixels_per_point: window.scale_factor() as f32,
    };

    for (id, delta) in &output.textures_delta.set {
        state
            .egui
            .renderer
            .update_texture(&state.ctx.device, &state.ctx.queue, *id, delta);
    }
    state.egui.renderer.update_buffers(
        &state.ctx.device,
        &state.ctx.queue,
        encoder,
        &paint_jobs,
        &screen,
    );

    {
        let pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Overlay Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        let mut pass = pass.forget_lifetime();
        state.egui.renderer.render(&mut pass, &paint_jobs, &screen);
    }

    for id in &output.textures_delta.free {
        state.egui.renderer.free_texture(id);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init(event_loop) {
                self.fail(event_loop, e);
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        #[cfg(feature = "egui")]
        if let (Some(state), Some(window)) = (self.state.as_mut(), self.window.as_ref()) {
            let response = state.egui.state.on_window_event(window, &event);
            if response.consumed {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = self.state.as_mut() {
                    state.surface.resize(&state.ctx, size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed && !event.repeat {
                    match event.physical_key {
                        PhysicalKey::Code(KeyCode::Escape) => event_loop.exit(),
                        PhysicalKey::Code(KeyCode::KeyR) => self.params.request_randomize(),
                        _ => {}
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                self.redraw(event_loop);
                // Re-arm even when the frame bailed early on a surface
                // error, so one bad acquisition costs a frame, not the loop.
                if let Some(window) = self.window.as_ref() {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

/// Open the window and run the simulation until the user closes it.
pub fn run() -> Result<(), RunError> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_surface_errors_do_not_end_the_loop() {
        assert_eq!(
            surface_error_action(&wgpu::SurfaceError::Lost),
            SurfaceAction::Reconfigure
        );
        assert_eq!(
            surface_error_action(&wgpu::SurfaceError::Outdated),
            SurfaceAction::Reconfigure
        );
        assert_eq!(
            surface_error_action(&wgpu::SurfaceError::Timeout),
            SurfaceAction::SkipFrame
        );
        assert_eq!(
            surface_error_action(&wgpu::SurfaceError::OutOfMemory),
            SurfaceAction::Exit
        );
    }
}
