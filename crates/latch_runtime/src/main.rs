//! Latch Engine Runtime
//!
//! Minimal binary that links the engine crates and drives the per-frame
//! dataflow end to end: mutate the `World`, run the scheduler, build and
//! compile a frame graph, and submit it to a device. Runs headless
//! against `NullDevice` so the binary boots with no adapter present;
//! swapping in `latch_render::device::WgpuDevice` only changes
//! `build_device`.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Result;

use latch_asset::{AssetPtr, ShaderBinary, ShaderLoadError, ShaderLoader};
use latch_core::ecs::{type_index, Component, GroupFilter, GroupHandle, Scheduler, Stage, System, World};
use latch_core::time::{SimulationTime, TICK_DURATION};
use latch_render::command::TracingRecorder;
use latch_render::device::{Device, NullDevice};
use latch_render::framegraph::{CompiledGraph, Extent, FrameGraphBuilder, ImageDesc, ImageFormat, PersistentStore};

/// Stands in for the embedder's real asset pipeline: a fixed table of
/// precompiled SPIR-V blobs keyed by logical name.
struct StaticShaderLoader {
    shaders: HashMap<&'static str, Vec<u8>>,
}

impl ShaderLoader for StaticShaderLoader {
    fn load_spirv(&self, name: &str) -> Result<ShaderBinary, ShaderLoadError> {
        self.shaders
            .get(name)
            .cloned()
            .map(ShaderBinary)
            .ok_or_else(|| ShaderLoadError::NotFound(name.to_string()))
    }
}

#[derive(Clone, Copy, Default)]
struct Position {
    x: f32,
    y: f32,
}
impl Component for Position {}

#[derive(Clone, Copy, Default)]
struct Velocity {
    dx: f32,
    dy: f32,
}
impl Component for Velocity {}

struct IntegrateVelocity {
    group: OnceLock<GroupHandle>,
}

impl System for IntegrateVelocity {
    fn name(&self) -> &str {
        "integrate_velocity"
    }

    fn stage(&self) -> Stage {
        Stage::Update
    }

    fn run(&self, world: &World) {
        let handle = *self
            .group
            .get_or_init(|| world.group(GroupFilter::new().with_component(type_index::<Position>()).with_component(type_index::<Velocity>())));
        for entity in world.group_members(handle) {
            let delta = world.with_component::<Velocity, _>(entity, |v| (v.dx, v.dy));
            if let Some((dx, dy)) = delta {
                world.with_component_mut::<Position, _>(entity, |p| {
                    p.x += dx;
                    p.y += dy;
                });
            }
        }
    }
}

fn build_world() -> (World, Scheduler) {
    let world = World::new();
    world.register_component::<Position>();
    world.register_component::<Velocity>();

    for i in 0..4 {
        let entity = world.create_entity();
        world.add_component(entity, Position { x: 0.0, y: 0.0 });
        world.add_component(entity, Velocity { dx: i as f32, dy: 1.0 });
    }

    let mut scheduler = Scheduler::sequential();
    scheduler.add_system(Box::new(IntegrateVelocity { group: OnceLock::new() }));
    (world, scheduler)
}

/// Builds the one-pass frame graph that clears the backbuffer. A real
/// renderer would add geometry and post-processing passes here; this is
/// enough to exercise compilation and submission end to end.
fn build_frame_graph(persistent_store: &mut PersistentStore, shader_loader: &dyn ShaderLoader) -> Result<CompiledGraph> {
    let clear_shader: AssetPtr<ShaderBinary> = AssetPtr::new(0, 0);
    let binary = shader_loader.load_spirv("clear_backbuffer.frag")?;
    tracing::debug!(asset = clear_shader.id(), bytes = binary.0.len(), "loaded clear pass shader");

    let mut graph = FrameGraphBuilder::new();
    let backbuffer = graph.declare_image(ImageDesc {
        format: ImageFormat::Rgba8,
        extent: Extent::new_2d(1920, 1080),
        mip_levels: 1,
    });
    graph.add_pass("clear_backbuffer", |pass| {
        pass.add_color_output(backbuffer);
    });
    graph.set_executor(0, |recorder| {
        recorder.bind_descriptor_set(0);
        recorder.draw(0, 0);
    });
    Ok(graph.compile(persistent_store)?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    tracing::info!("Latch Engine v{}", latch_core::VERSION);

    let (world, scheduler) = build_world();
    let device = NullDevice::new();
    let mut persistent_store = PersistentStore::new();
    let mut sim_time = SimulationTime::new();
    let mut frame_timer = latch_metrics::FrameTimer::new(60);
    let shader_loader = StaticShaderLoader {
        shaders: HashMap::from([("clear_backbuffer.frag", vec![0x03, 0x02, 0x23, 0x07])]),
    };

    tracing::info!("Running 3 headless frames against NullDevice");
    for frame in 0..3u32 {
        frame_timer.begin();
        let due = sim_time.accumulate(TICK_DURATION);
        for _ in 0..due {
            world.tick(&scheduler);
        }

        let mut compiled = build_frame_graph(&mut persistent_store, &shader_loader)?;
        let mut recorder = TracingRecorder;
        compiled.record(&mut recorder);

        let (handle, buffer) = device.command_pools().alloc_for_current_thread();
        // Submit/wait failures are fatal by contract: the device layer
        // cannot recover from a partial submission, so it aborts rather
        // than returning an error the loop might paper over.
        let fence = match device.graphics_queue().submit(handle) {
            Ok(fence) => fence,
            Err(err) => latch_render::error::abort_on_device_error(err),
        };
        if let Err(err) = device.graphics_queue().wait_timeline(fence.0, Duration::from_secs(1)) {
            latch_render::error::abort_on_device_error(err);
        }
        device.command_pools().release(buffer);

        frame_timer.end();
        tracing::info!(
            frame,
            tick = sim_time.tick_count(),
            frame_time_ms = frame_timer.frame_time_ms(),
            "frame submitted"
        );
    }

    tracing::info!("Runtime shut down cleanly");
    Ok(())
}
