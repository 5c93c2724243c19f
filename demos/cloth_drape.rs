use std::process::ExitCode;

use log::{error, info};
use particle_pipeline::*;

fn main() -> ExitCode {
    env_logger::init();

    let config = PipelineConfig {
        initial_scene: Some("cloth_drape".into()),
        warmup: true,
        ..PipelineConfig::default()
    };
    let mut sim = match ParticleSimulation::new(config) {
        Ok(sim) => sim,
        Err(err) => {
            error!("Failed to start the simulation: {err}");
            return ExitCode::FAILURE;
        }
    };

    // let the cloth settle, then blow a gust through it
    for frame in 0..240 {
        if frame == 60 {
            sim.key_down('j');
        }
        if let Err(err) = sim.step() {
            error!("Frame {frame} failed: {err}");
            return ExitCode::FAILURE;
        }
    }

    let export = std::env::temp_dir().join("cloth_drape_frame");
    sim.pipeline_mut().request_export(&export);
    if let Err(err) = sim.step() {
        error!("Export frame failed: {err}");
        return ExitCode::FAILURE;
    }

    let bounds = sim.particles().particle_bounds();
    info!("Cloth bounds after 4 s: {:?} .. {:?}", bounds.min, bounds.max);
    sim.pipeline().profiler().report();
    println!(
        "Cloth spans {:?} to {:?}; OBJ written next to {}",
        bounds.min,
        bounds.max,
        export.display()
    );
    ExitCode::SUCCESS
}
