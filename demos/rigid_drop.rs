use std::process::ExitCode;

use log::error;
use particle_pipeline::*;

fn main() -> ExitCode {
    env_logger::init();

    let config = PipelineConfig {
        initial_scene: Some("rigid_drop".into()),
        async_compute: false,
        ..PipelineConfig::default()
    };
    let mut sim = match ParticleSimulation::new(config) {
        Ok(sim) => sim,
        Err(err) => {
            error!("Failed to start the simulation: {err}");
            return ExitCode::FAILURE;
        }
    };

    for second in 1..=3 {
        for _ in 0..60 {
            if let Err(err) = sim.step() {
                error!("Frame failed: {err}");
                return ExitCode::FAILURE;
            }
        }
        let store = sim.particles();
        for (i, t) in store.rigid_translations.iter().enumerate() {
            println!("t = {second} s, brick {i}: {t:?}");
        }
    }
    ExitCode::SUCCESS
}
