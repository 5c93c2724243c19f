use particle_pipeline::*;
use proptest::prelude::*;

/// Tiny pinned sheet so each generated frame stays cheap.
struct Sheet;

impl Scene for Sheet {
    fn name(&self) -> &str {
        "sheet"
    }

    fn initialize(&mut self, buffers: &mut MappedBuffers<'_>, ctx: &mut SimContext) {
        let grid = create_spring_grid(
            buffers.store_mut(),
            &GridDesc {
                lower: Vec3::new(0.0, 1.0, 0.0),
                nx: 3,
                ny: 3,
                radius: 0.1,
                ..GridDesc::default()
            },
        );
        buffers.positions[grid.index(0, 0) as usize].w = 0.0;
        ctx.params.radius = 0.1;
        ctx.substeps = 1;
    }
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Frame,
    Key(char),
    Reset,
}

fn command() -> impl Strategy<Value = Command> {
    prop_oneof![
        4 => Just(Command::Frame),
        1 => prop::sample::select(vec!['p', 'o', 'g', '-', 'j', 'y', '1', '2']).prop_map(Command::Key),
        1 => Just(Command::Reset),
    ]
}

fn pipeline(async_compute: bool) -> FramePipeline {
    let mut scenes = SceneRegistry::new();
    scenes.register(Box::new(Sheet));
    scenes.register(Box::new(Sheet));
    FramePipeline::new(
        PipelineConfig {
            async_compute,
            extra_particles: 3,
            ..PipelineConfig::default()
        },
        scenes,
        Box::new(CpuSolver::new()),
    )
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn maps_and_unmaps_pair_up(
        commands in prop::collection::vec(command(), 1..40),
        async_compute in any::<bool>(),
    ) {
        let mut p = pipeline(async_compute);
        let capacity = p.store().capacity();
        let mut frames = 0u64;
        let mut resets = 1u64;

        for command in commands {
            let queued_reset = matches!(command, Command::Key('1' | '2'));
            match command {
                Command::Frame => {
                    p.run_frame().unwrap();
                    frames += 1;
                }
                Command::Key(key) => p.handle_key(key),
                Command::Reset => {
                    p.reset().unwrap();
                    resets += 1;
                }
            }
            if queued_reset {
                p.run_frame().unwrap();
                frames += 1;
                resets += 1;
            }

            let stats = p.map_stats();
            prop_assert!(stats.is_balanced());
            prop_assert_eq!(stats.maps, frames + resets);
            prop_assert_eq!(p.state(), FrameState::Idle);
            prop_assert_eq!(p.store().positions.len(), capacity);
            prop_assert_eq!(p.store().velocities.len(), capacity);
            prop_assert_eq!(p.store().phases.len(), capacity);
        }
    }

    #[test]
    fn active_indices_stay_in_capacity(frames in 1usize..12) {
        let mut p = pipeline(false);
        p.run_frames(frames).unwrap();
        let store = p.store();
        prop_assert!(store.active_indices.iter().all(|&i| (i as usize) < store.capacity()));
        prop_assert_eq!(p.solver().active_count(), store.active_count());
    }
}
