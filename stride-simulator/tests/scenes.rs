use stride_simulator::{Scene, Simulator, SimulatorOptions};

const DEFAULT: &str = include_str!("../../scenarios/default.toml");

#[test]
fn test_default_scene_runs() {
    let scene = Scene::from_toml_str(DEFAULT).unwrap();
    let mut simulator = Simulator::from_scene(&scene, &SimulatorOptions::default()).unwrap();

    assert_eq!(simulator.agents().len(), 30 + 15);
    assert_eq!(simulator.obstacles().len(), 1 + 1 + 4);

    for _ in 0..100 {
        simulator.step();
    }

    for agent in simulator.agents() {
        assert!(agent.pos.is_finite());
        assert!(agent.vel.length() <= agent.max_speed + 1e-3);
    }
    assert_eq!(simulator.diagnostic_log.total_steps, 100);
    assert!(simulator.last_metrics().is_some_and(|m| m.step == 100));
}

#[test]
fn test_default_scene_is_deterministic() {
    let scene = Scene::from_toml_str(DEFAULT).unwrap();
    let run = || {
        let mut simulator = Simulator::from_scene(&scene, &SimulatorOptions::default()).unwrap();
        for _ in 0..50 {
            simulator.step();
        }
        simulator.snapshots()
    };

    let (a, b) = (run(), run());

    for (a, b) in a.iter().zip(&b) {
        assert_eq!(a.pos, b.pos);
        assert_eq!(a.state, b.state);
    }
}
