use assert_float_eq::*;
use stride_simulator::{Scene, SimError, Simulator, SimulatorOptions};

const SCENE: &str = r#"
[simulation]
time_step = 0.1
max_duration = 3.0

[models.default]
kind = "power_law"

[profiles.walker]
model = "default"
radius = 0.2

[[states]]
name = "idle"

[[states]]
name = "leave"
final = true

[[groups]]
profile = "walker"
state = "idle"
generator = { kind = "rect_grid", anchor = [0.0, 0.0], offset = [2.0, 2.0], count_x = 4, count_y = 1 }
"#;

fn simulator(events: &str) -> Simulator {
    let scene = Scene::from_toml_str(&format!("{SCENE}\n{events}")).unwrap();
    Simulator::from_scene(&scene, &SimulatorOptions::default()).unwrap()
}

fn step_until(simulator: &mut Simulator, time: f32) {
    while simulator.global_time() < time - 1e-4 {
        simulator.step();
    }
}

#[test]
fn test_set_state_on_complement() {
    let mut simulator = simulator(
        r#"
        [[events]]
        name = "dismiss"
        trigger = { kind = "at_time", time = 0.5 }
        effect = { kind = "set_state", state = "leave" }

        [events.target]
        kind = "negation"
        target = { kind = "union", targets = [{ kind = "by_id", id = 0 }, { kind = "by_id", id = 3 }] }
        "#,
    );

    step_until(&mut simulator, 0.4);
    assert!((0..4).all(|i| !simulator.is_final(i)));

    step_until(&mut simulator, 0.5);
    let states: Vec<&str> = (0..4).map(|i| simulator.state_name(i)).collect();
    assert_eq!(states, vec!["idle", "leave", "leave", "idle"]);
    assert_eq!(simulator.active_agent_count(), 2);
}

#[test]
fn test_last_agents_leaving_stops_simulation() {
    let mut simulator = simulator(
        r#"
        [[events]]
        name = "dismiss all"
        trigger = { kind = "at_time", time = 1.0 }
        effect = { kind = "set_state", state = "leave" }
        target = { kind = "in_state", state = "idle" }
        "#,
    );

    while simulator.step() {}

    assert_float_absolute_eq!(simulator.global_time(), 1.0, 1e-4);
    assert_eq!(simulator.active_agent_count(), 0);
}

#[test]
fn test_periodic_radius_scaling() {
    let mut simulator = simulator(
        r#"
        [[events]]
        name = "grow"
        trigger = { kind = "periodic", period = 1.0, start = 1.0 }
        effect = { kind = "scale_radius", factor = 1.5 }
        target = { kind = "difference", targets = [{ kind = "all" }, { kind = "by_id", id = 1 }] }
        "#,
    );

    while simulator.step() {}

    let agents = simulator.agents();
    // Fired at 1.0, 2.0 and 3.0.
    assert_float_absolute_eq!(agents[0].radius, 0.2 * 1.5 * 1.5 * 1.5, 1e-5);
    assert_float_absolute_eq!(agents[1].radius, 0.2, 1e-6);
}

#[test]
fn test_missing_agent_target_is_skipped() {
    let mut simulator = simulator(
        r#"
        [[events]]
        name = "nobody"
        trigger = { kind = "at_time", time = 0.2 }
        effect = { kind = "set_pref_speed", value = 0.0 }
        target = { kind = "by_id", id = 42 }
        "#,
    );

    step_until(&mut simulator, 0.3);

    assert!(simulator.is_running());
    assert!(simulator.agents().iter().all(|a| a.pref_speed > 0.0));
}

#[test]
fn test_event_with_unknown_state() {
    let scene = Scene::from_toml_str(&format!(
        "{SCENE}\n{}",
        r#"
        [[events]]
        name = "bad"
        trigger = { kind = "at_time", time = 0.2 }
        effect = { kind = "set_state", state = "gone" }
        target = { kind = "all" }
        "#
    ))
    .unwrap();

    let result = Simulator::from_scene(&scene, &SimulatorOptions::default());

    assert!(matches!(result, Err(SimError::UnknownState(s)) if s == "gone"));
}
