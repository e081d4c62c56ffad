use proptest::prelude::*;
use turretcore::config::{AlarmConfig, TurretConfig};
use turretcore::sensor::{DetectionRule, SensorReading};
use turretcore::turret::*;

const CLEAR: SensorReading = SensorReading::Value(50);
const INTRUDER: SensorReading = SensorReading::Value(800);

fn create_machine() -> TurretMachine {
    TurretMachine::new(
        TurretConfig::default(),
        AlarmConfig::default(),
        DetectionRule::Above(300),
        30,
    )
}

fn envelope(commands: &ActuatorCommands) -> &ToneEnvelope {
    match &commands.alarm {
        AlarmPlan::Pattern(envelope) => envelope,
        AlarmPlan::Silent => panic!("expected a tone pattern in {:?}", commands.mode),
    }
}

#[test]
fn test_initial_state() {
    let machine = create_machine();
    let state = machine.state();
    assert_eq!(state.servo_position, 1000);
    assert_eq!(state.sweep_direction, SweepDirection::Forward);
    assert_eq!(state.mode, Mode::Scanning);
    assert_eq!(state.escalation_counter, 0);
}

#[test]
fn test_full_sweep_cycle() {
    let mut machine = create_machine();

    for _ in 0..1000 {
        machine.tick(CLEAR);
    }
    assert_eq!(machine.state().servo_position, 2000);
    assert_eq!(machine.state().sweep_direction, SweepDirection::Reverse);

    for _ in 0..1000 {
        machine.tick(CLEAR);
    }
    assert_eq!(machine.state().servo_position, 1000);
    assert_eq!(machine.state().sweep_direction, SweepDirection::Forward);
}

#[test]
fn test_detection_then_cooldown_then_scanning() {
    let mut machine = create_machine();

    for _ in 0..3 {
        let commands = machine.tick(INTRUDER);
        assert_eq!(commands.mode, Mode::Detecting);
    }
    assert_eq!(machine.state().escalation_counter, 3);

    // Counter climbs 4..=11 and wraps on the eighth escalated tick.
    let mut escalated_ticks = 0;
    loop {
        let commands = machine.tick(CLEAR);
        if commands.mode != Mode::Escalated {
            assert_eq!(commands.mode, Mode::Scanning);
            break;
        }
        escalated_ticks += 1;
    }
    assert_eq!(escalated_ticks, 8);
    assert_eq!(machine.state().escalation_counter, 0);
}

#[test]
fn test_detection_resumes_during_cooldown() {
    let mut machine = create_machine();
    machine.tick(INTRUDER);
    machine.tick(CLEAR);
    assert_eq!(machine.state().mode, Mode::Escalated);

    let commands = machine.tick(INTRUDER);
    assert_eq!(commands.mode, Mode::Detecting);
    assert_eq!(machine.state().escalation_counter, 3);
}

#[test]
fn test_long_detection_keeps_counter_bounded() {
    let mut machine = create_machine();
    for _ in 0..10_000 {
        machine.tick(INTRUDER);
    }
    assert_eq!(machine.state().escalation_counter, 11);

    // Cool-down is a single escalated tick from the cap.
    assert_eq!(machine.tick(CLEAR).mode, Mode::Escalated);
    assert_eq!(machine.tick(CLEAR).mode, Mode::Scanning);
}

#[test]
fn test_light_follows_mode() {
    let mut machine = create_machine();
    assert!(!machine.tick(CLEAR).light);
    assert!(machine.tick(INTRUDER).light);
    assert!(machine.tick(CLEAR).light);
}

#[test]
fn test_detecting_envelope_shape() {
    let mut machine = create_machine();
    let commands = machine.tick(INTRUDER);
    let segments = envelope(&commands);

    assert_eq!(
        segments[0],
        ToneSegment {
            offset_ms: 0,
            action: AlarmAction::Sound {
                frequency_hz: 1000,
                duration_ms: 15
            },
        }
    );
    assert_eq!(
        segments[1],
        ToneSegment {
            offset_ms: 15,
            action: AlarmAction::Silence
        }
    );
}

#[test]
fn test_escalated_envelope_is_faster_and_higher() {
    let mut machine = create_machine();
    machine.tick(INTRUDER);
    let commands = machine.tick(CLEAR);
    let segments = envelope(&commands);

    let sounds: Vec<_> = segments
        .iter()
        .filter_map(|segment| match segment.action {
            AlarmAction::Sound { frequency_hz, .. } => Some((segment.offset_ms, frequency_hz)),
            AlarmAction::Silence => None,
        })
        .collect();
    assert_eq!(sounds, vec![(0, 2000), (10, 2000), (20, 2000)]);

    // Every segment lands inside the tick.
    assert!(segments.iter().all(|segment| segment.offset_ms < 30));
}

#[test]
fn test_calibrated_detection_rule() {
    let mut machine = TurretMachine::new(
        TurretConfig::default(),
        AlarmConfig::default(),
        DetectionRule::Below(30),
        30,
    );
    assert_eq!(machine.tick(SensorReading::Value(120)).mode, Mode::Scanning);
    assert_eq!(machine.tick(SensorReading::Value(12)).mode, Mode::Detecting);
    assert_eq!(machine.tick(SensorReading::OutOfRange).mode, Mode::Escalated);
}

#[test]
fn test_custom_bounds_and_step() {
    let turret = TurretConfig {
        min_position: 500,
        max_position: 520,
        home_position: 510,
        sweep_step: 4,
        ..TurretConfig::default()
    };
    let mut machine = TurretMachine::new(turret, AlarmConfig::default(), DetectionRule::Above(300), 30);

    let positions: Vec<u16> = (0..6).map(|_| machine.tick(CLEAR).servo_position).collect();
    assert_eq!(positions, vec![514, 518, 520, 516, 512, 508]);
}

fn reading_strategy() -> impl Strategy<Value = SensorReading> {
    prop_oneof![
        (0i32..1024).prop_map(SensorReading::Value),
        Just(SensorReading::OutOfRange),
    ]
}

proptest! {
    #[test]
    fn position_never_leaves_bounds(readings in proptest::collection::vec(reading_strategy(), 1..3000)) {
        let mut machine = create_machine();
        for reading in readings {
            let commands = machine.tick(reading);
            prop_assert!((1000..=2000).contains(&commands.servo_position));
            prop_assert_eq!(commands.servo_position, machine.state().servo_position);
        }
    }

    #[test]
    fn scanning_flips_exactly_at_bounds(ticks in 1usize..4000) {
        let mut machine = create_machine();
        for _ in 0..ticks {
            let before = *machine.state();
            machine.tick(CLEAR);
            let after = machine.state();
            if after.sweep_direction != before.sweep_direction {
                prop_assert!(after.servo_position == 1000 || after.servo_position == 2000);
            }
        }
    }

    #[test]
    fn cooldown_lasts_between_one_and_ceiling_ticks(detect_ticks in 1usize..40) {
        let mut machine = create_machine();
        for _ in 0..detect_ticks {
            machine.tick(INTRUDER);
        }

        let mut escalated = 0u32;
        while machine.tick(CLEAR).mode == Mode::Escalated {
            escalated += 1;
            prop_assert!(escalated <= 10);
        }
        prop_assert!(escalated >= 1);
        prop_assert_eq!(machine.state().mode, Mode::Scanning);
    }
}
