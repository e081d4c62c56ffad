use proptest::prelude::*;
use turretcore::actuators::*;
use turretcore::config::TurretConfig;
use turretcore::hardware::sim::{PinCall, SimPins};
use turretcore::hardware::PinRole;

fn create_bank() -> ActuatorBank<SimPins> {
    ActuatorBank::new(SimPins::new(), &TurretConfig::default())
}

#[test]
fn test_initialize_drives_every_output() {
    let mut bank = create_bank();
    bank.initialize();

    assert_eq!(
        bank.pins().calls(),
        &[
            PinCall::Digital {
                pin: PinRole::Light,
                high: false
            },
            PinCall::StopTone { pin: PinRole::Buzzer },
            PinCall::Servo { pulse_us: 1000 },
        ]
    );
}

#[test]
fn test_light_writes_only_on_change() {
    let mut bank = create_bank();
    bank.set_light(true);
    bank.set_light(true);
    bank.set_light(false);

    assert_eq!(bank.pins().calls().len(), 2);
    assert_eq!(bank.light().get_state().toggles, 2);
    assert!(!bank.light().is_on());
}

#[test]
fn test_servo_clamps_out_of_range_requests() {
    let mut bank = create_bank();

    assert_eq!(bank.set_servo(1500), 1500);
    assert_eq!(bank.set_servo(5000), 2000);
    assert_eq!(bank.set_servo(-3), 1000);

    let state = bank.servo().get_state();
    assert_eq!(state.position, 1000);
    assert_eq!(state.clamped_requests, 2);
    assert_eq!(
        bank.pins().calls(),
        &[
            PinCall::Servo { pulse_us: 1500 },
            PinCall::Servo { pulse_us: 2000 },
            PinCall::Servo { pulse_us: 1000 },
        ]
    );
}

#[test]
fn test_strict_servo_move_rejects_out_of_bounds() {
    let mut bank = create_bank();
    assert!(bank.move_servo_exact(1200).is_ok());
    assert_eq!(
        bank.move_servo_exact(2500),
        Err(ActuatorError::OutOfBounds {
            requested: 2500,
            min: 1000,
            max: 2000
        })
    );
    assert_eq!(bank.servo().position(), 1200);
    assert_eq!(bank.pins().calls().len(), 1);
}

#[test]
fn test_alarm_sound_and_silence() {
    let mut bank = create_bank();
    bank.sound_alarm(1000, 200);
    assert!(bank.alarm().is_sounding());
    assert_eq!(bank.alarm().get_state().frequency_hz, Some(1000));

    bank.silence_alarm();
    assert!(!bank.alarm().is_sounding());
    assert_eq!(bank.alarm().get_state().tones_started, 1);

    assert_eq!(
        bank.pins().calls(),
        &[
            PinCall::Tone {
                pin: PinRole::Buzzer,
                frequency_hz: 1000,
                duration_ms: 200
            },
            PinCall::StopTone { pin: PinRole::Buzzer },
        ]
    );
}

#[test]
fn test_all_off_keeps_servo_position() {
    let mut bank = create_bank();
    bank.set_light(true);
    bank.sound_alarm(2000, 5);
    bank.set_servo(1700);
    bank.pins_mut().clear_calls();

    bank.all_off();

    let snapshot = bank.snapshot();
    assert!(!snapshot.light.on);
    assert_eq!(snapshot.alarm.frequency_hz, None);
    assert_eq!(snapshot.servo.position, 1700);
    assert_eq!(
        bank.pins().calls(),
        &[
            PinCall::Digital {
                pin: PinRole::Light,
                high: false
            },
            PinCall::StopTone { pin: PinRole::Buzzer },
        ]
    );
}

#[test]
fn test_servo_reset_returns_home() {
    let mut servo = ServoChannel::new(1000, 2000, 1100);
    servo.execute_command(ServoCommand::MoveTo(1800)).unwrap();
    servo.reset();
    assert_eq!(servo.position(), 1100);
}

proptest! {
    #[test]
    fn servo_command_always_lands_in_bounds(requested in any::<i32>()) {
        let mut bank = create_bank();
        let target = bank.set_servo(requested);

        prop_assert!((1000..=2000).contains(&target));
        prop_assert_eq!(target, bank.servo().position());
        if (1000..=2000).contains(&requested) {
            prop_assert_eq!(i32::from(target), requested);
        }
    }
}
