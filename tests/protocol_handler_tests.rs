use proptest::prelude::*;
use turretcore::protocol::*;

fn feed_all(framer: &mut LineFramer, input: &[u8]) -> Vec<RawLine> {
    input.iter().filter_map(|&byte| framer.feed(byte)).collect()
}

#[test]
fn test_recognized_commands_acknowledge() {
    let cases: [(&[u8], Command); 5] = [
        (b"2", Command::PiezoTest),
        (b"2,999", Command::PiezoTest),
        (b"20,1500", Command::SetServo(1500)),
        (b"30,1", Command::SetLight(true)),
        (b"30,0", Command::SetLight(false)),
    ];

    for (input, expected) in cases {
        let (command, ack) = decode(&RawLine::from_bytes(input));
        assert_eq!(command, expected, "input {:?}", String::from_utf8_lossy(input));
        assert_eq!(ack, AckSymbol::Ack);
    }
}

#[test]
fn test_light_only_on_for_exactly_one() {
    assert_eq!(decode(&RawLine::from_bytes(b"30,2")).0, Command::SetLight(false));
    assert_eq!(decode(&RawLine::from_bytes(b"30,-1")).0, Command::SetLight(false));
    assert_eq!(decode(&RawLine::from_bytes(b"30")).0, Command::SetLight(false));
}

#[test]
fn test_malformed_code_falls_through_to_error() {
    let (command, ack) = decode(&RawLine::from_bytes(b"abc,5"));
    assert_eq!(command, Command::Unrecognized(0));
    assert_eq!(ack, AckSymbol::Error);

    let (command, ack) = decode(&RawLine::from_bytes(b",1500"));
    assert_eq!(command, Command::Unrecognized(0));
    assert_eq!(ack, AckSymbol::Error);
}

#[test]
fn test_servo_parameter_passes_through_unclamped() {
    // Clamping belongs to the actuator, not the decoder.
    let (command, _) = decode(&RawLine::from_bytes(b"20,5000"));
    assert_eq!(command, Command::SetServo(5000));

    let (command, _) = decode(&RawLine::from_bytes(b"20,-40"));
    assert_eq!(command, Command::SetServo(-40));
}

#[test]
fn test_framer_splits_back_to_back_lines() {
    let mut framer = LineFramer::new(b';');
    let lines = feed_all(&mut framer, b"2;20,1200;30,1;");

    let commands: Vec<_> = lines.iter().map(|line| decode(line).0).collect();
    assert_eq!(
        commands,
        vec![Command::PiezoTest, Command::SetServo(1200), Command::SetLight(true)]
    );
}

#[test]
fn test_partial_line_waits_for_terminator() {
    let mut framer = LineFramer::new(b';');
    assert!(feed_all(&mut framer, b"20,15").is_empty());
    assert_eq!(framer.pending(), 5);

    let lines = feed_all(&mut framer, b"00;");
    assert_eq!(lines.len(), 1);
    assert_eq!(decode(&lines[0]).0, Command::SetServo(1500));
}

#[test]
fn test_overlong_line_decodes_truncated_prefix() {
    let mut framer = LineFramer::new(b';');
    let mut input = b"20,1234".to_vec();
    input.extend(std::iter::repeat(b'9').take(40));
    input.push(b';');

    let lines = feed_all(&mut framer, &input);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].was_truncated());
    assert_eq!(lines[0].len(), MAX_LINE_LEN);

    // The parameter is whatever digits fit; the code is still recognised.
    let (command, ack) = decode(&lines[0]);
    assert!(matches!(command, Command::SetServo(_)));
    assert_eq!(ack, AckSymbol::Ack);
}

#[test]
fn test_custom_terminator() {
    let mut framer = LineFramer::new(b'\n');
    let lines = feed_all(&mut framer, b"30,1;\n");
    assert_eq!(lines.len(), 1);
    // ';' is ordinary content for a newline-terminated framer.
    assert_eq!(lines[0].as_bytes(), b"30,1;");
    assert_eq!(decode(&lines[0]).0, Command::SetLight(true));
}

#[test]
fn test_handler_stats_and_last_command() {
    let mut handler = ProtocolHandler::new("\r\n").unwrap();
    handler.decode_line(&RawLine::from_bytes(b"2"));
    handler.decode_line(&RawLine::from_bytes(b"99"));
    handler.decode_line(&RawLine::from_bytes(b"30,1"));

    let stats = handler.get_stats();
    assert_eq!(stats.lines_decoded, 3);
    assert_eq!(stats.acks_sent, 2);
    assert_eq!(stats.errors_sent, 1);
    assert_eq!(handler.last_command(), Some(Command::SetLight(true)));
}

#[test]
fn test_ack_formatting_uses_line_ending() {
    let mut handler = ProtocolHandler::new("\n").unwrap();
    assert_eq!(handler.format_ack(AckSymbol::Ack).unwrap(), "A\n");
    assert_eq!(handler.format_ack(AckSymbol::Error).unwrap(), "E\n");
}

#[test]
fn test_extreme_channel_values_fit() {
    let mut handler = ProtocolHandler::new("\r\n").unwrap();
    let line = handler.format_channel_value(i32::MIN, i32::MIN, None).unwrap();
    assert_eq!(line, "-2147483648,-2147483648\r\n");
}

#[test]
fn test_overlong_line_ending_rejected() {
    assert_eq!(
        ProtocolHandler::new("\r\n\r\n\r\n").err(),
        Some(ProtocolError::MessageTooLarge)
    );
}

proptest! {
    #[test]
    fn unrecognized_codes_always_answer_error(code in any::<i32>(), param in any::<i32>()) {
        prop_assume!(![CMD_PIEZO_TEST, CMD_SET_SERVO, CMD_SET_LIGHT].contains(&code));

        let text = format!("{},{}", code, param);
        let (command, ack) = decode(&RawLine::from_bytes(text.as_bytes()));
        prop_assert_eq!(command, Command::Unrecognized(code));
        prop_assert_eq!(ack, AckSymbol::Error);
    }

    #[test]
    fn framer_never_exceeds_capacity(input in proptest::collection::vec(any::<u8>(), 0..200)) {
        let mut framer = LineFramer::new(b';');
        for byte in input {
            if let Some(line) = framer.feed(byte) {
                prop_assert!(line.len() <= MAX_LINE_LEN);
                prop_assert!(!line.as_bytes().contains(&b';'));
            }
            prop_assert!(framer.pending() <= MAX_LINE_LEN);
        }
    }

    #[test]
    fn parse_matches_std_for_plain_integers(value in any::<i32>()) {
        prop_assert_eq!(parse_or_default(value.to_string().as_bytes()), value);
    }
}
