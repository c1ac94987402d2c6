//! Xiaomi gamepad input report decoding and rumble feature encoding.
//!
//! Input report layout (report id stripped):
//!
//! | byte | content                                               |
//! |------|-------------------------------------------------------|
//! | 0    | bit0 A, bit1 B, bit3 X, bit4 Y, bit6 LB, bit7 RB      |
//! | 1    | bit2 Back, bit3 Start, bit5 LS click, bit6 RS click   |
//! | 3    | hat switch, 0..=7 clockwise from up, >= 8 neutral     |
//! | 4-7  | left X, left Y, right X, right Y (0..=255)            |
//! | 10   | left trigger                                          |
//! | 11   | right trigger                                         |
//! | 18   | battery percent                                       |
//! | 19   | bit0 MI (guide) pulse                                 |

use crate::device::{Buttons, ControllerState, FeedbackCommand};

/// Shortest input report carrying every field we decode.
pub const INPUT_REPORT_LEN: usize = 20;

/// Rumble is sent as feature report 0x20: `[0x20, weak, strong]`.
pub const VIBRATION_REPORT_ID: u8 = 0x20;
pub const FEATURE_REPORT_LEN: usize = 3;

/// Feature buffer that stops both motors.
pub const VIBRATION_OFF: [u8; FEATURE_REPORT_LEN] = [VIBRATION_REPORT_ID, 0, 0];

const HAT_SWITCH: [Buttons; 8] = [
    Buttons::DPAD_UP,
    Buttons::DPAD_UP.union(Buttons::DPAD_RIGHT),
    Buttons::DPAD_RIGHT,
    Buttons::DPAD_RIGHT.union(Buttons::DPAD_DOWN),
    Buttons::DPAD_DOWN,
    Buttons::DPAD_DOWN.union(Buttons::DPAD_LEFT),
    Buttons::DPAD_LEFT,
    Buttons::DPAD_LEFT.union(Buttons::DPAD_UP),
];

const BUTTON_BITS: [(usize, u8, Buttons); 10] = [
    (0, 0, Buttons::A),
    (0, 1, Buttons::B),
    (0, 3, Buttons::X),
    (0, 4, Buttons::Y),
    (0, 6, Buttons::LEFT_SHOULDER),
    (0, 7, Buttons::RIGHT_SHOULDER),
    (1, 2, Buttons::BACK),
    (1, 3, Buttons::START),
    (1, 5, Buttons::LEFT_THUMB),
    (1, 6, Buttons::RIGHT_THUMB),
];

const HAT_BYTE: usize = 3;
const LEFT_X_BYTE: usize = 4;
const LEFT_Y_BYTE: usize = 5;
const RIGHT_X_BYTE: usize = 6;
const RIGHT_Y_BYTE: usize = 7;
const LEFT_TRIGGER_BYTE: usize = 10;
const RIGHT_TRIGGER_BYTE: usize = 11;
const BATTERY_BYTE: usize = 18;
const GUIDE_BYTE: usize = 19;

fn bit(byte: u8, index: u8) -> bool {
    (byte >> index) & 1 != 0
}

/// D-pad buttons for a hat switch value; anything outside 0..=7 is neutral.
pub fn hat_to_dpad(hat: u8) -> Buttons {
    HAT_SWITCH
        .get(hat as usize)
        .copied()
        .unwrap_or_else(Buttons::empty)
}

/// Map an unsigned stick sample onto the full signed range.
///
/// 0 maps to `i16::MIN`, 255 to `i16::MAX`.
pub fn map_axis(raw: u8) -> i16 {
    (raw as i32 * 257 + i16::MIN as i32) as i16
}

/// Same as [`map_axis`] but reversed, for vertical axes where the pad
/// reports "up" as 0.
pub fn map_axis_inverted(raw: u8) -> i16 {
    !map_axis(raw)
}

/// Decode one input report. The guide button reflects the raw pulse only;
/// latching it is up to the caller.
pub fn decode(raw: &[u8; INPUT_REPORT_LEN]) -> ControllerState {
    let mut buttons = BUTTON_BITS
        .iter()
        .filter(|(byte, index, _)| bit(raw[*byte], *index))
        .fold(Buttons::empty(), |acc, (_, _, button)| acc | *button);

    buttons |= hat_to_dpad(raw[HAT_BYTE]);
    buttons.set(Buttons::GUIDE, bit(raw[GUIDE_BYTE], 0));

    let battery = raw[BATTERY_BYTE];

    ControllerState {
        buttons,
        left_trigger: raw[LEFT_TRIGGER_BYTE],
        right_trigger: raw[RIGHT_TRIGGER_BYTE],
        thumb_lx: map_axis(raw[LEFT_X_BYTE]),
        thumb_ly: map_axis_inverted(raw[LEFT_Y_BYTE]),
        thumb_rx: map_axis(raw[RIGHT_X_BYTE]),
        thumb_ry: map_axis_inverted(raw[RIGHT_Y_BYTE]),
        battery: (battery <= 100).then_some(battery),
    }
}

/// Pack a rumble request into the pad's vibration feature report.
/// The LED index has no channel on this pad and is not transmitted.
pub fn encode(feedback: &FeedbackCommand) -> [u8; FEATURE_REPORT_LEN] {
    [VIBRATION_REPORT_ID, feedback.weak_motor, feedback.strong_motor]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neutral() -> [u8; INPUT_REPORT_LEN] {
        let mut raw = [0u8; INPUT_REPORT_LEN];
        raw[HAT_BYTE] = 0x0F;
        raw[LEFT_X_BYTE..=RIGHT_Y_BYTE].copy_from_slice(&[0x80; 4]);
        raw[BATTERY_BYTE] = 80;
        raw
    }

    #[test]
    fn neutral_report_has_no_buttons() {
        let state = decode(&neutral());
        assert_eq!(state.buttons, Buttons::empty());
        assert_eq!(state.battery, Some(80));
        assert_eq!(state.left_trigger, 0);
    }

    #[test]
    fn face_and_shoulder_buttons() {
        let mut raw = neutral();
        raw[0] = 0b1101_1011;
        raw[1] = 0b0110_1100;
        let state = decode(&raw);
        assert_eq!(
            state.buttons,
            Buttons::A
                | Buttons::B
                | Buttons::X
                | Buttons::Y
                | Buttons::LEFT_SHOULDER
                | Buttons::RIGHT_SHOULDER
                | Buttons::BACK
                | Buttons::START
                | Buttons::LEFT_THUMB
                | Buttons::RIGHT_THUMB
        );
    }

    #[test]
    fn unused_bits_are_ignored() {
        let mut raw = neutral();
        raw[0] = 0b0010_0100;
        raw[1] = 0b1001_0011;
        raw[19] = 0b1111_1110;
        assert_eq!(decode(&raw).buttons, Buttons::empty());
    }

    #[test]
    fn hat_switch_table() {
        let expected = [
            Buttons::DPAD_UP,
            Buttons::DPAD_UP | Buttons::DPAD_RIGHT,
            Buttons::DPAD_RIGHT,
            Buttons::DPAD_RIGHT | Buttons::DPAD_DOWN,
            Buttons::DPAD_DOWN,
            Buttons::DPAD_DOWN | Buttons::DPAD_LEFT,
            Buttons::DPAD_LEFT,
            Buttons::DPAD_LEFT | Buttons::DPAD_UP,
        ];
        for (hat, buttons) in expected.iter().enumerate() {
            let mut raw = neutral();
            raw[HAT_BYTE] = hat as u8;
            assert_eq!(decode(&raw).buttons & Buttons::DPAD, *buttons, "hat {}", hat);
        }
        for hat in 8..=255u8 {
            assert_eq!(hat_to_dpad(hat), Buttons::empty(), "hat {}", hat);
        }
    }

    #[test]
    fn axis_extremes() {
        assert_eq!(map_axis(0), i16::MIN);
        assert_eq!(map_axis(255), i16::MAX);
        assert_eq!(map_axis_inverted(0), i16::MAX);
        assert_eq!(map_axis_inverted(255), i16::MIN);
        assert!(map_axis(128).abs() <= 256);
        assert!(map_axis_inverted(128).abs() <= 256);
    }

    #[test]
    fn vertical_axes_are_inverted() {
        let mut raw = neutral();
        raw[LEFT_X_BYTE] = 0;
        raw[LEFT_Y_BYTE] = 0;
        raw[RIGHT_X_BYTE] = 255;
        raw[RIGHT_Y_BYTE] = 255;
        let state = decode(&raw);
        assert_eq!(state.thumb_lx, i16::MIN);
        assert_eq!(state.thumb_ly, i16::MAX);
        assert_eq!(state.thumb_rx, i16::MAX);
        assert_eq!(state.thumb_ry, i16::MIN);
    }

    #[test]
    fn triggers_pass_through() {
        let mut raw = neutral();
        raw[LEFT_TRIGGER_BYTE] = 17;
        raw[RIGHT_TRIGGER_BYTE] = 255;
        let state = decode(&raw);
        assert_eq!(state.left_trigger, 17);
        assert_eq!(state.right_trigger, 255);
    }

    #[test]
    fn battery_out_of_range_is_unknown() {
        let mut raw = neutral();
        raw[BATTERY_BYTE] = 100;
        assert_eq!(decode(&raw).battery, Some(100));
        raw[BATTERY_BYTE] = 101;
        assert_eq!(decode(&raw).battery, None);
    }

    #[test]
    fn guide_pulse_sets_guide() {
        let mut raw = neutral();
        raw[GUIDE_BYTE] = 0x01;
        assert!(decode(&raw).guide());
    }

    #[test]
    fn feedback_encoding() {
        let feedback = FeedbackCommand {
            weak_motor: 0x10,
            strong_motor: 0xF0,
            led_index: 2,
        };
        assert_eq!(encode(&feedback), [0x20, 0x10, 0xF0]);
        assert_eq!(
            encode(&FeedbackCommand {
                weak_motor: 0,
                strong_motor: 0,
                led_index: 0
            }),
            VIBRATION_OFF
        );
    }
}
