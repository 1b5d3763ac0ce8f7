//! Truth-table vectors of logic families.

use crate::classifier::VectorMismatch;
use crate::pin::{GpioPort, PinMode, PinValue};
use crate::socket::{Alignment, SocketMap};

use super::wiring::drive;

fn symbol(vector: &str, pin: u8) -> Option<u8> {
    vector.as_bytes().get(pin as usize - 1).copied()
}

/// Releases the chip's outputs, then drives its inputs. Power pins are
/// already driven and are left alone.
pub(crate) fn apply_inputs<P: GpioPort>(
    socket: &mut SocketMap<P>,
    alignment: &Alignment,
    vector: &str,
) {
    for pin in 1..=alignment.package_pins() {
        let Some(position) = alignment.position(pin) else {
            continue;
        };
        if matches!(symbol(vector, pin), Some(b'L' | b'H' | b'X'))
            && socket.line(position).mode().is_output()
        {
            socket.set_mode(position, PinMode::Input);
        }
    }

    for pin in 1..=alignment.package_pins() {
        let level = match symbol(vector, pin) {
            Some(b'0') => PinValue::Low,
            Some(b'1') => PinValue::High,
            _ => continue,
        };
        let Some(position) = alignment.position(pin) else {
            continue;
        };
        if socket.line(position).mode().is_output() {
            if socket.line(position).level() != level {
                socket.write(position, level);
            }
        } else {
            drive(socket, position, level);
        }
    }
}

/// Samples the checked outputs, lane `i` into bit `i`.
pub(crate) fn sample<P: GpioPort>(socket: &mut SocketMap<P>, outputs: &[(u8, u8)]) -> u32 {
    outputs
        .iter()
        .enumerate()
        .fold(0, |acc, (lane, &(_, position))| {
            if socket.read(position).to_bool() {
                acc | 1 << lane
            } else {
                acc
            }
        })
}

/// Expected output bits and the lanes the vector actually checks.
pub(crate) fn expected(vector: &str, outputs: &[(u8, u8)]) -> (u32, u32) {
    let mut expected = 0;
    let mut care = 0;
    for (lane, &(pin, _)) in outputs.iter().enumerate() {
        match symbol(vector, pin) {
            Some(b'H') => {
                expected |= 1 << lane;
                care |= 1 << lane;
            }
            Some(b'L') => care |= 1 << lane,
            _ => {}
        }
    }
    (expected, care)
}

/// Failing outputs of one vector, for the operator.
pub(crate) fn vector_mismatches(
    index: usize,
    vector: &str,
    outputs: &[(u8, u8)],
    observed: u32,
) -> Vec<VectorMismatch> {
    let (expected, care) = expected(vector, outputs);
    outputs
        .iter()
        .enumerate()
        .filter(|&(lane, _)| ((observed ^ expected) & care) >> lane & 1 == 1)
        .map(|(lane, &(pin, _))| VectorMismatch {
            vector: index,
            pin,
            expected: PinValue::from_bool(expected >> lane & 1 == 1),
            observed: PinValue::from_bool(observed >> lane & 1 == 1),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // 7400 outputs: pins 3, 6, 8, 11 at arbitrary positions.
    const OUTPUTS: [(u8, u8); 4] = [(3, 9), (6, 12), (8, 28), (11, 31)];

    #[test]
    fn test_expected_bits() {
        assert_eq!(expected("11L11LGL11L11V", &OUTPUTS), (0b0000, 0b1111));
        assert_eq!(expected("00H00HGH00H00V", &OUTPUTS), (0b1111, 0b1111));
        assert_eq!(expected("00H00XGX00H00V", &OUTPUTS), (0b1001, 0b1001));
    }

    #[test]
    fn test_mismatch_report() {
        let report = vector_mismatches(3, "11L11LGL11L11V", &OUTPUTS, 0b0100);
        assert_eq!(
            report,
            vec![VectorMismatch {
                vector: 3,
                pin: 8,
                expected: PinValue::Low,
                observed: PinValue::High,
            }]
        );
    }
}
