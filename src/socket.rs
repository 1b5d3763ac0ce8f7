//! ZIF socket wiring and package alignment.
//!
//! A socket position is 1-based and numbered like a DIP package: positions
//! `1..=N/2` run down the left side, `N/2+1..=N` run up the right side.
//! Packages with fewer pins than the socket sit centered, so their pin 1 lands
//! a few rows below socket position 1.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TesterError};
use crate::pin::{GpioLine, GpioPort, PinMode, PinValue};

/// Controller pins behind the 20-pin ZIF, socket position 1 first.
pub const ZIF20_PINOUT: [u8; 20] = [
    30, 32, 34, 36, 38, 40, 42, 44, 50, 48, 49, 47, 45, 43, 41, 39, 37, 35, 33, 31,
];

/// Controller pins behind the 40-pin ZIF, socket position 1 first.
pub const ZIF40_PINOUT: [u8; 40] = [
    22, 24, 26, 28, 30, 32, 34, 36, 38, 40, 42, 44, 46, 48, 50, 52, 54, 56, 58, 60, //
    61, 59, 57, 55, 53, 51, 49, 47, 45, 43, 41, 39, 37, 35, 33, 31, 29, 27, 25, 23,
];

/// Board generation, which fixes the socket size and its wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZifGeneration {
    Zif20,
    #[default]
    Zif40,
}

impl ZifGeneration {
    pub fn pinout(&self) -> &'static [u8] {
        match self {
            ZifGeneration::Zif20 => &ZIF20_PINOUT,
            ZifGeneration::Zif40 => &ZIF40_PINOUT,
        }
    }

    pub fn pin_count(&self) -> u8 {
        self.pinout().len() as u8
    }

    /// Socket position wired to a controller pin, if any.
    pub fn position_of(&self, controller_pin: u8) -> Option<u8> {
        self.pinout()
            .iter()
            .position(|&p| p == controller_pin)
            .map(|i| i as u8 + 1)
    }
}

/// Placement of a package inside the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    package_pins: u8,
    socket_pins: u8,
    offset_rows: u8,
}

impl Alignment {
    pub fn centered(package_pins: u8, socket_pins: u8) -> Result<Self> {
        if package_pins == 0 || package_pins % 2 != 0 || package_pins > socket_pins {
            return Err(TesterError::PackageTooLarge {
                pins: package_pins,
                socket: socket_pins,
            });
        }
        let offset_rows = (socket_pins / 2 - package_pins / 2) / 2;
        Ok(Alignment {
            package_pins,
            socket_pins,
            offset_rows,
        })
    }

    pub fn package_pins(&self) -> u8 {
        self.package_pins
    }

    pub fn socket_pins(&self) -> u8 {
        self.socket_pins
    }

    /// Socket position of a 1-based chip pin.
    pub fn position(&self, chip_pin: u8) -> Option<u8> {
        let half = self.package_pins / 2;
        match chip_pin {
            0 => None,
            p if p <= half => Some(self.offset_rows + p),
            p if p <= self.package_pins => {
                Some(self.socket_pins - self.offset_rows - self.package_pins + p)
            }
            _ => None,
        }
    }

    /// Chip pin sitting in a socket position, if the package covers it.
    pub fn chip_pin(&self, position: u8) -> Option<u8> {
        (1..=self.package_pins).find(|&p| self.position(p) == Some(position))
    }
}

/// The socket's GPIO lines, owned for the lifetime of the tester.
pub struct SocketMap<P: GpioPort> {
    port: P,
    generation: ZifGeneration,
    lines: Vec<GpioLine>,
}

impl<P: GpioPort> SocketMap<P> {
    /// Wires the socket and leaves every line as a plain input.
    pub fn new(mut port: P, generation: ZifGeneration) -> Self {
        let lines = generation
            .pinout()
            .iter()
            .map(|&pin| {
                let mut line = GpioLine::new(pin);
                line.set_mode(&mut port, PinMode::Input);
                line
            })
            .collect();
        SocketMap {
            port,
            generation,
            lines,
        }
    }

    pub fn generation(&self) -> ZifGeneration {
        self.generation
    }

    pub fn pin_count(&self) -> u8 {
        self.lines.len() as u8
    }

    pub fn align(&self, package_pins: u8) -> Result<Alignment> {
        Alignment::centered(package_pins, self.pin_count())
    }

    pub fn line(&self, position: u8) -> &GpioLine {
        &self.lines[position as usize - 1]
    }

    pub fn set_mode(&mut self, position: u8, mode: PinMode) {
        let line = &mut self.lines[position as usize - 1];
        line.set_mode(&mut self.port, mode);
    }

    pub fn write(&mut self, position: u8, level: PinValue) {
        let line = &mut self.lines[position as usize - 1];
        line.write(&mut self.port, level);
    }

    pub fn read(&mut self, position: u8) -> PinValue {
        self.lines[position as usize - 1].read(&mut self.port)
    }

    /// Puts every line back to high impedance.
    pub fn release_all(&mut self) {
        for line in &mut self.lines {
            line.set_mode(&mut self.port, PinMode::Input);
        }
    }

    /// True when no line is driving the socket.
    pub fn is_released(&self) -> bool {
        self.lines.iter().all(|l| l.mode() == PinMode::Input)
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullPort;

    impl GpioPort for NullPort {
        fn set_mode(&mut self, _pin: u8, _mode: PinMode) {}
        fn write(&mut self, _pin: u8, _level: PinValue) {}
        fn read(&mut self, _pin: u8) -> PinValue {
            PinValue::Low
        }
    }

    #[test]
    fn test_full_size_package_is_identity() {
        let a = Alignment::centered(40, 40).unwrap();
        for p in 1..=40 {
            assert_eq!(a.position(p), Some(p));
        }
    }

    #[test]
    fn test_sixteen_pins_in_twenty_pin_socket() {
        let a = Alignment::centered(16, 20).unwrap();
        assert_eq!(a.position(1), Some(2));
        assert_eq!(a.position(8), Some(9));
        assert_eq!(a.position(9), Some(12));
        assert_eq!(a.position(16), Some(19));
        assert_eq!(a.position(17), None);
        assert_eq!(a.chip_pin(12), Some(9));
        assert_eq!(a.chip_pin(1), None);
    }

    #[test]
    fn test_fourteen_pins_in_forty_pin_socket() {
        let a = Alignment::centered(14, 40).unwrap();
        // 20 rows, 7 used, 6 rows above.
        assert_eq!(a.position(1), Some(7));
        assert_eq!(a.position(7), Some(13));
        assert_eq!(a.position(8), Some(28));
        assert_eq!(a.position(14), Some(34));
    }

    #[test]
    fn test_oversized_package_rejected() {
        assert!(matches!(
            Alignment::centered(28, 20),
            Err(TesterError::PackageTooLarge { pins: 28, socket: 20 })
        ));
        assert!(Alignment::centered(15, 40).is_err());
    }

    #[test]
    fn test_pinout_tables_are_distinct() {
        for generation in [ZifGeneration::Zif20, ZifGeneration::Zif40] {
            let mut pins = generation.pinout().to_vec();
            pins.sort_unstable();
            pins.dedup();
            assert_eq!(pins.len(), generation.pin_count() as usize);
        }
        assert_eq!(ZifGeneration::Zif20.position_of(30), Some(1));
        assert_eq!(ZifGeneration::Zif20.position_of(31), Some(20));
    }

    #[test]
    fn test_socket_starts_released() {
        let mut socket = SocketMap::new(NullPort, ZifGeneration::Zif20);
        assert!(socket.is_released());
        socket.set_mode(3, PinMode::Output);
        assert!(!socket.is_released());
        socket.release_all();
        assert!(socket.is_released());
        assert_eq!(socket.line(1).controller_pin(), 30);
    }
}
