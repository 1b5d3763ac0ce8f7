use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinValue {
    Low,
    High,
}

impl PinValue {
    pub fn to_str(&self) -> &'static str {
        match self {
            PinValue::Low => "Low",
            PinValue::High => "High",
        }
    }

    /// Truth-table notation, as shown to the operator.
    pub fn to_char(&self) -> char {
        match self {
            PinValue::Low => 'L',
            PinValue::High => 'H',
        }
    }

    pub fn from_bool(value: bool) -> Self {
        if value {
            PinValue::High
        } else {
            PinValue::Low
        }
    }

    pub fn to_bool(&self) -> bool {
        matches!(self, PinValue::High)
    }

    pub fn inverted(&self) -> Self {
        match self {
            PinValue::Low => PinValue::High,
            PinValue::High => PinValue::Low,
        }
    }
}

impl std::fmt::Display for PinValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

/// Direction of a controller pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinMode {
    Input,
    InputPullUp,
    Output,
}

impl PinMode {
    pub fn is_output(&self) -> bool {
        matches!(self, PinMode::Output)
    }
}

/// Register-level access to the controller's GPIO pins.
///
/// Pins are addressed by controller pin number, the same numbers the ZIF
/// pinout tables use. `write` is only meaningful on pins in `Output` mode and
/// `read` on pins in one of the input modes; neither call re-checks the mode.
pub trait GpioPort {
    fn set_mode(&mut self, pin: u8, mode: PinMode);
    fn write(&mut self, pin: u8, level: PinValue);
    fn read(&mut self, pin: u8) -> PinValue;
}

impl<P: GpioPort + ?Sized> GpioPort for &mut P {
    fn set_mode(&mut self, pin: u8, mode: PinMode) {
        (**self).set_mode(pin, mode)
    }

    fn write(&mut self, pin: u8, level: PinValue) {
        (**self).write(pin, level)
    }

    fn read(&mut self, pin: u8) -> PinValue {
        (**self).read(pin)
    }
}

/// One controller pin wired to one socket position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioLine {
    controller_pin: u8,
    mode: PinMode,
    level: PinValue,
}

impl GpioLine {
    pub fn new(controller_pin: u8) -> Self {
        GpioLine {
            controller_pin,
            mode: PinMode::Input,
            level: PinValue::Low,
        }
    }

    pub fn controller_pin(&self) -> u8 {
        self.controller_pin
    }

    pub fn mode(&self) -> PinMode {
        self.mode
    }

    /// Last level written; meaningless unless the line is an output.
    pub fn level(&self) -> PinValue {
        self.level
    }

    pub fn set_mode<P: GpioPort>(&mut self, port: &mut P, mode: PinMode) {
        port.set_mode(self.controller_pin, mode);
        self.mode = mode;
        if mode == PinMode::InputPullUp {
            // The pull-up shares the output latch on AVR parts.
            self.level = PinValue::High;
        } else if mode == PinMode::Input {
            self.level = PinValue::Low;
        }
    }

    pub fn write<P: GpioPort>(&mut self, port: &mut P, level: PinValue) {
        port.write(self.controller_pin, level);
        self.level = level;
    }

    pub fn read<P: GpioPort>(&self, port: &mut P) -> PinValue {
        port.read(self.controller_pin)
    }
}
