use crate::component::{BaseComponent, Component, Fault};
use crate::pin::PinValue;
use crate::profile::{ChipKind, ChipProfile};

/// One gate: output pin as a function of its input pins.
#[derive(Debug, Clone, Copy)]
struct Gate {
    inputs: &'static [u8],
    output: u8,
    function: fn(&[bool]) -> bool,
}

const fn gate(inputs: &'static [u8], output: u8, function: fn(&[bool]) -> bool) -> Gate {
    Gate {
        inputs,
        output,
        function,
    }
}

fn nand(x: &[bool]) -> bool {
    !x.iter().all(|&b| b)
}

fn and(x: &[bool]) -> bool {
    x.iter().all(|&b| b)
}

fn nor(x: &[bool]) -> bool {
    !x.iter().any(|&b| b)
}

fn or(x: &[bool]) -> bool {
    x.iter().any(|&b| b)
}

fn xor(x: &[bool]) -> bool {
    x.iter().filter(|&&b| b).count() % 2 == 1
}

fn not(x: &[bool]) -> bool {
    !x[0]
}

/// Gate pinouts of the compiled-in 74xx families.
fn gates(family: &str) -> Option<Vec<Gate>> {
    let quad = |function: fn(&[bool]) -> bool| {
        vec![
            gate(&[1, 2], 3, function),
            gate(&[4, 5], 6, function),
            gate(&[9, 10], 8, function),
            gate(&[12, 13], 11, function),
        ]
    };
    match family {
        "7400" => Some(quad(nand)),
        "7408" => Some(quad(and)),
        "7432" => Some(quad(or)),
        "7486" => Some(quad(xor)),
        "7402" => Some(vec![
            gate(&[2, 3], 1, nor),
            gate(&[5, 6], 4, nor),
            gate(&[8, 9], 10, nor),
            gate(&[11, 12], 13, nor),
        ]),
        "7404" => Some(vec![
            gate(&[1], 2, not),
            gate(&[3], 4, not),
            gate(&[5], 6, not),
            gate(&[9], 8, not),
            gate(&[11], 10, not),
            gate(&[13], 12, not),
        ]),
        _ => None,
    }
}

/// Whole-vector row of a family without a gate model.
struct Row {
    inputs: Vec<(u8, PinValue)>,
    outputs: Vec<(u8, PinValue)>,
}

enum Behaviour {
    Gates(Vec<Gate>),
    /// Outputs follow the first vector whose inputs all match; they float
    /// when none does.
    Table(Vec<Row>),
}

/// Combinational logic part.
pub struct Logic {
    base: BaseComponent,
    behaviour: Behaviour,
    outputs: Vec<u8>,
    dead: u32,
}

impl Logic {
    pub fn new(profile: &ChipProfile) -> Option<Self> {
        let ChipKind::Logic(table) = &profile.layout else {
            return None;
        };
        let behaviour = match gates(&profile.name) {
            Some(gates) => Behaviour::Gates(gates),
            None => Behaviour::Table(
                table
                    .vectors
                    .iter()
                    .map(|vector| {
                        let mut row = Row {
                            inputs: Vec::new(),
                            outputs: Vec::new(),
                        };
                        for (pin, symbol) in (1u8..).zip(vector.bytes()) {
                            match symbol {
                                b'0' => row.inputs.push((pin, PinValue::Low)),
                                b'1' => row.inputs.push((pin, PinValue::High)),
                                b'L' => row.outputs.push((pin, PinValue::Low)),
                                b'H' => row.outputs.push((pin, PinValue::High)),
                                _ => {}
                            }
                        }
                        row
                    })
                    .collect(),
            ),
        };
        Some(Logic {
            base: BaseComponent::new(profile),
            behaviour,
            outputs: table.output_pins(),
            dead: 0,
        })
    }

    fn is_dead(&self, pin: u8) -> bool {
        self.outputs
            .iter()
            .position(|&p| p == pin)
            .map_or(false, |lane| self.dead >> lane & 1 == 1)
    }

    fn set(&self, drive: &mut [Option<PinValue>], pin: u8, level: PinValue) {
        let level = if self.is_dead(pin) {
            PinValue::Low
        } else {
            level
        };
        if let Some(slot) = drive.get_mut(pin as usize - 1) {
            *slot = Some(level);
        }
    }
}

impl Component for Logic {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn pin_count(&self) -> u8 {
        self.base.pin_count
    }

    fn power_pins(&self) -> (u8, u8) {
        (self.base.gnd, self.base.vcc)
    }

    fn update(&mut self, _now_ns: u64, levels: &[PinValue], drive: &mut [Option<PinValue>]) {
        match &self.behaviour {
            Behaviour::Gates(gates) => {
                for gate in gates {
                    let inputs: Vec<bool> = gate
                        .inputs
                        .iter()
                        .map(|&pin| BaseComponent::level(levels, pin).to_bool())
                        .collect();
                    let level = PinValue::from_bool((gate.function)(&inputs));
                    self.set(drive, gate.output, level);
                }
            }
            Behaviour::Table(rows) => {
                let row = rows.iter().find(|row| {
                    row.inputs
                        .iter()
                        .all(|&(pin, level)| BaseComponent::level(levels, pin) == level)
                });
                if let Some(row) = row {
                    for &(pin, level) in &row.outputs {
                        self.set(drive, pin, level);
                    }
                }
            }
        }
    }

    fn inject(&mut self, fault: Fault) {
        if let Fault::DeadLane { lane } = fault {
            self.dead |= 1 << lane;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ChipDatabase;

    fn levels(vector: &str) -> Vec<PinValue> {
        vector
            .bytes()
            .map(|c| PinValue::from_bool(matches!(c, b'1' | b'H' | b'V')))
            .collect()
    }

    #[test]
    fn test_nand_answers_its_table() {
        let db = ChipDatabase::builtin();
        let mut nand = Logic::new(&db[db.by_name("7400").unwrap()]).unwrap();
        let mut drive = vec![None; 14];
        nand.update(0, &levels("11X00XGX10X01V"), &mut drive);
        assert_eq!(drive[2], Some(PinValue::Low));
        assert_eq!(drive[5], Some(PinValue::High));
        assert_eq!(drive[7], Some(PinValue::High));
        assert_eq!(drive[10], Some(PinValue::High));
    }

    #[test]
    fn test_unknown_family_follows_whole_vectors() {
        let db = ChipDatabase::builtin();
        let mut profile = db[db.by_name("7400").unwrap()].clone();
        profile.name = "74F00".into();
        let mut nand = Logic::new(&profile).unwrap();
        let mut drive = vec![None; 14];
        nand.update(0, &levels("11X11XGX11X11V"), &mut drive);
        assert_eq!(drive[2], Some(PinValue::Low));
        drive.fill(None);
        nand.update(0, &levels("11X00XGX10X01V"), &mut drive);
        assert_eq!(drive, vec![None; 14]);
    }

    #[test]
    fn test_dead_output_reads_low() {
        let db = ChipDatabase::builtin();
        let mut nand = Logic::new(&db[db.by_name("7400").unwrap()]).unwrap();
        nand.inject(Fault::DeadLane { lane: 1 });
        let mut drive = vec![None; 14];
        nand.update(0, &levels("00X00XGX00X00V"), &mut drive);
        assert_eq!(drive[2], Some(PinValue::High));
        assert_eq!(drive[5], Some(PinValue::Low));
    }
}
