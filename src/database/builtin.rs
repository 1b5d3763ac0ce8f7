//! Compiled-in chip families.

use std::borrow::Cow;

use crate::bus::{BusLayout, BusRole};
use crate::profile::{
    ChipKind, ChipProfile, DramLayout, DramTiming, FlashCommands, FlashLayout, LogicTable,
    SignalMap, SignalPin, StaticLayout, StaticTiming,
};

/// Second sources and die shrinks sharing the 64K x 1 pinout.
const CODES_4164: &[u32] = &[3764, 4164, 4264, 4564, 4864, 6665, 8264];
const CODES_41256: &[u32] = &[4256, 6256, 41256, 51256, 81256];

const ADDR_4164: &[u8] = &[5, 7, 6, 12, 11, 10, 13, 9];
const ADDR_41256: &[u8] = &[5, 7, 6, 12, 11, 10, 13, 9, 1];

const ADDR_6116: &[u8] = &[8, 7, 6, 5, 4, 3, 2, 1, 23, 22, 19];
const ADDR_2732: &[u8] = &[8, 7, 6, 5, 4, 3, 2, 1, 23, 22, 19, 21];
const DATA_24: &[u8] = &[9, 10, 11, 13, 14, 15, 16, 17];

const ADDR_6264: &[u8] = &[10, 9, 8, 7, 6, 5, 4, 3, 25, 24, 21, 23, 2];
const ADDR_62256: &[u8] = &[10, 9, 8, 7, 6, 5, 4, 3, 25, 24, 21, 23, 2, 26, 1];
/// JEDEC 28-pin EPROM: A14 moves to pin 27, pin 1 is VPP.
const ADDR_27256: &[u8] = &[10, 9, 8, 7, 6, 5, 4, 3, 25, 24, 21, 23, 2, 26, 27];
const DATA_28: &[u8] = &[11, 12, 13, 15, 16, 17, 18, 19];

const ADDR_39SF010: &[u8] = &[12, 11, 10, 9, 8, 7, 6, 5, 27, 26, 23, 25, 4, 28, 29, 3, 2];
const ADDR_39SF020: &[u8] = &[12, 11, 10, 9, 8, 7, 6, 5, 27, 26, 23, 25, 4, 28, 29, 3, 2, 30];
const DATA_32: &[u8] = &[13, 14, 15, 17, 18, 19, 20, 21];

pub fn profiles() -> Vec<ChipProfile> {
    let mut profiles = dram();
    profiles.extend(sram());
    profiles.extend(rom());
    profiles.extend(fram());
    profiles.extend(flash());
    profiles.extend(logic());
    profiles
}

fn profile(
    name: &'static str,
    description: &'static str,
    pin_count: u8,
    codes: &'static [u32],
    signals: SignalMap,
    layout: ChipKind,
) -> ChipProfile {
    ChipProfile {
        name: Cow::Borrowed(name),
        description: Cow::Borrowed(description),
        pin_count,
        codes: Cow::Borrowed(codes),
        signals,
        layout,
    }
}

fn dram() -> Vec<ChipProfile> {
    let by_one = SignalMap {
        ras: SignalPin::low(4),
        cas: SignalPin::low(15),
        write_enable: SignalPin::low(3),
        gnd: SignalPin::low(16),
        vcc: SignalPin::high(8),
        ..SignalMap::EMPTY
    };

    vec![
        profile(
            "4164",
            "64K x 1 DRAM",
            16,
            CODES_4164,
            by_one.clone(),
            ChipKind::Dram(DramLayout {
                row: BusLayout::new(ADDR_4164),
                column: BusLayout::aliasing(ADDR_4164, BusRole::Row),
                data_in: BusLayout::new(&[2]),
                data_out: BusLayout::new(&[14]),
                timing: DramTiming::standard(2, 128),
            }),
        ),
        profile(
            "41256",
            "256K x 1 DRAM",
            16,
            CODES_41256,
            by_one,
            ChipKind::Dram(DramLayout {
                row: BusLayout::new(ADDR_41256),
                column: BusLayout::aliasing(ADDR_41256, BusRole::Row),
                data_in: BusLayout::new(&[2]),
                data_out: BusLayout::new(&[14]),
                timing: DramTiming::standard(4, 256),
            }),
        ),
        profile(
            "4416",
            "16K x 4 DRAM",
            18,
            &[4416],
            SignalMap {
                ras: SignalPin::low(5),
                cas: SignalPin::low(16),
                write_enable: SignalPin::low(4),
                output_enable: SignalPin::low(1),
                gnd: SignalPin::low(18),
                vcc: SignalPin::high(9),
                ..SignalMap::EMPTY
            },
            ChipKind::Dram(DramLayout {
                row: BusLayout::new(&[14, 13, 12, 11, 8, 7, 6, 10]),
                column: BusLayout::aliasing(&[13, 12, 11, 8, 7, 6], BusRole::Row),
                data_in: BusLayout::new(&[2, 3, 15, 17]),
                data_out: BusLayout::aliasing(&[2, 3, 15, 17], BusRole::DataIn),
                timing: DramTiming::standard(4, 256),
            }),
        ),
        profile(
            "44256",
            "256K x 4 DRAM",
            20,
            &[44256, 514256],
            SignalMap {
                ras: SignalPin::low(4),
                cas: SignalPin::low(17),
                write_enable: SignalPin::low(3),
                output_enable: SignalPin::low(16),
                gnd: SignalPin::low(20),
                vcc: SignalPin::high(10),
                ..SignalMap::EMPTY
            },
            ChipKind::Dram(DramLayout {
                row: BusLayout::new(&[6, 7, 8, 9, 11, 12, 13, 14, 15]),
                column: BusLayout::aliasing(&[6, 7, 8, 9, 11, 12, 13, 14, 15], BusRole::Row),
                data_in: BusLayout::new(&[1, 2, 18, 19]),
                data_out: BusLayout::aliasing(&[1, 2, 18, 19], BusRole::DataIn),
                timing: DramTiming::standard(8, 512),
            }),
        ),
    ]
}

fn static_signals(cs: u8, we: Option<u8>, oe: Option<u8>, gnd: u8, vcc: u8) -> SignalMap {
    SignalMap {
        chip_select: SignalPin::low(cs),
        write_enable: we.and_then(SignalPin::low),
        output_enable: oe.and_then(SignalPin::low),
        gnd: SignalPin::low(gnd),
        vcc: SignalPin::high(vcc),
        ..SignalMap::EMPTY
    }
}

fn static_layout(address: &'static [u8], data: &'static [u8], access_ns: u32) -> StaticLayout {
    StaticLayout {
        address: BusLayout::new(address),
        data: BusLayout::new(data),
        timing: StaticTiming::with_access(access_ns),
    }
}

fn sram() -> Vec<ChipProfile> {
    vec![
        profile(
            "2114",
            "1K x 4 static RAM",
            18,
            &[2114],
            static_signals(8, Some(10), None, 9, 18),
            ChipKind::Sram(static_layout(
                &[5, 6, 7, 4, 3, 2, 1, 17, 16, 15],
                &[14, 13, 12, 11],
                450,
            )),
        ),
        profile(
            "6116",
            "2K x 8 static RAM",
            24,
            &[6116],
            static_signals(18, Some(21), Some(20), 12, 24),
            ChipKind::Sram(static_layout(ADDR_6116, DATA_24, 150)),
        ),
        profile(
            "62256",
            "32K x 8 static RAM",
            28,
            &[62256, 43256],
            static_signals(20, Some(27), Some(22), 14, 28),
            ChipKind::Sram(static_layout(ADDR_62256, DATA_28, 100)),
        ),
    ]
}

fn rom() -> Vec<ChipProfile> {
    vec![
        profile(
            "2716",
            "2K x 8 UV EPROM",
            24,
            &[2716],
            SignalMap {
                tie_high: Cow::Borrowed(&[21]),
                ..static_signals(18, None, Some(20), 12, 24)
            },
            ChipKind::Rom(static_layout(ADDR_6116, DATA_24, 450)),
        ),
        profile(
            "2732",
            "4K x 8 UV EPROM",
            24,
            &[2732],
            static_signals(18, None, Some(20), 12, 24),
            ChipKind::Rom(static_layout(ADDR_2732, DATA_24, 450)),
        ),
        profile(
            "2764",
            "8K x 8 UV EPROM",
            28,
            &[2764],
            SignalMap {
                tie_high: Cow::Borrowed(&[1, 27]),
                ..static_signals(20, None, Some(22), 14, 28)
            },
            ChipKind::Rom(static_layout(ADDR_6264, DATA_28, 250)),
        ),
        profile(
            "27256",
            "32K x 8 UV EPROM",
            28,
            &[27256],
            SignalMap {
                tie_high: Cow::Borrowed(&[1]),
                ..static_signals(20, None, Some(22), 14, 28)
            },
            ChipKind::Rom(static_layout(ADDR_27256, DATA_28, 250)),
        ),
    ]
}

fn fram() -> Vec<ChipProfile> {
    vec![
        profile(
            "FM1608",
            "8K x 8 parallel FRAM",
            28,
            &[1608],
            static_signals(20, Some(27), Some(22), 14, 28),
            ChipKind::Fram(static_layout(ADDR_6264, DATA_28, 120)),
        ),
        profile(
            "FM1808",
            "32K x 8 parallel FRAM",
            28,
            &[1808],
            static_signals(20, Some(27), Some(22), 14, 28),
            ChipKind::Fram(static_layout(ADDR_62256, DATA_28, 70)),
        ),
    ]
}

fn flash() -> Vec<ChipProfile> {
    let signals = static_signals(22, Some(31), Some(24), 16, 32);
    vec![
        profile(
            "SST39SF010A",
            "128K x 8 parallel flash",
            32,
            &[39010],
            signals.clone(),
            ChipKind::Flash(FlashLayout {
                layout: static_layout(ADDR_39SF010, DATA_32, 70),
                commands: FlashCommands::jedec(0xBF, 0xB5),
            }),
        ),
        profile(
            "SST39SF020A",
            "256K x 8 parallel flash",
            32,
            &[39020],
            signals,
            ChipKind::Flash(FlashLayout {
                layout: static_layout(ADDR_39SF020, DATA_32, 70),
                commands: FlashCommands::jedec(0xBF, 0xB6),
            }),
        ),
    ]
}

fn gate_signals() -> SignalMap {
    SignalMap {
        gnd: SignalPin::low(7),
        vcc: SignalPin::high(14),
        ..SignalMap::EMPTY
    }
}

fn logic_table(vectors: &'static [Cow<'static, str>]) -> ChipKind {
    ChipKind::Logic(LogicTable {
        vectors: Cow::Borrowed(vectors),
    })
}

fn logic() -> Vec<ChipProfile> {
    // Quad two-input gates, 1A 1B 1Y 2A 2B 2Y GND 3Y 3A 3B 4Y 4A 4B VCC.
    const NAND: &[Cow<str>] = &[
        Cow::Borrowed("00H00HGH00H00V"),
        Cow::Borrowed("01H01HGH01H01V"),
        Cow::Borrowed("10H10HGH10H10V"),
        Cow::Borrowed("11L11LGL11L11V"),
    ];
    const AND: &[Cow<str>] = &[
        Cow::Borrowed("00L00LGL00L00V"),
        Cow::Borrowed("01L01LGL01L01V"),
        Cow::Borrowed("10L10LGL10L10V"),
        Cow::Borrowed("11H11HGH11H11V"),
    ];
    const OR: &[Cow<str>] = &[
        Cow::Borrowed("00L00LGL00L00V"),
        Cow::Borrowed("01H01HGH01H01V"),
        Cow::Borrowed("10H10HGH10H10V"),
        Cow::Borrowed("11H11HGH11H11V"),
    ];
    const XOR: &[Cow<str>] = &[
        Cow::Borrowed("00L00LGL00L00V"),
        Cow::Borrowed("01H01HGH01H01V"),
        Cow::Borrowed("10H10HGH10H10V"),
        Cow::Borrowed("11L11LGL11L11V"),
    ];
    // 1Y 1A 1B 2Y 2A 2B GND 3A 3B 3Y 4A 4B 4Y VCC.
    const NOR: &[Cow<str>] = &[
        Cow::Borrowed("H00H00G00H00HV"),
        Cow::Borrowed("L01L01G01L01LV"),
        Cow::Borrowed("L10L10G10L10LV"),
        Cow::Borrowed("L11L11G11L11LV"),
    ];
    // 1A 1Y 2A 2Y 3A 3Y GND 4Y 4A 5Y 5A 6Y 6A VCC.
    const HEX_INVERTER: &[Cow<str>] = &[
        Cow::Borrowed("0H0H0HGH0H0H0V"),
        Cow::Borrowed("1L1L1LGL1L1L1V"),
    ];

    vec![
        profile("7400", "quad 2-input NAND", 14, &[7400], gate_signals(), logic_table(NAND)),
        profile("7402", "quad 2-input NOR", 14, &[7402], gate_signals(), logic_table(NOR)),
        profile("7404", "hex inverter", 14, &[7404], gate_signals(), logic_table(HEX_INVERTER)),
        profile("7408", "quad 2-input AND", 14, &[7408], gate_signals(), logic_table(AND)),
        profile("7432", "quad 2-input OR", 14, &[7432], gate_signals(), logic_table(OR)),
        profile("7486", "quad 2-input XOR", 14, &[7486], gate_signals(), logic_table(XOR)),
    ]
}
