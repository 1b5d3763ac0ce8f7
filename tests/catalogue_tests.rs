//! Catalogue lookups and configured families.

mod mocks;

use proptest::prelude::*;
use rusty_ict::{
    ChipDatabase, ChipType, FamilyId, Identification, Tester, TesterConfig, TesterError,
    ZifGeneration,
};

use mocks::LoopbackPort;

fn contains(identification: &Identification, id: FamilyId) -> bool {
    match identification {
        Identification::Unique(found) => *found == id,
        Identification::Ambiguous(ids) => ids.contains(&id),
        Identification::NoMatch => false,
    }
}

#[cfg(test)]
mod lookup_properties {
    use super::*;

    proptest! {
        #[test]
        fn test_marking_finds_its_family(
            family in 0usize..24,
            code_index in 0usize..8,
            prefix in "[A-Z]{0,4}",
            suffix in "[A-Z]{0,3}",
        ) {
            let db = ChipDatabase::builtin();
            let Some((id, profile)) = db.iter().nth(family) else {
                return Ok(());
            };
            let code = profile.codes[code_index % profile.codes.len()];
            let marking = format!("{}{}-{}", prefix, code, suffix);

            let first = db.identify_part(&marking);
            prop_assert!(contains(&first, id), "{} did not find {}", marking, profile.name);
            prop_assert_eq!(db.identify_part(&marking), first);
        }

        #[test]
        fn test_family_name_is_exact(family in 0usize..24) {
            let db = ChipDatabase::builtin();
            let Some((id, profile)) = db.iter().nth(family) else {
                return Ok(());
            };
            prop_assert_eq!(db.identify_part(&profile.name), Identification::Unique(id));
            prop_assert_eq!(
                db.identify_part(&profile.name.to_lowercase()),
                Identification::Unique(id)
            );
        }

        #[test]
        fn test_candidates_share_the_package(pins in 4u8..=40, typed in any::<bool>()) {
            let db = ChipDatabase::builtin();
            let chip_type = typed.then_some(ChipType::Dram);
            for id in db.candidates(chip_type, pins) {
                prop_assert_eq!(db[id].pin_count, pins);
                if let Some(t) = chip_type {
                    prop_assert_eq!(db[id].chip_type(), t);
                }
            }
        }
    }

    #[test]
    fn test_every_code_is_claimed_once() {
        let db = ChipDatabase::builtin();
        for (id, profile) in db.iter() {
            for &code in profile.codes.iter() {
                assert_eq!(db.identify(code), Identification::Unique(id), "code {}", code);
            }
        }
    }
}

#[cfg(test)]
mod configured_families {
    use super::*;

    const MK4116: &str = r#"{
        "families": [{
            "name": "4116",
            "description": "16K x 1 DRAM",
            "pin_count": 16,
            "codes": [4116],
            "signals": {
                "ras": {"pin": 4, "active": "Low"},
                "cas": {"pin": 15, "active": "Low"},
                "write_enable": {"pin": 3, "active": "Low"},
                "gnd": {"pin": 16, "active": "Low"},
                "vcc": {"pin": 9, "active": "High"}
            },
            "layout": {
                "kind": "dram",
                "row": {"pins": [5, 7, 6, 12, 11, 10, 13]},
                "column": {"pins": [5, 7, 6, 12, 11, 10, 13], "alias_of": "row"},
                "data_in": {"pins": [2]},
                "data_out": {"pins": [14]},
                "timing": {
                    "address_setup_ns": 20, "row_hold_ns": 30, "access_ns": 150,
                    "ras_pulse_ns": 150, "precharge_ns": 100, "refresh_ms": 2,
                    "refresh_rows": 128, "ras_through_cas": true
                }
            }
        }]
    }"#;

    #[test]
    fn test_configured_family_joins_the_catalogue() {
        let builtin = ChipDatabase::builtin().len();
        let config = TesterConfig::from_json_str(MK4116).unwrap();
        let tester = Tester::new(LoopbackPort::new(), rusty_ict::VirtualClock::new(), config)
            .unwrap();
        assert_eq!(tester.database().len(), builtin + 1);

        let id = tester.database().identify_part("MK4116N-3").unique().unwrap();
        assert_eq!(tester.database()[id].chip_type(), ChipType::Dram);
        assert_eq!(tester.database()[id].capacity(), 16 * 1024);
    }

    #[test]
    fn test_conflicting_family_is_refused() {
        let config = TesterConfig::from_json_str(&MK4116.replace("[2]", "[4]")).unwrap();
        let result = Tester::new(LoopbackPort::new(), rusty_ict::VirtualClock::new(), config);
        assert!(matches!(result, Err(TesterError::PinConflict { pin: 4, .. })));
    }

    #[test]
    fn test_small_socket_still_loads_the_catalogue() {
        let config = mocks::config(ZifGeneration::Zif20);
        let tester =
            Tester::new(LoopbackPort::new(), rusty_ict::VirtualClock::new(), config).unwrap();
        assert_eq!(tester.database().len(), ChipDatabase::builtin().len());
    }
}
