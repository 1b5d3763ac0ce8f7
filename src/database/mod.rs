//! Catalogue of supported chip families.
//!
//! Families are reached either by a numeric part code (second-source synonyms
//! included) or by pin count and chip type. The catalogue is plain data; extra
//! families can be appended from the tester configuration.

mod builtin;

use log::debug;

use crate::error::{Result, TesterError};
use crate::profile::{ChipProfile, ChipType};

/// Index of a family within one [`ChipDatabase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FamilyId(usize);

impl FamilyId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Result of a catalogue lookup. `NoMatch` is not an error: the operator can
/// still pick a family by hand or let the sequencer probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identification {
    Unique(FamilyId),
    NoMatch,
    Ambiguous(Vec<FamilyId>),
}

impl Identification {
    pub fn from_candidates(mut ids: Vec<FamilyId>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        match ids.len() {
            0 => Identification::NoMatch,
            1 => Identification::Unique(ids[0]),
            _ => Identification::Ambiguous(ids),
        }
    }

    pub fn unique(&self) -> Option<FamilyId> {
        match self {
            Identification::Unique(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChipDatabase {
    profiles: Vec<ChipProfile>,
}

impl ChipDatabase {
    /// The compiled-in catalogue.
    pub fn builtin() -> Self {
        ChipDatabase {
            profiles: builtin::profiles(),
        }
    }

    pub fn empty() -> Self {
        ChipDatabase {
            profiles: Vec::new(),
        }
    }

    /// Validates and appends a family. Names must be unique.
    pub fn add(&mut self, profile: ChipProfile, socket_pins: u8) -> Result<FamilyId> {
        profile.validate(socket_pins)?;
        if self.by_name(&profile.name).is_some() {
            return Err(TesterError::InvalidProfile {
                family: profile.name.to_string(),
                reason: "a family with this name already exists".to_string(),
            });
        }
        debug!("Adding family {} ({} pins)", profile.name, profile.pin_count);
        self.profiles.push(profile);
        Ok(FamilyId(self.profiles.len() - 1))
    }

    /// Checks every family against the socket size.
    pub fn validate(&self, socket_pins: u8) -> Result<()> {
        self.profiles
            .iter()
            .try_for_each(|p| p.validate(socket_pins))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, id: FamilyId) -> Option<&ChipProfile> {
        self.profiles.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FamilyId, &ChipProfile)> {
        self.profiles
            .iter()
            .enumerate()
            .map(|(i, p)| (FamilyId(i), p))
    }

    pub fn by_name(&self, name: &str) -> Option<FamilyId> {
        self.iter()
            .find(|(_, p)| p.name.eq_ignore_ascii_case(name))
            .map(|(id, _)| id)
    }

    pub fn names(&self, ids: &[FamilyId]) -> Vec<String> {
        ids.iter()
            .filter_map(|&id| self.get(id))
            .map(|p| p.name.to_string())
            .collect()
    }

    /// Families answering to a numeric part code.
    pub fn identify(&self, code: u32) -> Identification {
        Identification::from_candidates(
            self.iter()
                .filter(|(_, p)| p.matches_code(code))
                .map(|(id, _)| id)
                .collect(),
        )
    }

    /// Identifies free operator text such as `TMS4164-15NL` or `74LS00`.
    ///
    /// An exact family name wins; otherwise every code scraped from the text
    /// is tried and the matches are pooled.
    pub fn identify_part(&self, text: &str) -> Identification {
        if let Some(id) = self.by_name(text.trim()) {
            return Identification::Unique(id);
        }
        let codes = scrape_codes(text);
        debug!("Part {:?} yields codes {:?}", text, codes);
        Identification::from_candidates(
            codes
                .iter()
                .flat_map(|&code| match self.identify(code) {
                    Identification::Unique(id) => vec![id],
                    Identification::Ambiguous(ids) => ids,
                    Identification::NoMatch => Vec::new(),
                })
                .collect(),
        )
    }

    /// Families that fit a package, optionally restricted to one chip type.
    pub fn candidates(&self, chip_type: Option<ChipType>, pin_count: u8) -> Vec<FamilyId> {
        self.iter()
            .filter(|(_, p)| p.pin_count == pin_count)
            .filter(|(_, p)| chip_type.map_or(true, |t| p.chip_type() == t))
            .map(|(id, _)| id)
            .collect()
    }
}

impl std::ops::Index<FamilyId> for ChipDatabase {
    type Output = ChipProfile;

    fn index(&self, id: FamilyId) -> &ChipProfile {
        &self.profiles[id.0]
    }
}

/// Numeric codes hidden in a part marking.
///
/// Each digit run counts on its own. Runs separated only by letters are also
/// joined, so `74LS00` yields 7400 and `SST39SF010A` yields 39010.
pub fn scrape_codes(text: &str) -> Vec<u32> {
    // (digits, letters-only gap before the next run)
    let mut runs: Vec<(String, bool)> = Vec::new();
    let mut digits = String::new();
    let mut letters_only = true;

    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if !digits.is_empty() {
            runs.push((std::mem::take(&mut digits), true));
            letters_only = true;
        }
        if !c.is_ascii_alphabetic() {
            letters_only = false;
        }
        if let Some(last) = runs.last_mut() {
            last.1 &= letters_only;
        }
    }
    if !digits.is_empty() {
        runs.push((digits, false));
    }
    if let Some(last) = runs.last_mut() {
        last.1 = false;
    }

    let mut codes = Vec::new();
    for start in 0..runs.len() {
        let mut joined = String::new();
        for (run, joins_next) in &runs[start..] {
            joined.push_str(run);
            if let Ok(code) = joined.parse::<u32>() {
                if code != 0 && !codes.contains(&code) {
                    codes.push(code);
                }
            }
            if !joins_next {
                break;
            }
        }
    }
    codes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ChipKind;

    #[test]
    fn test_builtin_catalogue_validates() {
        let db = ChipDatabase::builtin();
        for (_, profile) in db.iter() {
            if let Err(e) = profile.validate(40) {
                panic!("{}: {}", profile.name, e);
            }
        }
        assert!(db.validate(40).is_ok());
        assert!(db.len() >= 20);
    }

    #[test]
    fn test_eprom_keeps_vpp_off_the_address_bus() {
        let db = ChipDatabase::builtin();
        let eprom = &db[db.by_name("27256").unwrap()];
        let ChipKind::Rom(layout) = &eprom.layout else {
            panic!("27256 is not a ROM");
        };
        assert_eq!(layout.address.pins.last(), Some(&27));
        assert!(!layout.address.pins.contains(&1));
    }

    #[test]
    fn test_second_source_codes() {
        let db = ChipDatabase::builtin();
        let id = db.identify(4164).unique().unwrap();
        assert_eq!(db[id].name, "4164");
        assert_eq!(db.identify(8264), Identification::Unique(id));
        assert_eq!(db.identify(1234), Identification::NoMatch);
    }

    #[test]
    fn test_scrape_codes() {
        assert_eq!(scrape_codes("TMS4164-15NL"), vec![4164, 15]);
        assert!(scrape_codes("SN74LS00N").contains(&7400));
        assert!(scrape_codes("SST39SF010A").contains(&39010));
        assert!(scrape_codes("27C256").contains(&27256));
        assert!(scrape_codes("no digits").is_empty());
    }

    #[test]
    fn test_identify_part_text() {
        let db = ChipDatabase::builtin();
        let id = db.identify_part("HM62256LP-10").unique().unwrap();
        assert_eq!(db[id].name, "62256");
        let id = db.identify_part("sst39sf010a").unique().unwrap();
        assert_eq!(db[id].name, "SST39SF010A");
        assert_eq!(db.identify_part("XYZ"), Identification::NoMatch);
    }

    #[test]
    fn test_shared_code_is_ambiguous() {
        let mut db = ChipDatabase::builtin();
        let mut clone = db[db.by_name("4164").unwrap()].clone();
        clone.name = "4164-clone".into();
        db.add(clone, 40).unwrap();
        match db.identify(4164) {
            Identification::Ambiguous(ids) => assert_eq!(ids.len(), 2),
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut db = ChipDatabase::builtin();
        let again = db[db.by_name("7400").unwrap()].clone();
        assert!(db.add(again, 40).is_err());
    }

    #[test]
    fn test_candidates_by_pin_count() {
        let db = ChipDatabase::builtin();
        let dram16 = db.candidates(Some(ChipType::Dram), 16);
        assert_eq!(db.names(&dram16), vec!["4164", "41256"]);
        assert_eq!(db.candidates(Some(ChipType::Logic), 14).len(), 6);
    }
}
