//! Airframe name resolution.
//!
//! Recorders report airframe names inconsistently. An [`AirframeRegistry`]
//! maps raw names to canonical ones and decides the airframe category.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::meta::{Airframe, AirframeKind};

/// Cessna 172S.
pub const CESSNA_172S: &str = "Cessna 172S";
/// Cessna 172R.
pub const CESSNA_172R: &str = "Cessna 172R";
/// Boeing Insitu ScanEagle.
pub const SCAN_EAGLE: &str = "ScanEagle";
/// Prefix of every DJI airframe name.
pub const DJI: &str = "DJI";
/// Placeholder used when a header carries no airframe name.
pub const UNKNOWN_AIRFRAME: &str = "Unknown Aircraft";

const FIXED_WING: &[&str] = &[
    "Cessna 172R",
    "Cessna 172S",
    "Cessna 172T",
    "Cessna 182T",
    "Cessna T182T",
    "Cessna Model 525",
    "Cirrus SR20",
    "Cirrus SR22",
    "Diamond DA40",
    "Diamond DA 40 F",
    "Diamond DA40NG",
    "Diamond DA42NG",
    "PA-28-181",
    "PA-44-180",
    "Piper PA-46-500TP Meridian",
    "Quest Kodiak 100",
    "Cessna 400",
    "Beechcraft A36/G36",
    "Beechcraft G58",
];

const ROTORCRAFT: &[&str] = &["R44", "Robinson R44"];

const GLOBAL_ALIASES: &[(&str, &str)] = &[
    ("Diamond DA 40", "Diamond DA40"),
    ("Robinson R44", "R44"),
    ("Cirrus SR22 (3600 GW)", "Cirrus SR22"),
];

/// Canonical airframe names, categories and aliases.
///
/// Constructed once per pipeline run and shared by reference; fleet aliases
/// come from configuration.
#[derive(Debug, Clone)]
pub struct AirframeRegistry {
    fixed_wing: HashSet<String>,
    rotorcraft: HashSet<String>,
    global_aliases: HashMap<String, String>,
    fleet_aliases: HashMap<String, String>,
}

impl Default for AirframeRegistry {
    fn default() -> Self {
        Self {
            fixed_wing: FIXED_WING.iter().map(ToString::to_string).collect(),
            rotorcraft: ROTORCRAFT.iter().map(ToString::to_string).collect(),
            global_aliases: GLOBAL_ALIASES
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            fleet_aliases: HashMap::new(),
        }
    }
}

impl AirframeRegistry {
    /// Registry with the built-in tables and the given fleet aliases.
    #[must_use]
    pub fn with_fleet_aliases(fleet_aliases: HashMap<String, String>) -> Self {
        Self {
            fleet_aliases,
            ..Self::default()
        }
    }

    /// Canonical name: fleet alias, then global alias, then the name itself.
    #[must_use]
    pub fn resolve_name(&self, name: &str) -> String {
        self.fleet_aliases
            .get(name)
            .or_else(|| self.global_aliases.get(name))
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Category of a canonical airframe name.
    ///
    /// # Errors
    ///
    /// Returns a fatal error when the name is neither fixed-wing nor rotorcraft.
    pub fn kind(&self, name: &str) -> Result<AirframeKind> {
        if self.fixed_wing.contains(name) || name.contains("Garmin") {
            Ok(AirframeKind::FixedWing)
        } else if self.rotorcraft.contains(name) {
            Ok(AirframeKind::Rotorcraft)
        } else {
            Err(Error::fatal(format!("Unsupported airframe type '{name}'")))
        }
    }

    /// Resolve a raw header name into a full airframe.
    ///
    /// # Errors
    ///
    /// Returns a fatal error for unrecognized airframes.
    pub fn resolve(&self, raw_name: &str) -> Result<Airframe> {
        let name = self.resolve_name(raw_name);
        let kind = self.kind(&name)?;
        Ok(Airframe::new(name, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_literal_name() {
        let registry = AirframeRegistry::default();
        let airframe = registry.resolve("Cessna 172S").expect("known airframe");
        assert_eq!(airframe.name, "Cessna 172S");
        assert_eq!(airframe.kind, AirframeKind::FixedWing);
    }

    #[test]
    fn test_global_alias() {
        let registry = AirframeRegistry::default();
        assert_eq!(registry.resolve_name("Diamond DA 40"), "Diamond DA40");
        let airframe = registry.resolve("Robinson R44").expect("alias resolves");
        assert_eq!(airframe.name, "R44");
        assert_eq!(airframe.kind, AirframeKind::Rotorcraft);
    }

    #[test]
    fn test_fleet_alias_wins_over_global() {
        let mut aliases = HashMap::new();
        aliases.insert("Diamond DA 40".to_string(), "Diamond DA40NG".to_string());
        let registry = AirframeRegistry::with_fleet_aliases(aliases);
        assert_eq!(registry.resolve_name("Diamond DA 40"), "Diamond DA40NG");
    }

    #[test]
    fn test_garmin_is_fixed_wing() {
        let registry = AirframeRegistry::default();
        assert_eq!(
            registry.kind("Garmin Flight Display").expect("garmin"),
            AirframeKind::FixedWing
        );
    }

    #[test]
    fn test_unknown_airframe_is_fatal() {
        let registry = AirframeRegistry::default();
        let err = registry.resolve("Sopwith Camel").expect_err("unknown");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Unsupported airframe type"));
    }
}
