//! Engine temperature divergence.
//!
//! For each cylinder-head or exhaust-gas temperature group the airframe
//! carries, writes the per-sample spread (max minus min) across the group.

use super::{ProcessStep, StepContext};
use crate::airframes::{CESSNA_172R, CESSNA_172S, DJI, SCAN_EAGLE};
use crate::builder::FlightBuilder;
use crate::error::{Error, Result};
use crate::meta::Airframe;
use crate::series::NumericSeries;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Group {
    columns: &'static [&'static str],
    output: &'static str,
}

const E1_CHT4: Group = Group {
    columns: &["E1 CHT1", "E1 CHT2", "E1 CHT3", "E1 CHT4"],
    output: "E1 CHT Divergence",
};
const E1_EGT4: Group = Group {
    columns: &["E1 EGT1", "E1 EGT2", "E1 EGT3", "E1 EGT4"],
    output: "E1 EGT Divergence",
};
const E2_EGT4: Group = Group {
    columns: &["E2 EGT1", "E2 EGT2", "E2 EGT3", "E2 EGT4"],
    output: "E2 EGT Divergence",
};
const E1_CHT6: Group = Group {
    columns: &["E1 CHT1", "E1 CHT2", "E1 CHT3", "E1 CHT4", "E1 CHT5", "E1 CHT6"],
    output: "E1 CHT Divergence",
};
const E1_EGT6: Group = Group {
    columns: &["E1 EGT1", "E1 EGT2", "E1 EGT3", "E1 EGT4", "E1 EGT5", "E1 EGT6"],
    output: "E1 EGT Divergence",
};

const FOUR_CYLINDER: &[Group] = &[E1_CHT4, E1_EGT4];
const SIX_CYLINDER: &[Group] = &[E1_CHT6, E1_EGT6];

const AIRFRAME_GROUPS: &[(&str, &[Group])] = &[
    (CESSNA_172R, FOUR_CYLINDER),
    (CESSNA_172S, FOUR_CYLINDER),
    ("PA-28-181", &[E1_EGT4]),
    ("PA-44-180", &[E1_EGT4, E2_EGT4]),
    ("Cirrus SR20", SIX_CYLINDER),
    ("Cirrus SR22", SIX_CYLINDER),
    ("Cessna T182T", SIX_CYLINDER),
    ("Cessna 182T", SIX_CYLINDER),
    ("Beechcraft A36/G36", SIX_CYLINDER),
    ("Cessna 400", SIX_CYLINDER),
    ("Diamond DA 40 F", FOUR_CYLINDER),
    ("Diamond DA 40", FOUR_CYLINDER),
    ("Diamond DA40", FOUR_CYLINDER),
];

const NO_GROUPS: &[Group] = &[];

const EXCLUDED: &[&str] = &[SCAN_EAGLE, DJI];

/// Writes `<group> Divergence` columns for the airframe's temperature groups.
///
/// Airframes outside the table get no groups, which makes the step a no-op.
#[derive(Debug, Clone, Default)]
pub struct Divergence {
    groups: &'static [Group],
}

impl Divergence {
    /// The groups for `airframe`, or none if it is not in the table.
    #[must_use]
    pub fn for_airframe(airframe: &str) -> Self {
        let groups = AIRFRAME_GROUPS
            .iter()
            .find(|(name, _)| *name == airframe)
            .map_or(NO_GROUPS, |(_, groups)| *groups);
        Self { groups }
    }
}

impl ProcessStep for Divergence {
    fn name(&self) -> &'static str {
        "divergence"
    }

    fn required_numeric(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = self
            .groups
            .iter()
            .flat_map(|g| g.columns.iter().copied())
            .collect();
        columns.sort_unstable();
        columns.dedup();
        columns
    }

    fn outputs(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.output).collect()
    }

    fn airframe_is_valid(&self, airframe: &Airframe) -> bool {
        !EXCLUDED.iter().any(|name| airframe.name.contains(name))
    }

    fn compute(&self, builder: &FlightBuilder, _ctx: &StepContext) -> Result<()> {
        for group in self.groups {
            let columns = group
                .columns
                .iter()
                .map(|name| {
                    builder.numeric(name).ok_or_else(|| {
                        Error::malformed(format!(
                            "Cannot calculate '{}' as parameter '{name}' was missing.",
                            group.output
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let len = columns.iter().map(|c| c.len()).max().unwrap_or(0);
            let divergence = NumericSeries::computed(group.output, "deg F", len, |i| {
                let valid = columns.iter().map(|c| c.get(i)).filter(|v| !v.is_nan());
                let (min, max) = valid.fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
                if min > max {
                    f64::NAN
                } else {
                    max - min
                }
            });
            builder.add_numeric(divergence);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::builder;

    fn temps(prefix: &str, count: usize, base: f64) -> Vec<NumericSeries> {
        (1..=count)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let v = base + i as f64 * 10.0;
                NumericSeries::with_values(format!("{prefix}{i}"), "deg F", vec![v, v])
            })
            .collect()
    }

    #[test]
    fn test_four_cylinder_cessna() {
        let ctx = StepContext::in_memory().expect("ctx");
        let mut columns = temps("E1 CHT", 4, 300.0);
        columns.extend(temps("E1 EGT", 4, 1200.0));
        let b = builder(CESSNA_172S, columns);

        let step = Divergence::for_airframe(CESSNA_172S);
        assert_eq!(step.outputs(), vec!["E1 CHT Divergence", "E1 EGT Divergence"]);
        assert_eq!(step.required_numeric().len(), 8);
        step.compute(&b, &ctx).expect("compute");

        let cht = b.numeric("E1 CHT Divergence").expect("cht");
        assert!((cht.get(0) - 30.0).abs() < f64::EPSILON);
        assert_eq!(cht.data_type(), "deg F");
    }

    #[test]
    fn test_twin_has_two_engines() {
        let step = Divergence::for_airframe("PA-44-180");
        assert_eq!(step.outputs(), vec!["E1 EGT Divergence", "E2 EGT Divergence"]);
    }

    #[test]
    fn test_nan_samples_ignored() {
        let ctx = StepContext::in_memory().expect("ctx");
        let mut columns = temps("E1 EGT", 3, 1200.0);
        columns.push(NumericSeries::with_values("E1 EGT4", "deg F", vec![f64::NAN, 1500.0]));
        let b = builder("PA-28-181", columns);

        Divergence::for_airframe("PA-28-181").compute(&b, &ctx).expect("compute");
        let egt = b.numeric("E1 EGT Divergence").expect("egt");
        assert!((egt.get(0) - 20.0).abs() < f64::EPSILON);
        assert!((egt.get(1) - 290.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_airframe_is_noop() {
        let ctx = StepContext::in_memory().expect("ctx");
        let b = builder("Quest Kodiak 100", Vec::new());
        let step = Divergence::for_airframe("Quest Kodiak 100");
        assert!(step.outputs().is_empty());
        step.compute(&b, &ctx).expect("no-op");
    }

    #[test]
    fn test_uas_excluded() {
        let step = Divergence::for_airframe("DJI Mavic");
        assert!(!step.airframe_is_valid(&Airframe::new(
            "DJI Mavic",
            crate::meta::AirframeKind::UasRotorcraft
        )));
    }
}
