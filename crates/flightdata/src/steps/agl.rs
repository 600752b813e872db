//! Altitude above ground level from MSL altitude and terrain.

use tracing::debug;

use super::columns::{ALT_AGL, ALT_MSL, LATITUDE, LONGITUDE};
use super::{ProcessStep, StepContext};
use crate::builder::FlightBuilder;
use crate::error::{Error, Result};
use crate::series::NumericSeries;

/// Looks up terrain under every sample and writes `AltAGL`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AltitudeAboveGround;

impl ProcessStep for AltitudeAboveGround {
    fn name(&self) -> &'static str {
        "altitude_agl"
    }

    fn required_numeric(&self) -> Vec<&str> {
        vec![ALT_MSL, LATITUDE, LONGITUDE]
    }

    fn outputs(&self) -> Vec<&str> {
        vec![ALT_AGL]
    }

    fn is_available(&self, ctx: &StepContext) -> bool {
        ctx.terrain.is_some()
    }

    fn compute(&self, builder: &FlightBuilder, ctx: &StepContext) -> Result<()> {
        let terrain = ctx
            .terrain
            .as_ref()
            .ok_or_else(|| Error::malformed("no terrain data is configured"))?;
        let msl = builder.require_numeric(ALT_MSL)?;
        let latitude = builder.require_numeric(LATITUDE)?;
        let longitude = builder.require_numeric(LONGITUDE)?;

        let mut agl = NumericSeries::new(ALT_AGL, "ft agl");
        for i in 0..msl.len() {
            let (alt, lat, lon) = (msl.get(i), latitude.get(i), longitude.get(i));
            if alt.is_nan() || lat.is_nan() || lon.is_nan() {
                agl.push(f64::NAN);
                continue;
            }
            match terrain.elevation_above_ground(alt, lat, lon) {
                Ok(feet) => agl.push(f64::from(feet)),
                Err(e) => {
                    debug!(sample = i, error = %e, "terrain lookup failed");
                    return Err(Error::malformed(format!(
                        "Could not calculate AGL for this flight as it had latitudes/longitudes \
                         outside of terrain coverage ({e})"
                    )));
                }
            }
        }

        builder.add_numeric(agl);
        Ok(())
    }
}
