//! GPS-exchange tracks from Bad Elf recorders.
//!
//! One `trkseg` holds every point; the file is cut into flights wherever
//! consecutive points are more than a minute apart.

use std::ops::Range;

use chrono::{DateTime, FixedOffset};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, info};

use super::{content_hash, FileParser, ParseContext, ParseOutput};
use crate::builder::FlightBuilder;
use crate::error::{Error, Result};
use crate::meta::{Airframe, AirframeKind};
use crate::series::{NumericSeries, TextSeries};
use crate::timezone::format_offset;

const METERS_PER_SECOND_TO_KNOTS: f64 = 1.943_84;
const METERS_TO_FEET: f64 = 3.280_84;

/// Parser for `.gpx` tracks.
#[derive(Debug, Clone, Copy, Default)]
pub struct GpxParser;

impl FileParser for GpxParser {
    fn name(&self) -> &'static str {
        "gpx"
    }

    fn parse(&self, filename: &str, bytes: &[u8], ctx: &ParseContext) -> Result<ParseOutput> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::fatal(format!("Could not parse GPX data file: {e}")))?;
        let track = Track::read(text)?;
        track.check()?;

        let points = track.points()?;
        let segments = split_segments(
            &points,
            i64::try_from(ctx.parsing.gpx_split_gap_secs).unwrap_or(i64::MAX),
            ctx.parsing.gpx_min_samples,
        );
        info!(
            file = filename,
            points = points.len(),
            flights = segments.len(),
            "parsed GPX track"
        );

        let flights = segments
            .into_iter()
            .map(|range| track.segment_builder(filename, &points, range, ctx))
            .collect();
        Ok(ParseOutput::flights(flights))
    }
}

/// Raw tag contents collected from the document.
#[derive(Debug, Default)]
struct Track {
    segments: usize,
    nickname: Option<String>,
    model: Option<String>,
    times: Vec<String>,
    positions: Vec<(String, String)>,
    elevations: Vec<String>,
    speeds: Vec<String>,
}

/// Which text-bearing tag the reader is inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Nickname,
    Model,
    Time,
    Elevation,
    Speed,
}

impl Track {
    fn read(text: &str) -> Result<Self> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut track = Self::default();
        let mut field = None;
        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    field = match e.name().as_ref() {
                        b"trkseg" => {
                            track.segments += 1;
                            None
                        }
                        b"trkpt" => {
                            track.positions.push(position(&e)?);
                            None
                        }
                        b"badelf:modelNickname" => Some(Field::Nickname),
                        b"badelf:modelName" => Some(Field::Model),
                        b"time" => Some(Field::Time),
                        b"ele" => Some(Field::Elevation),
                        b"badelf:speed" => Some(Field::Speed),
                        _ => None,
                    };
                }
                Event::Empty(e) => match e.name().as_ref() {
                    b"trkseg" => track.segments += 1,
                    b"trkpt" => track.positions.push(position(&e)?),
                    _ => {}
                },
                Event::Text(t) => {
                    if let Some(f) = field {
                        let value = t.unescape()?.into_owned();
                        match f {
                            Field::Nickname => track.nickname = Some(value),
                            Field::Model => track.model = Some(value),
                            Field::Time => track.times.push(value),
                            Field::Elevation => track.elevations.push(value),
                            Field::Speed => track.speeds.push(value),
                        }
                    }
                }
                Event::End(_) => field = None,
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(track)
    }

    /// Structural checks that make the file unusable.
    fn check(&self) -> Result<()> {
        match self.segments {
            0 => {
                return Err(Error::fatal(
                    "could not parse GPX data file: failed to find data node.",
                ))
            }
            1 => {}
            _ => {
                return Err(Error::fatal(
                    "could not parse GPX data file: found multiple data nodes.",
                ))
            }
        }
        if self.nickname.is_none() {
            return Err(Error::fatal(
                "GPX file is missing necessary metadata (modelNickname).",
            ));
        }
        if self.model.is_none() {
            return Err(Error::fatal(
                "GPX file is missing necessary metadata (modelName).",
            ));
        }
        if self.speeds.is_empty() {
            return Err(Error::fatal("GPX file is missing GndSpd."));
        }
        let n = self.times.len();
        if self.positions.len() != n || self.elevations.len() != n || self.speeds.len() != n {
            return Err(Error::fatal("Mismatching number of data tags in GPX file"));
        }
        Ok(())
    }

    /// Parse every point, failing on the first malformed one.
    fn points(&self) -> Result<Vec<Point>> {
        (0..self.times.len())
            .map(|i| {
                let time = DateTime::parse_from_rfc3339(self.times[i].trim()).map_err(|e| {
                    Error::fatal(format!("bad GPX timestamp '{}': {e}", self.times[i]))
                })?;
                Ok(Point {
                    time,
                    latitude: number(&self.positions[i].0, "lat")?,
                    longitude: number(&self.positions[i].1, "lon")?,
                    altitude_ft: number(&self.elevations[i], "ele")? * METERS_TO_FEET,
                    speed_kt: number(&self.speeds[i], "speed")? * METERS_PER_SECOND_TO_KNOTS,
                })
            })
            .collect()
    }

    fn segment_builder(
        &self,
        filename: &str,
        points: &[Point],
        range: Range<usize>,
        ctx: &ParseContext,
    ) -> FlightBuilder {
        let nickname = self.nickname.clone().unwrap_or_default();
        let mut meta = ctx.template_meta(&format!("{filename}:{}-{}", range.start, range.end));
        meta.airframe = Airframe::new(self.model.clone().unwrap_or_default(), AirframeKind::FixedWing);
        meta.suggested_tail_number = Some(nickname.clone());
        meta.system_id = nickname;
        meta.md5_hash = content_hash(
            self.times[range.clone()]
                .iter()
                .chain(self.elevations[range.clone()].iter())
                .map(String::as_str),
        );

        let points = &points[range];
        let numeric = vec![
            NumericSeries::with_values("Latitude", "degrees", points.iter().map(|p| p.latitude).collect()),
            NumericSeries::with_values("Longitude", "degrees", points.iter().map(|p| p.longitude).collect()),
            NumericSeries::with_values("AltMSL", "ft", points.iter().map(|p| p.altitude_ft).collect()),
            NumericSeries::with_values("GndSpd", "knots", points.iter().map(|p| p.speed_kt).collect()),
        ];
        let text = vec![
            TextSeries::with_values(
                "Lcl Date",
                "yyyy-mm-dd",
                points.iter().map(|p| p.time.format("%Y-%m-%d").to_string()).collect(),
            ),
            TextSeries::with_values(
                "Lcl Time",
                "hh:mm:ss",
                points.iter().map(|p| p.time.format("%H:%M:%S").to_string()).collect(),
            ),
            TextSeries::with_values(
                "UTCOfst",
                "hh:mm",
                points.iter().map(|p| format_offset(*p.time.offset())).collect(),
            ),
        ];
        FlightBuilder::new(meta, numeric, text)
    }
}

#[derive(Debug, Clone)]
struct Point {
    time: DateTime<FixedOffset>,
    latitude: f64,
    longitude: f64,
    altitude_ft: f64,
    speed_kt: f64,
}

fn position(e: &quick_xml::events::BytesStart<'_>) -> Result<(String, String)> {
    let mut lat = String::new();
    let mut lon = String::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::Xml(err.to_string()))?;
        match attr.key.as_ref() {
            b"lat" => lat = attr.unescape_value()?.into_owned(),
            b"lon" => lon = attr.unescape_value()?.into_owned(),
            _ => {}
        }
    }
    Ok((lat, lon))
}

fn number(value: &str, what: &str) -> Result<f64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::fatal(format!("GPX {what} value '{value}' is not a number")))
}

/// Cut on gaps longer than `gap_secs`; segments under `min_samples` points
/// are dropped.
fn split_segments(points: &[Point], gap_secs: i64, min_samples: usize) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for end in 1..=points.len() {
        let at_gap = end < points.len()
            && (points[end].time - points[end - 1].time).num_seconds() > gap_secs;
        if at_gap || end == points.len() {
            if end - start >= min_samples {
                ranges.push(start..end);
            } else {
                debug!(start, end, "discarding short GPX segment");
            }
            start = end;
        }
    }
    ranges
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// A Bad Elf track with one point per second and an optional pause.
    pub fn track(points: usize, gap_after: Option<usize>) -> String {
        let mut out = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx xmlns:badelf="http://bad-elf.com/xmlschemas">
<metadata><extensions><badelf:modelName>Cessna 172S</badelf:modelName><badelf:modelNickname>N5123</badelf:modelNickname></extensions></metadata>
<trk><trkseg>
"#,
        );
        let mut seconds = 0;
        for i in 0..points {
            if gap_after == Some(i) {
                seconds += 120;
            }
            out.push_str(&format!(
                "<trkpt lat=\"44.{i:03}\" lon=\"-93.1\"><ele>100</ele><time>2024-01-05T10:{:02}:{:02}-06:00</time><extensions><badelf:speed>10</badelf:speed></extensions></trkpt>\n",
                seconds / 60,
                seconds % 60
            ));
            seconds += 1;
        }
        out.push_str("</trkseg></trk></gpx>\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::track;
    use super::*;
    use crate::parse::testing::context;

    #[test]
    fn test_single_flight_conversions() {
        let out = GpxParser
            .parse("track.gpx", track(70, None).as_bytes(), &context())
            .expect("parses");
        assert_eq!(out.flights.len(), 1);

        let flight = &out.flights[0];
        assert_eq!(flight.len(), 70);
        let meta = flight.meta();
        assert_eq!(meta.filename, "track.gpx:0-70");
        assert_eq!(meta.system_id, "N5123");
        assert_eq!(meta.airframe.name, "Cessna 172S");
        assert_eq!(meta.airframe.kind, AirframeKind::FixedWing);

        let msl = flight.numeric("AltMSL").expect("msl");
        assert!((msl.get(0) - 328.084).abs() < 1e-6);
        let speed = flight.numeric("GndSpd").expect("speed");
        assert!((speed.get(0) - 19.4384).abs() < 1e-6);
        assert_eq!(flight.text("UTCOfst").expect("offset").get(0), "-06:00");
        assert_eq!(flight.text("Lcl Time").expect("time").get(1), "10:00:01");
    }

    #[test]
    fn test_split_on_minute_gap() {
        let out = GpxParser
            .parse("track.gpx", track(130, Some(65)).as_bytes(), &context())
            .expect("parses");
        assert_eq!(out.flights.len(), 2);
        assert_eq!(out.flights[0].len(), 65);
        assert_eq!(out.flights[1].len(), 65);
        assert_eq!(out.flights[1].meta().filename, "track.gpx:65-130");
    }

    #[test]
    fn test_short_segments_discarded() {
        let out = GpxParser
            .parse("track.gpx", track(100, Some(30)).as_bytes(), &context())
            .expect("parses");
        assert_eq!(out.flights.len(), 1);
        assert_eq!(out.flights[0].len(), 70);
    }

    #[test]
    fn test_missing_nickname_is_fatal() {
        let xml = track(70, None).replace("<badelf:modelNickname>N5123</badelf:modelNickname>", "");
        let err = GpxParser
            .parse("track.gpx", xml.as_bytes(), &context())
            .expect_err("no nickname");
        assert!(err.to_string().contains("modelNickname"));
    }

    #[test]
    fn test_mismatched_counts_is_fatal() {
        let xml = track(70, None).replacen("<ele>100</ele>", "", 1);
        let err = GpxParser
            .parse("track.gpx", xml.as_bytes(), &context())
            .expect_err("missing ele");
        assert!(err.to_string().contains("Mismatching"));
    }

    #[test]
    fn test_multiple_segments_is_fatal() {
        let xml = track(70, None).replace("</trkseg></trk>", "</trkseg><trkseg></trkseg></trk>");
        let err = GpxParser
            .parse("track.gpx", xml.as_bytes(), &context())
            .expect_err("two segments");
        assert!(err.is_fatal());
    }
}
