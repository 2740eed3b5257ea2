//! Positioning telemetry decoder
//!
//! The tag's CSV stream carries one record per line:
//!
//! ```text
//! DIST,2,AN0,022E,7.94,8.03,0.00,3.44,AN1,9280,7.95,0.00,0.00,5.68,POS,6.95,5.37,-1.97,52
//! ```
//!
//! i.e. a header, the anchor count, six fields per anchor
//! (label, id, x, y, z, distance) and the estimated position with its
//! quality. The firmware inserts a `POS` marker before the position;
//! [`decode_report`] takes the bare layout and [`parse_telemetry`] accepts
//! both, plus position-only `POS,x,y,z,q` lines.

use crate::error::{Result, TagError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

const HEADER_FIELDS: usize = 2;
const ANCHOR_FIELDS: usize = 6;
const POSITION_FIELDS: usize = 4;
const POSITION_MARKER: &str = "POS";

/// Point in the anchor coordinate frame, meters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.2}, {:.2}, {:.2}]", self.x, self.y, self.z)
    }
}

/// One anchor's entry in a report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorReading {
    /// Anchor node id, e.g. `022E`
    pub anchor_id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Measured tag-to-anchor range, meters
    pub distance: f64,
}

impl AnchorReading {
    pub fn position(&self) -> Position {
        Position {
            x: self.x,
            y: self.y,
            z: self.z,
        }
    }
}

/// Decoded anchor-distance + position record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionReport {
    anchor_count: usize,
    anchors: BTreeMap<String, AnchorReading>,
    all_anchor_ids: Vec<String>,
    estimated_position: Position,
    quality: f64,
}

impl PositionReport {
    pub fn anchor_count(&self) -> usize {
        self.anchor_count
    }

    /// Anchors keyed by label (`AN0`, `AN1`, ...)
    pub fn anchors(&self) -> &BTreeMap<String, AnchorReading> {
        &self.anchors
    }

    pub fn anchor(&self, label: &str) -> Option<&AnchorReading> {
        self.anchors.get(label)
    }

    /// Anchor labels in the order they appeared on the line
    pub fn all_anchor_ids(&self) -> &[String] {
        &self.all_anchor_ids
    }

    /// Anchors in order of appearance
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnchorReading)> + '_ {
        self.all_anchor_ids
            .iter()
            .filter_map(move |label| self.anchors.get(label).map(|a| (label.as_str(), a)))
    }

    pub fn estimated_position(&self) -> Position {
        self.estimated_position
    }

    pub fn quality(&self) -> f64 {
        self.quality
    }
}

impl fmt::Display for PositionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, anchor) in self.iter() {
            write!(f, "{}({})={:.2} ", label, anchor.anchor_id, anchor.distance)?;
        }
        write!(f, "est{} q={}", self.estimated_position, self.quality)
    }
}

/// Any line shape the CSV stream produces
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Telemetry {
    Report(PositionReport),
    Position { position: Position, quality: f64 },
}

/// Decode one `<tag>,<N>,<6*N anchor fields>,<x>,<y>,<z>,<quality>` line.
///
/// The line must hold exactly `2 + 6*N + 4` fields. Nothing is returned
/// unless every field decodes. Anchors are keyed by their slot label, the
/// first field of each group (`AN0`); the node id that follows it (`022E`)
/// is kept as [`AnchorReading::anchor_id`].
pub fn decode_report(line: &str) -> Result<PositionReport> {
    decode_fields(&split_fields(line))
}

/// Decode a line from the CSV stream, with or without the `POS` marker
pub fn parse_telemetry(line: &str) -> Result<Telemetry> {
    let mut fields = split_fields(line);

    if fields.first() == Some(&POSITION_MARKER) {
        if fields.len() != 1 + POSITION_FIELDS {
            return Err(TagError::Format(format!(
                "position line needs {} fields, found {}",
                1 + POSITION_FIELDS,
                fields.len()
            )));
        }
        let (position, quality) = decode_position(&fields[1..])?;
        return Ok(Telemetry::Position { position, quality });
    }

    if let Some(marker) = fields.len().checked_sub(POSITION_FIELDS + 1) {
        if marker >= HEADER_FIELDS && fields[marker] == POSITION_MARKER {
            fields.remove(marker);
        }
    }

    decode_fields(&fields).map(Telemetry::Report)
}

fn split_fields(line: &str) -> Vec<&str> {
    line.trim().split(',').map(str::trim).collect()
}

fn decode_fields(fields: &[&str]) -> Result<PositionReport> {
    if fields.len() < HEADER_FIELDS {
        return Err(TagError::Format(format!(
            "expected at least {} fields, found {}",
            HEADER_FIELDS,
            fields.len()
        )));
    }

    let anchor_count: usize = fields[1]
        .parse()
        .map_err(|_| TagError::Format(format!("invalid anchor count {:?}", fields[1])))?;

    let expected = anchor_count
        .checked_mul(ANCHOR_FIELDS)
        .and_then(|n| n.checked_add(HEADER_FIELDS + POSITION_FIELDS))
        .ok_or_else(|| TagError::Format(format!("anchor count {} too large", anchor_count)))?;
    if fields.len() != expected {
        return Err(TagError::Format(format!(
            "{} anchors need {} fields, found {}",
            anchor_count,
            expected,
            fields.len()
        )));
    }

    let mut anchors = BTreeMap::new();
    let mut all_anchor_ids = Vec::with_capacity(anchor_count);

    for group in fields[HEADER_FIELDS..expected - POSITION_FIELDS].chunks_exact(ANCHOR_FIELDS) {
        let label = group[0];
        if label.is_empty() {
            return Err(TagError::Format("empty anchor label".to_string()));
        }

        let reading = AnchorReading {
            anchor_id: group[1].to_string(),
            x: number(group[2], "anchor x")?,
            y: number(group[3], "anchor y")?,
            z: number(group[4], "anchor z")?,
            distance: number(group[5], "anchor distance")?,
        };

        if anchors.insert(label.to_string(), reading).is_some() {
            return Err(TagError::Format(format!("duplicate anchor {}", label)));
        }
        all_anchor_ids.push(label.to_string());
    }

    let (estimated_position, quality) = decode_position(&fields[expected - POSITION_FIELDS..])?;

    Ok(PositionReport {
        anchor_count,
        anchors,
        all_anchor_ids,
        estimated_position,
        quality,
    })
}

/// `x, y, z, quality`
fn decode_position(fields: &[&str]) -> Result<(Position, f64)> {
    let position = Position {
        x: number(fields[0], "position x")?,
        y: number(fields[1], "position y")?,
        z: number(fields[2], "position z")?,
    };
    Ok((position, number(fields[3], "quality")?))
}

fn number(field: &str, what: &str) -> Result<f64> {
    field
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| TagError::Format(format!("{} is not a number: {:?}", what, field)))
}
