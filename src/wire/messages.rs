// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use protobuf::{CodedInputStream, CodedOutputStream};

use super::{read_message, tag, write_message, write_strings, Error, WireMessage, FIXED64, LEN, VARINT};
use crate::geometry::Point2D;
use crate::model::{
    Crosswalk, ElementKind, Header, Junction, Lane, LaneTurn, LaneType, Map, ObjectRef, Overlap,
    Road, RoadSection, Signal, SignalType, StopSign, WidthSample,
};

impl WireMessage for Point2D {
    fn merge_field(&mut self, t: u32, is: &mut CodedInputStream<'_>) -> Result<bool, Error> {
        match t {
            t if t == tag(1, FIXED64) => self.x = is.read_double()?,
            t if t == tag(2, FIXED64) => self.y = is.read_double()?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn write_fields(&self, os: &mut CodedOutputStream<'_>) -> Result<(), Error> {
        os.write_double(1, self.x)?;
        os.write_double(2, self.y)?;
        Ok(())
    }
}

/// `Polyline { repeated Point point = 1; }`, used for stop lines.
#[derive(Debug, Default)]
struct Polyline(Vec<Point2D>);

impl WireMessage for Polyline {
    fn merge_field(&mut self, t: u32, is: &mut CodedInputStream<'_>) -> Result<bool, Error> {
        if t != tag(1, LEN) {
            return Ok(false);
        }
        self.0.push(read_message(is)?);
        Ok(true)
    }

    fn write_fields(&self, os: &mut CodedOutputStream<'_>) -> Result<(), Error> {
        write_points(os, 1, &self.0)
    }
}

impl WireMessage for WidthSample {
    fn merge_field(&mut self, t: u32, is: &mut CodedInputStream<'_>) -> Result<bool, Error> {
        match t {
            t if t == tag(1, FIXED64) => self.s = is.read_double()?,
            t if t == tag(2, FIXED64) => self.width = is.read_double()?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn write_fields(&self, os: &mut CodedOutputStream<'_>) -> Result<(), Error> {
        os.write_double(1, self.s)?;
        os.write_double(2, self.width)?;
        Ok(())
    }
}

impl WireMessage for Header {
    fn merge_field(&mut self, t: u32, is: &mut CodedInputStream<'_>) -> Result<bool, Error> {
        let field = match t {
            t if t == tag(1, LEN) => &mut self.version,
            t if t == tag(2, LEN) => &mut self.date,
            t if t == tag(3, LEN) => &mut self.projection,
            t if t == tag(4, LEN) => &mut self.district,
            t if t == tag(5, LEN) => &mut self.vendor,
            _ => return Ok(false),
        };
        *field = is.read_string()?;
        Ok(true)
    }

    fn write_fields(&self, os: &mut CodedOutputStream<'_>) -> Result<(), Error> {
        let fields = [
            (1, &self.version),
            (2, &self.date),
            (3, &self.projection),
            (4, &self.district),
            (5, &self.vendor),
        ];
        for (number, value) in fields {
            if !value.is_empty() {
                os.write_string(number, value)?;
            }
        }
        Ok(())
    }
}

impl WireMessage for Lane {
    fn merge_field(&mut self, t: u32, is: &mut CodedInputStream<'_>) -> Result<bool, Error> {
        match t {
            t if t == tag(1, LEN) => self.id = is.read_string()?,
            t if t == tag(2, LEN) => self.central_curve.push(read_message(is)?),
            t if t == tag(3, LEN) => self.left_samples.push(read_message(is)?),
            t if t == tag(4, LEN) => self.right_samples.push(read_message(is)?),
            t if t == tag(5, FIXED64) => self.speed_limit = is.read_double()?,
            t if t == tag(6, LEN) => self.predecessor_ids.push(is.read_string()?),
            t if t == tag(7, LEN) => self.successor_ids.push(is.read_string()?),
            t if t == tag(8, LEN) => self.left_neighbor_ids.push(is.read_string()?),
            t if t == tag(9, LEN) => self.right_neighbor_ids.push(is.read_string()?),
            t if t == tag(10, VARINT) => {
                self.lane_type = LaneType::from_i32(is.read_int32()?).unwrap_or_default()
            }
            t if t == tag(11, VARINT) => {
                self.turn = LaneTurn::from_i32(is.read_int32()?).unwrap_or_default()
            }
            t if t == tag(12, LEN) => self.junction_id = Some(is.read_string()?),
            t if t == tag(13, LEN) => self.overlap_ids.push(is.read_string()?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn write_fields(&self, os: &mut CodedOutputStream<'_>) -> Result<(), Error> {
        os.write_string(1, &self.id)?;
        write_points(os, 2, &self.central_curve)?;
        for sample in &self.left_samples {
            write_message(os, 3, sample)?;
        }
        for sample in &self.right_samples {
            write_message(os, 4, sample)?;
        }
        os.write_double(5, self.speed_limit)?;
        write_strings(os, 6, &self.predecessor_ids)?;
        write_strings(os, 7, &self.successor_ids)?;
        write_strings(os, 8, &self.left_neighbor_ids)?;
        write_strings(os, 9, &self.right_neighbor_ids)?;
        os.write_int32(10, self.lane_type as i32)?;
        os.write_int32(11, self.turn as i32)?;
        if let Some(ref junction_id) = self.junction_id {
            os.write_string(12, junction_id)?;
        }
        write_strings(os, 13, &self.overlap_ids)?;
        Ok(())
    }
}

impl WireMessage for Junction {
    fn merge_field(&mut self, t: u32, is: &mut CodedInputStream<'_>) -> Result<bool, Error> {
        match t {
            t if t == tag(1, LEN) => self.id = is.read_string()?,
            t if t == tag(2, LEN) => self.polygon.push(read_message(is)?),
            t if t == tag(3, LEN) => self.lane_ids.push(is.read_string()?),
            t if t == tag(4, LEN) => self.overlap_ids.push(is.read_string()?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn write_fields(&self, os: &mut CodedOutputStream<'_>) -> Result<(), Error> {
        os.write_string(1, &self.id)?;
        write_points(os, 2, &self.polygon)?;
        write_strings(os, 3, &self.lane_ids)?;
        write_strings(os, 4, &self.overlap_ids)?;
        Ok(())
    }
}

impl WireMessage for RoadSection {
    fn merge_field(&mut self, t: u32, is: &mut CodedInputStream<'_>) -> Result<bool, Error> {
        match t {
            t if t == tag(1, LEN) => self.id = is.read_string()?,
            t if t == tag(2, LEN) => self.lane_ids.push(is.read_string()?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn write_fields(&self, os: &mut CodedOutputStream<'_>) -> Result<(), Error> {
        os.write_string(1, &self.id)?;
        write_strings(os, 2, &self.lane_ids)
    }
}

impl WireMessage for Road {
    fn merge_field(&mut self, t: u32, is: &mut CodedInputStream<'_>) -> Result<bool, Error> {
        match t {
            t if t == tag(1, LEN) => self.id = is.read_string()?,
            t if t == tag(2, LEN) => self.junction_id = Some(is.read_string()?),
            t if t == tag(3, LEN) => self.sections.push(read_message(is)?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn write_fields(&self, os: &mut CodedOutputStream<'_>) -> Result<(), Error> {
        os.write_string(1, &self.id)?;
        if let Some(ref junction_id) = self.junction_id {
            os.write_string(2, junction_id)?;
        }
        for section in &self.sections {
            write_message(os, 3, section)?;
        }
        Ok(())
    }
}

impl WireMessage for Signal {
    fn merge_field(&mut self, t: u32, is: &mut CodedInputStream<'_>) -> Result<bool, Error> {
        match t {
            t if t == tag(1, LEN) => self.id = is.read_string()?,
            t if t == tag(2, LEN) => self.boundary.push(read_message(is)?),
            t if t == tag(3, LEN) => self.stop_lines.push(read_message::<Polyline>(is)?.0),
            t if t == tag(4, VARINT) => {
                self.signal_type = SignalType::from_i32(is.read_int32()?).unwrap_or_default()
            }
            t if t == tag(5, LEN) => self.overlap_ids.push(is.read_string()?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn write_fields(&self, os: &mut CodedOutputStream<'_>) -> Result<(), Error> {
        os.write_string(1, &self.id)?;
        write_points(os, 2, &self.boundary)?;
        write_polylines(os, 3, &self.stop_lines)?;
        os.write_int32(4, self.signal_type as i32)?;
        write_strings(os, 5, &self.overlap_ids)?;
        Ok(())
    }
}

impl WireMessage for StopSign {
    fn merge_field(&mut self, t: u32, is: &mut CodedInputStream<'_>) -> Result<bool, Error> {
        match t {
            t if t == tag(1, LEN) => self.id = is.read_string()?,
            t if t == tag(2, LEN) => self.stop_lines.push(read_message::<Polyline>(is)?.0),
            t if t == tag(3, LEN) => self.overlap_ids.push(is.read_string()?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn write_fields(&self, os: &mut CodedOutputStream<'_>) -> Result<(), Error> {
        os.write_string(1, &self.id)?;
        write_polylines(os, 2, &self.stop_lines)?;
        write_strings(os, 3, &self.overlap_ids)?;
        Ok(())
    }
}

impl WireMessage for Crosswalk {
    fn merge_field(&mut self, t: u32, is: &mut CodedInputStream<'_>) -> Result<bool, Error> {
        match t {
            t if t == tag(1, LEN) => self.id = is.read_string()?,
            t if t == tag(2, LEN) => self.polygon.push(read_message(is)?),
            t if t == tag(3, LEN) => self.overlap_ids.push(is.read_string()?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn write_fields(&self, os: &mut CodedOutputStream<'_>) -> Result<(), Error> {
        os.write_string(1, &self.id)?;
        write_points(os, 2, &self.polygon)?;
        write_strings(os, 3, &self.overlap_ids)?;
        Ok(())
    }
}

/// [ObjectRef] as it appears on the wire, before the kind is validated.
#[derive(Debug, Default)]
struct RawObjectRef {
    id: String,
    kind: i32,
}

impl RawObjectRef {
    fn validate(self) -> Result<ObjectRef, Error> {
        let kind = ElementKind::from_i32(self.kind).ok_or(Error::InvalidEnum {
            message: "ObjectRef",
            field: "kind",
            value: self.kind,
        })?;
        Ok(ObjectRef { id: self.id, kind })
    }
}

impl WireMessage for RawObjectRef {
    fn merge_field(&mut self, t: u32, is: &mut CodedInputStream<'_>) -> Result<bool, Error> {
        match t {
            t if t == tag(1, LEN) => self.id = is.read_string()?,
            t if t == tag(2, VARINT) => self.kind = is.read_int32()?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn write_fields(&self, os: &mut CodedOutputStream<'_>) -> Result<(), Error> {
        os.write_string(1, &self.id)?;
        os.write_int32(2, self.kind)?;
        Ok(())
    }
}

impl WireMessage for Overlap {
    fn merge_field(&mut self, t: u32, is: &mut CodedInputStream<'_>) -> Result<bool, Error> {
        match t {
            t if t == tag(1, LEN) => self.id = is.read_string()?,
            t if t == tag(2, LEN) => {
                let raw: RawObjectRef = read_message(is)?;
                self.objects.push(raw.validate()?);
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn write_fields(&self, os: &mut CodedOutputStream<'_>) -> Result<(), Error> {
        os.write_string(1, &self.id)?;
        for object in &self.objects {
            let raw = RawObjectRef {
                id: object.id.clone(),
                kind: object.kind as i32,
            };
            write_message(os, 2, &raw)?;
        }
        Ok(())
    }
}

impl WireMessage for Map {
    fn merge_field(&mut self, t: u32, is: &mut CodedInputStream<'_>) -> Result<bool, Error> {
        match t {
            t if t == tag(1, LEN) => self.header = read_message(is)?,
            t if t == tag(2, LEN) => self.crosswalks.push(read_message(is)?),
            t if t == tag(3, LEN) => self.junctions.push(read_message(is)?),
            t if t == tag(4, LEN) => self.lanes.push(read_message(is)?),
            t if t == tag(5, LEN) => self.stop_signs.push(read_message(is)?),
            t if t == tag(6, LEN) => self.signals.push(read_message(is)?),
            t if t == tag(8, LEN) => self.overlaps.push(read_message(is)?),
            t if t == tag(11, LEN) => self.roads.push(read_message(is)?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn write_fields(&self, os: &mut CodedOutputStream<'_>) -> Result<(), Error> {
        write_message(os, 1, &self.header)?;
        for crosswalk in &self.crosswalks {
            write_message(os, 2, crosswalk)?;
        }
        for junction in &self.junctions {
            write_message(os, 3, junction)?;
        }
        for lane in &self.lanes {
            write_message(os, 4, lane)?;
        }
        for stop_sign in &self.stop_signs {
            write_message(os, 5, stop_sign)?;
        }
        for signal in &self.signals {
            write_message(os, 6, signal)?;
        }
        for overlap in &self.overlaps {
            write_message(os, 8, overlap)?;
        }
        for road in &self.roads {
            write_message(os, 11, road)?;
        }
        Ok(())
    }
}

fn write_points(os: &mut CodedOutputStream<'_>, field: u32, points: &[Point2D]) -> Result<(), Error> {
    for point in points {
        write_message(os, field, point)?;
    }
    Ok(())
}

fn write_polylines(
    os: &mut CodedOutputStream<'_>,
    field: u32,
    lines: &[Vec<Point2D>],
) -> Result<(), Error> {
    for line in lines {
        super::write_nested(os, field, |nested| write_points(nested, 1, line))?;
    }
    Ok(())
}
