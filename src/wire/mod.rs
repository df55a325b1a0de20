// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Protocol buffers wire encoding of map records.
//!
//! The same encoding is used for binary map datasets (a single `Map` message)
//! and for query results handed over the [C bindings](crate::c). The schema is
//! hand-mapped onto the [model](crate::model) types with [protobuf]'s coded streams,
//! so no code generation is required. Field numbers are listed in `messages.rs`.

mod messages;

use protobuf::{CodedInputStream, CodedOutputStream};

use crate::model::{Junction, Lane, Map};

pub(crate) const VARINT: u32 = 0;
pub(crate) const FIXED64: u32 = 1;
pub(crate) const LEN: u32 = 2;
pub(crate) const FIXED32: u32 = 5;

/// Builds a protobuf field tag out of a field number and a wire type.
pub(crate) const fn tag(field: u32, wire_type: u32) -> u32 {
    (field << 3) | wire_type
}

/// Error which can occur when encoding or decoding protobuf data.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("protobuf: {0}")]
    Protobuf(#[from] protobuf::Error),

    #[error("field {field}: unsupported wire type {wire_type}")]
    UnsupportedWireType { field: u32, wire_type: u32 },

    #[error("{message}.{field}: invalid enum value {value}")]
    InvalidEnum {
        message: &'static str,
        field: &'static str,
        value: i32,
    },
}

/// A value which maps onto a protobuf message.
pub trait WireMessage: Sized + Default {
    /// Merges a single field with the provided tag into `self`.
    ///
    /// Returns `Ok(false)` if the tag is not recognized - in that case,
    /// the field value must not have been consumed from the stream.
    fn merge_field(&mut self, tag: u32, is: &mut CodedInputStream<'_>) -> Result<bool, Error>;

    /// Writes all fields of `self` into a stream.
    fn write_fields(&self, os: &mut CodedOutputStream<'_>) -> Result<(), Error>;
}

/// Decodes a message from its serialized representation.
/// Unknown fields are skipped.
pub fn decode<M: WireMessage>(bytes: &[u8]) -> Result<M, Error> {
    let mut is = CodedInputStream::from_bytes(bytes);
    let mut message = M::default();
    while let Some(tag) = is.read_raw_tag_or_eof()? {
        if !message.merge_field(tag, &mut is)? {
            skip_field(tag, &mut is)?;
        }
    }
    Ok(message)
}

/// Serializes a message. Encoding is deterministic - equal messages
/// produce identical bytes.
pub fn encode<M: WireMessage>(message: &M) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    {
        let mut os = CodedOutputStream::vec(&mut buf);
        message.write_fields(&mut os)?;
        os.flush()?;
    }
    Ok(buf)
}

pub fn decode_map(bytes: &[u8]) -> Result<Map, Error> {
    decode(bytes)
}

pub fn encode_map(map: &Map) -> Result<Vec<u8>, Error> {
    encode(map)
}

pub fn decode_lane(bytes: &[u8]) -> Result<Lane, Error> {
    decode(bytes)
}

pub fn encode_lane(lane: &Lane) -> Result<Vec<u8>, Error> {
    encode(lane)
}

pub fn decode_junction(bytes: &[u8]) -> Result<Junction, Error> {
    decode(bytes)
}

pub fn encode_junction(junction: &Junction) -> Result<Vec<u8>, Error> {
    encode(junction)
}

/// Consumes the value of an unrecognized field.
fn skip_field(tag: u32, is: &mut CodedInputStream<'_>) -> Result<(), Error> {
    match tag & 7 {
        VARINT => {
            is.read_raw_varint64()?;
        }
        FIXED64 => {
            is.read_fixed64()?;
        }
        LEN => {
            is.read_bytes()?;
        }
        FIXED32 => {
            is.read_fixed32()?;
        }
        wire_type => {
            // Groups (3, 4) are deprecated and never produced by this crate
            return Err(Error::UnsupportedWireType {
                field: tag >> 3,
                wire_type,
            });
        }
    }
    Ok(())
}

/// Reads a length-delimited embedded message.
fn read_message<M: WireMessage>(is: &mut CodedInputStream<'_>) -> Result<M, Error> {
    let bytes = is.read_bytes()?;
    decode(&bytes)
}

/// Writes an embedded message as a length-delimited field,
/// with its content produced by the `write` callback.
fn write_nested<F>(os: &mut CodedOutputStream<'_>, field: u32, write: F) -> Result<(), Error>
where
    F: FnOnce(&mut CodedOutputStream<'_>) -> Result<(), Error>,
{
    let mut buf = Vec::new();
    {
        let mut nested = CodedOutputStream::vec(&mut buf);
        write(&mut nested)?;
        nested.flush()?;
    }
    os.write_bytes(field, &buf)?;
    Ok(())
}

fn write_message<M: WireMessage>(
    os: &mut CodedOutputStream<'_>,
    field: u32,
    message: &M,
) -> Result<(), Error> {
    write_nested(os, field, |nested| message.write_fields(nested))
}

fn write_strings(
    os: &mut CodedOutputStream<'_>,
    field: u32,
    values: &[String],
) -> Result<(), Error> {
    for value in values {
        os.write_string(field, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point2D;
    use crate::model::{
        Crosswalk, ElementKind, Header, LaneTurn, LaneType, ObjectRef, Overlap, Road,
        RoadSection, Signal, SignalType, StopSign, WidthSample,
    };

    fn pt(x: f64, y: f64) -> Point2D {
        Point2D::new(x, y)
    }

    fn sample_lane() -> Lane {
        Lane {
            id: "lane_1".to_string(),
            central_curve: vec![pt(0.0, 0.0), pt(10.0, 0.5), pt(20.0, -0.25)],
            left_samples: vec![WidthSample { s: 0.0, width: 1.75 }],
            right_samples: vec![
                WidthSample { s: 0.0, width: 1.5 },
                WidthSample { s: 20.0, width: 2.0 },
            ],
            speed_limit: 13.89,
            predecessor_ids: vec!["lane_0".to_string()],
            successor_ids: vec!["lane_2".to_string(), "lane_3".to_string()],
            left_neighbor_ids: vec!["lane_4".to_string()],
            right_neighbor_ids: vec![],
            lane_type: LaneType::CityDriving,
            turn: LaneTurn::LeftTurn,
            junction_id: Some("junction_1".to_string()),
            overlap_ids: vec!["overlap_1".to_string()],
        }
    }

    fn sample_map() -> Map {
        Map {
            header: Header {
                version: "1.0".to_string(),
                date: "2025-01-01".to_string(),
                projection: "+proj=utm +zone=10 +ellps=WGS84".to_string(),
                district: "test".to_string(),
                vendor: "hdmap".to_string(),
            },
            lanes: vec![sample_lane()],
            junctions: vec![Junction {
                id: "junction_1".to_string(),
                polygon: vec![pt(20.0, -5.0), pt(30.0, -5.0), pt(30.0, 5.0)],
                lane_ids: vec!["lane_1".to_string()],
                overlap_ids: vec![],
            }],
            roads: vec![Road {
                id: "road_1".to_string(),
                junction_id: None,
                sections: vec![RoadSection {
                    id: "road_1_section_1".to_string(),
                    lane_ids: vec!["lane_1".to_string()],
                }],
            }],
            signals: vec![Signal {
                id: "signal_1".to_string(),
                boundary: vec![pt(1.0, 1.0), pt(2.0, 1.0), pt(2.0, 2.0)],
                stop_lines: vec![vec![pt(5.0, -2.0), pt(5.0, 2.0)], vec![pt(6.0, 0.0)]],
                signal_type: SignalType::Mix3Vertical,
                overlap_ids: vec!["overlap_1".to_string()],
            }],
            stop_signs: vec![StopSign {
                id: "stop_sign_1".to_string(),
                stop_lines: vec![vec![pt(7.0, -2.0), pt(7.0, 2.0)]],
                overlap_ids: vec![],
            }],
            crosswalks: vec![Crosswalk {
                id: "crosswalk_1".to_string(),
                polygon: vec![pt(8.0, -3.0), pt(9.0, -3.0), pt(9.0, 3.0), pt(8.0, 3.0)],
                overlap_ids: vec![],
            }],
            overlaps: vec![Overlap {
                id: "overlap_1".to_string(),
                objects: vec![
                    ObjectRef {
                        id: "lane_1".to_string(),
                        kind: ElementKind::Lane,
                    },
                    ObjectRef {
                        id: "signal_1".to_string(),
                        kind: ElementKind::Signal,
                    },
                ],
            }],
        }
    }

    #[test]
    fn map_survives_encoding() {
        let map = sample_map();
        let bytes = encode_map(&map).unwrap();
        assert_eq!(decode_map(&bytes).unwrap(), map);
    }

    #[test]
    fn lane_survives_encoding() {
        let lane = sample_lane();
        let bytes = encode_lane(&lane).unwrap();
        assert_eq!(decode_lane(&bytes).unwrap(), lane);
    }

    #[test]
    fn junction_survives_encoding() {
        let junction = sample_map().junctions.remove(0);
        let bytes = encode_junction(&junction).unwrap();
        assert_eq!(decode_junction(&bytes).unwrap(), junction);
    }

    #[test]
    fn encoding_is_deterministic() {
        let map = sample_map();
        assert_eq!(encode_map(&map).unwrap(), encode_map(&map.clone()).unwrap());
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let mut bytes = encode_lane(&sample_lane()).unwrap();
        {
            let mut os = CodedOutputStream::vec(&mut bytes);
            os.write_uint64(100, 12345).unwrap();
            os.write_string(101, "ignored").unwrap();
            os.write_double(102, 1.5).unwrap();
            os.write_fixed32(103, 7).unwrap();
            os.flush().unwrap();
        }
        assert_eq!(decode_lane(&bytes).unwrap(), sample_lane());
    }

    #[test]
    fn unknown_enum_values() {
        // Lane.type = 99 falls back to the default
        let mut bytes = Vec::new();
        {
            let mut os = CodedOutputStream::vec(&mut bytes);
            os.write_string(1, "l").unwrap();
            os.write_int32(10, 99).unwrap();
            os.flush().unwrap();
        }
        let lane = decode_lane(&bytes).unwrap();
        assert_eq!(lane.lane_type, LaneType::None);

        // ObjectRef.kind = 99 is rejected
        let mut object = Vec::new();
        {
            let mut os = CodedOutputStream::vec(&mut object);
            os.write_string(1, "l").unwrap();
            os.write_int32(2, 99).unwrap();
            os.flush().unwrap();
        }
        let mut overlap = Vec::new();
        {
            let mut os = CodedOutputStream::vec(&mut overlap);
            os.write_string(1, "o").unwrap();
            os.write_bytes(2, &object).unwrap();
            os.flush().unwrap();
        }
        assert!(matches!(
            decode::<Overlap>(&overlap),
            Err(Error::InvalidEnum { value: 99, .. })
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_map(&[0x22, 0xff, 0xff, 0xff]).is_err());
        assert!(decode_map(&[0x0b]).is_err());
    }

    #[test]
    fn empty_input_is_an_empty_map() {
        assert_eq!(decode_map(&[]).unwrap(), Map::default());
    }
}
