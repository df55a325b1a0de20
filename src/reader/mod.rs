// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::borrow::Cow;
use std::collections::HashSet;
use std::io::{self, Read};
use std::path::Path;

use crate::geometry::{polygon_intersects_box, polyline_intersects_box, AABox, Point2D};
use crate::model::{ElementKind, Map};
use crate::store::Record;
use crate::wire;

mod xml;

pub use xml::Error as XmlError;

/// Format of the input map dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    /// Unknown format - guess the format based on the file name or the content
    #[default]
    Unknown,

    /// Force uncompressed binary (protocol buffers) dataset
    Bin,

    /// Force binary dataset with [gzip](https://en.wikipedia.org/wiki/Gzip) compression
    BinGz,

    /// Force binary dataset with [bzip2](https://en.wikipedia.org/wiki/Bzip2) compression
    BinBz2,

    /// Force uncompressed XML dataset
    Xml,

    /// Force XML dataset with [gzip](https://en.wikipedia.org/wiki/Gzip) compression
    XmlGz,

    /// Force XML dataset with [bzip2](https://en.wikipedia.org/wiki/Bzip2) compression
    XmlBz2,
}

impl FileFormat {
    /// Guesses the format from the extension of a file name.
    /// Returns [FileFormat::Unknown] for unrecognized extensions.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let name = path
            .as_ref()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        const SUFFIXES: [(&str, FileFormat); 6] = [
            (".bin.gz", FileFormat::BinGz),
            (".bin.bz2", FileFormat::BinBz2),
            (".bin", FileFormat::Bin),
            (".xml.gz", FileFormat::XmlGz),
            (".xml.bz2", FileFormat::XmlBz2),
            (".xml", FileFormat::Xml),
        ];

        SUFFIXES
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix))
            .map_or(FileFormat::Unknown, |&(_, format)| format)
    }

    fn compression(self) -> Option<Compression> {
        match self {
            FileFormat::Unknown => None,
            FileFormat::Bin | FileFormat::Xml => Some(Compression::None),
            FileFormat::BinGz | FileFormat::XmlGz => Some(Compression::Gzip),
            FileFormat::BinBz2 | FileFormat::XmlBz2 => Some(Compression::Bzip2),
        }
    }

    fn encoding(self) -> Option<Encoding> {
        match self {
            FileFormat::Unknown => None,
            FileFormat::Bin | FileFormat::BinGz | FileFormat::BinBz2 => Some(Encoding::Binary),
            FileFormat::Xml | FileFormat::XmlGz | FileFormat::XmlBz2 => Some(Encoding::Xml),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    None,
    Gzip,
    Bzip2,
}

impl Compression {
    fn sniff(data: &[u8]) -> Self {
        if data.starts_with(&[0x1f, 0x8b]) {
            Compression::Gzip
        } else if data.starts_with(b"BZh") {
            Compression::Bzip2
        } else {
            Compression::None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Binary,
    Xml,
}

impl Encoding {
    fn sniff(data: &[u8]) -> Self {
        match data.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'<') => Encoding::Xml,
            _ => Encoding::Binary,
        }
    }
}

/// Additional controls for loading map datasets.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Options {
    /// Format of the input data.
    pub file_format: FileFormat,

    /// Only keep records intersecting a specific bounding box. In order: min x, min y,
    /// max x, max y. Ignored if all values are set to zero, or at least one
    /// of them is not finite.
    pub bbox: [f64; 4],
}

impl Options {
    fn crop_box(&self) -> Option<AABox> {
        if self.bbox.iter().all(|&v| v == 0.0) || !self.bbox.iter().all(|v| v.is_finite()) {
            None
        } else {
            Some(AABox::new(
                Point2D::new(self.bbox[0], self.bbox[1]),
                Point2D::new(self.bbox[2], self.bbox[3]),
            ))
        }
    }
}

/// Error which can occur when reading a map dataset.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("binary dataset: {0}")]
    Wire(#[from] wire::Error),

    #[error("xml dataset: {0}")]
    Xml(#[from] XmlError),

    #[error("invalid dataset: {0}")]
    Invalid(String),
}

/// Parses a map dataset from a static buffer, as per the provided [Options].
pub fn read_map_from_buffer(data: &[u8], options: &Options) -> Result<Map, Error> {
    let compression = options
        .file_format
        .compression()
        .unwrap_or_else(|| Compression::sniff(data));

    let data: Cow<'_, [u8]> = match compression {
        Compression::None => Cow::Borrowed(data),
        Compression::Gzip => Cow::Owned(read_all(flate2::read::MultiGzDecoder::new(data))?),
        Compression::Bzip2 => Cow::Owned(read_all(bzip2::read::MultiBzDecoder::new(data))?),
    };

    let encoding = options
        .file_format
        .encoding()
        .unwrap_or_else(|| Encoding::sniff(&data));
    log::debug!("reading {encoding:?} map dataset with {compression:?} compression");

    let mut map = match encoding {
        Encoding::Binary => wire::decode_map(&data)?,
        Encoding::Xml => xml::read_map(&data)?,
    };

    validate(&map)?;
    if let Some(rect) = options.crop_box() {
        crop(&mut map, rect);
    }
    Ok(map)
}

/// Parses a map dataset from a reader, as per the provided [Options].
pub fn read_map_from_io<R: Read>(reader: R, options: &Options) -> Result<Map, Error> {
    let data = read_all(reader)?;
    read_map_from_buffer(&data, options)
}

fn read_all<R: Read>(mut reader: R) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Checks that ids are non-empty and unique per record kind,
/// and that all numbers are finite.
fn validate(map: &Map) -> Result<(), Error> {
    check_ids(&map.lanes)?;
    check_ids(&map.junctions)?;
    check_ids(&map.roads)?;
    check_ids(&map.signals)?;
    check_ids(&map.stop_signs)?;
    check_ids(&map.crosswalks)?;
    check_ids(&map.overlaps)?;

    for lane in &map.lanes {
        check_points("lane", &lane.id, &lane.central_curve)?;
        if !lane.speed_limit.is_finite() {
            return Err(invalid("lane", &lane.id, "non-finite speed limit"));
        }
        let mut samples = lane.left_samples.iter().chain(&lane.right_samples);
        if samples.any(|w| !w.s.is_finite() || !w.width.is_finite()) {
            return Err(invalid("lane", &lane.id, "non-finite width sample"));
        }
    }
    for junction in &map.junctions {
        check_points("junction", &junction.id, &junction.polygon)?;
    }
    for signal in &map.signals {
        check_points("signal", &signal.id, &signal.boundary)?;
        for line in &signal.stop_lines {
            check_points("signal", &signal.id, line)?;
        }
    }
    for stop_sign in &map.stop_signs {
        for line in &stop_sign.stop_lines {
            check_points("stop sign", &stop_sign.id, line)?;
        }
    }
    for crosswalk in &map.crosswalks {
        check_points("crosswalk", &crosswalk.id, &crosswalk.polygon)?;
    }
    Ok(())
}

fn check_ids<T: Record>(records: &[T]) -> Result<(), Error> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if record.id().is_empty() {
            return Err(Error::Invalid(format!("{} with an empty id", T::KIND_NAME)));
        }
        if !seen.insert(record.id()) {
            return Err(invalid(T::KIND_NAME, record.id(), "duplicate id"));
        }
    }
    Ok(())
}

fn check_points(kind: &str, id: &str, points: &[Point2D]) -> Result<(), Error> {
    if points.iter().all(|p| p.is_finite()) {
        Ok(())
    } else {
        Err(invalid(kind, id, "non-finite coordinates"))
    }
}

fn invalid(kind: &str, id: &str, what: &str) -> Error {
    Error::Invalid(format!("{kind} {id:?}: {what}"))
}

/// Removes all records whose geometry does not intersect `rect`.
///
/// Roads are kept if at least one of their lanes is kept, and overlaps
/// if at least one of the referenced records is kept. References to removed
/// records are left in place; they are pruned when building a [MapStore](crate::MapStore).
fn crop(map: &mut Map, rect: AABox) {
    let before = record_count(map);

    map.lanes
        .retain(|l| polyline_intersects_box(&l.central_curve, rect));
    map.junctions
        .retain(|j| polygon_intersects_box(&j.polygon, rect));
    map.signals.retain(|s| {
        polygon_intersects_box(&s.boundary, rect)
            || s.stop_lines.iter().any(|l| polyline_intersects_box(l, rect))
    });
    map.stop_signs
        .retain(|s| s.stop_lines.iter().any(|l| polyline_intersects_box(l, rect)));
    map.crosswalks
        .retain(|c| polygon_intersects_box(&c.polygon, rect));

    let lanes: HashSet<&str> = map.lanes.iter().map(|l| l.id.as_str()).collect();
    map.roads.retain(|r| r.lane_ids().any(|id| lanes.contains(id)));

    let mut kept: HashSet<(ElementKind, &str)> = HashSet::new();
    kept.extend(map.lanes.iter().map(|r| (ElementKind::Lane, r.id.as_str())));
    kept.extend(map.junctions.iter().map(|r| (ElementKind::Junction, r.id.as_str())));
    kept.extend(map.signals.iter().map(|r| (ElementKind::Signal, r.id.as_str())));
    kept.extend(map.stop_signs.iter().map(|r| (ElementKind::StopSign, r.id.as_str())));
    kept.extend(map.crosswalks.iter().map(|r| (ElementKind::Crosswalk, r.id.as_str())));
    kept.extend(map.roads.iter().map(|r| (ElementKind::Road, r.id.as_str())));

    map.overlaps.retain(|o| {
        o.objects
            .iter()
            .any(|obj| kept.contains(&(obj.kind, obj.id.as_str())))
    });

    log::debug!(
        "bounding box filter removed {} of {} record(s)",
        before - record_count(map),
        before,
    );
}

fn record_count(map: &Map) -> usize {
    map.lanes.len()
        + map.junctions.len()
        + map.roads.len()
        + map.signals.len()
        + map.stop_signs.len()
        + map.crosswalks.len()
        + map.overlaps.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_XML: &[u8] = include_bytes!("test_fixtures/simple.xml");
    const SIMPLE_XML_GZ: &[u8] = include_bytes!("test_fixtures/simple.xml.gz");
    const SIMPLE_XML_BZ2: &[u8] = include_bytes!("test_fixtures/simple.xml.bz2");

    fn check_simple_map(map: &Map) {
        assert_eq!(map.header.version, "1.0");
        assert_eq!(map.header.district, "simple");
        assert_eq!(map.lanes.len(), 4);
        assert_eq!(map.junctions.len(), 1);
        assert_eq!(map.roads.len(), 2);
        assert_eq!(map.signals.len(), 1);
        assert_eq!(map.stop_signs.len(), 1);
        assert_eq!(map.crosswalks.len(), 1);
        assert_eq!(map.overlaps.len(), 2);
    }

    #[test]
    fn format_from_path() {
        assert_eq!(FileFormat::from_path("a/b/base_map.bin"), FileFormat::Bin);
        assert_eq!(FileFormat::from_path("base_map.BIN.GZ"), FileFormat::BinGz);
        assert_eq!(FileFormat::from_path("map.xml.bz2"), FileFormat::XmlBz2);
        assert_eq!(FileFormat::from_path("map.xml"), FileFormat::Xml);
        assert_eq!(FileFormat::from_path("map.txt"), FileFormat::Unknown);
        assert_eq!(FileFormat::from_path(""), FileFormat::Unknown);
    }

    #[test]
    fn read_xml() {
        let options = Options {
            file_format: FileFormat::Xml,
            ..Default::default()
        };
        check_simple_map(&read_map_from_buffer(SIMPLE_XML, &options).unwrap());
    }

    #[test]
    fn read_xml_gz() {
        let options = Options {
            file_format: FileFormat::XmlGz,
            ..Default::default()
        };
        check_simple_map(&read_map_from_io(SIMPLE_XML_GZ, &options).unwrap());
    }

    #[test]
    fn read_xml_bz2() {
        let options = Options {
            file_format: FileFormat::XmlBz2,
            ..Default::default()
        };
        check_simple_map(&read_map_from_io(SIMPLE_XML_BZ2, &options).unwrap());
    }

    #[test]
    fn sniff_format() {
        let options = Options::default();
        check_simple_map(&read_map_from_buffer(SIMPLE_XML, &options).unwrap());
        check_simple_map(&read_map_from_buffer(SIMPLE_XML_GZ, &options).unwrap());
        check_simple_map(&read_map_from_buffer(SIMPLE_XML_BZ2, &options).unwrap());

        let map = read_map_from_buffer(SIMPLE_XML, &options).unwrap();
        let binary = wire::encode_map(&map).unwrap();
        assert_eq!(read_map_from_buffer(&binary, &options).unwrap(), map);

        let compressed = {
            let mut e = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
            io::Write::write_all(&mut e, &binary).unwrap();
            e.finish().unwrap()
        };
        assert_eq!(read_map_from_buffer(&compressed, &options).unwrap(), map);
    }

    #[test]
    fn wrong_forced_format() {
        let options = Options {
            file_format: FileFormat::BinGz,
            ..Default::default()
        };
        assert!(read_map_from_buffer(SIMPLE_XML, &options).is_err());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let data = br#"<map><lane id="a"/><lane id="a"/></map>"#;
        let err = read_map_from_buffer(data, &Options::default()).unwrap_err();
        assert!(matches!(err, Error::Invalid(_)), "{err}");
    }

    #[test]
    fn empty_ids_are_rejected() {
        let data = br#"<map><junction id=""/></map>"#;
        let err = read_map_from_buffer(data, &Options::default()).unwrap_err();
        assert!(matches!(err, Error::Invalid(_)), "{err}");
    }

    #[test]
    fn non_finite_coordinates_are_rejected() {
        let data = br#"<map><lane id="a"><point x="NaN" y="0"/></lane></map>"#;
        let err = read_map_from_buffer(data, &Options::default()).unwrap_err();
        assert!(matches!(err, Error::Invalid(_)), "{err}");
    }

    #[test]
    fn crop_to_bbox() {
        let options = Options {
            file_format: FileFormat::Xml,
            bbox: [-1.0, -1.0, 5.0, 1.0],
        };
        let map = read_map_from_buffer(SIMPLE_XML, &options).unwrap();

        let lanes: Vec<&str> = map.lanes.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(lanes, ["l1"]);
        assert!(map.junctions.is_empty());
        assert!(map.signals.is_empty());
        assert!(map.stop_signs.is_empty());
        assert_eq!(map.crosswalks.len(), 1);
        assert_eq!(map.roads.len(), 1);
        assert_eq!(map.roads[0].id, "r1");

        // Both overlaps reference l1
        assert_eq!(map.overlaps.len(), 2);
    }

    #[test]
    fn bbox_ignored_when_not_finite() {
        let options = Options {
            file_format: FileFormat::Xml,
            bbox: [0.0, 0.0, f64::INFINITY, 1.0],
        };
        check_simple_map(&read_map_from_buffer(SIMPLE_XML, &options).unwrap());
    }
}
