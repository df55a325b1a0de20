// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};

use crate::geometry::Point2D;
use crate::model::{
    Crosswalk, ElementKind, Header, Junction, Lane, LaneTurn, LaneType, Map, ObjectRef, Overlap,
    Road, RoadSection, Signal, SignalType, StopSign, WidthSample,
};

/// Error which can occur when parsing an XML map dataset.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Attr(#[from] AttrError),

    #[error("<{element}>: missing {attribute:?} attribute")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },

    #[error("<{element}>: invalid {attribute:?} attribute: {value:?}")]
    InvalidAttribute {
        element: String,
        attribute: &'static str,
        value: String,
    },

    #[error("unexpected <{0}> element")]
    UnexpectedElement(String),

    #[error("missing <map> root element")]
    MissingRoot,
}

/// Parses an uncompressed XML dataset.
///
/// The document must have a single `<map>` root element. Unrecognized elements
/// are skipped together with their content.
pub(super) fn read_map(data: &[u8]) -> Result<Map, Error> {
    let mut reader = quick_xml::Reader::from_reader(data);
    let mut builder = Builder::default();

    loop {
        match reader.read_event()? {
            Event::Start(start) => builder.start(&start)?,
            Event::Empty(start) => {
                builder.start(&start)?;
                builder.end();
            }
            Event::End(_) => builder.end(),
            Event::Eof => break,
            _ => {}
        }
    }

    builder.finish()
}

/// A top-level record whose child elements are still being parsed.
enum Pending {
    Lane(Lane),
    Junction(Junction),
    Road(Road),
    Signal(Signal),
    StopSign(StopSign),
    Crosswalk(Crosswalk),
    Overlap(Overlap),
}

/// Builder assembles a [Map] from a stream of element start/end events.
///
/// The position in the document is tracked by nesting depth only:
/// 1 is the `<map>` root, 2 are records, 3 are record children
/// (including `<section>` and `<stop_line>` containers) and 4 are container children.
#[derive(Default)]
struct Builder {
    map: Map,
    has_root: bool,
    depth: usize,

    /// Depth of the unrecognized element currently being skipped
    skipping: Option<usize>,

    pending: Option<Pending>,
    section: Option<RoadSection>,
    stop_line: Option<Vec<Point2D>>,
}

impl Builder {
    fn start(&mut self, e: &BytesStart<'_>) -> Result<(), Error> {
        self.depth += 1;
        if self.skipping.is_some() {
            return Ok(());
        }

        let attrs = Attributes::parse(e)?;
        let recognized = match self.depth {
            1 => self.start_root(&attrs)?,
            2 => self.start_record(&attrs)?,
            3 => self.start_child(&attrs)?,
            4 => self.start_grandchild(&attrs)?,
            _ => false,
        };

        if !recognized {
            log::debug!("skipping unrecognized <{}> element", attrs.element);
            self.skipping = Some(self.depth);
        }
        Ok(())
    }

    fn end(&mut self) {
        let depth = self.depth;
        self.depth = self.depth.saturating_sub(1);

        if let Some(skipped) = self.skipping {
            if skipped == depth {
                self.skipping = None;
            }
            return;
        }

        match depth {
            2 => self.finish_record(),
            3 => self.finish_container(),
            _ => {}
        }
    }

    fn finish(self) -> Result<Map, Error> {
        if self.has_root {
            Ok(self.map)
        } else {
            Err(Error::MissingRoot)
        }
    }

    fn start_root(&mut self, attrs: &Attributes) -> Result<bool, Error> {
        if attrs.element != "map" || self.has_root {
            return Err(Error::UnexpectedElement(attrs.element.clone()));
        }

        self.has_root = true;
        self.map.header = Header {
            version: attrs.get_or_default("version"),
            date: attrs.get_or_default("date"),
            projection: attrs.get_or_default("projection"),
            district: attrs.get_or_default("district"),
            vendor: attrs.get_or_default("vendor"),
        };
        Ok(true)
    }

    fn start_record(&mut self, attrs: &Attributes) -> Result<bool, Error> {
        let pending = match attrs.element.as_str() {
            "lane" => Pending::Lane(Lane {
                id: attrs.string("id")?,
                speed_limit: attrs.optional_number("speed_limit")?.unwrap_or_default(),
                lane_type: attrs
                    .enumeration("type", LaneType::from_name)?
                    .unwrap_or_default(),
                turn: attrs
                    .enumeration("turn", LaneTurn::from_name)?
                    .unwrap_or_default(),
                junction_id: attrs.get("junction").map(str::to_string),
                ..Default::default()
            }),

            "junction" => Pending::Junction(Junction {
                id: attrs.string("id")?,
                ..Default::default()
            }),

            "road" => Pending::Road(Road {
                id: attrs.string("id")?,
                junction_id: attrs.get("junction").map(str::to_string),
                sections: Vec::default(),
            }),

            "signal" => Pending::Signal(Signal {
                id: attrs.string("id")?,
                signal_type: attrs
                    .enumeration("type", SignalType::from_name)?
                    .unwrap_or_default(),
                ..Default::default()
            }),

            "stop_sign" => Pending::StopSign(StopSign {
                id: attrs.string("id")?,
                ..Default::default()
            }),

            "crosswalk" => Pending::Crosswalk(Crosswalk {
                id: attrs.string("id")?,
                ..Default::default()
            }),

            "overlap" => Pending::Overlap(Overlap {
                id: attrs.string("id")?,
                objects: Vec::default(),
            }),

            _ => return Ok(false),
        };

        self.pending = Some(pending);
        Ok(true)
    }

    fn start_child(&mut self, attrs: &Attributes) -> Result<bool, Error> {
        let Some(ref mut pending) = self.pending else {
            return Ok(false);
        };

        match (pending, attrs.element.as_str()) {
            (Pending::Lane(l), "point") => l.central_curve.push(attrs.point()?),
            (Pending::Lane(l), "left_sample") => l.left_samples.push(attrs.width_sample()?),
            (Pending::Lane(l), "right_sample") => l.right_samples.push(attrs.width_sample()?),
            (Pending::Lane(l), "predecessor") => l.predecessor_ids.push(attrs.string("id")?),
            (Pending::Lane(l), "successor") => l.successor_ids.push(attrs.string("id")?),
            (Pending::Lane(l), "left_neighbor") => l.left_neighbor_ids.push(attrs.string("id")?),
            (Pending::Lane(l), "right_neighbor") => {
                l.right_neighbor_ids.push(attrs.string("id")?)
            }
            (Pending::Lane(l), "overlap") => l.overlap_ids.push(attrs.string("id")?),

            (Pending::Junction(j), "point") => j.polygon.push(attrs.point()?),
            (Pending::Junction(j), "lane") => j.lane_ids.push(attrs.string("id")?),
            (Pending::Junction(j), "overlap") => j.overlap_ids.push(attrs.string("id")?),

            (Pending::Road(_), "section") => {
                self.section = Some(RoadSection {
                    id: attrs.string("id")?,
                    lane_ids: Vec::default(),
                })
            }

            (Pending::Signal(s), "point") => s.boundary.push(attrs.point()?),
            (Pending::Signal(_), "stop_line") => self.stop_line = Some(Vec::default()),
            (Pending::Signal(s), "overlap") => s.overlap_ids.push(attrs.string("id")?),

            (Pending::StopSign(_), "stop_line") => self.stop_line = Some(Vec::default()),
            (Pending::StopSign(s), "overlap") => s.overlap_ids.push(attrs.string("id")?),

            (Pending::Crosswalk(c), "point") => c.polygon.push(attrs.point()?),
            (Pending::Crosswalk(c), "overlap") => c.overlap_ids.push(attrs.string("id")?),

            (Pending::Overlap(o), "object") => o.objects.push(attrs.object_ref()?),

            _ => return Ok(false),
        }
        Ok(true)
    }

    fn start_grandchild(&mut self, attrs: &Attributes) -> Result<bool, Error> {
        match (&mut self.section, &mut self.stop_line, attrs.element.as_str()) {
            (Some(section), _, "lane") => section.lane_ids.push(attrs.string("id")?),
            (_, Some(line), "point") => line.push(attrs.point()?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn finish_container(&mut self) {
        if let Some(section) = self.section.take() {
            if let Some(Pending::Road(ref mut road)) = self.pending {
                road.sections.push(section);
            }
        }

        if let Some(line) = self.stop_line.take() {
            match self.pending {
                Some(Pending::Signal(ref mut s)) => s.stop_lines.push(line),
                Some(Pending::StopSign(ref mut s)) => s.stop_lines.push(line),
                _ => {}
            }
        }
    }

    fn finish_record(&mut self) {
        match self.pending.take() {
            Some(Pending::Lane(l)) => self.map.lanes.push(l),
            Some(Pending::Junction(j)) => self.map.junctions.push(j),
            Some(Pending::Road(r)) => self.map.roads.push(r),
            Some(Pending::Signal(s)) => self.map.signals.push(s),
            Some(Pending::StopSign(s)) => self.map.stop_signs.push(s),
            Some(Pending::Crosswalk(c)) => self.map.crosswalks.push(c),
            Some(Pending::Overlap(o)) => self.map.overlaps.push(o),
            None => {}
        }
    }
}

/// Unescaped attributes of a single element.
struct Attributes {
    element: String,
    values: Vec<(String, String)>,
}

impl Attributes {
    fn parse(e: &BytesStart<'_>) -> Result<Self, Error> {
        let element = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        let mut values = Vec::default();
        for attr in e.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            values.push((key, value));
        }
        Ok(Self { element, values })
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn get_or_default(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    fn string(&self, key: &'static str) -> Result<String, Error> {
        self.get(key)
            .map(str::to_string)
            .ok_or_else(|| Error::MissingAttribute {
                element: self.element.clone(),
                attribute: key,
            })
    }

    fn number(&self, key: &'static str) -> Result<f64, Error> {
        self.optional_number(key)?
            .ok_or_else(|| Error::MissingAttribute {
                element: self.element.clone(),
                attribute: key,
            })
    }

    fn optional_number(&self, key: &'static str) -> Result<Option<f64>, Error> {
        self.get(key)
            .map(|v| v.trim().parse().map_err(|_| self.invalid(key, v)))
            .transpose()
    }

    fn enumeration<T>(&self, key: &'static str, parse: fn(&str) -> Option<T>) -> Result<Option<T>, Error> {
        self.get(key)
            .map(|v| parse(v).ok_or_else(|| self.invalid(key, v)))
            .transpose()
    }

    fn point(&self) -> Result<Point2D, Error> {
        Ok(Point2D::new(self.number("x")?, self.number("y")?))
    }

    fn width_sample(&self) -> Result<WidthSample, Error> {
        Ok(WidthSample {
            s: self.number("s")?,
            width: self.number("width")?,
        })
    }

    fn object_ref(&self) -> Result<ObjectRef, Error> {
        let kind = self
            .enumeration("kind", ElementKind::from_name)?
            .ok_or_else(|| Error::MissingAttribute {
                element: self.element.clone(),
                attribute: "kind",
            })?;
        Ok(ObjectRef {
            id: self.string("id")?,
            kind,
        })
    }

    fn invalid(&self, key: &'static str, value: &str) -> Error {
        Error::InvalidAttribute {
            element: self.element.clone(),
            attribute: key,
            value: value.to_string(),
        }
    }
}
