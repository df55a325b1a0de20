// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use super::*;

use std::ffi::{c_char, CStr, OsStr};
use std::mem::forget;
use std::os::unix::ffi::OsStrExt;
use std::ptr::null_mut;
use std::slice;

/// Protocol buffers message allocated by Rust. Must be freed with
/// [hdmap_bytes_delete], unless it is a part of a [HdMapBytesList] or
/// a [HdMapLaneProjection]. `data` is null for empty results.
#[repr(C)]
pub struct HdMapBytes {
    pub data: *mut u8,
    pub len: usize,
    pub capacity: usize,
}

impl HdMapBytes {
    const EMPTY: Self = Self {
        data: null_mut(),
        len: 0,
        capacity: 0,
    };

    fn new(mut data: Vec<u8>) -> Self {
        let ptr = data.as_mut_ptr();
        let len = data.len();
        let capacity = data.capacity();
        forget(data);
        Self {
            data: ptr,
            len,
            capacity,
        }
    }

    fn encode<M: wire::WireMessage>(message: &M) -> Self {
        match wire::encode(message) {
            Ok(data) => Self::new(data),
            Err(e) => {
                log::error!("failed to encode query result: {e}");
                Self::EMPTY
            }
        }
    }

    unsafe fn free(self) {
        if !self.data.is_null() {
            drop(Vec::from_raw_parts(self.data, self.len, self.capacity));
        }
    }
}

/// List of protocol buffers messages allocated by Rust. Must be freed with
/// [hdmap_bytes_list_delete]. `items` is null for empty results.
#[repr(C)]
pub struct HdMapBytesList {
    pub items: *mut HdMapBytes,
    pub len: usize,
    pub capacity: usize,
}

impl HdMapBytesList {
    const EMPTY: Self = Self {
        items: null_mut(),
        len: 0,
        capacity: 0,
    };

    fn encode<M: wire::WireMessage>(messages: &[M]) -> Self {
        if messages.is_empty() {
            return Self::EMPTY;
        }

        let mut items: Vec<HdMapBytes> = messages.iter().map(HdMapBytes::encode).collect();
        let ptr = items.as_mut_ptr();
        let len = items.len();
        let capacity = items.capacity();
        forget(items);
        Self {
            items: ptr,
            len,
            capacity,
        }
    }
}

/// C representation of a [LaneProjection]. `lane` holds the encoded [Lane],
/// and is empty if no lane was found. Must be freed with [hdmap_lane_projection_delete].
#[repr(C)]
pub struct HdMapLaneProjection {
    pub lane: HdMapBytes,
    pub distance: f64,
    pub s: f64,
    pub l: f64,
    pub heading: f64,
}

impl HdMapLaneProjection {
    const EMPTY: Self = Self {
        lane: HdMapBytes::EMPTY,
        distance: f64::INFINITY,
        s: 0.0,
        l: 0.0,
        heading: 0.0,
    };
}

impl From<Option<LaneProjection<&Lane>>> for HdMapLaneProjection {
    fn from(value: Option<LaneProjection<&Lane>>) -> Self {
        match value {
            Some(p) => Self {
                lane: HdMapBytes::encode(p.lane),
                distance: p.distance,
                s: p.s,
                l: p.l,
                heading: p.heading.radians(),
            },
            None => Self::EMPTY,
        }
    }
}

#[derive(Copy, Clone)]
#[repr(C)]
pub enum HdMapFileFormat {
    Unknown = 0,
    Bin = 1,
    BinGz = 2,
    BinBz2 = 3,
    Xml = 4,
    XmlGz = 5,
    XmlBz2 = 6,
}

impl From<HdMapFileFormat> for FileFormat {
    fn from(value: HdMapFileFormat) -> Self {
        match value {
            HdMapFileFormat::Unknown => FileFormat::Unknown,
            HdMapFileFormat::Bin => FileFormat::Bin,
            HdMapFileFormat::BinGz => FileFormat::BinGz,
            HdMapFileFormat::BinBz2 => FileFormat::BinBz2,
            HdMapFileFormat::Xml => FileFormat::Xml,
            HdMapFileFormat::XmlGz => FileFormat::XmlGz,
            HdMapFileFormat::XmlBz2 => FileFormat::XmlBz2,
        }
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdmap_new() -> *mut HdMap {
    Box::into_raw(Box::<HdMap>::default())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdmap_delete(ptr: *mut HdMap) {
    if !ptr.is_null() {
        drop(Box::from_raw(ptr));
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdmap_is_loaded(map: *const HdMap) -> bool {
    map.as_ref().is_some_and(|m| m.is_loaded())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdmap_load_map_from_file(map: *const HdMap, c_filename: *const c_char) -> bool {
    let Some(map) = map.as_ref() else {
        return false;
    };
    if c_filename.is_null() {
        return false;
    }

    let filename = OsStr::from_bytes(CStr::from_ptr(c_filename).to_bytes());
    match map.load_map_from_file(filename) {
        Ok(()) => true,
        Err(e) => {
            log::error!("{e}");
            false
        }
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdmap_load_map_from_memory(
    map: *const HdMap,
    format: HdMapFileFormat,
    content: *const u8,
    content_len: usize,
) -> bool {
    let Some(map) = map.as_ref() else {
        return false;
    };
    if content.is_null() {
        return false;
    }

    let content = slice::from_raw_parts(content, content_len);
    let options = Options {
        file_format: format.into(),
        ..Default::default()
    };
    match map.load_map_from_buffer(content, &options) {
        Ok(()) => true,
        Err(e) => {
            log::error!("{e}");
            false
        }
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdmap_get_local_map(
    map: *const HdMap,
    x: f64,
    y: f64,
    range_x: f64,
    range_y: f64,
) -> HdMapBytes {
    map.as_ref()
        .and_then(|m| m.snapshot())
        .and_then(|s| s.get_local_map(x, y, range_x, range_y))
        .map_or(HdMapBytes::EMPTY, |local| HdMapBytes::encode(&local))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdmap_get_nearest_lane(map: *const HdMap, x: f64, y: f64) -> HdMapLaneProjection {
    match map.as_ref().and_then(|m| m.snapshot()) {
        Some(s) => s.get_nearest_lane(x, y).into(),
        None => HdMapLaneProjection::EMPTY,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdmap_get_lanes_with_heading(
    map: *const HdMap,
    x: f64,
    y: f64,
    distance: f64,
    central_heading: f64,
    max_heading_difference: f64,
) -> HdMapBytesList {
    match map.as_ref().and_then(|m| m.snapshot()) {
        Some(s) => {
            let lanes: Vec<Lane> = s
                .get_lanes_with_heading(x, y, distance, central_heading, max_heading_difference)
                .into_iter()
                .map(|p| p.lane.clone())
                .collect();
            HdMapBytesList::encode(&lanes)
        }
        None => HdMapBytesList::EMPTY,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdmap_get_nearest_lane_with_heading(
    map: *const HdMap,
    x: f64,
    y: f64,
    distance: f64,
    central_heading: f64,
    max_heading_difference: f64,
) -> HdMapLaneProjection {
    match map.as_ref().and_then(|m| m.snapshot()) {
        Some(s) => s
            .get_nearest_lane_with_heading(x, y, distance, central_heading, max_heading_difference)
            .into(),
        None => HdMapLaneProjection::EMPTY,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdmap_get_junctions(
    map: *const HdMap,
    x: f64,
    y: f64,
    distance: f64,
) -> HdMapBytesList {
    match map.as_ref() {
        Some(m) => HdMapBytesList::encode(&m.get_junctions(x, y, distance)),
        None => HdMapBytesList::EMPTY,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdmap_get_lane_by_id(map: *const HdMap, c_id: *const c_char) -> HdMapBytes {
    if c_id.is_null() {
        return HdMapBytes::EMPTY;
    }
    let id = CStr::from_ptr(c_id).to_string_lossy();
    map.as_ref()
        .and_then(|m| m.get_lane_by_id(&id))
        .map_or(HdMapBytes::EMPTY, |lane| HdMapBytes::encode(&lane))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdmap_get_junction_by_id(map: *const HdMap, c_id: *const c_char) -> HdMapBytes {
    if c_id.is_null() {
        return HdMapBytes::EMPTY;
    }
    let id = CStr::from_ptr(c_id).to_string_lossy();
    map.as_ref()
        .and_then(|m| m.get_junction_by_id(&id))
        .map_or(HdMapBytes::EMPTY, |junction| HdMapBytes::encode(&junction))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdmap_bytes_delete(bytes: HdMapBytes) {
    bytes.free();
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdmap_bytes_list_delete(list: HdMapBytesList) {
    if !list.items.is_null() {
        let items = Vec::from_raw_parts(list.items, list.len, list.capacity);
        for item in items {
            item.free();
        }
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn hdmap_lane_projection_delete(projection: HdMapLaneProjection) {
    projection.lane.free();
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_XML: &[u8] = include_bytes!("reader/test_fixtures/simple.xml");

    unsafe fn bytes_as_slice(bytes: &HdMapBytes) -> &[u8] {
        if bytes.data.is_null() {
            &[]
        } else {
            slice::from_raw_parts(bytes.data, bytes.len)
        }
    }

    unsafe fn list_as_slice(list: &HdMapBytesList) -> &[HdMapBytes] {
        if list.items.is_null() {
            &[]
        } else {
            slice::from_raw_parts(list.items, list.len)
        }
    }

    unsafe fn loaded_map() -> *mut HdMap {
        let map = hdmap_new();
        assert!(hdmap_load_map_from_memory(
            map,
            HdMapFileFormat::Xml,
            SIMPLE_XML.as_ptr(),
            SIMPLE_XML.len(),
        ));
        map
    }

    #[test]
    fn null_handle_behaves_as_unloaded() {
        unsafe {
            let map: *const HdMap = std::ptr::null();
            assert!(!hdmap_is_loaded(map));
            assert!(!hdmap_load_map_from_file(map, c"map.bin".as_ptr()));

            let local = hdmap_get_local_map(map, 0.0, 0.0, 10.0, 10.0);
            assert!(local.data.is_null());
            assert_eq!(local.len, 0);

            let nearest = hdmap_get_nearest_lane(map, 0.0, 0.0);
            assert!(nearest.lane.data.is_null());

            let junctions = hdmap_get_junctions(map, 0.0, 0.0, 10.0);
            assert!(junctions.items.is_null());
            assert_eq!(junctions.len, 0);

            // Freeing empty results is a no-op
            hdmap_bytes_delete(local);
            hdmap_lane_projection_delete(nearest);
            hdmap_bytes_list_delete(junctions);
            hdmap_delete(null_mut());
        }
    }

    #[test]
    fn load_failure() {
        unsafe {
            let map = hdmap_new();
            assert!(!hdmap_load_map_from_file(map, c"/this/path/does/not/exist.bin".as_ptr()));
            assert!(!hdmap_load_map_from_file(map, std::ptr::null()));

            let garbage = b"<map><lane/></map>";
            assert!(!hdmap_load_map_from_memory(
                map,
                HdMapFileFormat::Unknown,
                garbage.as_ptr(),
                garbage.len(),
            ));
            assert!(!hdmap_is_loaded(map));
            hdmap_delete(map);
        }
    }

    #[test]
    fn nearest_lane() {
        unsafe {
            let map = loaded_map();
            assert!(hdmap_is_loaded(map));

            let p = hdmap_get_nearest_lane(map, 5.0, 1.0);
            let lane = wire::decode_lane(bytes_as_slice(&p.lane)).unwrap();
            assert_eq!(lane.id, "l1");
            assert_eq!(lane.successor_ids, ["l2"]);
            assert!((p.distance - 1.0).abs() < 1e-9);
            assert!((p.s - 5.0).abs() < 1e-9);
            assert!((p.l - 1.0).abs() < 1e-9);
            hdmap_lane_projection_delete(p);

            let p = hdmap_get_nearest_lane_with_heading(map, 5.0, 3.0, 2.0, std::f64::consts::PI, 0.1);
            let lane = wire::decode_lane(bytes_as_slice(&p.lane)).unwrap();
            assert_eq!(lane.id, "l3");
            hdmap_lane_projection_delete(p);

            let p = hdmap_get_nearest_lane_with_heading(map, 5.0, 3.0, 0.1, 0.0, 0.1);
            assert!(p.lane.data.is_null());
            hdmap_lane_projection_delete(p);

            hdmap_delete(map);
        }
    }

    #[test]
    fn lists() {
        unsafe {
            let map = loaded_map();

            let lanes = hdmap_get_lanes_with_heading(map, 5.0, 1.75, 2.0, 0.0, 3.2);
            let ids: Vec<String> = list_as_slice(&lanes)
                .iter()
                .map(|b| wire::decode_lane(bytes_as_slice(b)).unwrap().id)
                .collect();
            assert_eq!(ids, ["l1", "l3"]);
            hdmap_bytes_list_delete(lanes);

            let junctions = hdmap_get_junctions(map, 15.0, 0.0, 1.0);
            assert_eq!(junctions.len, 1);
            let j = wire::decode_junction(bytes_as_slice(&list_as_slice(&junctions)[0])).unwrap();
            assert_eq!(j.id, "j1");
            hdmap_bytes_list_delete(junctions);

            let none = hdmap_get_junctions(map, 100.0, 100.0, 1.0);
            assert!(none.items.is_null());
            hdmap_bytes_list_delete(none);

            hdmap_delete(map);
        }
    }

    #[test]
    fn local_map() {
        unsafe {
            let map = loaded_map();

            let first = hdmap_get_local_map(map, 5.0, 0.0, 1.0, 1.0);
            let second = hdmap_get_local_map(map, 5.0, 0.0, 1.0, 1.0);
            assert_eq!(bytes_as_slice(&first), bytes_as_slice(&second));

            let local = wire::decode_map(bytes_as_slice(&first)).unwrap();
            assert_eq!(local.lanes.len(), 1);
            assert_eq!(local.crosswalks.len(), 1);
            assert_eq!(local.header.district, "simple");
            hdmap_bytes_delete(first);
            hdmap_bytes_delete(second);

            let empty = hdmap_get_local_map(map, 100.0, 100.0, 1.0, 1.0);
            assert!(empty.data.is_null());
            hdmap_bytes_delete(empty);

            hdmap_delete(map);
        }
    }

    #[test]
    fn by_id() {
        unsafe {
            let map = loaded_map();

            let lane = hdmap_get_lane_by_id(map, c"l2".as_ptr());
            assert_eq!(wire::decode_lane(bytes_as_slice(&lane)).unwrap().id, "l2");
            hdmap_bytes_delete(lane);

            let junction = hdmap_get_junction_by_id(map, c"j1".as_ptr());
            assert_eq!(wire::decode_junction(bytes_as_slice(&junction)).unwrap().id, "j1");
            hdmap_bytes_delete(junction);

            let missing = hdmap_get_lane_by_id(map, c"nope".as_ptr());
            assert!(missing.data.is_null());
            hdmap_bytes_delete(missing);

            hdmap_delete(map);
        }
    }

    #[test]
    fn load_from_file() {
        let path = std::env::temp_dir().join(format!("hdmap-c-test-{}.xml", std::process::id()));
        std::fs::write(&path, SIMPLE_XML).unwrap();
        let c_path = std::ffi::CString::new(path.as_os_str().as_bytes()).unwrap();

        unsafe {
            let map = hdmap_new();
            assert!(hdmap_load_map_from_file(map, c_path.as_ptr()));
            assert!(hdmap_is_loaded(map));
            hdmap_delete(map);
        }

        std::fs::remove_file(&path).unwrap();
    }
}
