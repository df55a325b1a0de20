// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use hdmap::{FileFormat, HdMap, LaneProjection, Map, Point2D};

#[derive(Debug, thiserror::Error)]
#[error("failed to load map: {0}")]
struct MapLoadError(#[from] hdmap::LoadError);

#[derive(Debug, thiserror::Error)]
#[error("no map records found")]
struct NothingFound;

#[derive(Parser)]
struct Cli {
    /// The path to the map dataset
    map_file: PathBuf,

    /// Format of the map dataset, guessed from the file name and content if not provided
    #[arg(short, long, value_enum)]
    format: Option<Format>,

    /// Print debug logs
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Bin,
    BinGz,
    BinBz2,
    Xml,
    XmlGz,
    XmlBz2,
}

impl From<Format> for FileFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Bin => FileFormat::Bin,
            Format::BinGz => FileFormat::BinGz,
            Format::BinBz2 => FileFormat::BinBz2,
            Format::Xml => FileFormat::Xml,
            Format::XmlGz => FileFormat::XmlGz,
            Format::XmlBz2 => FileFormat::XmlBz2,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print ids of all records inside a rectangle
    LocalMap {
        x: f64,
        y: f64,
        range_x: f64,
        range_y: f64,
    },

    /// Print the lane closest to a point
    NearestLane { x: f64, y: f64 },

    /// Print all lanes near a point, going in a specific direction
    LanesWithHeading {
        x: f64,
        y: f64,
        distance: f64,

        /// Expected heading, in radians counter-clockwise from the x axis
        heading: f64,

        /// Maximum heading difference, in radians
        max_heading_difference: f64,
    },

    /// Print the closest lane near a point, going in a specific direction
    NearestLaneWithHeading {
        x: f64,
        y: f64,
        distance: f64,
        heading: f64,
        max_heading_difference: f64,
    },

    /// Print all junctions near a point
    Junctions { x: f64, y: f64, distance: f64 },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let mut logger = colog::default_builder();
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let map = HdMap::new();
    let options = hdmap::Options {
        file_format: cli.format.map(FileFormat::from).unwrap_or_default(),
        ..Default::default()
    };
    map.load_map_from_file_with_options(&cli.map_file, &options)
        .map_err(MapLoadError)?;

    match cli.command {
        Command::LocalMap {
            x,
            y,
            range_x,
            range_y,
        } => {
            let local = map
                .get_local_map(x, y, range_x, range_y)
                .ok_or(NothingFound)?;
            print_local_map(&local);
        }

        Command::NearestLane { x, y } => {
            let nearest = map.get_nearest_lane(x, y).ok_or(NothingFound)?;
            println!("{}", lane_projection_json(&nearest));
        }

        Command::LanesWithHeading {
            x,
            y,
            distance,
            heading,
            max_heading_difference,
        } => {
            let lanes = map.get_lanes_with_heading(x, y, distance, heading, max_heading_difference);
            println!("[");
            let mut lanes = lanes.iter().peekable();
            while let Some(lane) = lanes.next() {
                let suffix = if lanes.peek().is_some() { "," } else { "" };
                println!("  {}{}", lane_projection_json(lane), suffix);
            }
            println!("]");
        }

        Command::NearestLaneWithHeading {
            x,
            y,
            distance,
            heading,
            max_heading_difference,
        } => {
            let nearest = map
                .get_nearest_lane_with_heading(x, y, distance, heading, max_heading_difference)
                .ok_or(NothingFound)?;
            println!("{}", lane_projection_json(&nearest));
        }

        Command::Junctions { x, y, distance } => {
            let junctions = map.get_junctions(x, y, distance);
            println!("[");
            let mut junctions = junctions.iter().peekable();
            while let Some(junction) = junctions.next() {
                let suffix = if junctions.peek().is_some() { "," } else { "" };
                println!(
                    "  {{\"id\": {}, \"polygon\": {}}}{}",
                    json_string(&junction.id),
                    points_json(&junction.polygon),
                    suffix,
                );
            }
            println!("]");
        }
    }

    Ok(())
}

fn print_local_map(map: &Map) {
    let groups: [(&str, Vec<&str>); 7] = [
        ("lanes", map.lanes.iter().map(|r| r.id.as_str()).collect()),
        ("junctions", map.junctions.iter().map(|r| r.id.as_str()).collect()),
        ("roads", map.roads.iter().map(|r| r.id.as_str()).collect()),
        ("signals", map.signals.iter().map(|r| r.id.as_str()).collect()),
        ("stop_signs", map.stop_signs.iter().map(|r| r.id.as_str()).collect()),
        ("crosswalks", map.crosswalks.iter().map(|r| r.id.as_str()).collect()),
        ("overlaps", map.overlaps.iter().map(|r| r.id.as_str()).collect()),
    ];

    println!("{{");
    for (key, ids) in groups {
        let ids: Vec<String> = ids.into_iter().map(json_string).collect();
        println!("  \"{}\": [{}],", key, ids.join(", "));
    }
    println!("  \"district\": {}", json_string(&map.header.district));
    println!("}}");
}

fn lane_projection_json(p: &LaneProjection) -> String {
    format!(
        "{{\"id\": {}, \"distance\": {}, \"s\": {}, \"l\": {}, \"heading\": {}, \"type\": \"{}\", \"turn\": \"{}\"}}",
        json_string(&p.lane.id),
        p.distance,
        p.s,
        p.l,
        p.heading.radians(),
        p.lane.lane_type,
        p.lane.turn,
    )
}

fn points_json(points: &[Point2D]) -> String {
    let points: Vec<String> = points.iter().map(|p| format!("[{}, {}]", p.x, p.y)).collect();
    format!("[{}]", points.join(", "))
}

/// Quotes a record id for the JSON output. Output is printed by hand, like
/// everything else in this tool; ids and the district name are the only strings escaped.
fn json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
