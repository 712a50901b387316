use std::{fs::File, io::{BufReader, BufWriter, Read}, path::Path};

use anyhow::Context;
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};
use mileage_tracker_lib::path_point::{Fix, PathPoint};

/// Rough conversion from dilution of precision to an accuracy radius.
const METERS_PER_HDOP: f64 = 5.;

pub fn read_fixes(path: &Path, default_accuracy: f64) -> anyhow::Result<Vec<Fix>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    parse_fixes(BufReader::new(file), default_accuracy).with_context(|| format!("Failed to read {:?}", path))
}

/// Every track point of every segment, in file order.
pub fn parse_fixes(reader: impl Read, default_accuracy: f64) -> anyhow::Result<Vec<Fix>> {
    let gpx = gpx::read(reader)?;

    let fixes = gpx.tracks
        .iter()
        .flat_map(|track| track.segments.iter())
        .flat_map(|segment| segment.points.iter())
        .map(|waypoint| {
            let point = waypoint.point();
            let accuracy = waypoint.hdop.map_or(default_accuracy, |hdop| hdop * METERS_PER_HDOP);
            Fix::new(point.y(), point.x(), accuracy)
        })
        .collect();

    Ok(fixes)
}

pub fn write_path(path: &Path, name: &str, points: &[PathPoint]) -> anyhow::Result<()> {
    let mut segment = TrackSegment::new();
    segment.points.extend(points.iter().map(|point| Waypoint::new(point.position())));

    let mut track = Track::new();
    track.name = Some(name.to_string());
    track.segments.push(segment);

    let mut gpx = Gpx::default();
    gpx.version = GpxVersion::Gpx11;
    gpx.creator = Some(env!("CARGO_PKG_NAME").to_string());
    gpx.tracks.push(track);

    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    gpx::write(&gpx, BufWriter::new(file))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <name>Morning commute</name>
    <trkseg>
      <trkpt lat="40.0" lon="-75.0"><hdop>2.0</hdop></trkpt>
      <trkpt lat="40.0004" lon="-75.0"></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn accuracy_from_hdop_or_default() {
        let fixes = parse_fixes(TRACK.as_bytes(), 12.).unwrap();
        assert_eq!(fixes, vec![Fix::new(40.0, -75.0, 10.), Fix::new(40.0004, -75.0, 12.)]);
    }

    #[test]
    fn exported_path_reads_back() {
        let path = std::env::temp_dir().join(format!("mileage-export-{}.gpx", std::process::id()));
        let points = vec![PathPoint::new(40.0, -75.0, 4.), PathPoint::new(40.0004, -75.0, 4.)];

        write_path(&path, "Trip", &points).unwrap();
        let fixes = read_fixes(&path, 7.).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(fixes.len(), 2);
        assert_eq!((fixes[1].latitude, fixes[1].longitude), (40.0004, -75.0));
        assert_eq!(fixes[1].accuracy_meters, 7.);
    }
}
