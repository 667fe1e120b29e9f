//! GPX 1.1 reading and append-only track recording.
//!
//! Reading goes through the `gpx` crate. Writing is done by hand so a track
//! can grow one point at a time: the file is closed (`</trkseg></trk></gpx>`)
//! after every appended point, and the next append seeks back over that
//! footer. A crash between points therefore always leaves valid XML behind.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, TimeZone, Utc};
use gpx::Waypoint;
use tracing::{debug, info};

use crate::error::{TrackError, TrackResult};
use crate::fix::LocationFix;

pub const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";
const FOOTER: &str = "  </trkseg></trk>\n</gpx>\n";

pub fn parse(xml: &str) -> TrackResult<Vec<LocationFix>> {
    read_from(xml.as_bytes())
}

pub fn read_file(path: &Path) -> TrackResult<Vec<LocationFix>> {
    let file = File::open(path)?;
    read_from(BufReader::new(file))
}

fn read_from<R: Read>(reader: R) -> TrackResult<Vec<LocationFix>> {
    let gpx = gpx::read(reader).map_err(|e| TrackError::Parse(e.to_string()))?;

    let mut fixes = Vec::new();
    for track in gpx.tracks {
        for segment in track.segments {
            for waypoint in segment.points {
                let fix = waypoint_to_fix(waypoint, fixes.len())?;
                fixes.push(fix);
            }
        }
    }

    debug!(points = fixes.len(), "parsed GPX document");
    Ok(fixes)
}

fn waypoint_to_fix(waypoint: Waypoint, index: usize) -> TrackResult<LocationFix> {
    let point = waypoint.point();
    let altitude = waypoint
        .elevation
        .ok_or_else(|| TrackError::Parse(format!("track point {} has no <ele>", index)))?;

    let recorded = waypoint
        .time
        .map(time::OffsetDateTime::from)
        .ok_or_else(|| TrackError::Parse(format!("track point {} has no <time>", index)))?;
    let timestamp = Utc
        .timestamp_opt(recorded.unix_timestamp(), recorded.nanosecond())
        .single()
        .ok_or_else(|| TrackError::Parse(format!("track point {} has an invalid <time>", index)))?;

    Ok(LocationFix::new(point.y(), point.x(), altitude, timestamp))
}

fn header(creator: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<gpx version=\"1.1\" creator=\"{}\" xmlns=\"{}\">\n  <trk><trkseg>\n",
        escape_xml(creator),
        GPX_NAMESPACE
    )
}

fn format_point(fix: &LocationFix) -> String {
    format!(
        "    <trkpt lat=\"{:.6}\" lon=\"{:.6}\"><ele>{:.1}</ele><time>{}</time></trkpt>\n",
        fix.latitude(),
        fix.longitude(),
        fix.altitude,
        fix.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    )
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Renders a complete document in the same format the track writer produces.
pub fn to_gpx_string(fixes: &[LocationFix], creator: &str) -> String {
    let mut gpx = header(creator);
    for fix in fixes {
        gpx.push_str(&format_point(fix));
    }
    gpx.push_str(FOOTER);
    gpx
}

/// Append-only recorder for a single track file.
#[derive(Debug, Clone)]
pub struct GpxTrackWriter {
    path: PathBuf,
    creator: String,
}

impl GpxTrackWriter {
    pub fn new(path: impl Into<PathBuf>, creator: impl Into<String>) -> Self {
        GpxTrackWriter {
            path: path.into(),
            creator: creator.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates (or truncates) the file and writes the open header.
    pub fn start_new_track(&self) -> TrackResult<()> {
        let mut file = File::create(&self.path)?;
        file.write_all(header(&self.creator).as_bytes())?;
        file.flush()?;
        info!(path = %self.path.display(), "started new track");
        Ok(())
    }

    pub fn append_point(&self, fix: &LocationFix) -> TrackResult<()> {
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let offset = content_end(&mut file)?;

        let mut chunk = format_point(fix);
        chunk.push_str(FOOTER);

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(chunk.as_bytes())?;
        file.set_len(offset + chunk.len() as u64)?;
        file.flush()?;
        Ok(())
    }

    /// Closes the document if it is still open. Safe to call repeatedly.
    pub fn finalize_track(&self) -> TrackResult<()> {
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let len = file.metadata()?.len();
        if content_end(&mut file)? == len {
            file.seek(SeekFrom::End(0))?;
            file.write_all(FOOTER.as_bytes())?;
            file.flush()?;
            info!(path = %self.path.display(), "finalized track");
        }
        Ok(())
    }

    pub fn has_track(&self) -> bool {
        self.path.is_file()
    }

    pub fn delete_track(&self) -> TrackResult<()> {
        fs::remove_file(&self.path)?;
        info!(path = %self.path.display(), "deleted track");
        Ok(())
    }

    pub fn read_track(&self) -> TrackResult<Vec<LocationFix>> {
        self.finalize_track()?;
        read_file(&self.path)
    }
}

/// Offset where the next point goes: before the footer if present, else end of file.
fn content_end(file: &mut File) -> std::io::Result<u64> {
    let len = file.metadata()?.len();
    let footer_len = FOOTER.len() as u64;

    if len >= footer_len {
        file.seek(SeekFrom::Start(len - footer_len))?;
        let mut tail = vec![0u8; FOOTER.len()];
        file.read_exact(&mut tail)?;
        if tail == FOOTER.as_bytes() {
            return Ok(len - footer_len);
        }
    }

    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><trkseg>
    <trkpt lat="37.774900" lon="-122.419400"><ele>10.0</ele><time>2024-01-01T12:00:00Z</time></trkpt>
    <trkpt lat="37.775900" lon="-122.419400"><ele>12.5</ele><time>2024-01-01T12:00:01Z</time></trkpt>
  </trkseg></trk>
</gpx>
"#;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rust_gpx_tracker_{}_{}.gpx", name, std::process::id()))
    }

    fn sample_fixes() -> Vec<LocationFix> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        (0..4)
            .map(|i| {
                LocationFix::new(
                    37.7749 + i as f64 * 0.0001,
                    -122.4194 - i as f64 * 0.00005,
                    10.0 + i as f64 * 1.5,
                    start + Duration::seconds(i),
                )
            })
            .collect()
    }

    fn assert_same_fixes(a: &[LocationFix], b: &[LocationFix]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x.latitude() - y.latitude()).abs() < 1e-6);
            assert!((x.longitude() - y.longitude()).abs() < 1e-6);
            assert!((x.altitude - y.altitude).abs() < 0.05);
            assert_eq!(x.timestamp, y.timestamp);
        }
    }

    #[test]
    fn test_parse_sample() {
        let fixes = parse(SAMPLE).unwrap();
        assert_eq!(fixes.len(), 2);
        assert!((fixes[0].latitude() - 37.7749).abs() < 1e-9);
        assert!((fixes[0].longitude() + 122.4194).abs() < 1e-9);
        assert_eq!(fixes[1].altitude, 12.5);
        assert_eq!(
            fixes[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(fixes[0].speed, None);
        assert_eq!(fixes[0].vertical_accuracy, None);
    }

    #[test]
    fn test_parse_without_points_is_empty() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
</gpx>"#;
        assert!(parse(xml).unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed_is_error() {
        assert!(matches!(parse("<gpx version=\"1.1\"><trk>"), Err(TrackError::Parse(_))));
        assert!(matches!(parse("not xml at all"), Err(TrackError::Parse(_))));
    }

    #[test]
    fn test_parse_point_without_lat_fails_document() {
        let xml = SAMPLE.replace(r#"lat="37.775900" "#, "");
        assert!(matches!(parse(&xml), Err(TrackError::Parse(_))));
    }

    #[test]
    fn test_parse_point_without_time_fails_document() {
        let xml = SAMPLE.replace("<time>2024-01-01T12:00:01Z</time>", "");
        assert!(matches!(parse(&xml), Err(TrackError::Parse(_))));
    }

    #[test]
    fn test_string_round_trip() {
        let fixes = sample_fixes();
        let xml = to_gpx_string(&fixes, "round & trip");
        assert!(xml.contains("creator=\"round &amp; trip\""));
        assert!(xml.contains("<time>2024-01-01T12:00:00Z</time>"));
        assert!(xml.contains("<trkpt lat=\"37.774900\" lon=\"-122.419400\"><ele>10.0</ele>"));
        assert_same_fixes(&parse(&xml).unwrap(), &fixes);
    }

    #[test]
    fn test_writer_round_trip_and_well_formed_after_each_append() {
        let path = temp_path("append");
        let writer = GpxTrackWriter::new(&path, "test");
        let fixes = sample_fixes();

        writer.start_new_track().unwrap();
        assert!(writer.has_track());

        for (i, fix) in fixes.iter().enumerate() {
            writer.append_point(fix).unwrap();
            // valid XML at rest after every write
            let on_disk = read_file(&path).unwrap();
            assert_eq!(on_disk.len(), i + 1);
        }

        writer.finalize_track().unwrap();
        writer.finalize_track().unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("</gpx>").count(), 1);
        assert_same_fixes(&writer.read_track().unwrap(), &fixes);

        writer.delete_track().unwrap();
        assert!(!writer.has_track());
    }

    #[test]
    fn test_read_open_track_without_points() {
        let path = temp_path("open");
        let writer = GpxTrackWriter::new(&path, "test");
        writer.start_new_track().unwrap();

        assert!(writer.read_track().unwrap().is_empty());
        writer.append_point(&sample_fixes()[0]).unwrap();
        assert_eq!(writer.read_track().unwrap().len(), 1);

        // restarting truncates
        writer.start_new_track().unwrap();
        assert!(writer.read_track().unwrap().is_empty());
        writer.delete_track().unwrap();
    }

    #[test]
    fn test_append_without_track_is_io_error() {
        let writer = GpxTrackWriter::new(temp_path("missing"), "test");
        assert!(matches!(
            writer.append_point(&sample_fixes()[0]),
            Err(TrackError::Io(_))
        ));
        assert!(writer.delete_track().is_err());
    }
}
