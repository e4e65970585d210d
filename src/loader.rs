//! Point loader (§4.B): parses CSV/TSV/zstd-compressed AIS records into
//! typed points, normalizing column names and validating ranges.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use tracing::warn;

use crate::error::LoadError;
use crate::model::AisPoint;

const REQUIRED_COLUMNS: [&str; 4] = ["mmsi", "timestamp", "lat", "lon"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BaseFormat {
    Csv,
    Dat,
}

/// Strips a trailing `.zst` and reports whether it was present, alongside
/// the base format inferred from what remains.
fn detect_format(path: &Path) -> (BaseFormat, bool) {
    let is_zst = path.extension().and_then(|e| e.to_str()) == Some("zst");
    let base_ext = if is_zst {
        path.file_stem().map(Path::new).and_then(|p| p.extension()).and_then(|e| e.to_str())
    } else {
        path.extension().and_then(|e| e.to_str())
    };
    let fmt = match base_ext {
        Some("dat") => BaseFormat::Dat,
        _ => BaseFormat::Csv,
    };
    (fmt, is_zst)
}

fn read_raw(path: &Path) -> Result<String, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.display().to_string()));
    }
    let bytes = std::fs::read(path)?;
    let (_, is_zst) = detect_format(path);
    let decoded = if is_zst {
        zstd::stream::decode_all(&bytes[..]).map_err(|e| LoadError::Decompress(e.to_string()))?
    } else {
        bytes
    };
    String::from_utf8(decoded).map_err(|e| LoadError::Decompress(e.to_string()))
}

/// Splits `content` into header + rows using `delimiter`; returns `None`
/// if the header doesn't actually separate into more than one field (a
/// signal that this delimiter is wrong for this content).
fn try_split(content: &str, delimiter: u8) -> Option<(Vec<String>, Vec<Vec<String>>)> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(content.as_bytes());
    let headers: Vec<String> = reader.headers().ok()?.iter().map(str::to_string).collect();
    if headers.len() <= 1 {
        return None;
    }
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.ok()?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Some((headers, rows))
}

fn split_whitespace_delimited(content: &str) -> Option<(Vec<String>, Vec<Vec<String>>)> {
    let mut lines = content.lines();
    let header: Vec<String> = lines.next()?.split_whitespace().map(str::to_string).collect();
    if header.len() <= 1 {
        return None;
    }
    let rows = lines
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.split_whitespace().map(str::to_string).collect())
        .collect();
    Some((header, rows))
}

/// `.dat` delimiter inference: try tab, then comma, then whitespace-run.
fn parse_dat(content: &str) -> (Vec<String>, Vec<Vec<String>>) {
    try_split(content, b'\t')
        .or_else(|| try_split(content, b','))
        .or_else(|| split_whitespace_delimited(content))
        .unwrap_or_else(|| (Vec::new(), Vec::new()))
}

fn parse_csv(content: &str) -> (Vec<String>, Vec<Vec<String>>) {
    try_split(content, b',').unwrap_or_else(|| (Vec::new(), Vec::new()))
}

/// Normalizes header names (case-folded, whitespace-trimmed) and maps
/// known synonyms onto the canonical `lat`/`lon`/`timestamp` names.
fn normalize_columns(headers: &[String]) -> Vec<String> {
    let folded: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    let has_lat = folded.iter().any(|h| h == "lat");
    let has_lon = folded.iter().any(|h| h == "lon");
    let has_timestamp = folded.iter().any(|h| h == "timestamp");

    let lat_synonyms = ["latitude", "y"];
    let lon_synonyms = ["longitude", "lng", "long", "x"];
    let ts_synonyms = ["base_date_time", "datetime", "date_time", "time", "date"];

    let map_one = |col: &str, canonical: &str, synonyms: &[&str]| -> Option<String> {
        let already_present = match canonical {
            "lat" => has_lat,
            "lon" => has_lon,
            "timestamp" => has_timestamp,
            _ => false,
        };
        if already_present {
            return None;
        }
        for syn in synonyms {
            if col == *syn {
                return Some(canonical.to_string());
            }
        }
        None
    };

    folded
        .into_iter()
        .map(|col| {
            map_one(&col, "lat", &lat_synonyms)
                .or_else(|| map_one(&col, "lon", &lon_synonyms))
                .or_else(|| map_one(&col, "timestamp", &ts_synonyms))
                .unwrap_or(col)
        })
        .collect()
}

fn missing_required(columns: &[String]) -> Vec<String> {
    REQUIRED_COLUMNS
        .iter()
        .filter(|req| !columns.iter().any(|c| c == *req))
        .map(|s| s.to_string())
        .collect()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(epoch) = raw.parse::<f64>() {
        let secs = epoch.trunc() as i64;
        let nanos = ((epoch.fract()) * 1e9) as u32;
        return Utc.timestamp_opt(secs, nanos).single();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_f64(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok()
}

/// Parses one row into an `AisPoint`, dropping rows that fail required-field
/// validation. Optional fields out of range (or the 511 "not available"
/// heading sentinel) are normalized to `None` rather than dropping the row.
fn parse_row(row: &HashMap<&str, &str>) -> Option<AisPoint> {
    let mmsi = row.get("mmsi")?.trim();
    if mmsi.is_empty() {
        return None;
    }
    let timestamp = parse_timestamp(row.get("timestamp")?)?;
    let lat = parse_f64(row.get("lat")?)?;
    let lon = parse_f64(row.get("lon")?)?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }

    let sog = row
        .get("sog")
        .and_then(|v| parse_f64(v))
        .filter(|v| *v >= 0.0);
    let cog = row
        .get("cog")
        .and_then(|v| parse_f64(v))
        .filter(|v| (0.0..=360.0).contains(v));
    let heading = row
        .get("heading")
        .and_then(|v| parse_f64(v))
        .filter(|v| (0.0..=360.0).contains(v) && *v != 511.0);

    Some(AisPoint {
        mmsi: mmsi.to_string(),
        timestamp,
        lat,
        lon,
        sog,
        cog,
        heading,
    })
}

fn rows_to_points(headers: &[String], rows: &[Vec<String>]) -> (Vec<AisPoint>, usize) {
    let mut points = Vec::new();
    let mut errors = 0usize;
    for row in rows {
        let mut map: HashMap<&str, &str> = HashMap::new();
        for (h, v) in headers.iter().zip(row.iter()) {
            map.insert(h.as_str(), v.as_str());
        }
        match parse_row(&map) {
            Some(p) => points.push(p),
            None => errors += 1,
        }
    }
    (points, errors)
}

fn read_and_parse(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), LoadError> {
    let content = read_raw(path)?;
    let (fmt, _) = detect_format(path);
    let (raw_headers, rows) = match fmt {
        BaseFormat::Dat => parse_dat(&content),
        BaseFormat::Csv => parse_csv(&content),
    };
    let headers = normalize_columns(&raw_headers);
    let missing = missing_required(&headers);
    if !missing.is_empty() {
        return Err(LoadError::MissingColumns(missing));
    }
    Ok((headers, rows))
}

/// Materializing load: parses the whole file, globally sorts by timestamp.
/// Fatal (`LoadError::Empty`) if no row parses successfully.
pub fn load_points(path: &Path) -> Result<Vec<AisPoint>, LoadError> {
    let (headers, rows) = read_and_parse(path)?;
    let (mut points, errors) = rows_to_points(&headers, &rows);
    if errors > 0 {
        warn!(errors, total = rows.len(), "skipped invalid rows while loading");
    }
    if points.is_empty() {
        return Err(LoadError::Empty);
    }
    points.sort_by_key(|p| p.timestamp);
    Ok(points)
}

/// Streaming load: yields batches of up to `chunk_size` valid points, each
/// batch sorted only within itself — no global sort across chunks.
pub fn load_points_streaming(path: &Path, chunk_size: usize) -> Result<Vec<Vec<AisPoint>>, LoadError> {
    let (headers, rows) = read_and_parse(path)?;
    let mut batches = Vec::new();
    for chunk in rows.chunks(chunk_size.max(1)) {
        let (mut points, errors) = rows_to_points(&headers, chunk);
        if errors > 0 {
            warn!(errors, chunk_len = chunk.len(), "skipped invalid rows in streaming chunk");
        }
        if !points.is_empty() {
            points.sort_by_key(|p| p.timestamp);
            batches.push(points);
        }
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> tempfile::TempPath {
        let mut f = tempfile::Builder::new().suffix(name).tempfile().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.into_temp_path()
    }

    #[test]
    fn loads_basic_csv_with_header() {
        let path = write_temp(
            ".csv",
            "mmsi,timestamp,lat,lon,sog,cog,heading\n\
             123456789,0,40.0,-74.0,10.0,90.0,90.0\n\
             123456789,60,40.001,-74.0,10.0,90.0,90.0\n",
        );
        let points = load_points(&path).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].mmsi, "123456789");
    }

    #[test]
    fn normalizes_latitude_longitude_column_names() {
        let path = write_temp(
            ".csv",
            "mmsi,timestamp,latitude,longitude\n\
             1,0,40.0,-74.0\n",
        );
        let points = load_points(&path).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].lat, 40.0);
    }

    #[test]
    fn missing_required_columns_is_fatal() {
        let path = write_temp(".csv", "foo,bar\n1,2\n");
        assert!(matches!(load_points(&path), Err(LoadError::MissingColumns(_))));
    }

    #[test]
    fn out_of_range_lat_drops_row_not_whole_file() {
        let path = write_temp(
            ".csv",
            "mmsi,timestamp,lat,lon\n\
             1,0,999.0,-74.0\n\
             1,60,40.0,-74.0\n",
        );
        let points = load_points(&path).unwrap();
        assert_eq!(points.len(), 1);
    }

    #[test]
    fn heading_sentinel_511_normalized_to_absent() {
        let path = write_temp(
            ".csv",
            "mmsi,timestamp,lat,lon,heading\n1,0,40.0,-74.0,511\n",
        );
        let points = load_points(&path).unwrap();
        assert_eq!(points[0].heading, None);
    }

    #[test]
    fn empty_result_is_fatal() {
        let path = write_temp(".csv", "mmsi,timestamp,lat,lon\n");
        assert!(matches!(load_points(&path), Err(LoadError::Empty)));
    }

    #[test]
    fn streaming_sorts_within_chunk_only() {
        let path = write_temp(
            ".csv",
            "mmsi,timestamp,lat,lon\n\
             1,60,40.0,-74.0\n\
             1,0,40.0,-74.0\n\
             1,120,40.0,-74.0\n",
        );
        let batches = load_points_streaming(&path, 2).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        // within the first chunk [60, 0] gets sorted to [0, 60]
        assert!(batches[0][0].timestamp <= batches[0][1].timestamp);
    }

    #[test]
    fn dat_file_falls_back_through_delimiters() {
        let path = write_temp(".dat", "mmsi,timestamp,lat,lon\n1,0,40.0,-74.0\n");
        let points = load_points(&path).unwrap();
        assert_eq!(points.len(), 1);
    }

    #[test]
    fn missing_file_is_not_found_error() {
        let path = Path::new("/nonexistent/path/to/file.csv");
        assert!(matches!(load_points(path), Err(LoadError::NotFound(_))));
    }
}
