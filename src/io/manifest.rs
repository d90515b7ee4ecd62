use crate::types::{
    AcquisitionMode, Footprint, GeoPoint, OrbitDirection, Polarization, SarError, SarResult,
    SceneInfo,
};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

/// Fields of interest collected while walking the manifest
#[derive(Debug, Default)]
struct ManifestFields {
    coordinates: Option<String>,
    pass: Option<String>,
    start_time: Option<String>,
    mode: Option<String>,
    polarisations: Vec<String>,
}

/// Sentinel-1 SAFE `manifest.safe` reader
pub struct ManifestReader;

impl ManifestReader {
    /// Read `manifest.safe` from an unpacked SAFE directory (or the file itself)
    pub fn read_file<P: AsRef<Path>>(path: P) -> SarResult<SceneInfo> {
        let path = path.as_ref();
        let manifest_path = if path.is_dir() { path.join("manifest.safe") } else { path.to_path_buf() };
        log::debug!("Reading manifest: {}", manifest_path.display());

        let mut xml = String::new();
        File::open(&manifest_path)?.read_to_string(&mut xml)?;

        let safe_dir = manifest_path.parent().unwrap_or(path);
        Self::parse_str(&xml, &product_id_from_path(safe_dir))
    }

    /// Read the manifest of a zipped SAFE product
    pub fn read_zip<P: AsRef<Path>>(zip_path: P) -> SarResult<SceneInfo> {
        let zip_path = zip_path.as_ref();
        if !zip_path.exists() {
            return Err(SarError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", zip_path.display()),
            )));
        }

        let file = File::open(zip_path)?;
        let mut archive = ZipArchive::new(file)
            .map_err(|e| SarError::InvalidFormat(format!("Failed to open ZIP: {}", e)))?;

        let manifest_name = archive
            .file_names()
            .find(|name| name.ends_with("manifest.safe"))
            .map(str::to_string)
            .ok_or_else(|| SarError::InvalidFormat(format!("No manifest.safe in {}", zip_path.display())))?;

        let mut entry = archive.by_name(&manifest_name).map_err(|e| {
            SarError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to read {}: {}", manifest_name, e),
            ))
        })?;
        let mut xml = String::new();
        entry.read_to_string(&mut xml)?;

        Self::parse_str(&xml, &product_id_from_path(zip_path))
    }

    /// Parse manifest XML content
    pub fn parse_str(xml: &str, product_id: &str) -> SarResult<SceneInfo> {
        let fields = Self::collect_fields(xml)?;

        let coordinates = fields
            .coordinates
            .ok_or_else(|| SarError::InvalidFormat("Manifest has no footprint coordinates".to_string()))?;
        let footprint = Footprint::new(parse_gml_coordinates(&coordinates)?);

        let orbit = OrbitDirection::parse(
            fields
                .pass
                .as_deref()
                .ok_or_else(|| SarError::InvalidFormat("Manifest has no pass direction".to_string()))?,
        )?;
        let acquisition_time = parse_time(
            fields
                .start_time
                .as_deref()
                .ok_or_else(|| SarError::InvalidFormat("Manifest has no start time".to_string()))?,
        )?;
        let mode = AcquisitionMode::parse(
            fields
                .mode
                .as_deref()
                .ok_or_else(|| SarError::InvalidFormat("Manifest has no instrument mode".to_string()))?,
        )?;
        let polarizations = fields
            .polarisations
            .iter()
            .map(|p| Polarization::parse(p))
            .collect::<SarResult<Vec<_>>>()?;

        log::debug!(
            "Manifest {}: {} {} {:?} at {}",
            product_id,
            mode,
            orbit,
            polarizations,
            acquisition_time
        );

        Ok(SceneInfo {
            id: product_id.to_string(),
            acquisition_time,
            orbit,
            mode,
            polarizations,
            footprint,
        })
    }

    fn collect_fields(xml: &str) -> SarResult<ManifestFields> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut fields = ManifestFields::default();
        let mut current: Option<String> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    current = Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                }
                Ok(Event::Text(text)) => {
                    let value = text
                        .unescape()
                        .map_err(|e| SarError::XmlParsing(format!("Invalid text: {}", e)))?
                        .trim()
                        .to_string();
                    match current.as_deref() {
                        Some("coordinates") if fields.coordinates.is_none() => fields.coordinates = Some(value),
                        Some("pass") if fields.pass.is_none() => fields.pass = Some(value),
                        Some("startTime") if fields.start_time.is_none() => fields.start_time = Some(value),
                        Some("mode") if fields.mode.is_none() => fields.mode = Some(value),
                        Some("transmitterReceiverPolarisation") => fields.polarisations.push(value),
                        _ => {}
                    }
                }
                Ok(Event::End(_)) => current = None,
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(SarError::XmlParsing(format!(
                        "Error at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
                _ => {}
            }
        }
        Ok(fields)
    }
}

/// Product identifier from a `.SAFE` directory or `.zip` path
fn product_id_from_path(path: &Path) -> String {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    name.trim_end_matches(".zip").trim_end_matches(".SAFE").to_string()
}

/// "lat,lon lat,lon ..." pairs to (lon, lat) points
fn parse_gml_coordinates(text: &str) -> SarResult<Vec<GeoPoint>> {
    text.split_whitespace()
        .map(|pair| {
            let (lat, lon) = pair
                .split_once(',')
                .ok_or_else(|| SarError::InvalidFormat(format!("Invalid coordinate pair '{}'", pair)))?;
            let lat: f64 = lat
                .parse()
                .map_err(|_| SarError::InvalidFormat(format!("Invalid latitude '{}'", lat)))?;
            let lon: f64 = lon
                .parse()
                .map_err(|_| SarError::InvalidFormat(format!("Invalid longitude '{}'", lon)))?;
            Ok(GeoPoint::new(lon, lat))
        })
        .collect()
}

/// Manifest times are UTC without a zone suffix
fn parse_time(time_str: &str) -> SarResult<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(time_str) {
        return Ok(time.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(time_str, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| SarError::InvalidFormat(format!("Invalid time '{}': {}", time_str, e)))
}
