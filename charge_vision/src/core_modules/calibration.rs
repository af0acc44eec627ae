//! Loading of the calibrated border rectangle.
//!
//! The calibration tool writes `{"contours": [{"bounding_rect": [x, y, w, h]}]}`.
//! Only the first contour is used. A missing file, an empty contour list or a
//! malformed document is a fatal configuration error for the session.

use crate::core_modules::grid_geometry::BorderRect;
use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct BorderFile {
    contours: Vec<Contour>,
}

#[derive(Debug, Deserialize)]
struct Contour {
    bounding_rect: BorderRect,
}

/// Parses a border document already read into memory.
pub fn parse_border(contents: &str, path: &Path) -> Result<BorderRect, ConfigError> {
    let file: BorderFile = serde_json::from_str(contents).map_err(|e| ConfigError::MalformedBorderFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    file.contours
        .into_iter()
        .next()
        .map(|contour| contour.bounding_rect)
        .ok_or_else(|| ConfigError::NoContours {
            path: path.to_path_buf(),
        })
}

/// Reads the border rectangle from `contours[0].bounding_rect` of a calibration file.
pub fn load_border(path: &Path) -> Result<BorderRect, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::MissingBorderFile {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::MalformedBorderFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let border = parse_border(&contents, path)?;
    log::info!(
        "loaded border {}x{} at ({}, {}) from {}",
        border.w,
        border.h,
        border.x,
        border.y,
        path.display()
    );
    Ok(border)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn first_contour_wins() {
        let doc = r#"{"contours": [{"bounding_rect": [10, 20, 300, 200]}, {"bounding_rect": [0, 0, 1, 1]}]}"#;
        let border = parse_border(doc, Path::new("border.json")).expect("valid document");
        assert_eq!(border, BorderRect::new(10, 20, 300, 200));
    }

    #[test]
    fn empty_contours_is_an_error() {
        let err = parse_border(r#"{"contours": []}"#, Path::new("border.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NoContours { .. }));
    }

    #[test]
    fn missing_key_is_malformed() {
        let err = parse_border(r#"{"contours": [{"rect": [1,2,3,4]}]}"#, Path::new("border.json")).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedBorderFile { .. }));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_border(Path::new("/no/such/border.json")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingBorderFile { .. }));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"contours": [{{"bounding_rect": {{"x": 5, "y": 6, "w": 70, "h": 80}}}}]}}"#)
            .expect("write border");
        let border = load_border(file.path()).expect("valid border file");
        assert_eq!(border, BorderRect::new(5, 6, 70, 80));
    }
}
