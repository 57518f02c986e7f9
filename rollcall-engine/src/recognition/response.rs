//! Recognition response normalization
//!
//! The recognition service has shipped several response shapes over its
//! lifetime. Parsing is an ordered chain of strategies tried in priority
//! order:
//!
//! 1. inline identity list under `results` (original shape)
//! 2. identity list under `recognized` (newer service versions)
//! 3. a zip archive whose `results.json` entry holds one of the above
//!
//! New shapes get a new chain link; existing parsers are never touched.
//! If no strategy matches, the raw payload is preserved in the error for
//! operator diagnosis.

use rollcall_common::models::RecognizedFace;
use rollcall_common::{Error, Result};
use serde_json::Value;
use std::io::Read;

/// Cap on how much raw payload is carried in diagnostics
const MAX_DIAGNOSTIC_BYTES: usize = 4096;

/// Normalize a raw response body into recognized identities
pub fn parse_response(body: &[u8]) -> Result<Vec<RecognizedFace>> {
    if let Ok(json) = serde_json::from_slice::<Value>(body) {
        if let Some(faces) = try_inline_list(&json, "results") {
            return Ok(faces);
        }
        if let Some(faces) = try_inline_list(&json, "recognized") {
            return Ok(faces);
        }
    } else if let Some(faces) = try_zip_archive(body)? {
        return Ok(faces);
    }

    Err(Error::ResponseFormatUnrecognized {
        payload: diagnostic_payload(body),
    })
}

/// Shape (a)/(b): `{ "<key>": [ ... ] }`
fn try_inline_list(json: &Value, key: &str) -> Option<Vec<RecognizedFace>> {
    let items = json.get(key)?.as_array()?;
    Some(items.iter().filter_map(face_from_value).collect())
}

/// Shape (c): zip archive containing a `results.json` entry
fn try_zip_archive(body: &[u8]) -> Result<Option<Vec<RecognizedFace>>> {
    let cursor = std::io::Cursor::new(body);
    let mut archive = match zip::ZipArchive::new(cursor) {
        Ok(archive) => archive,
        Err(_) => return Ok(None),
    };

    let entry_name = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .find(|name| name.ends_with("results.json"));

    let Some(entry_name) = entry_name else {
        return Ok(None);
    };

    let mut contents = String::new();
    archive
        .by_name(&entry_name)
        .map_err(|e| Error::Internal(format!("zip entry read failed: {}", e)))?
        .read_to_string(&mut contents)?;

    let json: Value = match serde_json::from_str(&contents) {
        Ok(json) => json,
        Err(_) => return Ok(None),
    };

    Ok(try_inline_list(&json, "results").or_else(|| try_inline_list(&json, "recognized")))
}

/// One identity entry. Historical variants: a bare string, or an object
/// whose name-like field is `label`, `name`, or `student_name`; the
/// stable id rides under `reg_no` or `student_id` when present.
fn face_from_value(value: &Value) -> Option<RecognizedFace> {
    if let Some(raw) = value.as_str() {
        if raw.trim().is_empty() {
            return None;
        }
        return Some(RecognizedFace {
            reg_no: None,
            name: Some(raw.to_string()),
            confidence: 1.0,
            bbox: None,
        });
    }

    let obj = value.as_object()?;
    let name = ["label", "name", "student_name"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(|v| v.as_str()))
        .map(|s| s.to_string());
    let reg_no = ["reg_no", "student_id"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(|v| v.as_str()))
        .map(|s| s.to_string());

    if name.is_none() && reg_no.is_none() {
        return None;
    }

    let confidence = obj
        .get("confidence")
        .and_then(|v| v.as_f64())
        .unwrap_or(1.0);
    let bbox = obj.get("bbox").and_then(|v| {
        v.as_array()
            .map(|a| a.iter().filter_map(|n| n.as_f64()).collect())
    });

    Some(RecognizedFace {
        reg_no,
        name,
        confidence,
        bbox,
    })
}

fn diagnostic_payload(body: &[u8]) -> String {
    let truncated = &body[..body.len().min(MAX_DIAGNOSTIC_BYTES)];
    String::from_utf8_lossy(truncated).to_string()
}
