//! Decoding of a neighbour's reply to an announcement.
//!
//! A reply is a JSON object. The `success` key says whether the neighbour
//! accepted the announcement; every other key whose value is itself an object
//! describes a region the neighbour is disclosing. Anything else is metadata.
//!
//! ```json
//! {
//!   "success": true,
//!   "region0": { "region_id": "...", "external_host_name": "sim2", "http_port": "9000" },
//!   "version": "2"
//! }
//! ```

use serde_json::{Map, Value};

use crate::region::{DescriptorError, RegionDescriptor};

/// Key carrying the accept/reject indicator.
pub const SUCCESS_KEY: &str = "success";

/// Errors decoding the reply as a whole.
#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("reply is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("reply is not a key/value map")]
    NotAMap,
}

/// One decoded value of the reply map.
#[derive(Debug, Clone)]
pub enum ReplyEntry {
    Region(RegionDescriptor),
    /// A nested map that did not describe a region.
    Malformed(DescriptorError),
    Metadata,
}

/// A decoded reply, entries in the order the neighbour sent them.
#[derive(Debug, Clone)]
pub struct NeighbourReply {
    pub success: bool,
    pub entries: Vec<(String, ReplyEntry)>,
}

impl NeighbourReply {
    /// Disclosed regions in key order.
    pub fn disclosed(&self) -> impl Iterator<Item = &RegionDescriptor> {
        self.entries.iter().filter_map(|(_, entry)| match entry {
            ReplyEntry::Region(region) => Some(region),
            _ => None,
        })
    }

    /// Regions up to the first malformed entry, and that entry's error if any.
    pub fn disclosed_until_malformed(
        &self,
    ) -> (Vec<RegionDescriptor>, Option<(String, DescriptorError)>) {
        let mut regions = Vec::new();
        for (key, entry) in &self.entries {
            match entry {
                ReplyEntry::Region(region) => regions.push(region.clone()),
                ReplyEntry::Malformed(err) => return (regions, Some((key.clone(), err.clone()))),
                ReplyEntry::Metadata => {}
            }
        }
        (regions, None)
    }
}

/// Decode reply text.
pub fn decode_reply(body: &str) -> Result<NeighbourReply, ReplyError> {
    let value: Value = serde_json::from_str(body)?;
    let Value::Object(map) = value else {
        return Err(ReplyError::NotAMap);
    };

    let success = map.get(SUCCESS_KEY).map(is_truthy).unwrap_or(false);
    let entries = map
        .iter()
        .filter(|(key, _)| key.as_str() != SUCCESS_KEY)
        .map(|(key, value)| (key.clone(), decode_entry(value)))
        .collect();

    Ok(NeighbourReply { success, entries })
}

fn decode_entry(value: &Value) -> ReplyEntry {
    match value {
        Value::Object(nested) => match region_from_map(nested) {
            Ok(region) => ReplyEntry::Region(region),
            Err(e) => ReplyEntry::Malformed(e),
        },
        _ => ReplyEntry::Metadata,
    }
}

fn region_from_map(map: &Map<String, Value>) -> Result<RegionDescriptor, DescriptorError> {
    RegionDescriptor::from_fields(map.iter().map(|(k, v)| (k.as_str(), scalar_text(v))))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Boolean reading of a loosely typed value.
///
/// Strings are true unless empty, `"0"` or `"false"` in any case.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false")),
        _ => false,
    }
}
