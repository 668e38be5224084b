//! Region identity and the announce-able attributes of a region.
//!
//! A [`RegionDescriptor`] is what one region knows about another: where it
//! lives on the network and where it sits in the world. Two descriptors name
//! the same neighbour when their [`RegionId`]s match, whatever the rest says.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::Deserialize;
use uuid::Uuid;

/// Field names used when packing a descriptor for the wire.
pub mod fields {
    pub const REGION_ID: &str = "region_id";
    pub const REGION_NAME: &str = "region_name";
    pub const EXTERNAL_HOST: &str = "external_host_name";
    pub const HTTP_PORT: &str = "http_port";
    pub const SERVER_URI: &str = "server_uri";
    pub const LOC_X: &str = "region_xloc";
    pub const LOC_Y: &str = "region_yloc";
    pub const SIZE_X: &str = "region_size_x";
    pub const SIZE_Y: &str = "region_size_y";

    pub const RESERVED: &[&str] = &[
        REGION_ID,
        REGION_NAME,
        EXTERNAL_HOST,
        HTTP_PORT,
        SERVER_URI,
        LOC_X,
        LOC_Y,
        SIZE_X,
        SIZE_Y,
    ];
}

/// Default region edge length in metres.
pub const DEFAULT_REGION_SIZE: u32 = 256;

/// Errors raised while packing or unpacking a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("region id is nil")]
    NilId,

    #[error("region {0} has no external host")]
    MissingHost(RegionId),

    #[error("region {0} has no http port")]
    MissingPort(RegionId),

    #[error("metadata key '{0}' collides with a reserved field")]
    ReservedKey(String),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("invalid value for '{field}': {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Opaque 128-bit region identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct RegionId(Uuid);

impl RegionId {
    /// A fresh random identity.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl From<Uuid> for RegionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RegionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// One region as seen by others.
///
/// Equality and hashing look at `id` only, so repeated sightings of a region
/// with different transient fields collapse to one entry in a set.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionDescriptor {
    pub id: RegionId,
    #[serde(default)]
    pub name: String,
    pub external_host: String,
    pub http_port: u16,
    #[serde(default)]
    pub server_uri: String,
    #[serde(default)]
    pub location_x: u32,
    #[serde(default)]
    pub location_y: u32,
    #[serde(default = "default_size")]
    pub size_x: u32,
    #[serde(default = "default_size")]
    pub size_y: u32,
    /// Additional announce-able metadata, packed after the fixed fields.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

fn default_size() -> u32 {
    DEFAULT_REGION_SIZE
}

impl RegionDescriptor {
    pub fn new(id: RegionId, external_host: impl Into<String>, http_port: u16) -> Self {
        Self {
            id,
            name: String::new(),
            external_host: external_host.into(),
            http_port,
            server_uri: String::new(),
            location_x: 0,
            location_y: 0,
            size_x: DEFAULT_REGION_SIZE,
            size_y: DEFAULT_REGION_SIZE,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_location(mut self, x: u32, y: u32) -> Self {
        self.location_x = x;
        self.location_y = y;
        self
    }

    pub fn with_server_uri(mut self, uri: impl Into<String>) -> Self {
        self.server_uri = uri.into();
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Endpoint a neighbour exposes for announcements from `caller`.
    pub fn announce_uri(&self, caller: &RegionId) -> String {
        format!(
            "http://{}:{}/region/{}/",
            self.external_host, self.http_port, caller
        )
    }

    /// Pack the announce-able attributes into ordered form fields.
    pub fn pack(&self) -> Result<Vec<(String, String)>, DescriptorError> {
        if self.id.is_nil() {
            return Err(DescriptorError::NilId);
        }
        if self.external_host.trim().is_empty() {
            return Err(DescriptorError::MissingHost(self.id));
        }
        if self.http_port == 0 {
            return Err(DescriptorError::MissingPort(self.id));
        }
        if let Some(key) = self
            .extra
            .keys()
            .find(|k| fields::RESERVED.contains(&k.as_str()))
        {
            return Err(DescriptorError::ReservedKey(key.clone()));
        }

        let mut packed = vec![
            (fields::REGION_ID.to_string(), self.id.to_string()),
            (fields::REGION_NAME.to_string(), self.name.clone()),
            (fields::EXTERNAL_HOST.to_string(), self.external_host.clone()),
            (fields::HTTP_PORT.to_string(), self.http_port.to_string()),
            (fields::SERVER_URI.to_string(), self.server_uri.clone()),
            (fields::LOC_X.to_string(), self.location_x.to_string()),
            (fields::LOC_Y.to_string(), self.location_y.to_string()),
            (fields::SIZE_X.to_string(), self.size_x.to_string()),
            (fields::SIZE_Y.to_string(), self.size_y.to_string()),
        ];
        packed.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(packed)
    }

    /// Build a descriptor from string fields, as disclosed by a neighbour.
    ///
    /// Only `region_id` is required. Unknown keys are kept as metadata.
    pub fn from_fields<'a, I>(entries: I) -> Result<Self, DescriptorError>
    where
        I: IntoIterator<Item = (&'a str, String)>,
    {
        let mut id = None;
        let mut descriptor = Self::new(RegionId::nil(), String::new(), 0);

        for (key, value) in entries {
            match key {
                fields::REGION_ID => {
                    id = Some(value.parse::<RegionId>().map_err(|_| {
                        DescriptorError::InvalidField {
                            field: fields::REGION_ID,
                            value,
                        }
                    })?);
                }
                fields::REGION_NAME => descriptor.name = value,
                fields::EXTERNAL_HOST => descriptor.external_host = value,
                fields::SERVER_URI => descriptor.server_uri = value,
                fields::HTTP_PORT => descriptor.http_port = parse_field(fields::HTTP_PORT, value)?,
                fields::LOC_X => descriptor.location_x = parse_field(fields::LOC_X, value)?,
                fields::LOC_Y => descriptor.location_y = parse_field(fields::LOC_Y, value)?,
                fields::SIZE_X => descriptor.size_x = parse_field(fields::SIZE_X, value)?,
                fields::SIZE_Y => descriptor.size_y = parse_field(fields::SIZE_Y, value)?,
                other => {
                    descriptor.extra.insert(other.to_string(), value);
                }
            }
        }

        descriptor.id = id.ok_or(DescriptorError::MissingField(fields::REGION_ID))?;
        if descriptor.id.is_nil() {
            return Err(DescriptorError::NilId);
        }
        Ok(descriptor)
    }
}

fn parse_field<T: FromStr>(field: &'static str, value: String) -> Result<T, DescriptorError> {
    value
        .trim()
        .parse()
        .map_err(|_| DescriptorError::InvalidField { field, value })
}

impl PartialEq for RegionDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RegionDescriptor {}

impl Hash for RegionDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for RegionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{} ({})", self.name, self.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sample() -> RegionDescriptor {
        RegionDescriptor::new(RegionId::random(), "sim1.example.org", 9000)
            .with_name("Ahern")
            .with_location(256_000, 256_256)
    }

    #[test]
    fn test_equality_ignores_transient_fields() {
        let a = sample();
        let mut b = a.clone();
        b.external_host = "moved.example.org".to_string();
        b.http_port = 9100;
        b.name = "Renamed".to_string();

        assert_eq!(a, b);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_announce_uri_embeds_caller_identity() {
        let neighbour = sample();
        let caller: RegionId = "11111111-2222-3333-4444-555555555555".parse().unwrap();

        assert_eq!(
            neighbour.announce_uri(&caller),
            "http://sim1.example.org:9000/region/11111111-2222-3333-4444-555555555555/"
        );
    }

    #[test]
    fn test_pack_emits_fixed_fields_then_extra() {
        let region = sample().with_extra("estate_id", "101");
        let packed = region.pack().unwrap();

        assert_eq!(packed[0], ("region_id".to_string(), region.id.to_string()));
        assert_eq!(packed.len(), fields::RESERVED.len() + 1);
        assert_eq!(
            packed.last().unwrap(),
            &("estate_id".to_string(), "101".to_string())
        );
    }

    #[test]
    fn test_pack_rejects_unannounceable_regions() {
        let nil = RegionDescriptor::new(RegionId::nil(), "host", 9000);
        assert_eq!(nil.pack(), Err(DescriptorError::NilId));

        let no_host = RegionDescriptor::new(RegionId::random(), " ", 9000);
        assert!(matches!(
            no_host.pack(),
            Err(DescriptorError::MissingHost(_))
        ));

        let no_port = RegionDescriptor::new(RegionId::random(), "host", 0);
        assert!(matches!(
            no_port.pack(),
            Err(DescriptorError::MissingPort(_))
        ));

        let clash = sample().with_extra(fields::HTTP_PORT, "1");
        assert_eq!(
            clash.pack(),
            Err(DescriptorError::ReservedKey("http_port".to_string()))
        );
    }

    #[test]
    fn test_from_fields_reads_packed_form() {
        let region = sample().with_server_uri("http://sim1.example.org:9000/");
        let packed = region.pack().unwrap();

        let decoded =
            RegionDescriptor::from_fields(packed.iter().map(|(k, v)| (k.as_str(), v.clone())))
                .unwrap();

        assert_eq!(decoded.id, region.id);
        assert_eq!(decoded.external_host, "sim1.example.org");
        assert_eq!(decoded.http_port, 9000);
        assert_eq!(decoded.location_y, 256_256);
        assert!(decoded.extra.is_empty());
    }

    #[test]
    fn test_from_fields_defaults_and_metadata() {
        let id = RegionId::random();
        let decoded = RegionDescriptor::from_fields([
            ("region_id", id.to_string()),
            ("flags", "4".to_string()),
        ])
        .unwrap();

        assert_eq!(decoded.id, id);
        assert_eq!(decoded.size_x, DEFAULT_REGION_SIZE);
        assert_eq!(decoded.extra.get("flags").map(String::as_str), Some("4"));
    }

    #[test]
    fn test_from_fields_errors() {
        let missing = RegionDescriptor::from_fields([("region_name", "x".to_string())]);
        assert_eq!(missing, Err(DescriptorError::MissingField("region_id")));

        let bad_id = RegionDescriptor::from_fields([("region_id", "not-a-uuid".to_string())]);
        assert!(matches!(
            bad_id,
            Err(DescriptorError::InvalidField {
                field: "region_id",
                ..
            })
        ));

        let bad_port = RegionDescriptor::from_fields([
            ("region_id", RegionId::random().to_string()),
            ("http_port", "ninety".to_string()),
        ]);
        assert!(matches!(
            bad_port,
            Err(DescriptorError::InvalidField {
                field: "http_port",
                ..
            })
        ));
    }
}
