//! Drive API types
//!
//! Request and response bodies for the subset of the Drive v3 files API the
//! store uses.

use serde::{Deserialize, Deserializer, Serialize};

/// Deserialize a Drive int64 field.
///
/// Drive encodes `size` as a decimal string ("5242880"), leaves it out for
/// folders and Google-native documents, and test fixtures often use plain
/// numbers. Missing and null both read as 0.
fn deserialize_byte_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de;

    struct ByteCountVisitor;

    impl<'de> de::Visitor<'de> for ByteCountVisitor {
        type Value = u64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a byte count as a decimal string or number")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
            u64::try_from(value).map_err(|_| de::Error::custom("negative byte count"))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
            value.parse::<u64>().map_err(de::Error::custom)
        }

        fn visit_none<E: de::Error>(self) -> Result<u64, E> {
            Ok(0)
        }

        fn visit_unit<E: de::Error>(self) -> Result<u64, E> {
            Ok(0)
        }
    }

    deserializer.deserialize_any(ByteCountVisitor)
}

/// Response from files.generateIds
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedIds {
    pub ids: Vec<String>,
    #[serde(default)]
    pub space: Option<String>,
}

/// A Drive file resource (only the requested fields are present)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Size in bytes (absent for folders)
    #[serde(default, deserialize_with = "deserialize_byte_count")]
    pub size: u64,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Metadata part of a multipart upload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub mime_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parents: Option<Vec<&'a str>>,
}

/// Error envelope returned by Google APIs
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

impl ErrorEnvelope {
    /// Best-effort human readable message from an error body
    pub fn message_from(body: &str) -> String {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
            _ => body.to_string(),
        }
    }
}
