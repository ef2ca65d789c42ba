//! JSON data model of the three manifest files inside an artifact.
//!
//! The `version` file gates the whole parse; `header-info` declares the
//! payload table; each `headers/<n>/meta-data` file attaches an arbitrary
//! JSON document to one payload.  Unknown fields are tolerated everywhere
//! so newer producers remain readable.

use serde::Deserialize;

/// Content of the top-level `version` file:
/// `{"format": "<literal>", "version": <integer>}`.
#[derive(Debug, Deserialize)]
pub(crate) struct VersionFile {
    pub format: String,
    pub version: u64,
}

/// Content of `header.tar/header-info`:
/// `{"payloads": [{"type": "<string>"}, ...]}`.  Array order defines the
/// payload indices used by `headers/<n>/...` and `data/<n>.tar` paths.
#[derive(Debug, Deserialize)]
pub(crate) struct HeaderInfo {
    pub payloads: Vec<PayloadEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PayloadEntry {
    #[serde(rename = "type")]
    pub payload_type: String,
}

/// One independently-installable unit inside the artifact.  Created when
/// header-info is parsed; `meta_data` is attached later if the artifact
/// carries a meta-data file for this index.
#[derive(Debug)]
pub struct Payload {
    /// Installer selector, e.g. `rootfs-image`.
    pub payload_type: String,
    /// Optional per-payload JSON document, forwarded verbatim.
    pub meta_data: Option<serde_json::Value>,
}

impl Payload {
    pub(crate) fn new(entry: PayloadEntry) -> Self {
        Payload {
            payload_type: entry.payload_type,
            meta_data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_info_preserves_order_and_ignores_extras() {
        let json = r#"{
            "payloads": [{"type": "rootfs-image"}, {"type": "bootloader"}],
            "artifact_depends": {"device_type": ["gw-01"]}
        }"#;
        let info: HeaderInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.payloads.len(), 2);
        assert_eq!(info.payloads[0].payload_type, "rootfs-image");
        assert_eq!(info.payloads[1].payload_type, "bootloader");
    }

    #[test]
    fn header_info_requires_type() {
        let result: Result<HeaderInfo, _> = serde_json::from_str(r#"{"payloads": [{}]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn version_file_shape() {
        let v: VersionFile = serde_json::from_str(r#"{"format": "artifact", "version": 3}"#).unwrap();
        assert_eq!(v.format, "artifact");
        assert_eq!(v.version, 3);
    }
}
