//! Named extension blobs carried by experiments.
//!
//! Packages may declare per-key structured data beyond the core metadata.
//! Known keys decode to typed records; unrecognized keys pass through as
//! raw JSON so nothing is lost on round trips.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Extension key for web-archive configurations.
pub const WEB_ARCHIVE_EXTENSION: &str = "web1";

/// A named extension blob as persisted: opaque JSON under a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extension {
    /// Extension key (e.g. `web1`).
    pub name: String,
    /// Opaque per-key structured data.
    pub data: Value,
}

impl Extension {
    /// Creates an extension record.
    #[must_use]
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Decodes this record into its typed form.
    #[must_use]
    pub fn decode(&self) -> ExtensionData {
        match self.name.as_str() {
            WEB_ARCHIVE_EXTENSION => {
                match serde_json::from_value::<WebArchiveExtension>(self.data.clone()) {
                    Ok(web_archive) => ExtensionData::WebArchive(web_archive),
                    // A web1 blob we cannot read is treated as unrecognized
                    // rather than an error: extensions are advisory.
                    Err(_) => ExtensionData::Unknown {
                        name: self.name.clone(),
                        data: self.data.clone(),
                    },
                }
            }
            _ => ExtensionData::Unknown {
                name: self.name.clone(),
                data: self.data.clone(),
            },
        }
    }
}

/// Typed view of an extension blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionData {
    /// A web-archive configuration (`web1`).
    WebArchive(WebArchiveExtension),
    /// Any extension key this build does not understand.
    Unknown {
        /// The extension key.
        name: String,
        /// The raw payload, untouched.
        data: Value,
    },
}

/// Web-archive extension payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebArchiveExtension {
    /// Content hash of the archive artifact.
    pub filehash: String,
    /// Capture configuration.
    #[serde(default)]
    pub config: WebArchiveConfig,
}

/// Web-archive capture configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebArchiveConfig {
    /// Captured hostnames and the ports they were served on.
    #[serde(default)]
    pub hosts: BTreeMap<String, WebArchiveHost>,
}

/// One captured host in a web archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebArchiveHost {
    /// Port the host was served on.
    pub port: u16,
}

impl WebArchiveExtension {
    /// Returns the ports to expose so the archived hosts are reachable.
    #[must_use]
    pub fn ports(&self) -> BTreeSet<u16> {
        self.config.hosts.values().map(|h| h.port).collect()
    }

    /// Returns the first captured hostname, if any.
    #[must_use]
    pub fn primary_hostname(&self) -> Option<&str> {
        self.config.hosts.keys().next().map(String::as_str)
    }

    /// Returns the blob-store key of the archive artifact.
    #[must_use]
    pub fn archive_key(&self) -> String {
        format!("{}.wacz", self.filehash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn web_archive_decodes_typed() {
        let extension = Extension::new(
            WEB_ARCHIVE_EXTENSION,
            json!({
                "filehash": "f00d",
                "config": {
                    "hosts": {
                        "app.example.org": {"port": 8080},
                        "api.example.org": {"port": 8081},
                    }
                }
            }),
        );

        let ExtensionData::WebArchive(web_archive) = extension.decode() else {
            panic!("expected a typed web archive");
        };
        assert_eq!(web_archive.filehash, "f00d");
        assert_eq!(web_archive.ports(), [8080, 8081].into_iter().collect());
        assert_eq!(web_archive.primary_hostname(), Some("api.example.org"));
        assert_eq!(web_archive.archive_key(), "f00d.wacz");
    }

    #[test]
    fn web_archive_without_hosts_has_no_ports() {
        let extension = Extension::new(WEB_ARCHIVE_EXTENSION, json!({"filehash": "f00d"}));
        let ExtensionData::WebArchive(web_archive) = extension.decode() else {
            panic!("expected a typed web archive");
        };
        assert!(web_archive.ports().is_empty());
        assert!(web_archive.primary_hostname().is_none());
    }

    #[test]
    fn unknown_keys_pass_through() {
        let payload = json!({"anything": ["goes", 1, null]});
        let extension = Extension::new("future-ext", payload.clone());

        let ExtensionData::Unknown { name, data } = extension.decode() else {
            panic!("expected passthrough");
        };
        assert_eq!(name, "future-ext");
        assert_eq!(data, payload);
    }

    #[test]
    fn malformed_web_archive_passes_through() {
        let payload = json!({"not_a_filehash": true});
        let extension = Extension::new(WEB_ARCHIVE_EXTENSION, payload.clone());
        assert!(matches!(
            extension.decode(),
            ExtensionData::Unknown { data, .. } if data == payload
        ));
    }
}
