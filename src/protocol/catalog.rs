//! Service catalog reported by the appliance.
//!
//! Every resource group (`ei`, `ci`, `iz`, `ro`, ...) is versioned on its own.
//! The `/ci/services` response tells the client which version to stamp on
//! requests for each group.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{HomeConnectError, Result};

/// One `/ci/services` payload element
#[derive(Debug, Deserialize)]
struct ServiceEntry {
    service: String,
    version: u8,
}

/// Service name to version mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceCatalog {
    services: BTreeMap<String, u8>,
}

impl ServiceCatalog {
    /// Decode the payload of a `/ci/services` response.
    ///
    /// Fails if the payload is missing or any element lacks a string
    /// `service` or a `version` in 0-255.
    pub fn from_data(data: Option<&[Value]>) -> Result<Self> {
        let data = data.ok_or_else(|| {
            HomeConnectError::Decode("/ci/services response carries no data".to_string())
        })?;

        let mut services = BTreeMap::new();
        for element in data {
            let entry = ServiceEntry::deserialize(element).map_err(|e| {
                HomeConnectError::Decode(format!("Invalid service entry {element}: {e}"))
            })?;
            services.insert(entry.service, entry.version);
        }

        Ok(Self { services })
    }

    /// Version of a service group.
    ///
    /// A missing group is a decode failure: sending with a guessed version
    /// would address the wrong protocol revision.
    pub fn version(&self, service: &str) -> Result<u8> {
        self.services.get(service).copied().ok_or_else(|| {
            HomeConnectError::Decode(format!("Service '{service}' missing from catalog"))
        })
    }

    /// Version of the group a resource path belongs to (`/ro/values` → `ro`).
    pub fn version_for(&self, resource: &str) -> Result<u8> {
        let service = resource
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default();
        self.version(service)
    }

    /// Number of services
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Check if the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Iterate over `(service, version)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u8)> {
        self.services.iter().map(|(name, version)| (name.as_str(), *version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Vec<Value> {
        vec![
            json!({"service": "ei", "version": 2}),
            json!({"service": "iz", "version": 1}),
            json!({"service": "ci", "version": 3, "available": true}),
        ]
    }

    #[test]
    fn test_decode_catalog() {
        let catalog = ServiceCatalog::from_data(Some(&sample()[..])).unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.version("ei").unwrap(), 2);
        assert_eq!(catalog.version("ci").unwrap(), 3);
        assert_eq!(catalog.version_for("/iz/info").unwrap(), 1);
    }

    #[test]
    fn test_missing_service_is_decode_error() {
        let catalog = ServiceCatalog::from_data(Some(&sample()[..])).unwrap();
        let err = catalog.version("ro").unwrap_err();
        assert!(matches!(err, HomeConnectError::Decode(ref m) if m.contains("'ro'")));
    }

    #[test]
    fn test_missing_data() {
        assert!(matches!(
            ServiceCatalog::from_data(None),
            Err(HomeConnectError::Decode(_))
        ));
    }

    #[test]
    fn test_malformed_entries() {
        let bad_version = vec![json!({"service": "ei", "version": 256})];
        assert!(ServiceCatalog::from_data(Some(&bad_version[..])).is_err());

        let no_name = vec![json!({"version": 1})];
        assert!(ServiceCatalog::from_data(Some(&no_name[..])).is_err());

        let not_object = vec![json!("ei")];
        assert!(ServiceCatalog::from_data(Some(&not_object[..])).is_err());
    }

    #[test]
    fn test_empty_payload_gives_empty_catalog() {
        let catalog = ServiceCatalog::from_data(Some(&[] as &[Value])).unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.version("ei").is_err());
    }
}
