//! Managed disk and snapshot payloads (`Microsoft.Compute`)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const CREATE_OPTION_EMPTY: &str = "Empty";
pub const CREATE_OPTION_COPY: &str = "Copy";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zones: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<DiskSku>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, String>>,
    #[serde(default)]
    pub properties: DiskProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskSku {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskProperties {
    #[serde(default)]
    pub creation_data: CreationData,
    #[serde(rename = "diskSizeGB", skip_serializing_if = "Option::is_none")]
    pub disk_size_gb: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationData {
    pub create_option: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_resource_id: Option<String>,
}

impl CreationData {
    pub fn empty() -> Self {
        Self {
            create_option: CREATE_OPTION_EMPTY.to_string(),
            source_resource_id: None,
        }
    }

    pub fn copy_from(source: impl Into<String>) -> Self {
        Self {
            create_option: CREATE_OPTION_COPY.to_string(),
            source_resource_id: Some(source.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, String>>,
    #[serde(default)]
    pub properties: SnapshotProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotProperties {
    #[serde(default)]
    pub creation_data: CreationData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incremental: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_from_snapshot_body() {
        let disk = Disk {
            location: Some("eastus".to_string()),
            sku: Some(DiskSku {
                name: "Premium_LRS".to_string(),
            }),
            properties: DiskProperties {
                creation_data: CreationData::copy_from("/snapshots/snap-1"),
                disk_size_gb: Some(64),
                provisioning_state: None,
            },
            ..Default::default()
        };

        let body = serde_json::to_value(&disk).unwrap();
        assert_eq!(body["properties"]["diskSizeGB"], 64);
        assert_eq!(body["properties"]["creationData"]["createOption"], "Copy");
        assert_eq!(
            body["properties"]["creationData"]["sourceResourceId"],
            "/snapshots/snap-1"
        );
        assert!(body.get("zones").is_none());
    }
}
