use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// Generic handle wrapping exactly one concrete infrastructure resource.
///
/// The sub-resource is a tagged union, so an element with no resource (or a
/// resource of an unknown kind) is unrepresentable; payloads naming a kind
/// outside the closed set fail at deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    pub id: Uuid,
    pub environment_id: Uuid,
    pub name: String,
    pub resource: ElementResource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Element {
    /// The identifier pair scope resolution works on.
    pub fn scope_ref(&self) -> ElementRef {
        ElementRef {
            id: self.id,
            environment_id: self.environment_id,
        }
    }
}

/// Lightweight element view consumed by the permission evaluator: the element
/// id plus its parent environment id, looked up ahead of time instead of
/// navigating a live object graph during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRef {
    pub id: Uuid,
    pub environment_id: Uuid,
}

/// The closed set of concrete resources an element can wrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementResource {
    Network(NetworkResource),
    Vm(VmResource),
    StoragePool(StoragePoolResource),
    Volume(VolumeResource),
    Domain(DomainResource),
    ContainerNode(ContainerNodeResource),
    ContainerCluster(ContainerClusterResource),
    Stack(StackResource),
    Application(ApplicationResource),
}

impl ElementResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ElementResource::Network(_) => ResourceKind::Network,
            ElementResource::Vm(_) => ResourceKind::Vm,
            ElementResource::StoragePool(_) => ResourceKind::StoragePool,
            ElementResource::Volume(_) => ResourceKind::Volume,
            ElementResource::Domain(_) => ResourceKind::Domain,
            ElementResource::ContainerNode(_) => ResourceKind::ContainerNode,
            ElementResource::ContainerCluster(_) => ResourceKind::ContainerCluster,
            ElementResource::Stack(_) => ResourceKind::Stack,
            ElementResource::Application(_) => ResourceKind::Application,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Network,
    Vm,
    StoragePool,
    Volume,
    Domain,
    ContainerNode,
    ContainerCluster,
    Stack,
    Application,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::Vm => "vm",
            ResourceKind::StoragePool => "storage_pool",
            ResourceKind::Volume => "volume",
            ResourceKind::Domain => "domain",
            ResourceKind::ContainerNode => "container_node",
            ResourceKind::ContainerCluster => "container_cluster",
            ResourceKind::Stack => "stack",
            ResourceKind::Application => "application",
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "network" => Ok(ResourceKind::Network),
            "vm" => Ok(ResourceKind::Vm),
            "storage_pool" => Ok(ResourceKind::StoragePool),
            "volume" => Ok(ResourceKind::Volume),
            "domain" => Ok(ResourceKind::Domain),
            "container_node" => Ok(ResourceKind::ContainerNode),
            "container_cluster" => Ok(ResourceKind::ContainerCluster),
            "stack" => Ok(ResourceKind::Stack),
            "application" => Ok(ResourceKind::Application),
            other => Err(DomainError::bad_request(format!(
                "unknown resource kind: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkResource {
    pub cidr: String,
    pub vlan: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmResource {
    pub cpus: i32,
    pub memory_mb: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoragePoolResource {
    pub backend: String,
    pub capacity_gb: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeResource {
    pub pool: String,
    pub size_gb: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainResource {
    pub fqdn: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerNodeResource {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerClusterResource {
    pub orchestrator: String,
    pub node_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackResource {
    pub template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationResource {
    pub image: String,
}

/// Update payload. The resource can only be replaced by another valid
/// resource, never cleared.
#[derive(Debug, Clone, Deserialize)]
pub struct ElementUpdateRequest {
    pub name: Option<String>,
    pub resource: Option<ElementResource>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resource_payload_round_trips_by_kind() {
        let payload = json!({"kind": "vm", "cpus": 4, "memory_mb": 8192});
        let resource: ElementResource = serde_json::from_value(payload).unwrap();
        assert_eq!(resource.kind(), ResourceKind::Vm);
        assert_eq!(resource.kind().as_str(), "vm");
    }

    #[test]
    fn unknown_resource_kind_is_rejected() {
        let payload = json!({"kind": "gpu", "model": "a100"});
        let parsed: Result<ElementResource, _> = serde_json::from_value(payload);
        assert!(parsed.is_err());
    }

    #[test]
    fn missing_resource_kind_is_rejected() {
        let payload = json!({"cidr": "10.0.0.0/24"});
        let parsed: Result<ElementResource, _> = serde_json::from_value(payload);
        assert!(parsed.is_err());
    }

    #[test]
    fn kind_parses_from_canonical_names() {
        for kind in [
            "network",
            "vm",
            "storage_pool",
            "volume",
            "domain",
            "container_node",
            "container_cluster",
            "stack",
            "application",
        ] {
            let parsed: ResourceKind = kind.parse().unwrap();
            assert_eq!(parsed.as_str(), kind);
        }
        assert!("floppy".parse::<ResourceKind>().is_err());
    }
}
