//! Object kinds the inspection tool is asked to dump

use std::collections::BTreeSet;
use std::fmt;

/// A `(kind, API group)` pair as understood by `oc adm inspect`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceType {
    /// Lowercase kind
    pub kind: &'static str,
    /// API group, empty for the core group
    pub group: &'static str,
}

impl ResourceType {
    pub const fn new(kind: &'static str, group: &'static str) -> Self {
        Self { kind, group }
    }

    /// `kind.group/name` reference to a single object
    pub fn named(&self, name: &str) -> String {
        format!("{}/{}", self, name)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

pub const HOSTED_CLUSTER: ResourceType = ResourceType::new("hostedcluster", "hypershift.openshift.io");
pub const NODE_POOL: ResourceType = ResourceType::new("nodepool", "hypershift.openshift.io");
pub const NODE: ResourceType = ResourceType::new("node", "");

const CONTROL_PLANE_DEFAULTS: &[ResourceType] = &[
    ResourceType::new("daemonset", "apps"),
    ResourceType::new("deployment", "apps"),
    ResourceType::new("replicaset", "apps"),
    ResourceType::new("statefulset", "apps"),
    ResourceType::new("job", "batch"),
    ResourceType::new("configmap", ""),
    ResourceType::new("endpoints", ""),
    ResourceType::new("event", ""),
    ResourceType::new("persistentvolumeclaim", ""),
    ResourceType::new("pod", ""),
    ResourceType::new("replicationcontroller", ""),
    ResourceType::new("service", ""),
    ResourceType::new("cluster", "cluster.x-k8s.io"),
    ResourceType::new("machinedeployment", "cluster.x-k8s.io"),
    ResourceType::new("machine", "cluster.x-k8s.io"),
    ResourceType::new("machineset", "cluster.x-k8s.io"),
    ResourceType::new("hostedcontrolplane", "hypershift.openshift.io"),
    ResourceType::new("awsmachine", "infrastructure.cluster.x-k8s.io"),
    ResourceType::new("awsmachinetemplate", "infrastructure.cluster.x-k8s.io"),
    ResourceType::new("awscluster", "infrastructure.cluster.x-k8s.io"),
    ResourceType::new("awsendpointservice", "hypershift.openshift.io"),
    ResourceType::new("agentmachine", "capi-provider.agent-install.openshift.io"),
    ResourceType::new("agentmachinetemplate", "capi-provider.agent-install.openshift.io"),
    ResourceType::new("agentcluster", "capi-provider.agent-install.openshift.io"),
    ResourceType::new("kubevirtmachine", "infrastructure.cluster.x-k8s.io"),
    ResourceType::new("kubevirtmachinetemplate", "infrastructure.cluster.x-k8s.io"),
    ResourceType::new("kubevirtcluster", "infrastructure.cluster.x-k8s.io"),
    ResourceType::new("route", "route.openshift.io"),
    ResourceType::new("imagestream", "image.openshift.io"),
    ResourceType::new("networkpolicy", "networking.k8s.io"),
];

const KUBEVIRT_ADDITIONS: &[ResourceType] = &[
    ResourceType::new("datavolume", "cdi.kubevirt.io"),
    ResourceType::new("virtualmachine", "kubevirt.io"),
    ResourceType::new("virtualmachineinstance", "kubevirt.io"),
];

const AGENT_ADDITIONS: &[ResourceType] = &[
    ResourceType::new("clusterdeployment", "hive.openshift.io"),
    ResourceType::new("agentclusterinstall", "extensions.hive.openshift.io"),
];

const AGENT_NAMESPACE_KINDS: &[ResourceType] = &[
    ResourceType::new("agent", "agent-install.openshift.io"),
    ResourceType::new("infraenv", "agent-install.openshift.io"),
];

const GUEST_CLUSTER_KINDS: &[ResourceType] = &[
    ResourceType::new("customresourcedefinition", "apiextensions.k8s.io"),
    ResourceType::new("controllerrevision", "apps"),
    ResourceType::new("daemonset", "apps"),
    ResourceType::new("deployment", "apps"),
    ResourceType::new("replicaset", "apps"),
    ResourceType::new("statefulset", "apps"),
    ResourceType::new("job", "batch"),
    ResourceType::new("clusteroperator", "config.openshift.io"),
    ResourceType::new("configmap", ""),
    ResourceType::new("endpoints", ""),
    ResourceType::new("event", ""),
    ResourceType::new("namespace", ""),
    ResourceType::new("node", ""),
    ResourceType::new("persistentvolume", ""),
    ResourceType::new("persistentvolumeclaim", ""),
    ResourceType::new("pod", ""),
    ResourceType::new("replicationcontroller", ""),
    ResourceType::new("service", ""),
    ResourceType::new("clusterrole", "rbac.authorization.k8s.io"),
    ResourceType::new("clusterrolebinding", "rbac.authorization.k8s.io"),
    ResourceType::new("role", "rbac.authorization.k8s.io"),
    ResourceType::new("rolebinding", "rbac.authorization.k8s.io"),
    ResourceType::new("securitycontextconstraints", "security.openshift.io"),
    ResourceType::new("csidriver", "storage.k8s.io"),
    ResourceType::new("csinode", "storage.k8s.io"),
    ResourceType::new("storageclass", "storage.k8s.io"),
    ResourceType::new("volumeattachment", "storage.k8s.io"),
    // TODO: skip the snapshot kinds once guest clusters can disable the CSISnapshot capability.
    ResourceType::new("volumesnapshotclass", "snapshot.storage.k8s.io"),
    ResourceType::new("volumesnapshotcontent", "snapshot.storage.k8s.io"),
];

/// Optional sub-platforms that widen the collection scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlatformUsage {
    /// At least one NodePool of the cluster runs on KubeVirt
    pub kubevirt: bool,
    /// An agent namespace was configured
    pub agent: bool,
}

/// Ordered list of resource types; equality ignores order and duplicates
#[derive(Debug, Clone, Default)]
pub struct ResourceTypeSet {
    types: Vec<ResourceType>,
}

impl ResourceTypeSet {
    pub fn from_slice(types: &[ResourceType]) -> Self {
        let mut set = Self::default();
        set.extend(types);
        set
    }

    pub fn extend(&mut self, types: &[ResourceType]) {
        for t in types {
            if !self.types.contains(t) {
                self.types.push(*t);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn contains(&self, t: &ResourceType) -> bool {
        self.types.contains(t)
    }

    /// Comma separated form accepted as a single inspect argument
    pub fn to_arg(&self) -> String {
        self.types
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn as_set(&self) -> BTreeSet<ResourceType> {
        self.types.iter().copied().collect()
    }
}

impl PartialEq for ResourceTypeSet {
    fn eq(&self, other: &Self) -> bool {
        self.as_set() == other.as_set()
    }
}

impl Eq for ResourceTypeSet {}

/// Kinds dumped from the control plane, operator and request namespaces
pub fn control_plane_resources(usage: PlatformUsage) -> ResourceTypeSet {
    let mut set = ResourceTypeSet::from_slice(CONTROL_PLANE_DEFAULTS);
    if usage.kubevirt {
        set.extend(KUBEVIRT_ADDITIONS);
    }
    if usage.agent {
        set.extend(AGENT_ADDITIONS);
    }
    set
}

/// Kinds dumped from the agent namespace
pub fn agent_namespace_resources() -> ResourceTypeSet {
    ResourceTypeSet::from_slice(AGENT_NAMESPACE_KINDS)
}

/// Kinds dumped from the guest cluster through the tunnel
pub fn guest_cluster_resources() -> ResourceTypeSet {
    ResourceTypeSet::from_slice(GUEST_CLUSTER_KINDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_display() {
        assert_eq!(NODE.to_string(), "node");
        assert_eq!(HOSTED_CLUSTER.named("example"), "hostedcluster.hypershift.openshift.io/example");
    }

    #[test]
    fn test_identical_usage_gives_identical_sets() {
        for usage in [
            PlatformUsage::default(),
            PlatformUsage { kubevirt: true, agent: false },
            PlatformUsage { kubevirt: false, agent: true },
            PlatformUsage { kubevirt: true, agent: true },
        ] {
            assert_eq!(control_plane_resources(usage), control_plane_resources(usage));
            assert_eq!(control_plane_resources(usage).to_arg(), control_plane_resources(usage).to_arg());
        }
    }

    #[test]
    fn test_kubevirt_adds_virtualization_kinds() {
        let base = control_plane_resources(PlatformUsage::default());
        let kv = control_plane_resources(PlatformUsage { kubevirt: true, agent: false });
        assert_eq!(kv.len(), base.len() + 3);
        assert!(kv.to_arg().ends_with("datavolume.cdi.kubevirt.io,virtualmachine.kubevirt.io,virtualmachineinstance.kubevirt.io"));
        assert_ne!(base, kv);
    }

    #[test]
    fn test_agent_adds_hive_kinds() {
        let set = control_plane_resources(PlatformUsage { kubevirt: false, agent: true });
        assert!(set.contains(&ResourceType::new("clusterdeployment", "hive.openshift.io")));
        assert_eq!(
            agent_namespace_resources().to_arg(),
            "agent.agent-install.openshift.io,infraenv.agent-install.openshift.io"
        );
    }

    #[test]
    fn test_equality_ignores_order() {
        let a = ResourceTypeSet::from_slice(&[NODE, HOSTED_CLUSTER]);
        let b = ResourceTypeSet::from_slice(&[HOSTED_CLUSTER, NODE, NODE]);
        assert_eq!(a, b);
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn test_core_kinds_have_no_group_suffix() {
        let arg = guest_cluster_resources().to_arg();
        assert!(arg.split(',').any(|t| t == "namespace"));
        assert!(arg.split(',').any(|t| t == "clusterrole.rbac.authorization.k8s.io"));
    }
}
