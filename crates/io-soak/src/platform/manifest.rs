//! Kubernetes manifests for soak resources.
//!
//! Pure builders; [`super::KubectlPlatform`] pipes the JSON to `kubectl apply`.

use super::{StorageClassSpec, VolumeMode, VolumeSpec, WorkloadSpec};
use serde_json::{json, Value};

/// CSI provisioner backing every soak storage class.
pub const PROVISIONER: &str = "io.openebs.csi-mayastor";

/// Mount path of filesystem volumes inside the fio container.
pub const FS_MOUNT_PATH: &str = "/volume";

/// Device path of raw block volumes inside the fio container.
pub const BLOCK_DEVICE_PATH: &str = "/dev/sdm";

/// Name of the single container in every workload pod.
pub const CONTAINER_NAME: &str = "fio";

const VOLUME_NAME: &str = "ms-volume";

const IO_TIMEOUT_SECONDS: &str = "30";

pub fn storage_class(spec: &StorageClassSpec) -> Value {
    json!({
        "apiVersion": "storage.k8s.io/v1",
        "kind": "StorageClass",
        "metadata": { "name": spec.name },
        "provisioner": PROVISIONER,
        "parameters": {
            "repl": spec.replicas.to_string(),
            "protocol": spec.protocol.as_str(),
            "ioTimeout": IO_TIMEOUT_SECONDS,
            "local": "true",
        },
    })
}

pub fn namespace(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": { "name": name },
    })
}

pub fn volume_claim(spec: &VolumeSpec) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "PersistentVolumeClaim",
        "metadata": { "name": spec.name, "namespace": spec.namespace },
        "spec": {
            "storageClassName": spec.storage_class,
            "accessModes": ["ReadWriteOnce"],
            "volumeMode": spec.mode.as_str(),
            "resources": {
                "requests": { "storage": format!("{}Mi", spec.size_mb) },
            },
        },
    })
}

pub fn workload_pod(spec: &WorkloadSpec) -> Value {
    let mut container = json!({
        "name": CONTAINER_NAME,
        "image": spec.image,
        "imagePullPolicy": "IfNotPresent",
        "args": spec.args,
    });

    match spec.volume_mode {
        VolumeMode::Filesystem => {
            container["volumeMounts"] = json!([
                { "name": VOLUME_NAME, "mountPath": FS_MOUNT_PATH }
            ]);
        }
        VolumeMode::RawBlock => {
            container["volumeDevices"] = json!([
                { "name": VOLUME_NAME, "devicePath": BLOCK_DEVICE_PATH }
            ]);
        }
    }

    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": spec.name,
            "namespace": spec.namespace,
            "labels": { "app": "fio", "e2e-test": "io-soak" },
        },
        "spec": {
            "restartPolicy": spec.restart_policy.as_str(),
            "nodeSelector": spec.node_selector,
            "containers": [container],
            "volumes": [{
                "name": VOLUME_NAME,
                "persistentVolumeClaim": { "claimName": spec.volume_name },
            }],
        },
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::platform::{RestartPolicy, ShareProtocol};
    use std::collections::BTreeMap;

    fn workload(mode: VolumeMode, restart_policy: RestartPolicy) -> WorkloadSpec {
        WorkloadSpec {
            name: "fio-1".to_string(),
            namespace: "disrupt".to_string(),
            volume_name: "vol-1".to_string(),
            volume_mode: mode,
            image: "registry.local/mayastor/e2e-fio".to_string(),
            args: vec!["--".to_string(), "--time_based".to_string()],
            node_selector: BTreeMap::from([("e2e-app".to_string(), "true".to_string())]),
            restart_policy,
        }
    }

    #[test]
    fn test_storage_class_parameters() {
        let sc = storage_class(&StorageClassSpec {
            name: "io-soak-nvmf".to_string(),
            protocol: ShareProtocol::Nvmf,
            replicas: 3,
        });

        assert_eq!(sc["kind"], "StorageClass");
        assert_eq!(sc["metadata"]["name"], "io-soak-nvmf");
        assert_eq!(sc["provisioner"], PROVISIONER);
        assert_eq!(sc["parameters"]["repl"], "3");
        assert_eq!(sc["parameters"]["protocol"], "nvmf");
    }

    #[test]
    fn test_volume_claim_mode_and_size() {
        let pvc = volume_claim(&VolumeSpec {
            name: "vol-1".to_string(),
            namespace: "default".to_string(),
            storage_class: "io-soak-iscsi".to_string(),
            size_mb: 500,
            mode: VolumeMode::RawBlock,
        });

        assert_eq!(pvc["metadata"]["namespace"], "default");
        assert_eq!(pvc["spec"]["storageClassName"], "io-soak-iscsi");
        assert_eq!(pvc["spec"]["volumeMode"], "Block");
        assert_eq!(pvc["spec"]["resources"]["requests"]["storage"], "500Mi");
    }

    #[test]
    fn test_filesystem_pod_mounts_volume() {
        let pod = workload_pod(&workload(VolumeMode::Filesystem, RestartPolicy::Never));
        let container = &pod["spec"]["containers"][0];

        assert_eq!(container["volumeMounts"][0]["mountPath"], FS_MOUNT_PATH);
        assert!(container.get("volumeDevices").is_none());
        assert_eq!(pod["spec"]["restartPolicy"], "Never");
        assert_eq!(
            pod["spec"]["volumes"][0]["persistentVolumeClaim"]["claimName"],
            "vol-1"
        );
    }

    #[test]
    fn test_block_pod_exposes_device_and_restarts() {
        let pod = workload_pod(&workload(VolumeMode::RawBlock, RestartPolicy::Always));
        let container = &pod["spec"]["containers"][0];

        assert_eq!(container["volumeDevices"][0]["devicePath"], BLOCK_DEVICE_PATH);
        assert!(container.get("volumeMounts").is_none());
        assert_eq!(pod["spec"]["restartPolicy"], "Always");
        assert_eq!(pod["spec"]["nodeSelector"]["e2e-app"], "true");
        assert_eq!(container["args"][1], "--time_based");
    }

    #[test]
    fn test_namespace_manifest() {
        let ns = namespace("disrupt");
        assert_eq!(ns["kind"], "Namespace");
        assert_eq!(ns["metadata"]["name"], "disrupt");
    }
}
