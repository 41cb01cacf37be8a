//! Kubeconfig decoding for cluster access tokens

use crate::error::{AzureError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Kubeconfig {
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    cluster: ClusterEntry,
}

#[derive(Debug, Deserialize)]
struct ClusterEntry {
    server: String,
    #[serde(rename = "certificate-authority-data", default)]
    certificate_authority_data: String,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    user: UserEntry,
}

#[derive(Debug, Default, Deserialize)]
struct UserEntry {
    token: Option<String>,
}

/// What a client needs to reach the cluster API server
#[derive(Clone, PartialEq, Eq)]
pub struct ClusterAccess {
    pub token: String,
    pub ca_data: String,
    pub endpoint: String,
}

impl std::fmt::Debug for ClusterAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterAccess")
            .field("token", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Decode a base64 kubeconfig and take the first cluster and user entries
pub fn parse_kubeconfig(encoded: &str) -> Result<ClusterAccess> {
    let raw = STANDARD.decode(encoded.trim())?;
    let config: Kubeconfig = serde_yaml::from_slice(&raw)?;

    let cluster = config
        .clusters
        .into_iter()
        .next()
        .ok_or_else(|| AzureError::InvalidKubeconfig("no cluster entries".into()))?
        .cluster;
    let token = config
        .users
        .into_iter()
        .next()
        .and_then(|u| u.user.token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AzureError::InvalidKubeconfig("first user has no static token".into()))?;

    Ok(ClusterAccess {
        token,
        ca_data: cluster.certificate_authority_data,
        endpoint: cluster.server,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- cluster:
    certificate-authority-data: LS0tLS1CRUdJTg==
    server: https://demo-dns-1a2b.hcp.eastus.azmk8s.io:443
  name: demo
contexts:
- context:
    cluster: demo
    user: clusterUser_rg_demo
  name: demo
current-context: demo
users:
- name: clusterUser_rg_demo
  user:
    token: 0123456789abcdef
"#;

    #[test]
    fn test_parse_static_token() {
        let access = parse_kubeconfig(&STANDARD.encode(KUBECONFIG)).unwrap();
        assert_eq!(access.token, "0123456789abcdef");
        assert_eq!(access.ca_data, "LS0tLS1CRUdJTg==");
        assert_eq!(
            access.endpoint,
            "https://demo-dns-1a2b.hcp.eastus.azmk8s.io:443"
        );
        assert!(!format!("{:?}", access).contains("0123456789abcdef"));
    }

    #[test]
    fn test_exec_user_has_no_token() {
        let config = KUBECONFIG.replace(
            "    token: 0123456789abcdef",
            "    exec:\n      command: kubelogin",
        );
        let err = parse_kubeconfig(&STANDARD.encode(config)).unwrap_err();
        assert!(matches!(err, AzureError::InvalidKubeconfig(_)));
    }

    #[test]
    fn test_invalid_base64() {
        assert!(matches!(
            parse_kubeconfig("not base64!"),
            Err(AzureError::Base64Error(_))
        ));
    }
}
