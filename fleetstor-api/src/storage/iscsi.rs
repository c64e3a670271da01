//! iSCSI storage backend
//!
//! Management-plane description of an iSCSI-backed storage pool: the portal
//! address and the target name. Nothing here talks to the array.

use super::PoolParams;
use crate::validation;
use fleetstor_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// iSCSI storage pool payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IscsiStoragePool {
    pub ip_addr: String,
    pub port: u16,
    pub target: String, // iSCSI Qualified Name (e.g., "iqn.2024-01.com.example:storage")
}

impl IscsiStoragePool {
    pub const TYPE_LABEL: &'static str = "iSCSI";
    pub const DEFAULT_PORT: u16 = 3260;

    /// Build from provisioning params. Missing fields are left empty; see `validate`.
    pub fn from_params(params: &PoolParams) -> Self {
        Self {
            ip_addr: params.ip_addr.clone().unwrap_or_default(),
            port: params.port.unwrap_or(Self::DEFAULT_PORT),
            target: params.target.clone().unwrap_or_default(),
        }
    }

    /// Portal address in "ip:port" form
    pub fn portal(&self) -> String {
        format!("{}:{}", self.ip_addr, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        validation::validate_address(&self.ip_addr)?;
        validation::validate_port(self.port)?;
        validation::validate_iscsi_target(&self.target)?;
        Ok(())
    }
}

/// iSCSI target connection descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IscsiTarget {
    pub portal: String, // IP:port (e.g., "192.168.1.100:3260")
    pub iqn: String,
}

impl IscsiTarget {
    /// Parse an `iscsi://portal:port/iqn` URI
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri.strip_prefix("iscsi://").ok_or_else(|| {
            Error::InvalidConfig(format!("Invalid iSCSI URI (expected iscsi://): {}", uri))
        })?;

        let (portal, iqn) = rest
            .split_once('/')
            .filter(|(portal, iqn)| !portal.is_empty() && !iqn.is_empty())
            .ok_or_else(|| Error::InvalidConfig(format!("Invalid iSCSI URI: {}", uri)))?;

        Ok(IscsiTarget {
            portal: portal.to_string(),
            iqn: iqn.to_string(),
        })
    }

    pub fn to_uri(&self) -> String {
        format!("iscsi://{}/{}", self.portal, self.iqn)
    }

    /// Split the portal into address and port, defaulting the port to 3260
    pub fn to_pool(&self) -> Result<IscsiStoragePool> {
        let (ip_addr, port) = match self.portal.rsplit_once(':') {
            Some((addr, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    Error::InvalidConfig(format!("Invalid iSCSI portal port: {}", self.portal))
                })?;
                (addr.to_string(), port)
            }
            None => (self.portal.clone(), IscsiStoragePool::DEFAULT_PORT),
        };

        Ok(IscsiStoragePool {
            ip_addr,
            port,
            target: self.iqn.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_iscsi_target() {
        let uri = "iscsi://192.168.1.100:3260/iqn.2024-01.com.example:storage";
        let target = IscsiTarget::parse(uri).unwrap();

        assert_eq!(target.portal, "192.168.1.100:3260");
        assert_eq!(target.iqn, "iqn.2024-01.com.example:storage");
        assert_eq!(target.to_uri(), uri);
    }

    #[test]
    fn test_invalid_iscsi_uri() {
        assert!(IscsiTarget::parse("invalid://path").is_err());
        assert!(IscsiTarget::parse("iscsi://192.168.1.100:3260").is_err());
        assert!(IscsiTarget::parse("iscsi:///iqn.2024-01.com.example").is_err());
    }

    #[test]
    fn test_target_to_pool() {
        let target = IscsiTarget::parse("iscsi://10.0.0.5:3261/iqn.2024-01.example:vol1").unwrap();
        let pool = target.to_pool().unwrap();
        assert_eq!(pool.ip_addr, "10.0.0.5");
        assert_eq!(pool.port, 3261);
        assert_eq!(pool.target, "iqn.2024-01.example:vol1");

        let target = IscsiTarget::parse("iscsi://san01/iqn.2024-01.example:vol1").unwrap();
        assert_eq!(target.to_pool().unwrap().port, IscsiStoragePool::DEFAULT_PORT);

        let target = IscsiTarget::parse("iscsi://san01:http/iqn.2024-01.example:vol1").unwrap();
        assert!(target.to_pool().is_err());
    }

    #[test]
    fn test_from_params_defaults() {
        let pool = IscsiStoragePool::from_params(&PoolParams::default());
        assert_eq!(pool.port, 3260);
        assert!(pool.ip_addr.is_empty());
        assert!(pool.validate().is_err());
    }

    #[test]
    fn test_validate() {
        let pool = IscsiStoragePool {
            ip_addr: "192.168.1.10".to_string(),
            port: 3260,
            target: "tgt1".to_string(),
        };
        assert!(pool.validate().is_ok());
        assert_eq!(pool.portal(), "192.168.1.10:3260");

        let bad = IscsiStoragePool {
            target: "has space".to_string(),
            ..pool
        };
        assert!(bad.validate().is_err());
    }
}
