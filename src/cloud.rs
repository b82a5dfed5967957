use thiserror::Error;

pub const DEFAULT_CLOUD: &str = "AzureCloud";

/// Endpoints of one sovereign cloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cloud {
    pub name: &'static str,
    pub authority_host: &'static str,
    pub resource_manager: &'static str,
    pub resource_manager_scope: &'static str,
}

pub const AZURE_PUBLIC: Cloud = Cloud {
    name: "AzureCloud",
    authority_host: "https://login.microsoftonline.com",
    resource_manager: "https://management.azure.com",
    resource_manager_scope: "https://management.core.windows.net//.default",
};

pub const AZURE_CHINA: Cloud = Cloud {
    name: "AzureChinaCloud",
    authority_host: "https://login.chinacloudapi.cn",
    resource_manager: "https://management.chinacloudapi.cn",
    resource_manager_scope: "https://management.core.chinacloudapi.cn//.default",
};

pub const AZURE_US_GOVERNMENT: Cloud = Cloud {
    name: "AzureUSGovernment",
    authority_host: "https://login.microsoftonline.us",
    resource_manager: "https://management.usgovcloudapi.net",
    resource_manager_scope: "https://management.core.usgovcloudapi.net//.default",
};

pub const KNOWN_CLOUDS: &[Cloud] = &[AZURE_PUBLIC, AZURE_CHINA, AZURE_US_GOVERNMENT];

#[derive(Debug, Error)]
#[error("unknown cloud '{name}'. Valid clouds: {valid}")]
pub struct UnknownCloud {
    pub name: String,
    pub valid: String,
}

impl Cloud {
    pub fn by_name(name: &str) -> Result<&'static Cloud, UnknownCloud> {
        KNOWN_CLOUDS
            .iter()
            .find(|cloud| cloud.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownCloud {
                name: name.to_string(),
                valid: KNOWN_CLOUDS
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// Cloud whose authority host matches `authority` (scheme optional).
    pub fn by_authority(authority: &str) -> Option<&'static Cloud> {
        let host = host_of(authority);
        KNOWN_CLOUDS
            .iter()
            .find(|cloud| host_of(cloud.authority_host).eq_ignore_ascii_case(host))
    }

    pub fn authority_for(&self, tenant: &str) -> String {
        format!("{}/{}", self.authority_host, tenant)
    }
}

/// Host part of an authority URL, e.g. `login.microsoftonline.com`.
pub fn host_of(authority: &str) -> &str {
    let without_scheme = authority
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(authority);
    without_scheme.split('/').next().unwrap_or(without_scheme)
}
