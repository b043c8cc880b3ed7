//! Credentials and tool settings read from the environment

use std::path::PathBuf;

pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const GIT_PRIVATE_KEY_FILE_ENV: &str = "GIT_PRIVATE_KEY_FILE";
pub const GIT_SSH_KEY_PASSPHRASE_ENV: &str = "GIT_SSH_KEY_PASSPHRASE";
pub const GIT_KNOWN_HOSTS_FILE_ENV: &str = "GIT_KNOWN_HOSTS_FILE";
pub const GIT_AUTHOR_NAME_ENV: &str = "GIT_AUTHOR_NAME";
pub const GIT_AUTHOR_EMAIL_ENV: &str = "GIT_AUTHOR_EMAIL";
pub const GITHUB_API_URL_ENV: &str = "GITHUB_API_URL";

/// Default base URL of the hosted git REST API
pub const GITHUB_API_URL: &str = "https://api.github.com";

pub const DEFAULT_AUTHOR_NAME: &str = "cluster-gitops";
pub const DEFAULT_AUTHOR_EMAIL: &str = "cluster-gitops@users.noreply.github.com";

/// Settings shared by the git and flux command wrappers
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CliConfig {
    pub github_token: Option<String>,
    pub git_private_key_file: Option<PathBuf>,
    pub git_ssh_key_passphrase: Option<String>,
    pub git_known_hosts_file: Option<PathBuf>,
    pub author_name: String,
    pub author_email: String,
    pub github_api_url: String,
}

impl CliConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            github_token: get(GITHUB_TOKEN_ENV),
            git_private_key_file: get(GIT_PRIVATE_KEY_FILE_ENV).map(PathBuf::from),
            git_ssh_key_passphrase: get(GIT_SSH_KEY_PASSPHRASE_ENV),
            git_known_hosts_file: get(GIT_KNOWN_HOSTS_FILE_ENV).map(PathBuf::from),
            author_name: get(GIT_AUTHOR_NAME_ENV).unwrap_or_else(|| DEFAULT_AUTHOR_NAME.to_string()),
            author_email: get(GIT_AUTHOR_EMAIL_ENV)
                .unwrap_or_else(|| DEFAULT_AUTHOR_EMAIL.to_string()),
            github_api_url: get(GITHUB_API_URL_ENV).unwrap_or_else(|| GITHUB_API_URL.to_string()),
        }
    }
}
