//! Hosted git REST API client
//!
//! Only the calls the orchestrator needs: repository lookup and creation,
//! and checking whether a path exists on a branch.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::git::{CreateRepoOpts, Repository};
use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("cluster-gitops/", env!("CARGO_PKG_VERSION"));
const ACCEPT: &str = "application/vnd.github+json";

#[derive(Debug, Deserialize)]
struct RepoResponse {
    name: String,
    owner: OwnerResponse,
    #[serde(default)]
    organization: Option<OwnerResponse>,
    clone_url: String,
}

#[derive(Debug, Deserialize)]
struct OwnerResponse {
    login: String,
}

#[derive(Debug, Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    description: &'a str,
    private: bool,
    auto_init: bool,
}

/// Client for the hosted git REST API
#[derive(Clone, Debug)]
pub struct GithubApi {
    client: Client,
    base_url: String,
    token: String,
}

impl GithubApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, ACCEPT)
    }

    /// `None` when the repository does not exist or is not visible to the token.
    pub async fn get_repo(&self, owner: &str, repo: &str) -> Result<Option<Repository>> {
        let url = format!("{}/repos/{}/{}", self.base_url, owner, repo);
        debug!(url = %url, "Looking up repository");

        let response = self.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status("get repository", response).await?;
        let body: RepoResponse = response.json().await?;
        Ok(Some(Repository {
            name: body.name,
            owner: body.owner.login,
            organization: body.organization.map(|o| o.login).unwrap_or_default(),
            clone_url: body.clone_url,
        }))
    }

    pub async fn create_repo(&self, opts: &CreateRepoOpts) -> Result<Repository> {
        let url = if opts.personal {
            format!("{}/user/repos", self.base_url)
        } else {
            format!("{}/orgs/{}/repos", self.base_url, opts.owner)
        };
        let request = CreateRepoRequest {
            name: &opts.name,
            description: &opts.description,
            private: opts.privacy,
            auto_init: false,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .json(&request)
            .send()
            .await?;
        let response = check_status("create repository", response).await?;
        let body: RepoResponse = response.json().await?;
        info!(owner = %body.owner.login, repository = %body.name, "Created repository");
        Ok(Repository {
            name: body.name,
            owner: body.owner.login,
            organization: body.organization.map(|o| o.login).unwrap_or_default(),
            clone_url: body.clone_url,
        })
    }

    pub async fn path_exists(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        path: &str,
    ) -> Result<bool> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            self.base_url,
            owner,
            repo,
            path.trim_start_matches('/')
        );
        let response = self.get(&url).query(&[("ref", branch)]).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            _ => check_status("check path", response).await.map(|_| false),
        }
    }
}

async fn check_status(operation: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(Error::GitError {
        operation: operation.to_string(),
        message: format!("API returned {status}: {message}"),
    })
}
