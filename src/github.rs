// Public repository metadata from the GitHub REST API.
//
// Unauthenticated calls are limited to ~60/hour, so a 403 with a
// rate-limit reset header is surfaced with the reset time instead of being
// retried; other failures go through the usual fallback path.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::fallback::{self, Result, Strategy};

#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub base_url: String,
    pub user: String,
    /// Sent on every request; helps avoid occasional soft blocks.
    pub user_agent: String,
    pub attempt_timeout: Duration,
}

impl Default for GithubConfig {
    fn default() -> Self {
        GithubConfig {
            base_url: "https://api.github.com".to_string(),
            user: "chrisbargh88".to_string(),
            user_agent: "chriscv-portfolio".to_string(),
            attempt_timeout: fallback::DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSummary {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub html_url: String,
    pub updated_at: Option<String>,
}

#[derive(Deserialize)]
struct RepoPayload {
    id: u64,
    name: String,
    description: Option<String>,
    language: Option<String>,
    html_url: String,
    homepage: Option<String>,
    stargazers_count: u64,
    forks_count: u64,
    open_issues_count: u64,
    license: Option<LicensePayload>,
    updated_at: Option<String>,
    default_branch: Option<String>,
}

#[derive(Deserialize)]
struct LicensePayload {
    spdx_id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoDetail {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub html_url: String,
    pub homepage: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub open_issues: u64,
    pub license: Option<String>,
    pub updated_at: Option<String>,
    pub default_branch: Option<String>,
}

impl From<RepoPayload> for RepoDetail {
    fn from(repo: RepoPayload) -> Self {
        RepoDetail {
            id: repo.id,
            name: repo.name,
            description: repo.description,
            language: repo.language,
            html_url: repo.html_url,
            homepage: repo.homepage,
            stars: repo.stargazers_count,
            forks: repo.forks_count,
            open_issues: repo.open_issues_count,
            license: repo
                .license
                .and_then(|l| l.spdx_id.filter(|id| id != "NOASSERTION").or(l.name)),
            updated_at: repo.updated_at,
            default_branch: repo.default_branch,
        }
    }
}

// ============================================================================
// Service
// ============================================================================

#[derive(Clone)]
pub struct GithubService {
    client: Client,
    config: GithubConfig,
}

impl GithubService {
    pub fn new(client: Client, config: GithubConfig) -> Self {
        GithubService { client, config }
    }

    pub fn user(&self) -> &str {
        &self.config.user
    }

    fn strategy_for(&self, url: &str) -> Strategy {
        Strategy::direct("github-direct", url)
            .with_header("Accept", "application/vnd.github+json")
            .with_header("User-Agent", &self.config.user_agent)
    }

    async fn fetch_body(&self, url: &str) -> Result<String> {
        fallback::fetch_with_fallback(
            &self.client,
            &[self.strategy_for(url)],
            self.config.attempt_timeout,
        )
        .await
    }

    /// Public repositories for the configured user, newest-updated first,
    /// up to 100.
    pub async fn fetch_repos(&self) -> Result<Vec<RepoSummary>> {
        let url = format!(
            "{}/users/{}/repos?per_page=100&sort=updated",
            self.config.base_url, self.config.user
        );
        let body = self.fetch_body(&url).await?;
        fallback::decode_json(&body)
    }

    /// Full metadata for a single repository.
    pub async fn fetch_repo(&self, name: &str) -> Result<RepoDetail> {
        let url = format!("{}/repos/{}/{}", self.config.base_url, self.config.user, name);
        let body = self.fetch_body(&url).await?;
        let payload: RepoPayload = fallback::decode_json(&body)?;
        Ok(payload.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_list_decodes_from_api_shape() {
        let body = r#"[
            {"id": 1, "name": "flight-tools", "description": "OTP utilities",
             "language": "Rust", "html_url": "https://github.com/u/flight-tools",
             "updated_at": "2024-05-01T00:00:00Z", "extra_field": true},
            {"id": 2, "name": "site", "description": null, "language": null,
             "html_url": "https://github.com/u/site", "updated_at": null}
        ]"#;
        let repos: Vec<RepoSummary> = fallback::decode_json(body).unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].name, "flight-tools");
        assert_eq!(repos[1].description, None);
    }

    #[test]
    fn detail_maps_counts_and_license() {
        let body = r#"{
            "id": 7, "name": "radar", "description": "d", "language": "Rust",
            "html_url": "https://github.com/u/radar", "homepage": "",
            "stargazers_count": 12, "forks_count": 3, "open_issues_count": 1,
            "license": {"spdx_id": "MIT", "name": "MIT License"},
            "updated_at": "2024-05-01T00:00:00Z", "default_branch": "main"
        }"#;
        let payload: RepoPayload = fallback::decode_json(body).unwrap();
        let detail = RepoDetail::from(payload);
        assert_eq!(detail.stars, 12);
        assert_eq!(detail.forks, 3);
        assert_eq!(detail.license.as_deref(), Some("MIT"));
    }

    #[test]
    fn noassertion_license_falls_back_to_name() {
        let body = r#"{
            "id": 8, "name": "x", "description": null, "language": null,
            "html_url": "https://github.com/u/x", "homepage": null,
            "stargazers_count": 0, "forks_count": 0, "open_issues_count": 0,
            "license": {"spdx_id": "NOASSERTION", "name": "Other"},
            "updated_at": null, "default_branch": null
        }"#;
        let payload: RepoPayload = fallback::decode_json(body).unwrap();
        let detail = RepoDetail::from(payload);
        assert_eq!(detail.license.as_deref(), Some("Other"));
    }

    #[test]
    fn missing_license_stays_none() {
        let body = r#"{
            "id": 9, "name": "y", "description": null, "language": null,
            "html_url": "https://github.com/u/y", "homepage": null,
            "stargazers_count": 0, "forks_count": 0, "open_issues_count": 0,
            "license": null, "updated_at": null, "default_branch": null
        }"#;
        let payload: RepoPayload = fallback::decode_json(body).unwrap();
        assert_eq!(RepoDetail::from(payload).license, None);
    }
}
