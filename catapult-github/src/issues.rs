//! Issues-API client behind the `IssueStore` capability.

use async_trait::async_trait;
use catapult_core::{IssueStore, RemoteError, RemoteIssue};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::api::{self, ErrorScope};

#[derive(Debug, Clone)]
pub struct GitHubIssues {
    http: Client,
    api_base: String,
    owner: String,
    repo: String,
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    number: u64,
    title: String,
    state: String,
    html_url: String,
    /// Present when the entry is actually a pull request.
    pull_request: Option<serde_json::Value>,
}

impl From<IssueResponse> for RemoteIssue {
    fn from(issue: IssueResponse) -> Self {
        RemoteIssue {
            number: issue.number,
            title: issue.title,
            state: issue.state,
            url: issue.html_url,
        }
    }
}

impl GitHubIssues {
    pub async fn connect(token: &str, repo: &str) -> Result<Self, RemoteError> {
        Self::connect_to(api::DEFAULT_API_BASE, token, repo).await
    }

    pub async fn connect_to(api_base: &str, token: &str, repo: &str) -> Result<Self, RemoteError> {
        let http = api::build_http(token)?;
        let owner = api::fetch_login(&http, api_base).await?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            owner,
            repo: repo.to_string(),
        })
    }

    fn issues_url(&self) -> String {
        format!("{}/repos/{}/{}/issues", self.api_base, self.owner, self.repo)
    }
}

#[async_trait]
impl IssueStore for GitHubIssues {
    async fn create_issue(
        &self,
        title: &str,
        body: &str,
        labels: &[String],
        assignees: &[String],
    ) -> Result<RemoteIssue, RemoteError> {
        let payload = json!({
            "title": title,
            "body": body,
            "labels": labels,
            "assignees": assignees,
        });
        let resp = self
            .http
            .post(self.issues_url())
            .json(&payload)
            .send()
            .await
            .map_err(api::transport)?;
        if !resp.status().is_success() {
            return Err(api::error_from_response(resp, ErrorScope::Repository).await);
        }
        let issue: IssueResponse = resp.json().await.map_err(api::transport)?;
        info!(number = issue.number, title, "created issue");
        Ok(issue.into())
    }

    async fn comment_issue(&self, number: u64, body: &str) -> Result<(), RemoteError> {
        let resp = self
            .http
            .post(format!("{}/{}/comments", self.issues_url(), number))
            .json(&json!({ "body": body }))
            .send()
            .await
            .map_err(api::transport)?;
        if !resp.status().is_success() {
            return Err(api::error_from_response(resp, ErrorScope::Repository).await);
        }
        debug!(number, "commented on issue");
        Ok(())
    }

    async fn set_issue_state(&self, number: u64, open: bool) -> Result<(), RemoteError> {
        let state = if open { "open" } else { "closed" };
        let resp = self
            .http
            .patch(format!("{}/{}", self.issues_url(), number))
            .json(&json!({ "state": state }))
            .send()
            .await
            .map_err(api::transport)?;
        if !resp.status().is_success() {
            return Err(api::error_from_response(resp, ErrorScope::Repository).await);
        }
        info!(number, state, "changed issue state");
        Ok(())
    }

    async fn list_open_issues(&self, labels: &[String]) -> Result<Vec<RemoteIssue>, RemoteError> {
        let mut query = vec![("state", "open".to_string()), ("per_page", "100".to_string())];
        if !labels.is_empty() {
            query.push(("labels", labels.join(",")));
        }
        let resp = self
            .http
            .get(self.issues_url())
            .query(&query)
            .send()
            .await
            .map_err(api::transport)?;
        if !resp.status().is_success() {
            return Err(api::error_from_response(resp, ErrorScope::Repository).await);
        }
        let issues: Vec<IssueResponse> = resp.json().await.map_err(api::transport)?;
        Ok(issues
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .map(RemoteIssue::from)
            .collect())
    }
}
