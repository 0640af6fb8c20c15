use reqwest::StatusCode;

use crate::error::CoreError;
use crate::models::{
    CreateMessageRequest, CreateMessageResponse, FriendsResponse, GroupRecord, MessageRecord,
};

/// Client for the remote message store's HTTP interface.
pub struct ChatApi {
    base_url: String,
    client: reqwest::Client,
}

impl ChatApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// `POST /messages`. The server assigns the final id and echoes the
    /// timestamp it persisted.
    pub async fn create_message(
        &self,
        request: &CreateMessageRequest,
    ) -> Result<CreateMessageResponse, CoreError> {
        let url = format!("{}/messages", self.base_url);
        let response = self.client.post(&url).json(request).send().await?;
        Ok(check(response).await?.json().await?)
    }

    /// `GET /messages?target=...`. Order is not guaranteed; callers sort.
    pub async fn list_messages(&self, target: &str) -> Result<Vec<MessageRecord>, CoreError> {
        let url = format!("{}/messages", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("target", target)])
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// `DELETE /messages/:id`. Deleting an id the server no longer knows
    /// is not an error.
    pub async fn delete_message(&self, id: &str) -> Result<(), CoreError> {
        let url = format!("{}/messages/{id}", self.base_url);
        let response = self.client.delete(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(response).await?;
        Ok(())
    }

    pub async fn fetch_friends(&self, username: &str) -> Result<FriendsResponse, CoreError> {
        let url = format!("{}/friends", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("username", username)])
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn fetch_groups(&self, username: &str) -> Result<Vec<GroupRecord>, CoreError> {
        let url = format!("{}/groups", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("username", username)])
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, CoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CoreError::Api {
        status: status.as_u16(),
        body,
    })
}
