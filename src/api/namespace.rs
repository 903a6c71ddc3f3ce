// Namespace proxies and endpoint functions.
// A Namespace forwards `method(params)` to `ApiClient::invoke(namespace, method, params)`;
// typed helpers cover the common statuses, users, and friends endpoints.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;

use super::client::ApiClient;
use super::params::Params;

/// A client bound to one API namespace.
pub struct Namespace<'a> {
    client: &'a mut ApiClient,
    name: String,
}

impl<'a> Namespace<'a> {
    pub fn new(client: &'a mut ApiClient, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke `method` in this namespace.
    pub async fn call(&mut self, method: &str, params: Params) -> Result<Option<Value>> {
        self.client.invoke(&self.name, method, params).await
    }

    /// Invoke `method` and decode the result into `T`.
    pub async fn call_as<T: DeserializeOwned>(
        &mut self,
        method: &str,
        params: Params,
    ) -> Result<Option<T>> {
        self.client.invoke_as(&self.name, method, params).await
    }

    // statuses

    /// Most recent public statuses.
    pub async fn public_timeline(&mut self) -> Result<Option<Value>> {
        self.call("public_timeline", Params::new()).await
    }

    /// Statuses from the authenticated user and the users they follow.
    pub async fn friends_timeline(&mut self, params: Params) -> Result<Option<Value>> {
        self.call("friends_timeline", params).await
    }

    /// Statuses posted by one user (`id` param) or the authenticated user.
    pub async fn user_timeline(&mut self, params: Params) -> Result<Option<Value>> {
        self.call("user_timeline", params).await
    }

    /// Statuses mentioning the authenticated user.
    pub async fn mentions(&mut self, params: Params) -> Result<Option<Value>> {
        self.call("mentions", params).await
    }

    /// Post a new status.
    pub async fn update(&mut self, status: &str) -> Result<Option<Value>> {
        self.call("update", Params::new().with("status", status)).await
    }

    /// Delete a status.
    pub async fn destroy(&mut self, id: impl ToString) -> Result<Option<Value>> {
        self.call("destroy", Params::new().with("id", id)).await
    }

    /// Users the authenticated user follows.
    pub async fn friends(&mut self, params: Params) -> Result<Option<Value>> {
        self.call("friends", params).await
    }

    /// Users following the authenticated user.
    pub async fn followers(&mut self, params: Params) -> Result<Option<Value>> {
        self.call("followers", params).await
    }

    // statuses, users

    /// Show a single status or user by id.
    pub async fn show(&mut self, id: impl ToString) -> Result<Option<Value>> {
        self.call("show", Params::new().with("id", id)).await
    }

    // friends

    /// Ids of the users someone follows.
    pub async fn ids(&mut self, params: Params) -> Result<Option<Value>> {
        self.call("ids", params).await
    }
}
