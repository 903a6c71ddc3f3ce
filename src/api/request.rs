// Request description and URL construction.
// Maps (namespace, method, params) onto `/{namespace}/{method}[/{id}].json?{params}`.

use url::Url;

use crate::error::{ApiError, Result};

use super::params::Params;

/// One API call: endpoint plus parameters, with `id` split out into the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub namespace: String,
    pub method: String,
    pub id: Option<String>,
    pub params: Params,
}

impl RequestSpec {
    /// Validate the endpoint names and lift `id` out of `params`.
    pub fn new(namespace: &str, method: &str, mut params: Params) -> Result<Self> {
        validate_identifier(namespace)?;
        validate_identifier(method)?;

        let id = params.remove("id");

        Ok(Self {
            namespace: namespace.to_string(),
            method: method.to_string(),
            id,
            params,
        })
    }

    /// Full request URL. A path prefix in `host` (`api.twitter.com/1`) is
    /// kept. Parameters also go in the query string, even though the same
    /// pairs are sent as the POST body.
    pub fn url(&self, scheme: &str, host: &str) -> Result<Url> {
        let host = host.trim_end_matches('/');
        let mut url = Url::parse(&format!("{}://{}/", scheme, host))
            .map_err(|e| ApiError::Config(format!("Invalid host {:?}: {}", host, e)))?;

        if url.cannot_be_a_base()
            || url.host().is_none()
            || url.query().is_some()
            || url.fragment().is_some()
        {
            return Err(ApiError::Config(format!("Invalid host {:?}", host)));
        }

        self.push_segments(&mut url);

        if !self.params.is_empty() {
            url.set_query(Some(&self.params.encode()));
        }

        Ok(url)
    }

    /// Parameters sent as the form body.
    pub fn form(&self) -> &Params {
        &self.params
    }

    fn push_segments(&self, url: &mut Url) {
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&self.namespace);
            match &self.id {
                Some(id) => {
                    segments.push(&self.method).push(&format!("{}.json", id));
                }
                None => {
                    segments.push(&format!("{}.json", self.method));
                }
            }
        }
    }
}

/// Namespaces and methods are plain identifiers: `[A-Za-z0-9_]+`.
pub fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(ApiError::InvalidIdentifier(name.to_string()))
    }
}
