//! Management API over HTTP
//!
//! Blocking `ureq` client against `/manage/v2` with basic authentication.
//! A 404 on a properties endpoint means the entity does not exist; any other
//! non-2xx status is a failure carrying the status and response body.

use crate::config::Connection;
use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reconcile::{Action, Target, Transport, Verb};
use serde_json::{Map, Value};
use ureq::Agent;
use ureq::http::Response;
use urlencoding::encode;

/// Errors from the management API
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("HTTP {status} from {method} {url}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: ureq::Error,
    },
}

pub struct HttpTransport {
    agent: Agent,
    base: String,
    authorization: String,
}

impl HttpTransport {
    pub fn new(connection: &Connection) -> Self {
        let config = Agent::config_builder().http_status_as_error(false).build();
        let credentials = BASE64.encode(format!("{}:{}", connection.user, connection.password));
        Self {
            agent: Agent::new_with_config(config),
            base: format!("{}/manage/v2", connection.base_url()),
            authorization: format!("Basic {credentials}"),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn get(&self, path: &str) -> Result<Option<Value>> {
        let url = self.url(path);
        log::trace!("GET {url}");
        let response = self
            .agent
            .get(&url)
            .header("Authorization", &self.authorization)
            .header("Accept", "application/json")
            .call()
            .map_err(|source| HttpError::Request {
                url: url.clone(),
                source,
            })?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let mut response = check("GET", &url, response)?;
        let body = response
            .body_mut()
            .read_json::<Value>()
            .with_context(|| format!("Invalid JSON from {url}"))?;
        Ok(Some(body))
    }

    fn send(&self, method: &'static str, path: &str, payload: &Value) -> Result<()> {
        let url = self.url(path);
        log::debug!("{method} {url} {payload}");
        let request = match method {
            "PUT" => self.agent.put(&url),
            _ => self.agent.post(&url),
        };
        let response = request
            .header("Authorization", &self.authorization)
            .header("Accept", "application/json")
            .send_json(payload)
            .map_err(|source| HttpError::Request {
                url: url.clone(),
                source,
            })?;
        check(method, &url, response)?;
        Ok(())
    }

    fn send_form(&self, path: &str, form: &[(&str, &str)]) -> Result<()> {
        let url = self.url(path);
        log::debug!("POST {url} {form:?}");
        let response = self
            .agent
            .post(&url)
            .header("Authorization", &self.authorization)
            .send_form(form.iter().copied())
            .map_err(|source| HttpError::Request {
                url: url.clone(),
                source,
            })?;
        check("POST", &url, response)?;
        Ok(())
    }
}

fn check(
    method: &'static str,
    url: &str,
    mut response: Response<ureq::Body>,
) -> Result<Response<ureq::Body>> {
    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        return Ok(response);
    }
    let body = response.body_mut().read_to_string().unwrap_or_default();
    Err(HttpError::Status {
        method,
        url: url.to_string(),
        status,
        body: body.trim().to_string(),
    }
    .into())
}

/// Properties path of an entity
fn properties_path(target: &Target) -> String {
    match target {
        Target::Database { name } => {
            format!("/databases/{}/properties?format=json", encode(name))
        }
        Target::Forest { name, .. } => {
            format!("/forests/{}/properties?format=json", encode(name))
        }
        Target::Server { name, group } => format!(
            "/servers/{}/properties?group-id={}&format=json",
            encode(name),
            encode(group)
        ),
    }
}

/// Forest names from a forest list response
fn forest_names(list: &Value) -> Vec<String> {
    let items = &list["forest-default-list"]["list-items"]["list-item"];
    items
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["nameref"].as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl Transport for HttpTransport {
    fn fetch(&self, target: &Target) -> Result<Option<Map<String, Value>>> {
        match self.get(&properties_path(target))? {
            None => Ok(None),
            Some(Value::Object(props)) => Ok(Some(props)),
            Some(other) => anyhow::bail!("Unexpected properties of {target}: {other}"),
        }
    }

    fn fetch_forest_catalog(&self) -> Result<Vec<String>> {
        let list = self
            .get("/forests?format=json")?
            .context("Forest list endpoint not found")?;
        Ok(forest_names(&list))
    }

    fn apply(&self, action: &Action) -> Result<()> {
        let payload = &action.payload;
        match (&action.verb, &action.target) {
            (Verb::CreateDatabase, Target::Database { .. }) => {
                self.send("POST", "/databases", payload)
            }
            (Verb::CreateForest, Target::Forest { .. }) => self.send("POST", "/forests", payload),
            (Verb::AttachForest, Target::Forest { name, database }) => self.send_form(
                &format!("/forests/{}", encode(name)),
                &[("state", "attach"), ("database", database)],
            ),
            (Verb::DetachForest, Target::Forest { name, database }) => self.send_form(
                &format!("/forests/{}", encode(name)),
                &[("state", "detach"), ("database", database)],
            ),
            (Verb::CreateServer, Target::Server { group, .. }) => {
                self.send("POST", &format!("/servers?group-id={}", encode(group)), payload)
            }
            (Verb::UpdateDatabaseProperty, Target::Database { name }) => self.send(
                "PUT",
                &format!("/databases/{}/properties", encode(name)),
                payload,
            ),
            (Verb::UpdateServerProperty, Target::Server { name, group }) => self.send(
                "PUT",
                &format!("/servers/{}/properties?group-id={}", encode(name), encode(group)),
                payload,
            ),
            (verb, target) => anyhow::bail!("{verb} cannot target {target}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_properties_paths() {
        assert_eq!(
            properties_path(&Target::database("shop-content")),
            "/databases/shop-content/properties?format=json"
        );
        assert_eq!(
            properties_path(&Target::server("app", "Default")),
            "/servers/app/properties?group-id=Default&format=json"
        );
    }

    #[test]
    fn test_properties_paths_are_encoded() {
        assert_eq!(
            properties_path(&Target::database("shop content")),
            "/databases/shop%20content/properties?format=json"
        );
        assert_eq!(
            properties_path(&Target::server("a&b", "Group/1")),
            "/servers/a%26b/properties?group-id=Group%2F1&format=json"
        );
    }

    #[test]
    fn test_forest_names() {
        let list = json!({"forest-default-list": {"list-items": {
            "list-item-count": {"value": 2},
            "list-item": [
                {"idref": "1", "nameref": "Documents"},
                {"idref": "2", "nameref": "shop-content-001"}
            ]
        }}});
        assert_eq!(forest_names(&list), vec!["Documents", "shop-content-001"]);
        assert!(forest_names(&json!({})).is_empty());
    }

    #[test]
    fn test_basic_authorization() {
        let transport = HttpTransport::new(&Connection {
            host: "localhost".to_string(),
            port: 8002,
            ssl: false,
            user: "admin".to_string(),
            password: "admin".to_string(),
        });
        assert_eq!(transport.authorization, "Basic YWRtaW46YWRtaW4=");
        assert_eq!(transport.url("/forests"), "http://localhost:8002/manage/v2/forests");
    }
}
