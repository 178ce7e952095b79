//! HTTP proxy backend.
//!
//! Speaks the YT HTTP API v4. Command parameters travel as JSON in the
//! `X-YT-Parameters` header, payloads are JSON with `encode_utf8=false` so
//! non-ASCII names survive unchanged.

use crate::error::{Error, Result};
use crate::store::ObjectStore;
use crate::types::{Attributes, ObjectType};
use crate::ypath::YPath;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Format descriptor sent in `X-YT-Input-Format` / `X-YT-Output-Format`.
const JSON_FORMAT: &str = r#"{"$value":"json","$attributes":{"encode_utf8":false}}"#;

/// Connection settings for [`HttpStore`].
#[derive(Debug, Clone, Default)]
pub struct HttpStoreConfig {
    /// Proxy host, without scheme (`hahn.yt.example.net`).
    pub cluster: String,
    /// OAuth token.
    pub token: Option<String>,
    /// Use `https://`.
    pub use_tls: bool,
    /// Extra PEM bundle trusted for TLS.
    pub ca_certificate: Option<Vec<u8>>,
    /// Global timeout per request.
    pub timeout: Option<Duration>,
}

impl HttpStoreConfig {
    /// Build a config from a cluster address, honouring an explicit scheme.
    ///
    /// `https://proxy` turns TLS on; `http://proxy` and a bare host leave it
    /// as `use_tls` says.
    pub fn from_cluster(cluster: &str, use_tls: bool) -> Self {
        let (host, tls) = if let Some(host) = cluster.strip_prefix("https://") {
            (host, true)
        } else if let Some(host) = cluster.strip_prefix("http://") {
            (host, use_tls)
        } else {
            (cluster, use_tls)
        };
        Self {
            cluster: host.trim_end_matches('/').to_string(),
            use_tls: tls,
            ..Self::default()
        }
    }

    fn base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{scheme}://{}/api/v4", self.cluster)
    }
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Put,
    Post,
}

/// Object store backed by a YT HTTP proxy.
pub struct HttpStore {
    agent: ureq::Agent,
    base_url: String,
    token: Option<String>,
}

impl HttpStore {
    /// Create a store for the given proxy.
    pub fn new(config: &HttpStoreConfig) -> Result<Self> {
        let mut builder = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(config.timeout);

        if let Some(pem) = &config.ca_certificate {
            let certs = ureq::tls::parse_pem(pem)
                .filter_map(|item| match item {
                    Ok(ureq::tls::PemItem::Certificate(cert)) => Some(Ok(cert.to_owned())),
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            if certs.is_empty() {
                return Err(Error::Transport(
                    "CA bundle contains no certificates".to_string(),
                ));
            }
            let tls = ureq::tls::TlsConfig::builder()
                .root_certs(ureq::tls::RootCerts::Specific(Arc::new(certs)))
                .build();
            builder = builder.tls_config(tls);
        }

        let agent: ureq::Agent = builder.build().into();
        Ok(Self {
            agent,
            base_url: config.base_url(),
            token: config.token.clone(),
        })
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run one API command and return its decoded output.
    fn execute(
        &self,
        method: Method,
        command: &str,
        params: &Value,
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{}/{command}", self.base_url);
        let params = params.to_string();
        let auth = self.token.as_ref().map(|t| format!("OAuth {t}"));
        log::debug!("{command} {params}");

        let response = match method {
            Method::Get => {
                let mut request = self
                    .agent
                    .get(&url)
                    .header("X-YT-Header-Format", "json")
                    .header("X-YT-Parameters", &params)
                    .header("X-YT-Output-Format", JSON_FORMAT);
                if let Some(auth) = &auth {
                    request = request.header("Authorization", auth);
                }
                request.call()
            }
            Method::Put | Method::Post => {
                let mut request = match method {
                    Method::Put => self.agent.put(&url),
                    _ => self.agent.post(&url),
                }
                .header("X-YT-Header-Format", "json")
                .header("X-YT-Parameters", &params)
                .header("X-YT-Output-Format", JSON_FORMAT);
                if let Some(auth) = &auth {
                    request = request.header("Authorization", auth);
                }
                match body {
                    Some(body) => request
                        .header("X-YT-Input-Format", JSON_FORMAT)
                        .header("Content-Type", "application/json")
                        .send(body.to_string()),
                    None => request.send_empty(),
                }
            }
        };

        let mut response = response?;
        let status = response.status().as_u16();
        let text = response.body_mut().read_to_string()?;

        if !(200..300).contains(&status) {
            return Err(Error::from_response(status, &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        let value: Value = serde_json::from_str(&text)?;
        Ok(unwrap_value(value))
    }
}

/// Strip the `{"value": ..}` envelope API v4 puts around results.
fn unwrap_value(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("value") => {
            map.remove("value").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Pull the created id out of a `create` response.
fn created_id(value: &Value) -> Result<String> {
    let id = match value {
        Value::String(id) => Some(id.as_str()),
        Value::Object(map) => map
            .get("node_id")
            .or_else(|| map.get("object_id"))
            .and_then(Value::as_str),
        _ => None,
    };
    id.map(str::to_string)
        .ok_or_else(|| Error::InvalidResponse(format!("create returned no id: {value}")))
}

impl ObjectStore for HttpStore {
    fn create_object(&self, kind: ObjectType, attributes: &Attributes) -> Result<String> {
        let params = json!({
            "type": kind.as_str(),
            "attributes": attributes,
        });
        let value = self.execute(Method::Post, "create", &params, None)?;
        created_id(&value)
    }

    fn create_node(
        &self,
        path: &YPath,
        kind: ObjectType,
        attributes: &Attributes,
    ) -> Result<String> {
        let params = json!({
            "path": path.as_str(),
            "type": kind.as_str(),
            "attributes": attributes,
        });
        let value = self.execute(Method::Post, "create", &params, None)?;
        created_id(&value)
    }

    fn get_node(&self, path: &YPath) -> Result<Value> {
        self.execute(Method::Get, "get", &json!({ "path": path.as_str() }), None)
    }

    fn set_node(&self, path: &YPath, value: &Value) -> Result<()> {
        self.execute(
            Method::Put,
            "set",
            &json!({ "path": path.as_str() }),
            Some(value),
        )?;
        Ok(())
    }

    fn remove_node(&self, path: &YPath) -> Result<()> {
        self.execute(Method::Post, "remove", &json!({ "path": path.as_str() }), None)?;
        Ok(())
    }

    fn list_node(&self, path: &YPath) -> Result<Vec<String>> {
        let value = self.execute(Method::Get, "list", &json!({ "path": path.as_str() }), None)?;
        match value {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(name) => Some(name),
                    Value::Object(mut map) => map.remove("$value").and_then(|v| match v {
                        Value::String(name) => Some(name),
                        _ => None,
                    }),
                    _ => None,
                })
                .collect()),
            other => Err(Error::InvalidResponse(format!(
                "list {path} returned {other}"
            ))),
        }
    }

    fn node_exists(&self, path: &YPath) -> Result<bool> {
        let value = self.execute(Method::Get, "exists", &json!({ "path": path.as_str() }), None)?;
        value
            .as_bool()
            .ok_or_else(|| Error::InvalidResponse(format!("exists {path} returned {value}")))
    }

    fn add_member(&self, group: &str, member: &str) -> Result<()> {
        let params = json!({ "group": group, "member": member });
        self.execute(Method::Post, "add_member", &params, None)?;
        Ok(())
    }

    fn remove_member(&self, group: &str, member: &str) -> Result<()> {
        let params = json!({ "group": group, "member": member });
        self.execute(Method::Post, "remove_member", &params, None)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cluster_strips_scheme() {
        let config = HttpStoreConfig::from_cluster("https://hahn.yt.example.net/", false);
        assert_eq!(config.cluster, "hahn.yt.example.net");
        assert!(config.use_tls);
        assert_eq!(config.base_url(), "https://hahn.yt.example.net/api/v4");

        let config = HttpStoreConfig::from_cluster("http://localhost:8000", false);
        assert_eq!(config.cluster, "localhost:8000");
        assert!(!config.use_tls);

        let config = HttpStoreConfig::from_cluster("proxy", true);
        assert_eq!(config.base_url(), "https://proxy/api/v4");
    }

    #[test]
    fn test_unwrap_value() {
        assert_eq!(unwrap_value(json!({"value": true})), json!(true));
        assert_eq!(
            unwrap_value(json!({"value": 1, "other": 2})),
            json!({"value": 1, "other": 2})
        );
        assert_eq!(unwrap_value(json!([1, 2])), json!([1, 2]));
    }

    #[test]
    fn test_created_id() {
        assert_eq!(created_id(&json!({"node_id": "1-2-3-4"})).unwrap(), "1-2-3-4");
        assert_eq!(created_id(&json!({"object_id": "5-6"})).unwrap(), "5-6");
        assert_eq!(created_id(&json!("7-8")).unwrap(), "7-8");
        assert!(created_id(&json!({})).is_err());
    }

    #[test]
    fn test_store_base_url() {
        let store = HttpStore::new(&HttpStoreConfig::from_cluster("localhost:8000", false)).unwrap();
        assert_eq!(store.base_url(), "http://localhost:8000/api/v4");
    }
}
