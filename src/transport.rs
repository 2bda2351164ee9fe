use std::io::Read;
use std::time::Duration;

use tracing::debug;
use ureq::{Agent, AgentBuilder};

use crate::element::{OverpassResponse, RawElement};
use crate::error::{Error, Result};

/// Client-side ceiling, generous compared to the query's own `timeout:`
/// hint so the server always gives up first.
const AGENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Synchronous Overpass API client. One request per fetch, no retries,
/// no caching.
pub struct OverpassClient {
    endpoint: String,
    agent: Agent,
}

impl OverpassClient {
    pub fn new(endpoint: &str) -> OverpassClient {
        let agent = AgentBuilder::new().timeout(AGENT_TIMEOUT).build();
        OverpassClient {
            endpoint: endpoint.to_string(),
            agent,
        }
    }

    /// Execute one query as a single request/response exchange and return
    /// the raw element graph.
    pub fn fetch(&self, query: &str) -> Result<Vec<RawElement>> {
        debug!(endpoint = %self.endpoint, query_bytes = query.len(), "posting overpass query");
        let response = match self.agent.post(&self.endpoint).send_form(&[("data", query)]) {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                let snippet: String = body.chars().take(200).collect();
                return Err(Error::Transport {
                    url: self.endpoint.clone(),
                    reason: format!("HTTP {code}: {snippet}"),
                });
            }
            Err(error) => {
                return Err(Error::Transport {
                    url: self.endpoint.clone(),
                    reason: error.to_string(),
                });
            }
        };

        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|error| Error::Transport {
                url: self.endpoint.clone(),
                reason: format!("response read failed: {error}"),
            })?;

        let parsed: OverpassResponse = serde_json::from_str(&body)?;
        debug!(elements = parsed.elements.len(), "overpass response parsed");
        Ok(parsed.elements)
    }
}
