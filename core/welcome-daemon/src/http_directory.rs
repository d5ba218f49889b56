//! Blocking HTTP client for the Welcome directory service.

use std::io::Read;
use std::time::Duration;

use welcome_core::{DirectorySource, Result, WelcomeError};
use welcome_protocol::{ConnectedPersonRaw, HomeRaw, PersonRaw, RecordError, RoleRaw};

const MAX_BODY_BYTES: u64 = 8 * 1024 * 1024;

pub struct HttpDirectory {
    agent: ureq::Agent,
    server_url: String,
}

impl HttpDirectory {
    pub fn new(server_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .user_agent(concat!("welcome-daemon/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            server_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    fn get(&self, path: &str, source_name: &str) -> Result<Vec<u8>> {
        let url = format!("{}{}", self.server_url, path);
        let response = match self.agent.get(&url).set("Accept", "application/json").call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(WelcomeError::directory(
                    source_name,
                    format!("GET {} returned http status {}", url, code),
                ))
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(WelcomeError::directory(
                    source_name,
                    format!("GET {} transport error: {}", url, transport),
                ))
            }
        };

        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_BODY_BYTES)
            .read_to_end(&mut body)
            .map_err(|err| {
                WelcomeError::directory(source_name, format!("failed to read body: {}", err))
            })?;
        tracing::trace!(url = %url, bytes = body.len(), "Directory response");
        Ok(body)
    }
}

fn decode_error(source_name: &str) -> impl Fn(RecordError) -> WelcomeError + '_ {
    move |err| WelcomeError::directory(source_name, err.to_string())
}

impl DirectorySource for HttpDirectory {
    fn fetch_people(&self) -> Result<Vec<PersonRaw>> {
        let body = self.get("/api/people", "people")?;
        welcome_protocol::parse_people(&body).map_err(decode_error("people"))
    }

    fn fetch_roles(&self) -> Result<Vec<RoleRaw>> {
        let body = self.get("/api/roles", "roles")?;
        welcome_protocol::parse_roles(&body).map_err(decode_error("roles"))
    }

    fn fetch_home(&self, home_id: &str) -> Result<HomeRaw> {
        let body = self.get(&format!("/api/homes/{}", home_id), "rooms")?;
        welcome_protocol::parse_home(&body).map_err(decode_error("rooms"))
    }

    fn fetch_presence(&self, home_id: &str) -> Result<Vec<ConnectedPersonRaw>> {
        let body = self.get(&format!("/api/homes/{}/people", home_id), "presence")?;
        welcome_protocol::parse_presence(&body).map_err(decode_error("presence"))
    }
}
