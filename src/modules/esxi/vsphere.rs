//! Minimal vSphere Web Services (SOAP) client: enough to open a session,
//! read the service `about` block and log out again.

use super::{AboutInfo, ConnectError, Connector, Session};
use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::net::SocketAddr;
use std::time::Duration;

const SOAP_ACTION: &str = "urn:vim25";

// Probe credentials. The checker never authenticates as a real user.
const PROBE_USER: &str = "";
const PROBE_PASSWORD: &str = "";

#[derive(Debug, Default, Clone, Copy)]
pub struct VsphereConnector;

pub struct VsphereSession {
    client: Client,
    endpoint: String,
    about: Option<AboutInfo>,
    session_manager: Option<String>,
}

#[async_trait]
impl Connector for VsphereConnector {
    type Session = VsphereSession;

    async fn connect(&self, host: &str, port: u16, timeout: Duration) -> Result<VsphereSession, ConnectError> {
        let addr = resolve(host, port, timeout).await?;

        // ESXi hosts ship self-signed certificates
        tracing::debug!("TLS certificate verification disabled for {}:{}", host, port);

        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .cookie_store(true)
            .connect_timeout(timeout)
            .timeout(timeout)
            .resolve(host, addr)
            .build()
            .map_err(|e| ConnectError::Unexpected(e.to_string()))?;

        let endpoint = format!("https://{}/sdk", authority(host, port));

        let content = call(&client, &endpoint, retrieve_service_content_body()).await?;
        let about = content.about();
        let session_manager = content.text("sessionManager").map(str::to_string);

        if let Some(manager) = &session_manager {
            call(&client, &endpoint, login_body(manager, PROBE_USER, PROBE_PASSWORD)).await?;
        }

        Ok(VsphereSession {
            client,
            endpoint,
            about,
            session_manager,
        })
    }
}

#[async_trait]
impl Session for VsphereSession {
    fn about(&self) -> Option<&AboutInfo> {
        self.about.as_ref()
    }

    async fn disconnect(self) -> Result<(), ConnectError> {
        match &self.session_manager {
            Some(manager) => call(&self.client, &self.endpoint, logout_body(manager))
                .await
                .map(|_| ()),
            None => Ok(()),
        }
    }
}

async fn resolve(host: &str, port: u16, timeout: Duration) -> Result<SocketAddr, ConnectError> {
    let lookup = tokio::time::timeout(timeout, tokio::net::lookup_host((host, port)))
        .await
        .map_err(|_| ConnectError::TimedOut)?;

    lookup
        .map_err(|e| ConnectError::Resolve(e.to_string()))?
        .next()
        .ok_or_else(|| ConnectError::Resolve(format!("no addresses found for {}", host)))
}

fn authority(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

async fn call(client: &Client, endpoint: &str, body: String) -> Result<SoapDocument, ConnectError> {
    let response = client
        .post(endpoint)
        .header(CONTENT_TYPE, "text/xml; charset=utf-8")
        .header("SOAPAction", SOAP_ACTION)
        .body(body)
        .send()
        .await
        .map_err(classify)?;

    let status = response.status();
    let text = response.text().await.map_err(classify)?;

    let document = SoapDocument::parse(&text);
    if let Some(fault) = document.as_ref().ok().and_then(|doc| doc.text("faultstring")) {
        return Err(ConnectError::Fault(fault.to_string()));
    }
    if !status.is_success() {
        return Err(ConnectError::Fault(format!("HTTP {}", status)));
    }
    document.map_err(|e| ConnectError::Unexpected(format!("malformed SOAP response: {}", e)))
}

fn classify(err: reqwest::Error) -> ConnectError {
    if err.is_timeout() {
        ConnectError::TimedOut
    } else if err.is_connect() {
        ConnectError::Connection(root_cause(&err))
    } else {
        ConnectError::Unexpected(err.to_string())
    }
}

fn root_cause(err: &(dyn std::error::Error + 'static)) -> String {
    let mut current = err;
    while let Some(next) = current.source() {
        current = next;
    }
    current.to_string()
}

fn envelope(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:vim25="urn:vim25"><soapenv:Body>{}</soapenv:Body></soapenv:Envelope>"#,
        body
    )
}

fn retrieve_service_content_body() -> String {
    envelope(
        r#"<vim25:RetrieveServiceContent><vim25:_this type="ServiceInstance">ServiceInstance</vim25:_this></vim25:RetrieveServiceContent>"#,
    )
}

fn login_body(session_manager: &str, user: &str, password: &str) -> String {
    envelope(&format!(
        r#"<vim25:Login><vim25:_this type="SessionManager">{}</vim25:_this><vim25:userName>{}</vim25:userName><vim25:password>{}</vim25:password></vim25:Login>"#,
        escape(session_manager),
        escape(user),
        escape(password)
    ))
}

fn logout_body(session_manager: &str) -> String {
    envelope(&format!(
        r#"<vim25:Logout><vim25:_this type="SessionManager">{}</vim25:_this></vim25:Logout>"#,
        escape(session_manager)
    ))
}

/// Leaf elements of a SOAP response, each with the chain of local names
/// leading to it. Entities and CDATA sections are decoded.
#[derive(Debug, Default)]
struct SoapDocument {
    leaves: Vec<(Vec<String>, String)>,
}

impl SoapDocument {
    fn parse(xml: &str) -> Result<Self, quick_xml::Error> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut document = Self::default();
        let mut path: Vec<String> = Vec::new();
        let mut text = String::new();
        let mut leaf = false;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                    text.clear();
                    leaf = true;
                }
                Event::Empty(e) => {
                    let mut chain = path.clone();
                    chain.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                    document.leaves.push((chain, String::new()));
                    leaf = false;
                }
                Event::Text(e) => text.push_str(&e.unescape()?),
                Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e.into_inner())),
                Event::End(_) => {
                    if leaf {
                        document.leaves.push((path.clone(), std::mem::take(&mut text)));
                    }
                    leaf = false;
                    path.pop();
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(document)
    }

    /// Text of the first element called `name`.
    fn text(&self, name: &str) -> Option<&str> {
        self.leaves
            .iter()
            .find(|(path, _)| path.last().is_some_and(|last| last == name))
            .map(|(_, text)| text.as_str())
    }

    /// Text of the first `name` element directly inside a `parent` element.
    fn child_text(&self, parent: &str, name: &str) -> Option<&str> {
        self.leaves
            .iter()
            .find(|(path, _)| {
                path.len() >= 2 && path[path.len() - 1] == name && path[path.len() - 2] == parent
            })
            .map(|(_, text)| text.as_str())
    }

    fn about(&self) -> Option<AboutInfo> {
        let present = self
            .leaves
            .iter()
            .any(|(path, _)| path.iter().any(|segment| segment == "about"));
        if !present {
            return None;
        }
        let field = |name: &str| self.child_text("about", name).unwrap_or_default().to_string();
        Some(AboutInfo {
            full_name: field("fullName"),
            version: field("version"),
            api_version: field("apiVersion"),
        })
    }
}
