//! Sonos speaker control over UPnP SOAP.

use crate::device::{CurrentTrack, DeviceConnector, PlaybackDevice};
use anyhow::{Context, Result};
use async_trait::async_trait;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

/// Port every Sonos player serves UPnP on
pub const SONOS_PORT: u16 = 1400;

const DEVICE_DESCRIPTION_PATH: &str = "/xml/device_description.xml";

struct Service {
    control_path: &'static str,
    urn: &'static str,
}

const AV_TRANSPORT: Service = Service {
    control_path: "/MediaRenderer/AVTransport/Control",
    urn: "urn:schemas-upnp-org:service:AVTransport:1",
};

const ZONE_GROUP_TOPOLOGY: Service = Service {
    control_path: "/ZoneGroupTopology/Control",
    urn: "urn:schemas-upnp-org:service:ZoneGroupTopology:1",
};

#[derive(Debug, Error)]
pub enum SonosError {
    #[error("{action} failed with UPnP error {code}")]
    Fault { action: &'static str, code: String },

    #[error("{action} failed with HTTP {status}")]
    Http {
        action: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("{action} response has no {field}")]
    MissingField {
        action: &'static str,
        field: &'static str,
    },
}

/// One Sonos player, addressed by its base URL (`http://<host>:1400`)
pub struct SonosSpeaker {
    base_url: String,
    http_client: reqwest::Client,
    /// `RINCON_...` identifier, fetched on first use
    uid: OnceCell<String>,
}

impl SonosSpeaker {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
            uid: OnceCell::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The player's unique identifier, from its device description
    pub async fn uid(&self) -> Result<&str> {
        let uid = self
            .uid
            .get_or_try_init(|| async {
                let url = format!("{}{}", self.base_url, DEVICE_DESCRIPTION_PATH);
                let response = self.http_client.get(&url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(SonosError::Http {
                        action: "DeviceDescription",
                        status,
                    }
                    .into());
                }

                let description = response.text().await?;
                let udn = first_text(&description, "UDN")?.ok_or(SonosError::MissingField {
                    action: "DeviceDescription",
                    field: "UDN",
                })?;
                Ok::<_, anyhow::Error>(udn.trim_start_matches("uuid:").to_string())
            })
            .await?;

        Ok(uid.as_str())
    }

    async fn call(&self, service: &Service, action: &'static str, arguments: &[(&str, &str)]) -> Result<String> {
        let url = format!("{}{}", self.base_url, service.control_path);
        debug!(action, url = %url, "sending UPnP request");

        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", r#"text/xml; charset="utf-8""#)
            .header("SOAPACTION", format!("\"{}#{}\"", service.urn, action))
            .body(build_soap_envelope(service.urn, action, arguments))
            .send()
            .await
            .with_context(|| format!("{} request failed", action))?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Some(code) = first_text(&body, "errorCode")? {
                return Err(SonosError::Fault { action, code }.into());
            }
            return Err(SonosError::Http { action, status }.into());
        }

        Ok(body)
    }
}

#[async_trait]
impl PlaybackDevice for SonosSpeaker {
    async fn is_coordinator(&self) -> Result<bool> {
        let uid = self.uid().await?;
        let response = self.call(&ZONE_GROUP_TOPOLOGY, "GetZoneGroupState", &[]).await?;

        let state = first_text(&response, "ZoneGroupState")?.ok_or(SonosError::MissingField {
            action: "GetZoneGroupState",
            field: "ZoneGroupState",
        })?;

        Ok(zone_group_coordinators(&state)?.iter().any(|c| c == uid))
    }

    async fn get_current_track(&self) -> Result<CurrentTrack> {
        let response = self
            .call(&AV_TRANSPORT, "GetPositionInfo", &[("InstanceID", "0"), ("Channel", "Master")])
            .await?;

        Ok(CurrentTrack {
            uri: first_text(&response, "TrackURI")?.unwrap_or_default(),
        })
    }

    async fn clear_queue(&self) -> Result<()> {
        self.call(&AV_TRANSPORT, "RemoveAllTracksFromQueue", &[("InstanceID", "0")])
            .await?;
        Ok(())
    }

    async fn enqueue(&self, uri: &str) -> Result<()> {
        self.call(
            &AV_TRANSPORT,
            "AddURIToQueue",
            &[
                ("InstanceID", "0"),
                ("EnqueuedURI", uri),
                ("EnqueuedURIMetaData", ""),
                ("DesiredFirstTrackNumberEnqueued", "0"),
                ("EnqueueAsNext", "0"),
            ],
        )
        .await?;
        Ok(())
    }

    async fn play_from_queue(&self, index: usize, start: bool) -> Result<()> {
        let queue_uri = format!("x-rincon-queue:{}#0", self.uid().await?);
        self.call(
            &AV_TRANSPORT,
            "SetAVTransportURI",
            &[
                ("InstanceID", "0"),
                ("CurrentURI", queue_uri.as_str()),
                ("CurrentURIMetaData", ""),
            ],
        )
        .await?;

        // Sonos numbers queue tracks from 1
        let track = (index + 1).to_string();
        self.call(
            &AV_TRANSPORT,
            "Seek",
            &[("InstanceID", "0"), ("Unit", "TRACK_NR"), ("Target", track.as_str())],
        )
        .await?;

        if start {
            self.call(&AV_TRANSPORT, "Play", &[("InstanceID", "0"), ("Speed", "1")])
                .await?;
        }
        Ok(())
    }
}

/// Creates a new [`SonosSpeaker`] for the same address on every call
pub struct SonosConnector {
    base_url: String,
    timeout: Duration,
}

impl SonosConnector {
    /// `address` is a host (port 1400 implied) or a full base URL
    pub fn new(address: &str, timeout: Duration) -> Self {
        let base_url = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{}:{}", address, SONOS_PORT)
        };
        Self { base_url, timeout }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl DeviceConnector for SonosConnector {
    async fn connect(&self) -> Result<Box<dyn PlaybackDevice>> {
        Ok(Box::new(SonosSpeaker::new(self.base_url.clone(), self.timeout)?))
    }
}

fn build_soap_envelope(urn: &str, action: &str, arguments: &[(&str, &str)]) -> String {
    let arguments: String = arguments
        .iter()
        .map(|(name, value)| format!("<{name}>{}</{name}>", escape(*value)))
        .collect();

    format!(
        r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
  <s:Body>
    <u:{action} xmlns:u="{urn}">{arguments}</u:{action}>
  </s:Body>
</s:Envelope>"#
    )
}

/// Text content of the first element named `name` (namespace ignored)
fn first_text(xml: &str, name: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(xml);
    let mut text: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == name.as_bytes() => text = Some(String::new()),
            Event::Empty(e) if e.local_name().as_ref() == name.as_bytes() => return Ok(Some(String::new())),
            Event::Text(t) => {
                if let Some(text) = text.as_mut() {
                    text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(text) = text.as_mut() {
                    text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(e) if text.is_some() && e.local_name().as_ref() == name.as_bytes() => return Ok(text),
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// `Coordinator` attribute of every `ZoneGroup` in a zone group state document
fn zone_group_coordinators(state: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(state);
    let mut coordinators = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"ZoneGroup" => {
                for attribute in e.attributes() {
                    let attribute = attribute?;
                    if attribute.key.local_name().as_ref() == b"Coordinator" {
                        coordinators.push(attribute.unescape_value()?.into_owned());
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(coordinators)
}
