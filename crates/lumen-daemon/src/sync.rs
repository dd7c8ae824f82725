//! State synchronization with devices over HTTP
//!
//! Pulls read the full `/state` snapshot of a device and fold it into the
//! session's lights. Pushes send a single-light delta and never report
//! device-side failures back to the caller.

use lumen_core::{StateReport, StatusPacket};
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{CommunicationError, SessionError};
use crate::session::{DeviceSession, LoginTicket};

/// HTTP client for device `/state` endpoints
#[derive(Debug, Clone)]
pub struct StateSynchronizer {
    client: reqwest::Client,
    port: u16,
}

impl StateSynchronizer {
    pub fn new(port: u16, timeout: Duration) -> Result<Self, CommunicationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, port })
    }

    fn state_url(&self, ip: Ipv4Addr) -> String {
        if self.port == 80 {
            format!("http://{ip}/state")
        } else {
            format!("http://{ip}:{}/state", self.port)
        }
    }

    /// Read the full state snapshot of a device
    pub async fn fetch_snapshot(&self, ip: Ipv4Addr) -> Result<StateReport, CommunicationError> {
        let response = self
            .client
            .get(self.state_url(ip))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CommunicationError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        Ok(StateReport::from_slice(&body)?)
    }

    /// Send a single-light delta and wait for the device to answer
    pub async fn send_delta(
        &self,
        ip: Ipv4Addr,
        light: usize,
        packet: &StatusPacket,
    ) -> Result<(), CommunicationError> {
        let response = self
            .client
            .put(self.state_url(ip))
            .json(&packet.to_wire(light))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CommunicationError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    /// Pull the device state into the session.
    ///
    /// Returns whether every light reported every field. Fields that did
    /// arrive are applied even when others are missing.
    pub async fn pull(&self, session: &DeviceSession, ticket: LoginTicket) -> bool {
        match self.fetch_snapshot(ticket.ip).await {
            Ok(report) => session.apply_report(ticket, &report).await,
            Err(e) => {
                warn!(mac = %session.mac(), ip = %ticket.ip, error = %e, "State pull failed");
                false
            }
        }
    }

    /// Push a delta for one light without waiting for the device.
    ///
    /// Fails immediately, with no request sent, when the session is logged
    /// out. The local light state is updated before the request goes out.
    pub async fn push(
        &self,
        session: &DeviceSession,
        light: usize,
        packet: StatusPacket,
    ) -> Result<(), SessionError> {
        let ip = session.prepare_push(light, &packet).await?;
        let mac = session.mac().to_string();
        let sync = self.clone();

        tokio::spawn(async move {
            match sync.send_delta(ip, light, &packet).await {
                Ok(()) => debug!(mac = %mac, light, "Pushed light state"),
                Err(e) => warn!(mac = %mac, ip = %ip, light, error = %e, "State push failed"),
            }
        });

        Ok(())
    }
}
