//! Per-device session state machine and heartbeat
//!
//! A session starts logged out. A successful login records the device IP and
//! starts a heartbeat schedule that pulls the device state once per period.
//! Three consecutive failed pulls log the device out again. Each tick spawns
//! its own pull, so a slow pull never delays the schedule and logout never
//! cancels a pull already in flight. Late pulls are discarded unless the
//! session is still logged in under the same login generation.

use chrono::{DateTime, Utc};
use lumen_core::{Accessory, DeviceConfig, LightState, StateReport, StatusPacket};
use serde::Serialize;
use std::net::Ipv4Addr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CommunicationError, SessionError};
use crate::sync::StateSynchronizer;

/// Consecutive failed pulls that force a logout
pub const MAX_MISSED_BEATS: u32 = 3;

/// Identifies one logged-in period of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginTicket {
    pub ip: Ipv4Addr,
    pub generation: u64,
}

#[derive(Debug, Default)]
struct SessionInner {
    ip: Option<Ipv4Addr>,
    authenticated: bool,
    missed_beats: u32,
    generation: u64,
    heartbeat: Option<JoinHandle<()>>,
    lights: Vec<LightState>,
    logged_in_at: Option<DateTime<Utc>>,
    last_heartbeat: Option<DateTime<Utc>>,
}

impl SessionInner {
    fn ticket(&self) -> Option<LoginTicket> {
        match (self.authenticated, self.ip) {
            (true, Some(ip)) => Some(LoginTicket {
                ip,
                generation: self.generation,
            }),
            _ => None,
        }
    }

    fn is_current(&self, ticket: LoginTicket) -> bool {
        self.ticket() == Some(ticket)
    }
}

/// Snapshot of a session for the accessory API
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub mac: String,
    pub name: String,
    pub ip: Option<Ipv4Addr>,
    pub logged_in: bool,
    pub missed_heartbeats: u32,
    pub heartbeat_running: bool,
    pub generation: u64,
    pub logged_in_at: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Present only while logged in
    pub lights: Option<Vec<LightStatus>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LightStatus {
    pub light: usize,
    pub accessory: Uuid,
    #[serde(flatten)]
    pub state: LightState,
}

/// Live session for one configured device
pub struct DeviceSession {
    config: DeviceConfig,
    accessories: Vec<Accessory>,
    sync: StateSynchronizer,
    period: Duration,
    inner: Mutex<SessionInner>,
}

impl DeviceSession {
    /// Create a logged-out session controlling the given accessories
    pub fn new(
        config: DeviceConfig,
        accessories: Vec<Accessory>,
        sync: StateSynchronizer,
        period: Duration,
    ) -> Result<Arc<Self>, SessionError> {
        if accessories.is_empty() {
            return Err(SessionError::NoLights(config.mac));
        }

        let inner = SessionInner {
            lights: vec![LightState::default(); accessories.len()],
            ..Default::default()
        };

        Ok(Arc::new(Self {
            config,
            accessories,
            sync,
            period,
            inner: Mutex::new(inner),
        }))
    }

    pub fn mac(&self) -> &str {
        &self.config.mac
    }

    pub fn accessories(&self) -> &[Accessory] {
        &self.accessories
    }

    pub fn has_light(&self, light: usize) -> bool {
        self.position(light).is_some()
    }

    fn position(&self, light: usize) -> Option<usize> {
        self.accessories.iter().position(|a| a.light == light)
    }

    pub async fn is_logged_in(&self) -> bool {
        self.inner.lock().await.authenticated
    }

    /// Current login, if any
    pub async fn ticket(&self) -> Option<LoginTicket> {
        self.inner.lock().await.ticket()
    }

    /// Log the device in from `ip`.
    ///
    /// A repeated login while already logged in changes nothing, neither the
    /// recorded IP nor the running schedule.
    pub async fn login(self: &Arc<Self>, ip: Ipv4Addr) {
        let mut inner = self.inner.lock().await;
        if inner.authenticated {
            debug!(mac = %self.mac(), ip = %ip, "Device was already logged in");
            return;
        }

        inner.authenticated = true;
        inner.ip = Some(ip);
        inner.missed_beats = 0;
        inner.generation += 1;
        inner.logged_in_at = Some(Utc::now());
        inner.heartbeat = Some(self.spawn_heartbeat());

        info!(
            mac = %self.mac(),
            ip = %ip,
            lights = self.accessories.len(),
            "Device logged in"
        );
    }

    /// Log the device out and stop its heartbeat schedule
    pub async fn logout(&self) {
        let mut inner = self.inner.lock().await;
        if inner.authenticated {
            self.logout_locked(&mut inner);
        }
    }

    fn logout_locked(&self, inner: &mut SessionInner) {
        inner.authenticated = false;
        inner.ip = None;
        inner.missed_beats = 0;
        if let Some(handle) = inner.heartbeat.take() {
            handle.abort();
        }
        debug!(mac = %self.mac(), "Heartbeat schedule stopped");
        info!(mac = %self.mac(), "Device logged out");
    }

    fn spawn_heartbeat(self: &Arc<Self>) -> JoinHandle<()> {
        let session: Weak<Self> = Arc::downgrade(self);
        let period = self.period;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let Some(session) = session.upgrade() else {
                    break;
                };
                tokio::spawn(async move {
                    session.heartbeat().await;
                });
            }
        })
    }

    /// Run one heartbeat: pull the device state and account for liveness
    pub async fn heartbeat(&self) {
        let Some(ticket) = self.ticket().await else {
            return;
        };
        let success = self.sync.pull(self, ticket).await;
        self.record_heartbeat(ticket, success).await;
    }

    /// Count a pull result toward the missed-beat limit
    pub async fn record_heartbeat(&self, ticket: LoginTicket, success: bool) {
        let mut inner = self.inner.lock().await;
        if !inner.is_current(ticket) {
            debug!(mac = %self.mac(), "Ignoring heartbeat from a previous login");
            return;
        }

        if success {
            inner.missed_beats = 0;
            inner.last_heartbeat = Some(Utc::now());
            return;
        }

        inner.missed_beats += 1;
        debug!(mac = %self.mac(), missed = inner.missed_beats, "Device missed a heartbeat");

        if inner.missed_beats >= MAX_MISSED_BEATS {
            warn!(mac = %self.mac(), "Device timed out, logging out");
            self.logout_locked(&mut inner);
        }
    }

    /// Fold a pulled snapshot into the lights.
    ///
    /// Returns false when the login changed since the pull started or when
    /// any light is missing a field. Present fields are applied either way.
    pub async fn apply_report(&self, ticket: LoginTicket, report: &StateReport) -> bool {
        let mut inner = self.inner.lock().await;
        if !inner.is_current(ticket) {
            debug!(mac = %self.mac(), "Discarding state pulled under a previous login");
            return false;
        }

        let mut complete = true;
        for (accessory, state) in self.accessories.iter().zip(inner.lights.iter_mut()) {
            match report.light(accessory.light) {
                Some(fields) => {
                    complete &= fields.is_complete();
                    state.merge_report(fields);
                }
                None => complete = false,
            }
        }

        if !complete {
            warn!(mac = %self.mac(), "Pulled state is missing fields");
        }
        complete
    }

    /// Last known state of a light; unavailable while logged out
    pub async fn light_state(&self, light: usize) -> Result<LightState, SessionError> {
        let position = self.position(light).ok_or(SessionError::UnknownLight(light))?;
        let inner = self.inner.lock().await;
        if !inner.authenticated {
            return Err(CommunicationError::Unavailable(self.mac().to_string()).into());
        }
        Ok(inner.lights[position])
    }

    /// Apply a delta locally and push it to the device
    pub async fn set_light(&self, light: usize, packet: StatusPacket) -> Result<(), SessionError> {
        self.sync.push(self, light, packet).await
    }

    /// Check a push may go out, update the light optimistically, and return
    /// the device address
    pub async fn prepare_push(
        &self,
        light: usize,
        packet: &StatusPacket,
    ) -> Result<Ipv4Addr, SessionError> {
        let position = self.position(light).ok_or(SessionError::UnknownLight(light))?;
        let mut inner = self.inner.lock().await;
        let ticket = inner
            .ticket()
            .ok_or_else(|| CommunicationError::Unavailable(self.mac().to_string()))?;
        inner.lights[position].apply_packet(packet);
        Ok(ticket.ip)
    }

    pub async fn status(&self) -> SessionStatus {
        let inner = self.inner.lock().await;
        let lights = inner.authenticated.then(|| {
            self.accessories
                .iter()
                .zip(inner.lights.iter())
                .map(|(accessory, state)| LightStatus {
                    light: accessory.light,
                    accessory: accessory.id,
                    state: *state,
                })
                .collect()
        });

        SessionStatus {
            mac: self.config.mac.clone(),
            name: self.config.n.clone(),
            ip: inner.ip,
            logged_in: inner.authenticated,
            missed_heartbeats: inner.missed_beats,
            heartbeat_running: inner
                .heartbeat
                .as_ref()
                .is_some_and(|h| !h.is_finished()),
            generation: inner.generation,
            logged_in_at: inner.logged_in_at,
            last_heartbeat: inner.last_heartbeat,
            lights,
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.get_mut().heartbeat.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{accessories_for, device_config, FakeDevice};
    use serde_json::json;

    const IDLE: Duration = Duration::from_secs(3600);

    fn session(device: &FakeDevice, lights: usize, period: Duration) -> Arc<DeviceSession> {
        let config = device_config("AA:BB", lights);
        let accessories = accessories_for(&config);
        DeviceSession::new(config, accessories, device.synchronizer(), period).unwrap()
    }

    fn full_light() -> serde_json::Value {
        json!({"on": true, "bri": 50.4, "hue": 10, "sat": 0, "ct": 200})
    }

    #[tokio::test]
    async fn test_new_requires_lights() {
        let device = FakeDevice::start(json!({})).await;
        let err = DeviceSession::new(
            device_config("AA:BB", 0),
            Vec::new(),
            device.synchronizer(),
            IDLE,
        )
        .err()
        .unwrap();
        assert!(matches!(err, SessionError::NoLights(mac) if mac == "AA:BB"));
    }

    #[tokio::test]
    async fn test_login_starts_one_schedule() {
        let device = FakeDevice::start(json!({})).await;
        let session = session(&device, 0, IDLE);
        assert!(!session.is_logged_in().await);
        assert!(!session.status().await.heartbeat_running);

        session.login(Ipv4Addr::LOCALHOST).await;
        session.login(Ipv4Addr::new(10, 0, 0, 9)).await;

        let status = session.status().await;
        assert!(status.logged_in);
        assert_eq!(status.generation, 1);
        assert_eq!(status.ip, Some(Ipv4Addr::LOCALHOST));
        assert!(status.heartbeat_running);
        session.logout().await;
    }

    #[tokio::test]
    async fn test_repeated_login_keeps_single_schedule() {
        let device = FakeDevice::start(json!({"0": full_light()})).await;
        let session = session(&device, 0, Duration::from_millis(50));

        session.login(Ipv4Addr::LOCALHOST).await;
        session.login(Ipv4Addr::LOCALHOST).await;
        session.login(Ipv4Addr::LOCALHOST).await;
        tokio::time::sleep(Duration::from_millis(275)).await;
        session.logout().await;

        // One schedule ticks five times here; a second would double it.
        let gets = device.gets();
        assert!((3..=7).contains(&gets), "saw {gets} pulls");
        assert_eq!(session.status().await.generation, 1);
    }

    #[tokio::test]
    async fn test_pull_rounds_reported_values() {
        let device = FakeDevice::start(json!({"0": full_light()})).await;
        let session = session(&device, 0, IDLE);
        session.login(Ipv4Addr::LOCALHOST).await;

        session.heartbeat().await;

        assert_eq!(
            session.light_state(1).await.unwrap(),
            LightState {
                on: true,
                brightness: 50,
                hue: 10,
                saturation: 0,
                color_temperature: 200,
            }
        );
        assert_eq!(session.status().await.missed_heartbeats, 0);
    }

    #[tokio::test]
    async fn test_three_misses_log_out() {
        let device = FakeDevice::start(json!({})).await;
        device.set_failing(true);
        let session = session(&device, 0, IDLE);
        session.login(Ipv4Addr::LOCALHOST).await;

        session.heartbeat().await;
        session.heartbeat().await;
        assert!(session.is_logged_in().await);
        assert_eq!(session.status().await.missed_heartbeats, 2);

        session.heartbeat().await;
        assert!(!session.is_logged_in().await);
        assert_eq!(session.status().await.missed_heartbeats, 0);
        assert!(!session.status().await.heartbeat_running);
    }

    #[tokio::test]
    async fn test_overflowing_light_key_is_a_miss() {
        let device = FakeDevice::start(json!({"18446744073709551615": {"on": true}})).await;
        let session = session(&device, 0, IDLE);
        session.login(Ipv4Addr::LOCALHOST).await;

        session.heartbeat().await;

        let status = session.status().await;
        assert!(status.logged_in);
        assert_eq!(status.missed_heartbeats, 1);
        session.logout().await;
    }

    #[tokio::test]
    async fn test_success_resets_missed_beats() {
        let device = FakeDevice::start(json!({"0": full_light()})).await;
        device.set_failing(true);
        let session = session(&device, 0, IDLE);
        session.login(Ipv4Addr::LOCALHOST).await;

        session.heartbeat().await;
        session.heartbeat().await;
        device.set_failing(false);
        session.heartbeat().await;

        assert!(session.is_logged_in().await);
        assert_eq!(session.status().await.missed_heartbeats, 0);
    }

    #[tokio::test]
    async fn test_partial_pull_applies_present_fields() {
        let device = FakeDevice::start(json!({
            "0": full_light(),
            "1": {"on": true, "bri": 75}
        }))
        .await;
        let session = session(&device, 2, IDLE);
        session.login(Ipv4Addr::LOCALHOST).await;

        session.heartbeat().await;

        assert_eq!(session.status().await.missed_heartbeats, 1);
        assert_eq!(session.light_state(1).await.unwrap().brightness, 50);
        let second = session.light_state(2).await.unwrap();
        assert!(second.on);
        assert_eq!(second.brightness, 75);
        assert_eq!(second.color_temperature, 140);
    }

    #[tokio::test]
    async fn test_stale_ticket_is_discarded() {
        let device = FakeDevice::start(json!({})).await;
        let session = session(&device, 0, IDLE);
        session.login(Ipv4Addr::LOCALHOST).await;
        let stale = session.ticket().await.unwrap();

        session.logout().await;
        session.login(Ipv4Addr::LOCALHOST).await;

        let report = StateReport::from_value(&json!({"0": full_light()})).unwrap();
        assert!(!session.apply_report(stale, &report).await);
        assert!(!session.light_state(1).await.unwrap().on);

        session.record_heartbeat(stale, false).await;
        assert_eq!(session.status().await.missed_heartbeats, 0);
    }

    #[tokio::test]
    async fn test_reads_fail_while_logged_out() {
        let device = FakeDevice::start(json!({})).await;
        let session = session(&device, 0, IDLE);

        assert!(matches!(
            session.light_state(1).await,
            Err(SessionError::Communication(CommunicationError::Unavailable(_)))
        ));
        assert!(matches!(
            session.light_state(2).await,
            Err(SessionError::UnknownLight(2))
        ));
        assert!(session.status().await.lights.is_none());
    }

    #[tokio::test]
    async fn test_push_while_logged_out_sends_nothing() {
        let device = FakeDevice::start(json!({})).await;
        let session = session(&device, 0, IDLE);
        let packet = StatusPacket {
            on: Some(true),
            ..Default::default()
        };

        let err = session.set_light(1, packet).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Communication(CommunicationError::Unavailable(_))
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(device.puts(), 0);
    }

    #[tokio::test]
    async fn test_push_updates_locally_and_sends() {
        let device = FakeDevice::start(json!({})).await;
        let session = session(&device, 2, IDLE);
        session.login(Ipv4Addr::LOCALHOST).await;

        let packet = StatusPacket {
            bri: Some(80),
            ..Default::default()
        };
        session.set_light(2, packet).await.unwrap();

        assert_eq!(session.light_state(2).await.unwrap().brightness, 80);
        device.wait_for_puts(1).await;
        assert_eq!(device.last_put(), Some(json!({"2": {"bri": 80}})));
    }

    #[tokio::test]
    async fn test_schedule_times_out_unreachable_device() {
        let device = FakeDevice::start(json!({})).await;
        device.set_failing(true);
        let session = session(&device, 0, Duration::from_millis(20));
        session.login(Ipv4Addr::LOCALHOST).await;

        for _ in 0..100 {
            if !session.is_logged_in().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!session.is_logged_in().await);
        assert!(!session.status().await.heartbeat_running);

        tokio::time::sleep(Duration::from_millis(60)).await;
        let settled = device.gets();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(device.gets(), settled);
    }

    #[tokio::test]
    async fn test_schedule_refreshes_state() {
        let device = FakeDevice::start(json!({"0": full_light()})).await;
        let session = session(&device, 0, Duration::from_millis(20));
        session.login(Ipv4Addr::LOCALHOST).await;

        for _ in 0..100 {
            if session.status().await.last_heartbeat.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(session.light_state(1).await.unwrap().on);

        device.set_body(json!({"0": {"on": false, "bri": 0, "hue": 0, "sat": 0, "ct": 140}}));
        for _ in 0..100 {
            if !session.light_state(1).await.unwrap().on {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!session.light_state(1).await.unwrap().on);
        session.logout().await;
    }
}
