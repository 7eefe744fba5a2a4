//! Periodic liveness work.
//!
//! UDP gives no delivery guarantee, so every tick re-sends whatever the
//! handshake is still waiting on and asks every bound device for its status.

use crate::registry::DeviceRegistry;
use crate::session::{ControllerSession, SessionState};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

/// Default polling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Work item for one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollAction {
    /// No controller answered yet; probe again
    Scan,
    /// Bind request went unanswered
    Bind {
        /// Controller MAC
        controller: String,
    },
    /// Sub-device page went unanswered
    SubDevices {
        /// Controller MAC
        controller: String,
        /// Page to request
        page: u32,
    },
    /// Regular status request
    Status {
        /// Controller MAC
        controller: String,
        /// Device MAC
        device: String,
    },
}

/// Fixed-interval poll schedule
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    period: Duration,
}

impl Poller {
    /// Create a poller ticking every `period`; a zero period is raised to 1 ms
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_POLL_INTERVAL),
        }
    }

    /// Tick period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Timer for the controller loop; the first tick fires one period from now
    pub fn interval(&self) -> Interval {
        let start = tokio::time::Instant::now() + self.period;
        let mut ticker = tokio::time::interval_at(start, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Decide what one tick has to send
    pub fn plan<'a>(
        &self,
        sessions: impl IntoIterator<Item = &'a ControllerSession>,
        registry: &DeviceRegistry,
    ) -> Vec<PollAction> {
        let mut actions = Vec::new();
        let mut any = false;

        for session in sessions {
            any = true;
            match session.state() {
                SessionState::Unbound | SessionState::AwaitingHandshakeAck => {
                    actions.push(PollAction::Bind {
                        controller: session.mac().to_string(),
                    });
                }
                SessionState::Bound => {
                    if let Some(page) = session.pending_page() {
                        actions.push(PollAction::SubDevices {
                            controller: session.mac().to_string(),
                            page,
                        });
                    }
                    actions.extend(registry.devices_of(session.mac()).map(|device| {
                        PollAction::Status {
                            controller: session.mac().to_string(),
                            device: device.mac().to_string(),
                        }
                    }));
                }
            }
        }

        if !any {
            actions.push(PollAction::Scan);
        }
        actions
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::recording::RecordingHandler;
    use crate::session::tests::{controller_addr, from_controller, CONTROLLER, SESSION_KEY};
    use crate::session::{Engine, EngineConfig};
    use hvac_wire::DEFAULT_KEY;
    use serde_json::json;
    use std::sync::Arc;

    fn plan(poller: &Poller, engine: &Engine) -> Vec<PollAction> {
        poller.plan(engine.sessions().values(), engine.registry())
    }

    #[test]
    fn test_plan_follows_handshake() {
        let poller = Poller::default();
        let mut engine = Engine::new(
            EngineConfig::default(),
            Arc::new(RecordingHandler::default()),
        );
        assert_eq!(plan(&poller, &engine), vec![PollAction::Scan]);

        let dev = json!({"t": "dev", "mac": CONTROLLER, "name": "hall", "subCnt": 2});
        engine.handle_datagram(controller_addr(), &from_controller(dev, &DEFAULT_KEY));
        assert_eq!(
            plan(&poller, &engine),
            vec![PollAction::Bind {
                controller: CONTROLLER.to_string()
            }]
        );

        let bindok = json!({"t": "bindok", "mac": CONTROLLER, "key": SESSION_KEY});
        engine.handle_datagram(controller_addr(), &from_controller(bindok, &DEFAULT_KEY));
        assert_eq!(
            plan(&poller, &engine),
            vec![
                PollAction::SubDevices {
                    controller: CONTROLLER.to_string(),
                    page: 0
                },
                PollAction::Status {
                    controller: CONTROLLER.to_string(),
                    device: CONTROLLER.to_string()
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_waits_one_period() {
        let poller = Poller::new(Duration::from_millis(3000));
        let start = tokio::time::Instant::now();
        let mut ticker = poller.interval();
        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
        ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_millis(6000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_still_ticks() {
        let poller = Poller::new(Duration::ZERO);
        assert_eq!(poller.period(), Duration::from_millis(1));
        let start = tokio::time::Instant::now();
        poller.interval().tick().await;
        assert_eq!(start.elapsed(), Duration::from_millis(1));
    }
}
