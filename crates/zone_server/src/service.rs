//! # Zone Host
//!
//! Runs one [`ZoneOrchestrator`] on its own tokio task. Every request
//! arrives over an `mpsc` channel and is answered through a `oneshot`, so
//! the orchestrator is only ever touched by one task at a time.
//!
//! Autosave ticks are handled inside the same `select!` loop as requests.
//! An autosave can therefore never run in the middle of a zone change.
//!
//! [`ZoneHost`] is a cheap, cloneable handle. Dropping every handle (or
//! calling [`ZoneHost::shutdown`]) makes the task persist the hot zone one
//! last time and return the orchestrator through its `JoinHandle`.

use std::future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use zone_state::{
    PlayerId, Portal, Position, SystemStats, Traveler, ZoneError, ZoneId, ZoneOrchestrator,
};

const COMMAND_BUFFER: usize = 64;

/// Errors returned by [`ZoneHost`] requests.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Zone host is not running")]
    HostStopped,
    #[error(transparent)]
    Zone(#[from] ZoneError),
}

enum Command {
    Enter {
        zone_id: ZoneId,
        reply: oneshot::Sender<Result<(), ZoneError>>,
    },
    Join {
        player_id: PlayerId,
        reply: oneshot::Sender<Result<Traveler, ZoneError>>,
    },
    ChangeZone {
        target: ZoneId,
        traveler: Traveler,
        reply: oneshot::Sender<Result<Traveler, ZoneError>>,
    },
    PortalAt {
        position: Position,
        reply: oneshot::Sender<Option<Portal>>,
    },
    Autosave {
        reply: oneshot::Sender<bool>,
    },
    Regenerate {
        zone_id: ZoneId,
        reply: oneshot::Sender<Result<usize, ZoneError>>,
    },
    ForceRegenerateAll {
        reply: oneshot::Sender<Result<(), ZoneError>>,
    },
    Stats {
        reply: oneshot::Sender<SystemStats>,
    },
    Shutdown {
        reply: oneshot::Sender<bool>,
    },
}

/// Handle to a running zone host task.
#[derive(Debug, Clone)]
pub struct ZoneHost {
    commands: mpsc::Sender<Command>,
}

impl ZoneHost {
    /// Moves `zones` onto a new task. With `autosave` set, the hot zone is
    /// persisted every period.
    pub fn spawn(zones: ZoneOrchestrator, autosave: Option<Duration>) -> (Self, JoinHandle<ZoneOrchestrator>) {
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let handle = tokio::spawn(run_host(zones, receiver, autosave));
        (Self { commands }, handle)
    }

    /// Loads `zone_id` as the hot zone.
    pub async fn enter_zone(&self, zone_id: ZoneId) -> Result<(), ServiceError> {
        self.request(|reply| Command::Enter { zone_id, reply }).await??;
        Ok(())
    }

    /// Binds a new player to the hot zone at its centre.
    pub async fn join(&self, player_id: PlayerId) -> Result<Traveler, ServiceError> {
        Ok(self.request(|reply| Command::Join { player_id, reply }).await??)
    }

    /// Moves `traveler` to `target`; returns the traveler at its new position.
    pub async fn change_zone(&self, target: ZoneId, traveler: Traveler) -> Result<Traveler, ServiceError> {
        Ok(self
            .request(|reply| Command::ChangeZone { target, traveler, reply })
            .await??)
    }

    pub async fn portal_at(&self, position: Position) -> Result<Option<Portal>, ServiceError> {
        self.request(|reply| Command::PortalAt { position, reply }).await
    }

    pub async fn autosave(&self) -> Result<bool, ServiceError> {
        self.request(|reply| Command::Autosave { reply }).await
    }

    pub async fn regenerate(&self, zone_id: ZoneId) -> Result<usize, ServiceError> {
        Ok(self.request(|reply| Command::Regenerate { zone_id, reply }).await??)
    }

    pub async fn force_regenerate_all(&self) -> Result<(), ServiceError> {
        self.request(|reply| Command::ForceRegenerateAll { reply }).await??;
        Ok(())
    }

    pub async fn stats(&self) -> Result<SystemStats, ServiceError> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Persists the hot zone and stops the task. Returns the final save
    /// result.
    pub async fn shutdown(&self) -> Result<bool, ServiceError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| ServiceError::HostStopped)?;
        response.await.map_err(|_| ServiceError::HostStopped)
    }
}

async fn run_host(
    mut zones: ZoneOrchestrator,
    mut commands: mpsc::Receiver<Command>,
    autosave: Option<Duration>,
) -> ZoneOrchestrator {
    let mut ticker = autosave.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });
    info!("🏠 Zone host started (autosave: {:?})", autosave);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Shutdown { reply }) => {
                    let saved = zones.autosave();
                    let _ = reply.send(saved);
                    break;
                }
                Some(command) => handle_command(&mut zones, command),
                None => {
                    debug!("All zone host handles dropped");
                    zones.autosave();
                    break;
                }
            },
            _ = next_tick(&mut ticker) => {
                if zones.current_zone().is_some() && !zones.autosave() {
                    warn!("⚠️ Autosave of zone {:?} failed, retrying next tick", zones.current_zone());
                }
            }
        }
    }

    info!("🏠 Zone host stopped");
    zones
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending::<()>().await,
    }
}

fn handle_command(zones: &mut ZoneOrchestrator, command: Command) {
    match command {
        Command::Enter { zone_id, reply } => {
            let _ = reply.send(zones.enter_zone(&zone_id));
        }
        Command::Join { player_id, reply } => {
            let result = match zones.hot_zone_mut() {
                Some(hot) => {
                    let position = hot.instance().config().center();
                    hot.instance_mut().add_player(player_id.clone());
                    Ok(Traveler::new(player_id, position))
                }
                None => Err(ZoneError::NoZoneLoaded),
            };
            let _ = reply.send(result);
        }
        Command::ChangeZone {
            target,
            mut traveler,
            reply,
        } => {
            let result = zones.change_zone(&target, &mut traveler).map(|()| traveler);
            let _ = reply.send(result);
        }
        Command::PortalAt { position, reply } => {
            let _ = reply.send(zones.portal_at(position).cloned());
        }
        Command::Autosave { reply } => {
            let _ = reply.send(zones.autosave());
        }
        Command::Regenerate { zone_id, reply } => {
            let _ = reply.send(zones.regenerate(&zone_id));
        }
        Command::ForceRegenerateAll { reply } => {
            let _ = reply.send(zones.force_regenerate_all());
        }
        Command::Stats { reply } => {
            let _ = reply.send(zones.system_stats());
        }
        Command::Shutdown { reply } => {
            let _ = reply.send(zones.autosave());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use zone_state::{MemoryBackend, PersistenceStore, ZoneTable};

    fn orchestrator() -> (Arc<PersistenceStore>, ZoneOrchestrator) {
        let store = Arc::new(PersistenceStore::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(ZoneTable::builtin()),
        ));
        (store.clone(), ZoneOrchestrator::with_defaults(store))
    }

    #[tokio::test]
    async fn test_host_moves_player_between_zones() {
        let (store, zones) = orchestrator();
        let (host, task) = ZoneHost::spawn(zones, None);

        host.enter_zone(ZoneId::new("town")).await.unwrap();
        let traveler = host.join(PlayerId::new()).await.unwrap();
        assert_eq!(traveler.position, Position::new(600.0, 450.0));

        let portal = host.portal_at(Position::new(1150.0, 450.0)).await.unwrap().unwrap();
        let arrived = host.change_zone(portal.target_zone.clone(), traveler.clone()).await.unwrap();
        assert_eq!(arrived.id, traveler.id);
        assert_eq!(arrived.position, portal.entry());

        let stats = host.stats().await.unwrap();
        assert_eq!(stats.current_zone, Some(ZoneId::new("forest")));
        assert_eq!(stats.live_entities, 19);

        assert!(host.shutdown().await.unwrap());
        let zones = task.await.unwrap();
        assert_eq!(zones.current_zone(), Some(&ZoneId::new("forest")));
        assert!(store.snapshot(&ZoneId::new("forest")).unwrap().players.contains(&traveler.id));
    }

    #[tokio::test]
    async fn test_zone_errors_are_forwarded() {
        let (_store, zones) = orchestrator();
        let (host, _task) = ZoneHost::spawn(zones, None);

        assert!(matches!(
            host.join(PlayerId::new()).await,
            Err(ServiceError::Zone(ZoneError::NoZoneLoaded))
        ));

        host.enter_zone(ZoneId::new("town")).await.unwrap();
        let traveler = host.join(PlayerId::new()).await.unwrap();
        assert!(matches!(
            host.change_zone(ZoneId::new("caves"), traveler).await,
            Err(ServiceError::Zone(ZoneError::NoTransition { .. }))
        ));
        assert!(matches!(
            host.regenerate(ZoneId::new("forest")).await,
            Err(ServiceError::Zone(ZoneError::NotHot(_)))
        ));
    }

    #[tokio::test]
    async fn test_requests_after_shutdown_fail() {
        let (_store, zones) = orchestrator();
        let (host, task) = ZoneHost::spawn(zones, None);

        assert!(!host.shutdown().await.unwrap());
        task.await.unwrap();
        assert!(matches!(host.stats().await, Err(ServiceError::HostStopped)));
    }

    #[tokio::test]
    async fn test_autosave_ticks_persist_hot_zone() {
        let (store, zones) = orchestrator();
        let (host, _task) = ZoneHost::spawn(zones, Some(Duration::from_millis(20)));

        host.enter_zone(ZoneId::new("caves")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(store.contains(&ZoneId::new("caves")));
    }

    #[tokio::test]
    async fn test_autosave_never_splits_a_transition() {
        let (store, zones) = orchestrator();
        let (host, task) = ZoneHost::spawn(zones, Some(Duration::from_millis(1)));

        host.enter_zone(ZoneId::new("town")).await.unwrap();
        let mut traveler = host.join(PlayerId::new()).await.unwrap();
        for _ in 0..10 {
            traveler = host.change_zone(ZoneId::new("forest"), traveler).await.unwrap();
            traveler = host.change_zone(ZoneId::new("town"), traveler).await.unwrap();
        }

        assert!(host.shutdown().await.unwrap());
        task.await.unwrap();

        let town = store.snapshot(&ZoneId::new("town")).unwrap();
        let forest = store.snapshot(&ZoneId::new("forest")).unwrap();
        assert!(town.players.contains(&traveler.id));
        assert!(!forest.players.contains(&traveler.id));
    }

    #[tokio::test]
    async fn test_force_regenerate_through_host() {
        let (store, zones) = orchestrator();
        let (host, _task) = ZoneHost::spawn(zones, None);

        host.enter_zone(ZoneId::new("forest")).await.unwrap();
        assert!(host.autosave().await.unwrap());
        host.enter_zone(ZoneId::new("mountains")).await.unwrap();
        assert!(host.autosave().await.unwrap());
        assert_eq!(store.len(), 2);

        host.force_regenerate_all().await.unwrap();
        assert_eq!(store.zone_ids(), vec![ZoneId::new("mountains")]);
    }
}
