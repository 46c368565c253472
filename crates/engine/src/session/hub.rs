//! Session registry.
//!
//! Maps game ids to the handle of their live room. Lookup-or-create holds a
//! map shard only while inserting; the seed is fetched before that. Each room
//! removes its own entry when its loop exits, matched by instance so a newer
//! room for the same game is never evicted by an older one.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;

use chessroom_domain::{GameId, GameStatus, Role, SessionSeed, Side};

use super::bot;
use super::command::{RoomCommand, RoomSnapshot};
use super::handle::{RoomClosed, RoomHandle};
use super::participant::Participant;
use super::persistence::spawn_writer;
use super::room::Room;
use super::supervisor::spawn_clock_ticker;
use crate::config::RoomConfig;
use crate::infrastructure::ports::{ClockPort, EngineLauncher, GameStore, RepoError};

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Game not found: {0}")]
    NotFound(GameId),
    #[error("Storage error: {0}")]
    Store(RepoError),
    #[error("Room closed while joining")]
    Closed,
}

pub struct Hub {
    rooms: Arc<DashMap<GameId, RoomHandle>>,
    store: Arc<dyn GameStore>,
    /// `None` disables computer opponents
    launcher: Option<Arc<dyn EngineLauncher>>,
    time: Arc<dyn ClockPort>,
    config: RoomConfig,
}

impl Hub {
    pub fn new(
        store: Arc<dyn GameStore>,
        launcher: Option<Arc<dyn EngineLauncher>>,
        time: Arc<dyn ClockPort>,
        config: RoomConfig,
    ) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            store,
            launcher,
            time,
            config,
        }
    }

    /// The live room for `game_id`, starting one from the store if needed.
    pub async fn resolve(&self, game_id: &GameId) -> Result<RoomHandle, HubError> {
        if let Some(handle) = self.live(game_id) {
            return Ok(handle);
        }

        let seed = match self.store.resolve_session(game_id).await {
            Ok(seed) => seed,
            Err(e) if e.is_not_found() => return Err(HubError::NotFound(game_id.clone())),
            Err(e) => return Err(HubError::Store(e)),
        };
        let engine_side = match seed.status {
            GameStatus::Finished => None,
            _ => seed.engine_side(),
        };

        let (handle, started) = match self.rooms.entry(game_id.clone()) {
            Entry::Occupied(mut entry) if entry.get().is_closed() => {
                let handle = self.start_room(seed);
                entry.insert(handle.clone());
                (handle, true)
            }
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let handle = self.start_room(seed);
                entry.insert(handle.clone());
                (handle, true)
            }
        };

        if started {
            if let Some(side) = engine_side {
                self.attach_engine(&handle, side);
            }
        }
        Ok(handle)
    }

    /// Register `participant` in its game's room. Returns the room and the
    /// role it was seated with.
    pub async fn join(
        &self,
        game_id: &GameId,
        participant: Arc<dyn Participant>,
    ) -> Result<(RoomHandle, Role), HubError> {
        // A room can stop between resolve and register; the retry gets a new one.
        for _ in 0..2 {
            let handle = self.resolve(game_id).await?;
            let role = handle.role_for(participant.user_id());
            match handle
                .submit(RoomCommand::Register {
                    participant: participant.clone(),
                    role,
                })
                .await
            {
                Ok(()) => return Ok((handle, role)),
                Err(RoomClosed) => {
                    tracing::debug!(game_id = %game_id, "Room closed during join, retrying");
                }
            }
        }
        Err(HubError::Closed)
    }

    /// State of a live room. Never starts one.
    pub async fn snapshot(&self, game_id: &GameId) -> Option<RoomSnapshot> {
        let handle = self.live(game_id)?;
        handle.snapshot().await.ok()
    }

    /// Ids of rooms whose loop is still running.
    #[cfg(test)]
    pub fn live_rooms(&self) -> Vec<GameId> {
        self.rooms
            .iter()
            .filter(|entry| !entry.value().is_closed())
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn live(&self, game_id: &GameId) -> Option<RoomHandle> {
        self.rooms
            .get(game_id)
            .map(|entry| entry.value().clone())
            .filter(|handle| !handle.is_closed())
    }

    fn start_room(&self, seed: SessionSeed) -> RoomHandle {
        let game_id = seed.game_id.clone();
        let (sender, commands) = mpsc::channel(self.config.command_capacity);
        let handle = RoomHandle::new(&seed, sender);

        let (persist, writer) = spawn_writer(game_id.clone(), self.store.clone());
        let room = Room::new(seed, self.time.clone(), persist, self.config.idle_grace);
        spawn_clock_ticker(handle.clone(), self.config.clock_tick);

        let rooms = self.rooms.clone();
        let instance = handle.instance();
        tokio::spawn(async move {
            room.run(commands).await;
            rooms.remove_if(&game_id, |_, current| current.instance() == instance);
            // The room owned the only queue sender, so the writer drains and exits.
            if let Err(e) = writer.await {
                tracing::error!(game_id = %game_id, error = %e, "Persistence writer panicked");
            }
        });

        tracing::debug!(game_id = %handle.game_id(), instance = %instance, "Room registered");
        handle
    }

    fn attach_engine(&self, handle: &RoomHandle, side: Side) {
        let Some(launcher) = self.launcher.clone() else {
            tracing::warn!(game_id = %handle.game_id(), "No engine configured, computer side will not move");
            return;
        };
        let handle = handle.clone();
        let capacity = self.config.engine_inbox_capacity;
        tokio::spawn(async move {
            if let Err(e) = bot::attach(handle.clone(), side, launcher, capacity).await {
                tracing::error!(
                    game_id = %handle.game_id(),
                    side = %side,
                    error = %e,
                    "Failed to start engine opponent"
                );
            }
        });
    }
}
