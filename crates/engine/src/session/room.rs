//! The room: single-writer state machine for one game.
//!
//! All state (turn, clocks, history, participants) is owned by the room loop
//! and mutated only while handling one [`RoomCommand`] at a time. Handling is
//! synchronous: delivery to participants is a non-blocking enqueue and
//! persistence is a hand-off to the writer task, so nothing here awaits.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use chessroom_domain::{
    ConnectionId, GameClock, GameId, GameOutcome, GameStatus, MoveRecord, Role, Seat,
    SessionSeed, Side, UciMove,
};
use chessroom_shared::{
    ChatPayload, ClientMessage, ErrorCode, GameOverPayload, InitPayload, MovePayload,
    ServerMessage,
};

use super::command::{ParticipantSummary, RoomCommand, RoomSnapshot};
use super::participant::{DeliveryError, Frame, Participant};
use super::persistence::{PersistJob, PersistQueue};
use crate::infrastructure::ports::ClockPort;

struct Member {
    participant: Arc<dyn Participant>,
    role: Role,
}

pub struct Room {
    game_id: GameId,
    status: GameStatus,
    white: Seat,
    black: Seat,
    starting_fen: String,
    clock: GameClock,
    history: Vec<UciMove>,
    /// Registration order
    members: Vec<Member>,
    outcome: Option<GameOutcome>,
    persist: PersistQueue,
    time: Arc<dyn ClockPort>,
    idle_grace: Duration,
    idle_since: Option<DateTime<Utc>>,
    stopped: bool,
}

impl Room {
    pub fn new(
        seed: SessionSeed,
        time: Arc<dyn ClockPort>,
        persist: PersistQueue,
        idle_grace: Duration,
    ) -> Self {
        let clock = GameClock::new(
            seed.white_remaining.unwrap_or(seed.time_control.base),
            seed.black_remaining.unwrap_or(seed.time_control.base),
            seed.last_move_at.unwrap_or_else(|| time.now()),
        );

        Self {
            starting_fen: seed.starting_fen().to_string(),
            game_id: seed.game_id,
            status: seed.status,
            white: seed.white,
            black: seed.black,
            clock,
            history: seed.history,
            members: Vec::new(),
            outcome: None,
            persist,
            time,
            idle_grace,
            idle_since: None,
            stopped: false,
        }
    }

    /// Process commands until the room becomes evictable.
    pub async fn run(mut self, mut commands: mpsc::Receiver<RoomCommand>) {
        tracing::info!(game_id = %self.game_id, status = %self.status, "room started");

        while let Some(command) = commands.recv().await {
            self.handle(command);
            if self.is_stopped() {
                break;
            }
        }

        // Reject further submissions before letting participants go.
        commands.close();
        for member in self.members.drain(..) {
            member.participant.close();
        }
        tracing::info!(game_id = %self.game_id, status = %self.status, "room stopped");
    }

    pub fn handle(&mut self, command: RoomCommand) {
        tracing::trace!(game_id = %self.game_id, command = command.kind(), "room command");
        match command {
            RoomCommand::Register { participant, role } => self.register(participant, role),
            RoomCommand::Unregister { connection_id } => self.unregister(connection_id),
            RoomCommand::Inbound {
                connection_id,
                message,
            } => self.inbound(connection_id, message),
            RoomCommand::ClockTick => self.tick(),
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn current_turn(&self) -> Side {
        Side::to_move_after(self.history.len())
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            game_id: self.game_id.clone(),
            status: self.status,
            current_turn: self.current_turn(),
            history: self.history.clone(),
            white_remaining_ms: millis(self.clock.remaining(Side::White)),
            black_remaining_ms: millis(self.clock.remaining(Side::Black)),
            last_move_at: self.clock.last_move_at(),
            participants: self
                .members
                .iter()
                .map(|m| ParticipantSummary {
                    connection_id: m.participant.id(),
                    role: m.role,
                    physical: m.participant.is_physical(),
                })
                .collect(),
            result: self.outcome.map(|o| o.result.as_str().to_string()),
            reason: self.outcome.map(|o| o.reason.as_str().to_string()),
        }
    }

    // =========================================================================
    // Membership
    // =========================================================================

    fn register(&mut self, participant: Arc<dyn Participant>, role: Role) {
        let connection_id = participant.id();
        self.members.retain(|m| m.participant.id() != connection_id);

        // A seat has one holder: a reconnect replaces the previous connection.
        if role.side().is_some() {
            if let Some(index) = self.members.iter().position(|m| m.role == role) {
                let prior = self.members.remove(index);
                prior.participant.close();
                tracing::info!(
                    game_id = %self.game_id,
                    role = %role,
                    replaced = %prior.participant.id(),
                    connection_id = %connection_id,
                    "Seat taken over by new connection"
                );
            }
        }

        tracing::info!(
            game_id = %self.game_id,
            connection_id = %connection_id,
            user_id = ?participant.user_id(),
            role = %role,
            physical = participant.is_physical(),
            "Participant registered"
        );
        self.members.push(Member { participant, role });

        if self.activate_if_seated() {
            // Members that joined while waiting hold a stale status.
            let members: Vec<(ConnectionId, Role)> = self
                .members
                .iter()
                .map(|m| (m.participant.id(), m.role))
                .collect();
            for (id, role) in members {
                let init = self.init_message(role);
                self.send_to(id, init);
            }
        } else {
            let init = self.init_message(role);
            self.send_to(connection_id, init);
        }
    }

    fn unregister(&mut self, connection_id: ConnectionId) {
        let before = self.members.len();
        self.members
            .retain(|m| m.participant.id() != connection_id);
        if self.members.len() < before {
            tracing::info!(
                game_id = %self.game_id,
                connection_id = %connection_id,
                "Participant unregistered"
            );
        }
    }

    /// Returns true when this call moved the game from waiting to active.
    fn activate_if_seated(&mut self) -> bool {
        if self.status != GameStatus::Waiting {
            return false;
        }
        let seated = |side: Side| self.members.iter().any(|m| m.role == Role::from(side));
        if !(seated(Side::White) && seated(Side::Black)) {
            return false;
        }
        match self.status.transition_to(GameStatus::Active) {
            Ok(next) => {
                self.status = next;
                self.clock.restart(self.time.now());
                tracing::info!(game_id = %self.game_id, "Both seats filled, game active");
                true
            }
            Err(_) => false,
        }
    }

    fn role_of(&self, connection_id: ConnectionId) -> Option<Role> {
        self.members
            .iter()
            .find(|m| m.participant.id() == connection_id)
            .map(|m| m.role)
    }

    fn has_physical_members(&self) -> bool {
        self.members.iter().any(|m| m.participant.is_physical())
    }

    fn seat(&self, side: Side) -> &Seat {
        match side {
            Side::White => &self.white,
            Side::Black => &self.black,
        }
    }

    // =========================================================================
    // Inbound messages
    // =========================================================================

    fn inbound(&mut self, connection_id: ConnectionId, message: ClientMessage) {
        let Some(role) = self.role_of(connection_id) else {
            tracing::debug!(
                game_id = %self.game_id,
                connection_id = %connection_id,
                kind = message.kind(),
                "Frame from unregistered connection ignored"
            );
            return;
        };

        match message {
            ClientMessage::Move(submission) => {
                self.play(connection_id, role, submission.notation())
            }
            ClientMessage::Chat(chat) => self.chat(role, chat.text),
            ClientMessage::GameOver(payload) => self.report_game_over(connection_id, role, payload),
        }
    }

    fn play(&mut self, connection_id: ConnectionId, role: Role, raw: &str) {
        let Some(side) = role.side() else {
            return self.reject(connection_id, ErrorCode::Spectator, "Spectators cannot move");
        };
        if self.status != GameStatus::Active {
            return self.reject(
                connection_id,
                ErrorCode::NotActive,
                format!("Game is {}", self.status),
            );
        }
        let notation = match UciMove::parse(raw) {
            Ok(notation) => notation,
            Err(e) => return self.reject(connection_id, ErrorCode::InvalidMove, e.to_string()),
        };
        let turn = self.current_turn();
        if side != turn {
            return self.reject(
                connection_id,
                ErrorCode::NotYourTurn,
                format!("It is {turn}'s turn"),
            );
        }

        let now = self.time.now();
        self.clock.charge(side, now);
        self.history.push(notation.clone());

        self.persist(PersistJob::AppendMove(MoveRecord {
            move_number: u32::try_from(self.history.len()).unwrap_or(u32::MAX),
            side,
            player_id: self.seat(side).user_id,
            notation: notation.clone(),
            white_remaining: self.clock.remaining(Side::White),
            black_remaining: self.clock.remaining(Side::Black),
            played_at: now,
        }));

        tracing::debug!(
            game_id = %self.game_id,
            side = %side,
            notation = %notation,
            ply = self.history.len(),
            "Move accepted"
        );

        self.broadcast(ServerMessage::Move(MovePayload {
            notation: notation.to_string(),
            white_time: self.clock.remaining(Side::White).as_secs(),
            black_time: self.clock.remaining(Side::Black).as_secs(),
            last_move_at: now.timestamp_millis(),
            current_turn: self.current_turn(),
        }));
    }

    fn chat(&mut self, role: Role, text: String) {
        let timestamp = self.time.now().to_rfc3339();
        self.broadcast(ServerMessage::Chat(ChatPayload {
            sender: role,
            text,
            timestamp,
        }));
    }

    fn report_game_over(&mut self, connection_id: ConnectionId, role: Role, payload: GameOverPayload) {
        if role.is_spectator() {
            return self.reject(
                connection_id,
                ErrorCode::Spectator,
                "Spectators cannot end the game",
            );
        }
        if self.status != GameStatus::Active {
            return self.reject(
                connection_id,
                ErrorCode::NotActive,
                format!("Game is {}", self.status),
            );
        }
        let outcome = match GameOutcome::from_report(
            &payload.result,
            &payload.reason,
            payload.winner.as_deref(),
        ) {
            Ok(outcome) => outcome,
            Err(e) => return self.reject(connection_id, ErrorCode::InvalidResult, e.to_string()),
        };

        tracing::info!(
            game_id = %self.game_id,
            reported_by = %role,
            result = %outcome.result,
            reason = %outcome.reason,
            "Game over reported"
        );
        self.finish(outcome, ServerMessage::GameOver(payload));
    }

    // =========================================================================
    // Clock and lifecycle
    // =========================================================================

    fn tick(&mut self) {
        let now = self.time.now();

        if self.status == GameStatus::Active {
            let side = self.current_turn();
            if self.clock.is_flagged(side, now) {
                tracing::info!(game_id = %self.game_id, side = %side, "Clock exhausted");
                self.flag(side);
            }
        }

        if self.status == GameStatus::Active || self.has_physical_members() {
            self.idle_since = None;
            return;
        }
        let since = *self.idle_since.get_or_insert(now);
        let idle = (now - since).to_std().unwrap_or(Duration::ZERO);
        if idle >= self.idle_grace {
            tracing::info!(
                game_id = %self.game_id,
                status = %self.status,
                idle_secs = idle.as_secs(),
                "Room idle, stopping"
            );
            self.stopped = true;
        }
    }

    fn flag(&mut self, side: Side) {
        self.clock.flag(side);
        let outcome = GameOutcome::timeout(side);
        let payload = GameOverPayload::new(
            outcome.result.as_str(),
            outcome.reason.as_str(),
            outcome.winner(),
        );
        self.finish(outcome, ServerMessage::GameOver(payload));
    }

    fn finish(&mut self, outcome: GameOutcome, message: ServerMessage) {
        match self.status.transition_to(GameStatus::Finished) {
            Ok(next) => self.status = next,
            Err(e) => {
                tracing::warn!(game_id = %self.game_id, error = %e, "Ignoring second game end");
                return;
            }
        }
        self.outcome = Some(outcome);
        self.persist(PersistJob::Finalize(outcome));
        self.broadcast(message);
    }

    fn persist(&self, job: PersistJob) {
        if self.persist.send(job).is_err() {
            tracing::warn!(game_id = %self.game_id, "Persistence writer is gone, job dropped");
        }
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    fn init_message(&self, role: Role) -> ServerMessage {
        ServerMessage::Init(InitPayload {
            fen: self.starting_fen.clone(),
            history: self.history.iter().map(|m| m.as_str().to_string()).collect(),
            white_id: self.white.user_id,
            black_id: self.black.user_id,
            white_name: self.white.name.clone(),
            black_name: self.black.name.clone(),
            status: self.status,
            color: role,
            white_time: self.clock.remaining(Side::White).as_secs(),
            black_time: self.clock.remaining(Side::Black).as_secs(),
            last_move_at: self.clock.last_move_at().timestamp_millis(),
            current_turn: self.current_turn(),
        })
    }

    fn reject(&mut self, connection_id: ConnectionId, code: ErrorCode, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(
            game_id = %self.game_id,
            connection_id = %connection_id,
            code = ?code,
            message = %message,
            "Frame rejected"
        );
        self.send_to(connection_id, ServerMessage::error(code, message));
    }

    fn send_to(&mut self, connection_id: ConnectionId, message: ServerMessage) {
        let Some(frame) = self.encode(message) else {
            return;
        };
        let result = self
            .members
            .iter()
            .find(|m| m.participant.id() == connection_id)
            .map(|m| m.participant.deliver(frame));
        if let Some(Err(e)) = result {
            self.drop_member(connection_id, e);
        }
    }

    /// Enqueue one shared frame to every current member.
    fn broadcast(&mut self, message: ServerMessage) {
        let Some(frame) = self.encode(message) else {
            return;
        };
        let failed: Vec<(ConnectionId, DeliveryError)> = self
            .members
            .iter()
            .filter_map(|m| {
                m.participant
                    .deliver(Arc::clone(&frame))
                    .err()
                    .map(|e| (m.participant.id(), e))
            })
            .collect();
        for (connection_id, e) in failed {
            self.drop_member(connection_id, e);
        }
    }

    fn encode(&self, message: ServerMessage) -> Option<Arc<Frame>> {
        let kind = message.kind();
        match Frame::encode(message) {
            Ok(frame) => Some(Arc::new(frame)),
            Err(e) => {
                tracing::error!(game_id = %self.game_id, kind, error = %e, "Failed to encode frame");
                None
            }
        }
    }

    /// A participant that cannot take a frame is disconnected rather than
    /// allowed to hold up the room.
    fn drop_member(&mut self, connection_id: ConnectionId, reason: DeliveryError) {
        if let Some(index) = self
            .members
            .iter()
            .position(|m| m.participant.id() == connection_id)
        {
            let member = self.members.remove(index);
            member.participant.close();
            tracing::warn!(
                game_id = %self.game_id,
                connection_id = %connection_id,
                role = %member.role,
                error = %reason,
                "Dropping participant"
            );
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::ManualClock;
    use crate::session::participant::testing::RecordingParticipant;
    use chessroom_domain::{GameMode, TimeControl, UserId};
    use chessroom_shared::{ChatSubmission, MoveSubmission};
    use chrono::TimeZone;
    use serde_json::json;
    use tokio::sync::mpsc::error::TryRecvError;

    const WHITE: u64 = 1;
    const BLACK: u64 = 2;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn seed(status: GameStatus) -> SessionSeed {
        SessionSeed::new(
            GameId::parse("g1").unwrap(),
            Seat::player(UserId::new(WHITE), "alice"),
            Seat::player(UserId::new(BLACK), "bob"),
            status,
            GameMode::Rapid,
            TimeControl::default(),
        )
    }

    struct Fixture {
        room: Room,
        clock: Arc<ManualClock>,
        jobs: mpsc::UnboundedReceiver<PersistJob>,
    }

    impl Fixture {
        fn new(seed: SessionSeed) -> Self {
            let clock = Arc::new(ManualClock::new(t0()));
            let (persist, jobs) = mpsc::unbounded_channel();
            let room = Room::new(seed, clock.clone(), persist, Duration::ZERO);
            Self { room, clock, jobs }
        }

        fn active() -> Self {
            Self::new(seed(GameStatus::Active))
        }

        fn join(&mut self, user: Option<u64>, role: Role) -> Arc<RecordingParticipant> {
            let participant = RecordingParticipant::new(user.map(UserId::new));
            self.room.handle(RoomCommand::Register {
                participant: participant.clone(),
                role,
            });
            participant
        }

        fn send(&mut self, from: &RecordingParticipant, message: ClientMessage) {
            self.room.handle(RoomCommand::Inbound {
                connection_id: from.id(),
                message,
            });
        }

        fn play(&mut self, from: &RecordingParticipant, notation: &str) {
            self.send(from, ClientMessage::Move(MoveSubmission::new(notation)));
        }

        fn advance(&self, secs: u64) {
            self.clock.advance(Duration::from_secs(secs));
        }

        fn drain_jobs(&mut self) -> Vec<PersistJob> {
            let mut jobs = Vec::new();
            while let Ok(job) = self.jobs.try_recv() {
                jobs.push(job);
            }
            jobs
        }
    }

    fn game_over(result: &str, reason: &str, winner: Option<&str>) -> ClientMessage {
        ClientMessage::GameOver(GameOverPayload {
            result: result.to_string(),
            reason: reason.to_string(),
            winner: winner.map(String::from),
            extra: Default::default(),
            raw: None,
        })
    }

    fn last_error_code(participant: &RecordingParticipant) -> Option<ErrorCode> {
        match participant.last() {
            Some(ServerMessage::Error(payload)) => Some(payload.code),
            _ => None,
        }
    }

    #[test]
    fn example_game_clocks_turns_and_verbatim_game_over() {
        let mut fx = Fixture::active();
        let white = fx.join(Some(WHITE), Role::White);
        let black = fx.join(Some(BLACK), Role::Black);
        let spectator = fx.join(None, Role::Spectator);
        for p in [&white, &black, &spectator] {
            p.clear();
        }

        fx.advance(5);
        fx.play(&white, "e2e4");
        let ServerMessage::Move(first) = spectator.last().unwrap() else {
            panic!("expected move broadcast");
        };
        assert_eq!(first.notation, "e2e4");
        assert_eq!(first.white_time, 595);
        assert_eq!(first.black_time, 600);
        assert_eq!(first.current_turn, Side::Black);

        fx.advance(3);
        fx.play(&black, "e7e5");
        let ServerMessage::Move(second) = spectator.last().unwrap() else {
            panic!("expected move broadcast");
        };
        assert_eq!(second.black_time, 597);
        assert_eq!(second.white_time, 595);
        assert_eq!(second.current_turn, Side::White);
        assert_eq!(fx.room.snapshot().history_str(), ["e2e4", "e7e5"]);

        let mut payload = GameOverPayload::new("1-0", "resign", None);
        payload.extra.insert("note".into(), json!("black resigned"));
        fx.send(&white, ClientMessage::GameOver(payload.clone()));

        assert_eq!(fx.room.snapshot().status, GameStatus::Finished);
        for p in [&white, &black, &spectator] {
            assert_eq!(p.last(), Some(ServerMessage::GameOver(payload.clone())));
        }

        let jobs = fx.drain_jobs();
        assert_eq!(jobs.len(), 3);
        assert!(matches!(&jobs[0], PersistJob::AppendMove(r) if r.move_number == 1 && r.side == Side::White));
        assert!(matches!(&jobs[1], PersistJob::AppendMove(r) if r.move_number == 2 && r.black_remaining == Duration::from_secs(597)));
        assert!(matches!(&jobs[2], PersistJob::Finalize(o) if o.result.as_str() == "1-0"));
    }

    #[test]
    fn turns_alternate_strictly_from_white() {
        let mut fx = Fixture::active();
        let white = fx.join(Some(WHITE), Role::White);
        let black = fx.join(Some(BLACK), Role::Black);

        let moves = ["e2e4", "e7e5", "g1f3", "b8c6", "f1c4", "g8f6"];
        for (ply, notation) in moves.iter().enumerate() {
            assert_eq!(fx.room.current_turn(), Side::to_move_after(ply));
            let mover = if ply % 2 == 0 { &white } else { &black };
            fx.play(mover, notation);
        }
        assert_eq!(fx.room.snapshot().history.len(), moves.len());
        assert_eq!(fx.room.current_turn(), Side::White);
    }

    #[test]
    fn out_of_turn_move_changes_nothing() {
        let mut fx = Fixture::active();
        let white = fx.join(Some(WHITE), Role::White);
        let black = fx.join(Some(BLACK), Role::Black);
        white.clear();
        black.clear();

        let before = fx.room.snapshot();
        fx.advance(7);
        fx.play(&black, "e7e5");

        let after = fx.room.snapshot();
        assert_eq!(after.history, before.history);
        assert_eq!(after.current_turn, before.current_turn);
        assert_eq!(after.white_remaining_ms, before.white_remaining_ms);
        assert_eq!(after.black_remaining_ms, before.black_remaining_ms);
        assert_eq!(last_error_code(&black), Some(ErrorCode::NotYourTurn));
        assert!(white.messages().is_empty(), "others never see the rejection");
        assert!(fx.drain_jobs().is_empty());
    }

    #[test]
    fn spectator_moves_are_always_rejected() {
        let mut fx = Fixture::active();
        let white = fx.join(Some(WHITE), Role::White);
        let _black = fx.join(Some(BLACK), Role::Black);
        let spectator = fx.join(Some(99), Role::Spectator);

        fx.play(&spectator, "e2e4");
        assert_eq!(last_error_code(&spectator), Some(ErrorCode::Spectator));

        fx.play(&white, "e2e4");
        fx.play(&spectator, "e7e5");
        assert_eq!(last_error_code(&spectator), Some(ErrorCode::Spectator));
        assert_eq!(fx.room.snapshot().history_str(), ["e2e4"]);
    }

    #[test]
    fn accepted_move_charges_max_zero_of_previous_minus_elapsed() {
        let mut fx = Fixture::active();
        let white = fx.join(Some(WHITE), Role::White);
        let black = fx.join(Some(BLACK), Role::Black);

        for (elapsed, notation, mover) in [(12, "d2d4", &white), (40, "d7d5", &black), (1, "c2c4", &white)] {
            let side = fx.room.current_turn();
            let before = fx.room.snapshot();
            let previous = match side {
                Side::White => before.white_remaining_ms,
                Side::Black => before.black_remaining_ms,
            };
            fx.advance(elapsed);
            fx.play(mover, notation);
            let after = fx.room.snapshot();
            let now_left = match side {
                Side::White => after.white_remaining_ms,
                Side::Black => after.black_remaining_ms,
            };
            assert_eq!(now_left, previous.saturating_sub(elapsed * 1000));
            assert_eq!(after.last_move_at, fx.clock.now());
        }
    }

    #[test]
    fn broadcast_reaches_every_member_with_identical_bytes() {
        let mut fx = Fixture::active();
        let white = fx.join(Some(WHITE), Role::White);
        let mut everyone = vec![white.clone(), fx.join(Some(BLACK), Role::Black)];
        for _ in 0..5 {
            everyone.push(fx.join(None, Role::Spectator));
        }
        for p in &everyone {
            p.clear();
        }

        fx.send(&white, ClientMessage::Chat(ChatSubmission { text: "hi".into() }));

        let frames: Vec<Arc<Frame>> = everyone
            .iter()
            .map(|p| {
                let frames = p.frames();
                assert_eq!(frames.len(), 1);
                frames[0].clone()
            })
            .collect();
        for frame in &frames[1..] {
            assert!(Arc::ptr_eq(frame, &frames[0]));
            assert_eq!(frame.text(), frames[0].text());
        }
    }

    #[test]
    fn chat_sender_and_timestamp_are_stamped_by_the_room() {
        let mut fx = Fixture::active();
        let spectator = fx.join(None, Role::Spectator);
        fx.advance(42);

        fx.send(&spectator, ClientMessage::Chat(ChatSubmission { text: "nice".into() }));

        let expected = ChatPayload {
            sender: Role::Spectator,
            text: "nice".into(),
            timestamp: (t0() + chrono::Duration::seconds(42)).to_rfc3339(),
        };
        assert_eq!(spectator.last(), Some(ServerMessage::Chat(expected)));
    }

    #[test]
    fn reconnect_replaces_the_previous_seat_holder() {
        let mut fx = Fixture::active();
        let first = fx.join(Some(WHITE), Role::White);
        let second = fx.join(Some(WHITE), Role::White);

        let snapshot = fx.room.snapshot();
        assert_eq!(snapshot.holders(Role::White), 1);
        assert_eq!(snapshot.participants[0].connection_id, second.id());
        assert!(first.is_closed());

        // The stale connection's later unregister must not evict the new holder.
        fx.room.handle(RoomCommand::Unregister {
            connection_id: first.id(),
        });
        assert_eq!(fx.room.snapshot().holders(Role::White), 1);

        fx.play(&second, "e2e4");
        assert_eq!(fx.room.snapshot().history_str(), ["e2e4"]);
    }

    #[test]
    fn init_carries_state_and_receiver_role() {
        let mut fx = Fixture::active();
        let white = fx.join(Some(WHITE), Role::White);
        let _black = fx.join(Some(BLACK), Role::Black);
        fx.advance(5);
        fx.play(&white, "e2e4");

        let late = fx.join(None, Role::Spectator);
        let messages = late.messages();
        assert_eq!(messages.len(), 1, "no retroactive broadcasts");
        let ServerMessage::Init(init) = &messages[0] else {
            panic!("expected init");
        };
        assert_eq!(init.history, ["e2e4"]);
        assert_eq!(init.color, Role::Spectator);
        assert_eq!(init.white_time, 595);
        assert_eq!(init.current_turn, Side::Black);
        assert_eq!(init.white_id, Some(UserId::new(WHITE)));
        assert_eq!(init.white_name, "alice");
        assert_eq!(init.status, GameStatus::Active);
    }

    #[test]
    fn clock_tick_ends_the_game_when_side_to_move_runs_out() {
        let mut fx = Fixture::active();
        let white = fx.join(Some(WHITE), Role::White);
        fx.advance(599);
        fx.room.handle(RoomCommand::ClockTick);
        assert_eq!(fx.room.snapshot().status, GameStatus::Active);

        fx.advance(1);
        fx.room.handle(RoomCommand::ClockTick);

        let snapshot = fx.room.snapshot();
        assert_eq!(snapshot.status, GameStatus::Finished);
        assert_eq!(snapshot.white_remaining_ms, 0);
        assert_eq!(snapshot.reason.as_deref(), Some("timeout"));
        assert_eq!(
            white.last(),
            Some(ServerMessage::GameOver(GameOverPayload::new(
                "0-1",
                "timeout",
                Some(Side::Black)
            )))
        );
    }

    #[test]
    fn move_after_clock_runs_out_is_applied_with_clock_at_zero() {
        let mut fx = Fixture::active();
        let white = fx.join(Some(WHITE), Role::White);
        let black = fx.join(Some(BLACK), Role::Black);
        fx.advance(601);
        fx.play(&white, "e2e4");

        let snapshot = fx.room.snapshot();
        assert_eq!(snapshot.history_str(), ["e2e4"]);
        assert_eq!(snapshot.white_remaining_ms, 0);
        assert_eq!(snapshot.status, GameStatus::Active);
        assert_eq!(snapshot.current_turn, Side::Black);
        let ServerMessage::Move(mv) = black.last().unwrap() else {
            panic!("expected move broadcast");
        };
        assert_eq!(mv.white_time, 0);
        assert_eq!(mv.current_turn, Side::Black);
    }

    #[test]
    fn reported_game_over_reaches_everyone_as_sent() {
        let mut fx = Fixture::active();
        let white = fx.join(Some(WHITE), Role::White);
        let black = fx.join(Some(BLACK), Role::Black);

        let payload = r#"{"winner":"white","reason":"checkmate","result":"1-0","pgn":"1. f3 e5 2. g4 Qh4#"}"#;
        let frame = format!(r#"{{"type":"game_over","payload":{payload}}}"#);
        let message = chessroom_shared::decode_client_frame(&frame).unwrap();
        fx.send(&black, message);

        assert_eq!(fx.room.snapshot().status, GameStatus::Finished);
        for p in [&white, &black] {
            let frames = p.frames();
            assert_eq!(frames.last().unwrap().text(), frame);
        }
    }

    #[test]
    fn game_over_requires_a_seat_an_active_game_and_a_consistent_result() {
        let mut fx = Fixture::active();
        let white = fx.join(Some(WHITE), Role::White);
        let spectator = fx.join(None, Role::Spectator);

        fx.send(&spectator, game_over("1-0", "resign", Some("white")));
        assert_eq!(last_error_code(&spectator), Some(ErrorCode::Spectator));

        fx.send(&white, game_over("1-0", "resign", Some("black")));
        assert_eq!(last_error_code(&white), Some(ErrorCode::InvalidResult));

        fx.send(&white, game_over("2-0", "resign", None));
        assert_eq!(last_error_code(&white), Some(ErrorCode::InvalidResult));
        assert_eq!(fx.room.snapshot().status, GameStatus::Active);

        fx.send(&white, game_over("1/2-1/2", "draw", Some("")));
        assert_eq!(fx.room.snapshot().status, GameStatus::Finished);

        fx.send(&white, game_over("1-0", "resign", None));
        assert_eq!(last_error_code(&white), Some(ErrorCode::NotActive));
        assert_eq!(fx.room.snapshot().result.as_deref(), Some("1/2-1/2"));
    }

    #[test]
    fn moves_are_refused_unless_active() {
        let mut fx = Fixture::new(seed(GameStatus::Finished));
        let white = fx.join(Some(WHITE), Role::White);
        fx.play(&white, "e2e4");
        assert_eq!(last_error_code(&white), Some(ErrorCode::NotActive));

        fx.play(&white, "zz");
        assert_eq!(last_error_code(&white), Some(ErrorCode::NotActive));
    }

    #[test]
    fn malformed_notation_is_rejected() {
        let mut fx = Fixture::active();
        let white = fx.join(Some(WHITE), Role::White);
        fx.play(&white, "e2e9");
        assert_eq!(last_error_code(&white), Some(ErrorCode::InvalidMove));
        assert_eq!(fx.room.current_turn(), Side::White);
    }

    #[test]
    fn waiting_game_starts_when_both_seats_are_filled() {
        let mut fx = Fixture::new(seed(GameStatus::Waiting));
        let white = fx.join(Some(WHITE), Role::White);
        fx.advance(30);
        fx.play(&white, "e2e4");
        assert_eq!(last_error_code(&white), Some(ErrorCode::NotActive));

        let black = fx.join(Some(BLACK), Role::Black);
        let ServerMessage::Init(init) = black.last().unwrap() else {
            panic!("expected init");
        };
        assert_eq!(init.status, GameStatus::Active);
        assert_eq!(init.color, Role::Black);
        // The clock starts at activation, not at room creation.
        assert_eq!(fx.room.snapshot().last_move_at, fx.clock.now());

        fx.advance(2);
        fx.play(&white, "e2e4");
        assert_eq!(fx.room.snapshot().white_remaining_ms, 598_000);
    }

    #[test]
    fn activation_resends_init_to_members_who_joined_while_waiting() {
        let mut fx = Fixture::new(seed(GameStatus::Waiting));
        let white = fx.join(Some(WHITE), Role::White);
        let spectator = fx.join(None, Role::Spectator);
        for p in [&white, &spectator] {
            let ServerMessage::Init(init) = p.last().unwrap() else {
                panic!("expected init");
            };
            assert_eq!(init.status, GameStatus::Waiting);
            p.clear();
        }

        fx.advance(10);
        let black = fx.join(Some(BLACK), Role::Black);

        for (p, role) in [(&white, Role::White), (&spectator, Role::Spectator), (&black, Role::Black)] {
            let messages = p.messages();
            assert_eq!(messages.len(), 1, "{role} should get exactly one init");
            let ServerMessage::Init(init) = &messages[0] else {
                panic!("expected init for {role}");
            };
            assert_eq!(init.status, GameStatus::Active);
            assert_eq!(init.color, role);
            assert_eq!(init.last_move_at, fx.clock.now().timestamp_millis());
        }
    }

    #[test]
    fn joining_an_already_active_game_sends_init_only_to_the_newcomer() {
        let mut fx = Fixture::active();
        let white = fx.join(Some(WHITE), Role::White);
        let black = fx.join(Some(BLACK), Role::Black);
        white.clear();
        black.clear();

        let spectator = fx.join(None, Role::Spectator);
        assert!(white.messages().is_empty());
        assert!(black.messages().is_empty());
        assert!(matches!(spectator.last(), Some(ServerMessage::Init(_))));
    }

    #[test]
    fn full_outbound_queue_drops_only_that_participant() {
        let mut fx = Fixture::active();
        let white = fx.join(Some(WHITE), Role::White);
        let slow = RecordingParticipant::with_capacity(None, 1);
        fx.room.handle(RoomCommand::Register {
            participant: slow.clone(),
            role: Role::Spectator,
        });
        let fast = fx.join(None, Role::Spectator);

        fx.play(&white, "e2e4");

        assert!(slow.is_closed());
        let snapshot = fx.room.snapshot();
        assert_eq!(snapshot.participants.len(), 2);
        assert!(matches!(fast.last(), Some(ServerMessage::Move(_))));
        assert!(matches!(white.last(), Some(ServerMessage::Move(_))));
    }

    #[test]
    fn persisted_progress_is_resumed() {
        let mut resumed = seed(GameStatus::Active);
        resumed.history = vec![UciMove::parse("e2e4").unwrap()];
        resumed.white_remaining = Some(Duration::from_secs(590));
        resumed.black_remaining = Some(Duration::from_secs(600));
        resumed.last_move_at = Some(t0());

        let mut fx = Fixture::new(resumed);
        let black = fx.join(Some(BLACK), Role::Black);
        fx.advance(10);
        fx.play(&black, "c7c5");

        let snapshot = fx.room.snapshot();
        assert_eq!(snapshot.history_str(), ["e2e4", "c7c5"]);
        assert_eq!(snapshot.white_remaining_ms, 590_000);
        assert_eq!(snapshot.black_remaining_ms, 590_000);
        let jobs = fx.drain_jobs();
        assert!(matches!(&jobs[0], PersistJob::AppendMove(r) if r.move_number == 2));
    }

    #[test]
    fn finished_room_without_physical_members_stops_on_tick() {
        let mut fx = Fixture::new(seed(GameStatus::Finished));
        let white = fx.join(Some(WHITE), Role::White);
        fx.room.handle(RoomCommand::ClockTick);
        assert!(!fx.room.is_stopped());

        fx.room.handle(RoomCommand::Unregister {
            connection_id: white.id(),
        });
        fx.room.handle(RoomCommand::ClockTick);
        assert!(fx.room.is_stopped());
    }

    #[test]
    fn active_room_is_never_evicted() {
        let mut fx = Fixture::active();
        fx.room.handle(RoomCommand::ClockTick);
        fx.advance(10);
        fx.room.handle(RoomCommand::ClockTick);
        assert!(!fx.room.is_stopped());
    }

    #[tokio::test]
    async fn run_loop_closes_members_and_queue_when_idle() {
        let Fixture { room, .. } = Fixture::new(seed(GameStatus::Finished));
        let (sender, commands) = mpsc::channel(8);
        let task = tokio::spawn(room.run(commands));

        let watcher = RecordingParticipant::new(None);
        sender
            .send(RoomCommand::Register {
                participant: watcher.clone(),
                role: Role::Spectator,
            })
            .await
            .unwrap();
        sender
            .send(RoomCommand::Unregister {
                connection_id: watcher.id(),
            })
            .await
            .unwrap();
        sender.send(RoomCommand::ClockTick).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(sender.is_closed());
    }

    #[test]
    fn unknown_connection_frames_are_ignored() {
        let mut fx = Fixture::active();
        let stranger = RecordingParticipant::new(Some(UserId::new(WHITE)));
        fx.play(&stranger, "e2e4");
        assert!(fx.room.snapshot().history.is_empty());
        assert!(stranger.messages().is_empty());
        assert!(matches!(fx.jobs.try_recv(), Err(TryRecvError::Empty)));
    }
}
