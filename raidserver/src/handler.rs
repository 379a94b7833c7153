//! Per-connection state machine: `AwaitJoin -> Playing -> Closed`.
//! Composes the wire codec, replay guard, rate limiter, input validator,
//! and attack resolver; owns its connection exclusively.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use slog::{debug, info, o, warn, Logger};

use raidcore::error::{ProtocolError, Result};
use raidcore::protocol::{self, Opcode, Packet, Payload, MAX_USERNAME};
use raidcore::rate_limit::RateLimiter;
use raidcore::replay::ReplayGuard;
use raidcore::resolver::{AttackResolver, RngDiceSource};
use raidcore::state::SharedGameState;
use raidcore::time::timestamp_secs;
use raidcore::validate;
use raidcore::{SecureStream, ServerConfig};

/// Decrements `online_count` exactly once, on drop, if a JOIN ever
/// succeeded. Because this runs from `Drop` rather than from the tail of
/// `run`, the decrement still happens if a handler thread panics partway
/// through `play_loop` — unlike the original's process-per-connection
/// model, where a crashed worker's slot is reclaimed by the OS and never
/// decremented at all.
struct OnlineGuard {
    state: Arc<SharedGameState>,
    armed: bool,
}

impl OnlineGuard {
    fn new(state: Arc<SharedGameState>) -> OnlineGuard {
        OnlineGuard {
            state,
            armed: false,
        }
    }

    fn arm(&mut self) {
        self.armed = true;
    }
}

impl Drop for OnlineGuard {
    fn drop(&mut self) {
        if self.armed {
            self.state.player_leave();
        }
    }
}

/// Owns everything specific to one connection: the transport, the replay
/// guard, the rate limiter, and (once assigned) the player's identity.
pub struct ConnectionHandler<S: SecureStream> {
    stream: S,
    state: Arc<SharedGameState>,
    cfg: Arc<ServerConfig>,
    logger: Logger,
    replay: ReplayGuard,
    rate: RateLimiter,
    out_seq: u32,
    last_heartbeat_time: u64,
    player_id: Option<i32>,
    username: String,
    online_guard: OnlineGuard,
}

impl<S: SecureStream> ConnectionHandler<S> {
    pub fn new(
        stream: S,
        state: Arc<SharedGameState>,
        cfg: Arc<ServerConfig>,
        logger: Logger,
    ) -> ConnectionHandler<S> {
        let rate = RateLimiter::new(cfg.rate_max, cfg.rate_window_s);
        let online_guard = OnlineGuard::new(state.clone());
        ConnectionHandler {
            stream,
            state,
            cfg,
            logger,
            replay: ReplayGuard::new(),
            rate,
            out_seq: 0,
            last_heartbeat_time: 0,
            player_id: None,
            username: String::new(),
            online_guard,
        }
    }

    /// Runs the full connection lifecycle to completion. `online_count` is
    /// reconciled by `OnlineGuard` on drop, including on an unwinding
    /// panic; this only needs to shut down the transport.
    pub fn run(mut self) {
        let outcome = self.await_join().and_then(|()| self.play_loop());

        if let Err(e) = outcome {
            info!(self.logger, "connection closed"; "reason" => %e, "username" => &self.username);
        }

        let _ = self.stream.shutdown();
    }

    fn send(&mut self, opcode: Opcode, payload: Payload) -> Result<()> {
        self.out_seq = self.out_seq.wrapping_add(1);
        let packet = Packet::new(opcode, self.out_seq, payload);
        self.stream.write_all(&packet.encode())?;
        Ok(())
    }

    fn recv(&mut self) -> Result<Packet> {
        Packet::decode(&mut self.stream)
    }

    fn is_timeout(err: &ProtocolError) -> bool {
        matches!(
            err,
            ProtocolError::Io(e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut
        )
    }

    /// `AwaitJoin`: reads exactly one packet with no read-timeout, requires
    /// it to be a valid JOIN, and promotes the connection into `Playing`.
    fn await_join(&mut self) -> Result<()> {
        self.stream.set_read_timeout(None)?;

        let packet = self.recv()?;
        if !self.replay.validate(packet.header.seq_num) {
            return Err(ProtocolError::ReplayDetected);
        }

        let opcode = validate::validate_opcode(packet.header.opcode)
            .ok_or(ProtocolError::ProtocolOrder)?;
        if opcode != Opcode::Join {
            return Err(ProtocolError::ProtocolOrder);
        }

        let username = match &packet.payload {
            Payload::Join { username } => protocol::unpack_fixed_str(username),
            _ => return Err(ProtocolError::ProtocolFraming),
        };
        if !validate::validate_username(&username) {
            return Err(ProtocolError::InvalidUsername);
        }

        let player_id = self.state.player_join();
        self.player_id = Some(player_id);
        self.online_guard.arm();
        self.username = username.clone();
        self.logger = self.logger.new(o!("player" => username, "player_id" => player_id));

        info!(self.logger, "player joined"; "online_count" => self.state.snapshot().online_count);

        self.send(
            Opcode::JoinResp,
            Payload::JoinResp {
                player_id,
                status: 1,
            },
        )
    }

    /// `Playing`: reads packets with a receive timeout, enforces liveness,
    /// and dispatches by opcode until the connection closes.
    fn play_loop(&mut self) -> Result<()> {
        self.stream
            .set_read_timeout(Some(Duration::from_secs(self.cfg.read_timeout_s)))?;

        loop {
            let packet = match self.recv() {
                Ok(p) => p,
                Err(e) if Self::is_timeout(&e) => {
                    self.check_heartbeat_liveness()?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.check_heartbeat_liveness()?;

            if !self.rate.check() {
                warn!(self.logger, "rate limit exceeded"; "username" => &self.username);
                return Err(ProtocolError::RateLimitExceeded);
            }

            let opcode =
                validate::validate_opcode(packet.header.opcode).ok_or_else(|| {
                    warn!(self.logger, "invalid opcode"; "opcode" => packet.header.opcode);
                    ProtocolError::InvalidOpcode
                })?;

            if !validate::validate_packet_size(opcode, packet.header.length) {
                return Err(ProtocolError::InvalidPayload);
            }

            if !self.replay.validate(packet.header.seq_num) {
                warn!(self.logger, "replay detected"; "seq" => packet.header.seq_num);
                return Err(ProtocolError::ReplayDetected);
            }

            match opcode {
                Opcode::Attack => self.dispatch_attack(&packet.payload)?,
                Opcode::Heartbeat => self.dispatch_heartbeat()?,
                Opcode::Leave => {
                    info!(self.logger, "player left");
                    return Ok(());
                }
                Opcode::Join => return Err(ProtocolError::ProtocolOrder),
                _ => return Err(ProtocolError::InvalidOpcode),
            }
        }
    }

    fn check_heartbeat_liveness(&self) -> Result<()> {
        if self.last_heartbeat_time != 0 {
            let elapsed = timestamp_secs().saturating_sub(self.last_heartbeat_time);
            if elapsed > self.cfg.heartbeat_timeout_s {
                warn!(self.logger, "heartbeat timeout"; "elapsed_s" => elapsed);
                return Err(ProtocolError::HeartbeatTimeout);
            }
        }
        Ok(())
    }

    fn dispatch_attack(&mut self, payload: &Payload) -> Result<()> {
        let damage = match payload {
            Payload::Attack { damage } => *damage,
            _ => return Err(ProtocolError::ProtocolFraming),
        };
        if !validate::validate_attack_payload(damage) {
            return Err(ProtocolError::InvalidPayload);
        }

        let mut rng = rand::thread_rng();
        let mut dice = RngDiceSource::new(&mut rng);
        let (result, snapshot) =
            AttackResolver::resolve(&self.state, &mut dice, damage, &self.username);

        debug!(
            self.logger,
            "attack resolved";
            "boss_dice" => result.boss_dice,
            "dmg_dealt" => result.dmg_dealt,
            "dmg_taken" => result.dmg_taken,
            "streak" => result.current_streak,
            "crit" => result.is_crit,
        );

        let now = timestamp_secs();
        let mut game_state = snapshot.to_heartbeat_payload(now);
        game_state.is_crit = result.is_crit as u8;
        game_state.is_lucky = result.is_lucky_kill as u8;
        game_state.last_player_damage = result.dmg_dealt;
        game_state.last_boss_dice = result.boss_dice;
        game_state.last_player_streak = result.current_streak;
        game_state.dmg_taken = result.dmg_taken;

        if result.boss_just_died {
            info!(self.logger, "boss defeated"; "killer" => &self.username);
        }

        self.send(Opcode::GameState, Payload::GameState(game_state))
    }

    fn dispatch_heartbeat(&mut self) -> Result<()> {
        self.last_heartbeat_time = timestamp_secs();

        let snapshot = self.state.snapshot();
        let now = timestamp_secs();
        if snapshot.has_lucky_event && !snapshot.lucky_still_visible(now) {
            self.state.clear_lucky_kill();
        }

        let game_state = snapshot.to_heartbeat_payload(now);
        self.send(Opcode::GameState, Payload::GameState(game_state))
    }
}

/// Converts a username into a fixed `last_killer`/username wire buffer.
/// Exposed for the acceptor's JOIN handling of raw bytes before this
/// module's `Payload::Join` variant is constructed.
pub fn pack_username(username: &str) -> [u8; MAX_USERNAME] {
    let mut buf = [0u8; MAX_USERNAME];
    protocol::pack_fixed_str(username, &mut buf);
    buf
}
