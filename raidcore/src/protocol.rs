//! Framed binary wire protocol: header, payload variants, checksum.
//!
//! Layout mirrors the original `PacketHeader` / `GamePacket` union: a fixed
//! 12 byte header followed by one typed payload selected by opcode, little
//! endian, tightly packed.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::error::{ProtocolError, Result};

pub const HEADER_SIZE: usize = 12;
pub const MAX_USERNAME: usize = 32;
pub const MAX_ERROR_MESSAGE: usize = 64;

pub const JOIN_PAYLOAD_SIZE: usize = MAX_USERNAME;
pub const ATTACK_PAYLOAD_SIZE: usize = 4;
pub const LEAVE_PAYLOAD_SIZE: usize = 0;
pub const HEARTBEAT_PAYLOAD_SIZE: usize = 0;
pub const JOIN_RESP_PAYLOAD_SIZE: usize = 5;
pub const GAME_STATE_PAYLOAD_SIZE: usize = 4 * 3 + 1 * 4 + 4 * 4 + MAX_USERNAME;
pub const ERROR_PAYLOAD_SIZE: usize = MAX_ERROR_MESSAGE;

pub const MAX_PAYLOAD_SIZE: usize = GAME_STATE_PAYLOAD_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    Join = 0x10,
    Attack = 0x11,
    Leave = 0x12,
    Heartbeat = 0x13,
    JoinResp = 0x20,
    GameState = 0x21,
    Error = 0x22,
}

impl Opcode {
    pub fn from_u16(v: u16) -> Option<Opcode> {
        match v {
            0x10 => Some(Opcode::Join),
            0x11 => Some(Opcode::Attack),
            0x12 => Some(Opcode::Leave),
            0x13 => Some(Opcode::Heartbeat),
            0x20 => Some(Opcode::JoinResp),
            0x21 => Some(Opcode::GameState),
            0x22 => Some(Opcode::Error),
            _ => None,
        }
    }

    /// Fixed payload size for opcodes whose payload size never varies.
    pub fn fixed_payload_size(self) -> usize {
        match self {
            Opcode::Join => JOIN_PAYLOAD_SIZE,
            Opcode::Attack => ATTACK_PAYLOAD_SIZE,
            Opcode::Leave => LEAVE_PAYLOAD_SIZE,
            Opcode::Heartbeat => HEARTBEAT_PAYLOAD_SIZE,
            Opcode::JoinResp => JOIN_RESP_PAYLOAD_SIZE,
            Opcode::GameState => GAME_STATE_PAYLOAD_SIZE,
            Opcode::Error => ERROR_PAYLOAD_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub length: u32,
    pub opcode: u16,
    pub checksum: u16,
    pub seq_num: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Join { username: [u8; MAX_USERNAME] },
    Attack { damage: i32 },
    Leave,
    Heartbeat,
    JoinResp { player_id: i32, status: u8 },
    GameState(GameStateSnapshot),
    Error { message: [u8; MAX_ERROR_MESSAGE] },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameStateSnapshot {
    pub boss_hp: i32,
    pub max_hp: i32,
    pub online_count: i32,
    pub stage: u8,
    pub is_respawning: u8,
    pub is_crit: u8,
    pub is_lucky: u8,
    pub last_player_damage: i32,
    pub last_boss_dice: i32,
    pub last_player_streak: i32,
    pub dmg_taken: i32,
    pub last_killer: [u8; MAX_USERNAME],
}

impl Default for GameStateSnapshot {
    fn default() -> Self {
        GameStateSnapshot {
            boss_hp: 0,
            max_hp: 0,
            online_count: 0,
            stage: 0,
            is_respawning: 0,
            is_crit: 0,
            is_lucky: 0,
            last_player_damage: 0,
            last_boss_dice: 0,
            last_player_streak: 0,
            dmg_taken: 0,
            last_killer: [0u8; MAX_USERNAME],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: Header,
    pub payload: Payload,
}

/// Copies a Rust `&str` into a fixed-size, null-terminated/padded buffer,
/// truncating to fit. Mirrors the original's `strncpy(..., N - 1)` plus
/// explicit nul pad.
pub fn pack_fixed_str(s: &str, buf: &mut [u8]) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(buf.len().saturating_sub(1));
    buf[..n].copy_from_slice(&bytes[..n]);
    for b in &mut buf[n..] {
        *b = 0;
    }
}

pub fn unpack_fixed_str(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

fn checksum(bytes: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for &b in bytes {
        sum = sum.wrapping_add(b as u32);
    }
    (sum & 0xFFFF) as u16
}

impl Packet {
    /// Encodes this packet to wire bytes, filling in `length` and `checksum`.
    pub fn encode(&self) -> Vec<u8> {
        let payload_bytes = encode_payload(&self.payload);
        let length = (HEADER_SIZE + payload_bytes.len()) as u32;
        let cksum = checksum(&payload_bytes);

        let mut out = Vec::with_capacity(length as usize);
        out.write_u32::<LittleEndian>(length).unwrap();
        out.write_u16::<LittleEndian>(self.header.opcode).unwrap();
        out.write_u16::<LittleEndian>(cksum).unwrap();
        out.write_u32::<LittleEndian>(self.header.seq_num).unwrap();
        out.extend_from_slice(&payload_bytes);
        out
    }

    pub fn new(opcode: Opcode, seq_num: u32, payload: Payload) -> Packet {
        Packet {
            header: Header {
                length: 0,
                opcode: opcode as u16,
                checksum: 0,
                seq_num,
            },
            payload,
        }
    }

    /// Reads exactly one packet from `stream`. Retries on `Interrupted`;
    /// any other IO failure, framing violation, or checksum mismatch is
    /// fatal to the connection.
    pub fn decode<R: Read>(stream: &mut R) -> Result<Packet> {
        let mut header_buf = [0u8; HEADER_SIZE];
        read_exact_retrying(stream, &mut header_buf)?;

        let mut cursor = &header_buf[..];
        let length = cursor.read_u32::<LittleEndian>()?;
        let opcode = cursor.read_u16::<LittleEndian>()?;
        let expected_checksum = cursor.read_u16::<LittleEndian>()?;
        let seq_num = cursor.read_u32::<LittleEndian>()?;

        if (length as usize) < HEADER_SIZE || (length as usize) > HEADER_SIZE + MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::ProtocolFraming);
        }

        let payload_len = length as usize - HEADER_SIZE;
        let mut payload_buf = vec![0u8; payload_len];
        read_exact_retrying(stream, &mut payload_buf)?;

        if checksum(&payload_buf) != expected_checksum {
            return Err(ProtocolError::ChecksumMismatch);
        }

        let op = Opcode::from_u16(opcode).ok_or(ProtocolError::InvalidOpcode)?;
        let payload = decode_payload(op, &payload_buf)?;

        Ok(Packet {
            header: Header {
                length,
                opcode,
                checksum: expected_checksum,
                seq_num,
            },
            payload,
        })
    }
}

fn read_exact_retrying<R: Read>(stream: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return Err(ProtocolError::TransportClosed),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn encode_payload(payload: &Payload) -> Vec<u8> {
    let mut out = Vec::new();
    match payload {
        Payload::Join { username } => out.extend_from_slice(username),
        Payload::Attack { damage } => out.write_i32::<LittleEndian>(*damage).unwrap(),
        Payload::Leave | Payload::Heartbeat => {}
        Payload::JoinResp { player_id, status } => {
            out.write_i32::<LittleEndian>(*player_id).unwrap();
            out.write_u8(*status).unwrap();
        }
        Payload::GameState(s) => {
            out.write_i32::<LittleEndian>(s.boss_hp).unwrap();
            out.write_i32::<LittleEndian>(s.max_hp).unwrap();
            out.write_i32::<LittleEndian>(s.online_count).unwrap();
            out.write_u8(s.stage).unwrap();
            out.write_u8(s.is_respawning).unwrap();
            out.write_u8(s.is_crit).unwrap();
            out.write_u8(s.is_lucky).unwrap();
            out.write_i32::<LittleEndian>(s.last_player_damage).unwrap();
            out.write_i32::<LittleEndian>(s.last_boss_dice).unwrap();
            out.write_i32::<LittleEndian>(s.last_player_streak).unwrap();
            out.write_i32::<LittleEndian>(s.dmg_taken).unwrap();
            out.extend_from_slice(&s.last_killer);
        }
        Payload::Error { message } => out.extend_from_slice(message),
    }
    out
}

fn decode_payload(opcode: Opcode, buf: &[u8]) -> Result<Payload> {
    let expected = opcode.fixed_payload_size();
    if buf.len() != expected {
        return Err(ProtocolError::ProtocolFraming);
    }

    let mut cursor = buf;
    Ok(match opcode {
        Opcode::Join => {
            let mut username = [0u8; MAX_USERNAME];
            username.copy_from_slice(buf);
            Payload::Join { username }
        }
        Opcode::Attack => Payload::Attack {
            damage: cursor.read_i32::<LittleEndian>()?,
        },
        Opcode::Leave => Payload::Leave,
        Opcode::Heartbeat => Payload::Heartbeat,
        Opcode::JoinResp => Payload::JoinResp {
            player_id: cursor.read_i32::<LittleEndian>()?,
            status: cursor.read_u8()?,
        },
        Opcode::GameState => {
            let mut s = GameStateSnapshot::default();
            s.boss_hp = cursor.read_i32::<LittleEndian>()?;
            s.max_hp = cursor.read_i32::<LittleEndian>()?;
            s.online_count = cursor.read_i32::<LittleEndian>()?;
            s.stage = cursor.read_u8()?;
            s.is_respawning = cursor.read_u8()?;
            s.is_crit = cursor.read_u8()?;
            s.is_lucky = cursor.read_u8()?;
            s.last_player_damage = cursor.read_i32::<LittleEndian>()?;
            s.last_boss_dice = cursor.read_i32::<LittleEndian>()?;
            s.last_player_streak = cursor.read_i32::<LittleEndian>()?;
            s.dmg_taken = cursor.read_i32::<LittleEndian>()?;
            cursor.read_exact(&mut s.last_killer)?;
            Payload::GameState(s)
        }
        Opcode::Error => {
            let mut message = [0u8; MAX_ERROR_MESSAGE];
            message.copy_from_slice(buf);
            Payload::Error { message }
        }
    })
}

/// Opcodes the server accepts from a client (the C→S direction set). Any
/// other value, including the server's own S→C opcodes, is rejected on
/// ingress by the input validator.
pub fn is_client_opcode(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::Join | Opcode::Attack | Opcode::Leave | Opcode::Heartbeat
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn join_round_trips() {
        let mut username = [0u8; MAX_USERNAME];
        pack_fixed_str("alice", &mut username);
        let packet = Packet::new(Opcode::Join, 7, Payload::Join { username });
        let bytes = packet.encode();
        let mut cursor = Cursor::new(bytes);
        let decoded = Packet::decode(&mut cursor).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn leave_and_heartbeat_have_zero_payload() {
        for (op, payload) in [
            (Opcode::Leave, Payload::Leave),
            (Opcode::Heartbeat, Payload::Heartbeat),
        ] {
            let packet = Packet::new(op, 1, payload);
            let bytes = packet.encode();
            assert_eq!(bytes.len(), HEADER_SIZE);
            let mut cursor = Cursor::new(bytes);
            let decoded = Packet::decode(&mut cursor).unwrap();
            assert_eq!(decoded, packet);
        }
    }

    #[test]
    fn checksum_mismatch_is_rejected() {
        let packet = Packet::new(Opcode::Attack, 1, Payload::Attack { damage: 4 });
        let mut bytes = packet.encode();
        // Flip a payload byte without updating the checksum.
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let mut cursor = Cursor::new(bytes);
        assert!(matches!(
            Packet::decode(&mut cursor),
            Err(ProtocolError::ChecksumMismatch)
        ));
    }

    #[test]
    fn length_out_of_bounds_is_framing_error() {
        let mut bytes = vec![0u8; HEADER_SIZE];
        (&mut bytes[..4])
            .write_u32::<LittleEndian>((HEADER_SIZE + MAX_PAYLOAD_SIZE + 1) as u32)
            .unwrap();
        let mut cursor = Cursor::new(bytes);
        assert!(matches!(
            Packet::decode(&mut cursor),
            Err(ProtocolError::ProtocolFraming)
        ));
    }

    #[test]
    fn game_state_round_trips() {
        let mut last_killer = [0u8; MAX_USERNAME];
        pack_fixed_str("bob", &mut last_killer);
        let snapshot = GameStateSnapshot {
            boss_hp: 500,
            max_hp: 1000,
            online_count: 3,
            stage: 0,
            is_respawning: 0,
            is_crit: 1,
            is_lucky: 0,
            last_player_damage: 12,
            last_boss_dice: 5,
            last_player_streak: 2,
            dmg_taken: 0,
            last_killer,
        };
        let packet = Packet::new(Opcode::GameState, 42, Payload::GameState(snapshot));
        let bytes = packet.encode();
        let mut cursor = Cursor::new(bytes);
        let decoded = Packet::decode(&mut cursor).unwrap();
        assert_eq!(decoded, packet);
    }
}
