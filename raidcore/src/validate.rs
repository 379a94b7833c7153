//! Username charset/length, opcode whitelist, and payload-size-per-opcode
//! validation. Any failure here is fatal to the connection.

use crate::protocol::{self, Opcode};

pub const MAX_USERNAME_LEN: usize = protocol::MAX_USERNAME - 1;
pub const MAX_ATTACK_DAMAGE: i32 = 1000;

pub fn validate_username(s: &str) -> bool {
    if s.is_empty() || s.len() > MAX_USERNAME_LEN {
        return false;
    }
    s.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Server-only direction set: the opcodes the server will accept from a
/// client. Anything else, including the server's own reply opcodes, is
/// rejected on ingress.
pub fn validate_opcode(opcode: u16) -> Option<Opcode> {
    Opcode::from_u16(opcode).filter(|op| protocol::is_client_opcode(*op))
}

pub fn validate_packet_size(opcode: Opcode, length: u32) -> bool {
    let expected = protocol::HEADER_SIZE + opcode.fixed_payload_size();
    length as usize == expected
}

pub fn validate_attack_payload(damage: i32) -> bool {
    (0..=MAX_ATTACK_DAMAGE).contains(&damage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_accepts_alnum_dash_underscore() {
        assert!(validate_username("alice_01-x"));
    }

    #[test]
    fn username_rejects_empty() {
        assert!(!validate_username(""));
    }

    #[test]
    fn username_rejects_too_long() {
        let long = "a".repeat(MAX_USERNAME_LEN + 1);
        assert!(!validate_username(&long));
    }

    #[test]
    fn username_rejects_illegal_chars() {
        assert!(!validate_username("al ice"));
        assert!(!validate_username("alice!"));
    }

    #[test]
    fn opcode_whitelist_excludes_server_opcodes() {
        assert!(validate_opcode(0x10).is_some());
        assert!(validate_opcode(0x20).is_none());
        assert!(validate_opcode(0xFFFF).is_none());
    }

    #[test]
    fn packet_size_matches_fixed_payload() {
        assert!(validate_packet_size(
            Opcode::Leave,
            protocol::HEADER_SIZE as u32
        ));
        assert!(!validate_packet_size(
            Opcode::Leave,
            protocol::HEADER_SIZE as u32 + 1
        ));
    }

    #[test]
    fn attack_damage_bounds() {
        assert!(validate_attack_payload(0));
        assert!(validate_attack_payload(1000));
        assert!(!validate_attack_payload(-1));
        assert!(!validate_attack_payload(1001));
    }
}
