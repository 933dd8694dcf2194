use rand::Rng;
use std::sync::Mutex;

const BASE62: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Total length of the part after the prefix: 12 hex chars of time plus a
/// random base62 tail.
const BODY_LENGTH: usize = 26;

/// Identifier families used across the workspace. Ids sort by creation time
/// within a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Thread,
    Message,
    ToolCall,
    File,
}

impl IdKind {
    fn prefix(&self) -> &'static str {
        match self {
            IdKind::Thread => "thr",
            IdKind::Message => "msg",
            IdKind::ToolCall => "tool",
            IdKind::File => "fil",
        }
    }
}

static SEQUENCE: Mutex<(u64, u32)> = Mutex::new((0, 0));

fn random_tail(length: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut tail = String::with_capacity(length);
    for _ in 0..length {
        let idx = rng.gen_range(0..62);
        tail.push(BASE62[idx] as char);
    }
    tail
}

/// Ids created within the same millisecond get an increasing sequence number
/// so that sort order matches creation order.
fn next_sequence(millis: u64) -> u32 {
    let mut guard = SEQUENCE.lock().unwrap();
    if guard.0 != millis {
        *guard = (millis, 0);
    }
    guard.1 += 1;
    guard.1
}

pub fn generate(kind: IdKind) -> String {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;
    generate_at(kind, millis)
}

pub fn generate_at(kind: IdKind, millis: u64) -> String {
    let ordinal = millis * 0x1000 + u64::from(next_sequence(millis));

    let mut time_bytes = [0u8; 6];
    for (i, byte) in time_bytes.iter_mut().enumerate() {
        *byte = ((ordinal >> (40 - 8 * i)) & 0xff) as u8;
    }

    format!(
        "{}_{}{}",
        kind.prefix(),
        hex::encode(time_bytes),
        random_tail(BODY_LENGTH - 12)
    )
}

/// Extract the creation time (unix millis) encoded in an id.
pub fn created_millis(id: &str) -> Option<u64> {
    let (_, body) = id.split_once('_')?;
    let encoded = u64::from_str_radix(body.get(0..12)?, 16).ok()?;
    Some(encoded / 0x1000)
}

pub fn is_kind(id: &str, kind: IdKind) -> bool {
    id.starts_with(kind.prefix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_id_has_prefix_and_length() {
        let id = generate(IdKind::Message);
        assert!(id.starts_with("msg_"));
        assert_eq!(id.len(), "msg".len() + 1 + BODY_LENGTH);
    }

    #[test]
    fn created_millis_round_trips() {
        let id = generate_at(IdKind::Thread, 1700000000000);
        assert_eq!(created_millis(&id), Some(1700000000000));
    }

    #[test]
    fn ids_sort_by_creation_time() {
        let a = generate_at(IdKind::Message, 1700000000000);
        let b = generate_at(IdKind::Message, 1700000000001);
        assert!(a[..16] < b[..16]);
    }

    #[test]
    fn kind_check_matches_prefix() {
        let id = generate(IdKind::ToolCall);
        assert!(is_kind(&id, IdKind::ToolCall));
        assert!(!is_kind(&id, IdKind::File));
    }
}
