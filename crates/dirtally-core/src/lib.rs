//! Core shared types for dirtally.
//!
//! This crate is intentionally small and has no dependencies beyond `serde`.

mod counters;
mod fs;
mod hash;

pub use counters::Counters;
pub use fs::{dir_entries, parent_dirs, path_bytes, path_from_bytes, sort_longest_first, DirEntryInfo, DirEntryKind};
pub use hash::{rs_hash, string_hash};

/// Best-effort conversion of a `catch_unwind` payload into a printable message.
pub fn panic_payload_to_str(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_readable() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_payload_to_str(&*payload), "boom");

        let payload = std::panic::catch_unwind(|| panic!("{}", String::from("owned"))).unwrap_err();
        assert_eq!(panic_payload_to_str(&*payload), "owned");

        let payload = std::panic::catch_unwind(|| std::panic::panic_any(7u32)).unwrap_err();
        assert_eq!(panic_payload_to_str(&*payload), "<non-string panic payload>");
    }
}
