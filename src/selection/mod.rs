//! Selection cache
//!
//! Bridges the two steps of a quality pick: choices are registered here under
//! fresh tokens when offered, and resolved back to download parameters when
//! the user presses one. Losing an entry early only means the user has to
//! send the link again.
//!
//! - [`SelectionCache`] - bounded store with `put`/`get`/`sweep`/`enforce_capacity`
//! - [`SelectionEntry`] - parameters needed to run the chosen download
//! - [`spawn_sweeper`] - periodic age-based eviction task

mod cache;
mod sweeper;

pub use cache::{SelectionCache, SelectionEntry, SweepStats};
pub use sweeper::spawn_sweeper;

/// Fresh, collision-resistant selection token (32 hex chars, fits in
/// chat callback payloads)
pub fn new_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique_and_compact() {
        let a = new_token();
        let b = new_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
