/*!
Status-log helpers matching the original's `/SUBSYS-severity-MESSAGE`
shape (spec.md §6). The exact text is explicitly not a compatibility
contract, so these are thin formatting conveniences over `log::info!`/
`log::warn!`/`log::error!`, not a hand-rolled logger.
*/

/// Install `env_logger` once, honoring `RUST_LOG` the way every binary in
/// this crate's corpus does. Safe to call more than once; only the first
/// call takes effect.
pub fn init() {
    let _ = env_logger::try_init();
}

/// Format a `/SUBSYS-severity-MESSAGE` status line without emitting it;
/// callers still route the result through `log::info!`/`log::error!` so
/// level filtering and target metadata work normally.
pub fn status(subsys: &str, severity: char, message: &str) -> String {
    format!("/{subsys}-{severity}-{message}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_matches_shape() {
        assert_eq!(status("CPU", 'I', "HALT"), "/CPU-I-HALT");
    }
}
