/// Whether the server can serve requests, as reported by `INFO persistence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// The server is still loading its dataset from disk.
    Loading { eta_seconds: Option<u64> },
}

/// Parses the `INFO persistence` reply.
///
/// A missing `loading` field counts as ready, matching servers that do not
/// report persistence state at all.
///
/// # Examples
///
/// ```
/// use varcache_core::connection::{parse_readiness, Readiness};
///
/// let info = "# Persistence\r\nloading:1\r\nloading_eta_seconds:4\r\n";
/// assert_eq!(parse_readiness(info), Readiness::Loading { eta_seconds: Some(4) });
/// assert_eq!(parse_readiness("loading:0"), Readiness::Ready);
/// ```
pub fn parse_readiness(info: &str) -> Readiness {
    let mut loading = false;
    let mut eta_seconds = None;

    for line in info.lines() {
        let Some((field, value)) = line.trim().split_once(':') else {
            continue;
        };
        match field {
            "loading" => loading = value.trim() == "1",
            "loading_eta_seconds" => eta_seconds = value.trim().parse().ok(),
            _ => {}
        }
    }

    if loading {
        Readiness::Loading { eta_seconds }
    } else {
        Readiness::Ready
    }
}
