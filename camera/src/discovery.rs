//! Locate video capture devices.
//!
//! Every `/dev` entry whose name contains `video` is a candidate. A candidate
//! is kept only if it can be opened and reports a frame width above zero;
//! metadata nodes of UVC cameras fail that check.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::source::Resolution;

pub const CANDIDATE_PATTERN: &str = "/dev/*video*";

/// All candidate device paths, in device-number order.
pub fn candidate_devices() -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = match glob::glob(CANDIDATE_PATTERN) {
        Ok(paths) => paths.filter_map(Result::ok).collect(),
        Err(e) => {
            debug!("Bad device pattern {CANDIDATE_PATTERN}: {e}");
            Vec::new()
        }
    };
    found.sort_by_cached_key(|path| device_order(path));
    found
}

/// Sort key that compares the trailing number numerically, so `video2`
/// comes before `video10`.
fn device_order(path: &Path) -> (String, Option<u64>, String) {
    let name = path.to_string_lossy();
    let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
    let number = name[stem.len()..].parse().ok();
    (stem.to_string(), number, name.to_string())
}

/// Keep the candidates whose `probe` reports a positive width, in input order.
///
/// `probe` returns `None` when a device cannot be opened.
pub fn probe_devices<P, F>(candidates: impl IntoIterator<Item = P>, probe: F) -> Vec<P>
where
    P: AsRef<Path>,
    F: Fn(&Path) -> Option<Resolution>,
{
    candidates
        .into_iter()
        .filter(|candidate| {
            let path = candidate.as_ref();
            match probe(path) {
                Some(resolution) if resolution.width > 0 => {
                    debug!("{}: usable at {resolution}", path.display());
                    true
                }
                Some(resolution) => {
                    debug!("{}: rejected, reports {resolution}", path.display());
                    false
                }
                None => {
                    debug!("{}: rejected, cannot open", path.display());
                    false
                }
            }
        })
        .collect()
}

/// Usable camera devices on this machine.
#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub fn discover_cameras() -> Vec<PathBuf> {
    probe_devices(candidate_devices(), crate::source::probe_resolution)
}

#[cfg(not(all(target_os = "linux", feature = "v4l2")))]
pub fn discover_cameras() -> Vec<PathBuf> {
    Vec::new()
}
