//! Prefix mounts: longest matching prefix wins.

use crate::error::RouteError;

/// A sub-handler bound to a path prefix.
#[derive(Debug)]
pub(crate) struct Mount<H> {
    pub(crate) prefix: String,
    pub(crate) handler: H,
}

/// Checks a mount prefix: starts with `/`, no trailing `/` unless it is `/`.
pub(crate) fn validate_prefix(prefix: &str) -> Result<(), RouteError> {
    if !prefix.starts_with('/') {
        return Err(RouteError::InvalidPrefix(prefix.to_owned()));
    }
    if prefix != "/" && prefix.ends_with('/') {
        return Err(RouteError::TrailingSlashPrefix(prefix.to_owned()));
    }
    Ok(())
}

/// Returns the mount with the longest prefix of `path` and the path left to
/// forward to it.
///
/// A prefix matches when it equals the path, when the path continues with `/`
/// right after it, or when it is `/` itself. Equal-length prefixes keep the
/// first registered.
pub(crate) fn longest_match<'m, 'p, H>(
    mounts: &'m [Mount<H>],
    path: &'p str,
) -> Option<(&'m Mount<H>, &'p str)> {
    let mut best: Option<(&Mount<H>, &str)> = None;
    for mount in mounts {
        let Some(rest) = strip_mount_prefix(path, &mount.prefix) else {
            continue;
        };
        if best.is_none_or(|(b, _)| mount.prefix.len() > b.prefix.len()) {
            best = Some((mount, rest));
        }
    }
    best
}

fn strip_mount_prefix<'p>(path: &'p str, prefix: &str) -> Option<&'p str> {
    if prefix == "/" {
        return path.starts_with('/').then_some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        return Some("/");
    }
    rest.starts_with('/').then_some(rest)
}
