//! Translation of backend listings into SFTP directory entries.
//!
//! Pure functions over [`ObjectListing`] values so the translation is
//! testable without a live backend. Common prefixes become directories,
//! objects become regular files, and a root listing for a scoped account
//! silently drops models outside the allow-list.

use crate::paths;
use crate::protocol::FileAttrs;
use chrono::{DateTime, Utc};
use firmgate_core::UserContext;
use firmgate_store::ObjectListing;

/// One SFTP_NAME entry.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub filename: String,
    pub longname: String,
    pub attrs: FileAttrs,
}

/// Translate a backend listing into directory entries.
///
/// `is_root` marks the namespace root: there, and only there, entries
/// whose name is a model outside the account's allow-list are omitted.
/// Deeper listings were already fenced by the path authorization, so
/// they pass through unfiltered.
pub fn translate(listing: &ObjectListing, user: &UserContext, is_root: bool) -> Vec<DirEntry> {
    let mut entries = Vec::with_capacity(listing.prefixes.len() + listing.objects.len());

    for prefix in &listing.prefixes {
        let name = paths::basename(prefix);
        if is_root && !user.permits_all_models() && !user.allows_model(name) {
            continue;
        }
        entries.push(directory_entry(name));
    }

    for object in &listing.objects {
        let name = paths::basename(&object.key);
        if name.is_empty() {
            // Placeholder object at the prefix itself.
            continue;
        }
        if is_root && !user.permits_all_models() && !user.allows_model(name) {
            // Loose files at the root are hidden from scoped accounts
            // the same way foreign models are.
            continue;
        }
        entries.push(file_entry(name, object.size, object.modified));
    }

    entries
}

pub fn directory_entry(name: &str) -> DirEntry {
    let attrs = FileAttrs::directory();
    DirEntry {
        longname: format_longname(name, &attrs),
        filename: name.to_string(),
        attrs,
    }
}

pub fn file_entry(name: &str, size: u64, modified: Option<DateTime<Utc>>) -> DirEntry {
    let attrs = FileAttrs::regular(size, modified);
    DirEntry {
        longname: format_longname(name, &attrs),
        filename: name.to_string(),
        attrs,
    }
}

/// ls(1)-style long listing line, as clients render in `ls -l` output.
fn format_longname(name: &str, attrs: &FileAttrs) -> String {
    let mode = attrs.permissions.unwrap_or(0);
    let type_char = if attrs.is_directory() { 'd' } else { '-' };

    let mut perms = String::with_capacity(9);
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        perms.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        perms.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        perms.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }

    let mtime = attrs
        .mtime
        .and_then(|t| DateTime::<Utc>::from_timestamp(i64::from(t), 0))
        .unwrap_or_else(Utc::now);

    format!(
        "{type_char}{perms} 1 {uid} {gid} {size:>12} {date} {name}",
        uid = attrs.uid.unwrap_or(0),
        gid = attrs.gid.unwrap_or(0),
        size = attrs.size.unwrap_or(0),
        date = mtime.format("%b %e %H:%M"),
    )
}
