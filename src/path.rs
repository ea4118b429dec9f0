//! Entry name canonicalization and Zip Slip detection
//!
//! Names are resolved lexically against an implicit archive root: both `/`
//! and `\` separate segments, empty and `.` segments vanish, and `..` pops
//! the previous segment. A `..` with nothing left to pop is kept, which is
//! exactly what makes a name escape the root.

/// Separator used inside archive entry names
pub const ENTRY_SEPARATOR: char = '/';

const PARENT: &str = "..";
const CURRENT: &str = ".";

/// Resolve `.` and `..` segments of an entry name
///
/// Leading separators are dropped: entry names are always relative to the
/// archive root.
///
/// ```
/// use zipper::path::canonicalize;
///
/// assert_eq!(canonicalize("a/./b/../c.txt"), "a/c.txt");
/// assert_eq!(canonicalize("a/../../c.txt"), "../c.txt");
/// assert_eq!(canonicalize("\\dir\\file.txt"), "dir/file.txt");
/// ```
pub fn canonicalize(name: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in name.split(['/', '\\']) {
        match segment {
            "" | CURRENT => {}
            PARENT => match segments.last() {
                Some(&last) if last != PARENT => {
                    segments.pop();
                }
                _ => segments.push(PARENT),
            },
            other => segments.push(other),
        }
    }

    segments.join("/")
}

/// `false` when the canonical name resolves outside the archive root
pub fn is_safe(canonical: &str) -> bool {
    canonical.split(ENTRY_SEPARATOR).next() != Some(PARENT)
}
