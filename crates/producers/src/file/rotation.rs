//! Rotation policy and rotated-file naming

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Timestamp embedded in rotated file names
const ROTATED_TIMESTAMP: &str = "%Y-%m-%d_%H";

/// When an open file must be replaced
///
/// All trigger checks are pure over (created, now, size), which keeps
/// them idempotent and testable without touching a clock or a disk.
#[derive(Debug, Clone)]
pub struct RotationPolicy {
    enabled: bool,
    size_limit_bytes: u64,
    timeout_min: i64,
    rotate_at: Option<(u32, u32)>,
}

impl RotationPolicy {
    /// Policy with rotation disabled; only "no file open" and explicit
    /// rolls cause a new file
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            size_limit_bytes: u64::MAX,
            timeout_min: i64::MAX,
            rotate_at: None,
        }
    }

    /// Enabled policy from the configured triggers
    #[must_use]
    pub fn new(size_limit_mb: u64, timeout_min: u64, rotate_at: Option<(u32, u32)>) -> Self {
        Self {
            enabled: true,
            size_limit_bytes: size_limit_mb.saturating_mul(1 << 20),
            timeout_min: timeout_min.min(i64::MAX as u64) as i64,
            rotate_at,
        }
    }

    /// Whether timed/sized rotation is active at all
    #[inline]
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether any trigger fires for a file of `size_bytes` created at
    /// `created`, observed at `now`
    #[must_use]
    pub fn due(&self, created: DateTime<Local>, now: DateTime<Local>, size_bytes: u64) -> bool {
        if !self.enabled {
            return false;
        }
        if size_bytes >= self.size_limit_bytes {
            return true;
        }
        if now.signed_duration_since(created).num_minutes() >= self.timeout_min {
            return true;
        }
        if let Some((hour, minute)) = self.rotate_at {
            // A file created before today's rotate-at mark is due; the
            // check compares only the creation time against the mark.
            let today = now
                .date_naive()
                .and_hms_opt(hour, minute, 0)
                .and_then(|naive| naive.and_local_timezone(Local).single());
            if let Some(rotate_at) = today {
                if created < rotate_at {
                    return true;
                }
            }
        }
        false
    }
}

/// Derives target paths from the configured `dir/name.ext`
#[derive(Debug, Clone)]
pub struct FileNamer {
    dir: PathBuf,
    name: String,
    // Includes the leading dot, or empty for extension-less files.
    ext: String,
}

impl FileNamer {
    /// Split a configured file path into directory, stem and extension
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let path = Path::new(path);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "gollum".into());
        Self { dir, name, ext }
    }

    /// Directory all files land in
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Target when rotation is disabled: `dir/name.ext`
    #[must_use]
    pub fn plain(&self) -> (PathBuf, String) {
        let file_name = format!("{}{}", self.name, self.ext);
        (self.dir.join(&file_name), file_name)
    }

    /// Target for a new rotated file
    ///
    /// The name carries the hour timestamp; when files with the same
    /// signature already exist, a counter keeps names unique:
    /// `name_YYYY-MM-DD_HH[_N].ext`.
    pub fn rotated(&self, now: DateTime<Local>) -> io::Result<(PathBuf, String)> {
        let signature = format!("{}_{}", self.name, now.format(ROTATED_TIMESTAMP));

        let mut counter = 0usize;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().contains(&signature) {
                counter += 1;
            }
        }

        let file_name = if counter == 0 {
            format!("{signature}{}", self.ext)
        } else {
            format!("{signature}_{counter}{}", self.ext)
        };
        Ok((self.dir.join(&file_name), file_name))
    }

    /// The `name_current` symlink path
    #[must_use]
    pub fn current_symlink(&self) -> PathBuf {
        self.dir.join(format!("{}_current", self.name))
    }

    /// The `.gz` target for a rotated source file
    #[must_use]
    pub fn gzip_target(&self, source: &Path) -> PathBuf {
        let base = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = base.strip_suffix(&self.ext).unwrap_or(&base);
        self.dir.join(format!("{stem}.gz"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_disabled_policy_never_due() {
        let policy = RotationPolicy::disabled();
        assert!(!policy.due(
            local(2020, 1, 1, 0, 0, 0),
            local(2026, 1, 1, 0, 0, 0),
            u64::MAX - 1
        ));
    }

    #[test]
    fn test_size_trigger() {
        let policy = RotationPolicy::new(1, 999_999, None);
        let t = local(2026, 3, 1, 12, 0, 0);
        assert!(!policy.due(t, t, (1 << 20) - 1));
        assert!(policy.due(t, t, 1 << 20));
    }

    #[test]
    fn test_age_trigger() {
        let policy = RotationPolicy::new(u64::MAX >> 21, 60, None);
        let created = local(2026, 3, 1, 12, 0, 0);
        assert!(!policy.due(created, local(2026, 3, 1, 12, 59, 0), 0));
        assert!(policy.due(created, local(2026, 3, 1, 13, 0, 0), 0));
    }

    #[test]
    fn test_rotate_at_crossed_once() {
        // Scenario: rotate_at 00:00, file created 23:59, first append at
        // 00:00:30 rotates; a second check in the same minute does not.
        let policy = RotationPolicy::new(u64::MAX >> 21, 999_999, Some((0, 0)));

        let created = local(2026, 2, 28, 23, 59, 0);
        let now = local(2026, 3, 1, 0, 0, 30);
        assert!(policy.due(created, now, 0));

        // After rotation the new file's creation is past the mark.
        let created = now;
        let later = local(2026, 3, 1, 0, 0, 45);
        assert!(!policy.due(created, later, 0));
    }

    #[test]
    fn test_rotate_at_fires_for_file_created_before_mark() {
        // The trigger compares only the creation time against today's
        // mark; a file predating the mark is due even before the clock
        // reaches it.
        let policy = RotationPolicy::new(u64::MAX >> 21, 999_999, Some((23, 0)));
        let created = local(2026, 3, 1, 10, 0, 0);
        let now = local(2026, 3, 1, 15, 0, 0);
        assert!(policy.due(created, now, 0));
    }

    #[test]
    fn test_rotate_at_quiet_for_file_created_after_mark() {
        let policy = RotationPolicy::new(u64::MAX >> 21, 999_999, Some((23, 0)));
        let created = local(2026, 3, 1, 23, 30, 0);
        let now = local(2026, 3, 1, 23, 45, 0);
        assert!(!policy.due(created, now, 0));
    }

    #[test]
    fn test_due_is_idempotent() {
        let policy = RotationPolicy::new(1, 60, Some((12, 30)));
        let created = local(2026, 3, 1, 12, 0, 0);
        let now = local(2026, 3, 1, 12, 45, 0);
        let first = policy.due(created, now, 42);
        assert_eq!(first, policy.due(created, now, 42));
    }

    #[test]
    fn test_namer_splits_path() {
        let namer = FileNamer::from_path("/var/log/gollum/app.log");
        assert_eq!(namer.dir(), Path::new("/var/log/gollum"));
        let (path, name) = namer.plain();
        assert_eq!(name, "app.log");
        assert_eq!(path, Path::new("/var/log/gollum/app.log"));
        assert_eq!(
            namer.current_symlink(),
            Path::new("/var/log/gollum/app_current")
        );
    }

    #[test]
    fn test_namer_without_extension() {
        let namer = FileNamer::from_path("logs/plain");
        let (_, name) = namer.plain();
        assert_eq!(name, "plain");
    }

    #[test]
    fn test_rotated_names_count_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("app.log");
        let namer = FileNamer::from_path(&base.to_string_lossy());
        let now = local(2026, 3, 1, 14, 5, 0);

        let (first, first_name) = namer.rotated(now).unwrap();
        assert_eq!(first_name, "app_2026-03-01_14.log");
        fs::write(&first, b"x").unwrap();

        let (_, second_name) = namer.rotated(now).unwrap();
        assert_eq!(second_name, "app_2026-03-01_14_1.log");
    }

    #[test]
    fn test_gzip_target_strips_extension() {
        let namer = FileNamer::from_path("/logs/app.log");
        let target = namer.gzip_target(Path::new("/logs/app_2026-03-01_14.log"));
        assert_eq!(target, Path::new("/logs/app_2026-03-01_14.gz"));
    }
}
