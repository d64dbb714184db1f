use std::{
    fmt::Display,
    path::{Path, PathBuf},
    process::Stdio,
    str::FromStr,
};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use super::{CaptureError, Screenshot};

const PATH_PLACEHOLDER: &str = "{path}";

/// Directory owning screenshot files. The activity log only keeps file names, this resolves them
/// back for readers.
#[derive(Debug, Clone)]
pub struct ScreenshotStore {
    dir: PathBuf,
}

impl ScreenshotStore {
    pub fn new(dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Creates a handle without touching the disk. Used by readers that must not create
    /// directories.
    pub fn open(dir: PathBuf) -> Self {
        Self { dir }
    }

    #[cfg(test)]
    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reference and full path of the screenshot taken at `moment`.
    pub fn allocate(&self, moment: DateTime<Utc>) -> (String, PathBuf) {
        let reference = format!("screenshot_{}.png", moment.format("%Y%m%d_%H%M%S"));
        let path = self.dir.join(&reference);
        (reference, path)
    }

    /// Path of an existing screenshot. References are plain file names, anything that tries to
    /// leave the directory resolves to nothing.
    pub fn resolve(&self, reference: &str) -> Option<PathBuf> {
        let name = Path::new(reference).file_name()?;
        if name != reference {
            return None;
        }
        let path = self.dir.join(name);
        path.is_file().then_some(path)
    }
}

/// External program that writes a PNG of the whole desktop to the path it is given.
/// `{path}` in the arguments is replaced with the target file, when absent the path is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotCommand {
    program: String,
    args: Vec<String>,
}

impl ScreenshotCommand {
    fn arguments_for(&self, path: &Path) -> Vec<String> {
        let path = path.to_string_lossy();
        let mut args = self
            .args
            .iter()
            .map(|v| v.replace(PATH_PLACEHOLDER, &path))
            .collect::<Vec<_>>();
        if !self.args.iter().any(|v| v.contains(PATH_PLACEHOLDER)) {
            args.push(path.into_owned());
        }
        args
    }
}

impl FromStr for ScreenshotCommand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("Screenshot command can't be empty"))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl Display for ScreenshotCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

pub struct CommandScreenshotter {
    command: ScreenshotCommand,
    store: ScreenshotStore,
}

impl CommandScreenshotter {
    pub fn new(command: ScreenshotCommand, store: ScreenshotStore) -> Self {
        Self { command, store }
    }

    #[instrument(skip(self))]
    pub async fn take(&self, moment: DateTime<Utc>) -> Result<Screenshot, CaptureError> {
        let (reference, path) = self.store.allocate(moment);

        let output = tokio::process::Command::new(&self.command.program)
            .args(self.command.arguments_for(&path))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CaptureError::Spawn {
                program: self.command.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CaptureError::CommandFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let bytes = tokio::fs::read(&path).await.map_err(CaptureError::Read)?;
        if bytes.is_empty() {
            return Err(CaptureError::EmptyScreenshot);
        }
        debug!("Screenshot saved to {path:?}");
        Ok(Screenshot { reference, bytes })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use anyhow::Result;
    use chrono::{NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    use super::{ScreenshotCommand, ScreenshotStore};

    #[test]
    fn placeholder_is_substituted() {
        let command: ScreenshotCommand = "import -window root {path}".parse().unwrap();
        assert_eq!(
            command.arguments_for(Path::new("/tmp/a.png")),
            vec!["-window", "root", "/tmp/a.png"]
        );

        let appended: ScreenshotCommand = "grim".parse().unwrap();
        assert_eq!(appended.arguments_for(Path::new("/tmp/a.png")), vec!["/tmp/a.png"]);
        assert_eq!(appended.to_string(), "grim");

        assert!("   ".parse::<ScreenshotCommand>().is_err());
    }

    #[test]
    fn references_are_timestamped_file_names() -> Result<()> {
        let dir = tempdir()?;
        let store = ScreenshotStore::new(dir.path().join("screenshots"))?;
        let moment = Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2025, 3, 15)
                .unwrap()
                .and_hms_opt(9, 5, 7)
                .unwrap(),
        );
        let (reference, path) = store.allocate(moment);
        assert_eq!(reference, "screenshot_20250315_090507.png");
        assert_eq!(path, store.dir().join(&reference));
        Ok(())
    }

    #[test]
    fn resolve_stays_inside_directory() -> Result<()> {
        let dir = tempdir()?;
        let store = ScreenshotStore::new(dir.path().join("screenshots"))?;
        std::fs::write(store.dir().join("screenshot_1.png"), b"png")?;
        std::fs::write(dir.path().join("secret.png"), b"png")?;

        assert!(store.resolve("screenshot_1.png").is_some());
        assert!(store.resolve("missing.png").is_none());
        assert!(store.resolve("../secret.png").is_none());
        Ok(())
    }
}
