use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Path of the staging copy of `output`: `<parent>/.<stage>-<uuid>/<name>`.
pub fn staged_output_path(output: &Path, stage: &str) -> PathBuf {
    let parent = output.parent().unwrap_or_else(|| Path::new("."));
    let file_name = output.file_name().unwrap_or_else(|| OsStr::new("output"));
    parent
        .join(format!(".{}-{}", stage, uuid::Uuid::new_v4()))
        .join(file_name)
}

/// Write a file through a staging copy, then move it over `output`.
///
/// The staging copy lives next to the destination so the final rename does
/// not cross file systems.
pub fn write_file_staged<F>(output: &Path, stage: &str, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let staged = staged_output_path(output, stage);
    let staging_dir = staged
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&staging_dir)
        .with_context(|| format!("creating staging dir {}", staging_dir.display()))?;

    let result = (|| -> Result<()> {
        let file =
            File::create(&staged).with_context(|| format!("creating {}", staged.display()))?;
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer
            .flush()
            .with_context(|| format!("flushing {}", staged.display()))?;
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::rename(&staged, output)
            .with_context(|| format!("moving {} to {}", staged.display(), output.display()))
    })();

    if let Err(err) = fs::remove_dir_all(&staging_dir) {
        if staging_dir.exists() {
            warn!("could not remove staging dir {}: {err}", staging_dir.display());
        }
    }
    result
}

/// Build a directory in a staging location next to `dest`, then move it into
/// place.
///
/// An existing `dest` is first renamed aside and removed once the new
/// directory is in place, so a concurrent reader sees either the old or the
/// new tree. A failing `build` leaves `dest` untouched.
pub fn replace_dir_staged<F>(dest: &Path, build: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .with_context(|| format!("creating directory {}", parent.display()))?;
    let name = dest
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or("bundle")
        .to_string();
    let token = uuid::Uuid::new_v4();
    let staging = parent.join(format!(".{name}.staging-{token}"));
    let retired = parent.join(format!(".{name}.old-{token}"));

    fs::create_dir_all(&staging)
        .with_context(|| format!("creating staging dir {}", staging.display()))?;
    if let Err(err) = build(&staging) {
        let _ = fs::remove_dir_all(&staging);
        return Err(err);
    }

    let had_previous = dest.exists();
    if had_previous {
        fs::rename(dest, &retired)
            .with_context(|| format!("moving {} aside", dest.display()))?;
    }
    if let Err(err) = fs::rename(&staging, dest) {
        if had_previous {
            let _ = fs::rename(&retired, dest);
        }
        let _ = fs::remove_dir_all(&staging);
        return Err(err).with_context(|| {
            format!("moving {} to {}", staging.display(), dest.display())
        });
    }
    if had_previous {
        if let Err(err) = fs::remove_dir_all(&retired) {
            warn!("could not remove retired dir {}: {err}", retired.display());
        }
    }
    debug!("replaced {}", dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use tempfile::tempdir;

    #[test]
    fn staged_write_lands_at_destination() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("nested/out.txt");
        write_file_staged(&out, "test", |w| {
            w.write_all(b"hello")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "hello");
        // only the file itself remains in the parent
        let entries: Vec<_> = fs::read_dir(out.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn failed_write_keeps_previous_file() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.txt");
        fs::write(&out, "old").unwrap();
        let err = write_file_staged(&out, "test", |_| Err(anyhow!("boom")));
        assert!(err.is_err());
        assert_eq!(fs::read_to_string(&out).unwrap(), "old");
    }

    #[test]
    fn directory_replacement_swaps_contents() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("bundle");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("stale.txt"), "x").unwrap();

        replace_dir_staged(&dest, |staging| {
            fs::write(staging.join("fresh.txt"), "y")?;
            Ok(())
        })
        .unwrap();

        assert!(!dest.join("stale.txt").exists());
        assert_eq!(fs::read_to_string(dest.join("fresh.txt")).unwrap(), "y");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn failed_build_leaves_destination_alone() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("bundle");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("keep.txt"), "x").unwrap();

        let result = replace_dir_staged(&dest, |_| Err(anyhow!("simulator inputs broken")));
        assert!(result.is_err());
        assert!(dest.join("keep.txt").exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
