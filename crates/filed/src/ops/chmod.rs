//! Permission changes through named mode policies.
//!
//! Callers name a policy rather than passing raw bits, which keeps the set
//! of grantable permissions closed. `aread` is additive: it ORs read and
//! execute into whatever bits a file already carries.

use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use super::{OpError, OpHandler, expect_params, parse_bool, run_blocking};

pub struct Chmod;

fn mode_policy(mode: &str) -> Result<(u32, bool), OpError> {
    // (bits, additive)
    match mode {
        "lock" => Ok((0o444, false)),
        "read" => Ok((0o555, false)),
        "owrite" => Ok((0o755, false)),
        "ogwrite" => Ok((0o775, false)),
        "write" => Ok((0o777, false)),
        "aread" => Ok((0o555, true)),
        other => Err(OpError::UnsupportedMode(other.to_string())),
    }
}

fn apply_mode(path: &Path, bits: u32, additive: bool) -> std::io::Result<()> {
    let mode = if additive {
        std::fs::metadata(path)?.permissions().mode() | bits
    } else {
        bits
    };
    std::fs::set_permissions(path, Permissions::from_mode(mode))
}

#[async_trait]
impl OpHandler for Chmod {
    fn name(&self) -> &'static str {
        "chmod"
    }

    async fn execute(&self, params: &[String]) -> Result<Vec<String>, OpError> {
        expect_params(self.name(), 3, params)?;
        let (bits, additive) = mode_policy(&params[0])?;
        let recursive = parse_bool(&params[1])?;
        let path = PathBuf::from(&params[2]);

        let meta = tokio::fs::metadata(&path).await?;
        if recursive && meta.is_dir() {
            run_blocking(move || {
                for entry in WalkDir::new(&path) {
                    let entry = entry.map_err(std::io::Error::from)?;
                    apply_mode(entry.path(), bits, additive)?;
                }
                Ok(())
            })
            .await?;
        } else {
            apply_mode(&path, bits, additive)?;
        }

        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|p| p.to_string()).collect()
    }

    fn mode_of(path: &Path) -> u32 {
        std::fs::metadata(path).unwrap().permissions().mode() & 0o7777
    }

    #[tokio::test]
    async fn named_policies_map_to_bits() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("target");
        std::fs::write(&file, b"x").unwrap();
        let path = file.display().to_string();

        for (policy, expected) in [
            ("lock", 0o444),
            ("read", 0o555),
            ("owrite", 0o755),
            ("ogwrite", 0o775),
            ("write", 0o777),
        ] {
            Chmod
                .execute(&args(&[policy, "false", &path]))
                .await
                .unwrap();
            assert_eq!(mode_of(&file), expected, "{policy}");
        }
    }

    #[tokio::test]
    async fn aread_is_additive() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("target");
        std::fs::write(&file, b"x").unwrap();
        std::fs::set_permissions(&file, Permissions::from_mode(0o600)).unwrap();

        Chmod
            .execute(&args(&["aread", "false", &file.display().to_string()]))
            .await
            .unwrap();
        assert_eq!(mode_of(&file), 0o755);
    }

    #[tokio::test]
    async fn recursive_reaches_nested_entries() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("a/b");
        std::fs::create_dir_all(&sub).unwrap();
        let leaf = sub.join("leaf");
        std::fs::write(&leaf, b"x").unwrap();

        Chmod
            .execute(&args(&["read", "true", &dir.path().display().to_string()]))
            .await
            .unwrap();
        assert_eq!(mode_of(&leaf), 0o555);
        assert_eq!(mode_of(&sub), 0o555);
    }

    #[tokio::test]
    async fn unknown_policy_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = Chmod
            .execute(&args(&["rwx", "false", &dir.path().display().to_string()]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unsupported file mode rwx");
    }

    #[tokio::test]
    async fn missing_target_is_an_error() {
        let err = Chmod
            .execute(&args(&["read", "false", "/no/such/path"]))
            .await
            .unwrap_err();
        assert!(matches!(err, OpError::Io(_)));
    }
}
