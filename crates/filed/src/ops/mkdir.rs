//! Directory creation that reports what it actually created.
//!
//! `create_dir_all` would be enough to make the path, but callers need to
//! know the first segment that came into existence (to fix up permissions
//! or ownership afterwards), so the ancestry is walked by hand: find the
//! deepest existing directory, then create forward from there.

use std::fs::Permissions;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use async_trait::async_trait;

use super::{OpError, OpHandler, expect_params};

pub struct Mkdir;

fn parse_mode(raw: &str) -> Result<u32, OpError> {
    let digits = raw.strip_prefix("0o").unwrap_or(raw);
    u32::from_str_radix(digits, 8).map_err(|_| OpError::InvalidDirectoryMode(raw.to_string()))
}

#[async_trait]
impl OpHandler for Mkdir {
    fn name(&self) -> &'static str {
        "mkdir"
    }

    async fn execute(&self, params: &[String]) -> Result<Vec<String>, OpError> {
        expect_params(self.name(), 2, params)?;
        let mode = parse_mode(&params[0])?;
        let target = PathBuf::from(&params[1]);

        // Walk upwards until an existing ancestor is found, collecting the
        // segments that still need to be made.
        let mut missing: Vec<PathBuf> = Vec::new();
        let mut cursor = target.clone();
        loop {
            match tokio::fs::metadata(&cursor).await {
                Ok(meta) if meta.is_dir() => break,
                Ok(_) => {
                    return Err(OpError::AncestorNotADirectory {
                        path: target.display().to_string(),
                        ancestor: cursor.display().to_string(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    missing.push(cursor.clone());
                    match cursor.parent() {
                        Some(parent) if !parent.as_os_str().is_empty() => {
                            cursor = parent.to_path_buf();
                        }
                        _ => break,
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Create forward from the existing root, deepest segment last.
        let mut first_created: Option<PathBuf> = None;
        for dir in missing.iter().rev() {
            tokio::fs::create_dir(dir).await?;
            tokio::fs::set_permissions(dir, Permissions::from_mode(mode)).await?;
            if first_created.is_none() {
                first_created = Some(dir.clone());
            }
        }

        Ok(vec![
            first_created
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        ])
    }
}
