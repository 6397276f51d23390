//! Ownership changes with name-to-id resolution through the system
//! user and group databases.

use std::path::PathBuf;

use async_trait::async_trait;
use nix::unistd::{Gid, Group, Uid, User};
use walkdir::WalkDir;

use super::{OpError, OpHandler, expect_params, parse_bool, run_blocking};

pub struct Chown;

/// Split an `owner[:group]` spec into its parts.
pub(crate) fn parse_owner(raw: &str) -> Result<(String, Option<String>), OpError> {
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() > 2 || parts[0].is_empty() {
        return Err(OpError::InvalidOwner(raw.to_string()));
    }
    let group = match parts.get(1) {
        Some(g) if !g.is_empty() => Some(g.to_string()),
        Some(_) => return Err(OpError::InvalidOwner(raw.to_string())),
        None => None,
    };
    Ok((parts[0].to_string(), group))
}

fn resolve_owner(raw: &str) -> Result<(Uid, Option<Gid>), OpError> {
    let (owner, group) = parse_owner(raw)?;

    let user = User::from_name(&owner)
        .map_err(|e| OpError::Io(e.into()))?
        .ok_or_else(|| OpError::UnknownUser(owner.clone()))?;

    let gid = match group {
        Some(name) => Some(
            Group::from_name(&name)
                .map_err(|e| OpError::Io(e.into()))?
                .ok_or_else(|| OpError::UnknownGroup(name.clone()))?
                .gid,
        ),
        // No group given: leave the group alone.
        None => None,
    };

    Ok((user.uid, gid))
}

#[async_trait]
impl OpHandler for Chown {
    fn name(&self) -> &'static str {
        "chown"
    }

    async fn execute(&self, params: &[String]) -> Result<Vec<String>, OpError> {
        expect_params(self.name(), 3, params)?;
        let (uid, gid) = resolve_owner(&params[0])?;
        let recursive = parse_bool(&params[1])?;
        let path = PathBuf::from(&params[2]);

        let meta = tokio::fs::metadata(&path).await?;
        if recursive && meta.is_dir() {
            run_blocking(move || {
                for entry in WalkDir::new(&path) {
                    let entry = entry.map_err(std::io::Error::from)?;
                    nix::unistd::chown(entry.path(), Some(uid), gid)
                        .map_err(|e| OpError::Io(e.into()))?;
                }
                Ok(())
            })
            .await?;
        } else {
            nix::unistd::chown(&path, Some(uid), gid).map_err(|e| OpError::Io(e.into()))?;
        }

        Ok(Vec::new())
    }
}
