//! Copy through the system `cp` binary.
//!
//! The destination must not exist; this command never overwrites.

use async_trait::async_trait;
use tokio::process::Command;

use super::{OpError, OpHandler, expect_params, parse_bool};

pub struct Cp;

#[async_trait]
impl OpHandler for Cp {
    fn name(&self) -> &'static str {
        "cp"
    }

    async fn execute(&self, params: &[String]) -> Result<Vec<String>, OpError> {
        expect_params(self.name(), 3, params)?;
        let recursive = parse_bool(&params[0])?;
        let src = &params[1];
        let dst = &params[2];

        tokio::fs::metadata(src).await?;
        if tokio::fs::metadata(dst).await.is_ok() {
            return Err(OpError::DestinationExists);
        }

        let mut cmd = Command::new("cp");
        if recursive {
            cmd.arg("-r");
        }
        let output = cmd.arg(src).arg(dst).output().await?;
        if !output.status.success() {
            return Err(OpError::Subprocess {
                command: "cp",
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(Vec::new())
    }
}
