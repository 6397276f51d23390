//! Removal with an opt-out for already-missing paths.

use std::io::ErrorKind;

use async_trait::async_trait;

use super::{OpError, OpHandler, expect_params, parse_bool};

pub struct Rm;

#[async_trait]
impl OpHandler for Rm {
    fn name(&self) -> &'static str {
        "rm"
    }

    async fn execute(&self, params: &[String]) -> Result<Vec<String>, OpError> {
        expect_params(self.name(), 3, params)?;
        let recursive = parse_bool(&params[0])?;
        let ignore_missing = parse_bool(&params[1])?;
        let path = &params[2];

        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // The caller wanted it gone and it is gone.
                return if ignore_missing {
                    Ok(Vec::new())
                } else {
                    Err(e.into())
                };
            }
            Err(e) => return Err(e.into()),
        };

        if meta.is_dir() {
            if recursive {
                tokio::fs::remove_dir_all(path).await?;
            } else {
                tokio::fs::remove_dir(path).await?;
            }
        } else {
            tokio::fs::remove_file(path).await?;
        }

        Ok(Vec::new())
    }
}
