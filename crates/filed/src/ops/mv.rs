//! Move/rename through the system `mv` binary.

use async_trait::async_trait;
use tokio::process::Command;

use super::{OpError, OpHandler, expect_params};

pub struct Mv;

#[async_trait]
impl OpHandler for Mv {
    fn name(&self) -> &'static str {
        "mv"
    }

    async fn execute(&self, params: &[String]) -> Result<Vec<String>, OpError> {
        expect_params(self.name(), 2, params)?;
        let src = &params[0];
        let dst = &params[1];

        tokio::fs::metadata(src).await?;
        if tokio::fs::metadata(dst).await.is_ok() {
            return Err(OpError::DestinationExists);
        }

        let output = Command::new("mv").arg(src).arg(dst).output().await?;
        if !output.status.success() {
            return Err(OpError::Subprocess {
                command: "mv",
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
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

    #[tokio::test]
    async fn moves_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        std::fs::write(&src, b"payload").unwrap();

        Mv.execute(&args(&[
            &src.display().to_string(),
            &dst.display().to_string(),
        ]))
        .await
        .unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn existing_destination_fails_without_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        std::fs::write(&src, b"new").unwrap();
        std::fs::write(&dst, b"old").unwrap();

        let err = Mv
            .execute(&args(&[
                &src.display().to_string(),
                &dst.display().to_string(),
            ]))
            .await
            .unwrap_err();
        assert!(matches!(err, OpError::DestinationExists));
        assert!(src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"old");
    }

    #[tokio::test]
    async fn wrong_parameter_count() {
        let err = Mv.execute(&args(&["/only/one"])).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Incorrect number of parameters to mv. Expected 2 Got 1"
        );
    }
}
