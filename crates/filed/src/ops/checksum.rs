//! File checksumming over a small fixed algorithm set.

use async_trait::async_trait;
use blake2::Blake2b;
use blake2::digest::consts::U32;
use md5::Md5;
use sha2::{Digest, Sha256};

use super::{OpError, OpHandler, expect_params};

// 256-bit BLAKE2b, the variant historically served by this command.
type Blake2b256 = Blake2b<U32>;

pub struct Checksum;

#[async_trait]
impl OpHandler for Checksum {
    fn name(&self) -> &'static str {
        "checksum"
    }

    async fn execute(&self, params: &[String]) -> Result<Vec<String>, OpError> {
        expect_params(self.name(), 2, params)?;
        let algorithm = &params[0];
        let path = &params[1];

        let data = tokio::fs::read(path).await?;
        let digest = match algorithm.as_str() {
            "md5" => hex::encode(Md5::digest(&data)),
            "sha256" => hex::encode(Sha256::digest(&data)),
            "blake2b" => hex::encode(Blake2b256::digest(&data)),
            other => return Err(OpError::UnsupportedAlgorithm(other.to_string())),
        };

        Ok(vec![digest])
    }
}
