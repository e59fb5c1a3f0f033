//! Hashing benchmark
//!
//! Measures SHA-256 throughput the way iterated-and-salted S2K uses it and
//! derives the S2K iteration count that costs about 100 ms on this machine.

use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::context::OperationContext;
use super::result::OperationOutput;
use super::{BenchmarkParams, Operation};
use crate::error::OperationError;

/// Iterations between progress reports and scheduler yields
const REPORT_EVERY: u32 = 16;

/// Target unlock cost of a derived S2K count, in fractions of a second
const S2K_TARGET_PER_SECOND: u64 = 10;

/// Decode an OpenPGP one-octet S2K count into a byte count
pub fn decode_s2k_count(coded: u8) -> u64 {
    (16 + (coded & 15) as u64) << ((coded >> 4) + 6)
}

/// Smallest coded S2K count hashing at least `bytes`; saturates at 255
pub fn encode_s2k_count(bytes: u64) -> u8 {
    (0..=u8::MAX)
        .find(|c| decode_s2k_count(*c) >= bytes)
        .unwrap_or(u8::MAX)
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub iterations: u32,
    pub bytes_hashed: u64,
    pub elapsed_ms: u64,
    pub bytes_per_second: u64,
    /// Coded S2K count costing roughly 100 ms here
    pub s2k_coded_count: u8,
    pub s2k_byte_count: u64,
    /// Hex SHA-256 of the hashed stream
    pub digest: String,
}

pub struct Benchmark(pub BenchmarkParams);

#[async_trait]
impl Operation for Benchmark {
    async fn execute(&self, ctx: &OperationContext) -> Result<OperationOutput, OperationError> {
        let params = &self.0;
        if params.iterations == 0 || params.chunk_size == 0 {
            return Err(OperationError::InvalidRequest(
                "iterations and chunk size must be positive".to_string(),
            ));
        }

        let chunk: Vec<u8> = (0..params.chunk_size).map(|i| (i % 251) as u8).collect();
        let total = params.iterations as u64;
        let mut hasher = Sha256::new();
        let started = Instant::now();

        ctx.progress(0, total, Some("Hashing"));
        for i in 0..params.iterations {
            if i % REPORT_EVERY == 0 {
                ctx.check_cancelled()?;
                ctx.progress(i as u64, total, None);
                tokio::task::yield_now().await;
            }
            hasher.update(&chunk);
        }
        let digest = hasher.finalize();
        let elapsed = started.elapsed();

        let bytes_hashed = total * params.chunk_size as u64;
        let seconds = elapsed.as_secs_f64().max(1e-6);
        let bytes_per_second = (bytes_hashed as f64 / seconds) as u64;
        let s2k_coded_count = encode_s2k_count(bytes_per_second / S2K_TARGET_PER_SECOND);

        let report = BenchmarkReport {
            iterations: params.iterations,
            bytes_hashed,
            elapsed_ms: elapsed.as_millis() as u64,
            bytes_per_second,
            s2k_coded_count,
            s2k_byte_count: decode_s2k_count(s2k_coded_count),
            digest: digest.iter().map(|b| format!("{:02x}", b)).collect(),
        };

        ctx.progress(total, total, Some("Done"));
        ctx.info(format!(
            "Hashed {} bytes in {} ms ({} MiB/s)",
            report.bytes_hashed,
            report.elapsed_ms,
            report.bytes_per_second / (1024 * 1024)
        ));
        Ok(OperationOutput::Benchmark(report))
    }
}
