//! One-shot operation commands and result rendering

use std::io::Read;
use std::sync::Arc;

use base64::Engine as _;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::json;
use tabled::Tabled;

use crate::cache::LogPresence;
use crate::cli::{CommandContext, GlobalOptions, OutputFormat};
use crate::error::{Error, Result};
use crate::keyring::format_key_id;
use crate::operations::{
    BenchmarkParams, CryptoInput, Dispatcher, InputBlock, LogEntry, LogLevel, OperationOutput,
    OperationRequest, OperationResult, OperationState, ParseInputParams, ProgressSink,
    ProgressUpdate, RequiredInput,
};
use crate::output::{json::format_json, table};

/// Drives an `indicatif` bar from operation progress
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(title: &str) -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{prefix:.bold} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        bar.set_prefix(title.to_string());
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for BarProgress {
    fn on_progress(&self, update: ProgressUpdate) {
        self.bar.set_length(update.total);
        self.bar.set_position(update.current);
        if let Some(message) = update.message {
            self.bar.set_message(message);
        }
    }
}

/// Submit a request and wait for it, showing a progress bar on stderr
pub async fn run_with_progress(
    dispatcher: &Dispatcher,
    request: OperationRequest,
    input: CryptoInput,
) -> OperationResult {
    let bar = Arc::new(BarProgress::new(request.name()));
    let handle = dispatcher.submit(request, input, Some(bar.clone() as Arc<dyn ProgressSink>));
    let result = handle.wait().await;
    bar.finish();
    result
}

/// Serializable view of an operation result
#[derive(Debug, Serialize)]
struct ResultView<'a> {
    id: u64,
    operation: &'a str,
    state: OperationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    required_input: Option<RequiredInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<serde_json::Value>,
    log: &'a [LogEntry],
}

fn output_json(output: &OperationOutput) -> serde_json::Value {
    match output {
        OperationOutput::Done => serde_json::Value::Null,
        OperationOutput::Data(data) => json!({
            "bytes": data.len(),
            "base64": base64::engine::general_purpose::STANDARD.encode(data),
        }),
        OperationOutput::Decrypted(result) => json!({
            "bytes": result.data.len(),
            "signer_key_id": result.signer_key_id,
            "signature_valid": result.signature_valid,
        }),
        OperationOutput::Imported(summary) => json!(summary),
        OperationOutput::Parsed(blocks) => json!(blocks),
        OperationOutput::Benchmark(report) => json!(report),
        OperationOutput::ProofVerified(verified) => json!({ "verified": verified }),
        OperationOutput::Synced(report) => json!(report),
    }
}

#[derive(Debug, Tabled)]
struct BlockRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "LINES")]
    lines: String,
    #[tabled(rename = "BYTES")]
    bytes: String,
    #[tabled(rename = "STATUS")]
    status: String,
}

fn block_rows(blocks: &[InputBlock]) -> Vec<BlockRow> {
    blocks
        .iter()
        .enumerate()
        .map(|(i, block)| BlockRow {
            index: i + 1,
            kind: block.kind.to_string(),
            lines: format!("{}-{}", block.first_line, block.last_line),
            bytes: block
                .decoded_len
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
            status: match &block.error {
                Some(e) => e.clone(),
                None => "ok".to_string(),
            },
        })
        .collect()
}

fn print_output_table(output: &OperationOutput) {
    match output {
        OperationOutput::Done => {}
        OperationOutput::Data(data) => println!("{} bytes produced", data.len()),
        OperationOutput::Decrypted(result) => {
            println!("{} bytes decrypted", result.data.len());
            if let Some(signer) = result.signer_key_id {
                println!(
                    "Signed by {} ({})",
                    format_key_id(signer),
                    if result.signature_valid { "valid" } else { "invalid" }
                );
            }
        }
        OperationOutput::Imported(summary) => println!(
            "Imported {}, updated {}, unchanged {}",
            summary.imported, summary.updated, summary.unchanged
        ),
        OperationOutput::Parsed(blocks) => println!("{}", table::format_table(&block_rows(blocks))),
        OperationOutput::Benchmark(report) => {
            let mib = report.bytes_per_second as f64 / (1024.0 * 1024.0);
            println!(
                "{}",
                table::format_key_values(&[
                    ("Iterations", report.iterations.to_string()),
                    ("Bytes hashed", report.bytes_hashed.to_string()),
                    ("Elapsed", format!("{} ms", report.elapsed_ms)),
                    ("Throughput", format!("{:.1} MiB/s", mib)),
                    (
                        "S2K count (~100 ms)",
                        format!("{} ({} bytes)", report.s2k_coded_count, report.s2k_byte_count)
                    ),
                    ("Digest", report.digest.clone()),
                ])
            );
        }
        OperationOutput::ProofVerified(verified) => println!(
            "Proof {}",
            if *verified { "verified" } else { "does not match" }
        ),
        OperationOutput::Synced(report) => println!(
            "Refreshed {} key(s), {} failed",
            report.updated.len(),
            report.failed.len()
        ),
    }
}

fn state_label(state: OperationState) -> colored::ColoredString {
    let text = state.to_string();
    match state {
        OperationState::Succeeded => text.green(),
        OperationState::PendingInput => text.yellow(),
        OperationState::Failed => text.red(),
        _ => text.dimmed(),
    }
}

/// Print a result in the requested format
pub fn print_result(result: &OperationResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let view = ResultView {
                id: result.id,
                operation: result.name,
                state: result.state,
                required_input: result.required_input,
                output: result.output.as_ref().map(output_json),
                log: result.log.entries(),
            };
            println!("{}", format_json(&view)?);
        }
        OutputFormat::Table => {
            if let Some(output) = &result.output {
                print_output_table(output);
            }
            for entry in result.log.entries() {
                let line = match entry.level {
                    LogLevel::Info => entry.message.normal(),
                    LogLevel::Warn => entry.message.yellow(),
                    LogLevel::Error => entry.message.red(),
                };
                println!("  {}", line);
            }
            if let Some(required) = result.required_input {
                println!("Needs {}", required);
            }
            println!("{} {}", result.name.bold(), state_label(result.state));
        }
    }
    Ok(())
}

fn finish(result: &OperationResult, format: OutputFormat) -> Result<()> {
    print_result(result, format)?;
    if result.is_success() {
        Ok(())
    } else {
        Err(Error::Other(format!("{} ended in state '{}'", result.name, result.state)))
    }
}

async fn one_shot(opts: &GlobalOptions, request: OperationRequest) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let cache = ctx.spawn_cache(Arc::new(LogPresence))?;
    let dispatcher = ctx.dispatcher(cache.clone())?;

    let result = run_with_progress(&dispatcher, request, CryptoInput::new()).await;
    cache.shutdown().await?;
    finish(&result, ctx.format)
}

/// Run the hashing benchmark
pub async fn bench(opts: &GlobalOptions, iterations: u32) -> Result<()> {
    let request = OperationRequest::Benchmark(BenchmarkParams {
        iterations,
        ..BenchmarkParams::default()
    });
    one_shot(opts, request).await
}

/// Read text from a file, or stdin for "-"
pub fn read_input(file: &str) -> Result<String> {
    if file == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        Ok(std::fs::read_to_string(file)?)
    }
}

/// Split a file into armored blocks and plain text
pub async fn parse(opts: &GlobalOptions, file: &str) -> Result<()> {
    let text = read_input(file)?;
    one_shot(opts, OperationRequest::ParseInput(ParseInputParams { text })).await
}
