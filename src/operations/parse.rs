//! Splitting user input into OpenPGP armor blocks
//!
//! Text pasted by a user may hold any mix of plain text, armored messages,
//! keys and clearsigned messages. Each armored block is checked: its body
//! must be valid base64 and, when present, the CRC-24 checksum must match.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

use super::context::OperationContext;
use super::result::OperationOutput;
use super::{Operation, ParseInputParams};
use crate::error::OperationError;

const CRC24_INIT: u32 = 0x00B7_04CE;
const CRC24_POLY: u32 = 0x0186_4CFB;

/// CRC-24 as used by the armor checksum
pub fn crc24(data: &[u8]) -> u32 {
    let mut crc = CRC24_INIT;
    for byte in data {
        crc ^= (*byte as u32) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= CRC24_POLY;
            }
        }
    }
    crc & 0x00FF_FFFF
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Text,
    Message,
    PublicKey,
    PrivateKey,
    Signature,
    SignedMessage,
    Other(String),
}

impl BlockKind {
    fn from_label(label: &str) -> Self {
        match label {
            "MESSAGE" => BlockKind::Message,
            "PUBLIC KEY BLOCK" => BlockKind::PublicKey,
            "PRIVATE KEY BLOCK" => BlockKind::PrivateKey,
            "SIGNATURE" => BlockKind::Signature,
            "SIGNED MESSAGE" => BlockKind::SignedMessage,
            other => BlockKind::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockKind::Text => f.write_str("text"),
            BlockKind::Message => f.write_str("message"),
            BlockKind::PublicKey => f.write_str("public key"),
            BlockKind::PrivateKey => f.write_str("private key"),
            BlockKind::Signature => f.write_str("signature"),
            BlockKind::SignedMessage => f.write_str("signed message"),
            BlockKind::Other(label) => write!(f, "{}", label.to_lowercase()),
        }
    }
}

/// One segment of the input
#[derive(Debug, Clone, Serialize)]
pub struct InputBlock {
    pub kind: BlockKind,
    /// 1-based, inclusive
    pub first_line: usize,
    pub last_line: usize,
    pub content: String,
    /// Decoded body size of armored blocks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoded_len: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InputBlock {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_armored(&self) -> bool {
        self.kind != BlockKind::Text
    }
}

fn begin_label(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix("-----BEGIN PGP ")?
        .strip_suffix("-----")
}

fn end_label(line: &str) -> Option<&str> {
    line.trim().strip_prefix("-----END PGP ")?.strip_suffix("-----")
}

/// Iterator over the blocks of a text
pub struct BlockSplitter<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> BlockSplitter<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
            pos: 0,
        }
    }

    /// Lines consumed so far
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn armored(&mut self, label: &str) -> InputBlock {
        let start = self.pos;
        self.pos += 1;
        let kind = BlockKind::from_label(label);
        let body = if kind == BlockKind::SignedMessage {
            self.cleartext_body()
        } else {
            self.armor_body(label)
        };

        InputBlock {
            kind,
            first_line: start + 1,
            last_line: self.pos,
            content: self.lines[start..self.pos].join("\n"),
            decoded_len: body.as_ref().ok().copied(),
            error: body.err(),
        }
    }

    /// Headers, base64 body, optional checksum, END line
    fn armor_body(&mut self, label: &str) -> Result<usize, String> {
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos].trim();
            if line.is_empty() {
                self.pos += 1;
                break;
            }
            if !line.contains(": ") {
                break;
            }
            self.pos += 1;
        }

        let mut body = String::new();
        let mut checksum = None;
        loop {
            let Some(line) = self.lines.get(self.pos).map(|l| l.trim()) else {
                return Err("missing END line".to_string());
            };
            self.pos += 1;

            if let Some(end) = end_label(line) {
                if end != label {
                    return Err(format!("END {} does not match BEGIN {}", end, label));
                }
                break;
            }
            if line.len() == 5
                && let Some(sum) = line.strip_prefix('=')
            {
                checksum = Some(sum.to_string());
                continue;
            }
            body.push_str(line);
        }

        let decoded = STANDARD
            .decode(body.as_bytes())
            .map_err(|e| format!("invalid base64: {}", e))?;
        if decoded.is_empty() {
            return Err("empty armor body".to_string());
        }

        if let Some(sum) = checksum {
            let expected = STANDARD
                .decode(sum.as_bytes())
                .map_err(|e| format!("invalid checksum: {}", e))?;
            if expected.len() != 3 {
                return Err("invalid checksum length".to_string());
            }
            let expected =
                ((expected[0] as u32) << 16) | ((expected[1] as u32) << 8) | expected[2] as u32;
            if expected != crc24(&decoded) {
                return Err("checksum mismatch".to_string());
            }
        }
        Ok(decoded.len())
    }

    /// Hash headers, signed text, then the detached signature armor
    fn cleartext_body(&mut self) -> Result<usize, String> {
        while self.pos < self.lines.len() {
            let blank = self.lines[self.pos].trim().is_empty();
            self.pos += 1;
            if blank {
                break;
            }
        }
        loop {
            let Some(line) = self.lines.get(self.pos) else {
                return Err("missing signature".to_string());
            };
            self.pos += 1;
            if begin_label(line) == Some("SIGNATURE") {
                break;
            }
        }
        self.armor_body("SIGNATURE")
    }
}

impl Iterator for BlockSplitter<'_> {
    type Item = InputBlock;

    fn next(&mut self) -> Option<InputBlock> {
        loop {
            if self.pos >= self.lines.len() {
                return None;
            }
            if let Some(label) = begin_label(self.lines[self.pos]) {
                let label = label.to_string();
                return Some(self.armored(&label));
            }

            let start = self.pos;
            while self.pos < self.lines.len() && begin_label(self.lines[self.pos]).is_none() {
                self.pos += 1;
            }
            let content = self.lines[start..self.pos].join("\n");
            if content.trim().is_empty() {
                continue;
            }
            return Some(InputBlock {
                kind: BlockKind::Text,
                first_line: start + 1,
                last_line: self.pos,
                content,
                decoded_len: None,
                error: None,
            });
        }
    }
}

pub struct ParseInput(pub ParseInputParams);

#[async_trait]
impl Operation for ParseInput {
    async fn execute(&self, ctx: &OperationContext) -> Result<OperationOutput, OperationError> {
        let mut splitter = BlockSplitter::new(&self.0.text);
        let total = splitter.line_count() as u64;
        let mut blocks = Vec::new();

        ctx.progress(0, total, Some("Parsing input"));
        while let Some(block) = splitter.next() {
            ctx.check_cancelled()?;
            match &block.error {
                Some(error) => ctx.warn(format!(
                    "Lines {}-{}: invalid {} block: {}",
                    block.first_line, block.last_line, block.kind, error
                )),
                None if block.is_armored() => ctx.info(format!(
                    "Lines {}-{}: {} ({} bytes)",
                    block.first_line,
                    block.last_line,
                    block.kind,
                    block.decoded_len.unwrap_or_default()
                )),
                None => {}
            }
            blocks.push(block);
            ctx.progress(splitter.position() as u64, total, None);
        }

        let armored = blocks.iter().filter(|b| b.is_armored()).count();
        ctx.info(format!(
            "Found {} armored block(s) in {} line(s)",
            armored, total
        ));
        Ok(OperationOutput::Parsed(blocks))
    }
}
