//! Import, export and key server operations

use async_trait::async_trait;
use serde::Serialize;

use super::context::OperationContext;
use super::engine::ImportSummary;
use super::result::OperationOutput;
use super::{
    BackupParams, ImportParams, ImportSource, KeySyncParams, Operation, RequiredInput,
    UploadParams, VerifyProofParams,
};
use crate::error::OperationError;
use crate::keyring::format_key_id;

type Result<T> = std::result::Result<T, OperationError>;

/// Outcome of a key server refresh
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeySyncReport {
    pub updated: Vec<i64>,
    pub failed: Vec<i64>,
    pub summary: ImportSummary,
}

pub struct Import(pub ImportParams);

#[async_trait]
impl Operation for Import {
    async fn execute(&self, ctx: &OperationContext) -> Result<OperationOutput> {
        match &self.0.source {
            ImportSource::Data(data) => {
                ctx.progress(0, 1, Some("Importing"));
                let summary = ctx.engine().import(data).await?;
                ctx.progress(1, 1, Some("Done"));
                log_summary(ctx, &summary);
                Ok(OperationOutput::Imported(summary))
            }
            ImportSource::KeyServer(ids) => {
                let total = ids.len() as u64;
                let mut summary = ImportSummary::default();
                for (i, master_key_id) in ids.iter().enumerate() {
                    ctx.check_cancelled()?;
                    ctx.progress(i as u64, total, Some("Fetching"));
                    let data = ctx.key_server().fetch(*master_key_id).await?;
                    summary.merge(ctx.engine().import(&data).await?);
                }
                ctx.progress(total, total, Some("Done"));
                log_summary(ctx, &summary);
                Ok(OperationOutput::Imported(summary))
            }
        }
    }
}

fn log_summary(ctx: &OperationContext, summary: &ImportSummary) {
    ctx.info(format!(
        "Imported {}, updated {}, unchanged {}",
        summary.imported, summary.updated, summary.unchanged
    ));
}

pub struct Backup(pub BackupParams);

#[async_trait]
impl Operation for Backup {
    async fn execute(&self, ctx: &OperationContext) -> Result<OperationOutput> {
        let params = &self.0;
        if params.master_key_ids.is_empty() {
            return Err(OperationError::InvalidRequest(
                "no keys to back up".to_string(),
            ));
        }

        // Secret backups are encrypted with a backup code chosen by the caller
        let backup_code = if params.include_secret {
            match &ctx.input().passphrase {
                Some(code) => Some(code),
                None => return Err(OperationError::InputRequired(RequiredInput::BackupCode)),
            }
        } else {
            None
        };

        ctx.check_cancelled()?;
        ctx.progress(0, 1, Some("Exporting"));
        let exported = ctx
            .engine()
            .export(&params.master_key_ids, params.include_secret, backup_code)
            .await?;

        ctx.progress(1, 1, Some("Done"));
        ctx.info(format!(
            "Exported {} keyring(s){}",
            params.master_key_ids.len(),
            if params.include_secret {
                " with secret keys"
            } else {
                ""
            }
        ));
        Ok(OperationOutput::Data(exported))
    }
}

pub struct Upload(pub UploadParams);

#[async_trait]
impl Operation for Upload {
    async fn execute(&self, ctx: &OperationContext) -> Result<OperationOutput> {
        let master_key_id = self.0.master_key_id;
        ctx.progress(0, 2, Some("Exporting"));
        let exported = ctx.engine().export(&[master_key_id], false, None).await?;

        ctx.check_cancelled()?;
        ctx.progress(1, 2, Some("Uploading"));
        ctx.key_server().upload(&exported).await?;

        ctx.progress(2, 2, Some("Done"));
        ctx.info(format!("Uploaded {}", format_key_id(master_key_id)));
        Ok(OperationOutput::Done)
    }
}

pub struct VerifyProof(pub VerifyProofParams);

#[async_trait]
impl Operation for VerifyProof {
    async fn execute(&self, ctx: &OperationContext) -> Result<OperationOutput> {
        let params = &self.0;
        if params.proof.trim().is_empty() {
            return Err(OperationError::InvalidRequest("empty proof".to_string()));
        }

        ctx.progress(0, 1, Some("Checking proof"));
        let verified = ctx
            .key_server()
            .verify_proof(params.master_key_id, &params.proof)
            .await?;

        ctx.progress(1, 1, Some("Done"));
        if verified {
            ctx.info(format!(
                "Proof for {} verified",
                format_key_id(params.master_key_id)
            ));
        } else {
            ctx.warn(format!(
                "Proof for {} does not match",
                format_key_id(params.master_key_id)
            ));
        }
        Ok(OperationOutput::ProofVerified(verified))
    }
}

/// Refresh keys from the key server. One failing key does not stop the rest.
pub struct KeySync(pub KeySyncParams);

#[async_trait]
impl Operation for KeySync {
    async fn execute(&self, ctx: &OperationContext) -> Result<OperationOutput> {
        let ids = &self.0.master_key_ids;
        let total = ids.len() as u64;
        let mut report = KeySyncReport::default();

        for (i, master_key_id) in ids.iter().enumerate() {
            ctx.check_cancelled()?;
            ctx.progress(i as u64, total, Some("Refreshing"));

            let refreshed = match ctx.key_server().fetch(*master_key_id).await {
                Ok(data) => ctx.engine().import(&data).await,
                Err(e) => Err(e),
            };
            match refreshed {
                Ok(summary) => {
                    report.summary.merge(summary);
                    report.updated.push(*master_key_id);
                }
                Err(e) => {
                    ctx.warn(format!(
                        "Could not refresh {}: {}",
                        format_key_id(*master_key_id),
                        e
                    ));
                    report.failed.push(*master_key_id);
                }
            }
        }

        ctx.progress(total, total, Some("Done"));
        ctx.info(format!(
            "Refreshed {} of {} key(s)",
            report.updated.len(),
            ids.len()
        ));
        Ok(OperationOutput::Synced(report))
    }
}
