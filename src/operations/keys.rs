//! Key management operations

use async_trait::async_trait;

use super::context::OperationContext;
use super::result::OperationOutput;
use super::{
    CertifyParams, ChangeUnlockParams, DeleteParams, EditKeyParams, Operation, PromoteParams,
    RevokeParams,
};
use crate::error::OperationError;
use crate::keyring::format_key_id;

type Result<T> = std::result::Result<T, OperationError>;

pub struct EditKey(pub EditKeyParams);

#[async_trait]
impl Operation for EditKey {
    async fn execute(&self, ctx: &OperationContext) -> Result<OperationOutput> {
        let params = &self.0;
        if params.changes.is_empty() {
            return Err(OperationError::InvalidRequest(
                "no changes requested".to_string(),
            ));
        }

        let key = ctx
            .unlock(params.master_key_id, params.master_key_id)
            .await?;
        ctx.check_cancelled()?;
        ctx.progress(0, 1, Some("Applying changes"));

        if let Err(e) = ctx.engine().edit_key(&key, &params.changes).await {
            return Err(ctx.engine_failure(&key, e).await);
        }

        ctx.progress(1, 1, Some("Done"));
        ctx.info(format!(
            "Updated keyring {}",
            format_key_id(params.master_key_id)
        ));
        Ok(OperationOutput::Done)
    }
}

pub struct ChangeUnlock(pub ChangeUnlockParams);

#[async_trait]
impl Operation for ChangeUnlock {
    async fn execute(&self, ctx: &OperationContext) -> Result<OperationOutput> {
        let params = &self.0;
        let key = ctx
            .unlock(params.master_key_id, params.master_key_id)
            .await?;
        ctx.check_cancelled()?;
        ctx.progress(0, 2, Some("Re-encrypting secret keys"));

        if let Err(e) = ctx
            .engine()
            .change_unlock(&key, &params.new_passphrase)
            .await
        {
            return Err(ctx.engine_failure(&key, e).await);
        }

        // Old passphrase no longer unlocks anything
        ctx.progress(1, 2, Some("Clearing cached passphrase"));
        ctx.forget_keyring(params.master_key_id).await;

        ctx.progress(2, 2, Some("Done"));
        ctx.info(format!(
            "Changed passphrase of {}",
            format_key_id(params.master_key_id)
        ));
        Ok(OperationOutput::Done)
    }
}

pub struct Revoke(pub RevokeParams);

#[async_trait]
impl Operation for Revoke {
    async fn execute(&self, ctx: &OperationContext) -> Result<OperationOutput> {
        let params = &self.0;
        let key = ctx
            .unlock(params.master_key_id, params.master_key_id)
            .await?;
        ctx.check_cancelled()?;
        let total = if params.upload { 2 } else { 1 };
        ctx.progress(0, total, Some("Revoking"));

        let certificate = match ctx.engine().revoke(&key).await {
            Ok(certificate) => certificate,
            Err(e) => return Err(ctx.engine_failure(&key, e).await),
        };
        ctx.info(format!(
            "Revoked keyring {}",
            format_key_id(params.master_key_id)
        ));

        if params.upload {
            ctx.check_cancelled()?;
            ctx.progress(1, total, Some("Uploading"));
            let exported = ctx
                .engine()
                .export(&[params.master_key_id], false, None)
                .await?;
            ctx.key_server().upload(&exported).await?;
            ctx.info("Uploaded revoked key");
        }

        ctx.progress(total, total, Some("Done"));
        Ok(OperationOutput::Data(certificate))
    }
}

pub struct Certify(pub CertifyParams);

#[async_trait]
impl Operation for Certify {
    async fn execute(&self, ctx: &OperationContext) -> Result<OperationOutput> {
        let params = &self.0;
        if params.target_key_ids.is_empty() {
            return Err(OperationError::InvalidRequest(
                "no keys to certify".to_string(),
            ));
        }

        let certifier = params.certifier_master_key_id;
        let key = ctx.unlock(certifier, certifier).await?;
        let total = params.target_key_ids.len() as u64;
        let mut certified = 0;

        for (i, target) in params.target_key_ids.iter().enumerate() {
            ctx.check_cancelled()?;
            ctx.progress(i as u64, total, Some("Certifying"));

            if let Err(e) = ctx
                .engine()
                .certify(&key, *target, ctx.input().signature_time)
                .await
            {
                return Err(ctx.engine_failure(&key, e).await);
            }
            ctx.info(format!("Certified {}", format_key_id(*target)));
            certified += 1;

            if params.upload {
                let exported = ctx.engine().export(&[*target], false, None).await?;
                match ctx.key_server().upload(&exported).await {
                    Ok(()) => ctx.info(format!("Uploaded {}", format_key_id(*target))),
                    Err(e) => ctx.warn(format!(
                        "Upload of {} failed: {}",
                        format_key_id(*target),
                        e
                    )),
                }
            }
        }

        ctx.progress(total, total, Some("Done"));
        ctx.info(format!("Certified {} key(s)", certified));
        Ok(OperationOutput::Done)
    }
}

pub struct Delete(pub DeleteParams);

#[async_trait]
impl Operation for Delete {
    async fn execute(&self, ctx: &OperationContext) -> Result<OperationOutput> {
        let params = &self.0;
        let total = params.master_key_ids.len() as u64;

        for (i, master_key_id) in params.master_key_ids.iter().enumerate() {
            ctx.check_cancelled()?;
            ctx.progress(i as u64, total, Some("Deleting"));

            // Subkey ids must be read before the keyring disappears
            let key_ids = ctx.keyring_key_ids(*master_key_id);
            ctx.engine().delete(*master_key_id, params.secret).await?;
            if params.secret {
                ctx.forget_keys(*master_key_id, &key_ids).await;
            }
            ctx.info(format!("Deleted {}", format_key_id(*master_key_id)));
        }

        ctx.progress(total, total, Some("Done"));
        Ok(OperationOutput::Done)
    }
}

pub struct Promote(pub PromoteParams);

#[async_trait]
impl Operation for Promote {
    async fn execute(&self, ctx: &OperationContext) -> Result<OperationOutput> {
        let params = &self.0;
        ctx.progress(0, 1, Some("Promoting"));

        ctx.engine()
            .promote(
                params.master_key_id,
                params.sub_key_ids.as_deref(),
                params.card_serial.as_deref(),
            )
            .await?;

        ctx.progress(1, 1, Some("Done"));
        ctx.info(format!(
            "Promoted {} to a secret key on a hardware token",
            format_key_id(params.master_key_id)
        ));
        Ok(OperationOutput::Done)
    }
}
