//! Sign/encrypt and decrypt/verify

use async_trait::async_trait;

use super::context::{OperationContext, SecretSource, UnlockedKey};
use super::engine::{DecryptUnlock, DecryptionKey};
use super::result::OperationOutput;
use super::{DecryptVerifyParams, Operation, SignEncryptParams};
use crate::cache::KEY_ID_SYMMETRIC;
use crate::error::OperationError;
use crate::keyring::{format_key_id, signing_subkey};

type Result<T> = std::result::Result<T, OperationError>;

pub struct SignEncrypt(pub SignEncryptParams);

#[async_trait]
impl Operation for SignEncrypt {
    async fn execute(&self, ctx: &OperationContext) -> Result<OperationOutput> {
        let params = &self.0;
        if params.signature_master_key_id.is_none()
            && params.encryption_key_ids.is_empty()
            && !params.symmetric
        {
            return Err(OperationError::InvalidRequest(
                "nothing to do: no signing key, recipient or symmetric passphrase".to_string(),
            ));
        }
        ctx.progress(0, 3, Some("Preparing"));

        let signer = match params.signature_master_key_id {
            Some(master_key_id) => {
                let sub_key_id = signing_subkey(ctx.keyring(), master_key_id)?;
                ctx.info(format!(
                    "Signing with subkey {} of {}",
                    format_key_id(sub_key_id),
                    format_key_id(master_key_id)
                ));
                Some(ctx.unlock(master_key_id, sub_key_id).await?)
            }
            None => None,
        };

        let symmetric = if params.symmetric {
            Some(
                ctx.unlock_with(
                    KEY_ID_SYMMETRIC,
                    KEY_ID_SYMMETRIC,
                    params.symmetric_passphrase.as_ref(),
                )
                .await?,
            )
        } else {
            None
        };

        ctx.check_cancelled()?;
        ctx.progress(1, 3, Some("Signing and encrypting"));

        let output = ctx
            .engine()
            .sign_encrypt(
                params,
                signer.as_ref(),
                symmetric.as_ref().map(|k| &k.passphrase),
                ctx.input().signature_time,
            )
            .await;
        let output = match output {
            Ok(output) => output,
            Err(e) => {
                let key = signer.as_ref().or(symmetric.as_ref());
                return Err(match key {
                    Some(key) => ctx.engine_failure(key, e).await,
                    None => e.into(),
                });
            }
        };

        ctx.progress(3, 3, Some("Done"));
        ctx.info(format!(
            "Produced {} bytes for {} recipient(s)",
            output.len(),
            params.encryption_key_ids.len()
        ));
        Ok(OperationOutput::Data(output))
    }
}

pub struct DecryptVerify(pub DecryptVerifyParams);

#[async_trait]
impl Operation for DecryptVerify {
    async fn execute(&self, ctx: &OperationContext) -> Result<OperationOutput> {
        let params = &self.0;
        let engine = ctx.engine();
        ctx.progress(0, 2, Some("Reading message"));

        if let Some(session_key) = &ctx.input().session_key {
            ctx.info("Decrypting with supplied session key");
            let result = engine
                .decrypt_verify(&params.data, DecryptUnlock::SessionKey(session_key))
                .await?;
            ctx.progress(2, 2, Some("Done"));
            return Ok(OperationOutput::Decrypted(result));
        }

        let target = engine
            .decryption_key(&params.data, params.allowed_key_ids.as_deref())
            .await?;
        let key: UnlockedKey = match target {
            DecryptionKey::Symmetric => ctx.unlock(KEY_ID_SYMMETRIC, KEY_ID_SYMMETRIC).await?,
            DecryptionKey::Key {
                master_key_id,
                sub_key_id,
            } => ctx.unlock(master_key_id, sub_key_id).await?,
        };

        ctx.check_cancelled()?;
        ctx.progress(1, 2, Some("Decrypting"));

        let unlock = if key.master_key_id == KEY_ID_SYMMETRIC {
            DecryptUnlock::Symmetric(&key.passphrase)
        } else {
            DecryptUnlock::Key(&key)
        };
        let result = match engine.decrypt_verify(&params.data, unlock).await {
            Ok(result) => result,
            Err(e) => return Err(ctx.engine_failure(&key, e).await),
        };

        if key.source == SecretSource::Input {
            ctx.info("Decrypted with supplied passphrase");
        }
        match result.signer_key_id {
            Some(signer) if result.signature_valid => {
                ctx.info(format!("Valid signature by {}", format_key_id(signer)))
            }
            Some(signer) => ctx.warn(format!("Invalid signature by {}", format_key_id(signer))),
            None => ctx.info("Message is not signed"),
        }
        ctx.progress(2, 2, Some("Done"));
        Ok(OperationOutput::Decrypted(result))
    }
}
