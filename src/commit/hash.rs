//! Canonical commit hash and signature helpers.
//!
//! The signed bytes are the raw SHA-256 of a canonical octet sequence —
//! never JSON, so record re-serialization can never invalidate an
//! existing signature:
//!
//! ```text
//! id || stream || message || author_name || author_email || rfc3339-utc
//!    || for each op in order: lamport:node:line:content:old=<old_content>
//! ```

use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::UtcOffset;

use crate::signing::Signer;

use super::{Commit, CommitError, CommitResult};

/// Compute the canonical 32-byte hash of a commit.
pub fn canonical_hash(commit: &Commit) -> CommitResult<[u8; 32]> {
    let mut hasher = Sha256::new();
    hasher.update(commit.id.to_string().as_bytes());
    hasher.update(commit.stream.as_str().as_bytes());
    hasher.update(commit.message.as_bytes());
    hasher.update(commit.author_name.as_bytes());
    hasher.update(commit.author_email.as_bytes());
    let ts = commit
        .timestamp
        .to_offset(UtcOffset::UTC)
        .format(&Rfc3339)?;
    hasher.update(ts.as_bytes());
    for eop in &commit.operations {
        hasher.update(eop.op.lamport.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(eop.op.node.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(eop.op.line.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(eop.op.content.as_bytes());
        hasher.update(b":old=");
        if let Some(old) = &eop.old_content {
            hasher.update(old.as_bytes());
        }
    }
    Ok(hasher.finalize().into())
}

/// Sign a commit's canonical hash; returns the hex-encoded signature.
pub fn sign_commit(commit: &Commit, signer: &dyn Signer) -> CommitResult<String> {
    let hash = canonical_hash(commit)?;
    let sig = signer.sign(&hash)?;
    Ok(hex::encode(sig))
}

/// Verify a commit's stored signature against its canonical hash.
pub fn verify_commit(commit: &Commit, signer: &dyn Signer) -> CommitResult<()> {
    let Some(signature) = &commit.signature else {
        return Err(CommitError::SignatureMissing { id: commit.id });
    };
    let sig_bytes = hex::decode(signature)
        .map_err(|_| CommitError::SignatureInvalid { id: commit.id })?;
    let hash = canonical_hash(commit)?;
    if signer.verify(&hash, &sig_bytes) {
        Ok(())
    } else {
        Err(CommitError::SignatureInvalid { id: commit.id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::ExtendedOp;
    use crate::core::{CommitId, FileId, LineId, NodeId, Op, OpKind, StreamName};
    use crate::signing::Ed25519Signer;
    use time::macros::datetime;

    fn commit_with_message(message: &str) -> Commit {
        let stream = StreamName::parse("main").unwrap();
        Commit {
            id: CommitId::from_bytes([4; 16]),
            stream: stream.clone(),
            message: message.to_string(),
            author_name: "Ada".into(),
            author_email: "ada@example.com".into(),
            timestamp: datetime!(2026-03-01 10:00:00 UTC),
            signature: None,
            operations: vec![ExtendedOp::with_old_content(
                Op {
                    kind: OpKind::Update,
                    lamport: 3,
                    node: NodeId::from_bytes([1; 16]),
                    file: FileId::from_bytes([2; 16]),
                    line: LineId::from_bytes([3; 16]),
                    content: "new".into(),
                    stream,
                    timestamp: None,
                },
                Some("old".into()),
            )],
        }
    }

    #[test]
    fn hash_is_stable() {
        let commit = commit_with_message("msg");
        assert_eq!(
            canonical_hash(&commit).unwrap(),
            canonical_hash(&commit).unwrap()
        );
    }

    #[test]
    fn hash_depends_on_message_and_old_content() {
        let a = commit_with_message("msg");
        let b = commit_with_message("other");
        assert_ne!(canonical_hash(&a).unwrap(), canonical_hash(&b).unwrap());

        let mut c = commit_with_message("msg");
        c.operations[0].old_content = None;
        assert_ne!(canonical_hash(&a).unwrap(), canonical_hash(&c).unwrap());
    }

    #[test]
    fn hash_ignores_signature_field() {
        let a = commit_with_message("msg");
        let mut b = commit_with_message("msg");
        b.signature = Some("aabb".to_string());
        assert_eq!(canonical_hash(&a).unwrap(), canonical_hash(&b).unwrap());
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("key");
        Ed25519Signer::generate(&key_path).unwrap();
        let signer = Ed25519Signer::load(&key_path).unwrap();

        let mut commit = commit_with_message("signed");
        commit.signature = Some(sign_commit(&commit, &signer).unwrap());
        verify_commit(&commit, &signer).unwrap();
    }

    #[test]
    fn tampered_commit_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("key");
        Ed25519Signer::generate(&key_path).unwrap();
        let signer = Ed25519Signer::load(&key_path).unwrap();

        let mut commit = commit_with_message("signed");
        commit.signature = Some(sign_commit(&commit, &signer).unwrap());
        commit.message = "tampered".to_string();
        assert!(matches!(
            verify_commit(&commit, &signer).unwrap_err(),
            CommitError::SignatureInvalid { .. }
        ));
    }

    #[test]
    fn missing_signature_is_its_own_error() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("key");
        Ed25519Signer::generate(&key_path).unwrap();
        let signer = Ed25519Signer::load(&key_path).unwrap();

        let commit = commit_with_message("unsigned");
        assert!(matches!(
            verify_commit(&commit, &signer).unwrap_err(),
            CommitError::SignatureMissing { .. }
        ));
    }
}
