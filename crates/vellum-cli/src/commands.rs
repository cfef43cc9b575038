use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};
use uuid::Uuid;
use zeroize::Zeroizing;

use vellum_crypto::{Identity, PrivateKey, PublicKey, keys};
use vellum_types::{Envelope, EnvelopeSet, IdentityId};

/// Shown for every open failure so the output never hints at which check
/// rejected the envelope.
pub const OPEN_FAILED: &str = "message could not be decrypted";

pub struct CreatedIdentity {
    pub id: IdentityId,
    pub public_path: PathBuf,
    pub private_path: PathBuf,
    pub fingerprint: String,
}

/// `<id>=<path>` as given to `seal --to`.
pub fn parse_recipient(s: &str) -> std::result::Result<(Uuid, PathBuf), String> {
    let (id, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected <id>=<public key file>, got {:?}", s))?;
    let id = Uuid::parse_str(id.trim()).map_err(|e| format!("bad recipient id {:?}: {}", id, e))?;
    if path.is_empty() {
        return Err("missing public key file".into());
    }
    Ok((id, PathBuf::from(path)))
}

pub fn keygen(id: IdentityId, out: &Path) -> Result<CreatedIdentity> {
    let identity = keys::generate(id)?;
    std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;

    let public_path = out.join(format!("{}.pub.pem", id));
    let private_path = out.join(format!("{}.key.pem", id));
    if public_path.exists() || private_path.exists() {
        bail!("keys for {} already exist in {}", id, out.display());
    }

    std::fs::write(&public_path, identity.public_pem()?)
        .with_context(|| format!("writing {}", public_path.display()))?;
    write_private(&private_path, &identity)?;

    info!("generated identity {}", id);
    Ok(CreatedIdentity {
        id,
        public_path,
        private_path,
        fingerprint: identity.public_key().fingerprint()?,
    })
}

#[cfg(unix)]
fn write_private(path: &Path, identity: &Identity) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
        .with_context(|| format!("creating {}", path.display()))?;
    file.write_all(identity.private_pem()?.as_bytes())
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, identity: &Identity) -> Result<()> {
    std::fs::write(path, identity.private_pem()?.as_bytes())
        .with_context(|| format!("writing {}", path.display()))
}

fn read_public_key(path: &Path) -> Result<PublicKey> {
    let pem = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    PublicKey::from_pem(&pem).with_context(|| format!("loading public key {}", path.display()))
}

pub fn fingerprint(path: &Path) -> Result<String> {
    Ok(read_public_key(path)?.fingerprint()?)
}

/// Seal for every `(id, public key file)` pair and return the envelope set
/// as pretty JSON.
pub fn seal(plaintext: &[u8], recipients: &[(Uuid, PathBuf)]) -> Result<String> {
    let keys = recipients
        .iter()
        .map(|(id, path)| read_public_key(path).map(|key| (*id, key)))
        .collect::<Result<Vec<_>>>()?;

    let sealed = vellum_crypto::seal(plaintext, keys.iter().map(|(id, key)| (*id, key)))?;
    Ok(serde_json::to_string_pretty(&sealed)?)
}

/// Open the envelope for `id`. Accepts either a whole envelope set or a
/// single envelope.
pub fn open(json: &str, id: IdentityId, key_path: &Path) -> Result<Zeroizing<Vec<u8>>> {
    let envelope = match serde_json::from_str::<EnvelopeSet>(json) {
        Ok(mut set) => set
            .remove(&id)
            .with_context(|| format!("no envelope for {}", id))?,
        Err(_) => serde_json::from_str::<Envelope>(json).context("input is not an envelope")?,
    };

    let pem = Zeroizing::new(
        std::fs::read_to_string(key_path).with_context(|| format!("reading {}", key_path.display()))?,
    );
    let private_key = PrivateKey::from_pem(&pem)?;

    let plaintext = vellum_crypto::open(&envelope, &private_key)?;
    debug!("opened {} byte message", plaintext.len());
    Ok(plaintext)
}

/// [`open`] for display to a user: any failure becomes [`OPEN_FAILED`],
/// with the real cause only at debug level.
pub fn open_opaque(json: &str, id: IdentityId, key_path: &Path) -> Result<Zeroizing<Vec<u8>>> {
    open(json, id, key_path).map_err(|e| {
        debug!("open failed: {:#}", e);
        anyhow::Error::msg(OPEN_FAILED)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_crypto::CryptoError;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vellum-cli-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn recipients_parse() {
        let id = Uuid::new_v4();
        let (parsed, path) = parse_recipient(&format!("{}=keys/bob.pub.pem", id)).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(path, PathBuf::from("keys/bob.pub.pem"));

        assert!(parse_recipient("bob.pub.pem").is_err());
        assert!(parse_recipient("not-a-uuid=bob.pub.pem").is_err());
        assert!(parse_recipient(&format!("{}=", id)).is_err());
    }

    #[test]
    fn keygen_seal_open() {
        let dir = temp_dir();
        let alice = keygen(Uuid::new_v4(), &dir).unwrap();
        let bob = keygen(Uuid::new_v4(), &dir).unwrap();
        assert_eq!(fingerprint(&alice.public_path).unwrap(), alice.fingerprint);

        let json = seal(
            b"hello",
            &[
                (alice.id, alice.public_path.clone()),
                (bob.id, bob.public_path.clone()),
            ],
        )
        .unwrap();

        assert_eq!(open(&json, bob.id, &bob.private_path).unwrap().as_slice(), b"hello");

        // A single envelope works too
        let set: EnvelopeSet = serde_json::from_str(&json).unwrap();
        let single = serde_json::to_string(&set[&alice.id]).unwrap();
        assert_eq!(open(&single, alice.id, &alice.private_path).unwrap().as_slice(), b"hello");

        // Wrong private key
        let err = open(&single, alice.id, &bob.private_path).unwrap_err();
        assert_eq!(err.downcast_ref::<CryptoError>(), Some(&CryptoError::Unwrap));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn every_open_failure_reads_the_same() {
        let dir = temp_dir();
        let alice = keygen(Uuid::new_v4(), &dir).unwrap();
        let bob = keygen(Uuid::new_v4(), &dir).unwrap();
        let json = seal(b"secret", &[(alice.id, alice.public_path.clone())]).unwrap();
        let envelope = serde_json::from_str::<EnvelopeSet>(&json).unwrap()[&alice.id].clone();

        let mut tampered = envelope.clone();
        tampered.body[0] ^= 0x01;
        let mut truncated = envelope.clone();
        truncated.body.truncate(4);

        let cases = [
            (envelope, &bob.private_path, CryptoError::Unwrap),
            (tampered, &alice.private_path, CryptoError::Integrity),
            (truncated, &alice.private_path, CryptoError::Decoding("body shorter than tag")),
        ];
        for (envelope, key, kind) in cases {
            let single = serde_json::to_string(&envelope).unwrap();

            let err = open(&single, alice.id, key).unwrap_err();
            assert_eq!(err.downcast_ref::<CryptoError>(), Some(&kind));

            let err = open_opaque(&single, alice.id, key).unwrap_err();
            assert_eq!(format!("{:#}", err), OPEN_FAILED);
            assert!(err.downcast_ref::<CryptoError>().is_none());
        }

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn keygen_refuses_to_overwrite() {
        let dir = temp_dir();
        let id = Uuid::new_v4();
        keygen(id, &dir).unwrap();
        assert!(keygen(id, &dir).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_envelope_is_an_error() {
        let dir = temp_dir();
        let alice = keygen(Uuid::new_v4(), &dir).unwrap();
        let json = seal(b"x", &[(alice.id, alice.public_path.clone())]).unwrap();
        assert!(open(&json, Uuid::new_v4(), &alice.private_path).is_err());
        assert!(open("{\"nope\": 1}", alice.id, &alice.private_path).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
