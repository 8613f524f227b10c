use sha2::{Digest, Sha256};

/// Server-side shared secret, kept only as a SHA-256 digest.
#[derive(Clone)]
pub(crate) struct SharedSecret {
    digest: [u8; 32],
}

impl SharedSecret {
    /// Returns `None` for a missing or blank secret.
    pub(crate) fn from_config(raw: Option<&str>) -> Option<Self> {
        let secret = raw.map(str::trim).filter(|value| !value.is_empty())?;
        Some(Self {
            digest: sha256(secret),
        })
    }

    /// Digests are compared in constant time so response timing does not
    /// leak how much of the credential matched.
    pub(crate) fn verify(&self, presented: Option<&str>) -> bool {
        let Some(presented) = presented.map(str::trim).filter(|value| !value.is_empty()) else {
            return false;
        };
        let observed = sha256(presented);
        observed
            .iter()
            .zip(self.digest.iter())
            .fold(0_u8, |diff, (left, right)| diff | (left ^ right))
            == 0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("SharedSecret(..)")
    }
}

fn sha256(value: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.finalize().into()
}
