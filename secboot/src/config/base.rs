// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Keylime Authors
use crate::{algorithms::HashAlgorithm, config::SecbootConfigError};
use serde::{Deserialize, Serialize};

pub static DEFAULT_CONFIG: &str = "/etc/secboot/secboot.conf";
pub static DEFAULT_CONFIG_SNIPPETS_DIR: &str = "/etc/secboot/secboot.conf.d";

// An empty TCTI selects the default TPM device, see tpm::default_tcti()
pub static DEFAULT_TCTI: &str = "";
pub static DEFAULT_PCR_DIGEST_ALG: &str = "sha256";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecbootConfig {
    /// TCTI used to reach the TPM when reading live PCR values.
    pub tcti: String,
    /// Algorithm used to compute composite PCR digests.
    pub pcr_digest_alg: String,
}

impl Default for SecbootConfig {
    fn default() -> Self {
        SecbootConfig {
            tcti: DEFAULT_TCTI.to_string(),
            pcr_digest_alg: DEFAULT_PCR_DIGEST_ALG.to_string(),
        }
    }
}

impl SecbootConfig {
    /// Returns the configured composite PCR digest algorithm.
    pub fn pcr_digest_algorithm(
        &self,
    ) -> Result<HashAlgorithm, SecbootConfigError> {
        HashAlgorithm::try_from(self.pcr_digest_alg.as_str()).map_err(
            |source| SecbootConfigError::InvalidAlgorithm {
                option: "pcr_digest_alg".to_string(),
                source,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let config = SecbootConfig::default();
        assert!(config.tcti.is_empty());
        assert!(config
            .pcr_digest_algorithm()
            .is_ok_and(|alg| alg == HashAlgorithm::Sha256));
    }

    #[test]
    fn test_invalid_pcr_digest_alg() {
        let config = SecbootConfig {
            pcr_digest_alg: "md5".to_string(),
            ..Default::default()
        };
        let result = config.pcr_digest_algorithm();
        assert!(matches!(
            result,
            Err(SecbootConfigError::InvalidAlgorithm { .. })
        ));
    }
}
