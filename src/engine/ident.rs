use rand::Rng;

use crate::db::LedgerStore;

use super::error::LedgerError;

pub const ACCOUNT_NUMBER_LEN: usize = 10;
pub const RECEIPT_LEN: usize = 5;

/// Generation gives up after this many collisions. The identifier spaces are
/// far larger than expected record counts, so hitting the bound means the
/// store is effectively full for that identifier.
pub const MAX_ATTEMPTS: u32 = 1000;

/// Draws random fixed-length digit strings and checks them against the store.
/// There is no reservation between check and insert; the store's unique
/// constraint is the authoritative guard and a write-time collision triggers
/// regeneration.
#[derive(Debug, Default)]
pub struct IdentifierGenerator;

impl IdentifierGenerator {
    pub async fn next_account_number<S: LedgerStore>(
        &self,
        store: &S,
    ) -> Result<String, LedgerError> {
        for _ in 0..MAX_ATTEMPTS {
            let candidate = random_digits(ACCOUNT_NUMBER_LEN);
            if !store.account_number_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(LedgerError::IdentifierGenerationExhausted(MAX_ATTEMPTS))
    }

    pub async fn next_receipt<S: LedgerStore>(&self, store: &S) -> Result<String, LedgerError> {
        for _ in 0..MAX_ATTEMPTS {
            let candidate = random_digits(RECEIPT_LEN);
            if !store.receipt_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(LedgerError::IdentifierGenerationExhausted(MAX_ATTEMPTS))
    }
}

fn random_digits(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
