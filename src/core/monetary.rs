/// Monetary units for the ledger.
///
/// Amounts are integer base units; one coin is 100,000,000 of them. Every accepted
/// block mints a fixed reward through its coinbase transaction and there are no fees.
///
/// Number of base units in one coin
pub const SATOSHIS_PER_COIN: u64 = 100_000_000;

/// Fixed block reward in base units (6.25 coins)
pub const BLOCK_REWARD: u64 = 625 * SATOSHIS_PER_COIN / 100;

pub mod conversions {
    use super::*;

    /// Format base units as a human-readable string
    ///
    /// # Examples
    /// ```
    /// use ledger_chain::core::monetary::conversions::format_satoshis;
    /// assert_eq!(format_satoshis(625_000_000), "6.25000000 coins");
    /// ```
    pub fn format_satoshis(satoshis: u64) -> String {
        format!(
            "{}.{:08} coins",
            satoshis / SATOSHIS_PER_COIN,
            satoshis % SATOSHIS_PER_COIN
        )
    }
}
