//! Coin parameter records.
//!
//! One record per supported network. The engine reads these and nothing
//! else to decide the digest algorithm (fork id present or not), the fee
//! ceiling, and how to render amounts for the confirmation screen.

/// Static parameters for one Bitcoin-family network.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoinParams {
    /// Human-readable name, e.g. "Bitcoin".
    pub name: &'static str,
    /// Ticker used on the confirmation screen, e.g. "BTC".
    pub shortcut: &'static str,
    /// Base58check version byte for P2PKH addresses.
    pub address_type: u8,
    /// Base58check version byte for P2SH addresses.
    pub address_type_p2sh: u8,
    /// Fee ceiling per estimated kilobyte, in the minor unit. Fees above
    /// this trigger an extra confirmation.
    pub maxfee_kb: u64,
    /// Whether signatures commit via the replay-protected BIP-143 digest
    /// with a fork id.
    pub has_forkid: bool,
    /// The fork id OR-ed into the sighash type. Meaningless unless
    /// `has_forkid`.
    pub forkid: u32,
}

/// Bitcoin mainnet.
pub const BITCOIN: CoinParams = CoinParams {
    name: "Bitcoin",
    shortcut: "BTC",
    address_type: 0x00,
    address_type_p2sh: 0x05,
    maxfee_kb: 2_000_000,
    has_forkid: false,
    forkid: 0,
};

/// Bitcoin testnet.
pub const TESTNET: CoinParams = CoinParams {
    name: "Testnet",
    shortcut: "TEST",
    address_type: 0x6f,
    address_type_p2sh: 0xc4,
    maxfee_kb: 10_000_000,
    has_forkid: false,
    forkid: 0,
};

/// Bitcoin Cash: same address space as Bitcoin, fork-id signatures.
pub const BITCOIN_CASH: CoinParams = CoinParams {
    name: "BitcoinCash",
    shortcut: "BCH",
    address_type: 0x00,
    address_type_p2sh: 0x05,
    maxfee_kb: 500_000,
    has_forkid: true,
    forkid: 0,
};

const COINS: [&CoinParams; 3] = [&BITCOIN, &TESTNET, &BITCOIN_CASH];

/// Look a coin up by its ticker.
pub fn lookup(shortcut: &str) -> Option<&'static CoinParams> {
    COINS.iter().find(|c| c.shortcut == shortcut).copied()
}

impl CoinParams {
    /// Render an amount in the minor unit as a decimal coin amount with
    /// the ticker, trimming trailing zeros: `12_345_000` -> "0.12345 BTC".
    pub fn amount_str(&self, amount: u64) -> String {
        let whole = amount / 100_000_000;
        let frac = amount % 100_000_000;
        if frac == 0 {
            format!("{} {}", whole, self.shortcut)
        } else {
            let frac = format!("{:08}", frac);
            format!("{}.{} {}", whole, frac.trim_end_matches('0'), self.shortcut)
        }
    }
}
