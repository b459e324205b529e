pub mod wallet;

pub use wallet::{EoaWallet, ProxyWallet, WalletHandle};
