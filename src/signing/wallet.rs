use crate::error::{EngineError, Result};
use crate::market_client::WalletClass;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Signature, H256};
use std::fmt;

/// Directly-signing externally-owned account.
pub struct EoaWallet {
    inner: LocalWallet,
}

impl EoaWallet {
    pub fn from_private_key(hex_key: &str) -> Result<Self> {
        let inner: LocalWallet = hex_key
            .parse()
            .map_err(|e| EngineError::Wallet(format!("invalid private key: {e}")))?;
        Ok(Self { inner })
    }

    pub fn from_env(var: &str) -> Result<Self> {
        let key = std::env::var(var)
            .map_err(|_| EngineError::Wallet(format!("{var} not set")))?;
        Self::from_private_key(&key)
    }

    pub fn address(&self) -> Address {
        self.inner.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.inner.chain_id()
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.inner = self.inner.with_chain_id(chain_id);
        self
    }

    pub async fn sign_hash(&self, hash: H256) -> Result<Signature> {
        self.inner
            .sign_hash(hash)
            .map_err(|e| EngineError::Signature(e.to_string()))
    }

    pub async fn sign_message(&self, message: &[u8]) -> Result<Signature> {
        self.inner
            .sign_message(message)
            .await
            .map_err(|e| EngineError::Signature(e.to_string()))
    }

    pub fn inner(&self) -> &LocalWallet {
        &self.inner
    }
}

impl fmt::Debug for EoaWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EoaWallet")
            .field("address", &self.address())
            .field("chain_id", &self.chain_id())
            .finish()
    }
}

/// 1-of-1 proxy contract that signs with an owner key and forwards the call.
/// Multi-signature proxies are out of scope.
pub struct ProxyWallet {
    owner: LocalWallet,
    proxy_address: Address,
}

impl ProxyWallet {
    pub fn new(owner: LocalWallet, proxy_address: Address) -> Self {
        Self { owner, proxy_address }
    }

    pub fn from_env(key_var: &str, proxy_address: Address) -> Result<Self> {
        let key = std::env::var(key_var)
            .map_err(|_| EngineError::Wallet(format!("{key_var} not set")))?;
        let owner: LocalWallet = key
            .parse()
            .map_err(|e| EngineError::Wallet(format!("invalid private key: {e}")))?;
        Ok(Self::new(owner, proxy_address))
    }

    pub fn owner_address(&self) -> Address {
        self.owner.address()
    }

    pub fn proxy_address(&self) -> Address {
        self.proxy_address
    }

    pub async fn sign_hash(&self, hash: H256) -> Result<Signature> {
        self.owner
            .sign_hash(hash)
            .map_err(|e| EngineError::Signature(e.to_string()))
    }
}

impl fmt::Debug for ProxyWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyWallet")
            .field("owner", &self.owner_address())
            .field("proxy", &self.proxy_address)
            .finish()
    }
}

/// Dispatch tag over the two supported wallet classes, matched exhaustively
/// at every call site that signs a merge transaction.
#[derive(Debug)]
pub enum WalletHandle {
    Eoa(EoaWallet),
    Proxy(ProxyWallet),
}

impl WalletHandle {
    pub fn class(&self) -> WalletClass {
        match self {
            WalletHandle::Eoa(_) => WalletClass::EoaWallet,
            WalletHandle::Proxy(_) => WalletClass::ProxyWallet,
        }
    }

    pub fn signer_address(&self) -> Address {
        match self {
            WalletHandle::Eoa(w) => w.address(),
            WalletHandle::Proxy(w) => w.owner_address(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known test private key (Hardhat/Anvil default account #0); never
    // used outside tests.
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn eoa_wallet_derives_expected_address() {
        let wallet = EoaWallet::from_private_key(TEST_KEY).unwrap();
        assert_eq!(
            format!("{:?}", wallet.address()).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn wallet_handle_reports_its_class() {
        let wallet = EoaWallet::from_private_key(TEST_KEY).unwrap();
        let handle = WalletHandle::Eoa(wallet);
        assert_eq!(handle.class(), WalletClass::EoaWallet);
    }
}
