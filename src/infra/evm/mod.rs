//! EVM side of the system: the injected wallet provider, the wallet session,
//! message signing and the registry contract.

pub mod abi;
pub mod provider;
pub mod registry;
pub mod wallet;

pub use provider::{HttpProvider, ProviderError, SignerProvider};
pub use registry::RegistryClient;
pub use wallet::{SignatureService, WalletConnector};
