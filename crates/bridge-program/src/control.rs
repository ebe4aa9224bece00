//! Guards and control hand-over shared by both bridges.

use bridge_types::{Address, BridgeEvent, LedgerId};
use signer_registry::SignerRegistry;

use crate::{message::AuthorizedCall, BridgeError};

/// Reject calls addressed to another deployment
pub(crate) fn ensure_ledger(expected: LedgerId, actual: LedgerId) -> Result<(), BridgeError> {
    if expected != actual {
        return Err(BridgeError::LedgerMismatch { expected, actual });
    }
    Ok(())
}

/// Swap the controlling registry after the current one authorizes it
///
/// Returns the previous registry and the event to emit. Nothing changes
/// unless every check passes.
pub(crate) fn transfer_relayer(
    bridge: Address,
    registry: &mut SignerRegistry,
    ledger_id: LedgerId,
    new_registry: SignerRegistry,
    bundle: &[u8],
) -> Result<(SignerRegistry, BridgeEvent), BridgeError> {
    ensure_ledger(registry.ledger_id(), ledger_id)?;
    if new_registry.ledger_id() != registry.ledger_id() {
        return Err(BridgeError::RegistryLedgerMismatch {
            expected: registry.ledger_id(),
            actual: new_registry.ledger_id(),
        });
    }
    if new_registry.identity() == registry.identity() {
        return Err(BridgeError::SameRegistry(new_registry.identity()));
    }

    let auth = AuthorizedCall::transfer_relayer(&new_registry).authorize(registry, &bridge, bundle)?;
    registry.consume(auth)?;

    let previous = std::mem::replace(registry, new_registry);
    let event = BridgeEvent::RelayerTransferred {
        ledger_id,
        previous_registry: previous.identity(),
        new_registry: registry.identity(),
    };
    tracing::info!(
        "Bridge {} on ledger {}: control moved from registry {} to {}",
        bridge,
        ledger_id,
        previous.identity(),
        registry.identity()
    );
    Ok((previous, event))
}
